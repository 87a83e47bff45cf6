//! Data model: genotype bit encoding, the genotype matrix, samples
//! selections, and the thin variant/result types.

pub mod genotype;
pub mod sample;
pub mod variant;

pub use genotype::{
    encode, GenotypeMatrix, RawCall, VariantId, ANY, CARRIER, CARRIER_HET, CARRIER_HOM,
    NON_CARRIER, NON_CARRIER_HOM, NOT_CARRIER_HOM, UNKNOWN,
};
pub use sample::{Sample, SamplesSelection, Sex};
pub use variant::{FilterResult, Provenance, Variant};
