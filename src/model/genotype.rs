//! Genotype bit encoding and the in-memory genotype matrix.
//!
//! Grounded on `original_source/varapp/variants/genotypes_service.py`
//! (`gt_to_bit`, `variant_build_gt_type_bit`) for the bit alphabet, and on
//! `original_source/varapp/filters/genotype_filters.py` for the derived
//! condition masks (`CARRIER`, `NOT_CARRIER_HOM`, ...).

/// A sample was called homozygous reference (0/0).
pub const NON_CARRIER_HOM: u8 = 1;
/// A sample was called heterozygous (0/1).
pub const CARRIER_HET: u8 = 2;
/// A sample was called homozygous alternate (1/1).
pub const CARRIER_HOM: u8 = 4;
/// Reserved bit for an explicitly unknown call. Not produced by [`encode`]:
/// the source maps unknown calls onto `NON_CARRIER_HOM` (see `encode` docs).
pub const UNKNOWN: u8 = 8;

/// Condition mask: het or hom-alt.
pub const CARRIER: u8 = CARRIER_HET | CARRIER_HOM;
/// Condition mask: hom-ref only.
pub const NON_CARRIER: u8 = NON_CARRIER_HOM;
/// Condition mask: hom-ref or het, never hom-alt.
pub const NOT_CARRIER_HOM: u8 = NON_CARRIER_HOM | CARRIER_HET;
/// Condition mask matching any stored call; the default "don't care" slot.
pub const ANY: u8 = NON_CARRIER_HOM | CARRIER_HET | CARRIER_HOM | UNKNOWN;

/// Raw per-(variant, sample) call as read from a dataset before bit encoding.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RawCall {
    HomRef,
    Het,
    HomAlt,
    Unknown,
}

impl std::str::FromStr for RawCall {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "0/0" | "0|0" | "0" => RawCall::HomRef,
            "0/1" | "1/0" | "0|1" | "1|0" => RawCall::Het,
            "1/1" | "1|1" | "1" => RawCall::HomAlt,
            "./." | "./0" | "./1" | "0/." | "1/." | "." => RawCall::Unknown,
            _ => anyhow::bail!("invalid genotype value: {:?}", s),
        })
    }
}

/// Map a raw call onto the stored bitmask alphabet.
///
/// Unknown calls are folded onto `NON_CARRIER_HOM`, matching the source's
/// `gt_to_bit` mapping exactly: this can make an unknown call silently
/// satisfy a "must be non-carrier" constraint, which is a known, preserved
/// quirk (see Open Questions).
pub fn encode(raw: RawCall) -> u8 {
    match raw {
        RawCall::HomRef => NON_CARRIER_HOM,
        RawCall::Het => CARRIER_HET,
        RawCall::Unknown => NON_CARRIER_HOM,
        RawCall::HomAlt => CARRIER_HOM,
    }
}

/// A 1-based variant identifier, also used as the row index (minus one) into
/// a [`GenotypeMatrix`].
pub type VariantId = u32;

/// Dense `variants x samples` matrix of bit-encoded genotype calls.
///
/// Row `r` (0-based) corresponds to `variant_id == r + 1`. Columns follow the
/// dataset's full sample order, not any particular selection's active subset.
/// Immutable once constructed.
#[derive(Debug, Clone)]
pub struct GenotypeMatrix {
    n_samples: usize,
    cells: Vec<u8>,
}

impl GenotypeMatrix {
    /// Build a matrix from row-major encoded cells. Fails if `cells.len()`
    /// is not a multiple of `n_samples`.
    pub fn from_rows(cells: Vec<u8>, n_samples: usize) -> Result<Self, crate::err::EngineError> {
        if n_samples == 0 || cells.len() % n_samples != 0 {
            return Err(crate::err::EngineError::IntegrityError(format!(
                "genotype matrix cell count {} is not a multiple of sample count {}",
                cells.len(),
                n_samples
            )));
        }
        Ok(Self { n_samples, cells })
    }

    pub fn n_samples(&self) -> usize {
        self.n_samples
    }

    pub fn n_variants(&self) -> usize {
        self.cells.len() / self.n_samples
    }

    /// Borrow row `variant_id - 1` as a slice of per-sample bitmasks in
    /// dataset sample order.
    pub fn row(&self, variant_id: VariantId) -> Option<&[u8]> {
        let idx = (variant_id as usize).checked_sub(1)?;
        let start = idx.checked_mul(self.n_samples)?;
        self.cells.get(start..start + self.n_samples)
    }

    /// Borrow the full matrix as row-major cells, for batch splitting.
    pub fn cells(&self) -> &[u8] {
        &self.cells
    }
}
