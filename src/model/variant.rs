//! Thin variant model and request result shape.
//!
//! Field selection grounded on `original_source/varapp/data_models/variants.py`
//! (`VARIANT_FIELDS`, `expose_variant`), trimmed to what the engine and the
//! variant-attribute predicates in [`crate::predicate`] actually consume.

use serde::{Deserialize, Serialize};

use crate::model::genotype::VariantId;

/// A variant, as held by the store stub. The engine itself only ever reads
/// `variant_id`, `chrom`, and `gene_symbol`; the remaining fields exist so
/// [`crate::predicate::VariantPredicate`] has something to evaluate.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Variant {
    pub variant_id: VariantId,
    pub chrom: String,
    pub start: u32,
    pub end: u32,
    pub gene_symbol: String,
    pub transcript: String,
    pub quality: Option<f32>,
    pub impact: String,
    pub impact_severity: String,
    pub in_dbsnp: bool,
    pub aaf_1kg_all: Option<f32>,
    pub aaf_esp_all: Option<f32>,
    pub aaf_exac_all: Option<f32>,
}

/// Compound-het provenance label attached to a passing variant id.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Provenance {
    Paternal,
    Maternal,
}

/// The result of a single [`crate::engine::evaluate`] call.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FilterResult {
    /// Ascending variant ids that satisfy every filter, before pagination.
    pub ids: Vec<VariantId>,
    /// `ids.len()`, kept as its own field so pagination doesn't need to
    /// recompute it once `variants` has been trimmed to a page.
    pub n_filtered: usize,
    /// The hydrated `[offset, offset + limit)` page.
    pub variants: Vec<Variant>,
    /// Compound-het provenance, keyed by variant id; empty for all other
    /// scenarios.
    pub provenance: std::collections::HashMap<VariantId, Provenance>,
}

impl FilterResult {
    pub fn empty() -> Self {
        Self::default()
    }
}
