//! Variant-attribute predicate taxonomy, sort, and pagination (C9).
//!
//! Grounded on `original_source/varapp/filters/variant_filters.py`
//! (`ContinuousFilter`, `EnumFilter`, `BinaryFilter`, `LocationFilter`,
//! `VariantIDFilter`), `sort.py` (`MinType`/`Min`), and `pagination.py`
//! (`Pagination`). These are evaluated by the store, never by the genotype
//! engine: the engine only ever consumes the resulting id set.

use serde::{Deserialize, Serialize};

use crate::model::{Variant, VariantId};

/// Ordering relation for a [`VariantPredicate::Continuous`] threshold test.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContinuousOp {
    Lt,
    Le,
    Eq,
    Ge,
    Gt,
}

/// How a missing (`None`) value on the variant compares against a continuous
/// threshold. Grounded on `ContinuousFilter`/`ContinuousFilterNoneLower`/
/// `NoneHigher`/`NoneInclude` in the source.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoneIs {
    /// A missing value sorts below every concrete value: it always fails a
    /// `Ge`/`Gt` test and always passes a `Lt`/`Le` test.
    Lower,
    /// A missing value sorts above every concrete value.
    Higher,
    /// A missing value never passes the predicate.
    Exclude,
    /// A missing value always passes the predicate.
    Include,
}

/// A single variant-attribute predicate, pushed down to the store.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VariantPredicate {
    Continuous {
        field: String,
        op: ContinuousOp,
        threshold: f64,
        none_is: NoneIs,
    },
    Enum {
        field: String,
        values: Vec<String>,
        case_sensitive: bool,
    },
    Binary {
        field: String,
        expected: bool,
    },
    Location {
        ranges: Vec<(String, u32, u32)>,
    },
    VariantIds {
        ids: Vec<VariantId>,
    },
}

fn continuous_field(variant: &Variant, field: &str) -> Option<f64> {
    match field {
        "quality" => variant.quality.map(|v| v as f64),
        "aaf_1kg_all" => variant.aaf_1kg_all.map(|v| v as f64),
        "aaf_esp_all" => variant.aaf_esp_all.map(|v| v as f64),
        "aaf_exac_all" => variant.aaf_exac_all.map(|v| v as f64),
        _ => None,
    }
}

fn enum_field<'a>(variant: &'a Variant, field: &str) -> Option<&'a str> {
    match field {
        "impact" => Some(variant.impact.as_str()),
        "impact_severity" => Some(variant.impact_severity.as_str()),
        _ => None,
    }
}

fn binary_field(variant: &Variant, field: &str) -> Option<bool> {
    match field {
        "in_dbsnp" => Some(variant.in_dbsnp),
        _ => None,
    }
}

impl VariantPredicate {
    /// Evaluate the predicate against one variant. Stands in for "push to
    /// SQL" in the source's store; used by the in-memory store stub.
    pub fn matches(&self, variant: &Variant) -> bool {
        match self {
            VariantPredicate::Continuous {
                field,
                op,
                threshold,
                none_is,
            } => {
                let Some(value) = continuous_field(variant, field) else {
                    return match none_is {
                        NoneIs::Lower => matches!(op, ContinuousOp::Lt | ContinuousOp::Le),
                        NoneIs::Higher => matches!(op, ContinuousOp::Gt | ContinuousOp::Ge),
                        NoneIs::Exclude => false,
                        NoneIs::Include => true,
                    };
                };
                match op {
                    ContinuousOp::Lt => value < *threshold,
                    ContinuousOp::Le => value <= *threshold,
                    ContinuousOp::Eq => value == *threshold,
                    ContinuousOp::Ge => value >= *threshold,
                    ContinuousOp::Gt => value > *threshold,
                }
            }
            VariantPredicate::Enum {
                field,
                values,
                case_sensitive,
            } => match enum_field(variant, field) {
                None => false,
                Some(actual) => {
                    if *case_sensitive {
                        values.iter().any(|v| v == actual)
                    } else {
                        values.iter().any(|v| v.eq_ignore_ascii_case(actual))
                    }
                }
            },
            VariantPredicate::Binary { field, expected } => {
                binary_field(variant, field) == Some(*expected)
            }
            VariantPredicate::Location { ranges } => ranges
                .iter()
                .any(|(chrom, start, end)| {
                    &variant.chrom == chrom && variant.start < *end && variant.end > *start
                }),
            VariantPredicate::VariantIds { ids } => ids.contains(&variant.variant_id),
        }
    }
}

/// Field to order variants by. `Default` falls back to `(chrom, start)`,
/// matching the source's default ordering when no sort key is requested.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub enum SortKey {
    #[default]
    Default,
    Field(String),
}

fn sort_value(variant: &Variant, field: &str) -> Option<f64> {
    continuous_field(variant, field)
}

/// Order `variants` by `key`. A missing value on the sort field sorts as the
/// minimum (`NoneIs::Lower` semantics), per `sort.py`'s `MinType`.
pub fn sort(variants: &mut [Variant], key: &SortKey, reverse: bool) {
    match key {
        SortKey::Default => {
            variants.sort_by(|a, b| (a.chrom.clone(), a.start).cmp(&(b.chrom.clone(), b.start)));
        }
        SortKey::Field(field) => {
            variants.sort_by(|a, b| {
                let av = sort_value(a, field);
                let bv = sort_value(b, field);
                match (av, bv) {
                    (None, None) => std::cmp::Ordering::Equal,
                    (None, Some(_)) => std::cmp::Ordering::Less,
                    (Some(_), None) => std::cmp::Ordering::Greater,
                    (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(std::cmp::Ordering::Equal),
                }
            });
        }
    }
    if reverse {
        variants.reverse();
    }
}

/// Apply `offset`/`limit` to an already-ordered slice. An out-of-range
/// offset yields an empty slice rather than an error, per `pagination.py`.
pub fn paginate<T: Clone>(items: &[T], offset: usize, limit: Option<usize>) -> Vec<T> {
    if offset >= items.len() {
        return Vec::new();
    }
    let end = match limit {
        Some(limit) => (offset + limit).min(items.len()),
        None => items.len(),
    };
    items[offset..end].to_vec()
}
