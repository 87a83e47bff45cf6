//! Bitwise row scanner (C5).
//!
//! Grounded on `original_source/varapp/filters/genotype_filters.py`
//! (`scan_genotypes`, `parallel_apply_bitwise`). Row batches are distributed
//! over a `rayon` parallel iterator rather than a `multiprocessing.Pool`,
//! matching the parallelism idiom already used in the teacher crate
//! (`server/pheno_prepare.rs`).

use rayon::prelude::*;

use crate::engine::cancel::{check_cancelled, CancellationToken};
use crate::engine::condition::{ConditionVector, MergeOp};
use crate::err::EngineError;
use crate::model::{GenotypeMatrix, VariantId};

/// Does one genotype row satisfy the condition vector under the given merge
/// operator?
fn row_passes(row: &[u8], active_idx: &[usize], cond: &ConditionVector) -> bool {
    match cond.merge {
        MergeOp::And => active_idx
            .iter()
            .zip(cond.masks.iter())
            .all(|(&col, &mask)| row[col] & mask != 0),
        MergeOp::Or => active_idx
            .iter()
            .zip(cond.masks.iter())
            .any(|(&col, &mask)| row[col] & mask != 0),
    }
}

/// Number of row batches to split the matrix into. One batch per available
/// parallelism unit, at least 1.
fn batch_count(n_variants: usize) -> usize {
    rayon::current_num_threads().max(1).min(n_variants.max(1))
}

/// Scan the genotype matrix against `cond`, restricted to `active_idx`
/// (full-sample-list positions, in the same order as `cond.masks`), and
/// optionally to an ascending candidate id subset. Returns the ascending
/// list of passing variant ids.
///
/// `cancel` is checked before each batch starts; a flag raised mid-scan
/// stops further batches from being picked up and surfaces
/// `EngineError::Cancelled` once all in-flight batches have returned.
pub fn scan(
    matrix: &GenotypeMatrix,
    active_idx: &[usize],
    cond: &ConditionVector,
    candidates: Option<&[VariantId]>,
    cancel: &CancellationToken,
) -> Result<Vec<VariantId>, EngineError> {
    let n_variants = matrix.n_variants();
    if n_variants == 0 {
        return Ok(Vec::new());
    }

    let n_batches = batch_count(n_variants);
    let batch_size = n_variants.div_ceil(n_batches);

    let batches: Vec<Vec<VariantId>> = (0..n_batches)
        .into_par_iter()
        .map(|b| -> Result<Vec<VariantId>, EngineError> {
            check_cancelled(cancel)?;

            let row_start = b * batch_size;
            let row_end = (row_start + batch_size).min(n_variants);
            if row_start >= row_end {
                return Ok(Vec::new());
            }
            let id_start = (row_start + 1) as VariantId;
            let id_end = row_end as VariantId; // inclusive

            let mut out = Vec::new();
            if let Some(candidates) = candidates {
                let lo = candidates.partition_point(|&id| id < id_start);
                let hi = candidates.partition_point(|&id| id <= id_end);
                for &id in &candidates[lo..hi] {
                    if let Some(row) = matrix.row(id) {
                        if row_passes(row, active_idx, cond) {
                            out.push(id);
                        }
                    }
                }
            } else {
                for id in id_start..=id_end {
                    if let Some(row) = matrix.row(id) {
                        if row_passes(row, active_idx, cond) {
                            out.push(id);
                        }
                    }
                }
            }
            Ok(out)
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(batches.concat())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::cancel::new_token;
    use crate::model::{ANY, CARRIER, NON_CARRIER};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::Ordering;

    fn matrix() -> GenotypeMatrix {
        // 4 variants x 3 samples
        GenotypeMatrix::from_rows(
            vec![
                1, 2, 4, // variant 1
                2, 1, 1, // variant 2
                1, 1, 2, // variant 3
                4, 4, 4, // variant 4
            ],
            3,
        )
        .unwrap()
    }

    #[test]
    fn and_merge_requires_all_conditions() {
        let m = matrix();
        let cond = ConditionVector {
            masks: vec![CARRIER, ANY, ANY],
            merge: MergeOp::And,
            restrict_chr_x: false,
        };
        let result = scan(&m, &[0, 1, 2], &cond, None, &new_token()).unwrap();
        assert_eq!(result, vec![1, 2, 4]);
    }

    #[test]
    fn or_merge_requires_any_condition() {
        let m = matrix();
        let cond = ConditionVector {
            masks: vec![NON_CARRIER, NON_CARRIER, NON_CARRIER],
            merge: MergeOp::Or,
            restrict_chr_x: false,
        };
        let result = scan(&m, &[0, 1, 2], &cond, None, &new_token()).unwrap();
        assert_eq!(result, vec![1, 2, 3]);
    }

    #[test]
    fn candidate_restriction_is_honoured() {
        let m = matrix();
        let cond = ConditionVector {
            masks: vec![ANY, ANY, ANY],
            merge: MergeOp::And,
            restrict_chr_x: false,
        };
        let result = scan(&m, &[0, 1, 2], &cond, Some(&[2, 4]), &new_token()).unwrap();
        assert_eq!(result, vec![2, 4]);
    }

    #[test]
    fn result_is_ascending() {
        let m = matrix();
        let cond = ConditionVector {
            masks: vec![ANY, ANY, ANY],
            merge: MergeOp::And,
            restrict_chr_x: false,
        };
        let result = scan(&m, &[0, 1, 2], &cond, None, &new_token()).unwrap();
        let mut sorted = result.clone();
        sorted.sort_unstable();
        assert_eq!(result, sorted);
    }

    #[test]
    fn raised_cancellation_token_stops_the_scan() {
        let m = matrix();
        let cond = ConditionVector {
            masks: vec![ANY, ANY, ANY],
            merge: MergeOp::And,
            restrict_chr_x: false,
        };
        let cancel = new_token();
        cancel.store(true, Ordering::Relaxed);
        let result = scan(&m, &[0, 1, 2], &cond, None, &cancel);
        assert!(matches!(result, Err(EngineError::Cancelled)));
    }
}
