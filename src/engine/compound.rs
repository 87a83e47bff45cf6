//! Compound heterozygous engine (C6).
//!
//! Grounded on `original_source/varapp/filters/genotype_filters.py`
//! (`GenotypesFilterCompoundHeterozygous`, `build_conditions_array`,
//! `build_compound_conditions_vector`, `scan_genotypes_compound`,
//! `process_1_batch`): the two-pass per-gene pairing algorithm with
//! false-positive elimination against unaffected carriers.

use std::collections::HashMap;

use rayon::prelude::*;

use crate::engine::cancel::{check_cancelled, CancellationToken};
use crate::engine::condition::{ConditionVector, MergeOp};
use crate::engine::packed::intersect;
use crate::engine::scanner::scan;
use crate::err::EngineError;
use crate::model::{
    GenotypeMatrix, Provenance, SamplesSelection, VariantId, ANY, CARRIER, CARRIER_HET,
    NON_CARRIER, NOT_CARRIER_HOM,
};

/// Output of the compound-het engine: the union of surviving paternal- and
/// maternal-origin ids, their provenance, and the Cartesian pairs recorded
/// for post-intersection pruning (§4.6).
#[derive(Default, Clone, Debug)]
pub struct CompoundResult {
    pub ids: Vec<VariantId>,
    pub provenance: HashMap<VariantId, Provenance>,
    pub pairs: Vec<(VariantId, VariantId)>,
}

/// An affected sample qualifying for compound-het analysis: both parents
/// active, neither parent themselves affected.
struct Trio {
    child: usize,
    father: usize,
    mother: usize,
}

/// Build the base condition vector shared by every compound scan: every
/// affected sample is heterozygous, every not-affected sample excludes
/// hom-alt (it would explain the phenotype by itself).
fn base_vector(selection: &SamplesSelection) -> Vec<u8> {
    let mut masks = vec![ANY; selection.active_idx().len()];
    for &idx in selection.affected_idx() {
        if let Some(pos) = selection.active_position_of(idx) {
            masks[pos] = CARRIER_HET;
        }
    }
    for &idx in selection.not_affected_idx() {
        if let Some(pos) = selection.active_position_of(idx) {
            masks[pos] = NOT_CARRIER_HOM;
        }
    }
    masks
}

fn qualifying_trios(selection: &SamplesSelection) -> Vec<Trio> {
    selection
        .affected_idx()
        .iter()
        .filter_map(|&child| {
            let (father, mother) = selection.parents_idx_of(child);
            let (father, mother) = (father?, mother?);
            let father_is_affected = selection
                .affected_idx()
                .iter()
                .any(|&a| selection.active_position_of(a) == Some(father));
            let mother_is_affected = selection
                .affected_idx()
                .iter()
                .any(|&a| selection.active_position_of(a) == Some(mother));
            if father_is_affected || mother_is_affected {
                return None;
            }
            selection
                .active_position_of(child)
                .map(|child_pos| Trio {
                    child: child_pos,
                    father,
                    mother,
                })
        })
        .collect()
}

/// Build the paternal-origin and maternal-origin condition vectors for a
/// trio, starting from `base` (the child's own base slot is already
/// `CARRIER_HET`).
fn origin_vectors(base: &[u8], trio: &Trio) -> (ConditionVector, ConditionVector) {
    let mut father_origin = base.to_vec();
    father_origin[trio.father] = CARRIER;
    father_origin[trio.mother] = NON_CARRIER;
    let mut mother_origin = base.to_vec();
    mother_origin[trio.father] = NON_CARRIER;
    mother_origin[trio.mother] = CARRIER;
    (
        ConditionVector {
            masks: father_origin,
            merge: MergeOp::And,
            restrict_chr_x: false,
        },
        ConditionVector {
            masks: mother_origin,
            merge: MergeOp::And,
            restrict_chr_x: false,
        },
    )
}

/// Active-subset not-affected samples with both parents active, eligible to
/// eliminate false-positive pairs (§4.6 step 3).
struct EliminationCandidate {
    pos: usize,
    father: usize,
    mother: usize,
}

fn elimination_candidates(selection: &SamplesSelection) -> Vec<EliminationCandidate> {
    selection
        .not_affected_idx()
        .iter()
        .filter_map(|&idx| {
            let (father, mother) = selection.parents_idx_of(idx);
            let (father, mother) = (father?, mother?);
            selection
                .active_position_of(idx)
                .map(|pos| EliminationCandidate { pos, father, mother })
        })
        .collect()
}

fn eliminate_false_positives(
    matrix: &GenotypeMatrix,
    active_idx: &[usize],
    base: &[u8],
    candidates: &[EliminationCandidate],
    cancel: &CancellationToken,
    pass_f: &mut Vec<VariantId>,
    pass_m: &mut Vec<VariantId>,
) -> Result<(), EngineError> {
    if candidates.is_empty() {
        return Ok(());
    }

    // Fixed original sets: every candidate scans against the same pool and
    // accumulates its removals, so candidate order and moving targets can't
    // change the outcome. Matches `process_1_batch`'s batch-then-subtract
    // discipline instead of mutating `pass_f`/`pass_m` between candidates.
    let mut scan_pool: Vec<VariantId> = pass_f.iter().chain(pass_m.iter()).copied().collect();
    scan_pool.sort_unstable();
    scan_pool.dedup();
    if scan_pool.is_empty() {
        return Ok(());
    }

    let mut pf_bad_union: Vec<VariantId> = Vec::new();
    let mut pm_bad_union: Vec<VariantId> = Vec::new();

    for h in candidates {
        check_cancelled(cancel)?;

        let mut h_father_origin = base.to_vec();
        h_father_origin[h.pos] = CARRIER_HET;
        h_father_origin[h.father] = CARRIER;
        h_father_origin[h.mother] = NON_CARRIER;
        let mut h_mother_origin = base.to_vec();
        h_mother_origin[h.pos] = CARRIER_HET;
        h_mother_origin[h.father] = NON_CARRIER;
        h_mother_origin[h.mother] = CARRIER;

        let h_pass_f = scan(
            matrix,
            active_idx,
            &ConditionVector {
                masks: h_father_origin,
                merge: MergeOp::And,
                restrict_chr_x: false,
            },
            Some(&scan_pool),
            cancel,
        )?;
        let h_pass_m = scan(
            matrix,
            active_idx,
            &ConditionVector {
                masks: h_mother_origin,
                merge: MergeOp::And,
                restrict_chr_x: false,
            },
            Some(&scan_pool),
            cancel,
        )?;

        let pf_bad = intersect(pass_f, &h_pass_f);
        let pm_bad = intersect(pass_m, &h_pass_m);
        if !pf_bad.is_empty() && !pm_bad.is_empty() {
            pf_bad_union.extend(pf_bad);
            pm_bad_union.extend(pm_bad);
        }
    }

    pf_bad_union.sort_unstable();
    pf_bad_union.dedup();
    pm_bad_union.sort_unstable();
    pm_bad_union.dedup();
    pass_f.retain(|id| !pf_bad_union.contains(id));
    pass_m.retain(|id| !pm_bad_union.contains(id));
    Ok(())
}

fn intersect_all(sets: &[Vec<VariantId>]) -> Vec<VariantId> {
    let mut iter = sets.iter();
    let Some(first) = iter.next() else {
        return Vec::new();
    };
    let mut acc = first.clone();
    for s in iter {
        acc = intersect(&acc, s);
    }
    acc
}

/// Run the compound-het engine for every gene in `gene_batches`. Each gene
/// batch is a cancellation boundary: `cancel` is checked before a gene's
/// work begins, so a flag raised mid-run stops further genes from starting.
pub fn run(
    matrix: &GenotypeMatrix,
    selection: &SamplesSelection,
    gene_batches: &HashMap<String, Vec<VariantId>>,
    cancel: &CancellationToken,
) -> Result<CompoundResult, EngineError> {
    let trios = qualifying_trios(selection);
    if trios.is_empty() {
        return Ok(CompoundResult::default());
    }
    let base = base_vector(selection);
    let elimination = elimination_candidates(selection);
    let active_idx = selection.active_idx();

    let per_gene: Vec<Result<Option<CompoundResult>, EngineError>> = gene_batches
        .par_iter()
        .map(|(_gene, batch)| -> Result<Option<CompoundResult>, EngineError> {
            check_cancelled(cancel)?;
            if batch.is_empty() {
                return Ok(None);
            }

            let mut pf_sets = Vec::with_capacity(trios.len());
            let mut pm_sets = Vec::with_capacity(trios.len());

            for trio in &trios {
                let (c_f, c_m) = origin_vectors(&base, trio);
                let mut pass_f = scan(matrix, active_idx, &c_f, Some(batch), cancel)?;
                let mut pass_m = scan(matrix, active_idx, &c_m, Some(batch), cancel)?;
                if pass_f.is_empty() || pass_m.is_empty() {
                    return Ok(None);
                }

                eliminate_false_positives(
                    matrix,
                    active_idx,
                    &base,
                    &elimination,
                    cancel,
                    &mut pass_f,
                    &mut pass_m,
                )?;

                if pass_f.is_empty() || pass_m.is_empty() {
                    return Ok(None);
                }
                pf_sets.push(pass_f);
                pm_sets.push(pass_m);
            }

            let pf = intersect_all(&pf_sets);
            let pm = intersect_all(&pm_sets);
            if pf.is_empty() || pm.is_empty() {
                return Ok(None);
            }

            let mut ids: Vec<VariantId> = pf.iter().chain(pm.iter()).copied().collect();
            ids.sort_unstable();
            ids.dedup();

            let mut provenance = HashMap::new();
            for &id in &pf {
                provenance.insert(id, Provenance::Paternal);
            }
            for &id in &pm {
                provenance.insert(id, Provenance::Maternal);
            }

            let mut pairs = Vec::with_capacity(pf.len() * pm.len());
            for &p in &pf {
                for &m in &pm {
                    pairs.push((p, m));
                }
            }

            Ok(Some(CompoundResult {
                ids,
                provenance,
                pairs,
            }))
        })
        .collect();

    let mut result = CompoundResult::default();
    for gene_result in per_gene {
        if let Some(gene_result) = gene_result? {
            result.ids.extend(gene_result.ids);
            result.provenance.extend(gene_result.provenance);
            result.pairs.extend(gene_result.pairs);
        }
    }
    result.ids.sort_unstable();
    result.ids.dedup();
    Ok(result)
}
