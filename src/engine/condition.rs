//! Scenario-to-condition-vector compiler (C4).
//!
//! Grounded on `original_source/varapp/filters/genotype_filters.py`
//! (`GenotypesFilterDoNothing/Active/Dominant/Recessive/DeNovo/XLinked`,
//! `merge_conditions_array`).

use crate::model::{
    Sex, ANY, CARRIER, CARRIER_HET, CARRIER_HOM, NON_CARRIER, NOT_CARRIER_HOM,
};
use crate::model::SamplesSelection;

/// High-level inheritance hypothesis to test against the genotype matrix.
/// `CompoundHet` is handled by [`crate::engine::compound`] instead of this
/// compiler.
#[derive(Copy, Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenotypeScenario {
    Nothing,
    Active,
    Dominant,
    Recessive,
    DeNovo,
    XLinked,
    CompoundHet,
}

/// How per-sample conditions in a [`ConditionVector`] combine into a
/// pass/fail verdict for one variant row.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MergeOp {
    And,
    Or,
}

/// A compiled condition vector, one bitmask per active sample in the
/// selection's active order, ready to be evaluated by
/// [`crate::engine::scanner::scan`].
#[derive(Clone, Debug)]
pub struct ConditionVector {
    pub masks: Vec<u8>,
    pub merge: MergeOp,
    /// Restrict scanning to chrX variant ids (X-linked scenario only).
    pub restrict_chr_x: bool,
}

/// Result of compiling a scenario: either a usable condition vector, or
/// `Impossible` when the shortcut rule determines no variant can ever pass.
pub enum Compiled {
    Vector(ConditionVector),
    Impossible,
}

/// Merge a newly emitted `(active_idx, mask)` constraint into the vector by
/// bitwise AND (the strongest constraint wins), matching
/// `merge_conditions_array`.
fn apply(masks: &mut [u8], idx: usize, mask: u8) {
    masks[idx] &= mask;
}

/// Compile `scenario` against `selection` into a condition vector, or
/// determine the scenario is impossible for this selection (§4.4 shortcut
/// rule).
pub fn compile(scenario: GenotypeScenario, selection: &SamplesSelection) -> Compiled {
    if selection.active_idx().is_empty() {
        return Compiled::Impossible;
    }

    let n_active = selection.active_idx().len();
    let mut masks = vec![ANY; n_active];
    let merge = if scenario == GenotypeScenario::Active {
        MergeOp::Or
    } else {
        MergeOp::And
    };
    let mut restrict_chr_x = false;
    let mut any_constraint_emitted = false;

    match scenario {
        GenotypeScenario::Nothing => {
            // ANY everywhere; no shortcut applies.
            return Compiled::Vector(ConditionVector {
                masks,
                merge,
                restrict_chr_x,
            });
        }
        GenotypeScenario::Active => {
            for &idx in selection.active_idx() {
                let pos = selection.active_position_of(idx).unwrap();
                apply(&mut masks, pos, CARRIER);
                any_constraint_emitted = true;
            }
        }
        GenotypeScenario::Dominant => {
            if selection.affected_idx().is_empty() {
                return Compiled::Impossible;
            }
            for &idx in selection.affected_idx() {
                if let Some(pos) = selection.active_position_of(idx) {
                    apply(&mut masks, pos, CARRIER);
                    any_constraint_emitted = true;
                }
            }
            for &idx in selection.not_affected_idx() {
                if let Some(pos) = selection.active_position_of(idx) {
                    apply(&mut masks, pos, NON_CARRIER);
                    any_constraint_emitted = true;
                }
            }
        }
        GenotypeScenario::Recessive => {
            if selection.affected_idx().is_empty() {
                return Compiled::Impossible;
            }
            for &idx in selection.affected_idx() {
                if let Some(pos) = selection.active_position_of(idx) {
                    apply(&mut masks, pos, CARRIER_HOM);
                    any_constraint_emitted = true;
                }
                let (father, mother) = selection.parents_idx_of(idx);
                for parent_pos in [father, mother].into_iter().flatten() {
                    apply(&mut masks, parent_pos, CARRIER);
                }
            }
            for &idx in selection.not_affected_idx() {
                if let Some(pos) = selection.active_position_of(idx) {
                    apply(&mut masks, pos, NOT_CARRIER_HOM);
                    any_constraint_emitted = true;
                }
            }
        }
        GenotypeScenario::DeNovo => {
            let mut qualifying = false;
            for &idx in selection.affected_idx() {
                let (father, mother) = selection.parents_idx_of(idx);
                if let (Some(father_pos), Some(mother_pos)) = (father, mother) {
                    let father_affected = selection
                        .affected_idx()
                        .iter()
                        .any(|&a| selection.active_position_of(a) == Some(father_pos));
                    let mother_affected = selection
                        .affected_idx()
                        .iter()
                        .any(|&a| selection.active_position_of(a) == Some(mother_pos));
                    if father_affected || mother_affected {
                        continue;
                    }
                    if let Some(child_pos) = selection.active_position_of(idx) {
                        apply(&mut masks, child_pos, CARRIER_HET);
                        apply(&mut masks, father_pos, NON_CARRIER);
                        apply(&mut masks, mother_pos, NON_CARRIER);
                        qualifying = true;
                    }
                }
            }
            if !qualifying {
                return Compiled::Impossible;
            }
            any_constraint_emitted = true;
            for &idx in selection.not_affected_idx() {
                if let Some(pos) = selection.active_position_of(idx) {
                    apply(&mut masks, pos, NON_CARRIER);
                }
            }
        }
        GenotypeScenario::XLinked => {
            restrict_chr_x = true;
            if selection.affected_idx().is_empty() {
                return Compiled::Impossible;
            }
            for &idx in selection.affected_idx() {
                let Some(pos) = selection.active_position_of(idx) else {
                    continue;
                };
                match selection.sex_of(idx) {
                    Sex::Male => {
                        apply(&mut masks, pos, CARRIER_HET);
                        let (_, mother) = selection.parents_idx_of(idx);
                        if let Some(mother_pos) = mother {
                            apply(&mut masks, mother_pos, CARRIER);
                        }
                    }
                    Sex::Female => {
                        apply(&mut masks, pos, CARRIER_HOM);
                        let (father, mother) = selection.parents_idx_of(idx);
                        for parent_pos in [father, mother].into_iter().flatten() {
                            apply(&mut masks, parent_pos, CARRIER);
                        }
                    }
                    Sex::Unknown => {}
                }
                any_constraint_emitted = true;
            }
            for &idx in selection.not_affected_idx() {
                let Some(pos) = selection.active_position_of(idx) else {
                    continue;
                };
                match selection.sex_of(idx) {
                    Sex::Male => apply(&mut masks, pos, NON_CARRIER),
                    Sex::Female => apply(&mut masks, pos, NOT_CARRIER_HOM),
                    Sex::Unknown => {}
                }
            }
        }
        GenotypeScenario::CompoundHet => unreachable!("compiled separately by engine::compound"),
    }

    if !any_constraint_emitted || masks.iter().all(|&m| m == 0) {
        return Compiled::Impossible;
    }

    Compiled::Vector(ConditionVector {
        masks,
        merge,
        restrict_chr_x,
    })
}
