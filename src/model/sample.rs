//! Pedigree-aware samples selection.
//!
//! Grounded on `original_source/varapp/data_models/samples.py`
//! (`Sample`, `SamplesSelection`), reexpressed with arena-style `Vec`
//! indices instead of owning parent/child back-references (see the
//! re-architecture guidance).

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use crate::err::EngineError;

/// Biological sex as recorded in the pedigree.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Sex {
    Male,
    Female,
    Unknown,
}

/// One individual in a dataset's pedigree.
#[derive(Clone, Debug)]
pub struct Sample {
    pub name: String,
    pub sample_id: u32,
    pub family_id: Option<String>,
    pub mother_name: Option<String>,
    pub father_name: Option<String>,
    pub sex: Sex,
    pub affected: bool,
}

/// A named group of samples within a selection (e.g. "affected").
pub type GroupName = String;

/// An ordered, immutable view over a dataset's samples, with pedigree links
/// resolved to positions and derived active/affected index lists
/// precomputed once at construction time.
#[derive(Clone, Debug)]
pub struct SamplesSelection {
    samples: Vec<Sample>,
    groups: HashMap<GroupName, Vec<String>>,
    active: Vec<bool>,
    active_idx: Vec<usize>,
    affected_idx: Vec<usize>,
    not_affected_idx: Vec<usize>,
    name_to_idx: HashMap<String, usize>,
}

impl SamplesSelection {
    /// Build a selection from the dataset's full sample list and a set of
    /// named groups. Every member of every group must be present in
    /// `samples`; sample names must be unique. `affected`/`not_affected`
    /// groups, if present, seed the derived affected/not-affected lists; any
    /// sample named by any group is considered active.
    pub fn new(
        samples: Vec<Sample>,
        groups: HashMap<GroupName, Vec<String>>,
    ) -> Result<Self, EngineError> {
        let mut name_to_idx = HashMap::with_capacity(samples.len());
        for (idx, s) in samples.iter().enumerate() {
            if name_to_idx.insert(s.name.clone(), idx).is_some() {
                return Err(EngineError::InvalidSelection(format!(
                    "duplicate sample name: {}",
                    s.name
                )));
            }
        }

        let mut active = vec![false; samples.len()];
        for (group_name, members) in &groups {
            for member in members {
                let idx = name_to_idx.get(member).ok_or_else(|| {
                    EngineError::InvalidSelection(format!(
                        "group {group_name:?} references unknown sample {member:?}"
                    ))
                })?;
                active[*idx] = true;
            }
        }

        let active_idx: Vec<usize> = (0..samples.len()).filter(|i| active[*i]).collect();

        let affected_members = groups.get("affected").cloned().unwrap_or_default();
        let not_affected_members = groups.get("not_affected").cloned().unwrap_or_default();
        let affected_idx: Vec<usize> = affected_members
            .iter()
            .filter_map(|n| name_to_idx.get(n).copied())
            .collect();
        let not_affected_idx: Vec<usize> = not_affected_members
            .iter()
            .filter_map(|n| name_to_idx.get(n).copied())
            .collect();

        Ok(Self {
            samples,
            groups,
            active,
            active_idx,
            affected_idx,
            not_affected_idx,
            name_to_idx,
        })
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn active_idx(&self) -> &[usize] {
        &self.active_idx
    }

    pub fn affected_idx(&self) -> &[usize] {
        &self.affected_idx
    }

    pub fn not_affected_idx(&self) -> &[usize] {
        &self.not_affected_idx
    }

    pub fn is_active(&self, idx: usize) -> bool {
        self.active.get(idx).copied().unwrap_or(false)
    }

    pub fn group(&self, name: &str) -> Option<&[String]> {
        self.groups.get(name).map(|v| v.as_slice())
    }

    /// Position of a sample by name, optionally restricted to the active
    /// subset (in which case the returned index is into `active_idx`, not
    /// the full selection).
    pub fn idx_of(&self, name: &str, active_only: bool) -> Option<usize> {
        let idx = *self.name_to_idx.get(name)?;
        if active_only {
            self.active_idx.iter().position(|&i| i == idx)
        } else {
            Some(idx)
        }
    }

    fn mother_idx(&self, idx: usize) -> Option<usize> {
        let name = self.samples[idx].mother_name.as_deref()?;
        self.name_to_idx.get(name).copied()
    }

    fn father_idx(&self, idx: usize) -> Option<usize> {
        let name = self.samples[idx].father_name.as_deref()?;
        self.name_to_idx.get(name).copied()
    }

    /// Position of a full-selection index within `active_idx`, if active.
    pub fn active_position_of(&self, idx: usize) -> Option<usize> {
        self.active_idx.iter().position(|&i| i == idx)
    }

    /// Active-subset positions of `idx`'s parents, restricted to parents who
    /// are themselves active. Returns `(father, mother)`, each `None` if
    /// absent or inactive.
    pub fn parents_idx_of(&self, idx: usize) -> (Option<usize>, Option<usize>) {
        let father = self
            .father_idx(idx)
            .filter(|&p| self.is_active(p))
            .and_then(|p| self.active_idx.iter().position(|&i| i == p));
        let mother = self
            .mother_idx(idx)
            .filter(|&p| self.is_active(p))
            .and_then(|p| self.active_idx.iter().position(|&i| i == p));
        (father, mother)
    }

    /// Sex of the sample at the given full-selection index.
    pub fn sex_of(&self, idx: usize) -> Sex {
        self.samples[idx].sex
    }

    /// A stable hash over the sorted `(name, group, active)` triples,
    /// invariant under permutation of the input sample list (property 7).
    pub fn cache_key(&self) -> u64 {
        let mut triples: Vec<(String, String, bool)> = Vec::new();
        for (idx, s) in self.samples.iter().enumerate() {
            let mut groups_for_sample: Vec<&str> = self
                .groups
                .iter()
                .filter(|(_, members)| members.iter().any(|m| m == &s.name))
                .map(|(g, _)| g.as_str())
                .collect();
            groups_for_sample.sort_unstable();
            let group_label = groups_for_sample.join(",");
            triples.push((s.name.clone(), group_label, self.is_active(idx)));
        }
        triples.sort_unstable();

        let mut hasher = DefaultHasher::new();
        triples.hash(&mut hasher);
        hasher.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn sample(name: &str, mother: Option<&str>, father: Option<&str>, sex: Sex) -> Sample {
        Sample {
            name: name.to_string(),
            sample_id: 0,
            family_id: Some("FAM".to_string()),
            mother_name: mother.map(str::to_string),
            father_name: father.map(str::to_string),
            sex,
            affected: false,
        }
    }

    fn trio() -> Vec<Sample> {
        vec![
            sample("mother", None, None, Sex::Female),
            sample("father", None, None, Sex::Male),
            sample("child", Some("mother"), Some("father"), Sex::Male),
        ]
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut samples = trio();
        samples.push(samples[0].clone());
        let groups = HashMap::new();
        let err = SamplesSelection::new(samples, groups).unwrap_err();
        assert!(matches!(err, EngineError::InvalidSelection(_)));
    }

    #[test]
    fn unknown_group_member_is_rejected() {
        let samples = trio();
        let mut groups = HashMap::new();
        groups.insert("affected".to_string(), vec!["nobody".to_string()]);
        let err = SamplesSelection::new(samples, groups).unwrap_err();
        assert!(matches!(err, EngineError::InvalidSelection(_)));
    }

    #[test]
    fn parents_idx_of_resolves_active_parents_only() {
        let samples = trio();
        let mut groups = HashMap::new();
        groups.insert(
            "affected".to_string(),
            vec!["child".to_string(), "father".to_string()],
        );
        groups.insert("not_affected".to_string(), vec!["mother".to_string()]);
        let sel = SamplesSelection::new(samples, groups).unwrap();

        let child_idx = sel.idx_of("child", false).unwrap();
        let (father, mother) = sel.parents_idx_of(child_idx);
        assert!(father.is_some());
        assert!(mother.is_some());
    }

    #[test]
    fn cache_key_is_permutation_invariant() {
        let mut groups = HashMap::new();
        groups.insert("affected".to_string(), vec!["child".to_string()]);

        let forward = SamplesSelection::new(trio(), groups.clone()).unwrap();
        let mut reversed = trio();
        reversed.reverse();
        let backward = SamplesSelection::new(reversed, groups).unwrap();

        assert_eq!(forward.cache_key(), backward.cache_key());
    }
}
