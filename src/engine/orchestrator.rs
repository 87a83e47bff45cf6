//! Filter pipeline orchestrator (C8).
//!
//! Grounded on `original_source/varapp/filters/filters.py`
//! (`FiltersCollection.apply()`): push variant-attribute predicates to the
//! store first, compile and run the genotype filter, intersect via packed
//! bitmasks, prune compound-het pairs, then hydrate and paginate.

use std::collections::HashSet;
use std::time::Instant;

use crate::engine::cancel::{self, CancellationToken};
use crate::engine::compound;
use crate::engine::condition::{self, Compiled, GenotypeScenario};
use crate::engine::packed;
use crate::engine::scanner;
use crate::err::EngineError;
use crate::model::{FilterResult, SamplesSelection, VariantId};
use crate::predicate::{paginate, SortKey, VariantPredicate};
use crate::store::Store;

/// One `evaluate` request: a dataset, the pedigree-aware selection to test
/// scenarios against, variant-attribute predicates to push to the store,
/// an optional genotype scenario, ordering/pagination controls, and the
/// cancellation/deadline controls for the request (§4.5/§5).
pub struct EvaluateRequest {
    pub dataset_id: String,
    pub selection: SamplesSelection,
    pub variant_filters: Vec<VariantPredicate>,
    pub genotype_filter: Option<GenotypeScenario>,
    pub sort_key: SortKey,
    pub reverse: bool,
    pub limit: Option<usize>,
    pub offset: usize,
    /// Shared cancellation flag; a caller holding a clone can cancel the
    /// request from another thread. Defaults to a fresh, unset token.
    pub cancel: CancellationToken,
    /// Wall-clock deadline for the whole request, checked at each pipeline
    /// step boundary. `None` means no deadline.
    pub deadline: Option<Instant>,
}

impl EvaluateRequest {
    /// Build a request with a fresh cancellation token and no deadline.
    pub fn new(
        dataset_id: String,
        selection: SamplesSelection,
        variant_filters: Vec<VariantPredicate>,
        genotype_filter: Option<GenotypeScenario>,
        sort_key: SortKey,
        reverse: bool,
        limit: Option<usize>,
        offset: usize,
    ) -> Self {
        Self {
            dataset_id,
            selection,
            variant_filters,
            genotype_filter,
            sort_key,
            reverse,
            limit,
            offset,
            cancel: cancel::new_token(),
            deadline: None,
        }
    }
}

/// Run one request against `store`. See §4.8 for the full procedure this
/// implements.
pub fn evaluate(store: &dyn Store, request: EvaluateRequest) -> Result<FilterResult, EngineError> {
    cancel::check_deadline(&request.cancel, request.deadline)?;
    let cache = store.dataset(&request.dataset_id)?;

    // Step 1: push variant-attribute predicates and the sort key to the
    // store. The stub always does this (rather than only when predicates or
    // a custom sort are present); a real store would skip it in the common
    // case of "no predicates, default sort" per the §4.8 step 7 note.
    let rows = store.query_variants(
        &request.dataset_id,
        &request.variant_filters,
        &request.sort_key,
        request.reverse,
    )?;
    cancel::check_deadline(&request.cancel, request.deadline)?;

    let Some(scenario) = request.genotype_filter else {
        // Step 2: no genotype filter, paginate directly.
        let n_filtered = rows.len();
        let mut ids: Vec<VariantId> = rows.iter().map(|v| v.variant_id).collect();
        ids.sort_unstable();
        let page = paginate(&rows, request.offset, request.limit);
        return Ok(FilterResult {
            ids,
            n_filtered,
            variants: page,
            provenance: Default::default(),
        });
    };

    // Step 3-6: compile/run the genotype filter.
    let (genotype_ids, provenance, pairs) = if scenario == GenotypeScenario::CompoundHet {
        let result = compound::run(
            &cache.matrix,
            &request.selection,
            &cache.gene_index,
            &request.cancel,
        )?;
        (result.ids, result.provenance, result.pairs)
    } else {
        match condition::compile(scenario, &request.selection) {
            Compiled::Impossible => return Ok(FilterResult::empty()),
            Compiled::Vector(cond) => {
                let candidates = if cond.restrict_chr_x {
                    Some(cache.chrx_ids.as_slice())
                } else {
                    None
                };
                let ids = scanner::scan(
                    &cache.matrix,
                    request.selection.active_idx(),
                    &cond,
                    candidates,
                    &request.cancel,
                )?;
                (ids, Default::default(), Vec::new())
            }
        }
    };
    cancel::check_deadline(&request.cancel, request.deadline)?;

    if genotype_ids.is_empty() {
        return Ok(FilterResult::empty());
    }

    // Step 7-8: intersect with the store-pushed candidate set via packed
    // bitmasks.
    let mut store_ids: Vec<VariantId> = rows.iter().map(|v| v.variant_id).collect();
    store_ids.sort_unstable();
    let mut result_ids = packed::intersect(&genotype_ids, &store_ids);

    // Step 9: compound-het post-intersection pair pruning. A variant whose
    // gene-pair partner did not survive the intersection is removed too.
    if scenario == GenotypeScenario::CompoundHet && !pairs.is_empty() {
        let surviving: HashSet<VariantId> = result_ids.iter().copied().collect();
        let keep: HashSet<VariantId> = pairs
            .iter()
            .filter(|(a, b)| surviving.contains(a) && surviving.contains(b))
            .flat_map(|(a, b)| [*a, *b])
            .collect();
        result_ids.retain(|id| keep.contains(id));
    }

    let n_filtered = result_ids.len();

    // Step 10: hydrate the requested page in the store's sort order, attach
    // provenance.
    let keep: HashSet<VariantId> = result_ids.iter().copied().collect();
    let ordered_variants: Vec<_> = rows.into_iter().filter(|v| keep.contains(&v.variant_id)).collect();
    let page = paginate(&ordered_variants, request.offset, request.limit);

    Ok(FilterResult {
        ids: result_ids,
        n_filtered,
        variants: page,
        provenance,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Sample, Sex};
    use crate::store::DatasetCache;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::sync::Arc;

    struct FixtureStore(Arc<DatasetCache>);

    impl Store for FixtureStore {
        fn dataset(&self, _dataset_id: &str) -> Result<Arc<DatasetCache>, EngineError> {
            Ok(Arc::clone(&self.0))
        }
    }

    fn sample(name: &str, mother: Option<&str>, father: Option<&str>, sex: Sex) -> Sample {
        Sample {
            name: name.to_string(),
            sample_id: 0,
            family_id: Some("FAM".into()),
            mother_name: mother.map(str::to_string),
            father_name: father.map(str::to_string),
            sex,
            affected: false,
        }
    }

    fn variant(id: VariantId, chrom: &str, gene: &str) -> crate::model::Variant {
        crate::model::Variant {
            variant_id: id,
            chrom: chrom.to_string(),
            start: 100 * id,
            end: 100 * id + 1,
            gene_symbol: gene.to_string(),
            transcript: "ENST1".into(),
            quality: None,
            impact: "missense_variant".into(),
            impact_severity: "MED".into(),
            in_dbsnp: false,
            aaf_1kg_all: None,
            aaf_esp_all: None,
            aaf_exac_all: None,
        }
    }

    // columns: M, F, C1(Sasha), C2(Dasha), C3(Lesha), L(Lena)
    fn family() -> Vec<Sample> {
        vec![
            sample("M", None, None, Sex::Female),
            sample("F", None, None, Sex::Male),
            sample("C1", Some("M"), Some("F"), Sex::Male),
            sample("C2", Some("M"), Some("F"), Sex::Female),
            sample("C3", Some("M"), Some("F"), Sex::Male),
            sample("L", None, None, Sex::Female),
        ]
    }

    fn selection(affected: &[&str], not_affected: &[&str]) -> SamplesSelection {
        let mut groups = HashMap::new();
        groups.insert(
            "affected".to_string(),
            affected.iter().map(|s| s.to_string()).collect(),
        );
        groups.insert(
            "not_affected".to_string(),
            not_affected.iter().map(|s| s.to_string()).collect(),
        );
        SamplesSelection::new(family(), groups).unwrap()
    }

    fn fixture(rows: Vec<u8>, variants: Vec<crate::model::Variant>) -> FixtureStore {
        let matrix = crate::model::GenotypeMatrix::from_rows(rows, 6).unwrap();
        let mut gene_index: HashMap<String, Vec<VariantId>> = HashMap::new();
        let mut chrx_ids = Vec::new();
        for v in &variants {
            gene_index.entry(v.gene_symbol.clone()).or_default().push(v.variant_id);
            if crate::common::is_chr_x(&v.chrom) {
                chrx_ids.push(v.variant_id);
            }
        }
        FixtureStore(Arc::new(DatasetCache {
            samples: family(),
            variants,
            matrix,
            gene_index,
            chrx_ids,
        }))
    }

    #[test]
    fn s1_dominant() {
        let store = fixture(
            vec![
                2, 1, 2, 2, 1, 1, // r1 excluded: F not carrier
                1, 2, 2, 2, 1, 1, // r2 included
                1, 2, 2, 1, 1, 1, // r3 excluded: C2 not carrier
                1, 2, 2, 2, 2, 1, // r4 excluded: C3 carrier
            ],
            vec![
                variant(1, "1", "G"),
                variant(2, "1", "G"),
                variant(3, "1", "G"),
                variant(4, "1", "G"),
            ],
        );
        let sel = selection(&["F", "C1", "C2"], &["M", "L", "C3"]);
        let result = evaluate(
            &store,
            EvaluateRequest::new(
                "ds".into(),
                sel,
                vec![],
                Some(GenotypeScenario::Dominant),
                SortKey::Default,
                false,
                None,
                0,
            ),
        )
        .unwrap();
        assert_eq!(result.ids, vec![2]);
    }

    #[test]
    fn s2_recessive() {
        let store = fixture(
            vec![
                2, 1, 4, 2, 1, 1, // excluded: F must carry
                2, 2, 4, 2, 1, 1, // excluded: C2 not hom
                2, 2, 4, 4, 1, 1, // included
                2, 2, 4, 4, 4, 1, // excluded: C3 hom
            ],
            vec![
                variant(1, "1", "G"),
                variant(2, "1", "G"),
                variant(3, "1", "G"),
                variant(4, "1", "G"),
            ],
        );
        let sel = selection(&["C1", "C2"], &["M", "F", "L", "C3"]);
        let result = evaluate(
            &store,
            EvaluateRequest::new(
                "ds".into(),
                sel,
                vec![],
                Some(GenotypeScenario::Recessive),
                SortKey::Default,
                false,
                None,
                0,
            ),
        )
        .unwrap();
        assert_eq!(result.ids, vec![3]);
    }

    #[test]
    fn s3_de_novo() {
        let store = fixture(
            vec![
                2, 1, 2, 2, 1, 1, // excluded: M carrier
                1, 2, 2, 2, 1, 1, // excluded: F carrier
                1, 1, 2, 2, 1, 1, // included
                1, 1, 2, 2, 1, 2, // excluded: L carrier
            ],
            vec![
                variant(1, "1", "G"),
                variant(2, "1", "G"),
                variant(3, "1", "G"),
                variant(4, "1", "G"),
            ],
        );
        let sel = selection(&["C1", "C2"], &["M", "F", "L", "C3"]);
        let result = evaluate(
            &store,
            EvaluateRequest::new(
                "ds".into(),
                sel,
                vec![],
                Some(GenotypeScenario::DeNovo),
                SortKey::Default,
                false,
                None,
                0,
            ),
        )
        .unwrap();
        assert_eq!(result.ids, vec![3]);
    }

    #[test]
    fn s4_x_linked_recessive_restricts_to_chrx() {
        let store = fixture(
            vec![
                2, 2, 2, 4, 1, 1, // on chrX: included
                2, 2, 2, 4, 1, 1, // identical row but autosomal: excluded
            ],
            vec![variant(1, "X", "G"), variant(2, "1", "G")],
        );
        let sel = selection(&["F", "C1", "C2"], &["M", "L", "C3"]);
        let result = evaluate(
            &store,
            EvaluateRequest::new(
                "ds".into(),
                sel,
                vec![],
                Some(GenotypeScenario::XLinked),
                SortKey::Default,
                false,
                None,
                0,
            ),
        )
        .unwrap();
        assert_eq!(result.ids, vec![1]);
    }

    #[test]
    fn de_novo_impossible_without_qualifying_child_is_empty() {
        let store = fixture(vec![2, 2, 2, 2, 2, 2], vec![variant(1, "1", "G")]);
        let sel = selection(&["M"], &["F", "C1", "C2", "C3", "L"]);
        let result = evaluate(
            &store,
            EvaluateRequest::new(
                "ds".into(),
                sel,
                vec![],
                Some(GenotypeScenario::DeNovo),
                SortKey::Default,
                false,
                None,
                0,
            ),
        )
        .unwrap();
        assert!(result.ids.is_empty());
    }

    #[test]
    fn pre_raised_cancellation_token_is_observed_before_any_work() {
        let store = fixture(vec![2, 2, 2, 2, 2, 2], vec![variant(1, "1", "G")]);
        let sel = selection(&["F", "C1", "C2"], &["M", "L", "C3"]);
        let mut request = EvaluateRequest::new(
            "ds".into(),
            sel,
            vec![],
            Some(GenotypeScenario::Dominant),
            SortKey::Default,
            false,
            None,
            0,
        );
        request
            .cancel
            .store(true, std::sync::atomic::Ordering::Relaxed);
        let result = evaluate(&store, request);
        assert!(matches!(result, Err(EngineError::Cancelled)));
    }

    #[test]
    fn elapsed_deadline_is_observed_before_any_work() {
        let store = fixture(vec![2, 2, 2, 2, 2, 2], vec![variant(1, "1", "G")]);
        let sel = selection(&["F", "C1", "C2"], &["M", "L", "C3"]);
        let mut request = EvaluateRequest::new(
            "ds".into(),
            sel,
            vec![],
            Some(GenotypeScenario::Dominant),
            SortKey::Default,
            false,
            None,
            0,
        );
        request.deadline = Some(std::time::Instant::now() - std::time::Duration::from_secs(1));
        let result = evaluate(&store, request);
        assert!(matches!(result, Err(EngineError::Cancelled)));
    }
}
