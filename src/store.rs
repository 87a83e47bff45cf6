//! The external `Store` contract and a minimal file-backed implementation.
//!
//! The real persistence layer (a read-mostly tabular store of variants,
//! samples, pedigree, and annotations) is out of scope per the design; this
//! module provides just enough of a collaborator to run the engine end to
//! end, loading three flat TSV files per dataset. Caching of the genotype
//! matrix and its derived indices follows the "build once, cache, reuse"
//! idiom of `original_source/varapp/variants/genotypes_service.py`'s
//! `genotypes_service(db)` factory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use crate::err::EngineError;
use crate::model::{encode, GenotypeMatrix, RawCall, Sample, Sex, Variant, VariantId};
use crate::predicate::{SortKey, VariantPredicate};

/// Everything the engine needs from one dataset, built once and shared
/// read-only thereafter.
pub struct DatasetCache {
    pub samples: Vec<Sample>,
    pub variants: Vec<Variant>,
    pub matrix: GenotypeMatrix,
    pub gene_index: HashMap<String, Vec<VariantId>>,
    pub chrx_ids: Vec<VariantId>,
}

/// The collaborator the engine queries for everything it does not compute
/// itself.
pub trait Store: Send + Sync {
    fn dataset(&self, dataset_id: &str) -> Result<Arc<DatasetCache>, EngineError>;

    /// Push variant-attribute predicates and a sort key down to the store,
    /// returning the ascending-by-id-after-sort variant rows. The default
    /// implementation filters and sorts the full dataset in memory, which
    /// is adequate for the file-backed stub; a real store would push this
    /// into SQL.
    fn query_variants(
        &self,
        dataset_id: &str,
        predicates: &[VariantPredicate],
        sort_key: &SortKey,
        reverse: bool,
    ) -> Result<Vec<Variant>, EngineError> {
        let cache = self.dataset(dataset_id)?;
        let mut rows: Vec<Variant> = cache
            .variants
            .iter()
            .filter(|v| predicates.iter().all(|p| p.matches(v)))
            .cloned()
            .collect();
        crate::predicate::sort(&mut rows, sort_key, reverse);
        Ok(rows)
    }
}

/// A file-backed store over a directory of one subdirectory per dataset,
/// each holding `samples.tsv`, `genotypes.tsv`, and `variants.tsv`.
pub struct FileStore {
    root: PathBuf,
    cache: RwLock<HashMap<String, Arc<DatasetCache>>>,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    fn load(&self, dataset_id: &str) -> Result<DatasetCache, EngineError> {
        let dir = self.root.join(dataset_id);
        let samples = load_samples(&dir.join("samples.tsv"))?;
        let variants = load_variants(&dir.join("variants.tsv"))?;
        let matrix = load_genotypes(&dir.join("genotypes.tsv"), samples.len())?;

        if matrix.n_variants() != variants.len() {
            return Err(EngineError::IntegrityError(format!(
                "genotype matrix has {} rows but variants.tsv has {} entries",
                matrix.n_variants(),
                variants.len()
            )));
        }

        let mut gene_index: HashMap<String, Vec<VariantId>> = HashMap::new();
        let mut chrx_ids = Vec::new();
        for v in &variants {
            gene_index
                .entry(v.gene_symbol.clone())
                .or_default()
                .push(v.variant_id);
            if crate::common::is_chr_x(&v.chrom) {
                chrx_ids.push(v.variant_id);
            }
        }
        for ids in gene_index.values_mut() {
            ids.sort_unstable();
        }
        chrx_ids.sort_unstable();

        Ok(DatasetCache {
            samples,
            variants,
            matrix,
            gene_index,
            chrx_ids,
        })
    }
}

impl Store for FileStore {
    fn dataset(&self, dataset_id: &str) -> Result<Arc<DatasetCache>, EngineError> {
        if let Some(cached) = self.cache.read().unwrap().get(dataset_id) {
            return Ok(Arc::clone(cached));
        }
        let mut guard = self.cache.write().unwrap();
        if let Some(cached) = guard.get(dataset_id) {
            return Ok(Arc::clone(cached));
        }
        let built = Arc::new(self.load(dataset_id)?);
        guard.insert(dataset_id.to_string(), Arc::clone(&built));
        Ok(built)
    }
}

fn load_samples(path: &Path) -> Result<Vec<Sample>, EngineError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .from_path(path)
        .map_err(|e| EngineError::StoreUnavailable(format!("{}: {}", path.display(), e)))?;

    let mut samples = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record =
            record.map_err(|e| EngineError::IntegrityError(format!("samples.tsv: {e}")))?;
        let name = record.get(0).unwrap_or_default().to_string();
        let sample_id = record.get(1).unwrap_or_default().parse().unwrap_or(i as u32);
        let family_id = non_empty(record.get(2));
        let mother_name = non_empty(record.get(3));
        let father_name = non_empty(record.get(4));
        let sex = match record.get(5).unwrap_or_default() {
            "M" | "male" => Sex::Male,
            "F" | "female" => Sex::Female,
            _ => Sex::Unknown,
        };
        let affected = record.get(6).unwrap_or_default() == "1";
        samples.push(Sample {
            name,
            sample_id,
            family_id,
            mother_name,
            father_name,
            sex,
            affected,
        });
    }
    Ok(samples)
}

fn non_empty(field: Option<&str>) -> Option<String> {
    field.filter(|s| !s.is_empty()).map(str::to_string)
}

fn non_empty_f32(field: Option<&str>) -> Option<f32> {
    field.filter(|s| !s.is_empty()).and_then(|s| s.parse().ok())
}

fn load_variants(path: &Path) -> Result<Vec<Variant>, EngineError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .from_path(path)
        .map_err(|e| EngineError::StoreUnavailable(format!("{}: {}", path.display(), e)))?;

    let mut variants = Vec::new();
    for record in reader.records() {
        let record =
            record.map_err(|e| EngineError::IntegrityError(format!("variants.tsv: {e}")))?;
        variants.push(Variant {
            variant_id: record
                .get(0)
                .unwrap_or_default()
                .parse()
                .map_err(|e| EngineError::IntegrityError(format!("variant_id: {e}")))?,
            chrom: record.get(1).unwrap_or_default().to_string(),
            start: record.get(2).unwrap_or_default().parse().unwrap_or(0),
            end: record.get(3).unwrap_or_default().parse().unwrap_or(0),
            gene_symbol: record.get(4).unwrap_or_default().to_string(),
            transcript: record.get(5).unwrap_or_default().to_string(),
            quality: non_empty_f32(record.get(6)),
            impact: record.get(7).unwrap_or_default().to_string(),
            impact_severity: record.get(8).unwrap_or_default().to_string(),
            in_dbsnp: record.get(9).unwrap_or_default() == "1",
            aaf_1kg_all: non_empty_f32(record.get(10)),
            aaf_esp_all: non_empty_f32(record.get(11)),
            aaf_exac_all: non_empty_f32(record.get(12)),
        });
    }
    variants.sort_by_key(|v| v.variant_id);
    Ok(variants)
}

fn load_genotypes(path: &Path, n_samples: usize) -> Result<GenotypeMatrix, EngineError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .from_path(path)
        .map_err(|e| EngineError::StoreUnavailable(format!("{}: {}", path.display(), e)))?;

    let mut cells = Vec::new();
    for record in reader.records() {
        let record =
            record.map_err(|e| EngineError::IntegrityError(format!("genotypes.tsv: {e}")))?;
        if record.len() != n_samples {
            return Err(EngineError::IntegrityError(format!(
                "genotypes.tsv row has {} columns, expected {}",
                record.len(),
                n_samples
            )));
        }
        for field in record.iter() {
            let raw: RawCall = field
                .parse()
                .map_err(|e| EngineError::IntegrityError(format!("genotypes.tsv: {e}")))?;
            cells.push(encode(raw));
        }
    }
    GenotypeMatrix::from_rows(cells, n_samples)
}
