//! Genotype filtering engine CLI.

pub mod common;
pub mod engine;
pub mod err;
pub mod model;
pub mod predicate;
pub mod store;

use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::{Args as ClapArgs, Parser, Subcommand};
use console::Term;

use engine::{evaluate, EvaluateRequest, GenotypeScenario};
use model::SamplesSelection;
use predicate::{SortKey, VariantPredicate};
use store::{FileStore, Store};

/// CLI parser based on clap.
#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Cohort genotype filtering engine",
    long_about = "Evaluates pedigree-aware inheritance scenarios against a cohort's genotype matrix"
)]
struct Cli {
    /// Commonly used arguments
    #[command(flatten)]
    common: common::Args,

    /// The sub command to run
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Query-related commands.
    Query(Query),
}

#[derive(Debug, ClapArgs)]
#[command(args_conflicts_with_subcommands = true)]
struct Query {
    #[command(subcommand)]
    command: QueryCommands,
}

#[derive(Debug, Subcommand)]
enum QueryCommands {
    /// Run a case query against a dataset and write the passing variants.
    Run(QueryRunArgs),
}

#[derive(Debug, ClapArgs)]
struct QueryRunArgs {
    /// Directory containing one subdirectory per dataset.
    #[arg(long)]
    dataset_root: PathBuf,
    /// Dataset identifier (subdirectory name under `dataset_root`).
    #[arg(long)]
    dataset_id: String,
    /// Path to a JSON file describing the case query.
    #[arg(long)]
    query: PathBuf,
    /// Path to write the resulting TSV of passing variants.
    #[arg(long)]
    output: PathBuf,
    /// Cap the number of hydrated result rows.
    #[arg(long)]
    limit: Option<usize>,
    /// Abort the query if it has not finished within this many seconds.
    #[arg(long)]
    deadline_secs: Option<u64>,
}

/// The case query JSON shape: the named groups (e.g.
/// "affected"/"not_affected") to apply on top of the dataset's own pedigree,
/// the genotype scenario, and the variant-attribute predicates, sort key
/// and direction to push to the store. The pedigree itself always comes
/// from the dataset (`samples.tsv`), never from the query: a selection is
/// built from the store's sample order so it lines up with the genotype
/// matrix's columns.
#[derive(Debug, serde::Deserialize)]
struct CaseQuery {
    groups: HashMap<String, Vec<String>>,
    #[serde(default)]
    genotype_scenario: Option<GenotypeScenario>,
    #[serde(default)]
    variant_filters: Vec<VariantPredicate>,
    #[serde(default)]
    sort_key: SortKey,
    #[serde(default)]
    reverse: bool,
}

fn run_query(args: &QueryRunArgs) -> Result<(), anyhow::Error> {
    let query_text = std::fs::read_to_string(&args.query)
        .map_err(|e| anyhow::anyhow!("reading query file {:?}: {}", args.query, e))?;
    let case_query: CaseQuery = serde_json::from_str(&query_text)
        .map_err(|e| anyhow::anyhow!("parsing query file {:?}: {}", args.query, e))?;

    tracing::info!(
        dataset_id = %args.dataset_id,
        scenario = ?case_query.genotype_scenario,
        "starting query evaluation"
    );
    common::trace_rss_now();

    let store = FileStore::new(&args.dataset_root);
    let cache = store.dataset(&args.dataset_id)?;
    let selection = SamplesSelection::new(cache.samples.clone(), case_query.groups)?;

    let mut request = EvaluateRequest::new(
        args.dataset_id.clone(),
        selection,
        case_query.variant_filters,
        case_query.genotype_scenario,
        case_query.sort_key,
        case_query.reverse,
        args.limit,
        0,
    );
    request.deadline = args
        .deadline_secs
        .map(|secs| Instant::now() + Duration::from_secs(secs));

    let result = evaluate(&store, request)?;
    tracing::info!(
        n_filtered = result.n_filtered,
        n_hydrated = result.variants.len(),
        "query evaluation complete"
    );
    common::trace_rss_now();

    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_path(&args.output)
        .map_err(|e| anyhow::anyhow!("opening output file {:?}: {}", args.output, e))?;
    writer.write_record([
        "variant_id",
        "chrom",
        "start",
        "end",
        "gene_symbol",
        "provenance",
    ])?;
    for v in &result.variants {
        let provenance = result
            .provenance
            .get(&v.variant_id)
            .map(|p| format!("{p:?}"))
            .unwrap_or_default();
        writer.write_record([
            v.variant_id.to_string(),
            v.chrom.clone(),
            v.start.to_string(),
            v.end.to_string(),
            v.gene_symbol.clone(),
            provenance,
        ])?;
    }
    writer.flush()?;

    Ok(())
}

fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(cli.common.verbose.tracing_level_filter())
        .init();

    let term = Term::stderr();
    match &cli.command {
        Commands::Query(query) => match &query.command {
            QueryCommands::Run(args) => run_query(args)?,
        },
    }
    writeln!(term.clone(), "done")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_dataset(dir: &std::path::Path) {
        std::fs::write(
            dir.join("samples.tsv"),
            "name\tsample_id\tfamily_id\tmother_name\tfather_name\tsex\taffected\n\
             M\t1\tFAM\t\t\tF\t0\n\
             F\t2\tFAM\t\t\tM\t0\n\
             C1\t3\tFAM\tM\tF\tM\t1\n",
        )
        .unwrap();
        std::fs::write(
            dir.join("variants.tsv"),
            "variant_id\tchrom\tstart\tend\tgene_symbol\ttranscript\tquality\timpact\timpact_severity\tin_dbsnp\taaf_1kg_all\taaf_esp_all\taaf_exac_all\n\
             1\t1\t100\t101\tGENE\tENST1\t30\tmissense_variant\tMED\t0\t\t\t\n",
        )
        .unwrap();
        std::fs::write(dir.join("genotypes.tsv"), "0/1\t0/0\t0/1\n").unwrap();
    }

    #[test]
    #[tracing_test::traced_test]
    fn run_query_end_to_end_smoke() {
        let tmp = TempDir::new().unwrap();
        let dataset_dir = tmp.path().join("ds1");
        std::fs::create_dir_all(&dataset_dir).unwrap();
        write_dataset(&dataset_dir);

        let query_path = tmp.path().join("query.json");
        std::fs::write(
            &query_path,
            serde_json::json!({
                "groups": {"affected": ["C1"], "not_affected": ["M", "F"]},
                "genotype_scenario": "active",
            })
            .to_string(),
        )
        .unwrap();

        let output_path = tmp.path().join("out.tsv");
        let args = QueryRunArgs {
            dataset_root: tmp.path().to_path_buf(),
            dataset_id: "ds1".to_string(),
            query: query_path,
            output: output_path.clone(),
            limit: None,
            deadline_secs: None,
        };

        run_query(&args).unwrap();
        let contents = std::fs::read_to_string(&output_path).unwrap();
        assert!(contents.contains("GENE"));
    }
}
