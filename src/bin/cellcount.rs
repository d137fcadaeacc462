//! cellcount - immune cell-count store and responder analysis CLI

use cellcount_analysis::compare::StatStrategy;
use cellcount_analysis::error::{CellCountError, Result};
use cellcount_analysis::filter::{grouped_counts, SubsetQuery};
use cellcount_analysis::pipeline::{AnalysisConfig, Pipeline};
use cellcount_analysis::store::{SampleStore, SqliteSampleStore};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Test used by the `stats` command.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliStrategy {
    /// Mann-Whitney U, responders vs non-responders
    Rank,
    /// Type II two-factor ANOVA
    Anova,
}

/// Cell-count sample manager and analyzer
#[derive(Parser)]
#[command(name = "cellcount")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the SQLite database
    #[arg(long, global = true, default_value = "data/cell_counts.db")]
    db: PathBuf,

    /// Analysis configuration YAML (defaults are used when omitted)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Cell-type count columns, comma separated
    #[arg(long, global = true, value_delimiter = ',')]
    cell_cols: Vec<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the sample table from a CSV file, replacing any existing one
    Init {
        /// Path to the initial CSV file
        #[arg(long, default_value = "data/cell-count.csv")]
        csv: PathBuf,
    },

    /// Append samples from a CSV file with the same columns
    Add {
        /// Path to the new data
        path: PathBuf,
    },

    /// Remove samples by identifier
    Remove {
        /// Sample identifiers, comma separated
        #[arg(value_delimiter = ',', required = true)]
        ids: Vec<String>,
    },

    /// List the stored columns
    Columns,

    /// Compute relative frequencies per sample
    Frequencies {
        /// Output path for the frequency TSV
        #[arg(short, long, default_value = "frequencies.tsv")]
        output: PathBuf,
    },

    /// Compare responders and non-responders for every cell type
    Stats {
        /// Override the configured test
        #[arg(short, long, value_enum)]
        strategy: Option<CliStrategy>,

        /// Output path for the statistics TSV
        #[arg(short, long, default_value = "statistics.tsv")]
        output: PathBuf,
    },

    /// Build box-plot data annotated with p-values
    Plot {
        /// Output path for the plot JSON
        #[arg(short, long, default_value = "plot.json")]
        output: PathBuf,
    },

    /// Subset samples and count values per group
    Query {
        /// Filter clause `column=value1,value2`; repeat for more columns
        #[arg(short = 'w', long = "where")]
        clauses: Vec<String>,

        /// Columns to group by, comma separated
        #[arg(short, long, value_delimiter = ',', required = true)]
        group_by: Vec<String>,

        /// Columns to count, comma separated
        #[arg(short, long, value_delimiter = ',', required = true)]
        count: Vec<String>,

        /// Output path for the grouped counts TSV
        #[arg(short, long, default_value = "grouped_counts.tsv")]
        output: PathBuf,
    },

    /// Write an example configuration file
    Example {
        /// Output path for the YAML file
        #[arg(default_value = "analysis.yaml")]
        output: PathBuf,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let result = match &cli.command {
        Commands::Init { csv } => cmd_init(&cli.db, csv),
        Commands::Add { path } => cmd_add(&cli.db, path),
        Commands::Remove { ids } => cmd_remove(&cli.db, ids),
        Commands::Columns => cmd_columns(&cli.db),
        Commands::Frequencies { output } => load_config(&cli).and_then(|config| {
            cmd_frequencies(&cli.db, config, output)
        }),
        Commands::Stats { strategy, output } => load_config(&cli).and_then(|config| {
            cmd_stats(&cli.db, config, *strategy, output)
        }),
        Commands::Plot { output } => {
            load_config(&cli).and_then(|config| cmd_plot(&cli.db, config, output))
        }
        Commands::Query {
            clauses,
            group_by,
            count,
            output,
        } => cmd_query(&cli.db, clauses, group_by, count, output),
        Commands::Example { output } => cmd_example(output),
    };

    if let Err(e) = result {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn load_config(cli: &Cli) -> Result<AnalysisConfig> {
    let config = match &cli.config {
        Some(path) => {
            info!(config = %path.display(), "loading analysis configuration");
            AnalysisConfig::from_file(path)?
        }
        None => AnalysisConfig::default(),
    };
    if cli.cell_cols.is_empty() {
        Ok(config)
    } else {
        Ok(config.with_cell_types(&cli.cell_cols))
    }
}

fn open_existing(db: &Path) -> Result<SqliteSampleStore> {
    if !db.exists() {
        return Err(CellCountError::InvalidParameter(format!(
            "Database not found at {}; run `cellcount init` first",
            db.display()
        )));
    }
    SqliteSampleStore::open(db)
}

/// Create the table from a CSV file
fn cmd_init(db: &Path, csv: &Path) -> Result<()> {
    if let Some(parent) = db.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut store = SqliteSampleStore::open(db)?;
    let n = store.create_from_csv(csv)?;
    info!(db = %db.display(), csv = %csv.display(), rows = n, "database initialised");
    Ok(())
}

/// Append samples from a CSV file
fn cmd_add(db: &Path, path: &Path) -> Result<()> {
    let mut store = open_existing(db)?;
    let n = store.append_csv(path)?;
    info!(path = %path.display(), rows = n, "samples added");
    Ok(())
}

/// Remove samples by identifier
fn cmd_remove(db: &Path, ids: &[String]) -> Result<()> {
    let ids: Vec<String> = ids
        .iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    let mut store = open_existing(db)?;
    let removed = store.delete_by_sample_id(&ids)?;
    println!("Removed {} row(s)", removed);
    Ok(())
}

/// Print the stored columns
fn cmd_columns(db: &Path) -> Result<()> {
    let store = open_existing(db)?;
    for column in store.list_columns()? {
        println!("{}", column);
    }
    Ok(())
}

/// Write relative frequencies
fn cmd_frequencies(db: &Path, config: AnalysisConfig, output: &Path) -> Result<()> {
    let samples = open_existing(db)?.read_all()?;
    info!(samples = samples.n_rows(), "computing frequencies");
    let context = Pipeline::new(config).frequencies().run(samples)?;
    let frequencies = context.frequencies()?;

    frequencies.to_tsv(output)?;
    info!(
        records = frequencies.len(),
        samples = frequencies.samples().len(),
        output = %output.display(),
        "frequencies written"
    );
    Ok(())
}

/// Run the group comparison
fn cmd_stats(
    db: &Path,
    mut config: AnalysisConfig,
    strategy: Option<CliStrategy>,
    output: &Path,
) -> Result<()> {
    if let Some(requested) = strategy {
        config.strategy = select_strategy(config.strategy, requested);
    }
    let samples = open_existing(db)?.read_all()?;
    info!(
        strategy = config.strategy.name(),
        cohort = %config.cohort,
        "running statistics"
    );
    let context = Pipeline::new(config).frequencies().statistics().run(samples)?;
    let results = context.results()?;

    results.to_tsv(output)?;
    info!(
        tests = results.len(),
        cohort_records = context.analysis()?.len(),
        output = %output.display(),
        "statistics written"
    );
    print!("{}", results.summary());
    Ok(())
}

/// Switch to the requested test, keeping configured parameters of the same kind
fn select_strategy(configured: StatStrategy, requested: CliStrategy) -> StatStrategy {
    match (requested, configured) {
        (CliStrategy::Rank, kept @ StatStrategy::RankTest { .. }) => kept,
        (CliStrategy::Anova, kept @ StatStrategy::AnovaTest { .. }) => kept,
        (CliStrategy::Rank, _) => StatStrategy::rank_test(),
        (CliStrategy::Anova, _) => StatStrategy::default(),
    }
}

/// Write the plot data as JSON
fn cmd_plot(db: &Path, config: AnalysisConfig, output: &Path) -> Result<()> {
    let samples = open_existing(db)?.read_all()?;
    let context = Pipeline::full(config).run(samples)?;
    let grid = context.plot()?;

    grid.to_json_file(output)?;
    info!(panels = grid.panels.len(), output = %output.display(), "plot data written");
    Ok(())
}

fn parse_clause(clause: &str) -> Result<(String, Vec<String>)> {
    let (column, values) = clause.split_once('=').ok_or_else(|| {
        CellCountError::InvalidParameter(format!(
            "Filter '{}' must look like column=value1,value2",
            clause
        ))
    })?;
    let values = values
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
        .collect();
    Ok((column.trim().to_string(), values))
}

/// Subset the table and count values per group
fn cmd_query(
    db: &Path,
    clauses: &[String],
    group_by: &[String],
    count: &[String],
    output: &Path,
) -> Result<()> {
    let mut query = SubsetQuery::new();
    for clause in clauses {
        let (column, values) = parse_clause(clause)?;
        let values: Vec<&str> = values.iter().map(String::as_str).collect();
        query = query.with(&column, &values);
    }

    let samples = open_existing(db)?.read_all()?;
    let subset = query.apply(&samples)?;
    let grouped = grouped_counts(&subset, group_by, count)?;

    grouped.to_tsv(output)?;
    info!(
        rows = subset.n_rows(),
        groups = grouped.len(),
        output = %output.display(),
        "grouped counts written"
    );
    Ok(())
}

/// Write an example configuration
fn cmd_example(output: &Path) -> Result<()> {
    let config = AnalysisConfig {
        description: Some(
            "Responders vs non-responders among melanoma PBMC samples treated with miraclib"
                .to_string(),
        ),
        ..AnalysisConfig::default()
    };
    std::fs::write(output, config.to_yaml()?)?;
    info!(output = %output.display(), "example configuration written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellcount_analysis::compare::ResponseGroups;

    #[test]
    fn test_select_strategy_keeps_configured_parameters() {
        let custom = StatStrategy::anova("~ response + time_from_treatment_start");
        assert_eq!(select_strategy(custom.clone(), CliStrategy::Anova), custom);

        let groups = ResponseGroups {
            column: "outcome".to_string(),
            responder: "CR".to_string(),
            non_responder: "PD".to_string(),
        };
        let rank = StatStrategy::RankTest { groups };
        assert_eq!(select_strategy(rank.clone(), CliStrategy::Rank), rank);
    }

    #[test]
    fn test_select_strategy_switches_kind() {
        let custom = StatStrategy::anova("~ response + time_from_treatment_start");
        assert_eq!(select_strategy(custom, CliStrategy::Rank), StatStrategy::rank_test());
        assert_eq!(
            select_strategy(StatStrategy::rank_test(), CliStrategy::Anova),
            StatStrategy::default()
        );
    }
}
