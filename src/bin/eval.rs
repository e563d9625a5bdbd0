//! Evaluation CLI for comparing retrieval strategies.
//!
//! Usage:
//!   retrieval-eval run [REPO]              # Score all strategies on the built-in queries
//!   retrieval-eval validate [REPO]         # Check expected ids exist in the index
//!   retrieval-eval queries                 # List the query set
//!   retrieval-eval export-queries <PATH>   # Write the built-in set as JSON
//!
//! Options for `run`:
//!   -k <N>                   # Results scored per query (default: 5)
//!   --strategy <S>           # Repeat to pick strategies (default: all)
//!   --queries <PATH>         # Custom query set JSON
//!   --max-queries <N>        # Limit number of queries
//!   --output-dir <DIR>       # Where eval_<timestamp>.json goes
//!   --no-save                # Print only

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use codecompass::config::Config;
use codecompass::eval::{EvalConfig, Evaluator, QuerySet};
use codecompass::llm::LlmClient;
use codecompass::search::RepoSearcher;
use codecompass::store::CodeStore;
use codecompass::strategy::{Strategy, StrategyRunner};
use colored::Colorize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "retrieval-eval")]
#[command(about = "Evaluate code retrieval strategies", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every strategy over the query set and report scores
    Run {
        /// Path to the indexed repository
        #[arg(default_value = ".")]
        repo: PathBuf,

        /// Number of results scored per query
        #[arg(short, default_value_t = 5)]
        k: usize,

        /// Strategies to run (default: all four)
        #[arg(long = "strategy", value_enum)]
        strategies: Vec<Strategy>,

        /// Custom query set JSON file
        #[arg(long)]
        queries: Option<PathBuf>,

        /// Maximum number of queries to evaluate
        #[arg(long)]
        max_queries: Option<usize>,

        /// Directory for the results file
        #[arg(long, default_value = "evaluation/retrieval/results")]
        output_dir: PathBuf,

        /// Do not write a results file
        #[arg(long)]
        no_save: bool,
    },

    /// Report expected chunk ids missing from the repository index
    Validate {
        /// Path to the indexed repository
        #[arg(default_value = ".")]
        repo: PathBuf,

        /// Custom query set JSON file
        #[arg(long)]
        queries: Option<PathBuf>,
    },

    /// List the query set grouped by category
    Queries {
        /// Custom query set JSON file
        #[arg(long)]
        queries: Option<PathBuf>,
    },

    /// Write the built-in query set as JSON
    ExportQueries {
        /// Output file
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    codecompass::logging::init(cli.verbose);

    match cli.command {
        Commands::Run {
            repo,
            k,
            strategies,
            queries,
            max_queries,
            output_dir,
            no_save,
        } => {
            let config = EvalConfig {
                k,
                strategies: if strategies.is_empty() {
                    Strategy::ALL.to_vec()
                } else {
                    strategies
                },
                max_queries,
                verbose: cli.verbose,
            };
            let output_dir = (!no_save).then_some(output_dir);
            run(&repo, queries.as_deref(), config, output_dir.as_deref()).await
        }
        Commands::Validate { repo, queries } => validate(&repo, queries.as_deref()),
        Commands::Queries { queries } => list_queries(queries.as_deref()),
        Commands::ExportQueries { path } => {
            let set = QuerySet::builtin();
            set.save_json(&path)?;
            println!("Wrote {} queries to {:?}", set.len(), path);
            Ok(())
        }
    }
}

fn load_queries(path: Option<&Path>) -> Result<QuerySet> {
    match path {
        Some(path) => QuerySet::load_json(path),
        None => Ok(QuerySet::builtin()),
    }
}

async fn run(
    repo: &Path,
    queries: Option<&Path>,
    config: EvalConfig,
    output_dir: Option<&Path>,
) -> Result<()> {
    anyhow::ensure!(config.k > 0, "-k must be at least 1");

    let settings = Config::load().context("Failed to load configuration")?;
    settings.validate().context("Invalid configuration")?;

    let repo = repo
        .canonicalize()
        .with_context(|| format!("Repository path '{}' does not exist", repo.display()))?;
    let queries = load_queries(queries)?;

    let client = LlmClient::new(settings.llm.clone());
    let searcher = RepoSearcher::open(&repo, &settings.index, client.clone())?;
    let runner = StrategyRunner::new(Arc::new(searcher), Arc::new(client));

    println!("\n{}", "Evaluating Retrieval Strategies".bold());
    println!("Repository:   {}", repo.display());
    println!("Query set:    {} ({} queries)", queries.name, queries.len());
    println!("K:            {}", config.k);
    println!("Chat model:   {}", settings.llm.chat_model);

    let evaluator = Evaluator::new(runner, config);
    let results = evaluator.run(&queries, &repo).await?;

    results.print_summary();
    println!("\nTotal time: {:.1}s", results.total_time_secs);

    if let Some(dir) = output_dir {
        let path = results.save_json(dir)?;
        println!("{}", format!("Results saved to: {}", path.display()).dimmed());
    }

    Ok(())
}

fn validate(repo: &Path, queries: Option<&Path>) -> Result<()> {
    let settings = Config::load().context("Failed to load configuration")?;
    let queries = load_queries(queries)?;

    let store = CodeStore::open(repo, &settings.index)?;
    if !store.is_indexed() {
        anyhow::bail!(
            "Repository not indexed. Run: codecompass index {}",
            store.repo_path().display()
        );
    }

    let ids: HashSet<String> = store.chunk_ids().into_iter().collect();
    println!("Total chunks indexed: {}\n", ids.len());

    let missing = queries.validate_against(&ids);
    if missing.is_empty() {
        println!("{}", "✓ All expected chunk ids exist in index!".green());
        return Ok(());
    }

    println!("{}", "✗ Missing chunk ids:".red());
    for m in &missing {
        println!("  Query:   {}", m.query);
        println!("  Missing: {}\n", m.expected_id);
    }
    anyhow::bail!("{} expected ids are missing from the index", missing.len())
}

fn list_queries(queries: Option<&Path>) -> Result<()> {
    let queries = load_queries(queries)?;
    println!("{} ({} queries)", queries.name.bold(), queries.len());

    for (category, items) in queries.by_category() {
        println!("\n{} ({})", category.to_string().cyan(), items.len());
        for q in items {
            println!("  - {}", q.query);
            if !q.description.is_empty() {
                println!("    {}", q.description.dimmed());
            }
            for id in &q.expected {
                println!("      {}", id);
            }
        }
    }

    Ok(())
}
