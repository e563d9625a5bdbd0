//! CodeCompass CLI
//!
//! Index a Python repository, search it with one of the retrieval
//! strategies, or ask questions about it.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use codecompass::{
    config::Config,
    llm::{Embedder, LlmClient},
    persistence::index_size,
    rag::{answer_question, format_sources},
    search::RepoSearcher,
    store::{CodeStore, IndexStatus, index_repository},
    strategy::{Strategy, StrategyRunner},
};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

/// CodeCompass - AI-powered repository onboarding assistant
#[derive(Parser)]
#[command(name = "codecompass")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Test command
    Hello,

    /// Index a repository for search
    Index {
        /// Path to repository
        #[arg(default_value = ".")]
        repo: PathBuf,
    },

    /// Show index information for a repository
    Status {
        /// Path to repository
        #[arg(default_value = ".")]
        repo: PathBuf,
    },

    /// Search for code in an indexed repository
    Search {
        /// Search query
        query: String,

        /// Retrieval strategy
        #[arg(short, long, value_enum, default_value_t = Strategy::Baseline)]
        strategy: Strategy,

        /// Path to the repository
        #[arg(short, long, default_value = ".")]
        repo: PathBuf,

        /// Number of results
        #[arg(short = 'n', long, default_value_t = 5)]
        limit: usize,
    },

    /// Ask questions about a repository
    Chat {
        /// Path to repository
        #[arg(default_value = ".")]
        repo: PathBuf,

        /// Code chunks retrieved per question
        #[arg(short = 'n', long, default_value_t = 5)]
        chunks: usize,
    },

    /// Test LLM connection
    Test,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    codecompass::logging::init(cli.verbose);

    match cli.command {
        Commands::Hello => {
            println!("CodeCompass is working!");
            Ok(())
        }
        Commands::Index { repo } => cmd_index(&repo).await,
        Commands::Status { repo } => cmd_status(&repo),
        Commands::Search {
            query,
            strategy,
            repo,
            limit,
        } => cmd_search(&query, strategy, &repo, limit).await,
        Commands::Chat { repo, chunks } => cmd_chat(&repo, chunks).await,
        Commands::Test => cmd_test().await,
    }
}

fn load_config() -> Result<Config> {
    let config = Config::load().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn resolve(repo: &Path) -> Result<PathBuf> {
    repo.canonicalize()
        .with_context(|| format!("Repository path '{}' does not exist", repo.display()))
}

async fn cmd_index(repo: &Path) -> Result<()> {
    let config = load_config()?;
    let repo = resolve(repo)?;

    println!("{} {}", "Indexing:".bold(), repo.display());
    println!("Using embedding model: {}", config.llm.embedding_model);

    let start = Instant::now();
    let client = LlmClient::new(config.llm.clone());
    let count = index_repository(&repo, &config.index, &client, true)
        .await
        .context("Indexing failed")?;

    if count == 0 {
        println!(
            "{}",
            "No chunks found. Please check this is a Python repository.".yellow()
        );
        return Ok(());
    }

    println!("{}", format!("✓ Indexed {} chunks", count).green());
    println!("  Time: {:.2?}", start.elapsed());
    Ok(())
}

fn cmd_status(repo: &Path) -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;
    let repo = resolve(repo)?;
    let store = CodeStore::open(&repo, &config.index)?;

    match store.get_stats()? {
        IndexStatus::NotIndexed => {
            println!("{}", "Repository not indexed.".yellow());
            println!("Run: {}", format!("codecompass index {}", repo.display()).bold());
        }
        IndexStatus::Indexed(meta) => {
            println!("{}", "✓ Repository indexed".green());
            println!("  Path:       {}", meta.repo_path.magenta());
            println!("  Chunks:     {}", meta.chunk_count.to_string().cyan());
            println!("  Indexed at: {}", meta.indexed_at.cyan().bold());
            println!("  Index dir:  {}", store.index_dir().display());
            let size = index_size(&store.chunks_path())?;
            println!("  Index size: {:.1} KB", size as f64 / 1024.0);
            if !meta.imports.is_empty() {
                println!("  Imports:    {}", meta.imports.join(", "));
            }
        }
    }

    Ok(())
}

async fn cmd_search(query: &str, strategy: Strategy, repo: &Path, limit: usize) -> Result<()> {
    let config = load_config()?;
    let repo = resolve(repo)?;

    let client = LlmClient::new(config.llm.clone());
    let searcher = RepoSearcher::open(&repo, &config.index, client.clone())?;
    let runner = StrategyRunner::new(Arc::new(searcher), Arc::new(client));

    let start = Instant::now();
    let output = runner
        .retrieve(strategy, query, limit)
        .await
        .context("Search failed")?;

    if strategy.uses_llm() {
        println!("{} {}", format!("{}:", strategy).dimmed(), output.effective_query.dimmed());
    }

    if output.results.is_empty() {
        println!("{}", "No results found.".yellow());
        return Ok(());
    }

    for r in &output.results {
        println!("\n{} ({})", r.name.blue().bold(), r.chunk_type);
        println!("{}", r.location().dimmed());
        if let Some(doc) = &r.docstring {
            println!("{}", doc.italic());
        }
        println!("Score: {:.4}", r.score);
        println!("{}", "─".repeat(50));
    }
    println!("Found {} results in {:.2?}", output.results.len(), start.elapsed());

    Ok(())
}

async fn cmd_chat(repo: &Path, chunks: usize) -> Result<()> {
    let config = load_config()?;
    let repo = resolve(repo)?;

    let client = LlmClient::new(config.llm.clone());
    let searcher = RepoSearcher::open(&repo, &config.index, client.clone())?;

    println!("{}", "CodeCompass Chat".bold());
    println!("Ask questions about {}. Type 'exit' to quit.\n", repo.display());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let question = line.trim();
        if question.is_empty() || matches!(question, "exit" | "quit") {
            break;
        }

        match answer_question(&searcher, &client, question, chunks).await {
            Ok(answer) => {
                println!("\n{}", answer.text);
                let sources = format_sources(&answer.sources);
                if !sources.is_empty() {
                    println!("{}", sources.dimmed());
                }
                println!();
            }
            Err(e) => println!("{}", format!("Error: {}", e).red()),
        }
    }

    println!("Goodbye!");
    Ok(())
}

async fn cmd_test() -> Result<()> {
    println!("Testing LLM connection...\n");

    let config = Config::load().context("Failed to load configuration")?;

    println!("Configuration:");
    println!("  API Base:        {}", config.llm.api_base);
    println!("  Chat model:      {}", config.llm.chat_model);
    println!("  Embedding model: {}", config.llm.embedding_model);
    println!("  Data dir:        {}", config.index.data_dir.display());
    println!();

    if let Err(e) = config.validate() {
        println!("Configuration error: {}", e);
        return Ok(());
    }

    let client = LlmClient::new(config.llm.clone());

    println!("Sending test chat request...");
    match client.test_connection().await {
        Ok(()) => println!("{}", "Chat: OK".green()),
        Err(e) => println!("{}", format!("Chat failed: {}", e).red()),
    }

    println!("Sending test embedding request...");
    match client.embed("hello world").await {
        Ok(vector) if vector.len() == config.index.embedding_dimensions => {
            println!("{}", format!("Embeddings: OK ({} dims)", vector.len()).green());
        }
        Ok(vector) => println!(
            "{}",
            format!(
                "Embeddings returned {} dims, expected {}",
                vector.len(),
                config.index.embedding_dimensions
            )
            .yellow()
        ),
        Err(e) => println!("{}", format!("Embeddings failed: {}", e).red()),
    }

    Ok(())
}
