//! Retrieval strategies.
//!
//! Every strategy rewrites the user's query (or leaves it alone) and then runs
//! the same hybrid search on the rewritten text.

use crate::error::Result;
use crate::llm::{Prompts, TextGenerator};
use crate::search::{CodeSearch, SearchResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// The retrieval strategies under evaluation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Search with the query as typed.
    Baseline,
    /// Ask the LLM to add related library and decorator names.
    QueryExpansion,
    /// Query expansion steered by the repository's own imports.
    QueryExpansionWithContext,
    /// Search with a hypothetical code snippet written by the LLM.
    Hyde,
}

impl Strategy {
    /// Evaluation order.
    pub const ALL: [Strategy; 4] = [
        Strategy::Baseline,
        Strategy::QueryExpansion,
        Strategy::QueryExpansionWithContext,
        Strategy::Hyde,
    ];

    pub fn display_name(&self) -> &'static str {
        match self {
            Strategy::Baseline => "Baseline",
            Strategy::QueryExpansion => "Query Expansion",
            Strategy::QueryExpansionWithContext => "Query Expansion with Context",
            Strategy::Hyde => "HyDE",
        }
    }

    pub fn uses_llm(&self) -> bool {
        !matches!(self, Strategy::Baseline)
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// What a strategy searched with, and what it found.
#[derive(Debug, Clone)]
pub struct StrategyOutput {
    pub effective_query: String,
    pub results: Vec<SearchResult>,
}

/// Runs strategies against a search backend and a text generator.
#[derive(Clone)]
pub struct StrategyRunner {
    searcher: Arc<dyn CodeSearch>,
    generator: Arc<dyn TextGenerator>,
}

impl StrategyRunner {
    pub fn new(searcher: Arc<dyn CodeSearch>, generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            searcher,
            generator,
        }
    }

    /// The text the search will actually run on.
    pub async fn rewrite_query(&self, strategy: Strategy, query: &str) -> Result<String> {
        let rewritten = match strategy {
            Strategy::Baseline => return Ok(query.to_string()),
            Strategy::QueryExpansion => {
                let answer = self.generator.generate(None, &expansion_prompt(query)).await?;
                clean_expansion(&answer, query)
            }
            Strategy::QueryExpansionWithContext => {
                let imports = self.searcher.repo_imports().await?;
                let answer = self
                    .generator
                    .generate(None, &context_expansion_prompt(query, &imports))
                    .await?;
                clean_expansion(&answer, query)
            }
            Strategy::Hyde => {
                let answer = self.generator.generate(None, &hyde_prompt(query)).await?;
                clean_hypothetical_code(&answer).unwrap_or_else(|| query.to_string())
            }
        };

        debug!("{} rewrote {:?} to {:?}", strategy, query, rewritten);
        Ok(rewritten)
    }

    /// Rewrite `query` with `strategy` and search for up to `limit` results.
    pub async fn retrieve(
        &self,
        strategy: Strategy,
        query: &str,
        limit: usize,
    ) -> Result<StrategyOutput> {
        let effective_query = self.rewrite_query(strategy, query).await?;
        let results = self.searcher.search(&effective_query, limit).await?;
        Ok(StrategyOutput {
            effective_query,
            results,
        })
    }
}

pub fn expansion_prompt(query: &str) -> String {
    Prompts::query_expansion().replace("{query}", query)
}

/// Falls back to plain expansion when the repository has no recorded imports.
pub fn context_expansion_prompt(query: &str, imports: &[String]) -> String {
    if imports.is_empty() {
        return expansion_prompt(query);
    }
    Prompts::query_expansion_with_context()
        .replace("{imports}", &imports.join(", "))
        .replace("{query}", query)
}

pub fn hyde_prompt(query: &str) -> String {
    Prompts::hypothetical_code().replace("{query}", query)
}

/// Trimmed LLM answer, or the original query if the answer is blank.
pub fn clean_expansion(answer: &str, original: &str) -> String {
    let trimmed = answer.trim();
    if trimmed.is_empty() {
        original.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Strip fence lines and make the snippet start like a definition.
/// `None` when nothing but fences came back.
pub fn clean_hypothetical_code(answer: &str) -> Option<String> {
    let code = answer
        .lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n");
    let code = code.trim();

    if code.is_empty() {
        return None;
    }

    let starts_like_definition = ["def ", "async def ", "class ", "@"]
        .iter()
        .any(|prefix| code.starts_with(prefix));

    Some(if starts_like_definition {
        code.to_string()
    } else {
        format!("def {}", code)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedGenerator, StaticSearch};
    use pretty_assertions::assert_eq;

    fn runner(search: StaticSearch, generator: ScriptedGenerator) -> (StrategyRunner, Arc<StaticSearch>, Arc<ScriptedGenerator>) {
        let search = Arc::new(search);
        let generator = Arc::new(generator);
        (
            StrategyRunner::new(search.clone(), generator.clone()),
            search,
            generator,
        )
    }

    #[test]
    fn test_display_names_and_order() {
        let names: Vec<&str> = Strategy::ALL.iter().map(|s| s.display_name()).collect();
        assert_eq!(
            names,
            vec!["Baseline", "Query Expansion", "Query Expansion with Context", "HyDE"]
        );
        assert!(!Strategy::Baseline.uses_llm());
        assert!(Strategy::Hyde.uses_llm());
    }

    #[test]
    fn test_cli_names() {
        use clap::ValueEnum;
        let hyde = Strategy::from_str("hyde", true).unwrap();
        assert_eq!(hyde, Strategy::Hyde);
        let ctx = Strategy::from_str("query-expansion-with-context", true).unwrap();
        assert_eq!(ctx, Strategy::QueryExpansionWithContext);
    }

    #[test]
    fn test_clean_hypothetical_code() {
        assert_eq!(
            clean_hypothetical_code("```python\ndef embed(text):\n    return model(text)\n```"),
            Some("def embed(text):\n    return model(text)".to_string())
        );
        assert_eq!(
            clean_hypothetical_code("embed(text):\n    pass"),
            Some("def embed(text):\n    pass".to_string())
        );
        assert_eq!(
            clean_hypothetical_code("@app.command()\ndef index(): ..."),
            Some("@app.command()\ndef index(): ...".to_string())
        );
        assert_eq!(
            clean_hypothetical_code("async def fetch(): ..."),
            Some("async def fetch(): ...".to_string())
        );
        assert_eq!(clean_hypothetical_code("```\n```"), None);
    }

    #[test]
    fn test_context_prompt_lists_imports() {
        let prompt = context_expansion_prompt(
            "where is the CLI",
            &["lancedb".to_string(), "typer".to_string()],
        );
        assert!(prompt.contains("This codebase uses: lancedb, typer"));
        assert!(prompt.contains("Query: where is the CLI"));
        assert_eq!(context_expansion_prompt("q", &[]), expansion_prompt("q"));
    }

    #[tokio::test]
    async fn test_baseline_skips_llm() {
        let search = StaticSearch::new().answer("chat loop", &["cli.py::chat"]);
        let (runner, search, generator) = runner(search, ScriptedGenerator::failing("offline"));

        let output = runner.retrieve(Strategy::Baseline, "chat loop", 5).await.unwrap();
        assert_eq!(output.effective_query, "chat loop");
        assert_eq!(output.results[0].id, "cli.py::chat");
        assert!(generator.prompts().is_empty());
        assert_eq!(search.queries(), vec!["chat loop"]);
    }

    #[tokio::test]
    async fn test_query_expansion_searches_expanded_text() {
        let (runner, search, generator) = runner(
            StaticSearch::new(),
            ScriptedGenerator::replying("  cli command typer click argparse  \n"),
        );

        let output = runner.retrieve(Strategy::QueryExpansion, "cli command", 5).await.unwrap();
        assert_eq!(output.effective_query, "cli command typer click argparse");
        assert_eq!(search.queries(), vec!["cli command typer click argparse"]);

        let prompts = generator.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].1.contains("Query: cli command"));
    }

    #[tokio::test]
    async fn test_empty_expansion_falls_back() {
        let (runner, _, _) = runner(StaticSearch::new(), ScriptedGenerator::replying("   "));
        let rewritten = runner.rewrite_query(Strategy::QueryExpansion, "embed").await.unwrap();
        assert_eq!(rewritten, "embed");
    }

    #[tokio::test]
    async fn test_context_expansion_uses_repo_imports() {
        let (runner, _, generator) = runner(
            StaticSearch::new().with_imports(&["ollama", "typer"]),
            ScriptedGenerator::replying("embedding ollama"),
        );

        runner
            .rewrite_query(Strategy::QueryExpansionWithContext, "embedding")
            .await
            .unwrap();
        assert!(generator.prompts()[0].1.contains("This codebase uses: ollama, typer"));
    }

    #[tokio::test]
    async fn test_hyde_searches_code() {
        let (runner, search, _) = runner(
            StaticSearch::new(),
            ScriptedGenerator::replying("index_repo(path):\n    return store.index(path)\n```"),
        );

        let output = runner.retrieve(Strategy::Hyde, "index a repo", 3).await.unwrap();
        assert_eq!(
            output.effective_query,
            "def index_repo(path):\n    return store.index(path)"
        );
        assert_eq!(search.queries(), vec![output.effective_query.clone()]);
    }

    #[tokio::test]
    async fn test_llm_failure_propagates() {
        let (runner, search, _) = runner(StaticSearch::new(), ScriptedGenerator::failing("timeout"));
        assert!(runner.retrieve(Strategy::Hyde, "q", 5).await.is_err());
        assert!(search.queries().is_empty());
    }
}
