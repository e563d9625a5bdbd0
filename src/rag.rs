//! Question answering over retrieved code.

use crate::error::Result;
use crate::llm::{Prompts, TextGenerator};
use crate::search::{CodeSearch, SearchResult};
use tracing::debug;

/// Reply used when retrieval finds nothing.
pub const NO_RESULTS_ANSWER: &str = "No relevant code found for your question.";

/// An answer together with the code it was based on.
#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<SearchResult>,
}

/// Retrieve `num_chunks` results for `question` and ask the LLM about them.
pub async fn answer_question(
    searcher: &dyn CodeSearch,
    generator: &dyn TextGenerator,
    question: &str,
    num_chunks: usize,
) -> Result<Answer> {
    let sources = searcher.search(question, num_chunks).await?;
    if sources.is_empty() {
        return Ok(Answer {
            text: NO_RESULTS_ANSWER.to_string(),
            sources,
        });
    }

    let prompt = render_prompt(&build_context(&sources), question);
    debug!("Answering with {} chunks of context", sources.len());

    let text = generator
        .generate(Some(Prompts::system_code_assistant()), &prompt)
        .await?;

    Ok(Answer { text, sources })
}

/// Fill the answer template in one pass; inserted text is never rescanned.
fn render_prompt(context: &str, question: &str) -> String {
    let template = Prompts::rag_answer();
    let (head, tail) = template.split_once("{context}").unwrap_or((template, ""));
    format!("{}{}{}", head, context, tail.replace("{question}", question))
}

/// One markdown section per result, numbered from 1.
pub fn build_context(results: &[SearchResult]) -> String {
    results
        .iter()
        .enumerate()
        .map(|(i, r)| {
            format!(
                "\n### Result {}: {} ({})\n**File:** {} (lines {}-{})\n```python\n{}\n```\n",
                i + 1,
                r.name,
                r.chunk_type,
                r.file_path,
                r.start_line,
                r.end_line,
                r.code
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Bullet list of `path:line - name`, empty when there are no sources.
pub fn format_sources(results: &[SearchResult]) -> String {
    if results.is_empty() {
        return String::new();
    }

    let mut lines = vec!["\n📚 Sources:".to_string()];
    for r in results {
        lines.push(format!("  • {}:{} - {}", r.file_path, r.start_line, r.name));
    }
    lines.join("\n")
}
