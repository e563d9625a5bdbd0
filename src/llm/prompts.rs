//! LLM prompts for query rewriting and question answering.

/// Collection of prompts used by the retrieval strategies and the chat command.
pub struct Prompts;

impl Prompts {
    /// Prompt to expand a search query with related library and decorator names.
    pub fn query_expansion() -> &'static str {
        r#"Add 5-10 Python library or decorator names related to this code search query.
Only output the expanded query, nothing else.

Query: {query}
Expanded query:"#
    }

    /// Query expansion constrained to the libraries the repository imports.
    pub fn query_expansion_with_context() -> &'static str {
        r#"Add 5-10 Python library or decorator names related to this code search query.
This codebase uses: {imports}
Prefer names from that list when they are relevant.
Only output the expanded query, nothing else.

Query: {query}
Expanded query:"#
    }

    /// Prompt to write a hypothetical code snippet that would answer the query (HyDE).
    pub fn hypothetical_code() -> &'static str {
        r#"Write a 3-5 line Python function that would match this search query.
Output ONLY the code, no explanation.

Query: {query}
```python
"#
    }

    /// System prompt for answering questions about a repository.
    pub fn system_code_assistant() -> &'static str {
        r#"You are CodeCompass, an AI assistant that helps developers understand codebases.

You have been given relevant code snippets from the repository to help answer the user's question.
Base your answer on the provided code context. If the context doesn't contain enough information
to fully answer the question, say so.

Be concise and specific. Reference file names and function names when relevant."#
    }

    /// User prompt wrapping retrieved code context and the question.
    pub fn rag_answer() -> &'static str {
        r#"
## Relevant Code Context
{context}

## User Question
{question}

## Your Answer
"#
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompts_are_not_empty() {
        assert!(!Prompts::query_expansion().is_empty());
        assert!(!Prompts::query_expansion_with_context().is_empty());
        assert!(!Prompts::hypothetical_code().is_empty());
        assert!(!Prompts::system_code_assistant().is_empty());
        assert!(!Prompts::rag_answer().is_empty());
    }

    #[test]
    fn test_placeholders_present() {
        assert!(Prompts::query_expansion().contains("{query}"));
        assert!(Prompts::query_expansion_with_context().contains("{imports}"));
        assert!(Prompts::hypothetical_code().contains("{query}"));
        assert!(Prompts::rag_answer().contains("{context}"));
        assert!(Prompts::rag_answer().contains("{question}"));
    }
}
