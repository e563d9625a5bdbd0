//! Keyword side of hybrid search: BM25 over the chunk search text.

use crate::ranking::by_score_desc;
use bm25::{Embedder, EmbedderBuilder, Scorer, Tokenizer};

/// Tokenizer for code and queries.
///
/// Anything that is not alphanumeric separates tokens, and tokens are
/// lowercased, so `index_chunks(self)` yields `index`, `chunks`, `self`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CodeTokenizer;

impl Tokenizer for CodeTokenizer {
    fn tokenize(&self, input_text: &str) -> Vec<String> {
        tokenize(input_text)
    }
}

pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// BM25 index over a fixed document list, addressed by position.
pub struct KeywordIndex {
    embedder: Embedder<u32, CodeTokenizer>,
    scorer: Scorer<usize, u32>,
    len: usize,
}

impl KeywordIndex {
    pub fn build<I, S>(documents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let documents: Vec<S> = documents.into_iter().collect();

        let embedder: Embedder<u32, CodeTokenizer> =
            EmbedderBuilder::with_avgdl(average_length(&documents))
                .tokenizer(CodeTokenizer)
                .build();

        let mut scorer = Scorer::new();
        for (i, doc) in documents.iter().enumerate() {
            scorer.upsert(&i, embedder.embed(doc.as_ref()));
        }

        Self {
            embedder,
            scorer,
            len: documents.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Documents with a positive score, best first. Ties go to the lower index.
    pub fn search(&self, query: &str, limit: usize) -> Vec<(usize, f32)> {
        let query = self.embedder.embed(query);

        let mut scored: Vec<(usize, f32)> = self
            .scorer
            .matches(&query)
            .into_iter()
            .filter(|doc| doc.score > 0.0)
            .map(|doc| (doc.id, doc.score))
            .collect();
        scored.sort_by(by_score_desc);
        scored.truncate(limit);
        scored
    }
}

/// Mean token count, never below 1 so length normalization stays finite.
fn average_length<S: AsRef<str>>(documents: &[S]) -> f32 {
    if documents.is_empty() {
        return 1.0;
    }
    let total: usize = documents.iter().map(|d| tokenize(d.as_ref()).len()).sum();
    (total as f32 / documents.len() as f32).max(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize() {
        assert_eq!(
            tokenize("def index_chunks(self, Chunks): -> CodeStore"),
            vec!["def", "index", "chunks", "self", "chunks", "codestore"]
        );
        assert!(tokenize("  ::  ").is_empty());
        assert_eq!(CodeTokenizer.tokenize("Embed_Batch"), vec!["embed", "batch"]);
    }

    #[test]
    fn test_prefers_rare_terms() {
        let index = KeywordIndex::build([
            "def search query vector",
            "def index chunks embed",
            "def chat loop question",
        ]);
        assert_eq!(index.len(), 3);

        let results = index.search("embed chunks", 10);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, 1);

        // "def" is in every document and still scores, but below a rare match.
        let results = index.search("def chat", 10);
        assert_eq!(results[0].0, 2);
        assert_eq!(results.len(), 3);
    }

    #[test]
    fn test_equal_scores_keep_document_order() {
        let index = KeywordIndex::build(["def run", "def stop", "def run"]);
        let order: Vec<usize> = index.search("run", 10).iter().map(|(i, _)| *i).collect();
        assert_eq!(order, vec![0, 2]);
    }

    #[test]
    fn test_limit_and_empty() {
        let index = KeywordIndex::build(Vec::<String>::new());
        assert!(index.is_empty());
        assert!(index.search("anything", 5).is_empty());

        let index = KeywordIndex::build(["some text", "more text"]);
        assert!(index.search("", 5).is_empty());
        assert_eq!(index.search("text", 1).len(), 1);
    }
}
