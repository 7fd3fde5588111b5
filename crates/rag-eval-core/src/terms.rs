//! Term extraction shared by BM25 queries and the offline keyword extractor.
//!
//! A term is a maximal run of alphanumeric characters, lowercased. Stop
//! words are dropped only by [`query_terms`]; [`tokenize`] keeps everything
//! so document lengths stay honest for BM25 normalization.

/// Common English function words that carry no retrieval signal.
const STOP_WORDS: &[&str] = &[
    "a", "about", "after", "all", "also", "an", "and", "any", "are", "as", "at", "be", "been",
    "before", "but", "by", "can", "could", "did", "do", "does", "for", "from", "had", "has",
    "have", "he", "her", "his", "how", "i", "if", "in", "into", "is", "it", "its", "me", "more",
    "most", "my", "no", "not", "of", "on", "or", "our", "s", "she", "should", "so", "some", "such",
    "than", "that", "the", "t", "their", "them", "then", "there", "these", "they", "this", "those",
    "to", "was", "we", "were", "what", "when", "where", "which", "while", "who", "whom", "why",
    "will", "with", "would", "you", "your",
];

pub fn is_stop_word(term: &str) -> bool {
    STOP_WORDS.contains(&term)
}

/// Lowercased alphanumeric terms of `text`, in order, duplicates kept.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

/// Distinct non-stop-word terms of `text`, first occurrence order.
///
/// ```rust
/// use rag_eval_core::terms::query_terms;
///
/// assert_eq!(
///     query_terms("What is the GIL? The GIL, explained."),
///     vec!["gil", "explained"]
/// );
/// ```
pub fn query_terms(text: &str) -> Vec<String> {
    let mut seen = Vec::new();
    for term in tokenize(text) {
        if !is_stop_word(&term) && !seen.contains(&term) {
            seen.push(term);
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_strips_punctuation() {
        assert_eq!(
            tokenize("Hello, world! It's 2024."),
            vec!["hello", "world", "it", "s", "2024"]
        );
    }

    #[test]
    fn test_tokenize_keeps_unicode_letters() {
        assert_eq!(tokenize("Café-Crème"), vec!["café", "crème"]);
    }

    #[test]
    fn test_query_terms_drop_stop_words_and_duplicates() {
        assert_eq!(
            query_terms("How does the borrow checker check the borrow?"),
            vec!["borrow", "checker", "check"]
        );
    }

    #[test]
    fn test_query_terms_of_only_stop_words_is_empty() {
        assert!(query_terms("what is it?").is_empty());
        assert!(query_terms("").is_empty());
    }
}
