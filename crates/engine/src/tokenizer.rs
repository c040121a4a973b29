//! Analysis of text fields into index terms
//!
//! Text is split on UAX#29 word boundaries, then each word loses an English
//! possessive suffix and any non-alphanumeric characters, and is lowercased.
//! There is no stemming or stopword list: callers look documents up by the
//! exact words they wrote.

use strata_core::Term;
use unicode_segmentation::UnicodeSegmentation;

fn normalize(word: &str) -> String {
    let word = word
        .strip_suffix("'s")
        .or_else(|| word.strip_suffix("\u{2019}s"))
        .unwrap_or(word);
    word.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Split text into lowercase words.
///
/// # Example
///
/// ```
/// use strata_engine::tokenizer::tokenize;
///
/// let tokens = tokenize("The Quick Brown Fox's den");
/// assert_eq!(tokens, vec!["the", "quick", "brown", "fox", "den"]);
/// ```
pub fn tokenize(text: &str) -> Vec<String> {
    text.unicode_words()
        .map(normalize)
        .filter(|word| !word.is_empty())
        .collect()
}

/// Distinct terms of `text` under `field`, in first-occurrence order.
pub fn field_terms(field: &str, text: &str) -> Vec<Term> {
    let mut terms: Vec<Term> = Vec::new();
    for word in tokenize(text) {
        let term = Term::new(field, word);
        if !terms.contains(&term) {
            terms.push(term);
        }
    }
    terms
}
