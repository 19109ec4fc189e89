//! Detection of reviews from customers who refused or never received the item.
//!
//! A reply to such a review must not thank the customer for the purchase.

/// Predicate over the concatenated lowercase review text
pub trait RefusalDetector: Send + Sync {
    fn is_refusal(&self, text: &str) -> bool;
}

const DEFAULT_KEYWORDS: &[&str] = &[
    "отказ",
    "не забрал",
    "не выкуп",
    "вернул",
    "возврат",
    "refused",
    "returned it",
    "never received",
    "did not buy",
    "didn't buy",
    "sent it back",
];

/// Substring match against a keyword list
#[derive(Debug, Clone)]
pub struct KeywordRefusalDetector {
    keywords: Vec<String>,
}

impl KeywordRefusalDetector {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keywords: keywords
                .into_iter()
                .map(|k| k.into().to_lowercase())
                .collect(),
        }
    }
}

impl Default for KeywordRefusalDetector {
    fn default() -> Self {
        Self::new(DEFAULT_KEYWORDS.iter().copied())
    }
}

impl RefusalDetector for KeywordRefusalDetector {
    fn is_refusal(&self, text: &str) -> bool {
        self.keywords.iter().any(|k| text.contains(k.as_str()))
    }
}

/// Body, pros and cons joined and lowercased, the input every detector sees
pub fn review_text(body: &str, pros: &str, cons: &str) -> String {
    [body, pros, cons]
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
