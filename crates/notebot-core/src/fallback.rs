//! Keyword rules used when the model cannot answer.

use std::collections::BTreeSet;

use async_trait::async_trait;
use notebot_models::ClassificationResult;

use crate::classifier::Classifier;

/// One keyword-to-category mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct FallbackRule {
    pub category: String,
    /// Lowercase keywords, matched as substrings.
    pub keywords: Vec<String>,
}

impl FallbackRule {
    pub fn new<I, S>(category: impl Into<String>, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            category: category.into(),
            keywords: keywords
                .into_iter()
                .map(|k| k.as_ref().to_lowercase())
                .collect(),
        }
    }

    fn matches(&self, lowered: &str) -> bool {
        self.keywords.iter().any(|k| lowered.contains(k.as_str()))
    }
}

/// Ordered keyword table. The first rule with a matching keyword wins.
#[derive(Debug, Clone)]
pub struct FallbackRules {
    rules: Vec<FallbackRule>,
    confidence: f64,
    default_category: String,
}

impl FallbackRules {
    /// Creates the built-in table.
    ///
    /// Matches report `confidence`; text matching no rule is filed under
    /// `default_category` with confidence `0.0`.
    pub fn new(confidence: f64, default_category: impl Into<String>) -> Self {
        Self::with_rules(default_rules(), confidence, default_category)
    }

    /// Creates a table from custom rules.
    pub fn with_rules(
        rules: Vec<FallbackRule>,
        confidence: f64,
        default_category: impl Into<String>,
    ) -> Self {
        Self {
            rules,
            confidence,
            default_category: default_category.into(),
        }
    }

    /// Classifies `text` by keyword.
    pub fn classify_text(&self, text: &str) -> ClassificationResult {
        let lowered = text.to_lowercase();
        match self.rules.iter().find(|rule| rule.matches(&lowered)) {
            Some(rule) => ClassificationResult::fallback(&rule.category, self.confidence),
            None => ClassificationResult::fallback(&self.default_category, 0.0),
        }
    }
}

#[async_trait]
impl Classifier for FallbackRules {
    async fn classify(&self, text: &str, _existing: &BTreeSet<String>) -> ClassificationResult {
        self.classify_text(text)
    }
}

fn default_rules() -> Vec<FallbackRule> {
    vec![
        FallbackRule::new("cooking", ["recipe", "cooking", "food", "meal", "ingredient"]),
        FallbackRule::new("work", ["work", "meeting", "project", "deadline", "task"]),
        FallbackRule::new("travel", ["travel", "trip", "vacation", "flight", "hotel"]),
        FallbackRule::new("ideas", ["idea", "thought", "remember"]),
    ]
}
