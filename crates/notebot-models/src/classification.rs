//! Classification result types.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Where a classification came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationSource {
    /// The language model answered with a usable label.
    Model,
    /// The keyword rules were used because the model was unavailable.
    Fallback,
    /// The user named the category when asked to confirm.
    User,
}

impl fmt::Display for ClassificationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Model => write!(f, "model"),
            Self::Fallback => write!(f, "fallback"),
            Self::User => write!(f, "user"),
        }
    }
}

/// Outcome of classifying one note. Transient; folded into a `Note` when the
/// category is accepted.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationResult {
    /// Category slug.
    pub category: String,

    /// Confidence in `[0.0, 1.0]`.
    pub confidence: f64,

    /// Which classifier produced the label.
    pub source: ClassificationSource,
}

impl ClassificationResult {
    /// Creates a result produced by the language model.
    pub fn model(category: impl Into<String>, confidence: f64) -> Self {
        Self {
            category: category.into(),
            confidence,
            source: ClassificationSource::Model,
        }
    }

    /// Creates a result produced by the fallback rules.
    pub fn fallback(category: impl Into<String>, confidence: f64) -> Self {
        Self {
            category: category.into(),
            confidence,
            source: ClassificationSource::Fallback,
        }
    }

    /// Whether the fallback rules produced this result.
    pub fn is_fallback(&self) -> bool {
        self.source == ClassificationSource::Fallback
    }

    /// Whether the category is already present in `existing`.
    pub fn is_existing(&self, existing: &BTreeSet<String>) -> bool {
        existing.contains(&self.category)
    }

    /// Whether the confidence reaches `threshold`.
    pub fn meets(&self, threshold: f64) -> bool {
        self.confidence >= threshold
    }

    /// Confidence as a whole percentage, for display.
    pub fn confidence_percent(&self) -> u32 {
        (self.confidence * 100.0).round() as u32
    }
}
