//! Note classification through a local Ollama server.
//!
//! One `POST /api/generate` per note, no retries. Anything other than a
//! clean `{category, confidence}` answer inside the timeout falls through to
//! [`FallbackRules`], so callers always get a result.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use notebot_models::{category_slug, ClassificationResult};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::classifier::{Classifier, ClassifierError};
use crate::config::{join_url, Config};
use crate::fallback::FallbackRules;

/// Timeout for the availability probe.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Sampling temperature; low so repeated notes land in the same category.
const TEMPERATURE: f64 = 0.2;

/// Keys a model may use for the category field.
const CATEGORY_KEYS: [&str; 3] = ["category", "class", "class_name"];

const PROMPT_TEMPLATE: &str = r#"You are a note classification assistant. Assign the note below to exactly one category.

Existing categories: {categories}

Rules:
- Strongly prefer one of the existing categories when it fits reasonably well
- Only propose a new category when none of the existing ones fit
- Category names are short, lowercase, snake_case (e.g. "cooking", "work_notes")
- Confidence is a number between 0.0 and 1.0

Note:
"""
{text}
"""

Respond with JSON only, no other text:
{"category": "<category>", "confidence": <number>}"#;

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
    format: &'a str,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f64,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Classifier backed by an Ollama model.
pub struct OllamaClassifier {
    client: reqwest::Client,
    base_url: String,
    model: String,
    fallback: FallbackRules,
    json_object: Regex,
}

impl OllamaClassifier {
    /// Creates a classifier for `model` at `base_url`. `timeout` bounds each
    /// classification request end to end.
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
        fallback: FallbackRules,
    ) -> Result<Self, ClassifierError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClassifierError::Setup(e.to_string()))?;

        // Greedy: first '{' through last '}', so prose or code fences
        // around the object are ignored.
        let json_object =
            Regex::new(r"(?s)\{.*\}").map_err(|e| ClassifierError::Setup(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            model: model.into(),
            fallback,
            json_object,
        })
    }

    /// Creates a classifier from validated configuration.
    pub fn from_config(config: &Config) -> Result<Self, ClassifierError> {
        Self::new(
            config.ollama_base_url.clone(),
            config.ollama_model.clone(),
            config.ollama_timeout,
            FallbackRules::new(config.fallback_confidence, config.default_category.clone()),
        )
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Checks whether the server answers `GET /api/tags`.
    pub async fn is_available(&self) -> bool {
        let url = join_url(&self.base_url, "api/tags");
        match self.client.get(&url).timeout(PROBE_TIMEOUT).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(error = %e, url = %url, "Ollama probe failed");
                false
            }
        }
    }

    /// Asks the model once, without falling back.
    pub async fn classify_with_model(
        &self,
        text: &str,
        existing: &BTreeSet<String>,
    ) -> Result<ClassificationResult, ClassifierError> {
        let request = GenerateRequest {
            model: &self.model,
            prompt: build_prompt(text, existing),
            stream: false,
            format: "json",
            options: GenerateOptions {
                temperature: TEMPERATURE,
            },
        };

        let response = self
            .client
            .post(join_url(&self.base_url, "api/generate"))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClassifierError::Status(status));
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| ClassifierError::Parse(e.to_string()))?;

        self.parse_answer(&body.response)
    }

    fn parse_answer(&self, answer: &str) -> Result<ClassificationResult, ClassifierError> {
        let object = self
            .json_object
            .find(answer)
            .ok_or_else(|| ClassifierError::Parse("no JSON object in model output".to_string()))?;

        let value: Value = serde_json::from_str(object.as_str())
            .map_err(|e| ClassifierError::Parse(e.to_string()))?;

        let raw_category = CATEGORY_KEYS
            .iter()
            .find_map(|key| value.get(key).and_then(Value::as_str))
            .ok_or_else(|| ClassifierError::InvalidResponse("missing category".to_string()))?;

        let category = category_slug(raw_category).ok_or_else(|| {
            ClassifierError::InvalidResponse(format!("unusable category {:?}", raw_category))
        })?;

        let confidence = match value.get("confidence") {
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
        .ok_or_else(|| ClassifierError::InvalidResponse("missing confidence".to_string()))?;

        if !(0.0..=1.0).contains(&confidence) {
            return Err(ClassifierError::InvalidResponse(format!(
                "confidence {} out of range",
                confidence
            )));
        }

        Ok(ClassificationResult::model(category, confidence))
    }
}

#[async_trait]
impl Classifier for OllamaClassifier {
    async fn classify(&self, text: &str, existing: &BTreeSet<String>) -> ClassificationResult {
        match self.classify_with_model(text, existing).await {
            Ok(result) => {
                debug!(
                    category = %result.category,
                    confidence = result.confidence,
                    "Model classified note"
                );
                result
            }
            Err(e) => {
                warn!(error = %e, model = %self.model, "Classification failed, using fallback rules");
                self.fallback.classify_text(text)
            }
        }
    }
}

/// Builds the classification prompt for `text`.
pub fn build_prompt(text: &str, existing: &BTreeSet<String>) -> String {
    let categories = if existing.is_empty() {
        "none".to_string()
    } else {
        existing
            .iter()
            .map(|c| format!("\"{}\"", c))
            .collect::<Vec<_>>()
            .join(", ")
    };

    PROMPT_TEMPLATE
        .replace("{categories}", &categories)
        .replace("{text}", text)
}
