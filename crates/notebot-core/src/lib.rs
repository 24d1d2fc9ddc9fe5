//! Notebot Core - configuration and note classification.
//!
//! - **config**: Environment-driven settings, validated at startup
//! - **classifier**: The [`Classifier`] trait shared by all backends
//! - **ollama**: Classification through a local Ollama model
//! - **fallback**: Keyword rules used when the model is unavailable

pub mod classifier;
pub mod config;
pub mod fallback;
pub mod ollama;

pub use classifier::{Classifier, ClassifierError};
pub use config::{default_notes_dir, env_file, home_dir, Config, ConfigError};
pub use fallback::{FallbackRule, FallbackRules};
pub use ollama::{build_prompt, OllamaClassifier};
