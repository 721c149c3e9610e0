//! LLM backends used by the content classifier.

pub mod gemini;
mod traits;

pub use traits::Provider;

use crate::config::Config;

/// Build the configured classifier backend.
pub fn create_provider(config: &Config) -> anyhow::Result<Box<dyn Provider>> {
    Ok(Box::new(gemini::GeminiProvider::new(
        config.api_key.as_deref(),
    )))
}
