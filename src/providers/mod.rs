mod openai;
mod retry;

use anyhow::{Result, anyhow};

pub use openai::{DEFAULT_MODEL, OpenAiTranslator};

const KEY_ENV: &str = "OPENAI_API_KEY";

/// API key from the command line, falling back to `OPENAI_API_KEY`.
pub fn resolve_key(cli_key: Option<&str>) -> Result<String> {
    if let Some(key) = cli_key.map(str::trim).filter(|key| !key.is_empty()) {
        return Ok(key.to_string());
    }
    std::env::var(KEY_ENV)
        .ok()
        .map(|key| key.trim().to_string())
        .filter(|key| !key.is_empty())
        .ok_or_else(|| anyhow!("no API key found (pass --key or set {})", KEY_ENV))
}
