use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};

pub const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const GEMINI_MODEL: &str = "gemini-1.5-flash-latest";
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_OLLAMA_MODEL: &str = "qwen-2.5-4b-instruct-vision";

/// Which inference backend serves a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Gemini,
    Ollama,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gemini => "gemini",
            Self::Ollama => "ollama",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "gemini" | "remote" | "api" => Ok(Self::Gemini),
            "ollama" | "local" => Ok(Self::Ollama),
            other => Err(format!(
                "unknown backend '{other}' (expected 'gemini' or 'ollama')"
            )),
        }
    }
}

/// Backend configuration resolved from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub gemini_api_key: Option<String>,
    pub gemini_api_base: String,
    pub ollama_url: String,
    pub ollama_model: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            gemini_api_key: None,
            gemini_api_base: DEFAULT_GEMINI_API_BASE.to_string(),
            ollama_url: DEFAULT_OLLAMA_URL.to_string(),
            ollama_model: DEFAULT_OLLAMA_MODEL.to_string(),
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let defaults = Self::default();
        Self {
            gemini_api_key: read("GEMINI_API_KEY").or_else(|| read("GOOGLE_API_KEY")),
            gemini_api_base: read("GEMINI_API_BASE")
                .map(|value| value.trim_end_matches('/').to_string())
                .unwrap_or(defaults.gemini_api_base),
            ollama_url: read("OLLAMA_API_URL")
                .map(|value| value.trim_end_matches('/').to_string())
                .unwrap_or(defaults.ollama_url),
            ollama_model: read("OLLAMA_MODEL_NAME").unwrap_or(defaults.ollama_model),
        }
    }
}

/// Parses `KEY=VALUE` lines. Supports `export ` prefixes, `#` comments and
/// matching single or double quotes around the value.
pub fn parse_dotenv(content: &str) -> HashMap<String, String> {
    let mut vars = HashMap::new();
    for raw_line in content.lines() {
        let mut line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(stripped) = line.strip_prefix("export ") {
            line = stripped.trim();
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let mut value = value.trim().to_string();
        if value.len() >= 2 {
            let bytes = value.as_bytes();
            if (bytes[0] == b'"' && bytes[bytes.len() - 1] == b'"')
                || (bytes[0] == b'\'' && bytes[bytes.len() - 1] == b'\'')
            {
                value = value[1..value.len() - 1].to_string();
            }
        }
        vars.insert(key.to_string(), value);
    }
    vars
}

/// Loads `path` into the process environment without overriding variables
/// that are already set. A missing file is not an error.
pub fn load_dotenv(path: &Path) -> Result<usize> {
    if !path.exists() {
        return Ok(0);
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed reading {}", path.display()))?;
    let mut applied = 0;
    for (key, value) in parse_dotenv(&content) {
        if env::var_os(&key).is_none() {
            env::set_var(&key, value);
            applied += 1;
        }
    }
    Ok(applied)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::{
        load_dotenv, parse_dotenv, BackendKind, Settings, DEFAULT_OLLAMA_MODEL, DEFAULT_OLLAMA_URL,
    };

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn settings_default_when_environment_is_empty() {
        let settings = Settings::from_lookup(lookup(&[]));
        assert_eq!(settings.gemini_api_key, None);
        assert_eq!(settings.ollama_url, DEFAULT_OLLAMA_URL);
        assert_eq!(settings.ollama_model, DEFAULT_OLLAMA_MODEL);
    }

    #[test]
    fn settings_read_overrides_and_ignore_blanks() {
        let settings = Settings::from_lookup(lookup(&[
            ("GEMINI_API_KEY", "   "),
            ("GOOGLE_API_KEY", "g-key"),
            ("OLLAMA_API_URL", "http://gpu-box:11434/"),
            ("OLLAMA_MODEL_NAME", "llava:13b"),
        ]));
        assert_eq!(settings.gemini_api_key.as_deref(), Some("g-key"));
        assert_eq!(settings.ollama_url, "http://gpu-box:11434");
        assert_eq!(settings.ollama_model, "llava:13b");
    }

    #[test]
    fn backend_kind_parses_aliases() {
        assert_eq!("Gemini".parse::<BackendKind>(), Ok(BackendKind::Gemini));
        assert_eq!("local".parse::<BackendKind>(), Ok(BackendKind::Ollama));
        assert!("openai".parse::<BackendKind>().is_err());
        assert_eq!(BackendKind::Ollama.to_string(), "ollama");
    }

    #[test]
    fn dotenv_handles_exports_quotes_and_comments() {
        let vars = parse_dotenv(
            "# keys\nexport GEMINI_API_KEY=\"abc 123\"\nOLLAMA_MODEL_NAME='llava'\n\nBROKEN\n=nokey\n",
        );
        assert_eq!(vars.get("GEMINI_API_KEY").map(String::as_str), Some("abc 123"));
        assert_eq!(vars.get("OLLAMA_MODEL_NAME").map(String::as_str), Some("llava"));
        assert_eq!(vars.len(), 2);
    }

    #[test]
    fn load_dotenv_fills_only_unset_variables() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join(".env");
        std::fs::write(
            &path,
            "KPILENS_TEST_DOTENV_PRESET=from-file\nKPILENS_TEST_DOTENV_FRESH=from-file\n",
        )?;
        std::env::set_var("KPILENS_TEST_DOTENV_PRESET", "from-shell");
        std::env::remove_var("KPILENS_TEST_DOTENV_FRESH");

        assert_eq!(load_dotenv(&path)?, 1);
        assert_eq!(
            std::env::var("KPILENS_TEST_DOTENV_PRESET").ok().as_deref(),
            Some("from-shell")
        );
        assert_eq!(
            std::env::var("KPILENS_TEST_DOTENV_FRESH").ok().as_deref(),
            Some("from-file")
        );

        assert_eq!(load_dotenv(&temp.path().join("missing.env"))?, 0);
        Ok(())
    }
}
