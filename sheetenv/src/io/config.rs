//! Environment configuration, usually `sheetenv.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Environment variable overriding [`EnvConfig::base_document`].
pub const BASE_DOCUMENT_ENV: &str = "SHEETENV_BASE_DOCUMENT";
/// Environment variable overriding [`EnvConfig::output_document`].
pub const OUTPUT_DOCUMENT_ENV: &str = "SHEETENV_OUTPUT_DOCUMENT";

/// Environment configuration (TOML).
///
/// Missing fields default to values that work against the bundled engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EnvConfig {
    /// Document loaded into every fresh episode. Blank document when unset.
    pub base_document: Option<PathBuf>,

    /// Where the final document is saved on close. Nothing is saved when unset.
    pub output_document: Option<PathBuf>,

    pub connect: ConnectConfig,
    pub export: ExportConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ConnectConfig {
    /// Connection attempts made by `reset` before giving up.
    pub attempts: u32,
    /// Fixed pause between attempts, in milliseconds.
    pub backoff_ms: u64,
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            attempts: 10,
            backoff_ms: 1500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ExportConfig {
    /// Converter invoked for PDF export. `{input}` and `{outdir}` are substituted.
    pub pdf_command: Vec<String>,
    pub timeout_secs: u64,
    /// Truncate converter stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            pdf_command: ["soffice", "--headless", "--convert-to", "pdf", "--outdir", "{outdir}", "{input}"]
                .into_iter()
                .map(str::to_string)
                .collect(),
            timeout_secs: 120,
            output_limit_bytes: 100_000,
        }
    }
}

impl EnvConfig {
    pub fn validate(&self) -> Result<()> {
        if self.connect.attempts == 0 {
            return Err(anyhow!("connect.attempts must be > 0"));
        }
        if self.export.timeout_secs == 0 {
            return Err(anyhow!("export.timeout_secs must be > 0"));
        }
        if self.export.output_limit_bytes == 0 {
            return Err(anyhow!("export.output_limit_bytes must be > 0"));
        }
        if self.export.pdf_command.is_empty() || self.export.pdf_command[0].trim().is_empty() {
            return Err(anyhow!("export.pdf_command must be a non-empty array"));
        }
        Ok(())
    }

    /// Apply document path overrides from `lookup` (normally `std::env::var`).
    /// Empty values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(BASE_DOCUMENT_ENV).filter(|v| !v.trim().is_empty()) {
            self.base_document = Some(PathBuf::from(path));
        }
        if let Some(path) = lookup(OUTPUT_DOCUMENT_ENV).filter(|v| !v.trim().is_empty()) {
            self.output_document = Some(PathBuf::from(path));
        }
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `EnvConfig::default()`.
pub fn load_config(path: &Path) -> Result<EnvConfig> {
    if !path.exists() {
        let cfg = EnvConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: EnvConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Load config and then apply environment-variable overrides.
pub fn load_config_with_env(path: &Path) -> Result<EnvConfig> {
    let mut cfg = load_config(path)?;
    cfg.apply_overrides(|key| std::env::var(key).ok());
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, EnvConfig::default());
        assert_eq!(cfg.connect.attempts, 10);
        assert_eq!(cfg.connect.backoff_ms, 1500);
    }

    #[test]
    fn partial_file_keeps_defaults_for_the_rest() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("sheetenv.toml");
        fs::write(
            &path,
            "output_document = \"out/final.json\"\n\n[connect]\nbackoff_ms = 0\n",
        )
        .expect("write");

        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.output_document, Some(PathBuf::from("out/final.json")));
        assert_eq!(cfg.connect.backoff_ms, 0);
        assert_eq!(cfg.connect.attempts, 10);
        assert_eq!(cfg.export, ExportConfig::default());
    }

    #[test]
    fn zero_attempts_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("sheetenv.toml");
        fs::write(&path, "[connect]\nattempts = 0\n").expect("write");

        let err = load_config(&path).expect_err("invalid");
        assert!(format!("{err:#}").contains("connect.attempts"));
    }

    #[test]
    fn overrides_replace_document_paths() {
        let mut cfg = EnvConfig::default();
        cfg.apply_overrides(|key| match key {
            BASE_DOCUMENT_ENV => Some("base.json".to_string()),
            OUTPUT_DOCUMENT_ENV => Some("  ".to_string()),
            _ => None,
        });
        assert_eq!(cfg.base_document, Some(PathBuf::from("base.json")));
        assert_eq!(cfg.output_document, None);
    }
}
