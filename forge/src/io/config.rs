//! Pipeline configuration stored in `forge.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::request::JudgeParams;

/// Pipeline configuration (TOML).
///
/// Intended to be edited by humans; missing fields default to the values
/// the batch executor contract was built around.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ForgeConfig {
    /// Root directory holding `batches_to_process/` and `completed_batches/`.
    pub batches_root: PathBuf,

    /// Verdict prefix marking a generated response as accepted.
    pub acceptance_token: String,

    /// Sentinel content value: a record producing it is never extended again.
    pub terminal_marker: String,

    pub judge: JudgeConfig,
}

/// Evaluator model settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct JudgeConfig {
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.0-flash".to_string(),
            temperature: 0.1,
            max_tokens: 2048,
        }
    }
}

impl Default for ForgeConfig {
    fn default() -> Self {
        Self {
            batches_root: PathBuf::from("."),
            acceptance_token: "Yes".to_string(),
            terminal_marker: "END_OF_DIALOGUE".to_string(),
            judge: JudgeConfig::default(),
        }
    }
}

impl ForgeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.acceptance_token.trim().is_empty() {
            return Err(anyhow!("acceptance_token must not be empty"));
        }
        if self.terminal_marker.trim().is_empty() {
            return Err(anyhow!("terminal_marker must not be empty"));
        }
        if self.judge.model.trim().is_empty() {
            return Err(anyhow!("judge.model must not be empty"));
        }
        if self.judge.max_tokens == 0 {
            return Err(anyhow!("judge.max_tokens must be > 0"));
        }
        if !(0.0..=2.0).contains(&self.judge.temperature) {
            return Err(anyhow!("judge.temperature must be within 0..=2"));
        }
        Ok(())
    }

    pub fn judge_params(&self) -> JudgeParams {
        JudgeParams {
            model: self.judge.model.clone(),
            temperature: self.judge.temperature,
            max_tokens: self.judge.max_tokens,
        }
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `ForgeConfig::default()`.
pub fn load_config(path: &Path) -> Result<ForgeConfig> {
    if !path.exists() {
        let cfg = ForgeConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: ForgeConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &ForgeConfig) -> Result<()> {
    cfg.validate()?;
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, buf)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, ForgeConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("forge.toml");
        let cfg = ForgeConfig {
            acceptance_token: "OK".to_string(),
            ..ForgeConfig::default()
        };
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn empty_acceptance_token_is_rejected() {
        let cfg = ForgeConfig {
            acceptance_token: "  ".to_string(),
            ..ForgeConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
