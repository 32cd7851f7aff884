//! Optional TOML configuration file (`-c`/`--config`), mirroring a subset of
//! the CLI flags so a site can pin its defaults once. Every field is
//! optional; each binary's `main` merges a loaded [`Config`] with its CLI
//! flags, with an explicit flag always winning over the config file.

use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};

/// DCE-fitting config-file section (`[dce]`). Field names match the CLI
/// flags from §6 with hyphens folded to underscores.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DceConfig {
    pub model: Option<String>,
    pub dose: Option<f64>,
    pub hct: Option<f64>,
    pub injection_image: Option<usize>,
    pub first_image: Option<usize>,
    pub last_image: Option<usize>,
    pub iauc_times: Option<Vec<f64>>,
    pub fixed_params: Option<Vec<usize>>,
    pub fixed_values: Option<Vec<f64>>,
    pub relative_limit_params: Option<Vec<usize>>,
    pub relative_limit_values: Option<Vec<f64>>,
    pub init_params: Option<Vec<f64>>,
    pub max_iterations: Option<usize>,
    /// Optimiser backend: `"BLEIC"` (default) or `"NS"` (Nelder-Mead).
    pub opt_type: Option<String>,
}

/// T1-mapping config-file section (`[t1]`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct T1Config {
    pub method: Option<String>,
    pub r1: Option<f64>,
    pub tr_ms: Option<f64>,
}

/// Root of the optional TOML config file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub dce: DceConfig,
    #[serde(default)]
    pub t1: T1Config,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::ConfigBad {
            path: path.display().to_string(),
            detail: e.to_string(),
        })?;
        toml::from_str(&text).map_err(|e| Error::ConfigBad {
            path: path.display().to_string(),
            detail: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_a_partial_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("madym.toml");
        std::fs::write(&path, "[dce]\nmodel = \"ETM\"\ndose = 0.2\n\n[t1]\nmethod = \"VFA_B1\"\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.dce.model.as_deref(), Some("ETM"));
        assert_eq!(config.dce.dose, Some(0.2));
        assert_eq!(config.dce.hct, None);
        assert_eq!(config.t1.method.as_deref(), Some("VFA_B1"));
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let err = Config::load(Path::new("/no/such/madym.toml")).unwrap_err();
        assert!(matches!(err, Error::ConfigBad { .. }));
    }
}
