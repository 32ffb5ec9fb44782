use std::env;
use std::path::PathBuf;

use serde::Deserialize;

pub const DATA_ROOT_ENV: &str = "SUMA_DATA_ROOT";
pub const REPORTS_DIR_ENV: &str = "SUMA_REPORTS_DIR";

/// Where the repository store keeps its files.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub data_root: PathBuf,
    /// Name of the directory below `data_root` that holds exported reports.
    /// Never listed as a patient.
    pub reports_dir_name: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from("Patient_data"),
            reports_dir_name: "Reports".to_string(),
        }
    }
}

impl StoreConfig {
    pub fn new(data_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
            ..Self::default()
        }
    }

    /// Defaults overridden by `SUMA_DATA_ROOT` and `SUMA_REPORTS_DIR`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(root) = env::var_os(DATA_ROOT_ENV).filter(|v| !v.is_empty()) {
            config.data_root = PathBuf::from(root);
        }
        if let Ok(name) = env::var(REPORTS_DIR_ENV) {
            if !name.trim().is_empty() {
                config.reports_dir_name = name;
            }
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config: StoreConfig = serde_json::from_str(r#"{"data_root": "/srv/suma"}"#).unwrap();
        assert_eq!(config.data_root, PathBuf::from("/srv/suma"));
        assert_eq!(config.reports_dir_name, "Reports");
    }

    #[test]
    fn new_only_replaces_root() {
        let config = StoreConfig::new("/tmp/data");
        assert_eq!(config.data_root, PathBuf::from("/tmp/data"));
        assert_eq!(config.reports_dir_name, StoreConfig::default().reports_dir_name);
    }
}
