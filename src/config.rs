//! YAML configuration: keyword table, coefficient set and policies.
//!
//! Every key is optional; a missing file section falls back to the built-in
//! tables so that a config only needs to carry what a class changed.

use std::{fs::File, io::BufReader, path::Path, time::Duration};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{
    emission::CoefficientSet, mapping::DuplicatePolicy, matcher::KeywordTable,
    normalize::DefaultingPolicy,
};

pub const DEFAULT_CACHE_TTL_SECS: u64 = 300;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub keywords: KeywordTable,
    pub coefficients: CoefficientSet,
    pub defaulting: DefaultingPolicy,
    pub duplicates: DuplicatePolicy,
    pub cache_ttl_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            keywords: KeywordTable::default(),
            coefficients: CoefficientSet::default(),
            defaulting: DefaultingPolicy::default(),
            duplicates: DuplicatePolicy::default(),
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening config file {path:?}"))?;
        serde_yaml::from_reader(BufReader::new(file))
            .with_context(|| format!("Parsing config YAML {path:?}"))
    }

    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path).with_context(|| format!("Creating config file {path:?}"))?;
        serde_yaml::to_writer(file, self).context("Writing config YAML")
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::CanonicalField;

    #[test]
    fn partial_config_keeps_builtin_tables() {
        let config: Config =
            serde_yaml::from_str("defaulting: strict\ncache_ttl_secs: 60\n").unwrap();
        assert_eq!(config.defaulting, DefaultingPolicy::Strict);
        assert_eq!(config.cache_ttl(), Duration::from_secs(60));
        assert_eq!(config.coefficients, CoefficientSet::default());
        assert_eq!(config.duplicates, DuplicatePolicy::Warn);
    }

    #[test]
    fn saved_config_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("co2e.yml");
        let mut config = Config::default();
        config.coefficients.version = "classroom-v3".to_string();
        config.coefficients.commute.bus = 0.07;
        config
            .keywords
            .fields
            .insert(CanonicalField::Team, vec!["조".to_string()]);
        config.save(&path).unwrap();

        assert_eq!(Config::load(&path).unwrap(), config);
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let err = Config::load(Path::new("/definitely/not/here.yml")).unwrap_err();
        assert!(format!("{err:#}").contains("Opening config file"));
    }
}
