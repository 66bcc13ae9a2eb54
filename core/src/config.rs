use crate::error::Result;
use crate::normalizer::NormalizationOptions;
use crate::postings::PostingsOptions;
use serde::{Deserialize, Serialize};
use std::fs::{create_dir_all, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    /// Used when a request leaves `max_results` at zero.
    pub default_max_results: usize,
    /// Requests asking for more are clamped.
    pub max_results_limit: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self { default_max_results: 100, max_results_limit: 1000 }
    }
}

impl SearchSettings {
    pub fn page_size(&self, requested: usize) -> usize {
        let requested = if requested == 0 { self.default_max_results } else { requested };
        requested.clamp(1, self.max_results_limit.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KomodoConfig {
    pub data_dir: PathBuf,
    /// Keep the catalog in memory only; nothing is written to `data_dir`.
    pub temporary: bool,
    pub normalization: NormalizationOptions,
    pub postings: PostingsOptions,
    pub search: SearchSettings,
}

impl Default for KomodoConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./komodo-data"),
            temporary: false,
            normalization: NormalizationOptions::default(),
            postings: PostingsOptions::default(),
            search: SearchSettings::default(),
        }
    }
}

impl KomodoConfig {
    pub fn temporary() -> Self {
        Self { temporary: true, ..Self::default() }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut f = File::open(path)?;
        let mut buf = String::new();
        f.read_to_string(&mut buf)?;
        Ok(serde_json::from_str(&buf)?)
    }

    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            create_dir_all(parent)?;
        }
        let mut f = File::create(path)?;
        let json = serde_json::to_string_pretty(self)?;
        f.write_all(json.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_size_defaults_and_clamps() {
        let s = SearchSettings { default_max_results: 10, max_results_limit: 50 };
        assert_eq!(s.page_size(0), 10);
        assert_eq!(s.page_size(7), 7);
        assert_eq!(s.page_size(500), 50);
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("komodo.json");
        std::fs::write(&path, r#"{"postings":{"max_token_length":12},"search":{"max_results_limit":5}}"#).unwrap();
        let config = KomodoConfig::from_file(&path).unwrap();
        assert_eq!(config.postings.max_token_length, 12);
        assert_eq!(config.postings.min_token_length, 1);
        assert_eq!(config.search.max_results_limit, 5);
        assert_eq!(config.search.default_max_results, 100);
        assert_eq!(config.normalization, NormalizationOptions::default());
    }

    #[test]
    fn written_file_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/komodo.json");
        let config = KomodoConfig { temporary: true, ..Default::default() };
        config.to_file(&path).unwrap();
        assert_eq!(KomodoConfig::from_file(&path).unwrap(), config);
    }
}
