use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::header::{HeaderSearch, CRT_ANCHOR, DEFAULT_LOOKAHEAD};

pub const DEFAULT_CONFIG_FILE: &str = "pipeline.toml";

/// Batch settings. Every field has a default so an empty file is valid.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// One sub-folder of workbooks per country.
    pub input_root: PathBuf,
    pub output_root: PathBuf,
    /// Plain-text mirror of the combined artifacts, off when unset.
    pub csv_root: Option<PathBuf>,
    pub sheets: Vec<String>,
    /// Country folders to process; empty means all of them.
    pub countries: Vec<String>,
    pub anchor: String,
    pub keywords: Vec<String>,
    pub lookahead: usize,
    pub num_threads: Option<usize>,
    pub keep_yearly: bool,
    pub pivot_gases: bool,
    pub log_dir: Option<PathBuf>,
    pub cache_entries: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input_root: PathBuf::from("data/raw"),
            output_root: PathBuf::from("data/processed_data"),
            csv_root: None,
            sheets: vec!["Summary2".to_owned()],
            countries: Vec::new(),
            anchor: CRT_ANCHOR.to_owned(),
            keywords: Vec::new(),
            lookahead: DEFAULT_LOOKAHEAD,
            num_threads: None,
            keep_yearly: false,
            pivot_gases: true,
            log_dir: None,
            cache_entries: 50,
        }
    }
}

impl PipelineConfig {
    /// Header search settings for the configured anchor and keywords.
    pub fn header_search(&self) -> HeaderSearch {
        let anchor = self.anchor.trim();
        let search = if anchor.is_empty() {
            HeaderSearch {
                anchor: None,
                ..HeaderSearch::default()
            }
        } else {
            HeaderSearch::anchored(anchor)
        };
        HeaderSearch {
            lookahead: self.lookahead,
            ..search.with_keywords(self.keywords.iter().cloned())
        }
    }
}

/// Loads `path` (or `pipeline.toml`) if present, then `GHG__*` env overrides.
pub fn load_config(path: Option<&Path>) -> Result<PipelineConfig, config::ConfigError> {
    let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
    let cfg = Config::builder()
        .add_source(File::from(path).required(false))
        .add_source(
            Environment::with_prefix("GHG")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("sheets")
                .with_list_parse_key("countries")
                .with_list_parse_key("keywords"),
        )
        .build()?;
    cfg.try_deserialize()
}
