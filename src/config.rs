//! Loader configuration
//!
//! Configuration can be built in code with [`LoaderConfig::builder`] or read
//! from JSON or TOML:
//!
//! ```toml
//! manifest_filename = "train.csv"
//! minibatch_size = 128
//! macrobatch_size = 1024
//! cache_directory = "/var/cache/macrobatch"
//! shuffle_every_epoch = true
//! random_seed = 42
//!
//! [provider]
//! type = "raw,label"
//! data_config = { output_len = 3072 }
//! ```

use crate::error::{LoaderError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use validator::Validate;

fn default_subset_percent() -> u32 {
    100
}

fn default_pool_depth() -> usize {
    2
}

fn default_shard_count() -> u32 {
    1
}

/// Which provider each decode worker builds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Registry tag, e.g. `"raw,label"`
    #[serde(rename = "type")]
    pub kind: String,

    /// Settings for the object side
    #[serde(default)]
    pub data_config: Value,

    /// Settings for the target side
    #[serde(default)]
    pub target_config: Value,
}

impl ProviderConfig {
    /// Reject settings the built-in `raw` modality can never build from
    ///
    /// Tags handled by a custom registry are passed through; the registry
    /// reports those when the loader starts.
    pub fn check(&self) -> Result<()> {
        let Some((data, target)) = self.kind.split_once(',') else {
            return Ok(());
        };
        let sides = [
            (data.trim(), "data_config", &self.data_config),
            (target.trim(), "target_config", &self.target_config),
        ];
        for (modality, field, config) in sides {
            if modality == "raw" && config.get("output_len").and_then(Value::as_u64).is_none() {
                return Err(LoaderError::Config(format!(
                    "provider {:?}: raw {} needs an integer output_len",
                    self.kind, field
                )));
            }
        }
        Ok(())
    }
}

/// Remote block service coordinates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct RemoteConfig {
    #[validate(url)]
    pub base_url: String,

    #[serde(default)]
    pub token: String,

    pub collection_id: u64,

    #[serde(default = "default_shard_count")]
    #[validate(range(min = 1))]
    pub shard_count: u32,

    #[serde(default)]
    pub shard_index: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct LoaderConfig {
    /// CSV manifest of record files (not needed with `remote`)
    #[serde(default)]
    pub manifest_filename: Option<PathBuf>,

    /// Records per `next()`
    #[validate(range(min = 1))]
    pub minibatch_size: usize,

    /// Records per block; 0 means `minibatch_size`
    #[serde(default)]
    pub macrobatch_size: usize,

    /// Cache root; blocks are read uncached when absent
    #[serde(default)]
    pub cache_directory: Option<PathBuf>,

    /// Shuffle block order and records within blocks every epoch
    #[serde(default)]
    pub shuffle_every_epoch: bool,

    /// Shuffle manifest lines once at load
    #[serde(default)]
    pub shuffle_manifest: bool,

    #[serde(default)]
    pub random_seed: u64,

    /// Share of each block to keep
    #[serde(default = "default_subset_percent")]
    #[validate(range(min = 1, max = 100))]
    pub subset_percent: u32,

    /// Root for relative manifest paths (defaults to the manifest's directory)
    #[serde(default)]
    pub repo_directory: Option<PathBuf>,

    /// Decode worker count; derived from available cores when absent
    #[serde(default)]
    #[validate(range(min = 1))]
    pub decode_threads: Option<usize>,

    /// Slots per buffer pool
    #[serde(default = "default_pool_depth")]
    #[validate(range(min = 2))]
    pub pool_depth: usize,

    pub provider: ProviderConfig,

    #[serde(default)]
    #[validate(nested)]
    pub remote: Option<RemoteConfig>,
}

impl LoaderConfig {
    /// Start a config for a local manifest
    pub fn builder<P: AsRef<Path>>(manifest: P, minibatch_size: usize) -> LoaderConfigBuilder {
        LoaderConfigBuilder {
            provider: None,
            config: LoaderConfig {
                manifest_filename: Some(manifest.as_ref().to_path_buf()),
                minibatch_size,
                macrobatch_size: 0,
                cache_directory: None,
                shuffle_every_epoch: false,
                shuffle_manifest: false,
                random_seed: 0,
                subset_percent: default_subset_percent(),
                repo_directory: None,
                decode_threads: None,
                pool_depth: default_pool_depth(),
                provider: ProviderConfig {
                    kind: String::new(),
                    data_config: Value::Null,
                    target_config: Value::Null,
                },
                remote: None,
            },
        }
    }

    /// Read a `.json` or `.toml` file
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let config: LoaderConfig = match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => toml::from_str(&text)?,
            _ => serde_json::from_str(&text)?,
        };
        config.check()?;
        Ok(config)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: LoaderConfig = serde_json::from_str(json)?;
        config.check()?;
        Ok(config)
    }

    /// Field validation plus cross-field rules
    pub fn check(&self) -> Result<()> {
        self.validate()?;
        self.provider.check()?;
        if self.manifest_filename.is_none() && self.remote.is_none() {
            return Err(LoaderError::Config(
                "manifest_filename is required without a remote block source".into(),
            ));
        }
        Ok(())
    }

    /// Effective block size
    pub fn block_size(&self) -> usize {
        if self.macrobatch_size == 0 {
            self.minibatch_size
        } else {
            self.macrobatch_size
        }
    }
}

/// Fluent construction of a [`LoaderConfig`]
#[derive(Debug, Clone)]
pub struct LoaderConfigBuilder {
    config: LoaderConfig,
    provider: Option<ProviderConfig>,
}

impl LoaderConfigBuilder {
    pub fn macrobatch_size(mut self, size: usize) -> Self {
        self.config.macrobatch_size = size;
        self
    }

    pub fn with_cache_directory<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.config.cache_directory = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn with_shuffle(mut self, random_seed: u64) -> Self {
        self.config.shuffle_every_epoch = true;
        self.config.random_seed = random_seed;
        self
    }

    pub fn with_manifest_shuffle(mut self) -> Self {
        self.config.shuffle_manifest = true;
        self
    }

    pub fn subset_percent(mut self, percent: u32) -> Self {
        self.config.subset_percent = percent;
        self
    }

    pub fn repo_directory<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.config.repo_directory = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn decode_threads(mut self, threads: usize) -> Self {
        self.config.decode_threads = Some(threads);
        self
    }

    pub fn pool_depth(mut self, depth: usize) -> Self {
        self.config.pool_depth = depth;
        self
    }

    /// Required: there is no default provider
    pub fn provider(mut self, provider: ProviderConfig) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn remote(mut self, remote: RemoteConfig) -> Self {
        self.config.remote = Some(remote);
        self
    }

    pub fn build(self) -> Result<LoaderConfig> {
        let mut config = self.config;
        config.provider = self
            .provider
            .ok_or_else(|| LoaderError::Config("a provider is required".into()))?;
        config.check()?;
        Ok(config)
    }
}
