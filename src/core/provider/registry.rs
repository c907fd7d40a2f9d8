//! Tag-to-provider dispatch
//!
//! A provider tag is either registered whole (`"image_localization"`) or is
//! a comma-separated pair of modality names (`"raw,label"`), in which case
//! the object chain is built from the first modality with `data_config` and
//! the target chain from the second with `target_config`.

use super::{
    Etl, IdentityTransformer, LabelConfig, LabelExtractor, LabelLoader, LabelParamFactory,
    LabelTransformer, NoParams, PairProvider, Provider, RawConfig, RawExtractor, RawLoader,
    RecordEtl,
};
use crate::config::ProviderConfig;
use crate::error::{LoaderError, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Builds a complete provider from its configuration
pub type ProviderFactory = Arc<dyn Fn(&ProviderConfig) -> Result<Box<dyn Provider>> + Send + Sync>;

/// Builds one modality chain from its `data_config` or `target_config`
pub type ModalityFactory = Arc<dyn Fn(&Value) -> Result<Box<dyn RecordEtl>> + Send + Sync>;

#[derive(Clone)]
pub struct ProviderRegistry {
    providers: HashMap<String, ProviderFactory>,
    modalities: HashMap<String, ModalityFactory>,
}

impl ProviderRegistry {
    /// Registry with nothing registered
    pub fn empty() -> Self {
        ProviderRegistry {
            providers: HashMap::new(),
            modalities: HashMap::new(),
        }
    }

    /// Registry with the `raw` and `label` modalities
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register_modality("raw", |config| {
            let config: RawConfig = parse_config("raw", config)?;
            Ok(Box::new(Etl::new(
                RawExtractor,
                NoParams,
                IdentityTransformer,
                RawLoader::new(config.output_len),
            )))
        });
        registry.register_modality("label", |config| {
            let config: LabelConfig = if config.is_null() {
                LabelConfig::default()
            } else {
                parse_config("label", config)?
            };
            let loader = if config.load_float {
                LabelLoader::float(config.load_offset)
            } else {
                LabelLoader::int32()
            };
            Ok(Box::new(Etl::new(
                LabelExtractor::new(config.extract_offset),
                LabelParamFactory::new(config.scale, config.shift),
                LabelTransformer,
                loader,
            )))
        });
        registry
    }

    /// Register a whole provider under `tag`. Takes precedence over
    /// modality pairs.
    pub fn register_provider<F>(&mut self, tag: &str, factory: F)
    where
        F: Fn(&ProviderConfig) -> Result<Box<dyn Provider>> + Send + Sync + 'static,
    {
        self.providers.insert(tag.to_string(), Arc::new(factory));
    }

    pub fn register_modality<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&Value) -> Result<Box<dyn RecordEtl>> + Send + Sync + 'static,
    {
        self.modalities.insert(name.to_string(), Arc::new(factory));
    }

    /// Build a fresh provider instance for `config.kind`
    pub fn create(&self, config: &ProviderConfig) -> Result<Box<dyn Provider>> {
        if let Some(factory) = self.providers.get(&config.kind) {
            return factory(config);
        }

        let (data, target) = config
            .kind
            .split_once(',')
            .ok_or_else(|| LoaderError::UnknownProvider(config.kind.clone()))?;
        let data = self.modality(data.trim(), &config.data_config, &config.kind)?;
        let target = self.modality(target.trim(), &config.target_config, &config.kind)?;

        Ok(Box::new(PairProvider::new(data, target)))
    }

    fn modality(&self, name: &str, config: &Value, tag: &str) -> Result<Box<dyn RecordEtl>> {
        let factory = self
            .modalities
            .get(name)
            .ok_or_else(|| LoaderError::UnknownProvider(tag.to_string()))?;
        factory(config)
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_config<T: serde::de::DeserializeOwned>(modality: &str, config: &Value) -> Result<T> {
    serde_json::from_value(config.clone())
        .map_err(|e| LoaderError::Config(format!("invalid {} config: {}", modality, e)))
}
