use std::{collections::BTreeMap, path::Path};

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

use crate::{
    distribute::{dedup::DEFAULT_MAX_ATTEMPTS, pool::ShortfallFill},
    foundation::error::{GenError, GenResult},
    metadata::BaseUri,
};

/// One layer reference inside a trait set.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LayerRef {
    /// Folder name under the layers root.
    pub name: String,
    /// Optional `trait_type` override; defaults to `name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl LayerRef {
    /// Name written as `trait_type` in metadata.
    pub fn display_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.name)
    }
}

/// An independently configured sub-collection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TraitSetConfig {
    /// Optional item name prefix; defaults to the collection name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Number of items produced by this trait set.
    pub size: u64,
    /// Per-set override of [`Config::check_duplication`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_duplication: Option<bool>,
    /// Layers in compositing order (bottom first).
    #[serde(rename = "traits")]
    pub layers: Vec<LayerRef>,
}

/// Collection configuration, loaded once and passed by reference to every component.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Collection name, used as the default item name prefix.
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Base URI the image file name is resolved against.
    pub base_uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_id: Option<u64>,
    pub trait_sets: Vec<TraitSetConfig>,
    pub width: u32,
    pub height: u32,
    /// Extra top-level metadata fields, merged last.
    #[serde(default)]
    pub additional_data: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub is_solana: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solana_creator_address: Option<String>,
    #[serde(default)]
    pub check_duplication: bool,
    /// Scans allowed per trait set before giving up on deduplication.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dedup_max_attempts: Option<u32>,
    #[serde(default)]
    pub shortfall_fill: ShortfallFill,
}

impl Config {
    /// Read, parse and validate a YAML configuration file.
    pub fn load(path: impl AsRef<Path>) -> GenResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config '{}'", path.display()))?;
        let cfg: Self = serde_yaml_ng::from_str(&text)
            .map_err(|e| GenError::config(format!("parse config '{}': {e}", path.display())))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse and validate a YAML configuration document.
    pub fn from_yaml(text: &str) -> GenResult<Self> {
        let cfg: Self =
            serde_yaml_ng::from_str(text).map_err(|e| GenError::config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Write this configuration as YAML.
    pub fn save(&self, path: impl AsRef<Path>) -> GenResult<()> {
        let path = path.as_ref();
        let text = serde_yaml_ng::to_string(self).context("encode config yaml")?;
        std::fs::write(path, text).with_context(|| format!("write config '{}'", path.display()))?;
        Ok(())
    }

    /// Starter configuration written by `join-layers init`.
    pub fn template() -> Self {
        let layers = [
            "Background",
            "Eyeball",
            "Eye color",
            "Iris",
            "Shine",
            "Bottom lid",
            "Top lid",
        ];
        Self {
            name: "NFT Collection".to_string(),
            description: "Your first ever NFT collection".to_string(),
            base_uri: "ipfs://replace-with-your-ipfs-or-https-url/".to_string(),
            start_id: Some(0),
            trait_sets: vec![TraitSetConfig {
                name: None,
                size: 100,
                check_duplication: None,
                layers: layers
                    .iter()
                    .map(|name| LayerRef {
                        name: (*name).to_string(),
                        display_name: None,
                    })
                    .collect(),
            }],
            width: 2048,
            height: 2048,
            additional_data: BTreeMap::new(),
            is_solana: false,
            solana_creator_address: None,
            check_duplication: true,
            dedup_max_attempts: None,
            shortfall_fill: ShortfallFill::Uniform,
        }
    }

    pub fn validate(&self) -> GenResult<()> {
        BaseUri::parse(&self.base_uri)?;
        if self.width == 0 || self.height == 0 {
            return Err(GenError::config(format!(
                "canvas must be non-empty, got {}x{}",
                self.width, self.height
            )));
        }
        if self.dedup_max_attempts == Some(0) {
            return Err(GenError::config("dedup_max_attempts must be >= 1 when set"));
        }
        let mut total = 0u64;
        for (idx, set) in self.trait_sets.iter().enumerate() {
            if set.layers.is_empty() {
                return Err(GenError::config(format!("trait set #{idx} has no traits")));
            }
            total = total.checked_add(set.size).ok_or_else(|| {
                GenError::config(format!(
                    "trait set #{idx} size {} pushes the collection past {} items",
                    set.size,
                    u64::MAX
                ))
            })?;
            if let Some(layer) = set.layers.iter().find(|l| l.name.trim().is_empty()) {
                return Err(GenError::config(format!(
                    "trait set #{idx} has a trait with a blank folder name ({layer:?})"
                )));
            }
        }
        if self.is_solana
            && self
                .solana_creator_address
                .as_deref()
                .is_none_or(|a| a.trim().is_empty())
        {
            return Err(GenError::config("is_solana requires solana_creator_address"));
        }
        Ok(())
    }

    /// First item ID of the run.
    pub fn start_id(&self) -> u64 {
        self.start_id.unwrap_or(0)
    }

    /// Total number of items across every trait set, saturating at `u64::MAX`.
    pub fn total_size(&self) -> u64 {
        self.trait_sets
            .iter()
            .fold(0u64, |acc, s| acc.saturating_add(s.size))
    }

    /// Whether `set` runs the dedup pass.
    pub fn dedup_enabled(&self, set: &TraitSetConfig) -> bool {
        set.check_duplication.unwrap_or(self.check_duplication)
    }

    pub fn dedup_max_attempts(&self) -> u32 {
        self.dedup_max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS)
    }

    /// Item name prefix for `set`.
    pub fn name_prefix<'a>(&'a self, set: &'a TraitSetConfig) -> &'a str {
        set.name.as_deref().unwrap_or(&self.name)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/config.rs"]
mod tests;
