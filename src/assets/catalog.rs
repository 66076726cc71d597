use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Context;
use rayon::prelude::*;
use sha2::{Digest as _, Sha256};

use crate::{
    assets::codec::{ImageCodec, PixelBuffer},
    foundation::error::{GenError, GenResult},
};

/// SHA-256 of an asset file's raw bytes.
pub type Fingerprint = [u8; 32];

/// One trait image usable to fill a layer slot.
#[derive(Clone, Debug)]
pub struct Asset {
    /// Trait value, taken from the file name before the last `#`.
    pub name: String,
    /// Layer display name (`trait_type`).
    pub layer: String,
    pub path: PathBuf,
    /// Relative selection weight, always finite and > 0.
    pub rarity: f64,
    pub fingerprint: Fingerprint,
    pub pixels: Arc<PixelBuffer>,
}

/// Loads trait images per layer folder and caches them by full path.
///
/// A folder referenced by several trait sets is decoded once; later loads only rebind
/// [`Asset::layer`].
pub struct AssetCatalog {
    codec: Arc<dyn ImageCodec>,
    cache: HashMap<PathBuf, Arc<Asset>>,
    decoded: usize,
}

impl AssetCatalog {
    pub fn new(codec: Arc<dyn ImageCodec>) -> Self {
        Self {
            codec,
            cache: HashMap::new(),
            decoded: 0,
        }
    }

    /// Number of files actually read and decoded so far.
    pub fn decoded_files(&self) -> usize {
        self.decoded
    }

    /// Load every asset in `folder`, in file-name order, tagging each with `display_name`.
    #[tracing::instrument(skip(self))]
    pub fn load(&mut self, folder: &Path, display_name: &str) -> GenResult<Vec<Arc<Asset>>> {
        let files = self.list_asset_files(folder)?;

        let mut parsed = Vec::with_capacity(files.len());
        for path in files {
            let (name, rarity) = parse_asset_file_name(&path)?;
            parsed.push((path, name, rarity));
        }

        let codec = self.codec.as_ref();
        let fresh = parsed
            .par_iter()
            .filter(|(path, _, _)| !self.cache.contains_key(path))
            .map(|(path, name, rarity)| -> GenResult<Asset> {
                tracing::debug!(path = %path.display(), "loading asset");
                let bytes =
                    std::fs::read(path).with_context(|| format!("read '{}'", path.display()))?;
                let pixels = codec.decode(&bytes).map_err(|e| with_path(e, path))?;
                Ok(Asset {
                    name: name.clone(),
                    layer: display_name.to_string(),
                    path: path.clone(),
                    rarity: *rarity,
                    fingerprint: fingerprint(&bytes),
                    pixels: Arc::new(pixels),
                })
            })
            .collect::<GenResult<Vec<_>>>()?;

        self.decoded += fresh.len();
        for asset in fresh {
            self.cache.insert(asset.path.clone(), Arc::new(asset));
        }

        let mut out = Vec::with_capacity(parsed.len());
        for (path, _, _) in &parsed {
            let cached = self.cache.get(path).ok_or_else(|| {
                GenError::pipeline(format!("asset '{}' missing from cache", path.display()))
            })?;
            if cached.layer == display_name {
                out.push(cached.clone());
            } else {
                out.push(Arc::new(Asset {
                    layer: display_name.to_string(),
                    ..Asset::clone(cached)
                }));
            }
        }
        Ok(out)
    }

    fn list_asset_files(&self, folder: &Path) -> GenResult<Vec<PathBuf>> {
        let entries = std::fs::read_dir(folder).map_err(|e| {
            GenError::config(format!(
                "fail to enumerate layer folder '{}': {e}",
                folder.display()
            ))
        })?;

        let ext = self.codec.extension();
        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.with_context(|| format!("list '{}'", folder.display()))?;
            let file_type = entry
                .file_type()
                .with_context(|| format!("stat '{}'", entry.path().display()))?;
            if file_type.is_dir() {
                continue;
            }
            let path = entry.path();
            let matches_ext = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case(ext));
            if matches_ext {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

/// Split `<trait-name>#<rarity>.<ext>` into the trait name and its rarity weight.
///
/// The separator is the last `#` of the file stem, so trait names may contain `#`.
pub fn parse_asset_file_name(path: &Path) -> GenResult<(String, f64)> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| GenError::config(format!("file '{}' has no usable name", path.display())))?;

    let Some((name, rarity)) = stem.rsplit_once('#') else {
        return Err(GenError::config(format!(
            "file '{}' doesn't have rarity info",
            path.display()
        )));
    };
    if name.is_empty() {
        return Err(GenError::config(format!(
            "file '{}' has blank name",
            path.display()
        )));
    }

    let rarity: f64 = rarity.trim().parse().map_err(|e| {
        GenError::config(format!(
            "file '{}' has invalid rarity info '{rarity}': {e}",
            path.display()
        ))
    })?;
    if !(rarity.is_finite() && rarity > 0.0) {
        return Err(GenError::config(format!(
            "file '{}' has invalid rarity {rarity}, must be > 0",
            path.display()
        )));
    }

    Ok((name.to_string(), rarity))
}

pub fn fingerprint(bytes: &[u8]) -> Fingerprint {
    Sha256::digest(bytes).into()
}

fn with_path(err: GenError, path: &Path) -> GenError {
    match err {
        GenError::Codec(msg) => GenError::codec(format!("'{}': {msg}", path.display())),
        other => other,
    }
}

#[cfg(test)]
#[path = "../../tests/unit/assets/catalog.rs"]
mod tests;
