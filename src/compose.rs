use std::{path::PathBuf, sync::Arc};

use rand::{Rng, seq::SliceRandom as _};

use crate::{
    assets::catalog::{Asset, AssetCatalog},
    distribute::{
        dedup::{Deduplicator, Dna},
        pool::{Pool, TraitDistributor, with_slots},
    },
    foundation::{
        config::{Config, TraitSetConfig},
        error::{GenError, GenResult},
    },
};

/// One output unit awaiting rendering.
#[derive(Clone, Debug)]
pub struct Item {
    pub id: u64,
    /// Metadata name prefix (`"<prefix> #<id>"`).
    pub name_prefix: Arc<str>,
    /// Selected asset per layer, in compositing order.
    pub layers: Vec<Arc<Asset>>,
}

impl Item {
    pub fn dna(&self) -> Dna {
        Dna::of(self.layers.iter().map(AsRef::as_ref))
    }
}

/// Turns every configured trait set into items and numbers the whole collection.
pub struct ItemComposer<'a> {
    config: &'a Config,
    layers_root: PathBuf,
    catalog: AssetCatalog,
    distributor: TraitDistributor,
    dedup: Deduplicator,
}

impl<'a> ItemComposer<'a> {
    pub fn new(config: &'a Config, layers_root: impl Into<PathBuf>, catalog: AssetCatalog) -> Self {
        Self {
            config,
            layers_root: layers_root.into(),
            catalog,
            distributor: TraitDistributor::new(config.shortfall_fill),
            dedup: Deduplicator::new(config.dedup_max_attempts()),
        }
    }

    /// Compose every trait set, shuffle the union once and assign IDs from the configured
    /// start ID in final order.
    #[tracing::instrument(skip_all)]
    pub fn compose<R: Rng + ?Sized>(&mut self, rng: &mut R) -> GenResult<Vec<Item>> {
        let config = self.config;
        let mut items = with_slots(config.total_size(), "collection")?;
        for (idx, set) in config.trait_sets.iter().enumerate() {
            let pools = self.trait_set_pools(idx, set, rng)?;
            items.extend(columns(config.name_prefix(set), &pools));
        }
        assign_ids(&mut items, config.start_id(), rng)?;
        Ok(items)
    }

    fn trait_set_pools<R: Rng + ?Sized>(
        &mut self,
        idx: usize,
        set: &TraitSetConfig,
        rng: &mut R,
    ) -> GenResult<Vec<Pool>> {
        let label = format!("trait set #{idx}");
        let mut pools = Vec::with_capacity(set.layers.len());
        for layer in &set.layers {
            let folder = self.layers_root.join(&layer.name);
            let assets = self.catalog.load(&folder, layer.display_name())?;
            if assets.is_empty() && set.size > 0 {
                return Err(GenError::config(format!(
                    "layer folder '{}' of {label} has no assets",
                    folder.display()
                )));
            }
            let pool = self.distributor.pool(set.size, &assets, rng)?;
            tracing::debug!(
                trait_set = idx,
                layer = %layer.name,
                variants = assets.len(),
                slots = pool.len(),
                "layer pool built"
            );
            pools.push(pool);
        }

        if self.config.dedup_enabled(set) {
            let reshuffles = self.dedup.run(&label, &mut pools, rng)?;
            tracing::debug!(trait_set = idx, reshuffles, "dna check passed");
        }
        Ok(pools)
    }
}

/// Read slot `k` of every pool into one item, for each `k`.
pub fn columns(name_prefix: &str, pools: &[Pool]) -> Vec<Item> {
    let slots = pools.first().map_or(0, Vec::len);
    let name_prefix: Arc<str> = Arc::from(name_prefix);
    (0..slots)
        .map(|k| Item {
            id: 0,
            name_prefix: name_prefix.clone(),
            layers: pools.iter().map(|p| p[k].clone()).collect(),
        })
        .collect()
}

/// Shuffle `items` and number them `start, start + 1, ...` in the shuffled order.
pub fn assign_ids<R: Rng + ?Sized>(items: &mut [Item], start: u64, rng: &mut R) -> GenResult<()> {
    let count = items.len() as u64;
    if count > 0 && start.checked_add(count - 1).is_none() {
        return Err(GenError::config(format!(
            "start_id {start} leaves no room for {count} items"
        )));
    }

    items.shuffle(rng);
    for (idx, item) in items.iter_mut().enumerate() {
        item.id = start + idx as u64;
    }
    Ok(())
}

#[cfg(test)]
#[path = "../tests/unit/compose.rs"]
mod tests;
