use std::sync::Arc;

use rand::{Rng, seq::IndexedRandom as _, seq::SliceRandom as _};
use serde::{Deserialize, Serialize};

use crate::{
    assets::catalog::Asset,
    foundation::error::{GenError, GenResult},
};

/// Exactly `N` asset choices for one layer, in slot order.
pub type Pool = Vec<Arc<Asset>>;

/// How slots left over after proportional allocation are filled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShortfallFill {
    /// Every asset equally likely, regardless of rarity.
    #[default]
    Uniform,
    /// Assets drawn proportionally to rarity.
    Weighted,
}

/// Expands a layer's assets into a rarity-proportional, shuffled pool.
#[derive(Clone, Copy, Debug, Default)]
pub struct TraitDistributor {
    pub fill: ShortfallFill,
}

impl TraitDistributor {
    pub fn new(fill: ShortfallFill) -> Self {
        Self { fill }
    }

    /// Build a pool of exactly `n` entries.
    ///
    /// Asset `i` receives `floor(n * rarity_i / total)` copies; the remaining slots are filled
    /// one at a time according to [`ShortfallFill`], then the pool is shuffled.
    pub fn pool<R: Rng + ?Sized>(
        &self,
        n: u64,
        assets: &[Arc<Asset>],
        rng: &mut R,
    ) -> GenResult<Pool> {
        if n == 0 {
            return Ok(Vec::new());
        }
        if assets.is_empty() {
            return Err(GenError::config(format!(
                "cannot fill {n} slots from an empty asset list"
            )));
        }

        let weights = assets.iter().map(|a| a.rarity).collect::<Vec<_>>();
        let mut pool = with_slots(n, "layer pool")?;
        for (asset, count) in assets.iter().zip(base_counts(n, &weights)) {
            pool.extend(std::iter::repeat_n(asset, count as usize).cloned());
        }

        while (pool.len() as u64) < n {
            let pick = match self.fill {
                ShortfallFill::Uniform => &assets[rng.random_range(0..assets.len())],
                ShortfallFill::Weighted => assets
                    .choose_weighted(rng, |a| a.rarity)
                    .map_err(|e| GenError::config(format!("weighted shortfall fill: {e}")))?,
            };
            pool.push(pick.clone());
        }

        pool.shuffle(rng);
        Ok(pool)
    }
}

/// Empty vector with room for `n` entries, or a config error when `n` cannot be allocated.
pub fn with_slots<T>(n: u64, what: &str) -> GenResult<Vec<T>> {
    let too_large = || GenError::config(format!("{what} of {n} items is too large to allocate"));
    let len = usize::try_from(n).map_err(|_| too_large())?;
    let mut v = Vec::new();
    v.try_reserve_exact(len).map_err(|_| too_large())?;
    Ok(v)
}

/// Proportional share `floor(n * w_i / sum(w))` for each weight.
///
/// The sum never exceeds `n`, even when floating point error rounds a share up.
pub fn base_counts(n: u64, weights: &[f64]) -> Vec<u64> {
    let total: f64 = weights.iter().sum();
    let mut left = n;
    weights
        .iter()
        .map(|w| {
            let share = if total > 0.0 {
                (n as f64 * w / total).floor() as u64
            } else {
                0
            };
            let share = share.min(left);
            left -= share;
            share
        })
        .collect()
}

#[cfg(test)]
#[path = "../../tests/unit/distribute/pool.rs"]
mod tests;
