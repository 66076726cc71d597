use std::{collections::HashSet, fmt};

use rand::{Rng, seq::SliceRandom as _};
use sha2::{Digest as _, Sha256};

use crate::{
    assets::catalog::Asset,
    distribute::pool::Pool,
    foundation::error::{GenError, GenResult},
};

/// Default number of scans before a trait set is declared infeasible.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 20;

/// Fingerprint over one item's ordered layer selection.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dna(pub [u8; 32]);

impl Dna {
    pub fn of<'a>(layers: impl IntoIterator<Item = &'a Asset>) -> Self {
        let mut h = Sha256::new();
        for asset in layers {
            h.update(asset.fingerprint);
        }
        Self(h.finalize().into())
    }

    /// DNA of slot `k` across `pools`.
    pub fn of_slot(pools: &[Pool], k: usize) -> Self {
        Self::of(pools.iter().map(|p| p[k].as_ref()))
    }
}

impl fmt::Display for Dna {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Dna {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Dna({self})")
    }
}

/// Rejects pool arrangements in which two slots carry the same DNA.
///
/// A scan stops at the first repeat; every layer's pool is then reshuffled independently
/// and the scan restarts from slot 0. The whole pass fails after `max_attempts` scans.
#[derive(Clone, Copy, Debug)]
pub struct Deduplicator {
    pub max_attempts: u32,
}

impl Default for Deduplicator {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl Deduplicator {
    pub fn new(max_attempts: u32) -> Self {
        Self { max_attempts }
    }

    /// Reshuffle `pools` until no two slots share DNA.
    ///
    /// Returns the number of reshuffles performed. `label` names the trait set in logs and
    /// in the capacity error.
    pub fn run<R: Rng + ?Sized>(
        &self,
        label: &str,
        pools: &mut [Pool],
        rng: &mut R,
    ) -> GenResult<u32> {
        let slots = slot_count(pools)?;
        for attempt in 0..self.max_attempts {
            let Some(slot) = first_repeat(pools, slots) else {
                return Ok(attempt);
            };

            let left = self.max_attempts - attempt - 1;
            tracing::warn!(
                trait_set = label,
                slot,
                retries_left = left,
                "dna duplicated, reshuffling"
            );
            for pool in pools.iter_mut() {
                pool.shuffle(rng);
            }
        }

        Err(GenError::capacity(format!(
            "too much duplication in {label} after {} attempts, reduce its size or add more trait variants",
            self.max_attempts
        )))
    }
}

/// Index of the first slot whose DNA already appeared at a lower index.
pub fn first_repeat(pools: &[Pool], slots: usize) -> Option<usize> {
    let mut seen = HashSet::with_capacity(slots);
    (0..slots).find(|&k| !seen.insert(Dna::of_slot(pools, k)))
}

fn slot_count(pools: &[Pool]) -> GenResult<usize> {
    let slots = pools.first().map_or(0, Vec::len);
    if pools.iter().any(|p| p.len() != slots) {
        return Err(GenError::pipeline(
            "layer pools of one trait set must have equal length",
        ));
    }
    Ok(slots)
}

#[cfg(test)]
#[path = "../../tests/unit/distribute/dedup.rs"]
mod tests;
