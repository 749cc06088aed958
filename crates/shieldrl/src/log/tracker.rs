//! Per-epoch accumulation of episode statistics.

use std::collections::HashMap;

/// Accumulates values over one epoch and averages them at dump time.
///
/// Episode-level quantities (return, cost, length) arrive several times per
/// epoch; scalar quantities (losses, KL) arrive once. Both are stored the
/// same way and averaged, so a single-value key reports itself.
#[derive(Default)]
pub struct EpochTracker {
    values: HashMap<String, Vec<f64>>,
}

impl EpochTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one value under `key`.
    pub fn store(&mut self, key: &str, value: f64) {
        self.values.entry(key.to_string()).or_default().push(value);
    }

    /// Mean of the values recorded under `key` this epoch.
    pub fn mean(&self, key: &str) -> Option<f64> {
        let vals = self.values.get(key)?;
        if vals.is_empty() {
            return None;
        }
        Some(vals.iter().sum::<f64>() / vals.len() as f64)
    }

    /// Number of recordings under `key`.
    pub fn count(&self, key: &str) -> usize {
        self.values.get(key).map_or(0, Vec::len)
    }

    /// Averages of every tracked key, consuming this epoch's data.
    pub fn drain(&mut self) -> HashMap<String, f64> {
        let mut out = HashMap::with_capacity(self.values.len());
        for (key, vals) in self.values.drain() {
            if !vals.is_empty() {
                out.insert(key, vals.iter().sum::<f64>() / vals.len() as f64);
            }
        }
        out
    }
}
