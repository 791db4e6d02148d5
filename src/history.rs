// src/history.rs
// Session generation history, most recent batch first.
//
// Batches and their assets are kept in ordered maps keyed by id so every
// update targets exactly one asset, however out of order the generation
// calls complete.

use indexmap::IndexMap;

use crate::models::{Asset, AssetId, Batch, BatchId, BatchView};

#[derive(Debug, Default)]
pub struct History {
    batches: IndexMap<BatchId, Batch>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prepend(&mut self, batch: Batch) {
        self.batches.shift_insert(0, batch.id.clone(), batch);
    }

    pub fn batch(&self, batch_id: &BatchId) -> Option<&Batch> {
        self.batches.get(batch_id)
    }

    pub fn batches(&self) -> impl Iterator<Item = &Batch> {
        self.batches.values()
    }

    pub fn views(&self) -> Vec<BatchView> {
        self.batches.values().map(Batch::view).collect()
    }

    /// Batch owning `asset_id`.
    pub fn owner_of(&self, asset_id: &AssetId) -> Option<&BatchId> {
        self.batches
            .iter()
            .find(|(_, batch)| batch.assets.contains_key(asset_id))
            .map(|(id, _)| id)
    }

    pub fn find_asset(&self, asset_id: &AssetId) -> Option<(&Batch, &Asset)> {
        self.batches
            .values()
            .find_map(|batch| batch.assets.get(asset_id).map(|asset| (batch, asset)))
    }

    /// Apply `update` to one asset. Returns false, touching nothing, when the
    /// pair does not exist.
    pub fn update_asset<F>(&mut self, batch_id: &BatchId, asset_id: &AssetId, update: F) -> bool
    where
        F: FnOnce(&mut Asset),
    {
        match self
            .batches
            .get_mut(batch_id)
            .and_then(|batch| batch.assets.get_mut(asset_id))
        {
            Some(asset) => {
                update(asset);
                true
            }
            None => false,
        }
    }
}
