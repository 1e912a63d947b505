//! sled-backed Pipeline Instance checkpoints (spec.md §4.2: "durable
//! checkpointing" so a crashed orchestrator can recover a claim's
//! in-flight stage/attempt/status on restart). Mirrors `EvidenceStore`'s
//! one-`sled::Db`-per-store shape, keyed by claim id instead of proof hash.

use shield_types::PipelineInstance;
use sled::Db;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InstanceStoreError {
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

fn instance_key(claim_id: &str) -> Vec<u8> {
    format!("inst/{claim_id}").into_bytes()
}

/// One checkpoint row per claim, overwritten in place as the instance
/// advances. Unlike the Evidence Store's chain, there is no history here —
/// only the latest snapshot needs to survive a restart.
pub struct InstanceStore {
    db: Db,
}

impl InstanceStore {
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self, InstanceStoreError> {
        Ok(Self { db: sled::open(path)? })
    }

    pub fn open_temporary() -> Result<Self, InstanceStoreError> {
        Ok(Self { db: sled::Config::new().temporary(true).open()? })
    }

    pub fn insert(&self, instance: &PipelineInstance) -> Result<(), InstanceStoreError> {
        let bytes = serde_json::to_vec(instance)?;
        self.db.insert(instance_key(&instance.claim_id), bytes)?;
        Ok(())
    }

    pub fn get(&self, claim_id: &str) -> Result<Option<PipelineInstance>, InstanceStoreError> {
        match self.db.get(instance_key(claim_id))? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Load, mutate, and persist an instance's checkpoint. A missing claim
    /// id is a no-op — callers only ever update an instance they already
    /// inserted.
    pub fn update<F>(&self, claim_id: &str, mutate: F) -> Result<(), InstanceStoreError>
    where
        F: FnOnce(&mut PipelineInstance),
    {
        if let Some(mut instance) = self.get(claim_id)? {
            mutate(&mut instance);
            self.insert(&instance)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shield_types::Stage;

    #[test]
    fn insert_then_get_roundtrips() {
        let store = InstanceStore::open_temporary().unwrap();
        let inst = PipelineInstance::new("i1", "c1");
        store.insert(&inst).unwrap();
        assert_eq!(store.get("c1").unwrap().unwrap().instance_id, "i1");
    }

    #[test]
    fn missing_claim_is_none() {
        let store = InstanceStore::open_temporary().unwrap();
        assert!(store.get("nope").unwrap().is_none());
    }

    #[test]
    fn update_persists_across_a_fresh_read() {
        let store = InstanceStore::open_temporary().unwrap();
        store.insert(&PipelineInstance::new("i1", "c1")).unwrap();
        store.update("c1", |inst| inst.advance_to(Stage::Embed)).unwrap();
        let reloaded = store.get("c1").unwrap().unwrap();
        assert_eq!(reloaded.status, shield_types::PipelineStatus::Running { stage: Stage::Embed });
    }

    #[test]
    fn update_on_unknown_claim_is_a_no_op() {
        let store = InstanceStore::open_temporary().unwrap();
        store.update("nope", |inst| inst.advance_to(Stage::Embed)).unwrap();
        assert!(store.get("nope").unwrap().is_none());
    }
}
