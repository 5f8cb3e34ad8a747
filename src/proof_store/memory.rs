use super::{ProofStore, PutOutcome};
use async_trait::async_trait;
use blocketch_error::StampResult;
use blocketch_types::{Fingerprint, ProofRecord};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use tokio::sync::RwLock;

/// Non-durable store for tests and ephemeral runs
#[derive(Default)]
pub struct MemoryProofStore {
    records: RwLock<HashMap<Fingerprint, ProofRecord>>,
}

impl MemoryProofStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl ProofStore for MemoryProofStore {
    async fn put_if_absent(
        &self,
        fingerprint: &Fingerprint,
        proof: Vec<u8>,
    ) -> StampResult<PutOutcome> {
        let mut records = self.records.write().await;
        Ok(match records.entry(*fingerprint) {
            Entry::Occupied(existing) => PutOutcome::Existing(existing.get().clone()),
            Entry::Vacant(slot) => {
                let record = ProofRecord::new(*fingerprint, proof);
                slot.insert(record.clone());
                PutOutcome::Created(record)
            }
        })
    }

    async fn get(&self, fingerprint: &Fingerprint) -> StampResult<Option<ProofRecord>> {
        Ok(self.records.read().await.get(fingerprint).cloned())
    }

    async fn ping(&self) -> StampResult<()> {
        Ok(())
    }
}
