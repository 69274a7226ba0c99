//! In-process store. Contents are lost on restart.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use cadence_core::{Address, PipelinePhase, ScheduleCommitment};

use crate::{PhaseJournal, Result, ScheduleStore, StoreError};

#[derive(Default)]
pub struct MemoryStore {
    commitments: RwLock<BTreeMap<Address, ScheduleCommitment>>,
    phases: RwLock<BTreeMap<Address, PipelinePhase>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Unavailable("memory store lock poisoned".to_string())
}

#[async_trait]
impl ScheduleStore for MemoryStore {
    async fn set(&self, schedule: &Address, commitment: &ScheduleCommitment) -> Result<()> {
        self.commitments
            .write()
            .map_err(poisoned)?
            .insert(*schedule, commitment.clone());
        Ok(())
    }

    async fn insert_if_absent(
        &self,
        schedule: &Address,
        commitment: &ScheduleCommitment,
    ) -> Result<bool> {
        match self.commitments.write().map_err(poisoned)?.entry(*schedule) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(commitment.clone());
                Ok(true)
            }
        }
    }

    async fn get(&self, schedule: &Address) -> Result<Option<ScheduleCommitment>> {
        Ok(self.commitments.read().map_err(poisoned)?.get(schedule).cloned())
    }

    async fn has(&self, schedule: &Address) -> Result<bool> {
        Ok(self.commitments.read().map_err(poisoned)?.contains_key(schedule))
    }

    async fn delete(&self, schedule: &Address) -> Result<bool> {
        Ok(self.commitments.write().map_err(poisoned)?.remove(schedule).is_some())
    }

    async fn get_all(&self) -> Result<Vec<ScheduleCommitment>> {
        Ok(self.commitments.read().map_err(poisoned)?.values().cloned().collect())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.commitments.read().map_err(poisoned)?.len())
    }
}

#[async_trait]
impl PhaseJournal for MemoryStore {
    async fn record(&self, schedule: &Address, phase: PipelinePhase) -> Result<()> {
        self.phases.write().map_err(poisoned)?.insert(*schedule, phase);
        Ok(())
    }

    async fn load(&self, schedule: &Address) -> Result<Option<PipelinePhase>> {
        Ok(self.phases.read().map_err(poisoned)?.get(schedule).copied())
    }

    async fn clear(&self, schedule: &Address) -> Result<()> {
        self.phases.write().map_err(poisoned)?.remove(schedule);
        Ok(())
    }
}
