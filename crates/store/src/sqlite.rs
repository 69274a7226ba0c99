//! SQLite-backed store.
//!
//! Addresses and digests are stored hex-encoded; recipient and proof lists as
//! JSON text columns, with amounts as decimal strings.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use cadence_core::{unix_now, Address, Digest, MerkleProof, PipelinePhase, Recipient, ScheduleCommitment};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{PhaseJournal, Result, ScheduleStore, StoreError};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS schedules (
    schedule TEXT PRIMARY KEY,
    schedule_id TEXT NOT NULL,
    vault_employer TEXT NOT NULL,
    token_mint TEXT NOT NULL,
    merkle_root TEXT NOT NULL,
    recipients TEXT NOT NULL,
    proofs TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_schedules_vault_employer ON schedules (vault_employer);
CREATE INDEX IF NOT EXISTS idx_schedules_created_at ON schedules (created_at);

CREATE TABLE IF NOT EXISTS pipeline_phases (
    schedule TEXT PRIMARY KEY,
    phase TEXT NOT NULL,
    updated_at INTEGER NOT NULL
);
";

const SELECT_COLUMNS: &str =
    "schedule, schedule_id, vault_employer, token_mint, merkle_root, recipients, proofs, created_at";

#[derive(Serialize, Deserialize)]
struct StoredRecipient {
    address: String,
    amount: String,
}

#[derive(Serialize, Deserialize)]
struct StoredProof {
    leaf_index: u32,
    siblings: Vec<String>,
}

/// Raw row, decoded outside the rusqlite row closure.
struct Row {
    schedule: String,
    schedule_id: String,
    vault_employer: String,
    token_mint: String,
    merkle_root: String,
    recipients: String,
    proofs: String,
    created_at: i64,
}

pub struct SqliteStore {
    db: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Wrap an open connection, creating tables if needed.
    pub fn new(db: Connection) -> Result<Self> {
        db.execute_batch(SCHEMA)?;
        Ok(Self { db: Arc::new(Mutex::new(db)) })
    }

    pub fn open(path: &Path) -> Result<Self> {
        debug!("Opening schedule store at {}", path.display());
        Self::new(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::new(Connection::open_in_memory()?)
    }

    #[cfg(test)]
    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        lock(&self.db)
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || f(&*lock(&db)?))
            .await
            .map_err(|e| StoreError::Unavailable(format!("sqlite task failed: {}", e)))?
    }
}

fn lock(db: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>> {
    db.lock()
        .map_err(|_| StoreError::Unavailable("sqlite connection lock poisoned".to_string()))
}

/// Column values for one `schedules` row, in insert order.
struct EncodedRow {
    schedule: String,
    schedule_id: String,
    vault_employer: String,
    token_mint: String,
    merkle_root: String,
    recipients: String,
    proofs: String,
    created_at: i64,
}

impl EncodedRow {
    fn new(schedule: &Address, commitment: &ScheduleCommitment) -> Result<Self> {
        let recipients: Vec<StoredRecipient> = commitment
            .recipients
            .iter()
            .map(|r| StoredRecipient {
                address: hex::encode(r.address),
                amount: r.amount.to_string(),
            })
            .collect();
        let proofs: Vec<StoredProof> = commitment
            .proofs
            .iter()
            .map(|p| StoredProof {
                leaf_index: p.leaf_index,
                siblings: p.siblings.iter().map(hex::encode).collect(),
            })
            .collect();
        Ok(Self {
            schedule: hex::encode(schedule),
            schedule_id: hex::encode(commitment.schedule_id),
            vault_employer: hex::encode(commitment.vault_employer),
            token_mint: hex::encode(commitment.token_mint),
            merkle_root: hex::encode(commitment.merkle_root),
            recipients: serde_json::to_string(&recipients)?,
            proofs: serde_json::to_string(&proofs)?,
            created_at: commitment.created_at as i64,
        })
    }

    /// Execute `INSERT ... <conflict>`, returning the affected row count.
    fn insert(&self, db: &Connection, on_conflict: &str) -> Result<usize> {
        let sql = format!(
            "INSERT INTO schedules
                (schedule, schedule_id, vault_employer, token_mint, merkle_root, recipients, proofs, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             {}",
            on_conflict
        );
        Ok(db.execute(
            &sql,
            params![
                self.schedule,
                self.schedule_id,
                self.vault_employer,
                self.token_mint,
                self.merkle_root,
                self.recipients,
                self.proofs,
                self.created_at,
                unix_now() as i64,
            ],
        )?)
    }
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Row> {
    Ok(Row {
        schedule: row.get(0)?,
        schedule_id: row.get(1)?,
        vault_employer: row.get(2)?,
        token_mint: row.get(3)?,
        merkle_root: row.get(4)?,
        recipients: row.get(5)?,
        proofs: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn decode_32(schedule: &str, field: &str, value: &str) -> Result<[u8; 32]> {
    let corrupt = |reason: String| StoreError::Corrupt {
        schedule: schedule.to_string(),
        reason: format!("{}: {}", field, reason),
    };
    let bytes = hex::decode(value).map_err(|e| corrupt(e.to_string()))?;
    bytes
        .try_into()
        .map_err(|b: Vec<u8>| corrupt(format!("expected 32 bytes, got {}", b.len())))
}

impl Row {
    fn decode(self) -> Result<ScheduleCommitment> {
        let key = self.schedule.as_str();
        let stored_recipients: Vec<StoredRecipient> = serde_json::from_str(&self.recipients)?;
        let stored_proofs: Vec<StoredProof> = serde_json::from_str(&self.proofs)?;

        let recipients = stored_recipients
            .iter()
            .map(|r| -> Result<Recipient> {
                let amount = r.amount.parse::<u64>().map_err(|e| StoreError::Corrupt {
                    schedule: key.to_string(),
                    reason: format!("amount: {}", e),
                })?;
                Ok(Recipient::new(decode_32(key, "recipient", &r.address)?, amount))
            })
            .collect::<Result<Vec<_>>>()?;

        let proofs = stored_proofs
            .iter()
            .map(|p| -> Result<MerkleProof> {
                let siblings = p
                    .siblings
                    .iter()
                    .map(|s| decode_32(key, "sibling", s))
                    .collect::<Result<Vec<Digest>>>()?;
                Ok(MerkleProof { leaf_index: p.leaf_index, siblings })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(ScheduleCommitment {
            schedule: decode_32(key, "schedule", &self.schedule)?,
            schedule_id: decode_32(key, "schedule_id", &self.schedule_id)?,
            vault_employer: decode_32(key, "vault_employer", &self.vault_employer)?,
            token_mint: decode_32(key, "token_mint", &self.token_mint)?,
            recipients,
            proofs,
            merkle_root: decode_32(key, "merkle_root", &self.merkle_root)?,
            created_at: self.created_at.max(0) as u64,
        })
    }
}

const UPSERT: &str = "ON CONFLICT(schedule) DO UPDATE SET
                schedule_id = excluded.schedule_id,
                vault_employer = excluded.vault_employer,
                token_mint = excluded.token_mint,
                merkle_root = excluded.merkle_root,
                recipients = excluded.recipients,
                proofs = excluded.proofs,
                updated_at = excluded.updated_at";

#[async_trait]
impl ScheduleStore for SqliteStore {
    async fn set(&self, schedule: &Address, commitment: &ScheduleCommitment) -> Result<()> {
        let row = EncodedRow::new(schedule, commitment)?;
        self.with_conn(move |db| row.insert(db, UPSERT).map(|_| ())).await
    }

    async fn insert_if_absent(
        &self,
        schedule: &Address,
        commitment: &ScheduleCommitment,
    ) -> Result<bool> {
        let row = EncodedRow::new(schedule, commitment)?;
        self.with_conn(move |db| Ok(row.insert(db, "ON CONFLICT(schedule) DO NOTHING")? == 1))
            .await
    }

    async fn get(&self, schedule: &Address) -> Result<Option<ScheduleCommitment>> {
        let key = hex::encode(schedule);
        self.with_conn(move |db| {
            let row = db
                .query_row(
                    &format!("SELECT {} FROM schedules WHERE schedule = ?1", SELECT_COLUMNS),
                    [key],
                    read_row,
                )
                .optional()?;
            row.map(Row::decode).transpose()
        })
        .await
    }

    async fn has(&self, schedule: &Address) -> Result<bool> {
        let key = hex::encode(schedule);
        self.with_conn(move |db| {
            let found = db
                .query_row("SELECT 1 FROM schedules WHERE schedule = ?1", [key], |_| Ok(()))
                .optional()?;
            Ok(found.is_some())
        })
        .await
    }

    async fn delete(&self, schedule: &Address) -> Result<bool> {
        let key = hex::encode(schedule);
        self.with_conn(move |db| {
            Ok(db.execute("DELETE FROM schedules WHERE schedule = ?1", [key])? > 0)
        })
        .await
    }

    async fn get_all(&self) -> Result<Vec<ScheduleCommitment>> {
        self.with_conn(|db| {
            let mut stmt = db.prepare(&format!(
                "SELECT {} FROM schedules ORDER BY created_at, schedule",
                SELECT_COLUMNS
            ))?;
            let rows = stmt
                .query_map([], read_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows.into_iter().map(Row::decode).collect()
        })
        .await
    }

    async fn count(&self) -> Result<usize> {
        self.with_conn(|db| {
            let n: i64 = db.query_row("SELECT COUNT(*) FROM schedules", [], |row| row.get(0))?;
            Ok(n.max(0) as usize)
        })
        .await
    }
}

#[async_trait]
impl PhaseJournal for SqliteStore {
    async fn record(&self, schedule: &Address, phase: PipelinePhase) -> Result<()> {
        let key = hex::encode(schedule);
        self.with_conn(move |db| {
            db.execute(
                "INSERT OR REPLACE INTO pipeline_phases (schedule, phase, updated_at) VALUES (?1, ?2, ?3)",
                params![key, phase.as_str(), unix_now() as i64],
            )?;
            Ok(())
        })
        .await
    }

    async fn load(&self, schedule: &Address) -> Result<Option<PipelinePhase>> {
        let key = hex::encode(schedule);
        self.with_conn(move |db| {
            let phase: Option<String> = db
                .query_row(
                    "SELECT phase FROM pipeline_phases WHERE schedule = ?1",
                    [&key],
                    |row| row.get(0),
                )
                .optional()?;
            phase
                .map(|p| {
                    PipelinePhase::parse(&p).ok_or_else(|| StoreError::Corrupt {
                        schedule: key.clone(),
                        reason: format!("unknown phase {:?}", p),
                    })
                })
                .transpose()
        })
        .await
    }

    async fn clear(&self, schedule: &Address) -> Result<()> {
        let key = hex::encode(schedule);
        self.with_conn(move |db| {
            db.execute("DELETE FROM pipeline_phases WHERE schedule = ?1", [key])?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commitment(tag: u8, created_at: u64) -> ScheduleCommitment {
        ScheduleCommitment {
            schedule: [tag; 32],
            schedule_id: [2u8; 32],
            vault_employer: [3u8; 32],
            token_mint: [4u8; 32],
            recipients: vec![
                Recipient::new([5u8; 32], 100_000),
                Recipient::new([6u8; 32], u64::MAX),
            ],
            proofs: vec![
                MerkleProof { leaf_index: 0, siblings: vec![[7u8; 32]] },
                MerkleProof { leaf_index: 1, siblings: vec![[8u8; 32]] },
            ],
            merkle_root: [9u8; 32],
            created_at,
        }
    }

    #[tokio::test]
    async fn test_set_and_get_preserves_commitment() {
        let store = SqliteStore::open_in_memory().unwrap();
        let c = commitment(1, 1_700_000_000);
        store.set(&c.schedule, &c).await.unwrap();

        let loaded = store.get(&c.schedule).await.unwrap().unwrap();
        assert_eq!(loaded, c);
        assert_eq!(loaded.recipients[1].amount, u64::MAX);
    }

    #[tokio::test]
    async fn test_has_delete_missing() {
        let store = SqliteStore::open_in_memory().unwrap();
        let c = commitment(1, 10);
        assert!(!store.has(&c.schedule).await.unwrap());
        assert_eq!(store.get(&c.schedule).await.unwrap(), None);
        assert!(!store.delete(&c.schedule).await.unwrap());

        store.set(&c.schedule, &c).await.unwrap();
        assert!(store.has(&c.schedule).await.unwrap());
        assert!(store.delete(&c.schedule).await.unwrap());
        assert!(!store.has(&c.schedule).await.unwrap());
    }

    #[tokio::test]
    async fn test_upsert_replaces() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut c = commitment(1, 10);
        store.set(&c.schedule, &c).await.unwrap();
        c.merkle_root = [0xAB; 32];
        store.set(&c.schedule, &c).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(store.get(&c.schedule).await.unwrap().unwrap().merkle_root, [0xAB; 32]);
    }

    #[tokio::test]
    async fn test_insert_if_absent_never_overwrites() {
        let store = SqliteStore::open_in_memory().unwrap();
        let first = commitment(1, 10);
        let mut second = commitment(1, 20);
        second.merkle_root = [0xCD; 32];

        assert!(store.insert_if_absent(&first.schedule, &first).await.unwrap());
        assert!(!store.insert_if_absent(&second.schedule, &second).await.unwrap());
        assert_eq!(store.get(&first.schedule).await.unwrap(), Some(first));
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_get_all_ordered_by_creation() {
        let store = SqliteStore::open_in_memory().unwrap();
        for (tag, created) in [(1u8, 30u64), (2, 10), (3, 20)] {
            let c = commitment(tag, created);
            store.set(&c.schedule, &c).await.unwrap();
        }
        let all = store.get_all().await.unwrap();
        let order: Vec<u8> = all.iter().map(|c| c.schedule[0]).collect();
        assert_eq!(order, vec![2, 3, 1]);
    }

    #[tokio::test]
    async fn test_corrupt_row_reported() {
        let store = SqliteStore::open_in_memory().unwrap();
        let c = commitment(1, 10);
        store.set(&c.schedule, &c).await.unwrap();
        store
            .conn()
            .unwrap()
            .execute("UPDATE schedules SET merkle_root = 'zz'", [])
            .unwrap();
        assert!(matches!(
            store.get(&c.schedule).await,
            Err(StoreError::Corrupt { .. })
        ));
    }

    #[tokio::test]
    async fn test_phase_journal_persists() {
        let dir = std::env::temp_dir().join("cadence-store-phase-test");
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("cadence.db");
        let schedule = [4u8; 32];

        {
            let store = SqliteStore::open(&path).unwrap();
            store.record(&schedule, PipelinePhase::Claiming).await.unwrap();
        }

        let reopened = SqliteStore::open(&path).unwrap();
        assert_eq!(reopened.load(&schedule).await.unwrap(), Some(PipelinePhase::Claiming));
        reopened.clear(&schedule).await.unwrap();
        assert_eq!(reopened.load(&schedule).await.unwrap(), None);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
