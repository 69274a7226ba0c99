//! Schedule registration: validate an employer's recipient list, commit to it,
//! and keep the full list so the executor can claim later.

use std::sync::Arc;

use cadence_core::{Address, Recipient, ScheduleCommitment, ScheduleId};
use cadence_executor::{Clock, SystemClock};
use cadence_merkle::build_tree;
use cadence_settlement::MAX_RECIPIENTS;
use cadence_store::{ScheduleStore, StoreError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("invalid {field}: {reason}")]
    InvalidField { field: String, reason: String },
    #[error("recipient list is empty")]
    EmptyRecipients,
    #[error("schedule {schedule} is already registered with a different root")]
    Conflict { schedule: String },
    #[error("schedule not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl RegistrationError {
    fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField { field: field.into(), reason: reason.into() }
    }
}

/// Registration payload as received over IPC.
///
/// Every field is optional at the wire level so a missing one is reported by
/// name instead of as a generic decode failure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegistrationRequest {
    /// Schedule account address, base58.
    pub schedule: Option<String>,
    /// Exactly 32 bytes.
    pub schedule_id: Option<Vec<u8>>,
    pub vault_employer: Option<String>,
    pub token_mint: Option<String>,
    pub recipients: Option<Vec<RecipientEntry>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecipientEntry {
    /// Base58 address.
    pub address: String,
    /// Decimal integer string; token amounts do not fit a JSON double.
    pub amount: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Registration {
    pub schedule: String,
    /// Hex.
    pub merkle_root: String,
    pub recipient_count: usize,
    /// False when an identical commitment was already registered.
    pub created: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduleSummary {
    pub schedule: String,
    pub schedule_id: String,
    pub vault_employer: String,
    pub recipient_count: usize,
    pub merkle_root: String,
    pub created_at: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub timestamp: u64,
    pub schedules_registered: usize,
}

pub struct Registry {
    store: Arc<dyn ScheduleStore>,
    clock: Arc<dyn Clock>,
}

impl Registry {
    pub fn new(store: Arc<dyn ScheduleStore>) -> Self {
        Self { store, clock: Arc::new(SystemClock) }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Validate, build the merkle commitment, and persist it.
    ///
    /// Commitments are immutable: registering the same schedule again is a
    /// no-op if the root matches and a `Conflict` otherwise. The store insert
    /// is atomic, so of two concurrent registrations only one is `created`.
    pub async fn register(
        &self,
        request: RegistrationRequest,
    ) -> Result<Registration, RegistrationError> {
        let schedule_text = request.schedule.ok_or(RegistrationError::MissingField("schedule"))?;
        let schedule = parse_address("schedule", &schedule_text)?;
        let schedule_id = parse_schedule_id(
            request.schedule_id.ok_or(RegistrationError::MissingField("schedule_id"))?,
        )?;
        let vault_employer = parse_address(
            "vault_employer",
            &request.vault_employer.ok_or(RegistrationError::MissingField("vault_employer"))?,
        )?;
        let token_mint = parse_address(
            "token_mint",
            &request.token_mint.ok_or(RegistrationError::MissingField("token_mint"))?,
        )?;
        let entries = request.recipients.ok_or(RegistrationError::MissingField("recipients"))?;
        let recipients = parse_recipients(&entries)?;

        let tree = build_tree(&recipients).map_err(|_| RegistrationError::EmptyRecipients)?;
        let merkle_root = hex::encode(tree.root);

        let commitment = ScheduleCommitment {
            schedule,
            schedule_id,
            vault_employer,
            token_mint,
            recipients,
            proofs: tree.proofs,
            merkle_root: tree.root,
            created_at: self.clock.now(),
        };

        if !self.store.insert_if_absent(&schedule, &commitment).await? {
            return match self.store.get(&schedule).await? {
                Some(existing)
                    if existing.merkle_root == commitment.merkle_root
                        && existing.schedule_id == schedule_id =>
                {
                    info!(schedule = %schedule_text, "schedule already registered with identical root");
                    Ok(Registration {
                        schedule: schedule_text,
                        merkle_root,
                        recipient_count: existing.recipient_count(),
                        created: false,
                    })
                }
                existing => {
                    warn!(
                        schedule = %schedule_text,
                        existing_root = ?existing.map(|e| hex::encode(e.merkle_root)),
                        new_root = %merkle_root,
                        "rejected re-registration with different commitment"
                    );
                    Err(RegistrationError::Conflict { schedule: schedule_text })
                }
            };
        }

        info!(
            schedule = %schedule_text,
            recipients = commitment.recipient_count(),
            merkle_root = %merkle_root,
            "registered schedule"
        );

        Ok(Registration {
            schedule: schedule_text,
            merkle_root,
            recipient_count: commitment.recipient_count(),
            created: true,
        })
    }

    pub async fn describe(&self, schedule: &str) -> Result<ScheduleSummary, RegistrationError> {
        let address = parse_address("schedule", schedule)?;
        let commitment = self
            .store
            .get(&address)
            .await?
            .ok_or_else(|| RegistrationError::NotFound(schedule.to_string()))?;
        Ok(ScheduleSummary {
            schedule: schedule.to_string(),
            schedule_id: hex::encode(commitment.schedule_id),
            vault_employer: bs58::encode(commitment.vault_employer).into_string(),
            recipient_count: commitment.recipient_count(),
            merkle_root: hex::encode(commitment.merkle_root),
            created_at: commitment.created_at,
        })
    }

    pub async fn health(&self) -> Result<Health, RegistrationError> {
        Ok(Health {
            status: "ok",
            timestamp: self.clock.now(),
            schedules_registered: self.store.count().await?,
        })
    }
}

fn parse_address(field: &str, value: &str) -> Result<Address, RegistrationError> {
    let bytes = bs58::decode(value)
        .into_vec()
        .map_err(|e| RegistrationError::invalid(field, e.to_string()))?;
    Address::try_from(bytes.as_slice())
        .map_err(|_| RegistrationError::invalid(field, format!("expected 32 bytes, got {}", bytes.len())))
}

fn parse_schedule_id(bytes: Vec<u8>) -> Result<ScheduleId, RegistrationError> {
    ScheduleId::try_from(bytes).map_err(|bytes: Vec<u8>| {
        RegistrationError::invalid("schedule_id", format!("expected 32 bytes, got {}", bytes.len()))
    })
}

fn parse_recipients(entries: &[RecipientEntry]) -> Result<Vec<Recipient>, RegistrationError> {
    if entries.is_empty() {
        return Err(RegistrationError::EmptyRecipients);
    }
    if entries.len() > MAX_RECIPIENTS {
        return Err(RegistrationError::invalid(
            "recipients",
            format!("{} recipients exceeds the limit of {}", entries.len(), MAX_RECIPIENTS),
        ));
    }
    entries
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            let address = parse_address(&format!("recipients[{}].address", i), &entry.address)?;
            let amount = entry.amount.trim().parse::<u64>().map_err(|e| {
                RegistrationError::invalid(format!("recipients[{}].amount", i), e.to_string())
            })?;
            Ok(Recipient::new(address, amount))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_merkle::verify_recipient;
    use cadence_store::MemoryStore;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;

    struct FixedClock(AtomicU64);

    impl Clock for FixedClock {
        fn now(&self) -> u64 {
            self.0.load(Ordering::SeqCst)
        }
    }

    fn b58(byte: u8) -> String {
        bs58::encode([byte; 32]).into_string()
    }

    fn entry(byte: u8, amount: &str) -> RecipientEntry {
        RecipientEntry { address: b58(byte), amount: amount.to_string() }
    }

    fn request() -> RegistrationRequest {
        RegistrationRequest {
            schedule: Some(b58(1)),
            schedule_id: Some(vec![2u8; 32]),
            vault_employer: Some(b58(3)),
            token_mint: Some(b58(4)),
            recipients: Some(vec![
                entry(10, "100000"),
                entry(11, "200000"),
                entry(12, "300000"),
            ]),
        }
    }

    fn registry() -> (Registry, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let registry = Registry::new(store.clone())
            .with_clock(Arc::new(FixedClock(AtomicU64::new(1_700_000_000))));
        (registry, store)
    }

    #[tokio::test]
    async fn test_register_persists_verifiable_commitment() {
        let (registry, store) = registry();
        let registration = registry.register(request()).await.unwrap();
        assert!(registration.created);
        assert_eq!(registration.recipient_count, 3);

        let stored = store.get(&[1u8; 32]).await.unwrap().unwrap();
        assert_eq!(hex::encode(stored.merkle_root), registration.merkle_root);
        assert_eq!(stored.created_at, 1_700_000_000);
        assert_eq!(stored.recipients[2].amount, 300_000);
        for (recipient, proof) in stored.recipients.iter().zip(&stored.proofs) {
            assert!(verify_recipient(recipient, proof, &stored.merkle_root));
        }
    }

    #[tokio::test]
    async fn test_missing_fields_are_named() {
        let (registry, _) = registry();
        let cases: [(fn(&mut RegistrationRequest), &str); 5] = [
            (|r| r.schedule = None, "schedule"),
            (|r| r.schedule_id = None, "schedule_id"),
            (|r| r.vault_employer = None, "vault_employer"),
            (|r| r.token_mint = None, "token_mint"),
            (|r| r.recipients = None, "recipients"),
        ];
        for (strip, field) in cases {
            let mut req = request();
            strip(&mut req);
            match registry.register(req).await {
                Err(RegistrationError::MissingField(f)) => assert_eq!(f, field),
                other => panic!("expected missing {}, got {:?}", field, other),
            }
        }
    }

    #[tokio::test]
    async fn test_invalid_fields_rejected() {
        let (registry, store) = registry();

        let mut req = request();
        req.schedule_id = Some(vec![2u8; 31]);
        assert!(matches!(
            registry.register(req).await,
            Err(RegistrationError::InvalidField { ref field, .. }) if field == "schedule_id"
        ));

        let mut req = request();
        req.token_mint = Some("not-base58!".to_string());
        assert!(matches!(
            registry.register(req).await,
            Err(RegistrationError::InvalidField { ref field, .. }) if field == "token_mint"
        ));

        let mut req = request();
        req.recipients = Some(vec![entry(10, "100"), entry(11, "1.5")]);
        assert!(matches!(
            registry.register(req).await,
            Err(RegistrationError::InvalidField { ref field, .. }) if field == "recipients[1].amount"
        ));

        let mut req = request();
        req.recipients = Some(vec![entry(10, "18446744073709551616")]);
        assert!(matches!(registry.register(req).await, Err(RegistrationError::InvalidField { .. })));

        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_empty_and_oversized_recipient_lists() {
        let (registry, _) = registry();

        let mut req = request();
        req.recipients = Some(vec![]);
        assert!(matches!(registry.register(req).await, Err(RegistrationError::EmptyRecipients)));

        let mut req = request();
        req.recipients = Some((0..=MAX_RECIPIENTS).map(|i| entry((i % 200) as u8, "1")).collect());
        assert!(matches!(
            registry.register(req).await,
            Err(RegistrationError::InvalidField { ref field, .. }) if field == "recipients"
        ));
    }

    #[tokio::test]
    async fn test_max_recipients_accepted() {
        let (registry, _) = registry();
        let mut req = request();
        req.recipients = Some((0..MAX_RECIPIENTS).map(|i| entry((i % 200) as u8, "1")).collect());
        let registration = registry.register(req).await.unwrap();
        assert_eq!(registration.recipient_count, MAX_RECIPIENTS);
    }

    #[tokio::test]
    async fn test_reregistration_idempotent_or_conflict() {
        let (registry, store) = registry();
        let first = registry.register(request()).await.unwrap();

        let again = registry.register(request()).await.unwrap();
        assert!(!again.created);
        assert_eq!(again.merkle_root, first.merkle_root);

        let mut changed = request();
        changed.recipients = Some(vec![entry(10, "100001")]);
        assert!(matches!(registry.register(changed).await, Err(RegistrationError::Conflict { .. })));

        let stored = store.get(&[1u8; 32]).await.unwrap().unwrap();
        assert_eq!(hex::encode(stored.merkle_root), first.merkle_root);
    }

    /// Memory store that yields before every read and insert, so concurrent
    /// registrations interleave.
    struct SlowStore(MemoryStore);

    #[async_trait::async_trait]
    impl ScheduleStore for SlowStore {
        async fn set(&self, schedule: &Address, c: &ScheduleCommitment) -> cadence_store::Result<()> {
            self.0.set(schedule, c).await
        }
        async fn insert_if_absent(
            &self,
            schedule: &Address,
            c: &ScheduleCommitment,
        ) -> cadence_store::Result<bool> {
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.0.insert_if_absent(schedule, c).await
        }
        async fn get(&self, schedule: &Address) -> cadence_store::Result<Option<ScheduleCommitment>> {
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.0.get(schedule).await
        }
        async fn has(&self, schedule: &Address) -> cadence_store::Result<bool> {
            self.0.has(schedule).await
        }
        async fn delete(&self, schedule: &Address) -> cadence_store::Result<bool> {
            self.0.delete(schedule).await
        }
        async fn get_all(&self) -> cadence_store::Result<Vec<ScheduleCommitment>> {
            self.0.get_all().await
        }
    }

    #[tokio::test]
    async fn test_concurrent_registrations_keep_one_commitment() {
        let store = Arc::new(SlowStore(MemoryStore::new()));
        let registry = Registry::new(store.clone());

        let mut low = request();
        low.recipients = Some(vec![entry(10, "100")]);
        let mut high = request();
        high.recipients = Some(vec![entry(10, "999")]);

        let (a, b) = tokio::join!(registry.register(low), registry.register(high));
        let created: Vec<Registration> =
            [a, b].into_iter().filter_map(|r| r.ok()).filter(|r| r.created).collect();
        assert_eq!(created.len(), 1);

        let stored = store.get(&[1u8; 32]).await.unwrap().unwrap();
        assert_eq!(hex::encode(stored.merkle_root), created[0].merkle_root);
    }

    #[tokio::test]
    async fn test_describe_and_health() {
        let (registry, _) = registry();
        let health = registry.health().await.unwrap();
        assert_eq!(health.status, "ok");
        assert_eq!(health.schedules_registered, 0);

        let registration = registry.register(request()).await.unwrap();
        let summary = registry.describe(&b58(1)).await.unwrap();
        assert_eq!(summary.schedule_id, hex::encode([2u8; 32]));
        assert_eq!(summary.vault_employer, b58(3));
        assert_eq!(summary.recipient_count, 3);
        assert_eq!(summary.merkle_root, registration.merkle_root);
        assert_eq!(summary.created_at, 1_700_000_000);

        assert!(matches!(registry.describe(&b58(9)).await, Err(RegistrationError::NotFound(_))));
        assert!(matches!(
            registry.describe("xyz").await,
            Err(RegistrationError::InvalidField { .. })
        ));
        assert_eq!(registry.health().await.unwrap().schedules_registered, 1);
    }
}
