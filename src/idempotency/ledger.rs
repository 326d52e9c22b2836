//! Event ledger helpers
//!
//! The existence check is only a fast path. The authoritative guard is the
//! storage uniqueness constraint on (event id, event type): a violation on
//! insert or at commit means another caller recorded the event first.

use serde::{Deserialize, Serialize};

use crate::domain::{EventType, SubscriptionEventRecord};
use crate::store::{StorageResult, Transaction, SUBSCRIPTION_EVENT_KEY};

/// What happened to an event submitted to the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerOutcome {
    /// First delivery; the event was processed and recorded
    Recorded,
    /// Already recorded; nothing was changed
    Duplicate,
}

impl LedgerOutcome {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, LedgerOutcome::Duplicate)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerOutcome::Recorded => "recorded",
            LedgerOutcome::Duplicate => "duplicate",
        }
    }
}

/// Whether the (id, type) pair is already in the ledger
pub async fn is_recorded(
    tx: &mut dyn Transaction,
    subscription_event_id: &str,
    event_type: EventType,
) -> StorageResult<bool> {
    tx.exists_event_with_type(subscription_event_id, event_type)
        .await
}

/// Insert the ledger row. A uniqueness violation becomes `Duplicate`.
///
/// After `Duplicate` the transaction must not be committed: on PostgreSQL it
/// is already aborted, and any earlier writes belong to a losing delivery.
pub async fn record(
    tx: &mut dyn Transaction,
    record: SubscriptionEventRecord,
) -> StorageResult<LedgerOutcome> {
    let (event_id, event_type) = (record.subscription_event_id.clone(), record.event_type);
    match tx.save_event(record).await {
        Ok(()) => Ok(LedgerOutcome::Recorded),
        Err(e) if e.violates(SUBSCRIPTION_EVENT_KEY) => {
            tracing::info!(
                subscription_event_id = %event_id,
                event_type = %event_type,
                "Subscription event already recorded on insert"
            );
            Ok(LedgerOutcome::Duplicate)
        }
        Err(e) => Err(e),
    }
}

/// Commit the unit of work. A commit-time violation of the ledger key
/// becomes `Duplicate` and nothing from the transaction is applied. Other
/// violations are returned as errors.
pub async fn commit(tx: Box<dyn Transaction>) -> StorageResult<LedgerOutcome> {
    match tx.commit().await {
        Ok(()) => Ok(LedgerOutcome::Recorded),
        Err(e) if e.violates(SUBSCRIPTION_EVENT_KEY) => {
            tracing::info!("Subscription event recorded concurrently; commit rejected");
            Ok(LedgerOutcome::Duplicate)
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PlanType;
    use crate::store::{Database, MemoryDatabase};

    fn payment(id: &str) -> SubscriptionEventRecord {
        SubscriptionEventRecord::new(id, EventType::Payment, 7, PlanType::Regular)
    }

    #[tokio::test]
    async fn test_sequential_duplicate_is_detected() {
        let db = MemoryDatabase::new();

        let mut tx = db.begin().await.unwrap();
        assert!(!is_recorded(tx.as_mut(), "evt-1", EventType::Payment).await.unwrap());
        assert_eq!(record(tx.as_mut(), payment("evt-1")).await.unwrap(), LedgerOutcome::Recorded);
        assert_eq!(commit(tx).await.unwrap(), LedgerOutcome::Recorded);

        let mut tx = db.begin().await.unwrap();
        assert!(is_recorded(tx.as_mut(), "evt-1", EventType::Payment).await.unwrap());
        assert_eq!(record(tx.as_mut(), payment("evt-1")).await.unwrap(), LedgerOutcome::Duplicate);
        drop(tx);

        assert_eq!(db.subscription_events().await.len(), 1);
    }

    #[tokio::test]
    async fn test_race_resolved_at_commit() {
        let db = MemoryDatabase::new();

        let mut first = db.begin().await.unwrap();
        let mut second = db.begin().await.unwrap();

        assert!(!is_recorded(first.as_mut(), "evt-2", EventType::Payment).await.unwrap());
        assert!(!is_recorded(second.as_mut(), "evt-2", EventType::Payment).await.unwrap());

        assert_eq!(record(first.as_mut(), payment("evt-2")).await.unwrap(), LedgerOutcome::Recorded);
        assert_eq!(record(second.as_mut(), payment("evt-2")).await.unwrap(), LedgerOutcome::Recorded);

        assert_eq!(commit(first).await.unwrap(), LedgerOutcome::Recorded);
        assert_eq!(commit(second).await.unwrap(), LedgerOutcome::Duplicate);

        assert_eq!(db.subscription_events().await.len(), 1);
    }

    #[tokio::test]
    async fn test_other_event_type_is_not_a_duplicate() {
        let db = MemoryDatabase::new();

        let mut tx = db.begin().await.unwrap();
        record(tx.as_mut(), payment("evt-3")).await.unwrap();
        let subscribe = SubscriptionEventRecord::new("evt-3", EventType::Subscribe, 7, PlanType::Regular);
        assert_eq!(record(tx.as_mut(), subscribe).await.unwrap(), LedgerOutcome::Recorded);
        commit(tx).await.unwrap();

        assert_eq!(db.subscription_events().await.len(), 2);
    }

    #[test]
    fn test_outcome_labels() {
        assert!(LedgerOutcome::Duplicate.is_duplicate());
        assert!(!LedgerOutcome::Recorded.is_duplicate());
        assert_eq!(LedgerOutcome::Recorded.as_str(), "recorded");
    }
}
