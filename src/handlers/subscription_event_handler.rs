//! Subscription Event Handler
//!
//! Processes subscribe (`S`) and payment (`P`) events delivered by the
//! payment gateway. Each (event id, event type) pair takes effect at most
//! once: the ledger row is written in the same unit of work as the
//! subscription change, and a uniqueness violation on that row undoes both.
//!
//! Two subscribe events with different ids can race for the same member and
//! plan. The loser hits the active-subscription key and is replayed once in
//! a fresh unit of work, where it reuses the winner's subscription.

use std::sync::Arc;

use chrono::Utc;

use crate::domain::{
    EventType, OperationContext, PlanType, Subscription, SubscriptionError,
    SubscriptionEventRecord, SubscriptionPlan,
};
use crate::error::AppError;
use crate::idempotency::{ledger, LedgerOutcome};
use crate::store::{Database, Transaction, ACTIVE_SUBSCRIPTION_KEY};

use super::{SubscriptionEventCommand, SubscriptionEventResult};

// =========================================================================
// M211: SubscriptionEventHandler
// =========================================================================

pub struct SubscriptionEventHandler {
    db: Arc<dyn Database>,
}

impl SubscriptionEventHandler {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    pub async fn handle(
        &self,
        command: SubscriptionEventCommand,
        context: &OperationContext,
    ) -> Result<SubscriptionEventResult, AppError> {
        if command.subscription_event_id.trim().is_empty() {
            return Err(AppError::InvalidRequest(
                "subscriptionEventId must not be blank".to_string(),
            ));
        }

        match self.process(&command, context).await {
            Err(AppError::Storage(e)) if e.violates(ACTIVE_SUBSCRIPTION_KEY) => {
                tracing::info!(
                    correlation_id = ?context.correlation_id,
                    subscription_event_id = %command.subscription_event_id,
                    subscriber_id = command.subscriber_id,
                    "Subscription activated concurrently; replaying event"
                );
                self.process(&command, context).await
            }
            result => result,
        }
    }

    async fn process(
        &self,
        command: &SubscriptionEventCommand,
        context: &OperationContext,
    ) -> Result<SubscriptionEventResult, AppError> {
        let mut tx = self.db.begin().await?;

        // M212: Fast path for redeliveries
        if ledger::is_recorded(tx.as_mut(), &command.subscription_event_id, command.event_type)
            .await?
        {
            self.log_duplicate(command, context);
            return Ok(SubscriptionEventResult::duplicate(command));
        }

        let plan = resolve_plan(tx.as_mut(), command).await?;
        let plan_id = plan
            .subscription_plan_id
            .ok_or_else(|| AppError::Internal("Stored plan has no id".to_string()))?;

        let subscription = match command.event_type {
            EventType::Subscribe => subscribe(tx.as_mut(), command.subscriber_id, plan_id).await?,
            EventType::Payment => {
                require_active_subscription(tx.as_mut(), command.subscriber_id, &plan).await?
            }
        };

        // M213: Ledger row, authoritative against concurrent deliveries
        let record = SubscriptionEventRecord::new(
            command.subscription_event_id.clone(),
            command.event_type,
            command.subscriber_id,
            command.plan_type,
        );
        if ledger::record(tx.as_mut(), record).await?.is_duplicate() {
            // Dropping `tx` rolls back the subscription change
            self.log_duplicate(command, context);
            return Ok(SubscriptionEventResult::duplicate(command));
        }
        if ledger::commit(tx).await?.is_duplicate() {
            self.log_duplicate(command, context);
            return Ok(SubscriptionEventResult::duplicate(command));
        }

        tracing::info!(
            correlation_id = ?context.correlation_id,
            subscription_event_id = %command.subscription_event_id,
            event_type = %command.event_type,
            subscriber_id = command.subscriber_id,
            subscription_plan_id = plan_id,
            subscription_id = ?subscription.subscription_id,
            "Subscription event processed"
        );

        Ok(SubscriptionEventResult {
            subscription_event_id: command.subscription_event_id.clone(),
            event_type: command.event_type,
            outcome: LedgerOutcome::Recorded,
            subscription_id: subscription.subscription_id,
        })
    }

    fn log_duplicate(&self, command: &SubscriptionEventCommand, context: &OperationContext) {
        tracing::info!(
            correlation_id = ?context.correlation_id,
            subscription_event_id = %command.subscription_event_id,
            event_type = %command.event_type,
            "Duplicate subscription event ignored"
        );
    }
}

/// Plan the event refers to: the latest regular plan, or the latest plan of
/// the artist
async fn resolve_plan(
    tx: &mut dyn Transaction,
    command: &SubscriptionEventCommand,
) -> Result<SubscriptionPlan, AppError> {
    match command.plan_type {
        PlanType::Regular => Ok(tx
            .find_regular_plan()
            .await?
            .ok_or(SubscriptionError::RegularPlanNotFound)?),
        PlanType::Artist => {
            let artist_id = command.artist_id.ok_or_else(|| {
                AppError::InvalidRequest("artistId is required for artist plans".to_string())
            })?;
            Ok(tx
                .find_artist_plan(artist_id)
                .await?
                .ok_or(SubscriptionError::ArtistPlanNotFound(artist_id))?)
        }
    }
}

/// Start an active subscription. A member already active on the plan keeps
/// the existing one.
async fn subscribe(
    tx: &mut dyn Transaction,
    member_id: i32,
    plan_id: i32,
) -> Result<Subscription, AppError> {
    let existing = tx
        .find_subscriptions_by_member_and_plan(member_id, plan_id)
        .await?
        .into_iter()
        .find(|s| s.activate_yn);

    match existing {
        Some(subscription) => Ok(subscription),
        None => Ok(tx
            .save_subscription(Subscription::activate(member_id, plan_id, Utc::now()))
            .await?),
    }
}

/// A payment needs a subscription on the plan, and it must be active
async fn require_active_subscription(
    tx: &mut dyn Transaction,
    member_id: i32,
    plan: &SubscriptionPlan,
) -> Result<Subscription, AppError> {
    let plan_id = plan.subscription_plan_id.unwrap_or_default();
    let subscriptions = tx
        .find_subscriptions_by_member_and_plan(member_id, plan_id)
        .await?;

    if subscriptions.is_empty() {
        let err = match plan.plan_type {
            PlanType::Regular => SubscriptionError::RegularSubscriptionNotFound(member_id),
            PlanType::Artist => SubscriptionError::SubscriptionNotFound { member_id, plan_id },
        };
        return Err(err.into());
    }

    let active = subscriptions.iter().find(|s| s.activate_yn).cloned();
    match active {
        Some(subscription) => Ok(subscription),
        None => {
            let latest = subscriptions
                .iter()
                .max_by_key(|s| s.subscribed_at)
                .and_then(|s| s.subscription_id)
                .unwrap_or_default();
            Err(SubscriptionError::SubscriptionNotActive(latest).into())
        }
    }
}
