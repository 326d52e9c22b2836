//! Subscription Query Handler

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::Subscription;
use crate::error::AppError;
use crate::store::Database;

/// Active subscribers of a plan
#[derive(Debug, Clone, Serialize)]
pub struct ActiveSubscribers {
    pub subscription_plan_id: i32,
    pub subscriber_count: i64,
    pub subscriptions: Vec<Subscription>,
}

pub struct SubscriptionQueryHandler {
    db: Arc<dyn Database>,
}

impl SubscriptionQueryHandler {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    pub async fn member_subscriptions(&self, member_id: i32) -> Result<Vec<Subscription>, AppError> {
        let mut tx = self.db.begin().await?;
        let subscriptions = tx.find_subscriptions_by_member(member_id).await?;
        tx.commit().await?;
        Ok(subscriptions)
    }

    /// Active subscriptions of a plan, optionally limited to those started
    /// within `[from, to]`. `subscriber_count` always covers the whole plan.
    pub async fn active_subscribers(
        &self,
        subscription_plan_id: i32,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<ActiveSubscribers, AppError> {
        let mut tx = self.db.begin().await?;

        let subscriptions = match (from, to) {
            (None, None) => tx.find_active_subscriptions_by_plan(subscription_plan_id).await?,
            (Some(start), Some(end)) => {
                if start > end {
                    return Err(AppError::InvalidRequest("from must not be after to".to_string()));
                }
                tx.find_active_subscriptions_by_plan_between(subscription_plan_id, start, end)
                    .await?
            }
            _ => {
                return Err(AppError::InvalidRequest(
                    "from and to must be given together".to_string(),
                ))
            }
        };
        let subscriber_count = tx
            .count_active_subscriptions_by_plan(subscription_plan_id)
            .await?;
        tx.commit().await?;

        Ok(ActiveSubscribers {
            subscription_plan_id,
            subscriber_count,
            subscriptions,
        })
    }
}
