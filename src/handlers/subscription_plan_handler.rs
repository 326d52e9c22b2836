//! Subscription Plan Handler
//!
//! The factory decides what a valid plan is; this handler decides when one
//! is created and persists it.

use std::sync::Arc;

use rust_decimal::Decimal;

use crate::domain::{OperationContext, SubscriptionPlan, SubscriptionPlanFactory};
use crate::error::AppError;
use crate::store::Database;

// =========================================================================
// M216: SubscriptionPlanHandler
// =========================================================================

pub struct SubscriptionPlanHandler {
    db: Arc<dyn Database>,
    factory: SubscriptionPlanFactory,
}

impl SubscriptionPlanHandler {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self {
            db,
            factory: SubscriptionPlanFactory,
        }
    }

    pub async fn create_regular_plan(
        &self,
        price: Decimal,
        context: &OperationContext,
    ) -> Result<SubscriptionPlan, AppError> {
        let plan = self.factory.create_regular_plan(price)?;
        self.persist(plan, context).await
    }

    pub async fn create_artist_plan(
        &self,
        artist_id: i32,
        price: Decimal,
        context: &OperationContext,
    ) -> Result<SubscriptionPlan, AppError> {
        let plan = self.factory.create_artist_plan(artist_id, price)?;
        self.persist(plan, context).await
    }

    async fn persist(
        &self,
        plan: SubscriptionPlan,
        context: &OperationContext,
    ) -> Result<SubscriptionPlan, AppError> {
        let mut tx = self.db.begin().await?;
        let plan = tx.save_plan(plan).await?;
        tx.commit().await?;

        tracing::info!(
            correlation_id = ?context.correlation_id,
            subscription_plan_id = ?plan.subscription_plan_id,
            plan_type = %plan.plan_type,
            artist_id = ?plan.artist_id,
            price = %plan.price,
            "Subscription plan created"
        );

        Ok(plan)
    }
}
