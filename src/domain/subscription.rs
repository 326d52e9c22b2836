//! Subscription domain
//!
//! Plans members can subscribe to, their subscriptions, and the record of
//! externally delivered subscription events.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::error::SubscriptionError;

/// Kind of subscription plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlanType {
    /// Platform-wide regular plan
    #[serde(rename = "R")]
    Regular,
    /// Plan tied to a single artist
    #[serde(rename = "A")]
    Artist,
}

impl PlanType {
    pub fn code(&self) -> &'static str {
        match self {
            PlanType::Regular => "R",
            PlanType::Artist => "A",
        }
    }
}

impl std::str::FromStr for PlanType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "R" => Ok(PlanType::Regular),
            "A" => Ok(PlanType::Artist),
            other => Err(format!("unknown plan type: {other}")),
        }
    }
}

impl std::fmt::Display for PlanType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Kind of externally delivered subscription event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    /// A recurring payment was collected
    #[serde(rename = "P")]
    Payment,
    /// A member subscribed to a plan
    #[serde(rename = "S")]
    Subscribe,
}

impl EventType {
    pub fn code(&self) -> &'static str {
        match self {
            EventType::Payment => "P",
            EventType::Subscribe => "S",
        }
    }
}

impl std::str::FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "P" => Ok(EventType::Payment),
            "S" => Ok(EventType::Subscribe),
            other => Err(format!("unknown event type: {other}")),
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Subscription plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionPlan {
    pub subscription_plan_id: Option<i32>,
    pub plan_type: PlanType,
    /// Set only for artist plans
    pub artist_id: Option<i32>,
    pub price: Decimal,
    pub created_at: DateTime<Utc>,
}

impl SubscriptionPlan {
    pub fn with_id(mut self, id: i32) -> Self {
        self.subscription_plan_id = Some(id);
        self
    }
}

/// Builds validated plans. Mirrors the manage-service role: the handler
/// decides when a plan is created, the factory decides what a valid plan is.
#[derive(Debug, Default, Clone, Copy)]
pub struct SubscriptionPlanFactory;

impl SubscriptionPlanFactory {
    pub fn create_regular_plan(&self, price: Decimal) -> Result<SubscriptionPlan, SubscriptionError> {
        Self::validate_price(price)?;
        Ok(SubscriptionPlan {
            subscription_plan_id: None,
            plan_type: PlanType::Regular,
            artist_id: None,
            price,
            created_at: Utc::now(),
        })
    }

    pub fn create_artist_plan(
        &self,
        artist_id: i32,
        price: Decimal,
    ) -> Result<SubscriptionPlan, SubscriptionError> {
        Self::validate_price(price)?;
        Ok(SubscriptionPlan {
            subscription_plan_id: None,
            plan_type: PlanType::Artist,
            artist_id: Some(artist_id),
            price,
            created_at: Utc::now(),
        })
    }

    fn validate_price(price: Decimal) -> Result<(), SubscriptionError> {
        if price <= Decimal::ZERO {
            return Err(SubscriptionError::InvalidPlanPrice(price));
        }
        Ok(())
    }
}

/// A member's subscription to one plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub subscription_id: Option<i32>,
    pub member_id: i32,
    pub subscription_plan_id: i32,
    pub subscribed_at: DateTime<Utc>,
    pub activate_yn: bool,
}

impl Subscription {
    /// New active subscription starting at `subscribed_at`
    pub fn activate(member_id: i32, subscription_plan_id: i32, subscribed_at: DateTime<Utc>) -> Self {
        Self {
            subscription_id: None,
            member_id,
            subscription_plan_id,
            subscribed_at,
            activate_yn: true,
        }
    }

    pub fn with_id(mut self, id: i32) -> Self {
        self.subscription_id = Some(id);
        self
    }
}

/// Ledger row for an external subscription event.
///
/// (`subscription_event_id`, `event_type`) is unique in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionEventRecord {
    pub subscription_event_id: String,
    pub event_type: EventType,
    pub subscriber_id: i32,
    pub plan_type: PlanType,
    pub recorded_at: DateTime<Utc>,
}

impl SubscriptionEventRecord {
    pub fn new(
        subscription_event_id: impl Into<String>,
        event_type: EventType,
        subscriber_id: i32,
        plan_type: PlanType,
    ) -> Self {
        Self {
            subscription_event_id: subscription_event_id.into(),
            event_type,
            subscriber_id,
            plan_type,
            recorded_at: Utc::now(),
        }
    }
}
