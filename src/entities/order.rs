use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An order doubles as the shopping cart while it is `Pending`; a partial
/// unique index keeps at most one pending order per user and per session
/// key (see the migrator).
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    /// Owning user; nulled when the user account is deleted.
    #[sea_orm(nullable)]
    pub user_id: Option<Uuid>,
    /// Guest identity. Carried alongside `user_id` after sign-in so the
    /// same browser keeps resolving to the same cart.
    #[sea_orm(nullable)]
    pub session_key: Option<String>,
    pub status: OrderStatus,
    /// Computed from line items, never accepted from clients.
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub total: Decimal,
    #[sea_orm(column_type = "Json", nullable)]
    pub shipping_address: Option<Json>,
    #[sea_orm(nullable)]
    pub phone_number: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order_item::Entity")]
    OrderItems,
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItems.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Order lifecycle states.
///
/// `Failed` records a declined/abandoned payment notification; a failed
/// order may still become `Paid` if the provider retries successfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "paid")]
    Paid,
    #[sea_orm(string_value = "shipped")]
    Shipped,
    #[sea_orm(string_value = "completed")]
    Completed,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
    #[sea_orm(string_value = "refunded")]
    Refunded,
    #[sea_orm(string_value = "failed")]
    Failed,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Paid => "paid",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Refunded => "refunded",
            OrderStatus::Failed => "failed",
        }
    }

    /// The transition table. `Paid -> Paid` is handled separately as an
    /// idempotent no-op by the order service, not listed here.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Paid)
                | (Failed, Paid)
                | (Pending, Failed)
                | (Pending, Cancelled)
                | (Failed, Cancelled)
                | (Paid, Cancelled)
                | (Paid, Shipped)
                | (Paid, Refunded)
                | (Shipped, Refunded)
                | (Shipped, Completed)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::OrderStatus::*;

    #[test]
    fn paid_is_reachable_from_pending_and_failed_only() {
        assert!(Pending.can_transition_to(Paid));
        assert!(Failed.can_transition_to(Paid));
        for status in [Shipped, Completed, Cancelled, Refunded] {
            assert!(!status.can_transition_to(Paid), "{status:?} -> Paid");
        }
    }

    #[test]
    fn completed_orders_are_terminal() {
        for target in [Pending, Paid, Shipped, Cancelled, Refunded, Failed] {
            assert!(!Completed.can_transition_to(target));
        }
    }

    #[test]
    fn cancel_requires_an_open_order() {
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Paid.can_transition_to(Cancelled));
        assert!(!Completed.can_transition_to(Cancelled));
        assert!(!Refunded.can_transition_to(Cancelled));
    }

    #[test]
    fn refund_requires_captured_money() {
        assert!(Paid.can_transition_to(Refunded));
        assert!(Shipped.can_transition_to(Refunded));
        assert!(!Pending.can_transition_to(Refunded));
    }
}
