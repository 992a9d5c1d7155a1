use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Catalog entry. `stock` doubles as remaining capacity/seats for event
/// products; `sales_count` is incremented on payment confirmation only.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "products")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub title: String,
    pub slug: String,
    #[sea_orm(column_type = "Text")]
    pub description: String,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub price: Decimal,
    /// If set, this price is used instead of `price` for sales.
    #[sea_orm(column_type = "Decimal(Some((19, 4)))", nullable)]
    pub discounted_price: Option<Decimal>,
    /// Cost price, used for profit computation.
    #[sea_orm(column_type = "Decimal(Some((19, 4)))", nullable)]
    pub cost: Option<Decimal>,
    pub stock: i32,
    pub sales_count: i32,
    pub trending: bool,
    pub kind: ProductKind,
    #[sea_orm(nullable)]
    pub event_start: Option<DateTime<Utc>>,
    #[sea_orm(nullable)]
    pub event_end: Option<DateTime<Utc>>,
    #[sea_orm(nullable)]
    pub event_location: Option<String>,
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

/// Discriminates plain merchandise from ticketed events. The event fields
/// are only meaningful (and only populated) for `Event` rows; callers go
/// through [`Model::event_details`] instead of probing columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "lowercase")]
pub enum ProductKind {
    #[sea_orm(string_value = "standard")]
    Standard,
    #[sea_orm(string_value = "event")]
    Event,
}

/// Event data attached to `ProductKind::Event` products.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDetails {
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
    pub location: Option<String>,
}

impl Model {
    /// Effective sale price: the discounted price when present.
    pub fn effective_price(&self) -> Decimal {
        self.discounted_price.unwrap_or(self.price)
    }

    /// Derived availability flag: a product with no stock is inactive.
    pub fn is_active(&self) -> bool {
        self.stock > 0
    }

    /// Event data for event-kind products, `None` for everything else.
    pub fn event_details(&self) -> Option<EventDetails> {
        match self.kind {
            ProductKind::Event => Some(EventDetails {
                start: self.event_start?,
                end: self.event_end,
                location: self.event_location.clone(),
            }),
            ProductKind::Standard => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample(kind: ProductKind) -> Model {
        Model {
            id: Uuid::new_v4(),
            title: "Strange Tales #1".into(),
            slug: "strange-tales-1".into(),
            description: String::new(),
            price: dec!(20.00),
            discounted_price: None,
            cost: Some(dec!(8.00)),
            stock: 5,
            sales_count: 0,
            trending: false,
            kind,
            event_start: None,
            event_end: None,
            event_location: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn effective_price_prefers_discount() {
        let mut product = sample(ProductKind::Standard);
        assert_eq!(product.effective_price(), dec!(20.00));
        product.discounted_price = Some(dec!(15.00));
        assert_eq!(product.effective_price(), dec!(15.00));
    }

    #[test]
    fn active_follows_stock() {
        let mut product = sample(ProductKind::Standard);
        assert!(product.is_active());
        product.stock = 0;
        assert!(!product.is_active());
    }

    #[test]
    fn standard_products_have_no_event_details() {
        let mut product = sample(ProductKind::Standard);
        // Even with stray event columns, the tag decides.
        product.event_start = Some(Utc::now());
        assert!(product.event_details().is_none());
    }

    #[test]
    fn event_products_expose_details() {
        let mut product = sample(ProductKind::Event);
        let start = Utc::now();
        product.event_start = Some(start);
        product.event_location = Some("Warehouse 13".into());

        let details = product.event_details().expect("event details");
        assert_eq!(details.start, start);
        assert_eq!(details.location.as_deref(), Some("Warehouse 13"));
        assert!(details.end.is_none());
    }
}
