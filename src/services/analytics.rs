use crate::{
    entities::{
        order::{self, OrderStatus},
        order_item, visitor, Order, OrderItem, Product, Visitor,
    },
    errors::ServiceError,
};
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, FromQueryResult, JoinType,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, RelationTrait, Set,
};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct VisitorCounts {
    pub daily: u64,
    pub monthly: u64,
}

#[derive(Debug, Serialize)]
pub struct TopProduct {
    pub id: Uuid,
    pub title: Option<String>,
    pub units: i64,
}

#[derive(Debug, Serialize)]
pub struct SalesStats {
    pub total_sales: Decimal,
    pub total_orders: u64,
    pub top_product: Option<TopProduct>,
}

#[derive(FromQueryResult)]
struct TopProductRow {
    product_id: Option<Uuid>,
    units: Option<i64>,
}

/// Traffic counters and the handful of sales numbers the storefront
/// dashboard shows. Anything heavier lives outside this service.
#[derive(Clone)]
pub struct AnalyticsService {
    db: Arc<DatabaseConnection>,
}

impl AnalyticsService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn record_visit(&self) -> Result<(), ServiceError> {
        visitor::ActiveModel {
            id: Set(Uuid::new_v4()),
            visited_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await?;
        Ok(())
    }

    pub async fn visitor_counts(&self) -> Result<VisitorCounts, ServiceError> {
        let now = Utc::now();
        let daily = Visitor::find()
            .filter(visitor::Column::VisitedAt.gte(now - Duration::days(1)))
            .count(&*self.db)
            .await?;
        let monthly = Visitor::find()
            .filter(visitor::Column::VisitedAt.gte(now - Duration::days(30)))
            .count(&*self.db)
            .await?;
        Ok(VisitorCounts { daily, monthly })
    }

    /// Paid-order totals and the best-selling product.
    pub async fn sales_stats(&self) -> Result<SalesStats, ServiceError> {
        let paid = Order::find()
            .filter(order::Column::Status.eq(OrderStatus::Paid))
            .all(&*self.db)
            .await?;
        let total_sales: Decimal = paid.iter().map(|o| o.total).sum();
        let total_orders = paid.len() as u64;

        let top = OrderItem::find()
            .select_only()
            .column(order_item::Column::ProductId)
            .column_as(order_item::Column::Quantity.sum(), "units")
            .join(JoinType::InnerJoin, order_item::Relation::Order.def())
            .filter(order::Column::Status.eq(OrderStatus::Paid))
            .filter(order_item::Column::ProductId.is_not_null())
            .group_by(order_item::Column::ProductId)
            .order_by_desc(order_item::Column::Quantity.sum())
            .into_model::<TopProductRow>()
            .one(&*self.db)
            .await?;

        let top_product = match top {
            Some(TopProductRow {
                product_id: Some(id),
                units,
            }) => {
                let title = Product::find_by_id(id)
                    .one(&*self.db)
                    .await?
                    .map(|p| p.title);
                Some(TopProduct {
                    id,
                    title,
                    units: units.unwrap_or_default(),
                })
            }
            _ => None,
        };

        Ok(SalesStats {
            total_sales,
            total_orders,
            top_product,
        })
    }
}
