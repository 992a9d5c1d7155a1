use crate::{
    entities::{
        event_ticket,
        order::{self, OrderStatus},
        order_item, product, Order, OrderItem, Product,
    },
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// An order with its line items.
#[derive(Debug, Clone)]
pub struct OrderDetail {
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
}

/// Owns every order status transition and the side effects of the paid
/// transition (stock decrement, sales counting, ticket issuance). Nothing
/// else in the system writes `order.status` past `Pending`.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl OrderService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    #[instrument(skip(self))]
    pub async fn get_order(&self, order_id: Uuid) -> Result<OrderDetail, ServiceError> {
        let order = Order::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;
        let items = order.find_related(OrderItem).all(&*self.db).await?;
        Ok(OrderDetail { order, items })
    }

    pub async fn list_orders(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<order::Model>, u64), ServiceError> {
        let paginator = Order::find()
            .order_by_desc(order::Column::CreatedAt)
            .paginate(&*self.db, per_page.max(1));

        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((orders, total))
    }

    /// Buyer-facing polling endpoint for the synchronous checkout page.
    pub async fn payment_status(&self, order_id: Uuid) -> Result<OrderStatus, ServiceError> {
        let order = Order::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;
        Ok(order.status)
    }

    /// The paid transition. One atomic unit: fresh stock check across all
    /// items (collecting every shortfall before failing), guarded stock
    /// decrement + sales count, ticket issuance for event products, then
    /// the status flip. Invoking it on an already-paid order is a no-op —
    /// no second decrement, no duplicate tickets.
    #[instrument(skip(self))]
    pub async fn mark_paid(&self, order_id: Uuid) -> Result<order::Model, ServiceError> {
        let txn = self.db.begin().await?;

        let order = Order::find_by_id(order_id)
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        if order.status == OrderStatus::Paid {
            txn.commit().await?;
            info!(order_id = %order_id, "order already paid; nothing to do");
            return Ok(order);
        }
        if !order.status.can_transition_to(OrderStatus::Paid) {
            return Err(ServiceError::InvalidTransition(format!(
                "cannot mark a {} order as paid",
                order.status.as_str()
            )));
        }

        let items = order.find_related(OrderItem).all(&txn).await?;

        // First pass: re-read stock inside the transaction (never trust a
        // value cached earlier in the request) and collect every
        // shortfall so the buyer sees the full picture at once.
        let mut lines: Vec<(order_item::Model, product::Model)> = Vec::with_capacity(items.len());
        let mut shortfalls: Vec<String> = Vec::new();
        for item in items {
            let Some(product_id) = item.product_id else {
                continue;
            };
            let product = Product::find_by_id(product_id)
                .lock_exclusive()
                .one(&txn)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Product {} not found", product_id))
                })?;
            if product.stock < item.quantity {
                shortfalls.push(product.title.clone());
            }
            lines.push((item, product));
        }
        if !shortfalls.is_empty() {
            // Dropping the transaction rolls everything back; no partial
            // stock mutation becomes visible.
            return Err(ServiceError::InsufficientStock(format!(
                "Not enough stock for {}",
                shortfalls.join(", ")
            )));
        }

        // Second pass: guarded decrement. The WHERE stock >= qty filter
        // plus the affected-row check closes the race against a
        // concurrent checkout of the same units.
        let now = Utc::now();
        let mut tickets_issued = 0usize;
        for (item, product) in &lines {
            let result = Product::update_many()
                .col_expr(
                    product::Column::Stock,
                    Expr::col(product::Column::Stock).sub(item.quantity),
                )
                .col_expr(
                    product::Column::SalesCount,
                    Expr::col(product::Column::SalesCount).add(item.quantity),
                )
                .col_expr(product::Column::UpdatedAt, Expr::value(now))
                .filter(product::Column::Id.eq(product.id))
                .filter(product::Column::Stock.gte(item.quantity))
                .exec(&txn)
                .await?;
            if result.rows_affected == 0 {
                return Err(ServiceError::InsufficientStock(format!(
                    "Not enough stock for {}",
                    product.title
                )));
            }

            if product.event_details().is_some() {
                for _ in 0..item.quantity {
                    event_ticket::ActiveModel {
                        id: Set(Uuid::new_v4()),
                        order_item_id: Set(item.id),
                        code: Set(Uuid::new_v4()),
                        used: Set(false),
                        used_at: Set(None),
                        created_at: Set(now),
                    }
                    .insert(&txn)
                    .await?;
                    tickets_issued += 1;
                }
            }
        }

        let old_status = order.status;
        let mut active: order::ActiveModel = order.into();
        active.status = Set(OrderStatus::Paid);
        active.updated_at = Set(now);
        let order = active.update(&txn).await?;

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::OrderStatusChanged {
                order_id,
                old_status: old_status.as_str().to_string(),
                new_status: OrderStatus::Paid.as_str().to_string(),
            })
            .await;
        self.event_sender.send_or_log(Event::OrderPaid(order_id)).await;
        if tickets_issued > 0 {
            self.event_sender
                .send_or_log(Event::TicketsIssued {
                    order_id,
                    count: tickets_issued,
                })
                .await;
        }

        info!(order_id = %order_id, tickets_issued, "order marked as paid");
        Ok(order)
    }

    /// Records a declined/abandoned payment notification. Tolerates
    /// repeats — the provider may deliver the same failure more than once.
    #[instrument(skip(self))]
    pub async fn mark_failed(&self, order_id: Uuid) -> Result<order::Model, ServiceError> {
        let order = Order::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;
        if order.status == OrderStatus::Failed {
            return Ok(order);
        }
        let order = self.transition(order_id, OrderStatus::Failed).await?;
        self.event_sender
            .send_or_log(Event::PaymentFailed(order_id))
            .await;
        Ok(order)
    }

    pub async fn cancel(&self, order_id: Uuid) -> Result<order::Model, ServiceError> {
        self.transition(order_id, OrderStatus::Cancelled).await
    }

    pub async fn refund(&self, order_id: Uuid) -> Result<order::Model, ServiceError> {
        self.transition(order_id, OrderStatus::Refunded).await
    }

    pub async fn ship(&self, order_id: Uuid) -> Result<order::Model, ServiceError> {
        self.transition(order_id, OrderStatus::Shipped).await
    }

    pub async fn complete(&self, order_id: Uuid) -> Result<order::Model, ServiceError> {
        self.transition(order_id, OrderStatus::Completed).await
    }

    /// Guarded status change without side effects. The paid transition
    /// never goes through here.
    #[instrument(skip(self))]
    async fn transition(
        &self,
        order_id: Uuid,
        target: OrderStatus,
    ) -> Result<order::Model, ServiceError> {
        let txn = self.db.begin().await?;

        let order = Order::find_by_id(order_id)
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        if !order.status.can_transition_to(target) {
            warn!(
                order_id = %order_id,
                from = order.status.as_str(),
                to = target.as_str(),
                "rejected status transition"
            );
            return Err(ServiceError::InvalidTransition(format!(
                "cannot move a {} order to {}",
                order.status.as_str(),
                target.as_str()
            )));
        }

        let old_status = order.status;
        let mut active: order::ActiveModel = order.into();
        active.status = Set(target);
        active.updated_at = Set(Utc::now());
        let order = active.update(&txn).await?;

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::OrderStatusChanged {
                order_id,
                old_status: old_status.as_str().to_string(),
                new_status: target.as_str().to_string(),
            })
            .await;

        Ok(order)
    }
}
