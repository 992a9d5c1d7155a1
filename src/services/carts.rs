use crate::{
    entities::{
        order::{self, OrderStatus},
        order_item, Order, OrderItem, Product,
    },
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use rand::{distributions::Alphanumeric, Rng};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, ModelTrait,
    QueryFilter, QuerySelect, Set, TransactionTrait,
};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Identity context of a request: an authenticated user id (if any) plus
/// the guest session key (if the browser already has one). Threaded
/// explicitly into every cart call; there is no ambient request state.
#[derive(Debug, Clone, Default)]
pub struct Actor {
    pub user_id: Option<Uuid>,
    pub session_key: Option<String>,
}

impl Actor {
    /// A copy of this actor that definitely carries a session key; minted
    /// here when the request arrived without one. Cart identity for
    /// guests IS the session key, so this runs before any cart lookup.
    pub fn ensured(self) -> Actor {
        Actor {
            user_id: self.user_id,
            session_key: Some(self.session_key.unwrap_or_else(mint_session_key)),
        }
    }
}

/// Mint a fresh guest session key: 32 alphanumeric characters.
pub fn mint_session_key() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

/// A resolved cart together with the session key the caller should keep
/// using (freshly minted when the actor arrived without one).
#[derive(Debug, Clone)]
pub struct CartView {
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
    pub session_key: String,
}

/// Outcome of cart resolution inside a transaction; events are emitted by
/// the public entry points after commit.
struct ResolveOutcome {
    order: Option<order::Model>,
    session_key: String,
    created: Option<Uuid>,
    merged: Option<(Uuid, Uuid)>,
}

/// Cart manager: resolves the single pending order per actor, mutates line
/// items and keeps `order.total` in sync. Every mutation runs inside one
/// transaction with the order row locked, so concurrent requests against
/// the same cart serialize instead of interleaving.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl CartService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Resolve (or create) the actor's cart and return it with its items.
    /// Returns `None` for a guest without a cart when `create_if_missing`
    /// is off — "no cart" is not an error.
    #[instrument(skip(self))]
    pub async fn resolve_cart(
        &self,
        actor: &Actor,
        create_if_missing: bool,
    ) -> Result<Option<CartView>, ServiceError> {
        let txn = self.db.begin().await?;
        let outcome = self.resolve_within(&txn, actor, create_if_missing).await?;

        let view = match &outcome.order {
            Some(order) => {
                let items = order.find_related(OrderItem).all(&txn).await?;
                Some(CartView {
                    order: order.clone(),
                    items,
                    session_key: outcome.session_key.clone(),
                })
            }
            None => None,
        };

        txn.commit().await?;
        self.emit_resolution_events(&outcome).await;
        Ok(view)
    }

    /// Add `quantity` units of a product, creating the line at the current
    /// effective price or incrementing an existing line. The unit price is
    /// NOT re-snapshotted on increment.
    #[instrument(skip(self))]
    pub async fn add_item(
        &self,
        actor: &Actor,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<CartView, ServiceError> {
        if quantity < 1 {
            return Err(ServiceError::Validation(
                "quantity must be at least 1".to_string(),
            ));
        }

        let txn = self.db.begin().await?;
        let outcome = self.resolve_within(&txn, actor, true).await?;
        let order = outcome
            .order
            .clone()
            .ok_or_else(|| ServiceError::Internal("cart resolution returned no order".into()))?;

        let product = Product::find_by_id(product_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

        let existing = OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order.id))
            .filter(order_item::Column::ProductId.eq(product_id))
            .one(&txn)
            .await?;

        match existing {
            Some(item) => {
                let new_quantity = item.quantity + quantity;
                let mut item: order_item::ActiveModel = item.into();
                item.quantity = Set(new_quantity);
                item.update(&txn).await?;
            }
            None => {
                order_item::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    order_id: Set(order.id),
                    product_id: Set(Some(product_id)),
                    quantity: Set(quantity),
                    unit_price: Set(product.effective_price()),
                }
                .insert(&txn)
                .await?;
            }
        }

        let (order, items) = Self::recalculate_total(&txn, order.id).await?;
        txn.commit().await?;

        self.emit_resolution_events(&outcome).await;
        self.event_sender
            .send_or_log(Event::CartItemAdded {
                order_id: order.id,
                product_id,
            })
            .await;

        info!(order_id = %order.id, product_id = %product_id, quantity, "added item to cart");
        Ok(CartView {
            order,
            items,
            session_key: outcome.session_key,
        })
    }

    /// Remove a line item outright. `NotFound` when the item does not
    /// belong to this actor's cart.
    #[instrument(skip(self))]
    pub async fn remove_item(
        &self,
        actor: &Actor,
        item_id: Uuid,
    ) -> Result<CartView, ServiceError> {
        let txn = self.db.begin().await?;
        let outcome = self.resolve_within(&txn, actor, true).await?;
        let order = outcome
            .order
            .clone()
            .ok_or_else(|| ServiceError::Internal("cart resolution returned no order".into()))?;

        let item = OrderItem::find_by_id(item_id)
            .filter(order_item::Column::OrderId.eq(order.id))
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Item not in cart".to_string()))?;

        item.delete(&txn).await?;

        let (order, items) = Self::recalculate_total(&txn, order.id).await?;
        txn.commit().await?;

        self.emit_resolution_events(&outcome).await;
        self.event_sender
            .send_or_log(Event::CartItemRemoved {
                order_id: order.id,
                item_id,
            })
            .await;

        Ok(CartView {
            order,
            items,
            session_key: outcome.session_key,
        })
    }

    /// Bump a product's line by one, creating it (at effective price) when
    /// absent.
    pub async fn increase_item(
        &self,
        actor: &Actor,
        product_id: Uuid,
    ) -> Result<CartView, ServiceError> {
        self.add_item(actor, product_id, 1).await
    }

    /// Drop a product's line by one; reaching zero deletes the line.
    #[instrument(skip(self))]
    pub async fn decrease_item(
        &self,
        actor: &Actor,
        product_id: Uuid,
    ) -> Result<CartView, ServiceError> {
        let txn = self.db.begin().await?;
        let outcome = self.resolve_within(&txn, actor, true).await?;
        let order = outcome
            .order
            .clone()
            .ok_or_else(|| ServiceError::Internal("cart resolution returned no order".into()))?;

        let item = OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order.id))
            .filter(order_item::Column::ProductId.eq(product_id))
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Item not in cart".to_string()))?;

        let new_quantity = item.quantity - 1;
        if new_quantity <= 0 {
            item.delete(&txn).await?;
        } else {
            let mut item: order_item::ActiveModel = item.into();
            item.quantity = Set(new_quantity);
            item.update(&txn).await?;
        }

        let (order, items) = Self::recalculate_total(&txn, order.id).await?;
        txn.commit().await?;

        self.emit_resolution_events(&outcome).await;
        Ok(CartView {
            order,
            items,
            session_key: outcome.session_key,
        })
    }

    /// Stamp contact details onto the cart ahead of payment initiation.
    /// Rejects empty carts; never advances order status — only the
    /// asynchronous notification handler does that.
    #[instrument(skip(self, shipping_address))]
    pub async fn prepare_checkout(
        &self,
        actor: &Actor,
        shipping_address: Option<serde_json::Value>,
        phone_number: Option<String>,
    ) -> Result<CartView, ServiceError> {
        let txn = self.db.begin().await?;
        let outcome = self.resolve_within(&txn, actor, true).await?;
        let order = outcome
            .order
            .clone()
            .ok_or_else(|| ServiceError::Internal("cart resolution returned no order".into()))?;

        let items = order.find_related(OrderItem).all(&txn).await?;
        if items.is_empty() {
            return Err(ServiceError::Validation("Your cart is empty".to_string()));
        }

        let mut active: order::ActiveModel = order.into();
        if let Some(address) = shipping_address {
            active.shipping_address = Set(Some(address));
        }
        if let Some(phone) = phone_number {
            active.phone_number = Set(Some(phone));
        }
        active.updated_at = Set(Utc::now());
        let order = active.update(&txn).await?;

        txn.commit().await?;
        self.emit_resolution_events(&outcome).await;

        Ok(CartView {
            order,
            items,
            session_key: outcome.session_key,
        })
    }

    /// Resolution per the actor rules. Runs inside the caller's
    /// transaction because signing in can merge a guest cart into the
    /// user's cart, which mutates rows.
    async fn resolve_within<C: ConnectionTrait>(
        &self,
        conn: &C,
        actor: &Actor,
        create_if_missing: bool,
    ) -> Result<ResolveOutcome, ServiceError> {
        let session_key = actor
            .session_key
            .clone()
            .unwrap_or_else(mint_session_key);

        if let Some(user_id) = actor.user_id {
            let user_cart = Order::find()
                .filter(order::Column::UserId.eq(user_id))
                .filter(order::Column::Status.eq(OrderStatus::Pending))
                .lock_exclusive()
                .one(conn)
                .await?;
            let session_cart = Order::find()
                .filter(order::Column::SessionKey.eq(session_key.as_str()))
                .filter(order::Column::Status.eq(OrderStatus::Pending))
                .lock_exclusive()
                .one(conn)
                .await?;

            let mut created = None;
            let mut merged = None;

            let cart = match (user_cart, session_cart) {
                (Some(user_cart), Some(session_cart)) if user_cart.id != session_cart.id => {
                    merged = Some((session_cart.id, user_cart.id));
                    Self::merge_carts(conn, &user_cart, session_cart).await?;
                    let (order, _) = Self::recalculate_total(conn, user_cart.id).await?;
                    order
                }
                (Some(user_cart), _) => user_cart,
                // A guest cart exists but the user has none yet: the
                // session cart simply becomes the user's cart.
                (None, Some(session_cart)) => session_cart,
                (None, None) => {
                    if !create_if_missing {
                        return Ok(ResolveOutcome {
                            order: None,
                            session_key,
                            created: None,
                            merged: None,
                        });
                    }
                    let order = Self::new_pending_order(conn, Some(user_id), &session_key).await?;
                    created = Some(order.id);
                    order
                }
            };

            // The surviving cart always reflects the current actor.
            let mut active: order::ActiveModel = cart.into();
            active.user_id = Set(Some(user_id));
            active.session_key = Set(Some(session_key.clone()));
            active.updated_at = Set(Utc::now());
            let cart = active.update(conn).await?;

            Ok(ResolveOutcome {
                order: Some(cart),
                session_key,
                created,
                merged,
            })
        } else {
            let existing = Order::find()
                .filter(order::Column::SessionKey.eq(session_key.as_str()))
                .filter(order::Column::Status.eq(OrderStatus::Pending))
                .lock_exclusive()
                .one(conn)
                .await?;

            match existing {
                Some(order) => Ok(ResolveOutcome {
                    order: Some(order),
                    session_key,
                    created: None,
                    merged: None,
                }),
                None if create_if_missing => {
                    let order = Self::new_pending_order(conn, None, &session_key).await?;
                    let id = order.id;
                    Ok(ResolveOutcome {
                        order: Some(order),
                        session_key,
                        created: Some(id),
                        merged: None,
                    })
                }
                None => Ok(ResolveOutcome {
                    order: None,
                    session_key,
                    created: None,
                    merged: None,
                }),
            }
        }
    }

    async fn new_pending_order<C: ConnectionTrait>(
        conn: &C,
        user_id: Option<Uuid>,
        session_key: &str,
    ) -> Result<order::Model, ServiceError> {
        let now = Utc::now();
        let order = order::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            session_key: Set(Some(session_key.to_string())),
            status: Set(OrderStatus::Pending),
            total: Set(Decimal::ZERO),
            shipping_address: Set(None),
            phone_number: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(conn)
        .await?;
        Ok(order)
    }

    /// Merge the session cart into the user cart item by item so per-line
    /// unit-price snapshots survive: an existing product line absorbs the
    /// quantity at its own (older) price, everything else is re-parented.
    /// The emptied session cart row is deleted (cascade covers leftovers).
    async fn merge_carts<C: ConnectionTrait>(
        conn: &C,
        user_cart: &order::Model,
        session_cart: order::Model,
    ) -> Result<(), ServiceError> {
        let session_items = session_cart.find_related(OrderItem).all(conn).await?;

        for item in session_items {
            let existing = match item.product_id {
                Some(product_id) => {
                    OrderItem::find()
                        .filter(order_item::Column::OrderId.eq(user_cart.id))
                        .filter(order_item::Column::ProductId.eq(product_id))
                        .one(conn)
                        .await?
                }
                None => None,
            };

            match existing {
                Some(target) => {
                    let quantity = target.quantity + item.quantity;
                    let mut target: order_item::ActiveModel = target.into();
                    target.quantity = Set(quantity);
                    target.update(conn).await?;
                }
                None => {
                    let mut item: order_item::ActiveModel = item.into();
                    item.order_id = Set(user_cart.id);
                    item.update(conn).await?;
                }
            }
        }

        Order::delete_by_id(session_cart.id).exec(conn).await?;
        info!(user_order_id = %user_cart.id, "merged guest cart into user cart");
        Ok(())
    }

    /// Recompute `order.total` from the current line items. Called as an
    /// explicit final step of every mutation, inside the same transaction.
    async fn recalculate_total<C: ConnectionTrait>(
        conn: &C,
        order_id: Uuid,
    ) -> Result<(order::Model, Vec<order_item::Model>), ServiceError> {
        let items = OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(conn)
            .await?;

        let total: Decimal = items.iter().map(|item| item.subtotal()).sum();

        let order = Order::find_by_id(order_id)
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let mut order: order::ActiveModel = order.into();
        order.total = Set(total);
        order.updated_at = Set(Utc::now());
        let order = order.update(conn).await?;

        Ok((order, items))
    }

    async fn emit_resolution_events(&self, outcome: &ResolveOutcome) {
        if let Some(order_id) = outcome.created {
            self.event_sender
                .send_or_log(Event::CartCreated(order_id))
                .await;
        }
        if let Some((session_order_id, user_order_id)) = outcome.merged {
            self.event_sender
                .send_or_log(Event::CartMerged {
                    session_order_id,
                    user_order_id,
                })
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minted_session_keys_are_alphanumeric_and_unique() {
        let a = mint_session_key();
        let b = mint_session_key();
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }

    #[test]
    fn actor_defaults_to_anonymous() {
        let actor = Actor::default();
        assert!(actor.user_id.is_none());
        assert!(actor.session_key.is_none());
    }
}
