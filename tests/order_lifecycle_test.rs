mod common;

use assert_matches::assert_matches;
use common::TestApp;
use comicstand_api::{
    entities::{event_ticket, order::OrderStatus, EventTicket, Product},
    errors::ServiceError,
    services::carts::Actor,
};
use rust_decimal_macros::dec;
use sea_orm::EntityTrait;
use serde_json::json;
use std::collections::HashSet;
use uuid::Uuid;

fn guest(session_key: &str) -> Actor {
    Actor {
        user_id: None,
        session_key: Some(session_key.to_string()),
    }
}

/// Put `quantity` of a product into a fresh cart and stamp checkout
/// details, returning the pending order's id.
async fn pending_order(app: &TestApp, session: &str, product_id: Uuid, quantity: i32) -> Uuid {
    let actor = guest(session);
    app.state
        .services
        .carts
        .add_item(&actor, product_id, quantity)
        .await
        .expect("add to cart");
    let view = app
        .state
        .services
        .carts
        .prepare_checkout(
            &actor,
            Some(json!({ "email": "buyer@example.com", "first_name": "Ada" })),
            Some("+254700000000".to_string()),
        )
        .await
        .expect("prepare checkout");
    view.order.id
}

#[tokio::test]
async fn paid_transition_decrements_stock_and_counts_sales() {
    let app = TestApp::new().await;
    let product = app.seed_product("Saga Vol. 1", dec!(10.00), 5).await;
    let order_id = pending_order(&app, "sess-pay", product.id, 2).await;

    let order = app.state.services.orders.mark_paid(order_id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Paid);

    let product = Product::find_by_id(product.id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(product.stock, 3);
    assert_eq!(product.sales_count, 2);
}

#[tokio::test]
async fn paid_transition_is_idempotent() {
    let app = TestApp::new().await;
    let event = app.seed_event("Launch Night", dec!(15.00), 10).await;
    let order_id = pending_order(&app, "sess-idem", event.id, 2).await;

    app.state.services.orders.mark_paid(order_id).await.unwrap();
    // Second confirmation (provider retry) must be a no-op.
    let order = app.state.services.orders.mark_paid(order_id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Paid);

    let product = Product::find_by_id(event.id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(product.stock, 8);
    assert_eq!(product.sales_count, 2);

    let tickets = EventTicket::find().all(&*app.state.db).await.unwrap();
    assert_eq!(tickets.len(), 2);
}

#[tokio::test]
async fn insufficient_stock_aborts_without_any_mutation() {
    let app = TestApp::new().await;
    let product = app.seed_product("Rare Variant Cover", dec!(99.00), 1).await;
    let order_id = pending_order(&app, "sess-short", product.id, 2).await;

    let err = app
        .state
        .services
        .orders
        .mark_paid(order_id)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InsufficientStock(_));
    assert!(err.to_string().contains("Rare Variant Cover"));

    // Nothing moved: stock, sales count and order status are untouched.
    let product = Product::find_by_id(product.id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(product.stock, 1);
    assert_eq!(product.sales_count, 0);
    let status = app
        .state
        .services
        .orders
        .payment_status(order_id)
        .await
        .unwrap();
    assert_eq!(status, OrderStatus::Pending);
    let tickets = EventTicket::find().all(&*app.state.db).await.unwrap();
    assert!(tickets.is_empty());
}

#[tokio::test]
async fn multi_item_shortfall_reports_every_short_product() {
    let app = TestApp::new().await;
    let ok = app.seed_product("In Stock", dec!(5.00), 10).await;
    let short_a = app.seed_product("Short A", dec!(5.00), 1).await;
    let short_b = app.seed_product("Short B", dec!(5.00), 0).await;

    let actor = guest("sess-multi-short");
    let carts = app.state.services.carts.clone();
    carts.add_item(&actor, ok.id, 1).await.unwrap();
    carts.add_item(&actor, short_a.id, 2).await.unwrap();
    carts.add_item(&actor, short_b.id, 1).await.unwrap();
    let view = carts
        .prepare_checkout(&actor, Some(json!({ "email": "a@b.c" })), None)
        .await
        .unwrap();

    let err = app
        .state
        .services
        .orders
        .mark_paid(view.order.id)
        .await
        .unwrap_err();
    let message = err.to_string();
    assert!(message.contains("Short A"));
    assert!(message.contains("Short B"));

    // The in-stock item was not decremented either.
    let ok = Product::find_by_id(ok.id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(ok.stock, 10);
    assert_eq!(ok.sales_count, 0);
}

#[tokio::test]
async fn event_order_issues_one_ticket_per_unit_with_distinct_codes() {
    let app = TestApp::new().await;
    let event = app.seed_event("Signing with the Artist", dec!(20.00), 10).await;
    let order_id = pending_order(&app, "sess-tickets", event.id, 3).await;

    app.state.services.orders.mark_paid(order_id).await.unwrap();

    let tickets = EventTicket::find().all(&*app.state.db).await.unwrap();
    assert_eq!(tickets.len(), 3);
    let codes: HashSet<Uuid> = tickets.iter().map(|t| t.code).collect();
    assert_eq!(codes.len(), 3);
    assert!(tickets.iter().all(|t| !t.used && t.used_at.is_none()));

    // Retrievable by order, the contract the mailer builds on.
    let issued = app
        .state
        .services
        .tickets
        .tickets_for_order(order_id)
        .await
        .unwrap();
    assert_eq!(issued.len(), 3);
    assert!(issued
        .iter()
        .all(|t| t.event.as_deref() == Some("Signing with the Artist")));
}

#[tokio::test]
async fn standard_products_never_issue_tickets() {
    let app = TestApp::new().await;
    let product = app.seed_product("Plain Trade Paperback", dec!(18.00), 10).await;
    let order_id = pending_order(&app, "sess-no-tickets", product.id, 2).await;

    app.state.services.orders.mark_paid(order_id).await.unwrap();

    let tickets = EventTicket::find().all(&*app.state.db).await.unwrap();
    assert!(tickets.is_empty());
}

#[tokio::test]
async fn last_unit_can_only_be_sold_once() {
    let app = TestApp::new().await;
    let product = app.seed_product("Final Copy", dec!(50.00), 1).await;
    let first = pending_order(&app, "sess-first", product.id, 1).await;
    let second = pending_order(&app, "sess-second", product.id, 1).await;

    let orders = app.state.services.orders.clone();
    let winner = orders.mark_paid(first).await;
    let loser = orders.mark_paid(second).await;

    assert!(winner.is_ok());
    assert_matches!(loser.unwrap_err(), ServiceError::InsufficientStock(_));

    let product = Product::find_by_id(product.id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(product.stock, 0);
    assert_eq!(product.sales_count, 1);
    assert_eq!(
        orders.payment_status(second).await.unwrap(),
        OrderStatus::Pending
    );
}

#[tokio::test]
async fn transition_guards_reject_illegal_moves() {
    let app = TestApp::new().await;
    let product = app.seed_product("Guarded", dec!(10.00), 10).await;
    let order_id = pending_order(&app, "sess-guards", product.id, 1).await;
    let orders = app.state.services.orders.clone();

    // A pending order cannot ship, complete or refund.
    assert_matches!(
        orders.ship(order_id).await.unwrap_err(),
        ServiceError::InvalidTransition(_)
    );
    assert_matches!(
        orders.complete(order_id).await.unwrap_err(),
        ServiceError::InvalidTransition(_)
    );
    assert_matches!(
        orders.refund(order_id).await.unwrap_err(),
        ServiceError::InvalidTransition(_)
    );

    // Walk the happy path to completion.
    orders.mark_paid(order_id).await.unwrap();
    orders.ship(order_id).await.unwrap();
    orders.complete(order_id).await.unwrap();

    // A completed order is terminal; cancel must fail.
    assert_matches!(
        orders.cancel(order_id).await.unwrap_err(),
        ServiceError::InvalidTransition(_)
    );
    // And paying it again is rejected, not silently accepted.
    assert_matches!(
        orders.mark_paid(order_id).await.unwrap_err(),
        ServiceError::InvalidTransition(_)
    );
}

#[tokio::test]
async fn failed_orders_can_still_be_paid_on_retry() {
    let app = TestApp::new().await;
    let product = app.seed_product("Retry Me", dec!(10.00), 5).await;
    let order_id = pending_order(&app, "sess-retry", product.id, 1).await;
    let orders = app.state.services.orders.clone();

    let order = orders.mark_failed(order_id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Failed);

    // Repeated failure notifications are tolerated.
    let order = orders.mark_failed(order_id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Failed);

    // A later successful notification still confirms the order.
    let order = orders.mark_paid(order_id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Paid);
}

#[tokio::test]
async fn deleted_product_lines_survive_with_their_snapshot() {
    let app = TestApp::new().await;
    let product = app.seed_product("Soon Gone", dec!(10.00), 5).await;
    let actor = guest("sess-orphan");
    let carts = app.state.services.carts.clone();
    carts.add_item(&actor, product.id, 2).await.unwrap();

    Product::delete_by_id(product.id)
        .exec(&*app.state.db)
        .await
        .unwrap();

    let view = carts.resolve_cart(&actor, false).await.unwrap().unwrap();
    assert_eq!(view.items.len(), 1);
    assert_eq!(view.items[0].product_id, None);
    assert_eq!(view.items[0].quantity, 2);
    assert_eq!(view.order.total, dec!(20.00));
}

#[tokio::test]
async fn checkout_rejects_an_empty_cart() {
    let app = TestApp::new().await;
    let actor = guest("sess-empty");
    let err = app
        .state
        .services
        .carts
        .prepare_checkout(&actor, Some(json!({ "email": "a@b.c" })), None)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Validation(_));
}

#[tokio::test]
async fn ticket_code_collision_fails_loudly() {
    use sea_orm::{ActiveModelTrait, Set};

    let app = TestApp::new().await;
    let event = app.seed_event("Collision Night", dec!(10.00), 10).await;
    let order_id = pending_order(&app, "sess-collide", event.id, 1).await;
    app.state.services.orders.mark_paid(order_id).await.unwrap();

    let existing = EventTicket::find()
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();

    // Re-inserting the same code must hit the unique index, not overwrite.
    let clash = event_ticket::ActiveModel {
        id: Set(Uuid::new_v4()),
        order_item_id: Set(existing.order_item_id),
        code: Set(existing.code),
        used: Set(false),
        used_at: Set(None),
        created_at: Set(chrono::Utc::now()),
    };
    assert!(clash.insert(&*app.state.db).await.is_err());
}
