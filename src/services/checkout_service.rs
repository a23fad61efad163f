use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::LockType;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit::log_audit,
    dto::{
        checkout::{CheckoutSessionResponse, ShippingAddressRequest, ShippingAddressView},
        orders::{OrderLineView, OrderView},
    },
    entity::{
        cart_items::{self, Entity as CartItems},
        carts::{self, CartStatus, Entity as Carts},
        orders::{self, Entity as Orders, OrderStatus},
        products::{self, Entity as Products, ProductStatus},
        shipping_addresses,
        users::Entity as Users,
    },
    error::{AppError, AppResult, IntegrityError},
    middleware::auth::AuthUser,
    models::format_cents,
    notify::{self, PendingNotice},
    response::{ApiResponse, Meta},
    services::{cart_service, order_service, product_service},
    state::AppState,
};

/// Phase A. Requires a non-empty, conflict-free Active cart; stores the
/// address and attaches it to the cart. Repeating this phase just replaces
/// the address.
pub async fn set_shipping_address(
    state: &AppState,
    user: &AuthUser,
    payload: ShippingAddressRequest,
) -> AppResult<ApiResponse<ShippingAddressView>> {
    payload.validate(&state.config)?;

    let txn = state.orm.begin().await?;

    let cart = cart_service::find_active_cart(&txn, user.user_id)
        .await?
        .ok_or(AppError::NotFound)?;
    gate_on_cart_contents(&txn, cart.id).await?;

    let address = shipping_addresses::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(user.user_id),
        address: Set(payload.address),
        city: Set(payload.city),
        state: Set(payload.state),
        country: Set(payload.country),
        postal_code: Set(payload.postal_code),
        created_at: NotSet,
    }
    .insert(&txn)
    .await?;

    let mut cart_active: carts::ActiveModel = cart.into();
    cart_active.shipping_address_id = Set(Some(address.id));
    cart_active.updated_at = Set(Utc::now().into());
    cart_active.update(&txn).await?;

    txn.commit().await?;

    Ok(ApiResponse::success(
        "Shipping address saved",
        ShippingAddressView {
            id: address.id,
            address: address.address,
            city: address.city,
            state: address.state,
            country: address.country,
            postal_code: address.postal_code,
        },
        Some(Meta::empty()),
    ))
}

/// Phase B. Hands the cart off to the payment gateway. Nothing is mutated
/// here: a gateway failure surfaces as 502 and the cart is untouched, so the
/// user can simply retry.
pub async fn create_payment_session(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<CheckoutSessionResponse>> {
    let cart = cart_service::find_active_cart(&state.orm, user.user_id)
        .await?
        .ok_or(AppError::NotFound)?;
    let lines = gate_on_cart_contents(&state.orm, cart.id).await?;
    if cart.shipping_address_id.is_none() {
        return Err(AppError::Conflict(
            "no shipping address on the cart".to_string(),
        ));
    }

    let mut line_items = Vec::with_capacity(lines.len());
    for line in &lines {
        let price_ref = line.payment_price_ref.clone().ok_or_else(|| {
            AppError::BadRequest(format!("'{}' cannot be purchased online", line.name))
        })?;
        line_items.push(crate::payment::SessionLineItem {
            price_ref,
            quantity: line.quantity,
        });
    }

    let success_url = format!("{}/checkout/success/{}", state.config.public_url, cart.token);
    let cancel_url = format!("{}/checkout/cancel", state.config.public_url);
    let session_url = state
        .gateway
        .create_checkout_session(&line_items, &success_url, &cancel_url)
        .await?;

    Ok(ApiResponse::success(
        "Checkout session created",
        CheckoutSessionResponse { session_url },
        Some(Meta::empty()),
    ))
}

/// Phase C: payment confirmation, keyed by the cart's opaque token.
///
/// The order is the durable fact: once the gateway has redirected back,
/// stock drift is reconciled and flagged (`has_errors`), never rolled back.
/// Runs as one transaction; notifications go out only after commit.
pub async fn confirm(
    state: &AppState,
    user: &AuthUser,
    cart_token: Uuid,
) -> AppResult<ApiResponse<OrderView>> {
    let txn = state.orm.begin().await?;

    let cart = Carts::find()
        .filter(carts::Column::Token.eq(cart_token))
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;

    if cart.user_id != user.user_id || cart.status == CartStatus::Inactive {
        return Err(AppError::Forbidden);
    }

    // Duplicate-confirmation guard: a cart that already produced an order is
    // never confirmed again, no matter how often the gateway retries the
    // callback. Backed by the unique index on orders.cart_id.
    let existing_orders = Orders::find()
        .filter(orders::Column::CartId.eq(cart.id))
        .count(&txn)
        .await?;
    if existing_orders > 1 {
        return Err(IntegrityError::MultipleOrdersForCart.into());
    }
    if existing_orders == 1 {
        return Err(AppError::Forbidden);
    }

    // Lines are locked and walked in product_id order so concurrent
    // confirmations touching the same products cannot deadlock.
    let items = CartItems::find()
        .filter(cart_items::Column::CartId.eq(cart.id))
        .order_by_asc(cart_items::Column::ProductId)
        .lock(LockType::Update)
        .all(&txn)
        .await?;
    if items.is_empty() {
        return Err(AppError::Conflict("cart is empty".to_string()));
    }

    let mut pairs = Vec::with_capacity(items.len());
    for item in items {
        let product = Products::find_by_id(item.product_id)
            .lock(LockType::Update)
            .one(&txn)
            .await?
            .ok_or_else(|| {
                AppError::Internal(anyhow::anyhow!("cart line references a missing product"))
            })?;
        pairs.push((item, product));
    }

    let purchaser = Users::find_by_id(cart.user_id)
        .one(&txn)
        .await?
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("cart owner does not exist")))?;

    // The total is what the customer actually paid for, at the prices in
    // effect right now, conflicted lines included.
    let total: i64 = pairs
        .iter()
        .map(|(item, product)| product.price_cents * i64::from(item.quantity))
        .sum();

    let order = orders::ActiveModel {
        id: Set(Uuid::new_v4()),
        cart_id: Set(cart.id),
        user_id: Set(cart.user_id),
        total_price_cents: Set(total),
        status: Set(OrderStatus::Placed),
        estimated_delivery_date: Set(None),
        notes: Set(None),
        token: Set(Uuid::new_v4()),
        has_errors: Set(false),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&txn)
    .await?;

    let mut notices: Vec<PendingNotice> = Vec::new();
    let mut has_errors = false;
    let mut lines_view = Vec::with_capacity(pairs.len());

    for (item, product) in pairs {
        let price_now = product.price_cents;
        let product_name = product.name.clone();

        if product.status == ProductStatus::Inactive {
            // The product went away between handoff and confirmation. Stock
            // is untouched for this line; a human sorts it out.
            has_errors = true;
            notices.push(admin_conflict_notice(
                state,
                order.id,
                &format!("product '{product_name}' is inactive"),
            ));
            notices.push(PendingNotice {
                recipient: purchaser.email.clone(),
                subject: "A problem with your order".to_string(),
                body: format!(
                    "'{product_name}' is no longer available. Contact us regarding this issue; an admin has been notified."
                ),
            });
        } else if item.quantity > product.stock {
            // Oversold. Record the overflow for manual reconciliation and
            // take the product off the shelf.
            has_errors = true;
            let overflow = item.quantity - product.stock;
            let mut active: products::ActiveModel = product.into();
            active.stock = Set(0);
            active.stock_overflow = Set(overflow);
            active.status = Set(ProductStatus::Inactive);
            active.updated_at = Set(Utc::now().into());
            active.update(&txn).await?;
            notices.push(admin_conflict_notice(
                state,
                order.id,
                &format!(
                    "ordered quantity for '{product_name}' exceeds stock by {overflow}"
                ),
            ));
            notices.push(PendingNotice {
                recipient: purchaser.email.clone(),
                subject: "A problem with your order".to_string(),
                body: format!(
                    "The quantity for '{product_name}' exceeds available stock. Contact us regarding this issue; an admin has been notified."
                ),
            });
        } else {
            product_service::decrement_stock(&txn, product, item.quantity).await?;
        }

        // Snapshot what was actually charged so the confirmation page is
        // immune to later price edits.
        let quantity = item.quantity;
        let product_id = item.product_id;
        let mut item_active: cart_items::ActiveModel = item.into();
        item_active.original_price_cents = Set(price_now);
        item_active.updated_at = Set(Utc::now().into());
        item_active.update(&txn).await?;

        lines_view.push(OrderLineView {
            product_id,
            name: product_name,
            quantity,
            original_price_cents: price_now,
            line_total_cents: price_now * i64::from(quantity),
        });
    }

    let order = if has_errors {
        let mut active: orders::ActiveModel = order.into();
        active.has_errors = Set(true);
        active.updated_at = Set(Utc::now().into());
        active.update(&txn).await?
    } else {
        order
    };

    // Retire the cart and hand the owner a fresh one so they are never
    // without an Active cart.
    cart_service::deactivate_active_cart(&txn, cart.user_id).await?;
    cart_service::create_active_cart(&txn, cart.user_id).await?;

    txn.commit().await?;

    notices.push(confirmation_notice(state, &purchaser.email, &order, &lines_view));
    notify::send_all(state.notifier.as_ref(), notices).await;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "checkout_confirm",
        Some("orders"),
        Some(serde_json::json!({ "order_id": order.id, "has_errors": order.has_errors })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Order placed",
        OrderView {
            order: order_service::order_from_entity(order),
            lines: lines_view,
        },
        Some(Meta::empty()),
    ))
}

/// Phase A/B gate: the cart must have lines and none of them may conflict
/// with current catalog state.
async fn gate_on_cart_contents<C: sea_orm::ConnectionTrait>(
    conn: &C,
    cart_id: Uuid,
) -> AppResult<Vec<cart_service::CartLine>> {
    let lines = cart_service::load_cart_lines(conn, cart_id).await?;
    if lines.is_empty() {
        return Err(AppError::Conflict("cart is empty".to_string()));
    }
    let conflicts = cart_service::fold_conflicts(&lines);
    if conflicts.any() {
        return Err(AppError::Conflict(
            "cart has stock or availability conflicts".to_string(),
        ));
    }
    Ok(lines)
}

fn admin_conflict_notice(state: &AppState, order_id: Uuid, detail: &str) -> PendingNotice {
    PendingNotice {
        recipient: state.config.admin_email.clone(),
        subject: "Order reconciliation error".to_string(),
        body: format!("Order {order_id} was placed with an error: {detail}."),
    }
}

fn confirmation_notice(
    state: &AppState,
    recipient: &str,
    order: &orders::Model,
    lines: &[OrderLineView],
) -> PendingNotice {
    let mut body = format!(
        "Thanks for your order!\nConfirmation: {}/orders/{}\n",
        state.config.public_url, order.token
    );
    for line in lines {
        body.push_str(&format!(
            "{} of {} for ${} each\n",
            line.quantity,
            line.name,
            format_cents(line.original_price_cents)
        ));
    }
    body.push_str(&format!("Total: ${}\n", format_cents(order.total_price_cents)));
    PendingNotice {
        recipient: recipient.to_string(),
        subject: "Order Confirmation".to_string(),
        body,
    }
}
