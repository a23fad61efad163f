use chrono::{NaiveDate, Utc};
use sea_orm::ActiveValue::Set;
use sea_orm::sea_query::LockType;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit::log_audit,
    dto::orders::{OrderList, OrderView},
    entity::{
        orders::{self, Entity as Orders, OrderStatus},
        products::{self, Entity as Products, ProductStatus},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::{Order, Product},
    response::{ApiResponse, Meta},
    routes::admin::{InventoryAdjustRequest, LowStockQuery, ProductList, UpdateOrderRequest},
    routes::params::{OrderListQuery, SortOrder},
    services::{order_service, product_service},
    state::AppState,
};

pub async fn list_all_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    ensure_admin(user)?;
    let (page, limit, offset) = query.pagination.normalize();

    let mut condition = Condition::all();
    if let Some(status) = query.status {
        condition = condition.add(orders::Column::Status.eq(status));
    }

    let mut finder = Orders::find().filter(condition);

    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);
    finder = match sort_order {
        SortOrder::Asc => finder.order_by_asc(orders::Column::CreatedAt),
        SortOrder::Desc => finder.order_by_desc(orders::Column::CreatedAt),
    };

    let total = finder.clone().count(&state.orm).await? as i64;

    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(order_service::order_from_entity)
        .collect();

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success("Orders", OrderList { items }, Some(meta)))
}

pub async fn get_order_admin(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderView>> {
    ensure_admin(user)?;
    let order = Orders::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let lines = order_service::order_lines(&state.orm, order.cart_id).await?;
    Ok(ApiResponse::success(
        "Order found",
        OrderView {
            order: order_service::order_from_entity(order),
            lines,
        },
        Some(Meta::empty()),
    ))
}

/// Admin edit of an order. Transitions are free-form except for one rule:
/// a Canceled order cannot carry an estimated delivery date.
pub async fn update_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateOrderRequest,
) -> AppResult<ApiResponse<Order>> {
    ensure_admin(user)?;

    let existing = Orders::find_by_id(id).one(&state.orm).await?;
    let existing = match existing {
        Some(o) => o,
        None => return Err(AppError::NotFound),
    };

    let status = payload.status.unwrap_or(existing.status);
    let delivery_date = if payload.clear_delivery_date.unwrap_or(false) {
        None
    } else {
        payload
            .estimated_delivery_date
            .or(existing.estimated_delivery_date)
    };
    validate_order_edit(status, delivery_date)?;

    let mut active: orders::ActiveModel = existing.into();
    active.status = Set(status);
    active.estimated_delivery_date = Set(delivery_date);
    if let Some(notes) = payload.notes {
        active.notes = Set(Some(notes));
    }
    active.updated_at = Set(Utc::now().into());
    let order = active.update(&state.orm).await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "order_update",
        Some("orders"),
        Some(serde_json::json!({ "order_id": order.id, "status": order_service::status_label(order.status) })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Order updated",
        order_service::order_from_entity(order),
        Some(Meta::empty()),
    ))
}

pub fn validate_order_edit(
    status: OrderStatus,
    delivery_date: Option<NaiveDate>,
) -> AppResult<()> {
    if status == OrderStatus::Canceled && delivery_date.is_some() {
        return Err(AppError::BadRequest(
            "a canceled order cannot have an estimated delivery date".to_string(),
        ));
    }
    Ok(())
}

pub async fn list_low_stock(
    state: &AppState,
    user: &AuthUser,
    query: LowStockQuery,
) -> AppResult<ApiResponse<ProductList>> {
    ensure_admin(user)?;
    let threshold = query.threshold.unwrap_or(5);
    let (page, limit, offset) = query.pagination.normalize();

    let mut finder = Products::find().filter(products::Column::Stock.lte(threshold));
    finder = finder
        .order_by_asc(products::Column::Stock)
        .order_by_desc(products::Column::CreatedAt);

    let total = finder.clone().count(&state.orm).await? as i64;

    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(product_service::product_from_entity)
        .collect();

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success("Low stock", ProductList { items }, Some(meta)))
}

/// Products that were oversold at confirmation time, awaiting manual
/// reconciliation.
pub async fn list_stock_overflow(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<ProductList>> {
    ensure_admin(user)?;
    let items = Products::find()
        .filter(products::Column::StockOverflow.gt(0))
        .order_by_desc(products::Column::StockOverflow)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(product_service::product_from_entity)
        .collect();

    Ok(ApiResponse::success(
        "Oversold products",
        ProductList { items },
        Some(Meta::empty()),
    ))
}

/// Manual stock correction. Keeps the stock/status invariant: dropping to
/// zero deactivates the product. `reset_overflow` closes out a recorded
/// oversell once it has been dealt with.
pub async fn adjust_inventory(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: InventoryAdjustRequest,
) -> AppResult<ApiResponse<Product>> {
    ensure_admin(user)?;
    if payload.delta == 0 && !payload.reset_overflow.unwrap_or(false) {
        return Err(AppError::BadRequest("nothing to adjust".into()));
    }

    let txn = state.orm.begin().await?;
    let product = Products::find_by_id(id)
        .lock(LockType::Update)
        .one(&txn)
        .await?;
    let product = match product {
        Some(p) => p,
        None => return Err(AppError::NotFound),
    };

    let new_stock = product.stock + payload.delta;
    if new_stock < 0 {
        return Err(AppError::BadRequest("stock cannot be negative".into()));
    }

    let mut active: products::ActiveModel = product.into();
    active.stock = Set(new_stock);
    if new_stock == 0 {
        active.status = Set(ProductStatus::Inactive);
    }
    if payload.reset_overflow.unwrap_or(false) {
        active.stock_overflow = Set(0);
    }
    active.updated_at = Set(Utc::now().into());
    let updated = active.update(&txn).await?;

    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "inventory_adjust",
        Some("products"),
        Some(serde_json::json!({ "product_id": updated.id, "delta": payload.delta })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Inventory updated",
        product_service::product_from_entity(updated),
        Some(Meta::empty()),
    ))
}
