use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set,
};
use uuid::Uuid;

use crate::{
    dto::orders::{OrderLineView, OrderList, OrderView},
    entity::{
        order_histories,
        orders::{self, Entity as Orders, OrderStatus},
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::Order,
    response::{ApiResponse, Meta},
    routes::params::{OrderListQuery, SortOrder},
    services::cart_service,
    state::AppState,
};

pub async fn list_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let (page, limit, offset) = query.pagination.normalize();
    let mut condition = Condition::all().add(orders::Column::UserId.eq(user.user_id));
    if let Some(status) = query.status {
        condition = condition.add(orders::Column::Status.eq(status));
    }

    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);

    let mut finder = Orders::find().filter(condition);
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
        .map(order_from_entity)
        .collect();

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success("Ok", OrderList { items }, Some(meta)))
}

/// Fetch an order by its public token. Someone else's token is Forbidden,
/// not NotFound: the token resolved, the caller just is not the purchaser.
pub async fn get_order_by_token(
    state: &AppState,
    user: &AuthUser,
    token: Uuid,
) -> AppResult<ApiResponse<OrderView>> {
    let order = Orders::find()
        .filter(orders::Column::Token.eq(token))
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    if order.user_id != user.user_id {
        return Err(AppError::Forbidden);
    }

    let lines = order_lines(&state.orm, order.cart_id).await?;
    Ok(ApiResponse::success(
        "OK",
        OrderView {
            order: order_from_entity(order),
            lines,
        },
        Some(Meta::empty()),
    ))
}

/// Order lines come from the retired cart, priced at the confirmation-time
/// snapshot rather than the live catalog price.
pub(crate) async fn order_lines<C: ConnectionTrait>(
    conn: &C,
    cart_id: Uuid,
) -> AppResult<Vec<OrderLineView>> {
    let lines = cart_service::load_cart_lines(conn, cart_id).await?;
    Ok(lines
        .into_iter()
        .map(|line| OrderLineView {
            product_id: line.product_id,
            name: line.name,
            quantity: line.quantity,
            original_price_cents: line.original_price_cents,
            line_total_cents: line.original_price_cents * i64::from(line.quantity),
        })
        .collect())
}

/// Snapshot every order belonging to a user into `order_histories` so the
/// rows survive the account (and its orders) being deleted.
pub(crate) async fn archive_orders_for_user<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
) -> AppResult<u64> {
    let orders = Orders::find()
        .filter(orders::Column::UserId.eq(user_id))
        .all(conn)
        .await?;

    let mut archived = 0;
    for order in orders {
        order_histories::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_number: Set(order.id),
            total_price_cents: Set(order.total_price_cents),
            status: Set(status_label(order.status).to_string()),
            created_at: Set(order.created_at),
        }
        .insert(conn)
        .await?;
        archived += 1;
    }
    Ok(archived)
}

pub(crate) fn status_label(status: OrderStatus) -> &'static str {
    match status {
        OrderStatus::Placed => "Placed",
        OrderStatus::Shipped => "Shipped",
        OrderStatus::Delivered => "Delivered",
        OrderStatus::Canceled => "Canceled",
    }
}

pub(crate) fn order_from_entity(model: orders::Model) -> Order {
    Order {
        id: model.id,
        cart_id: model.cart_id,
        total_price_cents: model.total_price_cents,
        status: model.status,
        estimated_delivery_date: model.estimated_delivery_date,
        notes: model.notes,
        token: model.token,
        has_errors: model.has_errors,
        created_at: model.created_at.with_timezone(&Utc),
    }
}
