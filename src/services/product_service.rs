use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::Expr;
use sea_orm::sea_query::extension::postgres::PgExpr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set,
};
use uuid::Uuid;

use crate::{
    audit::log_audit,
    dto::products::{CreateProductRequest, ProductList, UpdateProductRequest},
    entity::products::{ActiveModel, Column, Entity as Products, Model as ProductModel,
        ProductStatus},
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::Product,
    response::{ApiResponse, Meta},
    routes::params::{ProductQuery, ProductSortBy, SortOrder},
    state::AppState,
};

/// Public catalog listing: active products only.
pub async fn list_products(
    state: &AppState,
    query: ProductQuery,
) -> AppResult<ApiResponse<ProductList>> {
    let (page, limit, offset) = query.pagination.normalize();
    let mut condition = Condition::all().add(Column::Status.eq(ProductStatus::Active));

    if let Some(search) = query.q.as_ref().filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", search);
        condition = condition.add(
            Condition::any()
                .add(Expr::col(Column::Name).ilike(pattern.clone()))
                .add(Expr::col(Column::Description).ilike(pattern)),
        );
    }

    if let Some(min_price) = query.min_price_cents {
        condition = condition.add(Column::PriceCents.gte(min_price));
    }

    if let Some(max_price) = query.max_price_cents {
        condition = condition.add(Column::PriceCents.lte(max_price));
    }

    let sort_by = query.sort_by.unwrap_or(ProductSortBy::CreatedAt);
    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);
    let sort_col = match sort_by {
        ProductSortBy::CreatedAt => Column::CreatedAt,
        ProductSortBy::Price => Column::PriceCents,
        ProductSortBy::Name => Column::Name,
    };

    let mut finder = Products::find().filter(condition);
    finder = match sort_order {
        SortOrder::Asc => finder.order_by_asc(sort_col),
        SortOrder::Desc => finder.order_by_desc(sort_col),
    };

    let total = finder.clone().count(&state.orm).await? as i64;

    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(product_from_entity)
        .collect();

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success("Products", ProductList { items }, Some(meta)))
}

pub async fn get_product(state: &AppState, id: Uuid) -> AppResult<ApiResponse<Product>> {
    let result = Products::find_by_id(id)
        .one(&state.orm)
        .await?
        .map(product_from_entity);
    let result = match result {
        Some(p) => p,
        None => return Err(AppError::NotFound),
    };
    Ok(ApiResponse::success("Product", result, None))
}

/// Create a product and provision its counterpart on the payment gateway.
/// If provisioning fails the local row is removed so the catalog never holds
/// a product that cannot be charged for.
pub async fn create_product(
    state: &AppState,
    user: &AuthUser,
    payload: CreateProductRequest,
) -> AppResult<ApiResponse<Product>> {
    ensure_admin(user)?;
    payload.validate()?;

    let id = Uuid::new_v4();
    let active = ActiveModel {
        id: Set(id),
        name: Set(payload.name.clone()),
        description: Set(payload.description),
        price_cents: Set(payload.price_cents),
        stock: Set(payload.stock),
        stock_overflow: Set(0),
        status: Set(payload.status),
        payment_product_ref: Set(None),
        payment_price_ref: Set(None),
        created_at: NotSet,
        updated_at: NotSet,
    };
    let product = active.insert(&state.orm).await?;

    let refs = match state
        .gateway
        .register_product(&product.name, product.price_cents)
        .await
    {
        Ok(refs) => refs,
        Err(err) => {
            Products::delete_by_id(product.id).exec(&state.orm).await?;
            return Err(err.into());
        }
    };

    let mut active: ActiveModel = product.into();
    active.payment_product_ref = Set(Some(refs.product_ref));
    active.payment_price_ref = Set(Some(refs.price_ref));
    let product = active.update(&state.orm).await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "product_create",
        Some("products"),
        Some(serde_json::json!({ "product_id": product.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Product created",
        product_from_entity(product),
        Some(Meta::empty()),
    ))
}

/// A price change mints a new gateway price ref; the row is only saved once
/// the gateway accepted the change.
pub async fn update_product(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateProductRequest,
) -> AppResult<ApiResponse<Product>> {
    ensure_admin(user)?;
    let existing = Products::find_by_id(id).one(&state.orm).await?;
    let existing = match existing {
        Some(p) => p,
        None => return Err(AppError::NotFound),
    };
    payload.validate(existing.stock, existing.status)?;

    let price_changed = payload
        .price_cents
        .is_some_and(|price| price != existing.price_cents);
    let new_price_ref = if price_changed {
        let product_ref = existing.payment_product_ref.clone().ok_or_else(|| {
            AppError::BadRequest("product has no payment gateway counterpart".to_string())
        })?;
        let price = payload.price_cents.unwrap_or(existing.price_cents);
        Some(state.gateway.update_price(&product_ref, price).await?)
    } else {
        None
    };

    let mut active: ActiveModel = existing.into();
    if let Some(name) = payload.name {
        active.name = Set(name);
    }
    if let Some(description) = payload.description {
        active.description = Set(Some(description));
    }
    if let Some(price) = payload.price_cents {
        active.price_cents = Set(price);
    }
    if let Some(stock) = payload.stock {
        active.stock = Set(stock);
    }
    if let Some(status) = payload.status {
        active.status = Set(status);
    }
    if let Some(price_ref) = new_price_ref {
        active.payment_price_ref = Set(Some(price_ref));
    }
    active.updated_at = Set(Utc::now().into());

    let product = active.update(&state.orm).await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "product_update",
        Some("products"),
        Some(serde_json::json!({ "product_id": product.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Updated",
        product_from_entity(product),
        Some(Meta::empty()),
    ))
}

/// The gateway counterpart is deactivated first; if that fails the local row
/// stays so the two sides never diverge silently.
pub async fn delete_product(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_admin(user)?;
    let existing = Products::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    if let Some(product_ref) = existing.payment_product_ref.as_deref() {
        state.gateway.deactivate_product(product_ref).await?;
    }

    let result = Products::delete_by_id(id).exec(&state.orm).await?;
    if result.rows_affected == 0 {
        return Err(AppError::NotFound);
    }

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "product_delete",
        Some("products"),
        Some(serde_json::json!({ "product_id": id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Deleted",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

/// Reduce stock by a purchased quantity, forcing Inactive at zero. Never
/// goes negative: callers detect over-subtraction beforehand and take the
/// overflow path instead.
pub(crate) async fn decrement_stock<C: ConnectionTrait>(
    conn: &C,
    product: ProductModel,
    quantity: i32,
) -> AppResult<ProductModel> {
    if quantity > product.stock {
        return Err(AppError::BadRequest(
            "cannot decrement stock below zero".to_string(),
        ));
    }
    let new_stock = product.stock - quantity;
    let mut active: ActiveModel = product.into();
    active.stock = Set(new_stock);
    if new_stock == 0 {
        active.status = Set(ProductStatus::Inactive);
    }
    active.updated_at = Set(Utc::now().into());
    Ok(active.update(conn).await?)
}

pub(crate) fn product_from_entity(model: ProductModel) -> Product {
    Product {
        id: model.id,
        name: model.name,
        description: model.description,
        price_cents: model.price_cents,
        stock: model.stock,
        stock_overflow: model.stock_overflow,
        status: model.status,
        created_at: model.created_at.with_timezone(&Utc),
    }
}
