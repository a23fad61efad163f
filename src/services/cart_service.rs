use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::LockType;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, FromQueryResult, JoinType,
    QueryFilter, QueryOrder, QuerySelect, RelationTrait, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit::log_audit,
    dto::cart::{AddToCartRequest, CartConflicts, CartItemDto, CartLineView, CartView,
        UpdateCartItemRequest},
    entity::{
        cart_items::{self, Entity as CartItems},
        carts::{self, CartStatus, Entity as Carts},
        products::{self, Entity as Products, ProductStatus},
    },
    error::{AppError, AppResult, IntegrityError},
    middleware::auth::AuthUser,
    response::{ApiResponse, Meta},
    state::AppState,
};

/// A cart line joined with the current catalog state of its product.
#[derive(Debug, FromQueryResult)]
pub struct CartLine {
    pub item_id: Uuid,
    pub product_id: Uuid,
    pub name: String,
    pub quantity: i32,
    pub original_price_cents: i64,
    pub price_cents: i64,
    pub stock: i32,
    pub status: ProductStatus,
    pub payment_price_ref: Option<String>,
}

/// The owner's single Active cart, or None. More than one Active cart is a
/// broken invariant and is reported, never resolved by picking one.
pub(crate) async fn find_active_cart<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
) -> AppResult<Option<carts::Model>> {
    let mut found = Carts::find()
        .filter(carts::Column::UserId.eq(user_id))
        .filter(carts::Column::Status.eq(CartStatus::Active))
        .all(conn)
        .await?;
    match found.len() {
        0 => Ok(None),
        1 => Ok(found.pop()),
        _ => Err(IntegrityError::MultipleActiveCarts.into()),
    }
}

pub(crate) async fn create_active_cart<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
) -> Result<carts::Model, sea_orm::DbErr> {
    carts::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        status: Set(CartStatus::Active),
        token: Set(Uuid::new_v4()),
        shipping_address_id: Set(None),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(conn)
    .await
}

/// Get-or-create for the owner's Active cart. The partial unique index
/// `one_active_cart_per_user` closes the check-then-insert race; when the
/// insert loses that race we re-read the winner's row.
pub async fn get_or_create_active_cart(state: &AppState, user: &AuthUser) -> AppResult<carts::Model> {
    let txn = state.orm.begin().await?;
    if let Some(cart) = find_active_cart(&txn, user.user_id).await? {
        txn.commit().await?;
        return Ok(cart);
    }
    match create_active_cart(&txn, user.user_id).await {
        Ok(cart) => {
            txn.commit().await?;
            Ok(cart)
        }
        Err(insert_err) => {
            txn.rollback().await?;
            match find_active_cart(&state.orm, user.user_id).await? {
                Some(cart) => Ok(cart),
                None => Err(insert_err.into()),
            }
        }
    }
}

/// Flip the owner's single Active cart to Inactive. Zero carts is NotFound;
/// more than one is an integrity violation.
pub(crate) async fn deactivate_active_cart<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
) -> AppResult<carts::Model> {
    let cart = find_active_cart(conn, user_id)
        .await?
        .ok_or(AppError::NotFound)?;
    let mut active: carts::ActiveModel = cart.into();
    active.status = Set(CartStatus::Inactive);
    active.updated_at = Set(Utc::now().into());
    Ok(active.update(conn).await?)
}

pub(crate) async fn load_cart_lines<C: ConnectionTrait>(
    conn: &C,
    cart_id: Uuid,
) -> AppResult<Vec<CartLine>> {
    let lines = CartItems::find()
        .select_only()
        .column_as(cart_items::Column::Id, "item_id")
        .column_as(cart_items::Column::ProductId, "product_id")
        .column_as(cart_items::Column::Quantity, "quantity")
        .column_as(cart_items::Column::OriginalPriceCents, "original_price_cents")
        .column_as(products::Column::Name, "name")
        .column_as(products::Column::PriceCents, "price_cents")
        .column_as(products::Column::Stock, "stock")
        .column_as(products::Column::Status, "status")
        .column_as(products::Column::PaymentPriceRef, "payment_price_ref")
        .join(JoinType::InnerJoin, cart_items::Relation::Products.def())
        .filter(cart_items::Column::CartId.eq(cart_id))
        .order_by_asc(cart_items::Column::ProductId)
        .into_model::<CartLine>()
        .all(conn)
        .await?;
    Ok(lines)
}

/// Sum of current catalog price x quantity. Until confirmation snapshots
/// `original_price_cents`, the cart total always tracks the live price.
pub fn cart_total_cents(lines: &[CartLine]) -> i64 {
    lines
        .iter()
        .map(|line| line.price_cents * i64::from(line.quantity))
        .sum()
}

/// Fold the two conflict flags over every line.
pub fn fold_conflicts(lines: &[CartLine]) -> CartConflicts {
    CartConflicts {
        out_of_stock: lines.iter().any(|line| line.quantity > line.stock),
        inactive_product: lines
            .iter()
            .any(|line| line.status == ProductStatus::Inactive),
    }
}

pub async fn view_cart(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<CartView>> {
    let cart = get_or_create_active_cart(state, user).await?;
    let lines = load_cart_lines(&state.orm, cart.id).await?;
    let view = cart_view(&cart, &lines);
    Ok(ApiResponse::success("OK", view, Some(Meta::empty())))
}

pub(crate) fn cart_view(cart: &carts::Model, lines: &[CartLine]) -> CartView {
    CartView {
        id: cart.id,
        token: cart.token,
        total_price_cents: cart_total_cents(lines),
        conflicts: fold_conflicts(lines),
        shipping_address_id: cart.shipping_address_id,
        items: lines
            .iter()
            .map(|line| CartLineView {
                product_id: line.product_id,
                name: line.name.clone(),
                quantity: line.quantity,
                price_cents: line.price_cents,
                line_total_cents: line.price_cents * i64::from(line.quantity),
                in_stock: line.quantity <= line.stock,
                product_active: line.status == ProductStatus::Active,
            })
            .collect(),
    }
}

/// The composite add-to-cart operation. The (cart, product) line rows are
/// locked for the duration so concurrent adds serialize: increments are not
/// lost and the unique constraint never trips under normal operation.
pub async fn add_to_cart(
    state: &AppState,
    user: &AuthUser,
    payload: AddToCartRequest,
) -> AppResult<ApiResponse<CartItemDto>> {
    payload.validate()?;

    let txn = state.orm.begin().await?;

    let product = Products::find_by_id(payload.product_id)
        .one(&txn)
        .await?
        .ok_or_else(|| AppError::BadRequest("product not found".to_string()))?;
    if product.status == ProductStatus::Inactive {
        return Err(AppError::BadRequest(
            "product is not available".to_string(),
        ));
    }

    let cart = match find_active_cart(&txn, user.user_id).await? {
        Some(cart) => cart,
        None => create_active_cart(&txn, user.user_id).await?,
    };

    let existing = CartItems::find()
        .filter(cart_items::Column::CartId.eq(cart.id))
        .filter(cart_items::Column::ProductId.eq(product.id))
        .lock(LockType::Update)
        .all(&txn)
        .await?;

    let item = match existing.len() {
        0 => {
            cart_items::ActiveModel {
                id: Set(Uuid::new_v4()),
                cart_id: Set(cart.id),
                product_id: Set(product.id),
                quantity: Set(payload.quantity),
                original_price_cents: Set(0),
                created_at: NotSet,
                updated_at: NotSet,
            }
            .insert(&txn)
            .await?
        }
        1 => {
            let current = existing.into_iter().next().ok_or_else(|| {
                AppError::Internal(anyhow::anyhow!("locked cart line disappeared"))
            })?;
            let quantity = current.quantity + payload.quantity;
            let mut active: cart_items::ActiveModel = current.into();
            active.quantity = Set(quantity);
            active.updated_at = Set(Utc::now().into());
            active.update(&txn).await?
        }
        _ => return Err(IntegrityError::MoreThanOneCartItem.into()),
    };

    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "cart_add",
        Some("cart_items"),
        Some(serde_json::json!({ "product_id": product.id, "quantity": payload.quantity })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "OK",
        CartItemDto {
            id: item.id,
            product_id: item.product_id,
            quantity: item.quantity,
        },
        None,
    ))
}

/// Set a line to an exact quantity; zero deletes the line.
pub async fn update_cart_item(
    state: &AppState,
    user: &AuthUser,
    product_id: Uuid,
    payload: UpdateCartItemRequest,
) -> AppResult<ApiResponse<serde_json::Value>> {
    payload.validate()?;

    let txn = state.orm.begin().await?;
    let cart = find_active_cart(&txn, user.user_id)
        .await?
        .ok_or(AppError::NotFound)?;

    let existing = CartItems::find()
        .filter(cart_items::Column::CartId.eq(cart.id))
        .filter(cart_items::Column::ProductId.eq(product_id))
        .lock(LockType::Update)
        .all(&txn)
        .await?;

    let item = match existing.len() {
        0 => return Err(AppError::NotFound),
        1 => existing.into_iter().next().ok_or_else(|| {
            AppError::Internal(anyhow::anyhow!("locked cart line disappeared"))
        })?,
        _ => return Err(IntegrityError::MoreThanOneCartItem.into()),
    };

    let body = if payload.quantity == 0 {
        CartItems::delete_by_id(item.id).exec(&txn).await?;
        serde_json::json!({ "removed": true })
    } else {
        let mut active: cart_items::ActiveModel = item.into();
        active.quantity = Set(payload.quantity);
        active.updated_at = Set(Utc::now().into());
        let item = active.update(&txn).await?;
        serde_json::json!({ "quantity": item.quantity })
    };

    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "cart_update",
        Some("cart_items"),
        Some(serde_json::json!({ "product_id": product_id, "quantity": payload.quantity })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success("OK", body, Some(Meta::empty())))
}

pub async fn remove_from_cart(
    state: &AppState,
    user: &AuthUser,
    product_id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let cart = find_active_cart(&state.orm, user.user_id)
        .await?
        .ok_or(AppError::NotFound)?;

    let deleted = CartItems::delete_many()
        .filter(cart_items::Column::CartId.eq(cart.id))
        .filter(cart_items::Column::ProductId.eq(product_id))
        .exec(&state.orm)
        .await?;

    if deleted.rows_affected == 0 {
        return Err(AppError::NotFound);
    }

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "cart_remove",
        Some("cart_items"),
        Some(serde_json::json!({ "product_id": product_id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Removed from cart",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}
