use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

#[derive(Debug, Deserialize, ToSchema)]
pub struct AddToCartRequest {
    pub product_id: Uuid,
    pub quantity: i32,
}

impl AddToCartRequest {
    pub fn validate(&self) -> AppResult<()> {
        if self.quantity <= 0 {
            return Err(AppError::BadRequest(
                "quantity must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateCartItemRequest {
    /// Zero removes the line.
    pub quantity: i32,
}

impl UpdateCartItemRequest {
    pub fn validate(&self) -> AppResult<()> {
        if self.quantity < 0 {
            return Err(AppError::BadRequest(
                "quantity cannot be negative".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CartItemDto {
    pub id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CartLineView {
    pub product_id: Uuid,
    pub name: String,
    pub quantity: i32,
    pub price_cents: i64,
    pub line_total_cents: i64,
    pub in_stock: bool,
    pub product_active: bool,
}

/// Two independent flags, folded over every line: checkout is gated on both
/// being false.
#[derive(Debug, Clone, Copy, Default, Serialize, ToSchema)]
pub struct CartConflicts {
    pub out_of_stock: bool,
    pub inactive_product: bool,
}

impl CartConflicts {
    pub fn any(&self) -> bool {
        self.out_of_stock || self.inactive_product
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CartView {
    pub id: Uuid,
    pub token: Uuid,
    pub items: Vec<CartLineView>,
    pub total_price_cents: i64,
    pub conflicts: CartConflicts,
    pub shipping_address_id: Option<Uuid>,
}
