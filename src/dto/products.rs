use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::{AppError, AppResult};
use crate::models::{Product, ProductStatus};

/// The smallest price the catalog accepts, in cents.
pub const MIN_PRICE_CENTS: i64 = 100;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateProductRequest {
    pub name: String,
    pub description: Option<String>,
    pub price_cents: i64,
    pub stock: i32,
    pub status: ProductStatus,
}

impl CreateProductRequest {
    pub fn validate(&self) -> AppResult<()> {
        if self.name.trim().is_empty() {
            return Err(AppError::BadRequest("name must not be empty".into()));
        }
        validate_price(self.price_cents)?;
        validate_stock_status(self.stock, self.status)
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price_cents: Option<i64>,
    pub stock: Option<i32>,
    pub status: Option<ProductStatus>,
}

impl UpdateProductRequest {
    /// Validated against the resulting field values, not just the patch.
    pub fn validate(&self, current_stock: i32, current_status: ProductStatus) -> AppResult<()> {
        if let Some(name) = &self.name
            && name.trim().is_empty()
        {
            return Err(AppError::BadRequest("name must not be empty".into()));
        }
        if let Some(price) = self.price_cents {
            validate_price(price)?;
        }
        let stock = self.stock.unwrap_or(current_stock);
        let status = self.status.unwrap_or(current_status);
        validate_stock_status(stock, status)
    }
}

fn validate_price(price_cents: i64) -> AppResult<()> {
    if price_cents < MIN_PRICE_CENTS {
        return Err(AppError::BadRequest(
            "price must be at least 1.00".to_string(),
        ));
    }
    Ok(())
}

fn validate_stock_status(stock: i32, status: ProductStatus) -> AppResult<()> {
    if stock < 0 {
        return Err(AppError::BadRequest("stock cannot be negative".into()));
    }
    if stock == 0 && status == ProductStatus::Active {
        return Err(AppError::BadRequest(
            "a product with no stock cannot be active".to_string(),
        ));
    }
    Ok(())
}

#[derive(Serialize, ToSchema)]
#[serde(transparent)]
pub struct ProductList {
    #[schema(value_type = Vec<Product>)]
    pub items: Vec<Product>,
}
