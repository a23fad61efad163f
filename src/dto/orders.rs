use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::Order;

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderLineView {
    pub product_id: Uuid,
    pub name: String,
    pub quantity: i32,
    /// The price actually charged, snapshotted at confirmation.
    pub original_price_cents: i64,
    pub line_total_cents: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderView {
    pub order: Order,
    pub lines: Vec<OrderLineView>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderList {
    pub items: Vec<Order>,
}
