use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Serialize, ToSchema, sqlx::FromRow)]
pub struct TopSellingEntry {
    pub product_id: Uuid,
    pub name: String,
    /// Units sold across checked-out carts; zero-sale products included.
    pub total_sold: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TopSellingReport {
    pub items: Vec<TopSellingEntry>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MonthlyOrdersReport {
    pub year: i32,
    /// Twelve counts, January first.
    pub months: Vec<i64>,
}

#[derive(Debug, Serialize, ToSchema, sqlx::FromRow)]
pub struct StatusCountEntry {
    pub status: String,
    pub total: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StatusCountReport {
    pub items: Vec<StatusCountEntry>,
}
