use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    dto::reports::{
        MonthlyOrdersReport, StatusCountEntry, StatusCountReport, TopSellingEntry,
        TopSellingReport,
    },
    error::AppResult,
    middleware::auth::{AuthUser, ensure_admin},
    models::format_cents,
    response::{ApiResponse, Meta},
    state::AppState,
};

/// Units sold per product, counted over cart lines whose parent cart is
/// Inactive, meaning carts that went through checkout. Products that never
/// sold appear with a count of zero.
pub async fn top_selling_products(
    state: &AppState,
    user: &AuthUser,
    limit: i64,
) -> AppResult<ApiResponse<TopSellingReport>> {
    ensure_admin(user)?;
    let limit = limit.clamp(1, 100);

    let items = sqlx::query_as::<_, TopSellingEntry>(
        r#"
        SELECT p.id AS product_id, p.name,
               COALESCE(SUM(ci.quantity) FILTER (WHERE c.status = 'Inactive'), 0)::BIGINT AS total_sold
        FROM products p
        LEFT JOIN cart_items ci ON ci.product_id = p.id
        LEFT JOIN carts c ON c.id = ci.cart_id
        GROUP BY p.id, p.name
        ORDER BY total_sold DESC, p.name ASC
        LIMIT $1
        "#,
    )
    .bind(limit)
    .fetch_all(&state.pool)
    .await?;

    Ok(ApiResponse::success(
        "Top selling products",
        TopSellingReport { items },
        Some(Meta::empty()),
    ))
}

pub async fn orders_per_month(
    state: &AppState,
    user: &AuthUser,
    year: i32,
) -> AppResult<ApiResponse<MonthlyOrdersReport>> {
    ensure_admin(user)?;

    let rows: Vec<(i32, i64)> = sqlx::query_as(
        r#"
        SELECT EXTRACT(MONTH FROM created_at)::INT AS month, COUNT(*)::BIGINT AS total
        FROM orders
        WHERE EXTRACT(YEAR FROM created_at)::INT = $1
        GROUP BY month
        "#,
    )
    .bind(year)
    .fetch_all(&state.pool)
    .await?;

    let mut months = vec![0i64; 12];
    for (month, total) in rows {
        if (1..=12).contains(&month) {
            months[(month - 1) as usize] = total;
        }
    }

    Ok(ApiResponse::success(
        "Orders per month",
        MonthlyOrdersReport { year, months },
        Some(Meta::empty()),
    ))
}

pub async fn order_status_counts(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<StatusCountReport>> {
    ensure_admin(user)?;

    let items = sqlx::query_as::<_, StatusCountEntry>(
        "SELECT status, COUNT(*)::BIGINT AS total FROM orders GROUP BY status ORDER BY status",
    )
    .fetch_all(&state.pool)
    .await?;

    Ok(ApiResponse::success(
        "Order status counts",
        StatusCountReport { items },
        Some(Meta::empty()),
    ))
}

#[derive(sqlx::FromRow)]
struct ExportOrderRow {
    id: Uuid,
    created_at: DateTime<Utc>,
    total_price_cents: i64,
    status: String,
    email: String,
    address: Option<String>,
    city: Option<String>,
    state_name: Option<String>,
    country: Option<String>,
    postal_code: Option<String>,
    product_names: String,
}

#[derive(sqlx::FromRow)]
struct ExportHistoryRow {
    order_number: Uuid,
    created_at: DateTime<Utc>,
    total_price_cents: i64,
    status: String,
}

pub const EXPORT_HEADER: [&str; 7] = [
    "Order ID",
    "Order date",
    "Order total price",
    "Order status",
    "User email",
    "Shipping address",
    "Ordered products",
];

/// Flat tab-separated dump of every order, live and archived. Archived rows
/// belong to deleted accounts, so the identity-bearing columns render
/// "account deleted".
pub async fn export_orders_tsv(state: &AppState, user: &AuthUser) -> AppResult<String> {
    ensure_admin(user)?;

    let orders = sqlx::query_as::<_, ExportOrderRow>(
        r#"
        SELECT o.id, o.created_at, o.total_price_cents, o.status, u.email,
               sa.address, sa.city, sa.state AS state_name, sa.country, sa.postal_code,
               COALESCE(STRING_AGG(p.name, ', ' ORDER BY p.name), '') AS product_names
        FROM orders o
        JOIN users u ON u.id = o.user_id
        JOIN carts c ON c.id = o.cart_id
        LEFT JOIN shipping_addresses sa ON sa.id = c.shipping_address_id
        LEFT JOIN cart_items ci ON ci.cart_id = c.id
        LEFT JOIN products p ON p.id = ci.product_id
        GROUP BY o.id, o.created_at, o.total_price_cents, o.status, u.email,
                 sa.address, sa.city, sa.state, sa.country, sa.postal_code
        ORDER BY o.created_at
        "#,
    )
    .fetch_all(&state.pool)
    .await?;

    let histories = sqlx::query_as::<_, ExportHistoryRow>(
        "SELECT order_number, created_at, total_price_cents, status FROM order_histories ORDER BY created_at",
    )
    .fetch_all(&state.pool)
    .await?;

    let mut out = String::new();
    out.push_str(&tsv_row(&EXPORT_HEADER.map(String::from)));

    for row in orders {
        let shipping = match (&row.address, &row.city, &row.postal_code, &row.state_name, &row.country) {
            (Some(address), Some(city), Some(postal), Some(st), Some(country)) => {
                format!("{address}, {city}, {postal}, {st}, {country}")
            }
            _ => String::new(),
        };
        out.push_str(&tsv_row(&[
            row.id.to_string(),
            row.created_at.to_rfc3339(),
            format_cents(row.total_price_cents),
            row.status,
            row.email,
            shipping,
            row.product_names,
        ]));
    }

    for row in histories {
        out.push_str(&tsv_row(&[
            row.order_number.to_string(),
            row.created_at.to_rfc3339(),
            format_cents(row.total_price_cents),
            row.status,
            "account deleted".to_string(),
            "account deleted".to_string(),
            "account deleted".to_string(),
        ]));
    }

    Ok(out)
}

/// Join fields with tabs, squashing embedded tabs/newlines so a field can
/// never break the table shape.
pub fn tsv_row(fields: &[String]) -> String {
    let mut row = fields
        .iter()
        .map(|f| f.replace(['\t', '\n', '\r'], " "))
        .collect::<Vec<_>>()
        .join("\t");
    row.push('\n');
    row
}
