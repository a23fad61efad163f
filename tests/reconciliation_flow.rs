use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sea_orm::ActiveValue::NotSet;
use sea_orm::{ActiveModelTrait, ConnectionTrait, EntityTrait, Set, Statement};
use storefront_api::{
    config::AppConfig,
    db::{create_orm_conn, create_pool, run_migrations},
    dto::cart::AddToCartRequest,
    dto::checkout::ShippingAddressRequest,
    dto::products::{CreateProductRequest, UpdateProductRequest},
    entity::Products,
    entity::products::ProductStatus,
    entity::users::ActiveModel as UserActive,
    error::AppError,
    middleware::auth::AuthUser,
    notify::Notifier,
    payment::OfflineGateway,
    routes::admin::{InventoryAdjustRequest, UpdateOrderRequest},
    services::{
        admin_service, auth_service, cart_service, checkout_service, product_service,
        report_service,
    },
    state::AppState,
};
use uuid::Uuid;

#[derive(Default, Clone)]
struct RecordingNotifier {
    sent: Arc<Mutex<Vec<(String, String)>>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, recipient: &str, subject: &str, _body: &str) -> anyhow::Result<()> {
        self.sent
            .lock()
            .expect("notifier lock")
            .push((recipient.to_string(), subject.to_string()));
        Ok(())
    }
}

// Drift between payment handoff and confirmation: oversold stock and
// deactivated products flag the order instead of rolling it back. Also
// covers the admin state-machine rule, reports and the TSV export.
#[tokio::test]
async fn reconciliation_and_reporting_flow() -> anyhow::Result<()> {
    // Allow skipping when no DB is configured in the environment.
    let database_url = match std::env::var("TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
    {
        Ok(url) => url,
        Err(_) => {
            eprintln!(
                "Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration flow tests."
            );
            return Ok(());
        }
    };

    let notifier = RecordingNotifier::default();
    let state = setup_state(&database_url, notifier.clone()).await?;

    let user_id = create_user(&state, "user", "buyer@example.com").await?;
    let admin_id = create_user(&state, "admin", "admin@example.com").await?;
    let auth_user = AuthUser {
        user_id,
        role: "user".into(),
    };
    let auth_admin = AuthUser {
        user_id: admin_id,
        role: "admin".into(),
    };

    let oversold = product_service::create_product(
        &state,
        &auth_admin,
        CreateProductRequest {
            name: "Ceramic Pour-Over Set".into(),
            description: None,
            price_cents: 500,
            stock: 10,
            status: ProductStatus::Active,
        },
    )
    .await?
    .data
    .expect("product");

    cart_service::add_to_cart(
        &state,
        &auth_user,
        AddToCartRequest {
            product_id: oversold.id,
            quantity: 5,
        },
    )
    .await?;
    let cart = cart_service::get_or_create_active_cart(&state, &auth_user).await?;

    checkout_service::set_shipping_address(
        &state,
        &auth_user,
        ShippingAddressRequest {
            address: "6000 J St".into(),
            city: "Sacramento".into(),
            state: "CA".into(),
            country: "US".into(),
            postal_code: "95819".into(),
        },
    )
    .await?;
    checkout_service::create_payment_session(&state, &auth_user).await?;

    // Stock drops to 3 while the customer is on the gateway page.
    admin_service::adjust_inventory(
        &state,
        &auth_admin,
        oversold.id,
        InventoryAdjustRequest {
            delta: -7,
            reset_overflow: None,
        },
    )
    .await?;

    let placed = checkout_service::confirm(&state, &auth_user, cart.token)
        .await?
        .data
        .expect("order view");

    // The order survives, flagged; the overflow is recorded for a human.
    assert!(placed.order.has_errors);
    assert_eq!(placed.order.total_price_cents, 2500);
    let product_row = Products::find_by_id(oversold.id)
        .one(&state.orm)
        .await?
        .expect("product row");
    assert_eq!(product_row.stock, 0);
    assert_eq!(product_row.stock_overflow, 2);
    assert_eq!(product_row.status, ProductStatus::Inactive);

    {
        let sent = notifier.sent.lock().expect("notifier lock");
        assert!(
            sent.iter().any(|(to, subject)| to == "admin@example.com"
                && subject == "Order reconciliation error")
        );
        assert!(
            sent.iter()
                .any(|(to, subject)| to == "buyer@example.com"
                    && subject == "A problem with your order")
        );
        assert!(
            sent.iter()
                .any(|(to, subject)| to == "buyer@example.com" && subject == "Order Confirmation")
        );
    }

    // Second scenario: the product goes inactive after handoff. Stock must
    // not move for that line.
    let retired = product_service::create_product(
        &state,
        &auth_admin,
        CreateProductRequest {
            name: "Linen Apron".into(),
            description: None,
            price_cents: 200,
            stock: 10,
            status: ProductStatus::Active,
        },
    )
    .await?
    .data
    .expect("product");

    cart_service::add_to_cart(
        &state,
        &auth_user,
        AddToCartRequest {
            product_id: retired.id,
            quantity: 1,
        },
    )
    .await?;
    let cart2 = cart_service::get_or_create_active_cart(&state, &auth_user).await?;
    checkout_service::set_shipping_address(
        &state,
        &auth_user,
        ShippingAddressRequest {
            address: "6000 J St".into(),
            city: "Sacramento".into(),
            state: "CA".into(),
            country: "US".into(),
            postal_code: "95819".into(),
        },
    )
    .await?;
    checkout_service::create_payment_session(&state, &auth_user).await?;

    product_service::update_product(
        &state,
        &auth_admin,
        retired.id,
        UpdateProductRequest {
            name: None,
            description: None,
            price_cents: None,
            stock: None,
            status: Some(ProductStatus::Inactive),
        },
    )
    .await?;

    let placed2 = checkout_service::confirm(&state, &auth_user, cart2.token)
        .await?
        .data
        .expect("order view");
    assert!(placed2.order.has_errors);
    let retired_row = Products::find_by_id(retired.id)
        .one(&state.orm)
        .await?
        .expect("product row");
    assert_eq!(retired_row.stock, 10);

    // Admin edits: Canceled refuses to coexist with a delivery date.
    let dated = admin_service::update_order(
        &state,
        &auth_admin,
        placed.order.id,
        UpdateOrderRequest {
            status: None,
            estimated_delivery_date: chrono::NaiveDate::from_ymd_opt(2026, 9, 1),
            clear_delivery_date: None,
            notes: Some("fragile".into()),
        },
    )
    .await?
    .data
    .expect("order");
    assert!(dated.estimated_delivery_date.is_some());

    let refused = admin_service::update_order(
        &state,
        &auth_admin,
        placed.order.id,
        UpdateOrderRequest {
            status: Some(storefront_api::entity::orders::OrderStatus::Canceled),
            estimated_delivery_date: None,
            clear_delivery_date: None,
            notes: None,
        },
    )
    .await;
    assert!(matches!(refused, Err(AppError::BadRequest(_))));

    let canceled = admin_service::update_order(
        &state,
        &auth_admin,
        placed.order.id,
        UpdateOrderRequest {
            status: Some(storefront_api::entity::orders::OrderStatus::Canceled),
            estimated_delivery_date: None,
            clear_delivery_date: Some(true),
            notes: None,
        },
    )
    .await?
    .data
    .expect("order");
    assert!(canceled.estimated_delivery_date.is_none());

    // Sales are counted over checked-out carts; both purchases show up.
    let report = report_service::top_selling_products(&state, &auth_admin, 10)
        .await?
        .data
        .expect("report");
    let sold = |name: &str| {
        report
            .items
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| entry.total_sold)
    };
    assert_eq!(sold("Ceramic Pour-Over Set"), Some(5));
    assert_eq!(sold("Linen Apron"), Some(1));

    // Account deletion archives orders; the export keeps them as
    // anonymous rows.
    auth_service::delete_account(&state, &auth_user).await?;
    let export = report_service::export_orders_tsv(&state, &auth_admin).await?;
    assert!(export.starts_with("Order ID\t"));
    assert!(export.contains("account deleted"));
    assert!(export.contains("25.00"));

    Ok(())
}

async fn setup_state(database_url: &str, notifier: RecordingNotifier) -> anyhow::Result<AppState> {
    let pool = create_pool(database_url).await?;
    let orm = create_orm_conn(database_url).await?;
    run_migrations(&orm).await?;

    // Clean tables between runs
    let backend = orm.get_database_backend();
    orm.execute(Statement::from_string(
        backend,
        "TRUNCATE TABLE order_histories, orders, cart_items, carts, shipping_addresses, audit_logs, products, users RESTART IDENTITY CASCADE",
    ))
    .await?;

    Ok(AppState {
        pool,
        orm,
        gateway: Arc::new(OfflineGateway),
        notifier: Arc::new(notifier),
        config: Arc::new(AppConfig {
            database_url: database_url.to_string(),
            host: "127.0.0.1".into(),
            port: 3000,
            public_url: "http://localhost:3000".into(),
            admin_email: "admin@example.com".into(),
            allowed_cities: vec![],
        }),
    })
}

async fn create_user(state: &AppState, role: &str, email: &str) -> anyhow::Result<Uuid> {
    let user = UserActive {
        id: Set(Uuid::new_v4()),
        email: Set(email.to_string()),
        password_hash: Set("dummy".into()),
        role: Set(role.into()),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    Ok(user.id)
}
