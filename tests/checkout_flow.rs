use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sea_orm::ActiveValue::NotSet;
use sea_orm::{ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait,
    QueryFilter, Set, Statement};
use storefront_api::{
    config::AppConfig,
    db::{create_orm_conn, create_pool, run_migrations},
    dto::cart::AddToCartRequest,
    dto::checkout::ShippingAddressRequest,
    dto::products::{CreateProductRequest, UpdateProductRequest},
    entity::carts::CartStatus,
    entity::products::ProductStatus,
    entity::users::ActiveModel as UserActive,
    entity::{Carts, Orders, Products, orders},
    error::AppError,
    middleware::auth::AuthUser,
    notify::Notifier,
    payment::OfflineGateway,
    services::{cart_service, checkout_service, order_service, product_service},
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

// Integration flow: add-to-cart merging, the three checkout phases, the
// duplicate-confirmation guard, the single-active-cart invariant and the
// price snapshot.
#[tokio::test]
async fn checkout_confirmation_flow() -> anyhow::Result<()> {
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

    let product = product_service::create_product(
        &state,
        &auth_admin,
        CreateProductRequest {
            name: "Walnut Cutting Board".into(),
            description: Some("End-grain, hand finished".into()),
            price_cents: 500,
            stock: 10,
            status: ProductStatus::Active,
        },
    )
    .await?
    .data
    .expect("product");

    // Adding the same product twice yields one line with the summed quantity.
    cart_service::add_to_cart(
        &state,
        &auth_user,
        AddToCartRequest {
            product_id: product.id,
            quantity: 2,
        },
    )
    .await?;
    cart_service::add_to_cart(
        &state,
        &auth_user,
        AddToCartRequest {
            product_id: product.id,
            quantity: 3,
        },
    )
    .await?;

    let cart_view = cart_service::view_cart(&state, &auth_user)
        .await?
        .data
        .expect("cart view");
    assert_eq!(cart_view.items.len(), 1);
    assert_eq!(cart_view.items[0].quantity, 5);
    assert_eq!(cart_view.total_price_cents, 2500);
    assert!(!cart_view.conflicts.any());

    // Repeated get-or-create hands back the same cart.
    let cart = cart_service::get_or_create_active_cart(&state, &auth_user).await?;
    assert_eq!(cart.id, cart_view.id);

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

    let session = checkout_service::create_payment_session(&state, &auth_user)
        .await?
        .data
        .expect("session");
    assert!(session.session_url.contains(&cart.token.to_string()));

    let placed = checkout_service::confirm(&state, &auth_user, cart.token)
        .await?
        .data
        .expect("order view");
    assert_eq!(placed.order.total_price_cents, 2500);
    assert!(!placed.order.has_errors);
    assert_eq!(placed.lines.len(), 1);
    assert_eq!(placed.lines[0].original_price_cents, 500);

    // Stock decremented exactly once.
    let stocked = Products::find_by_id(product.id)
        .one(&state.orm)
        .await?
        .expect("product row");
    assert_eq!(stocked.stock, 5);
    assert_eq!(stocked.status, ProductStatus::Active);

    // The old cart is retired and a fresh active cart exists.
    let old_cart = Carts::find_by_id(cart.id)
        .one(&state.orm)
        .await?
        .expect("old cart");
    assert_eq!(old_cart.status, CartStatus::Inactive);
    let fresh = cart_service::get_or_create_active_cart(&state, &auth_user).await?;
    assert_ne!(fresh.id, cart.id);
    assert_eq!(fresh.status, CartStatus::Active);

    // A replayed confirmation callback is refused and changes nothing.
    let replay = checkout_service::confirm(&state, &auth_user, cart.token).await;
    assert!(matches!(replay, Err(AppError::Forbidden)));
    let order_count = Orders::find()
        .filter(orders::Column::CartId.eq(cart.id))
        .count(&state.orm)
        .await?;
    assert_eq!(order_count, 1);
    let stocked = Products::find_by_id(product.id)
        .one(&state.orm)
        .await?
        .expect("product row");
    assert_eq!(stocked.stock, 5);

    // Another owner cannot confirm with a stolen token.
    let other = AuthUser {
        user_id: admin_id,
        role: "user".into(),
    };
    let foreign = checkout_service::confirm(&state, &other, fresh.token).await;
    assert!(matches!(foreign, Err(AppError::Forbidden)));

    // The snapshot survives later price edits.
    product_service::update_product(
        &state,
        &auth_admin,
        product.id,
        UpdateProductRequest {
            name: None,
            description: None,
            price_cents: Some(700),
            stock: None,
            status: None,
        },
    )
    .await?;
    let order_view = order_service::get_order_by_token(&state, &auth_user, placed.order.token)
        .await?
        .data
        .expect("order view");
    assert_eq!(order_view.lines[0].original_price_cents, 500);
    assert_eq!(order_view.order.total_price_cents, 2500);

    // The purchaser got an order confirmation.
    let sent = notifier.sent.lock().expect("notifier lock");
    assert!(
        sent.iter()
            .any(|(to, subject)| to == "buyer@example.com" && subject == "Order Confirmation")
    );

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
