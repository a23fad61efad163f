use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

/// The hosted payment provider, reduced to the four calls the engine needs.
/// Constructed once in `main` and carried in `AppState`, never as a
/// module-level client.
///
/// Wire-protocol details are out of scope; the engine only relies on the
/// opaque refs and the redirect contract: the provider sends the customer to
/// `success_url` (which embeds the cart token) or `cancel_url`.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Provision a product and its price on the provider side. Called when a
    /// product is created; failure rolls the local row back.
    async fn register_product(
        &self,
        name: &str,
        price_cents: i64,
    ) -> Result<ProductRefs, PaymentError>;

    /// Price changes create a new price ref (providers do not allow editing
    /// an existing one). Returns the ref to store.
    async fn update_price(
        &self,
        product_ref: &str,
        price_cents: i64,
    ) -> Result<String, PaymentError>;

    /// Providers do not allow deleting products with price history, so
    /// "delete" means deactivate on their side.
    async fn deactivate_product(&self, product_ref: &str) -> Result<(), PaymentError>;

    async fn create_checkout_session(
        &self,
        line_items: &[SessionLineItem],
        success_url: &str,
        cancel_url: &str,
    ) -> Result<String, PaymentError>;
}

#[derive(Debug, Clone)]
pub struct ProductRefs {
    pub product_ref: String,
    pub price_ref: String,
}

#[derive(Debug, Clone)]
pub struct SessionLineItem {
    pub price_ref: String,
    pub quantity: i32,
}

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("payment gateway unavailable: {0}")]
    Unavailable(String),

    #[error("payment gateway rejected the request: {0}")]
    Rejected(String),
}

/// Gateway used when no provider is configured (local development, tests).
/// Mints deterministic-looking refs and short-circuits the hosted session by
/// returning the success URL directly.
#[derive(Debug, Default, Clone)]
pub struct OfflineGateway;

#[async_trait]
impl PaymentGateway for OfflineGateway {
    async fn register_product(
        &self,
        name: &str,
        price_cents: i64,
    ) -> Result<ProductRefs, PaymentError> {
        tracing::debug!(name, price_cents, "offline gateway: register product");
        Ok(ProductRefs {
            product_ref: format!("prod_{}", Uuid::new_v4().simple()),
            price_ref: format!("price_{}", Uuid::new_v4().simple()),
        })
    }

    async fn update_price(
        &self,
        product_ref: &str,
        price_cents: i64,
    ) -> Result<String, PaymentError> {
        tracing::debug!(product_ref, price_cents, "offline gateway: update price");
        Ok(format!("price_{}", Uuid::new_v4().simple()))
    }

    async fn deactivate_product(&self, product_ref: &str) -> Result<(), PaymentError> {
        tracing::debug!(product_ref, "offline gateway: deactivate product");
        Ok(())
    }

    async fn create_checkout_session(
        &self,
        line_items: &[SessionLineItem],
        success_url: &str,
        _cancel_url: &str,
    ) -> Result<String, PaymentError> {
        tracing::debug!(lines = line_items.len(), "offline gateway: checkout session");
        Ok(success_url.to_string())
    }
}
