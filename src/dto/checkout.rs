use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};

#[derive(Debug, Deserialize, ToSchema)]
pub struct ShippingAddressRequest {
    pub address: String,
    pub city: String,
    pub state: String,
    pub country: String,
    pub postal_code: String,
}

impl ShippingAddressRequest {
    pub fn validate(&self, config: &AppConfig) -> AppResult<()> {
        for (field, value) in [
            ("address", &self.address),
            ("city", &self.city),
            ("state", &self.state),
            ("country", &self.country),
        ] {
            if value.trim().is_empty() {
                return Err(AppError::BadRequest(format!("{field} must not be empty")));
            }
        }
        if self.postal_code.len() != 5 || !self.postal_code.chars().all(|c| c.is_ascii_digit()) {
            return Err(AppError::BadRequest(
                "postal code must be exactly 5 digits".to_string(),
            ));
        }
        if !config.city_allowed(&self.city) {
            return Err(AppError::BadRequest(format!(
                "we do not deliver to {}",
                self.city
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ShippingAddressView {
    pub id: Uuid,
    pub address: String,
    pub city: String,
    pub state: String,
    pub country: String,
    pub postal_code: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CheckoutSessionResponse {
    /// Where to send the customer to pay.
    pub session_url: String,
}
