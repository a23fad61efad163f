use std::env;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    /// Base URL the payment gateway redirects back to, e.g. "http://localhost:3000".
    pub public_url: String,
    /// Recipient for reconciliation alerts and the sender of order confirmations.
    pub admin_email: String,
    /// Cities we ship to. Empty means no restriction.
    pub allowed_cities: Vec<String>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL")?;
        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(3000);
        let public_url = env::var("PUBLIC_URL")
            .unwrap_or_else(|_| format!("http://{host}:{port}"));
        let admin_email =
            env::var("ADMIN_EMAIL").unwrap_or_else(|_| "admin@localhost".to_string());
        let allowed_cities = env::var("ALLOWED_CITIES")
            .map(|raw| {
                raw.split(',')
                    .map(|c| c.trim().to_lowercase())
                    .filter(|c| !c.is_empty())
                    .collect()
            })
            .unwrap_or_default();
        Ok(Self {
            database_url,
            host,
            port,
            public_url,
            admin_email,
            allowed_cities,
        })
    }

    pub fn city_allowed(&self, city: &str) -> bool {
        self.allowed_cities.is_empty()
            || self.allowed_cities.iter().any(|c| c == &city.to_lowercase())
    }
}
