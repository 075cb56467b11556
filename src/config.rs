use crate::domain::CURRENCY;

/// Environment variable holding the database path.
pub const DATABASE_ENV: &str = "AIRVEND_DATABASE";

/// Environment variable holding the hosted checkout base URL.
pub const CHECKOUT_URL_ENV: &str = "AIRVEND_CHECKOUT_URL";

/// Settings for the hosted checkout used to pay for wallet top-ups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    /// Base URL of the hosted payment page, e.g. `https://pay.example.com/checkout`
    pub checkout_base_url: Option<String>,
    pub currency: String,
}

impl GatewayConfig {
    pub fn new(checkout_base_url: Option<String>) -> Self {
        Self {
            checkout_base_url: checkout_base_url
                .map(|url| url.trim().trim_end_matches('/').to_string())
                .filter(|url| !url.is_empty()),
            currency: CURRENCY.to_string(),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self::new(None)
    }
}
