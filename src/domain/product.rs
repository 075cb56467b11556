use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Cents, Role};

pub type ProductId = Uuid;

/// Price list a product belongs to. Each role buys from exactly one list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductType {
    CustomerProduct,
    AgentProduct,
    DealerProduct,
    EliteProduct,
}

impl ProductType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductType::CustomerProduct => "customer_product",
            ProductType::AgentProduct => "agent_product",
            ProductType::DealerProduct => "dealer_product",
            ProductType::EliteProduct => "elite_product",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "customer_product" => Some(ProductType::CustomerProduct),
            "agent_product" => Some(ProductType::AgentProduct),
            "dealer_product" => Some(ProductType::DealerProduct),
            "elite_product" => Some(ProductType::EliteProduct),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProductType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// A data bundle or airtime denomination on sale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    /// Network tag, e.g. "MTN", "Telecel", "AT (Big Time)"
    pub network: String,
    pub price_cents: Cents,
    pub product_type: ProductType,
    /// Validity label shown to buyers, e.g. "30 days"
    pub expiry: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Product {
    pub fn new(
        name: String,
        network: String,
        price_cents: Cents,
        product_type: ProductType,
    ) -> Self {
        assert!(price_cents > 0, "Product price must be positive");
        Self {
            id: Uuid::new_v4(),
            name,
            network,
            price_cents,
            product_type,
            expiry: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_expiry(mut self, expiry: impl Into<String>) -> Self {
        self.expiry = Some(expiry.into());
        self
    }

    pub fn visible_to(&self, role: Role) -> bool {
        role.can_buy(self.product_type)
    }
}

/// Keep only the products a role may see.
pub fn filter_for_role(products: Vec<Product>, role: Role) -> Vec<Product> {
    products.into_iter().filter(|p| p.visible_to(role)).collect()
}
