use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Cents, ProductType};

pub type AccountId = Uuid;

/// Role tags an account can hold on the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Retail buyer
    Customer,
    /// Reseller buying at agent prices
    Agent,
    /// Top-tier reseller with its own price list
    Elite,
    /// Wholesale buyer
    Dealer,
    /// Platform operator; may credit and debit other wallets
    Admin,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::Customer,
        Role::Agent,
        Role::Elite,
        Role::Dealer,
        Role::Admin,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Customer => "customer",
            Role::Agent => "agent",
            Role::Elite => "elite",
            Role::Dealer => "dealer",
            Role::Admin => "admin",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "customer" => Some(Role::Customer),
            "agent" => Some(Role::Agent),
            "elite" => Some(Role::Elite),
            "dealer" => Some(Role::Dealer),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }

    /// The one product type this role is allowed to see and buy.
    /// Admins shop from the dealer list.
    pub fn product_type(&self) -> ProductType {
        match self {
            Role::Customer => ProductType::CustomerProduct,
            Role::Agent => ProductType::AgentProduct,
            Role::Elite => ProductType::EliteProduct,
            Role::Dealer | Role::Admin => ProductType::DealerProduct,
        }
    }

    pub fn can_buy(&self, product_type: ProductType) -> bool {
        self.product_type() == product_type
    }

    pub fn is_operator(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub name: String,
    pub role: Role,
    /// Current wallet balance; never negative.
    pub balance_cents: Cents,
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// A new account always opens with an empty wallet. Funds arrive only
    /// through ledger credits.
    pub fn new(name: String, role: Role) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            role,
            balance_cents: 0,
            created_at: Utc::now(),
        }
    }
}
