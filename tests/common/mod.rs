// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use airvend::application::{GatewayError, PaymentGateway, PaymentRequest, VendService};
use airvend::domain::{CreditKind, Product, ProductType, Role};
use anyhow::Result;
use tempfile::TempDir;

/// Helper to create a test service with a temporary database
pub async fn test_service() -> Result<(VendService, TempDir)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test.db");
    let service = VendService::init(db_path.to_str().unwrap()).await?;
    Ok((service, temp_dir))
}

/// Test fixture: Standard account setup
pub struct StandardAccounts;

impl StandardAccounts {
    pub const ADMIN: &'static str = "admin";
    pub const CUSTOMER: &'static str = "ama";
    pub const AGENT: &'static str = "kofi";
    pub const DEALER: &'static str = "esi";

    /// Create one account per role used across the tests
    pub async fn create(service: &VendService) -> Result<()> {
        service
            .create_account(Self::ADMIN.into(), Role::Admin)
            .await?;
        service
            .create_account(Self::CUSTOMER.into(), Role::Customer)
            .await?;
        service
            .create_account(Self::AGENT.into(), Role::Agent)
            .await?;
        service
            .create_account(Self::DEALER.into(), Role::Dealer)
            .await?;
        Ok(())
    }

    /// Give an account a starting balance through an admin credit
    pub async fn fund(service: &VendService, account: &str, amount: i64) -> Result<()> {
        service
            .credit(account, Self::ADMIN, amount, CreditKind::Admin)
            .await?;
        Ok(())
    }
}

/// Test fixture: one product per price list on the same network
pub struct StandardCatalog {
    pub customer_5gb: Product,
    pub agent_5gb: Product,
    pub dealer_5gb: Product,
}

impl StandardCatalog {
    pub async fn create(service: &VendService) -> Result<Self> {
        let customer_5gb = service
            .create_product(
                "5GB".into(),
                "MTN".into(),
                2500,
                ProductType::CustomerProduct,
                Some("30 days".into()),
            )
            .await?;
        let agent_5gb = service
            .create_product(
                "5GB".into(),
                "MTN".into(),
                2200,
                ProductType::AgentProduct,
                None,
            )
            .await?;
        let dealer_5gb = service
            .create_product(
                "5GB".into(),
                "MTN".into(),
                2000,
                ProductType::DealerProduct,
                None,
            )
            .await?;
        Ok(Self {
            customer_5gb,
            agent_5gb,
            dealer_5gb,
        })
    }
}

/// Gateway that always hands out the same checkout page
pub struct StaticGateway;

impl PaymentGateway for StaticGateway {
    fn initialize(&self, request: &PaymentRequest<'_>) -> Result<String, GatewayError> {
        Ok(format!("https://pay.test/{}", request.reference))
    }
}

/// Gateway that rejects every request
pub struct RejectingGateway;

impl PaymentGateway for RejectingGateway {
    fn initialize(&self, _request: &PaymentRequest<'_>) -> Result<String, GatewayError> {
        Err(GatewayError::Rejected("merchant account suspended".into()))
    }
}
