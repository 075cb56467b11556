use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::GatewayConfig;
use crate::domain::{
    CURRENCY, Cents, CreditKind, LedgerEntry, SessionStatus, TopupSession, format_cents,
};
use crate::storage::Repository;

use super::service::{apply_in_tx, committed};
use super::{AppError, MutationResult, VendService};

/// What the payment provider needs to open a checkout.
#[derive(Debug, Clone)]
pub struct PaymentRequest<'a> {
    pub reference: &'a str,
    pub amount_cents: Cents,
    pub currency: &'a str,
    pub account_name: &'a str,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("no checkout URL configured")]
    NotConfigured,

    #[error("gateway rejected the request: {0}")]
    Rejected(String),
}

/// Payment provider that opens a checkout session for a top-up.
/// Confirmation arrives separately, through [`VendService::confirm_topup`].
pub trait PaymentGateway: Send + Sync {
    /// Return the URL the buyer is sent to for paying.
    fn initialize(&self, request: &PaymentRequest<'_>) -> Result<String, GatewayError>;

    /// Currency the gateway charges in.
    fn currency(&self) -> &str {
        CURRENCY
    }
}

/// Hosted checkout page addressed by session reference.
pub struct HostedCheckout {
    config: GatewayConfig,
}

impl HostedCheckout {
    pub fn new(config: GatewayConfig) -> Self {
        Self { config }
    }
}

impl PaymentGateway for HostedCheckout {
    fn initialize(&self, request: &PaymentRequest<'_>) -> Result<String, GatewayError> {
        let base = self
            .config
            .checkout_base_url
            .as_deref()
            .ok_or(GatewayError::NotConfigured)?;

        if !(base.starts_with("https://") || base.starts_with("http://")) {
            return Err(GatewayError::Rejected(format!(
                "checkout URL must be http(s): {}",
                base
            )));
        }

        Ok(format!(
            "{}/{}?amount={}&currency={}",
            base,
            request.reference,
            format_cents(request.amount_cents),
            request.currency
        ))
    }

    fn currency(&self) -> &str {
        &self.config.currency
    }
}

/// A top-up waiting for the buyer to pay.
#[derive(Debug, Clone)]
pub struct TopupStarted {
    pub session: TopupSession,
    pub payment_url: String,
}

/// JSON body returned to the client that asked for a top-up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopupResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl TopupResponse {
    pub fn from_result(result: &Result<TopupStarted, AppError>) -> Self {
        match result {
            Ok(started) => Self {
                success: true,
                payment_url: Some(started.payment_url.clone()),
                reference: Some(started.session.reference.clone()),
                message: None,
            },
            Err(e) => Self {
                success: false,
                payment_url: None,
                reference: None,
                message: Some(e.to_string()),
            },
        }
    }
}

impl VendService {
    /// Open a top-up session and get a payment URL for it.
    ///
    /// The wallet is not touched here. A gateway failure leaves the session
    /// marked failed.
    pub async fn start_topup<G: PaymentGateway + ?Sized>(
        &self,
        account_name: &str,
        amount_cents: Cents,
        gateway: &G,
    ) -> Result<TopupStarted, AppError> {
        if amount_cents <= 0 {
            return Err(AppError::InvalidAmount(
                "Amount must be positive".to_string(),
            ));
        }

        let account = self.get_account(account_name).await?;
        let mut session = TopupSession::new(account.id, amount_cents);
        self.repo.save_topup_session(&session).await?;

        let request = PaymentRequest {
            reference: &session.reference,
            amount_cents,
            currency: gateway.currency(),
            account_name: &account.name,
        };

        match gateway.initialize(&request) {
            Ok(url) => {
                self.repo
                    .set_topup_payment_url(&session.reference, &url)
                    .await?;
                info!(account = %account.name, reference = %session.reference, amount = amount_cents, "top-up started");
                session.payment_url = Some(url.clone());
                Ok(TopupStarted {
                    session,
                    payment_url: url,
                })
            }
            Err(e) => {
                let mut tx = self.repo.begin().await?;
                Repository::settle_topup(&mut tx, &session.reference, SessionStatus::Failed)
                    .await?;
                tx.commit().await.map_err(anyhow::Error::from)?;
                warn!(account = %account.name, reference = %session.reference, error = %e, "payment initialization failed");
                Err(AppError::PaymentInitFailed(e.to_string()))
            }
        }
    }

    /// Credit a paid top-up. Each reference is credited at most once.
    pub async fn confirm_topup(&self, reference: &str) -> Result<MutationResult, AppError> {
        let session = self.get_topup(reference).await?;
        if !session.is_pending() {
            return Err(AppError::TopupAlreadySettled(reference.to_string()));
        }
        let account = self.get_account_by_id(session.account_id).await?;

        let mut entry = LedgerEntry::completed(
            account.id,
            account.id,
            session.amount_cents,
            CreditKind::Topup.into(),
        )
        .with_description("Wallet top-up")
        .with_external_ref(reference);

        let mut tx = self.repo.begin().await?;
        if !Repository::settle_topup(&mut tx, reference, SessionStatus::Completed).await? {
            return Err(AppError::TopupAlreadySettled(reference.to_string()));
        }
        let balance_after = apply_in_tx(&mut tx, &account, &mut entry).await?;
        tx.commit().await.map_err(anyhow::Error::from)?;

        Ok(committed(entry, &account, balance_after))
    }

    /// Mark a top-up as not paid. The wallet is untouched.
    pub async fn fail_topup(&self, reference: &str) -> Result<TopupSession, AppError> {
        let mut session = self.get_topup(reference).await?;

        let mut tx = self.repo.begin().await?;
        if !Repository::settle_topup(&mut tx, reference, SessionStatus::Failed).await? {
            return Err(AppError::TopupAlreadySettled(reference.to_string()));
        }
        tx.commit().await.map_err(anyhow::Error::from)?;

        info!(reference, "top-up marked failed");
        session.status = SessionStatus::Failed;
        Ok(session)
    }

    pub async fn get_topup(&self, reference: &str) -> Result<TopupSession, AppError> {
        self.repo
            .get_topup_session(reference)
            .await?
            .ok_or_else(|| AppError::TopupNotFound(reference.to_string()))
    }
}
