use thiserror::Error;

use crate::domain::{Cents, EntryKind, OrderStatus, format_cents};

fn money(cents: &Cents) -> String {
    format_cents(*cents)
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Account already exists: {0}")]
    AccountAlreadyExists(String),

    #[error(
        "Insufficient funds in {account_name}'s wallet: balance {}, required {}",
        money(.balance),
        money(.required)
    )]
    InsufficientFunds {
        account_name: String,
        balance: Cents,
        required: Cents,
    },

    #[error("Crediting {account_name} would push the balance past the largest amount a wallet can hold")]
    BalanceOverflow { account_name: String },

    #[error("Invalid ID format (expected UUID): {0}")]
    InvalidId(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("{actor} is not allowed to record {kind} entries for {account}")]
    NotAuthorized {
        actor: String,
        account: String,
        kind: EntryKind,
    },

    #[error("Only admins may {0}")]
    AdminOnly(&'static str),

    #[error("Product not found: {0}")]
    ProductNotFound(String),

    #[error("Product {product} is not available to {role} accounts")]
    ProductNotAvailable { product: String, role: String },

    #[error("Invalid quantity: {0}")]
    InvalidQuantity(i64),

    #[error("Cart is empty")]
    CartEmpty,

    #[error("Cart item not found: {0}")]
    CartItemNotFound(String),

    #[error("Cart total for {0} is too large")]
    CartTotalTooLarge(String),

    #[error("Cart changed while the order was being placed; please try again")]
    CartChanged,

    #[error("Order not found: {0}")]
    OrderNotFound(String),

    #[error("Order cannot move from {from} to {to}")]
    InvalidStatusTransition { from: OrderStatus, to: OrderStatus },

    #[error("Top-up session not found: {0}")]
    TopupNotFound(String),

    #[error("Top-up session {0} has already been settled")]
    TopupAlreadySettled(String),

    #[error("Payment initialization failed: {0}")]
    PaymentInitFailed(String),

    #[error("Database error: {0}")]
    Database(#[from] anyhow::Error),
}
