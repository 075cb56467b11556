use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AccountId, Cents, OrderItem, Product, ProductId};

pub type CartItemId = Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartItem {
    pub id: CartItemId,
    pub account_id: AccountId,
    pub product_id: ProductId,
    pub quantity: i64,
    /// Phone number the bundle is sent to; the buyer's own line when absent
    pub beneficiary_number: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl CartItem {
    pub fn new(account_id: AccountId, product_id: ProductId, quantity: i64) -> Self {
        assert!(quantity > 0, "Cart quantity must be positive");
        Self {
            id: Uuid::new_v4(),
            account_id,
            product_id,
            quantity,
            beneficiary_number: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_beneficiary(mut self, number: impl Into<String>) -> Self {
        self.beneficiary_number = Some(number.into());
        self
    }
}

/// A cart item joined with the product it points at.
#[derive(Debug, Clone)]
pub struct CartLine {
    pub item: CartItem,
    pub product: Product,
}

impl CartLine {
    /// Price times quantity, or None if it doesn't fit in `Cents`.
    pub fn line_total(&self) -> Option<Cents> {
        self.product.price_cents.checked_mul(self.item.quantity)
    }

    /// Freeze this line into an order item at the current price.
    pub fn to_order_item(&self) -> OrderItem {
        OrderItem {
            product_id: self.product.id,
            product_name: self.product.name.clone(),
            network: self.product.network.clone(),
            quantity: self.item.quantity,
            unit_price_cents: self.product.price_cents,
            beneficiary_number: self.item.beneficiary_number.clone(),
        }
    }
}

/// Sum of the line totals, or None on overflow.
pub fn cart_total(lines: &[CartLine]) -> Option<Cents> {
    lines
        .iter()
        .try_fold(0 as Cents, |total, line| total.checked_add(line.line_total()?))
}
