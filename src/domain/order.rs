use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AccountId, Cents, ProductId};

pub type OrderId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Completed => "completed",
            OrderStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(OrderStatus::Pending),
            "processing" => Some(OrderStatus::Processing),
            "completed" => Some(OrderStatus::Completed),
            "failed" => Some(OrderStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Failed)
    }

    /// pending -> processing | failed, processing -> completed | failed
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        matches!(
            (self, next),
            (OrderStatus::Pending, OrderStatus::Processing)
                | (OrderStatus::Pending, OrderStatus::Failed)
                | (OrderStatus::Processing, OrderStatus::Completed)
                | (OrderStatus::Processing, OrderStatus::Failed)
        )
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// Outcome reported by the upstream fulfilment API for an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiStatus {
    Success,
    Failed,
    /// The fulfilment API was switched off when the order was processed
    Disabled,
}

impl ApiStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiStatus::Success => "success",
            ApiStatus::Failed => "failed",
            ApiStatus::Disabled => "disabled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "success" => Some(ApiStatus::Success),
            "failed" => Some(ApiStatus::Failed),
            "disabled" => Some(ApiStatus::Disabled),
            _ => None,
        }
    }
}

impl std::fmt::Display for ApiStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// A purchased line. Name, network and price are captured when the order is
/// placed so later catalog edits don't rewrite history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: ProductId,
    pub product_name: String,
    pub network: String,
    pub quantity: i64,
    pub unit_price_cents: Cents,
    pub beneficiary_number: Option<String>,
}

impl OrderItem {
    pub fn line_total(&self) -> Option<Cents> {
        self.unit_price_cents.checked_mul(self.quantity)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub account_id: AccountId,
    pub status: OrderStatus,
    pub api_status: Option<ApiStatus>,
    pub total_cents: Cents,
    pub items: Vec<OrderItem>,
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// A pending order over `items`. None if the total doesn't fit in `Cents`.
    pub fn new(account_id: AccountId, items: Vec<OrderItem>) -> Option<Self> {
        let total_cents = items
            .iter()
            .try_fold(0 as Cents, |total, item| total.checked_add(item.line_total()?))?;
        Some(Self {
            id: Uuid::new_v4(),
            account_id,
            status: OrderStatus::Pending,
            api_status: None,
            total_cents,
            items,
            created_at: Utc::now(),
        })
    }

    /// Network of the first line, which is what order listings show.
    pub fn network(&self) -> Option<&str> {
        self.items.first().map(|i| i.network.as_str())
    }

    pub fn beneficiary(&self) -> Option<&str> {
        self.items
            .first()
            .and_then(|i| i.beneficiary_number.as_deref())
    }
}

/// Filter for order history listings.
#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    /// Network name, ignoring case
    pub network: Option<String>,
    pub status: Option<OrderStatus>,
    /// Case-insensitive substring of the beneficiary number
    pub beneficiary: Option<String>,
    /// Case-insensitive substring of the order ID
    pub order_id: Option<String>,
}

impl OrderFilter {
    pub fn matches(&self, order: &Order) -> bool {
        let network_ok = self
            .network
            .as_deref()
            .is_none_or(|n| order.network().is_some_and(|net| net.eq_ignore_ascii_case(n)));
        let status_ok = self.status.is_none_or(|s| order.status == s);
        let beneficiary_ok = self.beneficiary.as_deref().is_none_or(|needle| {
            order
                .beneficiary()
                .unwrap_or("")
                .to_lowercase()
                .contains(&needle.to_lowercase())
        });
        let order_id_ok = self.order_id.as_deref().is_none_or(|needle| {
            order
                .id
                .to_string()
                .contains(&needle.trim().to_lowercase())
        });
        network_ok && status_ok && beneficiary_ok && order_id_ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(network: &str, price: Cents, qty: i64, beneficiary: Option<&str>) -> OrderItem {
        OrderItem {
            product_id: Uuid::new_v4(),
            product_name: "2GB".into(),
            network: network.into(),
            quantity: qty,
            unit_price_cents: price,
            beneficiary_number: beneficiary.map(String::from),
        }
    }

    #[test]
    fn test_order_total_uses_captured_prices() {
        let order = Order::new(
            Uuid::new_v4(),
            vec![item("MTN", 1050, 2, None), item("Telecel", 300, 1, None)],
        )
        .unwrap();
        assert_eq!(order.total_cents, 2400);
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.api_status, None);
    }

    #[test]
    fn test_status_transitions() {
        use OrderStatus::*;
        assert!(Pending.can_transition_to(Processing));
        assert!(Pending.can_transition_to(Failed));
        assert!(Processing.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Failed));

        assert!(!Pending.can_transition_to(Completed));
        assert!(!Pending.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Processing));
        assert!(Completed.is_terminal() && Failed.is_terminal());
    }

    #[test]
    fn test_filter_matches() {
        let order = Order::new(
            Uuid::new_v4(),
            vec![item("MTN", 500, 1, Some("0244123456"))],
        )
        .unwrap();

        assert!(OrderFilter::default().matches(&order));
        assert!(OrderFilter {
            network: Some("MTN".into()),
            status: Some(OrderStatus::Pending),
            beneficiary: Some("4123".into()),
            order_id: Some(order.id.to_string()[..8].to_uppercase()),
        }
        .matches(&order));
        assert!(!OrderFilter {
            network: Some("Telecel".into()),
            ..Default::default()
        }
        .matches(&order));
        assert!(!OrderFilter {
            status: Some(OrderStatus::Completed),
            ..Default::default()
        }
        .matches(&order));
        assert!(!OrderFilter {
            beneficiary: Some("0555".into()),
            ..Default::default()
        }
        .matches(&order));
    }

    #[test]
    fn test_filter_by_order_id_fragment() {
        let order = Order::new(Uuid::new_v4(), vec![item("MTN", 500, 1, None)]).unwrap();
        let id = order.id.to_string();

        assert!(OrderFilter {
            order_id: Some(id[9..13].to_string()),
            ..Default::default()
        }
        .matches(&order));
        assert!(!OrderFilter {
            order_id: Some("not-an-id".into()),
            ..Default::default()
        }
        .matches(&order));
    }

    #[test]
    fn test_order_total_overflow_is_refused() {
        let items = vec![item("MTN", 4, (1 << 62) + 1, None)];
        assert!(Order::new(Uuid::new_v4(), items).is_none());

        let items = vec![
            item("MTN", 1, i64::MAX, None),
            item("MTN", 1, 1, None),
        ];
        assert!(Order::new(Uuid::new_v4(), items).is_none());
    }

    #[test]
    fn test_filter_beneficiary_without_number() {
        let order = Order::new(Uuid::new_v4(), vec![item("MTN", 500, 1, None)]).unwrap();
        assert!(!OrderFilter {
            beneficiary: Some("024".into()),
            ..Default::default()
        }
        .matches(&order));
    }
}
