use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{Account, CartLine, Cents, Order, Product};

use super::{AppError, VendService};

/// Number of orders shown on the dashboard.
pub const RECENT_ORDERS: usize = 10;

/// Everything the account dashboard shows.
#[derive(Debug, Clone)]
pub struct DashboardSummary {
    pub account: Account,
    pub wallet_balance: Cents,
    pub cart_count: i64,
    pub cart_items: Vec<CartLine>,
    pub recent_orders: Vec<Order>,
    pub stats: SalesStats,
    pub products: Vec<Product>,
}

/// Sales figures over completed orders, plus the open order counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SalesStats {
    pub total_sales: Cents,
    pub today_sales: Cents,
    pub pending_orders: i64,
    pub processing_orders: i64,
}

/// Midnight UTC of the day containing `now`.
pub fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc())
        .unwrap_or(now)
}

impl VendService {
    /// Build the dashboard for an account as of `now`.
    pub async fn dashboard(
        &self,
        account_name: &str,
        now: DateTime<Utc>,
    ) -> Result<DashboardSummary, AppError> {
        let account = self.get_account(account_name).await?;

        let cart_count = self.repo.count_cart_items(account.id).await?;
        let cart_items = self.repo.list_cart_lines(account.id).await?;
        let mut recent_orders = self.repo.list_orders(Some(account.id)).await?;
        recent_orders.truncate(RECENT_ORDERS);

        let raw = self.repo.order_stats(account.id, start_of_day(now)).await?;
        let products = self.products_for_role(account.role).await?;

        Ok(DashboardSummary {
            wallet_balance: account.balance_cents,
            cart_count,
            cart_items,
            recent_orders,
            stats: SalesStats {
                total_sales: raw.total_sales,
                today_sales: raw.today_sales,
                pending_orders: raw.pending_count,
                processing_orders: raw.processing_count,
            },
            products,
            account,
        })
    }
}
