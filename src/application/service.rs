use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteConnection;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{
    Account, AccountId, ApiStatus, CartItem, CartItemId, CartLine, Cents, CreditKind, DebitKind,
    EntryKind, IntegrityReport, LedgerEntry, Order, OrderFilter, OrderId, OrderStatus, Product,
    ProductId, ProductType, Role, build_integrity_report, cart_total, filter_for_role,
};
use crate::storage::Repository;

use super::AppError;

/// Application service providing the platform's operations.
/// This is the primary interface for any client (CLI, web handlers, etc.).
pub struct VendService {
    pub(crate) repo: Repository,
}

/// Result of a committed wallet mutation
#[derive(Debug, Clone)]
pub struct MutationResult {
    pub entry: LedgerEntry,
    pub account_name: String,
    pub balance_before: Cents,
    pub balance_after: Cents,
}

/// Detailed account information
#[derive(Debug, Clone)]
pub struct AccountInfo {
    pub account: Account,
    pub entry_count: usize,
    pub last_activity: Option<DateTime<Utc>>,
}

/// Filter for querying ledger entries
#[derive(Debug, Clone, Default)]
pub struct EntryFilter {
    pub kind: Option<EntryKind>,
    pub limit: Option<usize>,
}

/// An account's cart with its total
#[derive(Debug, Clone)]
pub struct CartView {
    pub lines: Vec<CartLine>,
    pub total: Cents,
}

/// Result of placing an order
#[derive(Debug, Clone)]
pub struct OrderResult {
    pub order: Order,
    pub entry: LedgerEntry,
    pub balance_after: Cents,
}

impl VendService {
    /// Create a new service with the given repository.
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    /// Initialize a database at the given path, or bring an existing one up
    /// to the latest schema.
    pub async fn init(database_path: &str) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}?mode=rwc", database_path);
        let repo = Repository::init(&db_url).await?;
        Ok(Self::new(repo))
    }

    /// Connect to an existing database.
    pub async fn connect(database_path: &str) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}", database_path);
        let repo = Repository::connect(&db_url).await?;
        Ok(Self::new(repo))
    }

    /// Roll back the most recent schema migration.
    pub async fn rollback_migration(&self) -> Result<Option<i64>, AppError> {
        Ok(self.repo.rollback_last().await?)
    }

    /// Versions of the migrations applied so far, in order.
    pub async fn applied_migrations(&self) -> Result<Vec<i64>, AppError> {
        Ok(self.repo.applied_migrations().await?)
    }

    // ========================
    // Account operations
    // ========================

    /// Open a new account with an empty wallet.
    pub async fn create_account(&self, name: String, role: Role) -> Result<Account, AppError> {
        if self.repo.get_account_by_name(&name).await?.is_some() {
            return Err(AppError::AccountAlreadyExists(name));
        }

        let account = Account::new(name, role);
        self.repo.save_account(&account).await?;
        info!(account = %account.name, role = %account.role, "account created");
        Ok(account)
    }

    /// Get an account by name.
    pub async fn get_account(&self, name: &str) -> Result<Account, AppError> {
        self.repo
            .get_account_by_name(name)
            .await?
            .ok_or_else(|| AppError::AccountNotFound(name.to_string()))
    }

    pub async fn get_account_by_id(&self, id: AccountId) -> Result<Account, AppError> {
        self.repo
            .get_account(id)
            .await?
            .ok_or_else(|| AppError::AccountNotFound(id.to_string()))
    }

    /// Get detailed account information.
    pub async fn get_account_info(&self, name: &str) -> Result<AccountInfo, AppError> {
        let account = self.get_account(name).await?;
        let entries = self
            .repo
            .list_entries_for_account(account.id, None, None)
            .await?;

        Ok(AccountInfo {
            entry_count: entries.len(),
            last_activity: entries.last().map(|e| e.created_at),
            account,
        })
    }

    /// List accounts, optionally only those holding a role.
    pub async fn list_accounts(&self, role: Option<Role>) -> Result<Vec<Account>, AppError> {
        Ok(self.repo.list_accounts(role).await?)
    }

    /// Current wallet balance.
    pub async fn get_balance(&self, name: &str) -> Result<Cents, AppError> {
        Ok(self.get_account(name).await?.balance_cents)
    }

    // ========================
    // Ledger operations
    // ========================

    /// Add funds to an account's wallet. A credit that would push the balance
    /// past `Cents::MAX` is refused.
    pub async fn credit(
        &self,
        account_name: &str,
        actor_name: &str,
        amount_cents: Cents,
        kind: CreditKind,
    ) -> Result<MutationResult, AppError> {
        let account = self.get_account(account_name).await?;
        let actor = self.get_account(actor_name).await?;
        self.record_mutation(&account, &actor, amount_cents, kind.into(), None)
            .await
    }

    /// Remove funds from an account's wallet.
    /// A debit above the current balance changes nothing and records nothing.
    pub async fn debit(
        &self,
        account_name: &str,
        actor_name: &str,
        amount_cents: Cents,
        kind: DebitKind,
    ) -> Result<MutationResult, AppError> {
        let account = self.get_account(account_name).await?;
        let actor = self.get_account(actor_name).await?;
        self.record_mutation(&account, &actor, amount_cents, kind.into(), None)
            .await
    }

    /// Validate, then apply one mutation in its own transaction.
    pub(crate) async fn record_mutation(
        &self,
        account: &Account,
        actor: &Account,
        amount_cents: Cents,
        kind: EntryKind,
        external_ref: Option<String>,
    ) -> Result<MutationResult, AppError> {
        validate_amount(amount_cents)?;
        authorize(account, actor, kind)?;

        let mut entry = LedgerEntry::completed(account.id, actor.id, amount_cents, kind);
        if let Some(reference) = external_ref {
            entry = entry.with_external_ref(reference);
        }

        let mut tx = self.repo.begin().await?;
        let balance_after = apply_in_tx(&mut tx, account, &mut entry).await?;
        tx.commit().await.map_err(anyhow::Error::from)?;

        Ok(committed(entry, account, balance_after))
    }

    /// Ledger entries for an account, oldest first.
    pub async fn list_entries(
        &self,
        account_name: &str,
        filter: EntryFilter,
    ) -> Result<Vec<LedgerEntry>, AppError> {
        let account = self.get_account(account_name).await?;
        Ok(self
            .repo
            .list_entries_for_account(account.id, filter.kind, filter.limit)
            .await?)
    }

    /// The entry that settled an order or top-up, if any.
    pub async fn find_entry_by_reference(
        &self,
        external_ref: &str,
    ) -> Result<Option<LedgerEntry>, AppError> {
        Ok(self.repo.find_entry_by_external_ref(external_ref).await?)
    }

    /// Replay the ledger and compare it against stored balances.
    pub async fn check_integrity(&self) -> Result<IntegrityReport, AppError> {
        let accounts = self.repo.list_accounts(None).await?;
        let entries = self.repo.list_entries().await?;
        let report = build_integrity_report(&accounts, &entries);

        if !report.is_healthy() {
            warn!(
                mismatches = report.mismatches.len(),
                gaps = report.has_sequence_gaps,
                "ledger integrity check failed"
            );
        }
        Ok(report)
    }

    // ========================
    // Catalog operations
    // ========================

    /// Add a product to the catalog.
    pub async fn create_product(
        &self,
        name: String,
        network: String,
        price_cents: Cents,
        product_type: ProductType,
        expiry: Option<String>,
    ) -> Result<Product, AppError> {
        validate_amount(price_cents)?;

        let mut product = Product::new(name, network, price_cents, product_type);
        if let Some(expiry) = expiry {
            product = product.with_expiry(expiry);
        }

        self.repo.save_product(&product).await?;
        Ok(product)
    }

    pub async fn get_product(&self, id: ProductId) -> Result<Product, AppError> {
        self.repo
            .get_product(id)
            .await?
            .ok_or_else(|| AppError::ProductNotFound(id.to_string()))
    }

    /// The whole catalog, or a single price list.
    pub async fn list_products(
        &self,
        product_type: Option<ProductType>,
    ) -> Result<Vec<Product>, AppError> {
        Ok(self.repo.list_products(product_type).await?)
    }

    /// Products an account holding `role` may see and buy.
    pub async fn products_for_role(&self, role: Role) -> Result<Vec<Product>, AppError> {
        let products = self.repo.list_products(None).await?;
        Ok(filter_for_role(products, role))
    }

    // ========================
    // Cart operations
    // ========================

    /// Put a product in an account's cart.
    pub async fn add_to_cart(
        &self,
        account_name: &str,
        product_id: ProductId,
        quantity: i64,
        beneficiary_number: Option<String>,
    ) -> Result<CartItem, AppError> {
        if quantity <= 0 {
            return Err(AppError::InvalidQuantity(quantity));
        }

        let account = self.get_account(account_name).await?;
        let product = self.get_product(product_id).await?;
        ensure_available(&product, account.role)?;

        let mut item = CartItem::new(account.id, product.id, quantity);

        // The cart must stay payable: its total has to fit in Cents
        let mut lines = self.repo.list_cart_lines(account.id).await?;
        lines.push(CartLine {
            item: item.clone(),
            product,
        });
        if cart_total(&lines).is_none() {
            warn!(account = %account.name, quantity, "cart total would overflow");
            return Err(AppError::InvalidQuantity(quantity));
        }

        if let Some(number) = beneficiary_number.filter(|n| !n.trim().is_empty()) {
            item = item.with_beneficiary(number.trim());
        }

        self.repo.save_cart_item(&item).await?;
        Ok(item)
    }

    pub async fn remove_from_cart(
        &self,
        account_name: &str,
        cart_item_id: CartItemId,
    ) -> Result<(), AppError> {
        let account = self.get_account(account_name).await?;
        if !self.repo.delete_cart_item(account.id, cart_item_id).await? {
            return Err(AppError::CartItemNotFound(cart_item_id.to_string()));
        }
        Ok(())
    }

    pub async fn cart(&self, account_name: &str) -> Result<CartView, AppError> {
        let account = self.get_account(account_name).await?;
        let lines = self.repo.list_cart_lines(account.id).await?;
        let total = cart_total(&lines).ok_or_else(|| AppError::CartTotalTooLarge(account.name))?;
        Ok(CartView { lines, total })
    }

    // ========================
    // Order operations
    // ========================

    /// Pay for everything in the cart from the wallet.
    ///
    /// The purchase debit, the order and the removal of the paid cart lines
    /// commit together; if the wallet can't cover the total nothing changes.
    pub async fn place_order(&self, account_name: &str) -> Result<OrderResult, AppError> {
        let account = self.get_account(account_name).await?;
        let lines = self.repo.list_cart_lines(account.id).await?;
        if lines.is_empty() {
            return Err(AppError::CartEmpty);
        }
        for line in &lines {
            ensure_available(&line.product, account.role)?;
        }

        let order = Order::new(account.id, lines.iter().map(CartLine::to_order_item).collect())
            .ok_or_else(|| AppError::CartTotalTooLarge(account.name.clone()))?;
        let paid_items: Vec<CartItemId> = lines.iter().map(|line| line.item.id).collect();

        let mut entry = LedgerEntry::completed(
            account.id,
            account.id,
            order.total_cents,
            DebitKind::Purchase.into(),
        )
        .with_description(format!("Order {}", order.id))
        .with_external_ref(order.id.to_string());

        let mut tx = self.repo.begin().await?;
        let balance_after = apply_in_tx(&mut tx, &account, &mut entry).await?;
        Repository::insert_order(&mut tx, &order).await?;
        // Only the lines that were priced are removed; anything added since
        // stays in the cart. A line removed meanwhile aborts the order.
        let removed = Repository::remove_cart_items(&mut tx, account.id, &paid_items).await?;
        if removed != paid_items.len() as u64 {
            return Err(AppError::CartChanged);
        }
        tx.commit().await.map_err(anyhow::Error::from)?;

        info!(
            account = %account.name,
            order = %order.id,
            total = order.total_cents,
            "order placed"
        );

        Ok(OrderResult {
            order,
            entry,
            balance_after,
        })
    }

    pub async fn get_order(&self, id: OrderId) -> Result<Order, AppError> {
        self.repo
            .get_order(id)
            .await?
            .ok_or_else(|| AppError::OrderNotFound(id.to_string()))
    }

    /// An account's order history, newest first.
    pub async fn list_orders(
        &self,
        account_name: &str,
        filter: &OrderFilter,
    ) -> Result<Vec<Order>, AppError> {
        let account = self.get_account(account_name).await?;
        let orders = self.repo.list_orders(Some(account.id)).await?;
        Ok(orders.into_iter().filter(|o| filter.matches(o)).collect())
    }

    /// Every order on the platform, newest first.
    pub async fn list_all_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>, AppError> {
        let orders = self.repo.list_orders(None).await?;
        Ok(orders.into_iter().filter(|o| filter.matches(o)).collect())
    }

    /// Move an order along its lifecycle. Admin only.
    pub async fn update_order_status(
        &self,
        actor_name: &str,
        order_id: OrderId,
        status: OrderStatus,
        api_status: Option<ApiStatus>,
    ) -> Result<Order, AppError> {
        let actor = self.get_account(actor_name).await?;
        if !actor.role.is_operator() {
            warn!(actor = %actor.name, order = %order_id, "non-admin tried to update order");
            return Err(AppError::AdminOnly("update order status"));
        }

        let mut order = self.get_order(order_id).await?;
        if !order.status.can_transition_to(status) {
            return Err(AppError::InvalidStatusTransition {
                from: order.status,
                to: status,
            });
        }

        if !self
            .repo
            .update_order_status(order_id, order.status, status, api_status)
            .await?
        {
            // Someone else moved the order first
            let current = self.get_order(order_id).await?;
            return Err(AppError::InvalidStatusTransition {
                from: current.status,
                to: status,
            });
        }
        info!(order = %order_id, from = %order.status, to = %status, "order status updated");

        order.status = status;
        if api_status.is_some() {
            order.api_status = api_status;
        }
        Ok(order)
    }

    /// Parse a user-supplied ID.
    pub fn parse_id(value: &str) -> Result<Uuid, AppError> {
        Uuid::parse_str(value.trim())
            .map_err(|_| AppError::InvalidId(value.to_string()))
    }
}

fn validate_amount(amount_cents: Cents) -> Result<(), AppError> {
    if amount_cents <= 0 {
        return Err(AppError::InvalidAmount(
            "Amount must be positive".to_string(),
        ));
    }
    Ok(())
}

/// Operator kinds need an admin actor; self-service kinds need the owner.
fn authorize(account: &Account, actor: &Account, kind: EntryKind) -> Result<(), AppError> {
    let allowed = if kind.is_operator() {
        actor.role.is_operator()
    } else {
        actor.id == account.id
    };

    if !allowed {
        warn!(
            actor = %actor.name,
            account = %account.name,
            kind = %kind,
            "rejected unauthorized wallet mutation"
        );
        return Err(AppError::NotAuthorized {
            actor: actor.name.clone(),
            account: account.name.clone(),
            kind,
        });
    }
    Ok(())
}

fn ensure_available(product: &Product, role: Role) -> Result<(), AppError> {
    if !product.visible_to(role) {
        return Err(AppError::ProductNotAvailable {
            product: product.name.clone(),
            role: role.to_string(),
        });
    }
    Ok(())
}

/// Apply an entry on an open transaction and translate a refused update into
/// the matching error. The caller drops the transaction on error, which rolls
/// it back.
pub(crate) async fn apply_in_tx(
    conn: &mut SqliteConnection,
    account: &Account,
    entry: &mut LedgerEntry,
) -> Result<Cents, AppError> {
    if let Some(balance) = Repository::apply_entry(&mut *conn, entry).await? {
        return Ok(balance);
    }

    let balance = Repository::read_balance(conn, account.id)
        .await?
        .ok_or_else(|| AppError::AccountNotFound(account.name.clone()))?;

    if entry.kind.is_credit() {
        warn!(
            account = %account.name,
            balance,
            amount = entry.amount_cents,
            "credit refused: balance would overflow"
        );
        return Err(AppError::BalanceOverflow {
            account_name: account.name.clone(),
        });
    }

    warn!(
        account = %account.name,
        balance,
        required = entry.amount_cents,
        kind = %entry.kind,
        "debit refused: insufficient funds"
    );

    Err(AppError::InsufficientFunds {
        account_name: account.name.clone(),
        balance,
        required: entry.amount_cents,
    })
}

pub(crate) fn committed(entry: LedgerEntry, account: &Account, balance_after: Cents) -> MutationResult {
    info!(
        account = %account.name,
        actor = %entry.actor_id,
        kind = %entry.kind,
        amount = entry.amount_cents,
        balance_after,
        "wallet mutation committed"
    );

    MutationResult {
        balance_before: balance_after - entry.signed_amount(),
        balance_after,
        account_name: account.name.clone(),
        entry,
    }
}
