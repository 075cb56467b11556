use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use uuid::Uuid;

use crate::domain::{
    Account, AccountId, ApiStatus, CartItem, CartItemId, CartLine, Cents, EntryKind, EntryStatus,
    LedgerEntry, Order, OrderId, OrderItem, OrderStatus, Product, ProductId, ProductType, Role,
    SessionStatus, TopupSession,
};

use super::MIGRATIONS;

const ENTRY_COLUMNS: &str = "id, sequence, account_id, actor_id, amount_cents, kind, status, balance_after, description, external_ref, created_at";
const PRODUCT_COLUMNS: &str = "id, name, network, price_cents, product_type, expiry, created_at";
const ORDER_COLUMNS: &str = "id, account_id, status, api_status, total_cents, created_at";

/// Aggregated order figures for one account's dashboard.
#[derive(Debug, Clone, Default)]
pub struct OrderStats {
    pub total_sales: Cents,
    pub today_sales: Cents,
    pub pending_count: i64,
    pub processing_count: i64,
}

/// Repository for persisting and querying accounts, the ledger, the catalog
/// and orders.
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to a SQLite database.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePool::connect(database_url)
            .await
            .context("Failed to connect to database")?;
        Ok(Self::new(pool))
    }

    /// Apply every migration that hasn't been applied yet.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create schema_migrations table")?;

        let applied = self.applied_migrations().await?;

        for migration in MIGRATIONS.iter().filter(|m| !applied.contains(&m.version)) {
            let mut tx = self.begin().await?;

            sqlx::query(migration.up)
                .execute(&mut *tx)
                .await
                .with_context(|| {
                    format!(
                        "Failed to run migration {:03}_{}",
                        migration.version, migration.name
                    )
                })?;

            sqlx::query("INSERT INTO schema_migrations (version, name, applied_at) VALUES (?, ?, ?)")
                .bind(migration.version)
                .bind(migration.name)
                .bind(Utc::now().to_rfc3339())
                .execute(&mut *tx)
                .await
                .context("Failed to record migration")?;

            tx.commit().await.context("Failed to commit migration")?;
            tracing::debug!(
                version = migration.version,
                name = migration.name,
                "applied migration"
            );
        }

        Ok(())
    }

    /// Roll back the most recently applied migration.
    /// Returns the version rolled back, or None if nothing is applied.
    pub async fn rollback_last(&self) -> Result<Option<i64>> {
        let Some(&version) = self.applied_migrations().await?.last() else {
            return Ok(None);
        };
        let migration = MIGRATIONS
            .iter()
            .find(|m| m.version == version)
            .ok_or_else(|| anyhow::anyhow!("Unknown migration version: {}", version))?;

        let mut tx = self.begin().await?;

        sqlx::query(migration.down)
            .execute(&mut *tx)
            .await
            .with_context(|| {
                format!(
                    "Failed to roll back migration {:03}_{}",
                    migration.version, migration.name
                )
            })?;

        sqlx::query("DELETE FROM schema_migrations WHERE version = ?")
            .bind(version)
            .execute(&mut *tx)
            .await
            .context("Failed to unrecord migration")?;

        tx.commit().await.context("Failed to commit rollback")?;
        tracing::debug!(version, name = migration.name, "rolled back migration");

        Ok(Some(version))
    }

    /// Versions of applied migrations, ascending.
    pub async fn applied_migrations(&self) -> Result<Vec<i64>> {
        let rows = sqlx::query("SELECT version FROM schema_migrations ORDER BY version")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list applied migrations")?;

        Ok(rows.iter().map(|r| r.get("version")).collect())
    }

    /// Initialize a new database (connect + migrate).
    pub async fn init(database_url: &str) -> Result<Self> {
        let repo = Self::connect(database_url).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    /// Start a unit of work that commits or rolls back as a whole.
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>> {
        self.pool
            .begin()
            .await
            .context("Failed to begin transaction")
    }

    // ========================
    // Account operations
    // ========================

    /// Save a new account to the database.
    pub async fn save_account(&self, account: &Account) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO accounts (id, name, role, balance_cents, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(account.id.to_string())
        .bind(&account.name)
        .bind(account.role.as_str())
        .bind(account.balance_cents)
        .bind(account.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .context("Failed to save account")?;
        Ok(())
    }

    /// Get an account by ID.
    pub async fn get_account(&self, id: AccountId) -> Result<Option<Account>> {
        let row = sqlx::query(
            "SELECT id, name, role, balance_cents, created_at FROM accounts WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch account")?;

        row.as_ref().map(Self::row_to_account).transpose()
    }

    /// Get an account by name.
    pub async fn get_account_by_name(&self, name: &str) -> Result<Option<Account>> {
        let row = sqlx::query(
            "SELECT id, name, role, balance_cents, created_at FROM accounts WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch account by name")?;

        row.as_ref().map(Self::row_to_account).transpose()
    }

    /// List all accounts, optionally only those holding a role.
    pub async fn list_accounts(&self, role: Option<Role>) -> Result<Vec<Account>> {
        let rows = match role {
            Some(role) => {
                sqlx::query(
                    "SELECT id, name, role, balance_cents, created_at FROM accounts WHERE role = ? ORDER BY name",
                )
                .bind(role.as_str())
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(
                    "SELECT id, name, role, balance_cents, created_at FROM accounts ORDER BY name",
                )
                .fetch_all(&self.pool)
                .await
            }
        }
        .context("Failed to list accounts")?;

        rows.iter().map(Self::row_to_account).collect()
    }

    fn row_to_account(row: &SqliteRow) -> Result<Account> {
        let id_str: String = row.get("id");
        let role_str: String = row.get("role");
        let created_at_str: String = row.get("created_at");

        Ok(Account {
            id: Uuid::parse_str(&id_str).context("Invalid account ID")?,
            name: row.get("name"),
            role: Role::from_str(&role_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid role: {}", role_str))?,
            balance_cents: row.get("balance_cents"),
            created_at: parse_timestamp(&created_at_str, "created_at")?,
        })
    }

    // ========================
    // Ledger operations
    // ========================

    /// Apply an entry's balance change and append the entry, on the caller's
    /// transaction.
    ///
    /// The balance is never read before it is written: both directions are
    /// guarded in the UPDATE itself. Returns the new balance, or None when no
    /// account row was changed (a debit above the balance, a credit past
    /// `Cents::MAX`, or an unknown account); nothing is written in that case.
    pub async fn apply_entry(
        conn: &mut SqliteConnection,
        entry: &mut LedgerEntry,
    ) -> Result<Option<Cents>> {
        let account_id = entry.account_id.to_string();

        let row = if entry.kind.is_credit() {
            sqlx::query(
                r#"
                UPDATE accounts
                SET balance_cents = balance_cents + ?
                WHERE id = ? AND balance_cents <= ?
                RETURNING balance_cents
                "#,
            )
            .bind(entry.amount_cents)
            .bind(&account_id)
            .bind(Cents::MAX - entry.amount_cents)
            .fetch_optional(&mut *conn)
            .await
        } else {
            sqlx::query(
                r#"
                UPDATE accounts
                SET balance_cents = balance_cents - ?
                WHERE id = ? AND balance_cents >= ?
                RETURNING balance_cents
                "#,
            )
            .bind(entry.amount_cents)
            .bind(&account_id)
            .bind(entry.amount_cents)
            .fetch_optional(&mut *conn)
            .await
        }
        .context("Failed to update balance")?;

        let Some(row) = row else {
            return Ok(None);
        };
        let balance: Cents = row
            .try_get("balance_cents")
            .context("Invalid balance returned by update")?;

        entry.sequence = Self::next_sequence(&mut *conn).await?;
        entry.balance_after = balance;

        sqlx::query(
            r#"
            INSERT INTO ledger_entries (id, sequence, account_id, actor_id, amount_cents, kind, status, balance_after, description, external_ref, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.id.to_string())
        .bind(entry.sequence)
        .bind(&account_id)
        .bind(entry.actor_id.to_string())
        .bind(entry.amount_cents)
        .bind(entry.kind.as_str())
        .bind(entry.status.as_str())
        .bind(entry.balance_after)
        .bind(&entry.description)
        .bind(&entry.external_ref)
        .bind(entry.created_at.to_rfc3339())
        .execute(&mut *conn)
        .await
        .context("Failed to append ledger entry")?;

        Ok(Some(balance))
    }

    /// Current balance of an account, read on the caller's connection.
    pub async fn read_balance(
        conn: &mut SqliteConnection,
        account_id: AccountId,
    ) -> Result<Option<Cents>> {
        let row = sqlx::query("SELECT balance_cents FROM accounts WHERE id = ?")
            .bind(account_id.to_string())
            .fetch_optional(conn)
            .await
            .context("Failed to read balance")?;

        row.map(|r| r.try_get("balance_cents"))
            .transpose()
            .context("Invalid stored balance")
    }

    /// Get the next sequence number and increment the counter.
    async fn next_sequence(conn: &mut SqliteConnection) -> Result<i64> {
        let row = sqlx::query(
            r#"
            UPDATE sequence_counter
            SET value = value + 1
            WHERE name = 'ledger_sequence'
            RETURNING value
            "#,
        )
        .fetch_one(conn)
        .await
        .context("Failed to get next sequence number")?;

        row.try_get("value").context("Invalid ledger sequence value")
    }

    /// List the whole ledger in sequence order.
    pub async fn list_entries(&self) -> Result<Vec<LedgerEntry>> {
        let query = format!("SELECT {} FROM ledger_entries ORDER BY sequence", ENTRY_COLUMNS);
        let rows = sqlx::query(&query)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list ledger entries")?;

        rows.iter().map(Self::row_to_entry).collect()
    }

    /// List entries for one account with optional filters.
    /// With a limit, the most recent entries are kept.
    pub async fn list_entries_for_account(
        &self,
        account_id: AccountId,
        kind: Option<EntryKind>,
        limit: Option<usize>,
    ) -> Result<Vec<LedgerEntry>> {
        let mut query = format!(
            "SELECT {} FROM ledger_entries WHERE account_id = ?",
            ENTRY_COLUMNS
        );
        if kind.is_some() {
            query.push_str(" AND kind = ?");
        }
        query.push_str(" ORDER BY sequence DESC");
        if let Some(lim) = limit {
            query.push_str(&format!(" LIMIT {}", lim));
        }

        let mut sql_query = sqlx::query(&query).bind(account_id.to_string());
        if let Some(kind) = kind {
            sql_query = sql_query.bind(kind.as_str());
        }

        let rows = sql_query
            .fetch_all(&self.pool)
            .await
            .context("Failed to list ledger entries for account")?;

        let mut entries = rows
            .iter()
            .map(Self::row_to_entry)
            .collect::<Result<Vec<_>>>()?;
        entries.reverse();
        Ok(entries)
    }

    /// Find the entry recorded for an order or top-up reference.
    pub async fn find_entry_by_external_ref(&self, external_ref: &str) -> Result<Option<LedgerEntry>> {
        let query = format!(
            "SELECT {} FROM ledger_entries WHERE external_ref = ? ORDER BY sequence LIMIT 1",
            ENTRY_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(external_ref)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch ledger entry by reference")?;

        row.as_ref().map(Self::row_to_entry).transpose()
    }

    fn row_to_entry(row: &SqliteRow) -> Result<LedgerEntry> {
        let id_str: String = row.get("id");
        let account_str: String = row.get("account_id");
        let actor_str: String = row.get("actor_id");
        let kind_str: String = row.get("kind");
        let status_str: String = row.get("status");
        let created_at_str: String = row.get("created_at");

        Ok(LedgerEntry {
            id: Uuid::parse_str(&id_str).context("Invalid entry ID")?,
            sequence: row.get("sequence"),
            account_id: Uuid::parse_str(&account_str).context("Invalid account ID")?,
            actor_id: Uuid::parse_str(&actor_str).context("Invalid actor ID")?,
            amount_cents: row.get("amount_cents"),
            kind: EntryKind::from_str(&kind_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid entry kind: {}", kind_str))?,
            status: EntryStatus::from_str(&status_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid entry status: {}", status_str))?,
            balance_after: row.get("balance_after"),
            description: row.get("description"),
            external_ref: row.get("external_ref"),
            created_at: parse_timestamp(&created_at_str, "created_at")?,
        })
    }

    // ========================
    // Catalog operations
    // ========================

    /// Save a new product.
    pub async fn save_product(&self, product: &Product) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO products (id, name, network, price_cents, product_type, expiry, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(product.id.to_string())
        .bind(&product.name)
        .bind(&product.network)
        .bind(product.price_cents)
        .bind(product.product_type.as_str())
        .bind(&product.expiry)
        .bind(product.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .context("Failed to save product")?;
        Ok(())
    }

    /// Get a product by ID.
    pub async fn get_product(&self, id: ProductId) -> Result<Option<Product>> {
        let query = format!("SELECT {} FROM products WHERE id = ?", PRODUCT_COLUMNS);
        let row = sqlx::query(&query)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch product")?;

        row.as_ref().map(Self::row_to_product).transpose()
    }

    /// List products, optionally restricted to one product type.
    pub async fn list_products(&self, product_type: Option<ProductType>) -> Result<Vec<Product>> {
        let mut query = format!("SELECT {} FROM products", PRODUCT_COLUMNS);
        if product_type.is_some() {
            query.push_str(" WHERE product_type = ?");
        }
        query.push_str(" ORDER BY network, price_cents");

        let mut sql_query = sqlx::query(&query);
        if let Some(pt) = product_type {
            sql_query = sql_query.bind(pt.as_str());
        }

        let rows = sql_query
            .fetch_all(&self.pool)
            .await
            .context("Failed to list products")?;

        rows.iter().map(Self::row_to_product).collect()
    }

    fn row_to_product(row: &SqliteRow) -> Result<Product> {
        let id_str: String = row.get("id");
        let type_str: String = row.get("product_type");
        let created_at_str: String = row.get("created_at");

        Ok(Product {
            id: Uuid::parse_str(&id_str).context("Invalid product ID")?,
            name: row.get("name"),
            network: row.get("network"),
            price_cents: row.get("price_cents"),
            product_type: ProductType::from_str(&type_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid product type: {}", type_str))?,
            expiry: row.get("expiry"),
            created_at: parse_timestamp(&created_at_str, "created_at")?,
        })
    }

    // ========================
    // Cart operations
    // ========================

    /// Save a new cart item.
    pub async fn save_cart_item(&self, item: &CartItem) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO cart_items (id, account_id, product_id, quantity, beneficiary_number, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(item.id.to_string())
        .bind(item.account_id.to_string())
        .bind(item.product_id.to_string())
        .bind(item.quantity)
        .bind(&item.beneficiary_number)
        .bind(item.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .context("Failed to save cart item")?;
        Ok(())
    }

    /// Cart lines for an account joined with their products, oldest first.
    pub async fn list_cart_lines(&self, account_id: AccountId) -> Result<Vec<CartLine>> {
        let rows = sqlx::query(
            r#"
            SELECT
                c.id as cart_id, c.account_id, c.product_id, c.quantity, c.beneficiary_number,
                c.created_at as cart_created_at,
                p.id, p.name, p.network, p.price_cents, p.product_type, p.expiry, p.created_at
            FROM cart_items c
            JOIN products p ON p.id = c.product_id
            WHERE c.account_id = ?
            ORDER BY c.created_at, c.id
            "#,
        )
        .bind(account_id.to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to list cart items")?;

        rows.iter()
            .map(|row| {
                let cart_id: String = row.get("cart_id");
                let account_str: String = row.get("account_id");
                let product_str: String = row.get("product_id");
                let created_at_str: String = row.get("cart_created_at");

                Ok(CartLine {
                    item: CartItem {
                        id: Uuid::parse_str(&cart_id).context("Invalid cart item ID")?,
                        account_id: Uuid::parse_str(&account_str).context("Invalid account ID")?,
                        product_id: Uuid::parse_str(&product_str).context("Invalid product ID")?,
                        quantity: row.get("quantity"),
                        beneficiary_number: row.get("beneficiary_number"),
                        created_at: parse_timestamp(&created_at_str, "created_at")?,
                    },
                    product: Self::row_to_product(row)?,
                })
            })
            .collect()
    }

    /// Number of items in an account's cart.
    pub async fn count_cart_items(&self, account_id: AccountId) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM cart_items WHERE account_id = ?")
            .bind(account_id.to_string())
            .fetch_one(&self.pool)
            .await
            .context("Failed to count cart items")?;

        Ok(row.get("count"))
    }

    /// Delete a cart item owned by the account. Returns false if none matched.
    pub async fn delete_cart_item(&self, account_id: AccountId, id: CartItemId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM cart_items WHERE id = ? AND account_id = ?")
            .bind(id.to_string())
            .bind(account_id.to_string())
            .execute(&self.pool)
            .await
            .context("Failed to delete cart item")?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete the given cart items of an account on the caller's transaction.
    /// Returns how many rows were removed.
    pub async fn remove_cart_items(
        conn: &mut SqliteConnection,
        account_id: AccountId,
        ids: &[CartItemId],
    ) -> Result<u64> {
        let account = account_id.to_string();
        let mut removed = 0;
        for id in ids {
            let result = sqlx::query("DELETE FROM cart_items WHERE id = ? AND account_id = ?")
                .bind(id.to_string())
                .bind(&account)
                .execute(&mut *conn)
                .await
                .context("Failed to remove cart item")?;
            removed += result.rows_affected();
        }
        Ok(removed)
    }

    // ========================
    // Order operations
    // ========================

    /// Insert an order and its items on the caller's transaction.
    pub async fn insert_order(conn: &mut SqliteConnection, order: &Order) -> Result<()> {
        let order_id = order.id.to_string();

        sqlx::query(
            r#"
            INSERT INTO orders (id, account_id, status, api_status, total_cents, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&order_id)
        .bind(order.account_id.to_string())
        .bind(order.status.as_str())
        .bind(order.api_status.map(|s| s.as_str()))
        .bind(order.total_cents)
        .bind(order.created_at.to_rfc3339())
        .execute(&mut *conn)
        .await
        .context("Failed to save order")?;

        for (position, item) in order.items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO order_items (order_id, position, product_id, product_name, network, quantity, unit_price_cents, beneficiary_number)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&order_id)
            .bind(position as i64)
            .bind(item.product_id.to_string())
            .bind(&item.product_name)
            .bind(&item.network)
            .bind(item.quantity)
            .bind(item.unit_price_cents)
            .bind(&item.beneficiary_number)
            .execute(&mut *conn)
            .await
            .context("Failed to save order item")?;
        }

        Ok(())
    }

    /// Get an order with its items.
    pub async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        let query = format!("SELECT {} FROM orders WHERE id = ?", ORDER_COLUMNS);
        let row = sqlx::query(&query)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch order")?;

        match row {
            Some(row) => Ok(Some(self.load_order(&row).await?)),
            None => Ok(None),
        }
    }

    /// Orders for an account, newest first, or every order when no account is given.
    pub async fn list_orders(&self, account_id: Option<AccountId>) -> Result<Vec<Order>> {
        let mut query = format!("SELECT {} FROM orders", ORDER_COLUMNS);
        if account_id.is_some() {
            query.push_str(" WHERE account_id = ?");
        }
        query.push_str(" ORDER BY created_at DESC, id");

        let mut sql_query = sqlx::query(&query);
        if let Some(id) = account_id {
            sql_query = sql_query.bind(id.to_string());
        }

        let rows = sql_query
            .fetch_all(&self.pool)
            .await
            .context("Failed to list orders")?;

        let mut orders = Vec::with_capacity(rows.len());
        for row in &rows {
            orders.push(self.load_order(row).await?);
        }
        Ok(orders)
    }

    /// Move an order from `from` to `to` and, when given, set its fulfilment
    /// API status. Returns false if the order was no longer in `from`.
    pub async fn update_order_status(
        &self,
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
        api_status: Option<ApiStatus>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE orders SET status = ?, api_status = COALESCE(?, api_status) WHERE id = ? AND status = ?",
        )
        .bind(to.as_str())
        .bind(api_status.map(|s| s.as_str()))
        .bind(id.to_string())
        .bind(from.as_str())
        .execute(&self.pool)
        .await
        .context("Failed to update order status")?;

        Ok(result.rows_affected() > 0)
    }

    /// Sales totals and open order counts for an account.
    pub async fn order_stats(
        &self,
        account_id: AccountId,
        today_start: DateTime<Utc>,
    ) -> Result<OrderStats> {
        let row = sqlx::query(
            r#"
            SELECT
                COALESCE(SUM(CASE WHEN status = 'completed' THEN total_cents ELSE 0 END), 0) as total_sales,
                COALESCE(SUM(CASE WHEN status = 'completed' AND created_at >= ? THEN total_cents ELSE 0 END), 0) as today_sales,
                COALESCE(SUM(CASE WHEN status = 'pending' THEN 1 ELSE 0 END), 0) as pending_count,
                COALESCE(SUM(CASE WHEN status = 'processing' THEN 1 ELSE 0 END), 0) as processing_count
            FROM orders
            WHERE account_id = ?
            "#,
        )
        .bind(today_start.to_rfc3339())
        .bind(account_id.to_string())
        .fetch_one(&self.pool)
        .await
        .context("Failed to compute order stats")?;

        Ok(OrderStats {
            total_sales: row.get("total_sales"),
            today_sales: row.get("today_sales"),
            pending_count: row.get("pending_count"),
            processing_count: row.get("processing_count"),
        })
    }

    async fn load_order(&self, row: &SqliteRow) -> Result<Order> {
        let id_str: String = row.get("id");
        let account_str: String = row.get("account_id");
        let status_str: String = row.get("status");
        let api_status_str: Option<String> = row.get("api_status");
        let created_at_str: String = row.get("created_at");

        let item_rows = sqlx::query(
            r#"
            SELECT product_id, product_name, network, quantity, unit_price_cents, beneficiary_number
            FROM order_items
            WHERE order_id = ?
            ORDER BY position
            "#,
        )
        .bind(&id_str)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch order items")?;

        let items = item_rows
            .iter()
            .map(|r| {
                let product_str: String = r.get("product_id");
                Ok(OrderItem {
                    product_id: Uuid::parse_str(&product_str).context("Invalid product ID")?,
                    product_name: r.get("product_name"),
                    network: r.get("network"),
                    quantity: r.get("quantity"),
                    unit_price_cents: r.get("unit_price_cents"),
                    beneficiary_number: r.get("beneficiary_number"),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Order {
            id: Uuid::parse_str(&id_str).context("Invalid order ID")?,
            account_id: Uuid::parse_str(&account_str).context("Invalid account ID")?,
            status: OrderStatus::from_str(&status_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid order status: {}", status_str))?,
            api_status: api_status_str
                .map(|s| {
                    ApiStatus::from_str(&s).ok_or_else(|| anyhow::anyhow!("Invalid api status: {}", s))
                })
                .transpose()?,
            total_cents: row.get("total_cents"),
            items,
            created_at: parse_timestamp(&created_at_str, "created_at")?,
        })
    }

    // ========================
    // Top-up operations
    // ========================

    /// Save a new top-up session.
    pub async fn save_topup_session(&self, session: &TopupSession) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO topup_sessions (reference, account_id, amount_cents, status, payment_url, created_at, settled_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&session.reference)
        .bind(session.account_id.to_string())
        .bind(session.amount_cents)
        .bind(session.status.as_str())
        .bind(&session.payment_url)
        .bind(session.created_at.to_rfc3339())
        .bind(session.settled_at.map(|dt| dt.to_rfc3339()))
        .execute(&self.pool)
        .await
        .context("Failed to save top-up session")?;
        Ok(())
    }

    /// Get a top-up session by reference.
    pub async fn get_topup_session(&self, reference: &str) -> Result<Option<TopupSession>> {
        let row = sqlx::query(
            r#"
            SELECT reference, account_id, amount_cents, status, payment_url, created_at, settled_at
            FROM topup_sessions
            WHERE reference = ?
            "#,
        )
        .bind(reference)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch top-up session")?;

        row.as_ref().map(Self::row_to_topup).transpose()
    }

    /// Record the payment URL handed out by the gateway.
    pub async fn set_topup_payment_url(&self, reference: &str, url: &str) -> Result<()> {
        sqlx::query("UPDATE topup_sessions SET payment_url = ? WHERE reference = ?")
            .bind(url)
            .bind(reference)
            .execute(&self.pool)
            .await
            .context("Failed to store payment URL")?;
        Ok(())
    }

    /// Move a pending session to a final status on the caller's transaction.
    /// Returns false if the session was no longer pending.
    pub async fn settle_topup(
        conn: &mut SqliteConnection,
        reference: &str,
        status: SessionStatus,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE topup_sessions SET status = ?, settled_at = ? WHERE reference = ? AND status = 'pending'",
        )
        .bind(status.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(reference)
        .execute(conn)
        .await
        .context("Failed to settle top-up session")?;

        Ok(result.rows_affected() > 0)
    }

    fn row_to_topup(row: &SqliteRow) -> Result<TopupSession> {
        let account_str: String = row.get("account_id");
        let status_str: String = row.get("status");
        let created_at_str: String = row.get("created_at");
        let settled_at_str: Option<String> = row.get("settled_at");

        Ok(TopupSession {
            reference: row.get("reference"),
            account_id: Uuid::parse_str(&account_str).context("Invalid account ID")?,
            amount_cents: row.get("amount_cents"),
            status: SessionStatus::from_str(&status_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid session status: {}", status_str))?,
            payment_url: row.get("payment_url"),
            created_at: parse_timestamp(&created_at_str, "created_at")?,
            settled_at: settled_at_str
                .map(|s| parse_timestamp(&s, "settled_at"))
                .transpose()?,
        })
    }
}

fn parse_timestamp(value: &str, field: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)
        .with_context(|| format!("Invalid {} timestamp", field))?
        .with_timezone(&Utc))
}
