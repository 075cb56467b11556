use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::application::{
    AppError, EntryFilter, HostedCheckout, MutationResult, TopupResponse, VendService,
};
use crate::config::{CHECKOUT_URL_ENV, DATABASE_ENV, GatewayConfig};
use crate::domain::{
    ApiStatus, CreditKind, DebitKind, EntryKind, Order, OrderFilter, OrderStatus, ProductType,
    Role, format_cents, format_money, parse_cents,
};

/// Airvend - wallet ledger and order book for data and airtime resellers
#[derive(Parser)]
#[command(name = "airvend")]
#[command(about = "Wallet ledger, catalog and orders for a data/airtime reseller platform")]
#[command(version)]
pub struct Cli {
    /// Database file path
    #[arg(short, long, env = DATABASE_ENV, default_value = "airvend.db")]
    pub database: String,

    /// Base URL of the hosted checkout page used for wallet top-ups
    #[arg(long, env = CHECKOUT_URL_ENV)]
    pub checkout_url: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database or upgrade an existing one
    Init,

    /// Schema migration commands
    #[command(subcommand)]
    Migrate(MigrateCommands),

    /// Account management commands
    #[command(subcommand)]
    Account(AccountCommands),

    /// Show an account's wallet balance
    Balance {
        /// Account name
        account: String,
    },

    /// Credit an account's wallet (admin)
    Credit {
        /// Account to credit
        account: String,

        /// Amount (e.g., "50.00" or "50")
        amount: String,

        /// Admin account performing the credit
        #[arg(long)]
        actor: String,
    },

    /// Debit an account's wallet (admin)
    Debit {
        /// Account to debit
        account: String,

        /// Amount (e.g., "30.00" or "30")
        amount: String,

        /// Admin account performing the debit
        #[arg(long)]
        actor: String,
    },

    /// List an account's ledger entries
    Entries {
        /// Account name
        account: String,

        /// Filter by kind: admin_credit, admin_debit, purchase_debit, topup_credit
        #[arg(short, long)]
        kind: Option<String>,

        /// Show only the most recent entries
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Product catalog commands
    #[command(subcommand)]
    Product(ProductCommands),

    /// Cart commands
    #[command(subcommand)]
    Cart(CartCommands),

    /// Order commands
    #[command(subcommand)]
    Order(OrderCommands),

    /// Show an account's dashboard
    Dashboard {
        /// Account name
        account: String,
    },

    /// Wallet top-up commands
    #[command(subcommand)]
    Topup(TopupCommands),

    /// Verify ledger integrity
    Check,
}

#[derive(Subcommand)]
pub enum MigrateCommands {
    /// Show applied migrations
    Status,

    /// Roll back the most recent migration
    Rollback,
}

#[derive(Subcommand)]
pub enum AccountCommands {
    /// Create a new account
    Create {
        /// Account name (must be unique)
        name: String,

        /// Role: customer, agent, elite, dealer, admin
        #[arg(short, long, default_value = "customer")]
        role: String,
    },

    /// List accounts
    List {
        /// Only accounts with this role
        #[arg(short, long)]
        role: Option<String>,
    },

    /// Show detailed account information
    Show {
        /// Account name
        name: String,
    },
}

#[derive(Subcommand)]
pub enum ProductCommands {
    /// Add a product to the catalog
    Create {
        /// Product name (e.g., "5GB")
        name: String,

        /// Network (e.g., MTN, Telecel, "AT (Big Time)")
        #[arg(short, long)]
        network: String,

        /// Price (e.g., "25.00")
        #[arg(short, long)]
        price: String,

        /// Product type: customer_product, agent_product, dealer_product, elite_product
        #[arg(short = 't', long = "type")]
        product_type: String,

        /// Validity label (e.g., "30 days")
        #[arg(short, long)]
        expiry: Option<String>,
    },

    /// List products
    List {
        /// Only products visible to this role
        #[arg(short, long, conflicts_with = "product_type")]
        role: Option<String>,

        /// Only products of this type
        #[arg(short = 't', long = "type")]
        product_type: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum CartCommands {
    /// Add a product to an account's cart
    Add {
        /// Account name
        account: String,

        /// Product ID
        product: String,

        /// Quantity
        #[arg(short, long, default_value = "1")]
        quantity: i64,

        /// Phone number to deliver the bundle to
        #[arg(short, long)]
        beneficiary: Option<String>,
    },

    /// Remove an item from an account's cart
    Remove {
        /// Account name
        account: String,

        /// Cart item ID
        item: String,
    },

    /// Show an account's cart
    Show {
        /// Account name
        account: String,
    },
}

#[derive(Subcommand)]
pub enum OrderCommands {
    /// Pay for the cart from the wallet
    Place {
        /// Account name
        account: String,
    },

    /// List orders
    List {
        /// Account name (omit for all orders)
        account: Option<String>,

        /// Filter by network
        #[arg(long)]
        network: Option<String>,

        /// Filter by status: pending, processing, completed, failed
        #[arg(long)]
        status: Option<String>,

        /// Filter by beneficiary number (substring)
        #[arg(long)]
        beneficiary: Option<String>,

        /// Filter by order ID (substring, case-insensitive)
        #[arg(long)]
        order_id: Option<String>,
    },

    /// Show an order
    Show {
        /// Order ID
        id: String,
    },

    /// Update an order's status (admin)
    Status {
        /// Order ID
        id: String,

        /// New status: processing, completed, failed
        status: String,

        /// Admin account performing the update
        #[arg(long)]
        actor: String,

        /// Fulfilment API outcome: success, failed, disabled
        #[arg(long)]
        api_status: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum TopupCommands {
    /// Start a top-up and print the payment URL as JSON
    Start {
        /// Account name
        account: String,

        /// Amount (e.g., "100.00")
        amount: String,
    },

    /// Credit a paid top-up
    Confirm {
        /// Top-up reference
        reference: String,
    },

    /// Mark a top-up as not paid
    Fail {
        /// Top-up reference
        reference: String,
    },
}

/// Install the log subscriber. `RUST_LOG` wins over `--verbose`.
pub fn init_tracing(verbose: bool) {
    let default = if verbose { "airvend=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let gateway_config = GatewayConfig::new(self.checkout_url.clone());

        match self.command {
            Commands::Init => {
                VendService::init(&self.database).await?;
                println!("Database initialized: {}", self.database);
            }

            Commands::Migrate(cmd) => {
                let service = VendService::connect(&self.database).await?;
                run_migrate_command(&service, cmd).await?;
            }

            Commands::Account(cmd) => {
                let service = VendService::connect(&self.database).await?;
                run_account_command(&service, cmd).await?;
            }

            Commands::Balance { account } => {
                let service = VendService::connect(&self.database).await?;
                let balance = service.get_balance(&account).await?;
                println!("{}: {}", account, format_money(balance));
            }

            Commands::Credit {
                account,
                amount,
                actor,
            } => {
                let service = VendService::connect(&self.database).await?;
                let amount_cents = parse_amount(&amount)?;
                let result = service
                    .credit(&account, &actor, amount_cents, CreditKind::Admin)
                    .await?;
                print_mutation("Credited", &result);
            }

            Commands::Debit {
                account,
                amount,
                actor,
            } => {
                let service = VendService::connect(&self.database).await?;
                let amount_cents = parse_amount(&amount)?;
                match service
                    .debit(&account, &actor, amount_cents, DebitKind::Admin)
                    .await
                {
                    Ok(result) => print_mutation("Debited", &result),
                    // Refused debits are reported, not treated as a failure
                    Err(e @ AppError::InsufficientFunds { .. }) => {
                        println!("Debit refused: {}", e);
                    }
                    Err(e) => return Err(e.into()),
                }
            }

            Commands::Entries {
                account,
                kind,
                limit,
            } => {
                let service = VendService::connect(&self.database).await?;
                let kind = kind
                    .map(|k| {
                        EntryKind::from_str(&k)
                            .ok_or_else(|| anyhow::anyhow!("Invalid entry kind '{}'", k))
                    })
                    .transpose()?;
                run_entries_command(&service, &account, EntryFilter { kind, limit }).await?;
            }

            Commands::Product(cmd) => {
                let service = VendService::connect(&self.database).await?;
                run_product_command(&service, cmd).await?;
            }

            Commands::Cart(cmd) => {
                let service = VendService::connect(&self.database).await?;
                run_cart_command(&service, cmd).await?;
            }

            Commands::Order(cmd) => {
                let service = VendService::connect(&self.database).await?;
                run_order_command(&service, cmd).await?;
            }

            Commands::Dashboard { account } => {
                let service = VendService::connect(&self.database).await?;
                run_dashboard_command(&service, &account).await?;
            }

            Commands::Topup(cmd) => {
                let service = VendService::connect(&self.database).await?;
                run_topup_command(&service, cmd, gateway_config).await?;
            }

            Commands::Check => {
                let service = VendService::connect(&self.database).await?;
                run_check_command(&service).await?;
            }
        }

        Ok(())
    }
}

async fn run_migrate_command(service: &VendService, cmd: MigrateCommands) -> Result<()> {
    match cmd {
        MigrateCommands::Status => {
            let applied = service.applied_migrations().await?;
            if applied.is_empty() {
                println!("No migrations applied. Run `airvend init`.");
            }
            for version in applied {
                println!("applied: {:03}", version);
            }
        }

        MigrateCommands::Rollback => match service.rollback_migration().await? {
            Some(version) => println!("Rolled back migration {:03}", version),
            None => println!("Nothing to roll back."),
        },
    }
    Ok(())
}

async fn run_account_command(service: &VendService, cmd: AccountCommands) -> Result<()> {
    match cmd {
        AccountCommands::Create { name, role } => {
            let role = parse_role(&role)?;
            let account = service.create_account(name, role).await?;
            println!("Created account: {} ({})", account.name, account.role);
        }

        AccountCommands::List { role } => {
            let role = role.as_deref().map(parse_role).transpose()?;
            let accounts = service.list_accounts(role).await?;
            if accounts.is_empty() {
                println!("No accounts found.");
            } else {
                println!("{:<20} {:<10} {:>14}", "NAME", "ROLE", "BALANCE");
                println!("{}", "-".repeat(46));
                for account in accounts {
                    println!(
                        "{:<20} {:<10} {:>14}",
                        truncate(&account.name, 20),
                        account.role,
                        format_money(account.balance_cents)
                    );
                }
            }
        }

        AccountCommands::Show { name } => {
            let info = service.get_account_info(&name).await?;
            let account = &info.account;

            println!("Account: {}", account.name);
            println!("  ID:            {}", account.id);
            println!("  Role:          {}", account.role);
            println!(
                "  Created:       {}",
                account.created_at.format("%Y-%m-%d %H:%M:%S")
            );
            println!();
            println!("  Balance:       {}", format_money(account.balance_cents));
            println!("  Entries:       {}", info.entry_count);
            if let Some(last) = info.last_activity {
                println!("  Last activity: {}", last.format("%Y-%m-%d %H:%M:%S"));
            }
        }
    }
    Ok(())
}

async fn run_entries_command(
    service: &VendService,
    account: &str,
    filter: EntryFilter,
) -> Result<()> {
    let entries = service.list_entries(account, filter).await?;

    if entries.is_empty() {
        println!("No ledger entries found.");
        return Ok(());
    }

    println!(
        "{:>5} {:<17} {:<15} {:>11} {:>11} {:<10} REF",
        "SEQ", "DATE", "KIND", "AMOUNT", "BALANCE", "STATUS"
    );
    println!("{}", "-".repeat(84));
    for entry in entries {
        let amount = format_cents(entry.signed_amount());
        println!(
            "{:>5} {:<17} {:<15} {:>11} {:>11} {:<10} {}",
            entry.sequence,
            entry.created_at.format("%Y-%m-%d %H:%M"),
            entry.kind,
            amount,
            format_cents(entry.balance_after),
            entry.status,
            truncate(entry.external_ref.as_deref().unwrap_or(""), 36)
        );
    }
    Ok(())
}

async fn run_product_command(service: &VendService, cmd: ProductCommands) -> Result<()> {
    match cmd {
        ProductCommands::Create {
            name,
            network,
            price,
            product_type,
            expiry,
        } => {
            let price_cents = parse_amount(&price)?;
            let product_type = parse_product_type(&product_type)?;
            let product = service
                .create_product(name, network, price_cents, product_type, expiry)
                .await?;
            println!(
                "Created product: {} {} at {} [{}] ({})",
                product.network,
                product.name,
                format_money(product.price_cents),
                product.product_type,
                product.id
            );
        }

        ProductCommands::List { role, product_type } => {
            let products = match (role, product_type) {
                (Some(role), _) => service.products_for_role(parse_role(&role)?).await?,
                (None, Some(pt)) => service.list_products(Some(parse_product_type(&pt)?)).await?,
                (None, None) => service.list_products(None).await?,
            };

            if products.is_empty() {
                println!("No products found.");
            } else {
                println!(
                    "{:<36} {:<15} {:<12} {:>10} {:<16} EXPIRY",
                    "ID", "NETWORK", "NAME", "PRICE", "TYPE"
                );
                println!("{}", "-".repeat(100));
                for product in products {
                    println!(
                        "{:<36} {:<15} {:<12} {:>10} {:<16} {}",
                        product.id,
                        truncate(&product.network, 15),
                        truncate(&product.name, 12),
                        format_cents(product.price_cents),
                        product.product_type,
                        product.expiry.as_deref().unwrap_or("-")
                    );
                }
            }
        }
    }
    Ok(())
}

async fn run_cart_command(service: &VendService, cmd: CartCommands) -> Result<()> {
    match cmd {
        CartCommands::Add {
            account,
            product,
            quantity,
            beneficiary,
        } => {
            let product_id = VendService::parse_id(&product)?;
            let item = service
                .add_to_cart(&account, product_id, quantity, beneficiary)
                .await?;
            println!("Added to cart: {} x{} ({})", product, item.quantity, item.id);
        }

        CartCommands::Remove { account, item } => {
            let item_id = VendService::parse_id(&item)?;
            service.remove_from_cart(&account, item_id).await?;
            println!("Removed from cart: {}", item);
        }

        CartCommands::Show { account } => {
            let cart = service.cart(&account).await?;
            if cart.lines.is_empty() {
                println!("Cart is empty.");
                return Ok(());
            }

            println!(
                "{:<36} {:<15} {:<12} {:>4} {:>10} BENEFICIARY",
                "ITEM", "NETWORK", "PRODUCT", "QTY", "TOTAL"
            );
            println!("{}", "-".repeat(95));
            for line in &cart.lines {
                println!(
                    "{:<36} {:<15} {:<12} {:>4} {:>10} {}",
                    line.item.id,
                    truncate(&line.product.network, 15),
                    truncate(&line.product.name, 12),
                    line.item.quantity,
                    line.line_total().map(format_cents).unwrap_or_else(|| "-".into()),
                    line.item.beneficiary_number.as_deref().unwrap_or("-")
                );
            }
            println!();
            println!("Total: {}", format_money(cart.total));
        }
    }
    Ok(())
}

async fn run_order_command(service: &VendService, cmd: OrderCommands) -> Result<()> {
    match cmd {
        OrderCommands::Place { account } => match service.place_order(&account).await {
            Ok(result) => {
                println!(
                    "Placed order {} for {} ({} item(s))",
                    result.order.id,
                    format_money(result.order.total_cents),
                    result.order.items.len()
                );
                println!("Wallet balance: {}", format_money(result.balance_after));
            }
            Err(e @ AppError::InsufficientFunds { .. }) => {
                println!("Order not placed: {}", e);
            }
            Err(e) => return Err(e.into()),
        },

        OrderCommands::List {
            account,
            network,
            status,
            beneficiary,
            order_id,
        } => {
            let filter = OrderFilter {
                network,
                status: status.as_deref().map(parse_order_status).transpose()?,
                beneficiary,
                order_id,
            };

            let orders = match account {
                Some(name) => service.list_orders(&name, &filter).await?,
                None => service.list_all_orders(&filter).await?,
            };

            if orders.is_empty() {
                println!("No orders found.");
            } else {
                println!(
                    "{:<36} {:<17} {:<15} {:<11} {:<9} {:>10} BENEFICIARY",
                    "ORDER", "DATE", "NETWORK", "STATUS", "API", "TOTAL"
                );
                println!("{}", "-".repeat(115));
                for order in &orders {
                    print_order_row(order);
                }
            }
        }

        OrderCommands::Show { id } => {
            let order = service.get_order(VendService::parse_id(&id)?).await?;

            println!("Order: {}", order.id);
            println!("  Status:     {}", order.status);
            println!(
                "  API status: {}",
                order.api_status.map(|s| s.as_str()).unwrap_or("-")
            );
            println!("  Network:    {}", order.network().unwrap_or("N/A"));
            println!("  Total:      {}", format_money(order.total_cents));
            println!(
                "  Placed:     {}",
                order.created_at.format("%Y-%m-%d %H:%M:%S")
            );
            println!();
            for item in &order.items {
                print!(
                    "  {} {} x{} @ {}",
                    item.network,
                    item.product_name,
                    item.quantity,
                    format_cents(item.unit_price_cents)
                );
                match &item.beneficiary_number {
                    Some(number) => println!("  -> {}", number),
                    None => println!(),
                }
            }
        }

        OrderCommands::Status {
            id,
            status,
            actor,
            api_status,
        } => {
            let order_id = VendService::parse_id(&id)?;
            let status = parse_order_status(&status)?;
            let api_status = api_status
                .map(|s| {
                    ApiStatus::from_str(&s).ok_or_else(|| {
                        anyhow::anyhow!(
                            "Invalid API status '{}'. Valid values: success, failed, disabled",
                            s
                        )
                    })
                })
                .transpose()?;

            let order = service
                .update_order_status(&actor, order_id, status, api_status)
                .await?;
            println!("Order {} is now {}", order.id, order.status);
        }
    }
    Ok(())
}

async fn run_dashboard_command(service: &VendService, account: &str) -> Result<()> {
    let summary = service.dashboard(account, Utc::now()).await?;
    let stats = summary.stats;

    println!(
        "{} ({})",
        summary.account.name,
        summary.account.role.as_str().to_uppercase()
    );
    println!("  Wallet balance:    {}", format_money(summary.wallet_balance));
    println!("  Cart items:        {}", summary.cart_count);
    println!("  Total sales:       {}", format_money(stats.total_sales));
    println!("  Today's sales:     {}", format_money(stats.today_sales));
    println!("  Pending orders:    {}", stats.pending_orders);
    println!("  Processing orders: {}", stats.processing_orders);

    if !summary.recent_orders.is_empty() {
        println!();
        println!("Recent orders:");
        for order in &summary.recent_orders {
            print_order_row(order);
        }
    }

    println!();
    if summary.products.is_empty() {
        println!("No products available.");
    } else {
        println!("Available products:");
        for product in &summary.products {
            println!(
                "  {:<15} {:<12} {:>10}  {}",
                truncate(&product.network, 15),
                truncate(&product.name, 12),
                format_cents(product.price_cents),
                product.id
            );
        }
    }
    Ok(())
}

async fn run_topup_command(
    service: &VendService,
    cmd: TopupCommands,
    config: GatewayConfig,
) -> Result<()> {
    match cmd {
        TopupCommands::Start { account, amount } => {
            let gateway = HostedCheckout::new(config);
            let result = match parse_cents(&amount) {
                Ok(amount_cents) => service.start_topup(&account, amount_cents, &gateway).await,
                Err(e) => Err(AppError::InvalidAmount(e.to_string())),
            };

            let response = TopupResponse::from_result(&result);
            println!("{}", serde_json::to_string(&response)?);
        }

        TopupCommands::Confirm { reference } => {
            let result = service.confirm_topup(&reference).await?;
            print_mutation("Topped up", &result);
        }

        TopupCommands::Fail { reference } => {
            let session = service.fail_topup(&reference).await?;
            println!("Top-up {} marked {}", session.reference, session.status);
        }
    }
    Ok(())
}

async fn run_check_command(service: &VendService) -> Result<()> {
    println!("Checking ledger integrity...\n");

    let report = service.check_integrity().await?;

    println!("Accounts: {}", report.account_count);
    println!("Entries:  {}", report.entry_count);
    println!();

    for mismatch in &report.mismatches {
        println!(
            "  ✗ {}: stored balance {} but ledger replays to {}",
            mismatch.account_name,
            format_cents(mismatch.stored),
            format_cents(mismatch.replayed)
        );
    }
    for name in &report.negative_balances {
        println!("  ✗ {}: negative balance", name);
    }
    if report.has_sequence_gaps {
        println!("  ✗ Ledger sequence has gaps");
    }
    for account_id in &report.broken_chains {
        println!("  ✗ {}: recorded balance_after values do not chain", account_id);
    }

    if report.is_healthy() {
        println!("✓ Ledger is consistent");
    } else {
        println!("✗ Ledger has problems");
    }
    Ok(())
}

fn print_mutation(verb: &str, result: &MutationResult) {
    println!(
        "{} {} {} ({} -> {})",
        verb,
        result.account_name,
        format_money(result.entry.amount_cents),
        format_cents(result.balance_before),
        format_cents(result.balance_after)
    );
    println!("Entry: {} #{}", result.entry.kind, result.entry.sequence);
}

fn print_order_row(order: &Order) {
    println!(
        "{:<36} {:<17} {:<15} {:<11} {:<9} {:>10} {}",
        order.id,
        order.created_at.format("%Y-%m-%d %H:%M"),
        truncate(order.network().unwrap_or("N/A"), 15),
        order.status,
        order.api_status.map(|s| s.as_str()).unwrap_or("-"),
        format_cents(order.total_cents),
        order.beneficiary().unwrap_or("-")
    );
}

fn parse_amount(amount: &str) -> Result<i64> {
    parse_cents(amount).context("Invalid amount format. Use '50.00' or '50'")
}

fn parse_role(role: &str) -> Result<Role> {
    Role::from_str(role).ok_or_else(|| {
        anyhow::anyhow!(
            "Invalid role '{}'. Valid roles: customer, agent, elite, dealer, admin",
            role
        )
    })
}

fn parse_product_type(product_type: &str) -> Result<ProductType> {
    ProductType::from_str(product_type).ok_or_else(|| {
        anyhow::anyhow!(
            "Invalid product type '{}'. Valid types: customer_product, agent_product, dealer_product, elite_product",
            product_type
        )
    })
}

fn parse_order_status(status: &str) -> Result<OrderStatus> {
    OrderStatus::from_str(status).ok_or_else(|| {
        anyhow::anyhow!(
            "Invalid order status '{}'. Valid values: pending, processing, completed, failed",
            status
        )
    })
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
