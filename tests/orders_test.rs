mod common;

use airvend::Repository;
use airvend::application::{AppError, EntryFilter};
use airvend::domain::{
    ApiStatus, DebitKind, EntryKind, OrderFilter, OrderStatus, ProductType, Role,
};
use anyhow::Result;
use chrono::Utc;
use common::{StandardAccounts, StandardCatalog, test_service};
use tempfile::TempDir;

/// Open a second handle on the service's database file
async fn open_repository(temp: &TempDir) -> Result<Repository> {
    let db_path = temp.path().join("test.db");
    Repository::connect(&format!("sqlite:{}", db_path.display())).await
}

#[tokio::test]
async fn test_each_role_sees_its_own_price_list() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let catalog = StandardCatalog::create(&service).await?;

    let customer = service.products_for_role(Role::Customer).await?;
    assert_eq!(customer.len(), 1);
    assert_eq!(customer[0].id, catalog.customer_5gb.id);

    let agent = service.products_for_role(Role::Agent).await?;
    assert_eq!(agent.len(), 1);
    assert_eq!(agent[0].price_cents, 2200);

    // Admins shop from the dealer list
    let admin = service.products_for_role(Role::Admin).await?;
    assert_eq!(admin.len(), 1);
    assert_eq!(admin[0].id, catalog.dealer_5gb.id);

    assert!(service.products_for_role(Role::Elite).await?.is_empty());
    assert_eq!(service.list_products(None).await?.len(), 3);
    assert_eq!(
        service
            .list_products(Some(ProductType::DealerProduct))
            .await?
            .len(),
        1
    );

    Ok(())
}

#[tokio::test]
async fn test_cart_rejects_other_price_lists() -> Result<()> {
    let (service, _temp) = test_service().await?;
    StandardAccounts::create(&service).await?;
    let catalog = StandardCatalog::create(&service).await?;

    let result = service
        .add_to_cart("ama", catalog.agent_5gb.id, 1, None)
        .await;
    assert!(matches!(result, Err(AppError::ProductNotAvailable { .. })));

    let result = service
        .add_to_cart("ama", catalog.customer_5gb.id, 0, None)
        .await;
    assert!(matches!(result, Err(AppError::InvalidQuantity(0))));

    assert!(service.cart("ama").await?.lines.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_cart_add_show_remove() -> Result<()> {
    let (service, _temp) = test_service().await?;
    StandardAccounts::create(&service).await?;
    let catalog = StandardCatalog::create(&service).await?;

    let first = service
        .add_to_cart("ama", catalog.customer_5gb.id, 2, Some(" 0241234567 ".into()))
        .await?;
    service
        .add_to_cart("ama", catalog.customer_5gb.id, 1, Some("".into()))
        .await?;

    let cart = service.cart("ama").await?;
    assert_eq!(cart.lines.len(), 2);
    assert_eq!(cart.total, 7500);
    assert_eq!(
        cart.lines[0].item.beneficiary_number.as_deref(),
        Some("0241234567")
    );
    assert_eq!(cart.lines[1].item.beneficiary_number, None);

    // Another account can't remove ama's item
    let result = service.remove_from_cart("kofi", first.id).await;
    assert!(matches!(result, Err(AppError::CartItemNotFound(_))));

    service.remove_from_cart("ama", first.id).await?;
    assert_eq!(service.cart("ama").await?.total, 2500);

    Ok(())
}

#[tokio::test]
async fn test_place_order_pays_from_wallet() -> Result<()> {
    let (service, _temp) = test_service().await?;
    StandardAccounts::create(&service).await?;
    StandardAccounts::fund(&service, "ama", 10000).await?;
    let catalog = StandardCatalog::create(&service).await?;

    service
        .add_to_cart("ama", catalog.customer_5gb.id, 2, Some("0241234567".into()))
        .await?;

    let placed = service.place_order("ama").await?;
    assert_eq!(placed.order.total_cents, 5000);
    assert_eq!(placed.order.status, OrderStatus::Pending);
    assert_eq!(placed.order.api_status, None);
    assert_eq!(placed.balance_after, 5000);
    assert_eq!(placed.entry.kind, EntryKind::PurchaseDebit);

    assert_eq!(service.get_balance("ama").await?, 5000);
    assert!(service.cart("ama").await?.lines.is_empty());

    let entry = service
        .find_entry_by_reference(&placed.order.id.to_string())
        .await?
        .expect("purchase entry recorded");
    assert_eq!(entry.amount_cents, 5000);

    let stored = service.get_order(placed.order.id).await?;
    assert_eq!(stored.items.len(), 1);
    assert_eq!(stored.items[0].quantity, 2);
    assert_eq!(stored.items[0].unit_price_cents, 2500);
    assert_eq!(stored.beneficiary(), Some("0241234567"));
    assert_eq!(stored.network(), Some("MTN"));

    Ok(())
}

#[tokio::test]
async fn test_order_without_funds_leaves_everything_in_place() -> Result<()> {
    let (service, _temp) = test_service().await?;
    StandardAccounts::create(&service).await?;
    StandardAccounts::fund(&service, "ama", 1000).await?;
    let catalog = StandardCatalog::create(&service).await?;

    service
        .add_to_cart("ama", catalog.customer_5gb.id, 1, None)
        .await?;

    let result = service.place_order("ama").await;
    assert!(matches!(
        result,
        Err(AppError::InsufficientFunds {
            balance: 1000,
            required: 2500,
            ..
        })
    ));

    assert_eq!(service.get_balance("ama").await?, 1000);
    assert_eq!(service.cart("ama").await?.lines.len(), 1);
    assert!(
        service
            .list_orders("ama", &OrderFilter::default())
            .await?
            .is_empty()
    );
    let purchases = service
        .list_entries(
            "ama",
            EntryFilter {
                kind: Some(EntryKind::PurchaseDebit),
                limit: None,
            },
        )
        .await?;
    assert!(purchases.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_empty_cart_cannot_be_ordered() -> Result<()> {
    let (service, _temp) = test_service().await?;
    StandardAccounts::create(&service).await?;

    let result = service.place_order("ama").await;
    assert!(matches!(result, Err(AppError::CartEmpty)));
    Ok(())
}

#[tokio::test]
async fn test_order_status_lifecycle() -> Result<()> {
    let (service, _temp) = test_service().await?;
    StandardAccounts::create(&service).await?;
    StandardAccounts::fund(&service, "kofi", 10000).await?;
    let catalog = StandardCatalog::create(&service).await?;

    service
        .add_to_cart("kofi", catalog.agent_5gb.id, 1, Some("0200000000".into()))
        .await?;
    let order_id = service.place_order("kofi").await?.order.id;

    // Only admins move orders along
    let result = service
        .update_order_status("kofi", order_id, OrderStatus::Completed, None)
        .await;
    assert!(matches!(result, Err(AppError::AdminOnly(_))));

    // Pending can't jump straight to completed
    let result = service
        .update_order_status("admin", order_id, OrderStatus::Completed, None)
        .await;
    assert!(matches!(
        result,
        Err(AppError::InvalidStatusTransition {
            from: OrderStatus::Pending,
            to: OrderStatus::Completed
        })
    ));

    let order = service
        .update_order_status(
            "admin",
            order_id,
            OrderStatus::Processing,
            Some(ApiStatus::Success),
        )
        .await?;
    assert_eq!(order.status, OrderStatus::Processing);

    let order = service
        .update_order_status("admin", order_id, OrderStatus::Completed, None)
        .await?;
    assert_eq!(order.status, OrderStatus::Completed);

    let stored = service.get_order(order_id).await?;
    assert_eq!(stored.status, OrderStatus::Completed);
    assert_eq!(stored.api_status, Some(ApiStatus::Success));

    // Completed is terminal
    let result = service
        .update_order_status("admin", order_id, OrderStatus::Failed, None)
        .await;
    assert!(matches!(
        result,
        Err(AppError::InvalidStatusTransition { .. })
    ));

    Ok(())
}

#[tokio::test]
async fn test_order_filters() -> Result<()> {
    let (service, _temp) = test_service().await?;
    StandardAccounts::create(&service).await?;
    StandardAccounts::fund(&service, "ama", 20000).await?;
    let catalog = StandardCatalog::create(&service).await?;
    let telecel = service
        .create_product(
            "2GB".into(),
            "Telecel".into(),
            1200,
            ProductType::CustomerProduct,
            None,
        )
        .await?;

    service
        .add_to_cart("ama", catalog.customer_5gb.id, 1, Some("0241111111".into()))
        .await?;
    let mtn_order = service.place_order("ama").await?.order.id;

    service
        .add_to_cart("ama", telecel.id, 1, Some("0502222222".into()))
        .await?;
    service.place_order("ama").await?;

    let all = service.list_orders("ama", &OrderFilter::default()).await?;
    assert_eq!(all.len(), 2);

    let by_network = OrderFilter {
        network: Some("mtn".into()),
        ..Default::default()
    };
    let mtn = service.list_orders("ama", &by_network).await?;
    assert_eq!(mtn.len(), 1);
    assert_eq!(mtn[0].id, mtn_order);

    let by_number = OrderFilter {
        beneficiary: Some("2222".into()),
        ..Default::default()
    };
    let found = service.list_all_orders(&by_number).await?;
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].network(), Some("Telecel"));

    service
        .update_order_status("admin", mtn_order, OrderStatus::Failed, None)
        .await?;
    let failed = OrderFilter {
        status: Some(OrderStatus::Failed),
        ..Default::default()
    };
    assert_eq!(service.list_all_orders(&failed).await?.len(), 1);

    assert!(
        service
            .list_orders("kofi", &OrderFilter::default())
            .await?
            .is_empty()
    );

    Ok(())
}

#[tokio::test]
async fn test_dashboard_summary() -> Result<()> {
    let (service, _temp) = test_service().await?;
    StandardAccounts::create(&service).await?;
    StandardAccounts::fund(&service, "esi", 10000).await?;
    let catalog = StandardCatalog::create(&service).await?;

    service
        .add_to_cart("esi", catalog.dealer_5gb.id, 2, None)
        .await?;
    let first = service.place_order("esi").await?.order.id;
    service
        .add_to_cart("esi", catalog.dealer_5gb.id, 1, None)
        .await?;
    let second = service.place_order("esi").await?.order.id;

    service
        .update_order_status("admin", first, OrderStatus::Processing, None)
        .await?;
    service
        .update_order_status("admin", first, OrderStatus::Completed, None)
        .await?;

    service
        .add_to_cart("esi", catalog.dealer_5gb.id, 1, None)
        .await?;

    let summary = service.dashboard("esi", Utc::now()).await?;
    assert_eq!(summary.wallet_balance, 4000);
    assert_eq!(summary.cart_count, 1);
    assert_eq!(summary.stats.total_sales, 4000);
    assert_eq!(summary.stats.today_sales, 4000);
    assert_eq!(summary.stats.pending_orders, 1);
    assert_eq!(summary.stats.processing_orders, 0);
    assert_eq!(summary.recent_orders.len(), 2);
    assert_eq!(summary.recent_orders[0].id, second);
    assert_eq!(summary.products.len(), 1);

    // A fresh account sees zeros
    let empty = service.dashboard("ama", Utc::now()).await?;
    assert_eq!(empty.wallet_balance, 0);
    assert_eq!(empty.stats.total_sales, 0);
    assert!(empty.recent_orders.is_empty());

    // Direct purchases without an order don't count as sales
    service.debit("esi", "esi", 1000, DebitKind::Purchase).await?;
    let summary = service.dashboard("esi", Utc::now()).await?;
    assert_eq!(summary.stats.total_sales, 4000);

    Ok(())
}

#[tokio::test]
async fn test_cart_refuses_quantities_that_overflow_the_total() -> Result<()> {
    let (service, _temp) = test_service().await?;
    StandardAccounts::create(&service).await?;
    let cheap = service
        .create_product(
            "10MB".into(),
            "MTN".into(),
            4,
            ProductType::CustomerProduct,
            None,
        )
        .await?;

    let result = service
        .add_to_cart("ama", cheap.id, (1 << 62) + 1, None)
        .await;
    assert!(matches!(result, Err(AppError::InvalidQuantity(_))));

    // Each line fits on its own but the two together don't
    service
        .add_to_cart("ama", cheap.id, 1 << 60, None)
        .await?;
    let result = service.add_to_cart("ama", cheap.id, 1 << 60, None).await;
    assert!(matches!(result, Err(AppError::InvalidQuantity(_))));

    let cart = service.cart("ama").await?;
    assert_eq!(cart.lines.len(), 1);
    assert_eq!(cart.total, 4 << 60);

    // Far more than any wallet holds, so nothing is charged
    let result = service.place_order("ama").await;
    assert!(matches!(result, Err(AppError::InsufficientFunds { .. })));
    assert_eq!(service.get_balance("ama").await?, 0);

    Ok(())
}

#[tokio::test]
async fn test_filter_orders_by_id_fragment() -> Result<()> {
    let (service, _temp) = test_service().await?;
    StandardAccounts::create(&service).await?;
    StandardAccounts::fund(&service, "ama", 10000).await?;
    let catalog = StandardCatalog::create(&service).await?;

    service
        .add_to_cart("ama", catalog.customer_5gb.id, 1, None)
        .await?;
    let first = service.place_order("ama").await?.order.id;
    service
        .add_to_cart("ama", catalog.customer_5gb.id, 1, None)
        .await?;
    service.place_order("ama").await?;

    let fragment = first.to_string()[..8].to_uppercase();
    let by_id = OrderFilter {
        order_id: Some(fragment),
        ..Default::default()
    };
    let found = service.list_orders("ama", &by_id).await?;
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, first);

    let nothing = OrderFilter {
        order_id: Some("not-an-order".into()),
        ..Default::default()
    };
    assert!(service.list_all_orders(&nothing).await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_status_update_only_applies_from_expected_status() -> Result<()> {
    let (service, temp) = test_service().await?;
    StandardAccounts::create(&service).await?;
    StandardAccounts::fund(&service, "ama", 10000).await?;
    let catalog = StandardCatalog::create(&service).await?;

    service
        .add_to_cart("ama", catalog.customer_5gb.id, 1, None)
        .await?;
    let order_id = service.place_order("ama").await?.order.id;

    let repo = open_repository(&temp).await?;
    assert!(
        repo.update_order_status(order_id, OrderStatus::Pending, OrderStatus::Failed, None)
            .await?
    );
    // A second writer still expecting pending leaves the order alone
    assert!(
        !repo
            .update_order_status(
                order_id,
                OrderStatus::Pending,
                OrderStatus::Processing,
                Some(ApiStatus::Success)
            )
            .await?
    );

    let order = service.get_order(order_id).await?;
    assert_eq!(order.status, OrderStatus::Failed);
    assert_eq!(order.api_status, None);

    Ok(())
}

#[tokio::test]
async fn test_removing_paid_cart_items_keeps_the_rest() -> Result<()> {
    let (service, temp) = test_service().await?;
    StandardAccounts::create(&service).await?;
    let catalog = StandardCatalog::create(&service).await?;
    let account = service.get_account("ama").await?;

    let paid = service
        .add_to_cart("ama", catalog.customer_5gb.id, 1, None)
        .await?;
    let added_later = service
        .add_to_cart("ama", catalog.customer_5gb.id, 2, None)
        .await?;
    let already_gone = service
        .add_to_cart("ama", catalog.customer_5gb.id, 3, None)
        .await?;
    service.remove_from_cart("ama", already_gone.id).await?;

    let repo = open_repository(&temp).await?;
    let mut tx = repo.begin().await?;
    let removed =
        Repository::remove_cart_items(&mut tx, account.id, &[paid.id, already_gone.id]).await?;
    tx.commit().await?;
    assert_eq!(removed, 1);

    let cart = service.cart("ama").await?;
    assert_eq!(cart.lines.len(), 1);
    assert_eq!(cart.lines[0].item.id, added_later.id);

    Ok(())
}

#[tokio::test]
async fn test_service_views_are_debug_printable() -> Result<()> {
    let (service, _temp) = test_service().await?;
    StandardAccounts::create(&service).await?;
    StandardAccounts::fund(&service, "ama", 5000).await?;
    let catalog = StandardCatalog::create(&service).await?;

    let info = service.get_account_info("ama").await?;
    assert!(format!("{:?}", info).contains("\"ama\""));

    service
        .add_to_cart("ama", catalog.customer_5gb.id, 1, Some("0241234567".into()))
        .await?;
    let cart = service.cart("ama").await?;
    assert!(format!("{:?}", cart).contains("0241234567"));

    let placed = service.place_order("ama").await?;
    let printed = format!("{:?}", placed);
    assert!(printed.contains(&placed.order.id.to_string()));
    assert!(printed.contains("balance_after: 2500"));

    Ok(())
}
