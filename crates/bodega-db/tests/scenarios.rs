//! End-to-end store scenarios: oversell, rate snapshots, ledger balance,
//! permission gates, reset tokens and report bucketing.

mod common;

use bodega_core::{Currency, ErrorKind, MovementKind, PermissionToken};
use bodega_db::DbError;
use chrono::{Duration, NaiveDate};

use common::*;

fn may_first() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
}

// =============================================================================
// Oversell prevention
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_sales_cannot_oversell() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bodega.db");

    // two handles on one file, as two terminals would have
    let first = file_store(&path).await;
    let shop = Shop::open(&first, &["ventas_crear"]).await;
    shop.deliver(&first, "1", 10, 100).await;
    assert_eq!(first.kardex().current_stock(shop.article_id).await.unwrap(), 10);

    let second = file_store(&path).await;
    let root = root_session();

    let sale_a = first.sales();
    let sale_b = second.sales();
    let (root_a, root_b) = (root.clone(), root.clone());
    let input_a = shop.ticket("1", 7, 500, 16.0, Currency::Ves);
    let input_b = shop.ticket("2", 7, 500, 16.0, Currency::Ves);

    let a = tokio::spawn(async move { sale_a.record_sale(&root_a, input_a).await });
    let b = tokio::spawn(async move { sale_b.record_sale(&root_b, input_b).await });
    let results: Vec<Result<i64, DbError>> = vec![a.await.unwrap(), b.await.unwrap()];

    let committed = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(committed, 1);

    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        assert!(
            matches!(err.kind(), ErrorKind::StockWouldGoNegative | ErrorKind::ConflictRetry),
            "unexpected failure: {}",
            err
        );
    }

    assert_eq!(first.kardex().current_stock(shop.article_id).await.unwrap(), 3);
    assert!(first.kardex().verify_ledger(shop.article_id).await.unwrap());
}

#[tokio::test]
async fn selling_exactly_the_stock_succeeds() {
    let (db, _clock) = memory_store_at(may_first_noon()).await;
    let shop = Shop::open(&db, &[]).await;
    let root = root_session();
    shop.deliver(&db, "1", 5, 100).await;

    let err = db
        .sales()
        .record_sale(&root, shop.ticket("1", 6, 500, 16.0, Currency::Ves))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StockWouldGoNegative);

    db.sales()
        .record_sale(&root, shop.ticket("2", 5, 500, 16.0, Currency::Ves))
        .await
        .unwrap();
    assert_eq!(db.kardex().current_stock(shop.article_id).await.unwrap(), 0);
}

// =============================================================================
// Rate snapshot
// =============================================================================

#[tokio::test]
async fn sale_keeps_the_rate_it_was_sold_at() {
    let (db, clock) = memory_store_at(may_first_noon()).await;
    let shop = Shop::open(&db, &[]).await;
    let root = root_session();
    shop.deliver(&db, "1", 10, 100).await;

    db.rates().record_rate(&root, "BCV", Currency::Usd, 60.0, None).await.unwrap();
    clock.advance(Duration::minutes(5));

    let sale_id = db
        .sales()
        .record_sale(&root, shop.ticket("1", 1, 500, 16.0, Currency::Usd))
        .await
        .unwrap();
    clock.advance(Duration::minutes(5));

    db.rates().record_rate(&root, "BCV", Currency::Usd, 80.0, None).await.unwrap();

    let sale = db.sales().get_sale(sale_id).await.unwrap();
    assert_eq!(sale.snapshot_rate, 60.0);
    assert_eq!(sale.sale_ccy, Currency::Usd);

    let totals = db.sales().sale_totals(sale_id).await.unwrap();
    assert_eq!(totals.total_sale_ccy.cents(), 580);
    assert_eq!(totals.total_base_ccy.cents(), 34_800);

    let latest = db.rates().latest_rate(Currency::Usd).await.unwrap().unwrap();
    assert_eq!(latest.rate, 80.0);
}

#[tokio::test]
async fn rate_boundaries() {
    let (db, _clock) = memory_store_at(may_first_noon()).await;
    let root = root_session();

    let err = db.rates().record_rate(&root, "BCV", Currency::Usd, 0.0, None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    db.rates()
        .record_rate(&root, "BCV", Currency::Usd, f64::MIN_POSITIVE, None)
        .await
        .unwrap();
}

// =============================================================================
// Ledger invariant
// =============================================================================

#[tokio::test]
async fn ledger_running_balance() {
    let (db, _clock) = memory_store_at(may_first_noon()).await;
    let shop = Shop::open(&db, &[]).await;
    let kardex = db.kardex();
    let article = shop.article_id;

    kardex.post_movement(article, MovementKind::In, 10, "I1", None).await.unwrap();
    kardex.post_movement(article, MovementKind::Out, 3, "S1", None).await.unwrap();
    kardex.post_movement(article, MovementKind::In, 5, "I2", None).await.unwrap();
    kardex.post_movement(article, MovementKind::Out, 2, "S2", None).await.unwrap();

    let mut entries = kardex.movements(article, None).await.unwrap();
    entries.reverse();
    let after: Vec<i64> = entries.iter().map(|e| e.stock_after).collect();
    assert_eq!(after, vec![10, 7, 12, 10]);

    assert_eq!(kardex.current_stock(article).await.unwrap(), 10);
    assert!(kardex.verify_ledger(article).await.unwrap());
}

// =============================================================================
// Permission gate
// =============================================================================

#[tokio::test]
async fn granting_a_token_opens_the_operation() {
    let (db, _clock) = memory_store_at(may_first_noon()).await;
    let shop = Shop::open(&db, &["ventas_ver"]).await;
    shop.deliver(&db, "1", 10, 100).await;

    let mut cashier = db
        .auth()
        .authenticate("carla", PASSWORD, Some("192.168.1.20"))
        .await
        .unwrap();
    let input = shop.ticket("1", 1, 500, 16.0, Currency::Ves);

    let err = db.sales().record_sale(&cashier, input.clone()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    assert_eq!(db.kardex().current_stock(shop.article_id).await.unwrap(), 10);

    let mut root = root_session();
    assert!(db
        .roles()
        .grant_permission(&mut root, shop.role_id, PermissionToken::VentasCrear)
        .await
        .unwrap());
    db.auth().reload_permissions(&mut cashier).await.unwrap();

    let sale_id = db.sales().record_sale(&cashier, input).await.unwrap();

    let trail = db.audit().by_record(&root, "sales", sale_id).await.unwrap();
    assert_eq!(trail.len(), 1);
    assert_eq!(trail[0].actor, "Carla Gómez");
    assert_eq!(trail[0].ip, "192.168.1.20");
}

// =============================================================================
// Reset tokens
// =============================================================================

#[tokio::test]
async fn reset_token_is_one_shot_and_expires() {
    let (db, clock) = memory_store_at(may_first_noon()).await;
    let shop = Shop::open(&db, &[]).await;
    let auth = db.auth();

    let token = auth.issue_reset_token(shop.worker_id).await.unwrap();
    assert_eq!(auth.accept_reset_token(&token).await.unwrap(), shop.worker_id);

    let err = auth.accept_reset_token(&token).await.unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::NotFound | ErrorKind::StateForbidden));

    let fresh = auth.issue_reset_token(shop.worker_id).await.unwrap();
    clock.advance(Duration::minutes(31));
    let err = auth.accept_reset_token(&fresh).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StateForbidden);
}

// =============================================================================
// Report bucketing
// =============================================================================

#[tokio::test]
async fn report_buckets_by_payment_currency() {
    let (db, _clock) = memory_store_at(may_first_noon()).await;
    let shop = Shop::open(&db, &[]).await;
    let root = root_session();
    shop.deliver(&db, "1", 10, 100).await;
    db.rates().record_rate(&root, "BCV", Currency::Usd, 36.5, None).await.unwrap();

    db.sales()
        .record_sale(&root, shop.ticket("1", 1, 10_000, 0.0, Currency::Ves))
        .await
        .unwrap();
    db.sales()
        .record_sale(&root, shop.ticket("2", 1, 500, 0.0, Currency::Usd))
        .await
        .unwrap();

    let report = db.reports().sales_in_range(&root, may_first(), may_first()).await.unwrap();
    assert_eq!(report.total_count, 2);
    assert_eq!(report.sum_by_ccy[&Currency::Ves].cents(), 10_000);
    assert_eq!(report.sum_by_ccy[&Currency::Usd].cents(), 500);
    assert_eq!(report.sum_by_ccy[&Currency::Eur].cents(), 0);
    assert_eq!(report.per_day[&may_first()].count, 2);
}

#[tokio::test]
async fn duplicate_document_number_conflicts() {
    let (db, _clock) = memory_store_at(may_first_noon()).await;
    let shop = Shop::open(&db, &[]).await;
    let root = root_session();
    shop.deliver(&db, "1", 10, 100).await;

    db.sales()
        .record_sale(&root, shop.ticket("7", 1, 500, 16.0, Currency::Ves))
        .await
        .unwrap();
    let err = db
        .sales()
        .record_sale(&root, shop.ticket("7", 1, 500, 16.0, Currency::Ves))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(db.kardex().current_stock(shop.article_id).await.unwrap(), 9);
}
