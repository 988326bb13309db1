mod common;

use common::{CDN, InMemoryRegistrations, InMemoryStore};
use proof_reconciler::{
    models::migration::{MigrationStage, MoveStep},
    services::bucket_migrator::{BucketMigrator, SAMPLE_NAME_LIMIT, Superadmin},
};
use std::sync::{Arc, atomic::Ordering};

const LEGACY: &str = "receipts";
const CANONICAL: &str = "payment-proofs";

fn migrator(store: &Arc<InMemoryStore>, regs: &Arc<InMemoryRegistrations>) -> BucketMigrator {
    BucketMigrator::new(store.clone(), regs.clone(), vec!["receipts".to_string()])
}

#[tokio::test]
async fn moves_receipts_and_repairs_registrations() {
    let store = Arc::new(InMemoryStore::new());
    store.put(LEGACY, "receipt-ALM-ABC123-XYZ-1700000000.pdf", Some(1));
    store.put(LEGACY, "receipts/receipt-ALM-2-1700000001.png", Some(2));
    store.put(LEGACY, "avatar.png", Some(3));
    let regs = Arc::new(InMemoryRegistrations::with_rows(&[
        (
            "ALM-ABC123-XYZ",
            "https://old.test/receipts/receipt-ALM-ABC123-XYZ-1700000000.pdf",
        ),
        (
            "ALM-2",
            "https://old.test/receipts/receipts/receipt-ALM-2-1700000001.png",
        ),
        ("ALM-3", "https://old.test/receipts/receipt-ALM-3-1.pdf"),
    ]));

    let report = migrator(&store, &regs)
        .migrate(&Superadmin::vouched(), LEGACY, CANONICAL)
        .await
        .unwrap();

    assert_eq!(report.scanned, 3);
    assert_eq!(report.matched, 2);
    assert_eq!(report.copied, 2);
    assert_eq!(report.deleted, 2);
    assert_eq!(report.records_updated, 2);
    assert!(report.errors.is_empty());

    assert_eq!(store.paths(LEGACY), vec!["avatar.png".to_string()]);
    assert_eq!(
        store.paths(CANONICAL),
        vec![
            "receipt-ALM-2-1700000001.png".to_string(),
            "receipt-ALM-ABC123-XYZ-1700000000.pdf".to_string(),
        ]
    );
    assert_eq!(
        store.bytes(CANONICAL, "receipt-ALM-2-1700000001.png").unwrap(),
        "receipts/receipt-ALM-2-1700000001.png"
    );

    assert_eq!(
        regs.url_of("ALM-ABC123-XYZ").as_deref(),
        Some(format!("{CDN}/{CANONICAL}/receipt-ALM-ABC123-XYZ-1700000000.pdf").as_str())
    );
    assert_eq!(
        regs.url_of("ALM-2").as_deref(),
        Some(format!("{CDN}/{CANONICAL}/receipt-ALM-2-1700000001.png").as_str())
    );
    assert_eq!(
        regs.url_of("ALM-3").as_deref(),
        Some("https://old.test/receipts/receipt-ALM-3-1.pdf")
    );

    let ids: Vec<_> = report.moved.iter().map(|m| m.application_id.as_str()).collect();
    assert!(ids.contains(&"ALM-ABC123-XYZ"));
    assert!(ids.contains(&"ALM-2"));
}

#[tokio::test]
async fn second_run_finds_nothing_to_do() {
    let store = Arc::new(InMemoryStore::new());
    store.put(LEGACY, "receipt-ALM-1-1.pdf", Some(1));
    store.put(LEGACY, "receipts/receipt-ALM-2-2.pdf", Some(1));
    store.put(LEGACY, "notes.txt", Some(1));
    let regs = Arc::new(InMemoryRegistrations::default());
    let m = migrator(&store, &regs);

    let first = m
        .migrate(&Superadmin::vouched(), LEGACY, CANONICAL)
        .await
        .unwrap();
    assert_eq!(first.copied, 2);

    let canonical_before = store.paths(CANONICAL);
    let second = m
        .migrate(&Superadmin::vouched(), LEGACY, CANONICAL)
        .await
        .unwrap();
    assert_eq!(second.scanned, 1);
    assert_eq!(second.matched, 0);
    assert_eq!(second.copied, 0);
    assert_eq!(second.deleted, 0);
    assert!(second.errors.is_empty());
    assert_eq!(store.paths(CANONICAL), canonical_before);
}

#[tokio::test]
async fn one_bad_file_does_not_stop_the_batch() {
    let store = Arc::new(InMemoryStore::new());
    store.put(LEGACY, "receipt-A-1.pdf", Some(1));
    store.put(LEGACY, "receipt-B-1.pdf", Some(1));
    store.put(LEGACY, "receipt-C-1.pdf", Some(1));
    store.fail_download_of("receipt-B-1.pdf");
    let regs = Arc::new(InMemoryRegistrations::default());

    let report = migrator(&store, &regs)
        .migrate(&Superadmin::vouched(), LEGACY, CANONICAL)
        .await
        .unwrap();

    assert_eq!(report.copied, 2);
    assert_eq!(report.deleted, 2);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].file, "receipt-B-1.pdf");
    assert_eq!(report.errors[0].stage, MigrationStage::Move);
    assert_eq!(report.errors[0].step, Some(MoveStep::Download));
    let tagged = serde_json::to_value(&report.errors[0]).unwrap();
    assert_eq!(tagged["stage"], "download/upload/remove");

    assert_eq!(store.paths(LEGACY), vec!["receipt-B-1.pdf".to_string()]);
    assert_eq!(
        store.paths(CANONICAL),
        vec!["receipt-A-1.pdf".to_string(), "receipt-C-1.pdf".to_string()]
    );
}

#[tokio::test]
async fn database_failure_keeps_the_storage_move() {
    let store = Arc::new(InMemoryStore::new());
    store.put(LEGACY, "receipt-A-1.pdf", Some(1));
    let regs = Arc::new(InMemoryRegistrations::with_rows(&[(
        "A",
        "https://old.test/receipts/receipt-A-1.pdf",
    )]));
    regs.fail.store(true, Ordering::SeqCst);

    let report = migrator(&store, &regs)
        .migrate(&Superadmin::vouched(), LEGACY, CANONICAL)
        .await
        .unwrap();

    assert_eq!(report.copied, 1);
    assert_eq!(report.deleted, 1);
    assert_eq!(report.records_updated, 0);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].stage, MigrationStage::DbUpdate);
    assert_eq!(report.errors[0].step, None);
    assert!(store.paths(LEGACY).is_empty());
    assert_eq!(store.paths(CANONICAL), vec!["receipt-A-1.pdf".to_string()]);

    // once the database is back, a rerun cannot repair what is no longer
    // in the legacy bucket, but it also must not break anything
    regs.fail.store(false, Ordering::SeqCst);
    let rerun = migrator(&store, &regs)
        .migrate(&Superadmin::vouched(), LEGACY, CANONICAL)
        .await
        .unwrap();
    assert_eq!(rerun.scanned, 0);
    assert!(rerun.errors.is_empty());
}

#[tokio::test]
async fn private_canonical_bucket_is_reported_not_hidden() {
    let store = Arc::new(InMemoryStore::new());
    store.put(LEGACY, "receipt-A-1.pdf", Some(1));
    store.put(CANONICAL, "placeholder.txt", Some(1));
    store.make_private(CANONICAL);
    let regs = Arc::new(InMemoryRegistrations::with_rows(&[(
        "A",
        "https://old.test/receipts/receipt-A-1.pdf",
    )]));

    let report = migrator(&store, &regs)
        .migrate(&Superadmin::vouched(), LEGACY, CANONICAL)
        .await
        .unwrap();

    assert_eq!(report.copied, 1);
    assert_eq!(report.deleted, 1);
    assert_eq!(report.records_updated, 0);
    assert!(report.moved.is_empty());
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].file, "receipt-A-1.pdf");
    assert_eq!(report.errors[0].stage, MigrationStage::PublicUrl);
    assert!(report.errors[0].message.contains("receipt-A-1.pdf"));
    assert_eq!(
        regs.url_of("A").as_deref(),
        Some("https://old.test/receipts/receipt-A-1.pdf")
    );
}

#[tokio::test]
async fn loose_receipt_names_are_picked_up() {
    let store = Arc::new(InMemoryStore::new());
    store.put(LEGACY, "Payment_Receipt_Final.PDF", Some(1));
    store.put(LEGACY, "receipt-notes.docx", Some(1));
    store.put(LEGACY, "my-receipt.docx", Some(1));
    let regs = Arc::new(InMemoryRegistrations::default());

    let report = migrator(&store, &regs)
        .migrate(&Superadmin::vouched(), LEGACY, CANONICAL)
        .await
        .unwrap();

    assert_eq!(report.matched, 2);
    assert_eq!(store.paths(LEGACY), vec!["my-receipt.docx".to_string()]);
}

#[tokio::test]
async fn sample_names_are_capped() {
    let store = Arc::new(InMemoryStore::new());
    for i in 0..(SAMPLE_NAME_LIMIT + 20) {
        store.put(LEGACY, &format!("photo-{i:03}.png"), Some(1));
    }
    let regs = Arc::new(InMemoryRegistrations::default());

    let report = migrator(&store, &regs)
        .migrate(&Superadmin::vouched(), LEGACY, CANONICAL)
        .await
        .unwrap();

    assert_eq!(report.scanned, SAMPLE_NAME_LIMIT + 20);
    assert_eq!(report.sample_names.len(), SAMPLE_NAME_LIMIT);
    assert_eq!(report.matched, 0);
}

#[tokio::test]
async fn unreachable_legacy_bucket_fails_the_run() {
    let store = Arc::new(InMemoryStore::new());
    store.put(LEGACY, "receipt-A-1.pdf", Some(1));
    store.fail_everything.store(true, Ordering::SeqCst);
    let regs = Arc::new(InMemoryRegistrations::default());

    let result = migrator(&store, &regs)
        .migrate(&Superadmin::vouched(), LEGACY, CANONICAL)
        .await;
    assert!(result.is_err());

    store.fail_everything.store(false, Ordering::SeqCst);
    assert_eq!(store.paths(LEGACY), vec!["receipt-A-1.pdf".to_string()]);
}

#[tokio::test]
async fn same_bucket_is_rejected() {
    let store = Arc::new(InMemoryStore::new());
    store.put(LEGACY, "receipt-A-1.pdf", Some(1));
    let regs = Arc::new(InMemoryRegistrations::default());

    let result = migrator(&store, &regs)
        .migrate(&Superadmin::vouched(), LEGACY, LEGACY)
        .await;
    assert!(result.is_err());
    assert_eq!(store.paths(LEGACY), vec!["receipt-A-1.pdf".to_string()]);
}
