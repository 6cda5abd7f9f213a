/// Fault injection tests
///
/// Run with: cargo test --test fault_injection_tests

mod common;

use common::{Order, Record, orders_by_tenant, records};
use docrepo::prelude::*;
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

#[tokio::test]
async fn test_injected_get_failure_carries_status_and_message() {
    let repo = records().await;
    repo.add(Record::new("hot", "x"), RequestOptions::new()).await.unwrap();
    repo.add(Record::new("cold", "y"), RequestOptions::new()).await.unwrap();

    repo.faults()
        .fail_get(|id| id == "hot", StatusCode::TOO_MANY_REQUESTS, Some("request rate is large"))
        .await;

    let err = repo.get("hot", RequestOptions::new()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Injected);
    assert_eq!(err.status_code(), StatusCode(429));
    assert_eq!(
        err,
        RepositoryError::Injected { status: StatusCode::TOO_MANY_REQUESTS, message: "request rate is large".into() }
    );

    assert!(repo.get("cold", RequestOptions::new()).await.unwrap().is_some());

    // Entity-addressed reads go through the same check.
    assert!(repo.get_entity(&Record::new("hot", ""), RequestOptions::new()).await.is_err());

    repo.faults().clear_get().await;
    assert!(repo.get("hot", RequestOptions::new()).await.unwrap().is_some());
}

#[tokio::test]
async fn test_injected_add_failure_leaves_the_store_untouched() {
    let repo = orders_by_tenant().await;

    repo.faults()
        .fail_add(|order: &Order| order.total > 100, StatusCode::SERVICE_UNAVAILABLE, None)
        .await;

    let err = repo.add(Order::new("acme", "open", 500), RequestOptions::new()).await.unwrap_err();
    assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(repo.is_empty().await);

    repo.add(Order::new("acme", "open", 50), RequestOptions::new()).await.unwrap();
    assert_eq!(repo.len().await, 1);

    // Other writes are not affected by an add fault.
    repo.upsert(Order::new("acme", "open", 500), RequestOptions::new()).await.unwrap();
    assert_eq!(repo.len().await, 2);
}

#[tokio::test]
async fn test_count_can_fail_transiently() {
    let repo = records().await;
    repo.add(Record::new("a", "x"), RequestOptions::new()).await.unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&calls);
    repo.faults()
        .fail_count(move || seen.fetch_add(1, Ordering::SeqCst) < 2, StatusCode::REQUEST_TIMEOUT, Some("timed out"))
        .await;

    // A caller retrying until success observes two timeouts first.
    let mut attempts = 0;
    let count = loop {
        attempts += 1;
        match repo.count(Query::new(), FeedOptions::new()).await {
            Ok(count) => break count,
            Err(err) => assert_eq!(err.status_code(), StatusCode::REQUEST_TIMEOUT),
        }
    };

    assert_eq!((count, attempts), (1, 3));

    repo.faults().clear_all().await;
    assert_eq!(repo.count(Query::new(), FeedOptions::new()).await.unwrap(), 1);
}

#[tokio::test]
async fn test_clones_share_fault_registrations() {
    let repo = records().await;
    let clone = repo.clone();

    clone.faults().fail_get(|_| true, 500u16, None).await;

    let err = repo.get("anything", RequestOptions::new()).await.unwrap_err();
    assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(err.to_string(), "Injected failure (500): injected get failure");

    repo.faults().clear_get().await;
    assert!(clone.get("anything", RequestOptions::new()).await.unwrap().is_none());
}
