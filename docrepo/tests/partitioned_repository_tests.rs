/// Partitioned store tests
///
/// Partition isolation, key resolution, cross-partition reads and paging.
/// Run with: cargo test --test partitioned_repository_tests

mod common;

use common::{Order, orders_by_tenant};
use docrepo::{memory::InMemoryPartitionedRepository, prelude::*};

#[tokio::test]
async fn test_same_id_in_different_partitions() {
    let repo = orders_by_tenant().await;

    let acme = repo.add(Order::new("acme", "open", 1).with_id("o1"), RequestOptions::new()).await.unwrap();
    let globex = repo.add(Order::new("globex", "open", 2).with_id("o1"), RequestOptions::new()).await.unwrap();
    assert_ne!(acme.etag, globex.etag);

    let err = repo.add(Order::new("acme", "open", 3).with_id("o1"), RequestOptions::new()).await.unwrap_err();
    assert!(err.is_conflict());

    let from_acme = repo.get("o1", RequestOptions::partition("acme")).await.unwrap().unwrap();
    let from_globex = repo.get("o1", RequestOptions::partition("globex")).await.unwrap().unwrap();
    assert_eq!(from_acme.total, 1);
    assert_eq!(from_globex.total, 2);

    // Writes in one partition leave the other untouched.
    repo.replace(Order { total: 10, ..from_acme }, RequestOptions::new()).await.unwrap();
    assert!(repo.delete("o1", RequestOptions::partition("globex")).await.unwrap());

    assert_eq!(repo.get("o1", RequestOptions::partition("acme")).await.unwrap().unwrap().total, 10);
    assert_eq!(repo.partitions().await, vec![PartitionKey::from("acme")]);
}

#[tokio::test]
async fn test_partition_key_is_required_without_a_selector() {
    let repo = InMemoryPartitionedRepository::<Order>::builder()
        .collection_name("orders")
        .build()
        .await
        .unwrap();

    let err = repo.add(Order::new("acme", "open", 1), RequestOptions::new()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidOperation);

    let stored = repo.add(Order::new("acme", "open", 1), RequestOptions::partition("acme")).await.unwrap();

    let err = repo.get(stored.id(), RequestOptions::new()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidOperation);

    let err = repo.find(Query::new(), FeedOptions::new()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidOperation);

    let err = repo.count(Query::new(), FeedOptions::new().with_max_item_count(10)).await.unwrap_err();
    assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);

    assert_eq!(repo.count(Query::new(), FeedOptions::partition("acme")).await.unwrap(), 1);
}

#[tokio::test]
async fn test_delete_in_missing_partition_is_not_found() {
    let repo = orders_by_tenant().await;

    let err = repo.delete("o1", RequestOptions::partition("never")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(err.status_code(), StatusCode::NOT_FOUND);

    let err = repo
        .delete_entity(&Order::new("never", "open", 1).with_id("o1"), RequestOptions::new())
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    repo.add(Order::new("acme", "open", 1).with_id("o1"), RequestOptions::new()).await.unwrap();
    assert!(!repo.delete("o2", RequestOptions::partition("acme")).await.unwrap());
    assert!(repo.delete("o1", RequestOptions::partition("acme")).await.unwrap());

    // The partition disappeared with its last item.
    assert!(repo.is_empty().await);
    let err = repo.delete("o1", RequestOptions::partition("acme")).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_stale_etags_within_a_partition() {
    let repo = orders_by_tenant().await;

    let e0 = repo.add(Order::new("acme", "open", 1).with_id("o1"), RequestOptions::new()).await.unwrap();
    let e1 = repo.upsert(Order { status: "paid".into(), ..e0.clone() }, RequestOptions::new()).await.unwrap();
    assert_ne!(e0.etag, e1.etag);

    let err = repo.replace(e0.clone(), RequestOptions::new()).await.unwrap_err();
    assert_eq!(err.status_code(), StatusCode::PRECONDITION_FAILED);

    let err = repo.delete_entity(&e0, RequestOptions::new()).await.unwrap_err();
    assert!(err.is_precondition_failed());

    let metadata = repo.metadata("o1", RequestOptions::partition("acme")).await.unwrap().unwrap();
    assert_eq!(Some(metadata.etag), e1.etag);

    assert!(repo.delete_entity(&e1, RequestOptions::new()).await.unwrap());
}

#[tokio::test]
async fn test_cross_partition_reads_flatten_every_bucket() {
    let repo = orders_by_tenant().await;

    for (tenant, id, total) in [("globex", "g1", 5), ("acme", "a1", 7), ("acme", "a2", 3), ("initech", "i1", 9)] {
        repo.add(Order::new(tenant, "open", total).with_id(id), RequestOptions::new()).await.unwrap();
    }

    let ids = repo
        .select(Query::new(), |o: Order| o.order_id.unwrap_or_default(), FeedOptions::cross_partition())
        .await
        .unwrap();
    assert_eq!(ids, vec!["a1", "a2", "g1", "i1"]);

    let ordered = repo
        .select(
            Query::builder().order_by(|o: &Order| o.total).build(),
            |o: Order| o.total,
            FeedOptions::cross_partition(),
        )
        .await
        .unwrap();
    assert_eq!(ordered, vec![3, 5, 7, 9]);

    // A key narrows the read even with the cross-partition flag set.
    let acme = repo
        .count(Query::new(), FeedOptions::partition("acme").with_cross_partition_query(true))
        .await
        .unwrap();
    assert_eq!(acme, 2);
}

#[tokio::test]
async fn test_paging_round_trip() {
    let repo = orders_by_tenant().await;
    let n = 23;
    let page_size = 5;

    for i in 0..n {
        repo.add(Order::new("acme", "open", i).with_id(&format!("o{i:02}")), RequestOptions::new())
            .await
            .unwrap();
    }

    let everything = repo.find(Query::new(), FeedOptions::partition("acme")).await.unwrap();
    assert_eq!(everything.len(), n as usize);

    let mut token = None;
    let mut pages = Vec::new();

    loop {
        let page = repo
            .find_paged(page_size, token, Query::new(), FeedOptions::partition("acme"))
            .await
            .unwrap();
        let next = page.continuation_token.clone();
        pages.push(page);

        match next {
            Some(next) => token = Some(next),
            None => break,
        }
    }

    let n = n as usize;
    assert_eq!(pages.len(), n.div_ceil(page_size));

    let (last, full) = pages.split_last().unwrap();
    assert!(full.iter().all(|page| page.len() == page_size && page.has_more()));
    assert_eq!(last.len(), n % page_size);
    assert!(last.continuation_token.is_none());

    let paged: Vec<Order> = pages.into_iter().flat_map(Page::into_items).collect();
    assert_eq!(paged, everything);
}

#[tokio::test]
async fn test_exact_multiple_ends_with_a_full_page() {
    let repo = orders_by_tenant().await;

    for i in 0..6 {
        repo.add(Order::new("acme", "open", i), RequestOptions::new()).await.unwrap();
    }

    let first = repo.find_paged(3, None, Query::new(), FeedOptions::partition("acme")).await.unwrap();
    let second = repo
        .find_paged(3, first.continuation_token.clone(), Query::new(), FeedOptions::partition("acme"))
        .await
        .unwrap();

    assert_eq!((first.len(), second.len()), (3, 3));
    assert!(first.has_more());
    assert!(!second.has_more());

    let unpaged = repo.find_paged(0, None, Query::new(), FeedOptions::partition("acme")).await.unwrap();
    assert_eq!(unpaged.len(), 6);
    assert!(unpaged.continuation_token.is_none());
}

#[tokio::test]
async fn test_resumed_pages_ignore_later_writes() {
    let repo = orders_by_tenant().await;

    for id in ["a", "b", "c"] {
        repo.add(Order::new("acme", "open", 1).with_id(id), RequestOptions::new()).await.unwrap();
    }

    let first = repo
        .select_paged(2, None, Query::new(), |o: Order| o.order_id, FeedOptions::partition("acme"))
        .await
        .unwrap();

    repo.delete("c", RequestOptions::partition("acme")).await.unwrap();
    repo.add(Order::new("acme", "open", 1).with_id("d"), RequestOptions::new()).await.unwrap();

    let second = repo
        .select_paged(2, first.continuation_token, Query::new(), |o: Order| o.order_id, FeedOptions::partition("acme"))
        .await
        .unwrap();

    assert_eq!(second.items, vec![Some("c".to_string())]);
}
