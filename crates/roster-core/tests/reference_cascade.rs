//! Dependent lookup pools under parent changes and racing fetches.

mod support;

use std::sync::Arc;
use std::time::Duration;

use roster_core::config::ReferenceConfig;
use roster_core::error::ReferenceError;
use roster_core::model::{PoolKind, ReferenceId};
use roster_core::reference::ReferenceCache;
use support::Lookups;
use tokio::time::sleep;

fn cache(lookups: &Arc<Lookups>) -> Arc<ReferenceCache> {
    Arc::new(ReferenceCache::new(
        Arc::clone(lookups) as Arc<dyn roster_core::api::ReferenceSource>,
        &ReferenceConfig::default(),
    ))
}

fn assert_consistent(cache: &ReferenceCache, kind: PoolKind) {
    let snapshot = cache.snapshot(kind);
    assert_eq!(snapshot.parent, cache.selected_parent(kind));
    for node in &snapshot.nodes {
        assert_eq!(
            node.parent_id, snapshot.parent,
            "{kind} {} belongs to {:?} but pool is scoped to {:?}",
            node.id, node.parent_id, snapshot.parent
        );
    }
}

#[tokio::test(start_paused = true)]
async fn late_result_for_previous_business_function_is_dropped() {
    let lookups = Lookups::new();
    lookups.set_latency(1, 500);
    lookups.set_latency(2, 50);
    let cache = cache(&lookups);

    let for_a = tokio::spawn({
        let cache = Arc::clone(&cache);
        async move { cache.fetch_children(PoolKind::Department, ReferenceId(1)).await }
    });
    sleep(Duration::from_millis(10)).await;

    let b = cache
        .fetch_children(PoolKind::Department, ReferenceId(2))
        .await
        .expect("departments of B");
    let ids: Vec<u64> = b.nodes.iter().map(|n| n.id.0).collect();
    assert_eq!(ids, vec![21, 22]);

    let late = for_a.await.expect("join").expect("fetch");
    assert_eq!(late.parent, Some(ReferenceId(2)));
    assert!(late.nodes.iter().all(|n| n.parent_id == Some(ReferenceId(2))));

    let current = cache.snapshot(PoolKind::Department);
    assert_eq!(current.nodes, b.nodes);
    assert_consistent(&cache, PoolKind::Department);
}

#[tokio::test(start_paused = true)]
async fn pool_is_cleared_before_the_new_fetch_lands() {
    let lookups = Lookups::new();
    lookups.set_latency(2, 300);
    let cache = cache(&lookups);
    cache
        .fetch_children(PoolKind::Department, ReferenceId(1))
        .await
        .expect("departments of A");

    let switching = tokio::spawn({
        let cache = Arc::clone(&cache);
        async move { cache.fetch_children(PoolKind::Department, ReferenceId(2)).await }
    });
    sleep(Duration::from_millis(1)).await;

    let mid_flight = cache.snapshot(PoolKind::Department);
    assert_eq!(mid_flight.parent, Some(ReferenceId(2)));
    assert!(mid_flight.nodes.is_empty());

    switching.await.expect("join").expect("fetch");
    assert_eq!(cache.snapshot(PoolKind::Department).nodes.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn switching_a_b_a_never_mixes_parents() {
    let lookups = Lookups::new();
    lookups.set_latency(1, 120);
    lookups.set_latency(2, 40);
    let cache = cache(&lookups);

    let mut handles = Vec::new();
    for (delay, parent) in [(0, 1), (20, 2), (50, 1)] {
        let cache = Arc::clone(&cache);
        handles.push(tokio::spawn(async move {
            sleep(Duration::from_millis(delay)).await;
            cache
                .fetch_children(PoolKind::Department, ReferenceId(parent))
                .await
        }));
    }

    for _ in 0..60 {
        assert_consistent(&cache, PoolKind::Department);
        sleep(Duration::from_millis(5)).await;
    }
    for handle in handles {
        handle.await.expect("join").expect("fetch");
    }

    let final_pool = cache.snapshot(PoolKind::Department);
    assert_eq!(final_pool.parent, Some(ReferenceId(1)));
    let ids: Vec<u64> = final_pool.nodes.iter().map(|n| n.id.0).collect();
    assert_eq!(ids, vec![11, 12]);
}

#[tokio::test(start_paused = true)]
async fn clearing_business_function_clears_units() {
    let cache = cache(&Lookups::new());
    cache
        .fetch_children(PoolKind::Department, ReferenceId(1))
        .await
        .expect("departments");
    cache
        .fetch_children(PoolKind::Unit, ReferenceId(11))
        .await
        .expect("units");
    assert_eq!(cache.snapshot(PoolKind::Unit).nodes.len(), 2);

    assert!(cache.select_parent(PoolKind::Department, None));
    assert!(cache.snapshot(PoolKind::Department).nodes.is_empty());
    let units = cache.snapshot(PoolKind::Unit);
    assert!(units.nodes.is_empty());
    assert_eq!(units.parent, None);

    let empty = cache.fetch_all(PoolKind::Department).await.expect("no parent");
    assert!(empty.nodes.is_empty());
}

#[tokio::test(start_paused = true)]
async fn stale_form_selection_is_rejected_after_parent_change() {
    let cache = cache(&Lookups::new());
    cache
        .fetch_children(PoolKind::Department, ReferenceId(1))
        .await
        .expect("departments of A");
    assert!(cache.is_valid(PoolKind::Department, ReferenceId(11), Some(ReferenceId(1))));

    cache
        .fetch_children(PoolKind::Department, ReferenceId(2))
        .await
        .expect("departments of B");
    assert_eq!(
        cache.validate(PoolKind::Department, ReferenceId(11), Some(ReferenceId(1))),
        Err(ReferenceError::Unknown {
            kind: PoolKind::Department,
            id: ReferenceId(11)
        })
    );
    assert!(cache.is_valid(PoolKind::Department, ReferenceId(21), Some(ReferenceId(2))));
}

#[tokio::test(start_paused = true)]
async fn root_pools_are_shared_between_consumers() {
    let lookups = Lookups::new();
    let cache = cache(&lookups);
    cache.preload_roots().await.expect("preload");
    let roots = lookups.calls().len();
    assert_eq!(roots, 5);

    let (a, b) = tokio::join!(
        cache.fetch_all(PoolKind::BusinessFunction),
        cache.fetch_all(PoolKind::BusinessFunction)
    );
    let (a, b) = (a.expect("fetch"), b.expect("fetch"));
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(lookups.calls().len(), roots);

    cache.invalidate_all();
    cache.fetch_all(PoolKind::BusinessFunction).await.expect("refetch");
    assert_eq!(lookups.calls().len(), roots + 1);
}
