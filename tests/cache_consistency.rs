//! Read-through and invalidation behaviour of the cached delivery client.

mod common;

use std::sync::Arc;
use std::time::Duration;

use delivery_cache::cache::{CacheConfig, CacheKey, ChangeKind, Notification, Operation};
use delivery_cache::delivery::{QueryParam, key_params};
use serde_json::json;

use common::{Harness, content_type, item_response, listing_response};

fn article_listing_params() -> Vec<QueryParam> {
    vec![
        QueryParam::depth(1),
        QueryParam::equals("system.type", "article"),
    ]
}

fn item_key(codename: &str) -> CacheKey {
    CacheKey::build(Operation::GetItem, [codename])
}

fn listing_key(params: &[QueryParam]) -> CacheKey {
    CacheKey::build(Operation::GetItems, key_params(params))
}

#[tokio::test]
async fn concurrent_reads_share_one_fetch() {
    let harness = Harness::with_ttl(Duration::from_secs(60));
    harness
        .client
        .respond("items/home", item_response("home", "home", &[]));
    harness.client.close();

    let readers: Vec<_> = (0..16)
        .map(|_| {
            let delivery = harness.delivery.clone();
            tokio::spawn(async move { delivery.get_item("home", &[]).await })
        })
        .collect();

    harness.client.wait_for_calls("items/home", 1).await;
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
    harness.client.open();

    for reader in readers {
        let item = reader.await.expect("reader task").expect("item");
        assert_eq!(item.item.codename(), "home");
    }
    assert_eq!(harness.client.calls("items/home"), 1);
    assert!(harness.delivery.store().contains(&item_key("home")));
}

#[tokio::test]
async fn concurrent_failures_share_one_error_and_are_not_cached() {
    let harness = Harness::with_ttl(Duration::from_secs(60));
    harness.client.close();

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let delivery = harness.delivery.clone();
            tokio::spawn(async move { delivery.get_item("missing", &[]).await })
        })
        .collect();

    harness.client.wait_for_calls("items/missing", 1).await;
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
    harness.client.open();

    for reader in readers {
        let error = reader.await.expect("reader task").expect_err("not found");
        assert!(error.is_not_found());
    }
    assert_eq!(harness.client.calls("items/missing"), 1);
    assert!(harness.delivery.store().is_empty());

    harness
        .client
        .respond("items/missing", item_response("missing", "article", &[]));
    harness
        .delivery
        .get_item("missing", &[])
        .await
        .expect("second attempt fetches again");
    assert_eq!(harness.client.calls("items/missing"), 2);
}

#[tokio::test(start_paused = true)]
async fn entries_expire_after_ttl() {
    let harness = Harness::with_ttl(Duration::from_secs(60));
    harness
        .client
        .respond("items/home", item_response("home", "home", &[]));

    harness.delivery.get_item("home", &[]).await.expect("miss");

    tokio::time::advance(Duration::from_millis(59_900)).await;
    harness.delivery.get_item("home", &[]).await.expect("hit");
    assert_eq!(harness.client.calls("items/home"), 1);

    tokio::time::advance(Duration::from_millis(200)).await;
    assert!(!harness.delivery.store().contains(&item_key("home")));
    harness.delivery.get_item("home", &[]).await.expect("miss");
    assert_eq!(harness.client.calls("items/home"), 2);
}

#[tokio::test]
async fn invalidation_cascades_to_listings_that_embed_the_item() {
    let harness = Harness::with_ttl(Duration::from_secs(60));
    let params = article_listing_params();
    harness.client.respond(
        "items",
        listing_response(&[("a", "article")], &[("a", "article"), ("b", "author")]),
    );
    harness
        .client
        .respond("items/a", item_response("a", "article", &[]));

    harness.delivery.get_items(&params).await.expect("listing");
    harness.delivery.get_item("a", &[]).await.expect("item");

    let store = harness.delivery.store();
    let outcome = harness
        .engine
        .handle(Notification::new("b", ChangeKind::Upserted));
    assert_eq!(outcome.purged_entries, 1);
    assert!(!store.contains(&listing_key(&params)));
    assert!(store.contains(&item_key("a")));

    harness.delivery.get_items(&params).await.expect("listing");
    let outcome = harness
        .engine
        .handle(Notification::new("a", ChangeKind::Upserted));
    assert_eq!(outcome.purged_entries, 2);
    assert!(!store.contains(&listing_key(&params)));
    assert!(!store.contains(&item_key("a")));
}

#[tokio::test]
async fn repeated_and_unknown_invalidations_are_no_ops() {
    let harness = Harness::with_ttl(Duration::from_secs(60));
    harness
        .client
        .respond("items/home", item_response("home", "home", &[]));
    harness
        .client
        .respond("items/about", item_response("about", "page", &[]));

    harness.delivery.get_item("home", &[]).await.expect("home");
    harness.delivery.get_item("about", &[]).await.expect("about");

    let store = harness.delivery.store();
    let first = harness
        .engine
        .handle(Notification::new("home", ChangeKind::Deleted));
    let entries_after_first = store.len();
    let links_after_first = store.index().key_count();

    let second = harness
        .engine
        .handle(Notification::new("home", ChangeKind::Deleted));
    let unknown = harness
        .engine
        .handle(Notification::new("never_cached", ChangeKind::Unpublished));

    assert_eq!(first.purged_entries, 1);
    assert_eq!(second.purged_entries, 0);
    assert_eq!(unknown.purged_entries, 0);
    assert_eq!(store.len(), entries_after_first);
    assert_eq!(store.index().key_count(), links_after_first);
    assert!(store.contains(&item_key("about")));
}

#[tokio::test]
async fn purge_during_fetch_prevents_resurrection() {
    let harness = Harness::with_ttl(Duration::from_secs(60));
    harness
        .client
        .respond("items/home", item_response("home", "home", &[]));
    harness.client.close();

    let reader = {
        let delivery = harness.delivery.clone();
        tokio::spawn(async move { delivery.get_item("home", &[]).await })
    };
    harness.client.wait_for_calls("items/home", 1).await;

    harness
        .engine
        .handle(Notification::new("home", ChangeKind::Upserted));
    harness.client.open();

    let item = reader.await.expect("reader task").expect("waiter still served");
    assert_eq!(item.item.codename(), "home");
    assert!(!harness.delivery.store().contains(&item_key("home")));

    harness.delivery.get_item("home", &[]).await.expect("refetch");
    assert_eq!(harness.client.calls("items/home"), 2);
}

#[tokio::test]
async fn purge_of_embedded_item_during_listing_fetch_discards_listing() {
    let harness = Harness::with_ttl(Duration::from_secs(60));
    let params = article_listing_params();
    harness.client.respond(
        "items",
        listing_response(&[("on_roasts", "article")], &[("cafe_prague", "cafe")]),
    );
    harness.client.close();

    let reader = {
        let delivery = harness.delivery.clone();
        let params = params.clone();
        tokio::spawn(async move { delivery.get_items(&params).await })
    };
    harness.client.wait_for_calls("items", 1).await;

    harness
        .engine
        .handle(Notification::new("cafe_prague", ChangeKind::Upserted));
    harness.client.open();

    reader.await.expect("reader task").expect("listing");
    assert!(!harness.delivery.store().contains(&listing_key(&params)));
}

#[tokio::test]
async fn item_read_hit_then_invalidate() {
    let harness = Harness::with_ttl(Duration::from_secs(60));
    harness
        .client
        .respond("items/home", item_response("home", "home", &[]));

    harness.delivery.get_item("home", &[]).await.expect("miss");
    assert_eq!(harness.client.calls("items/home"), 1);

    harness.delivery.get_item("home", &[]).await.expect("hit");
    assert_eq!(harness.client.calls("items/home"), 1);

    harness
        .engine
        .handle(Notification::new("home", ChangeKind::Published));
    harness.delivery.get_item("home", &[]).await.expect("miss");
    assert_eq!(harness.client.calls("items/home"), 2);
}

#[tokio::test]
async fn listing_is_purged_when_linked_item_changes() {
    let harness = Harness::with_ttl(Duration::from_secs(60));
    let params = article_listing_params();
    harness.client.respond(
        "items",
        listing_response(
            &[("coffee_processing_techniques", "article")],
            &[("cafe-prague", "cafe")],
        ),
    );

    harness.delivery.get_items(&params).await.expect("listing");
    assert!(harness.delivery.store().contains(&listing_key(&params)));

    harness
        .engine
        .handle(Notification::new("cafe-prague", ChangeKind::Upserted));
    assert!(!harness.delivery.store().contains(&listing_key(&params)));
}

#[tokio::test]
async fn unpublish_purges_undigestible_item_lookups() {
    let harness = Harness::with_ttl(Duration::from_secs(60));
    harness
        .client
        .respond("items/home", json!({ "item": { "elements": {} } }));

    harness
        .delivery
        .get_item_json("home", &[QueryParam::depth(2)])
        .await
        .expect("undigestible but cached");
    let key = CacheKey::build(Operation::GetItemJson, ["home", "depth=2"]);
    assert!(harness.delivery.store().contains(&key));

    harness
        .engine
        .handle(Notification::new("home", ChangeKind::Unpublished));
    assert!(!harness.delivery.store().contains(&key));
}

#[tokio::test]
async fn publishing_an_item_purges_listings_of_its_type() {
    let harness = Harness::with_ttl(Duration::from_secs(60));
    let params = article_listing_params();
    harness.client.respond(
        "items",
        listing_response(&[("on_roasts", "article")], &[]),
    );
    harness
        .client
        .respond("items/on_roasts", item_response("on_roasts", "article", &[]));
    harness.delivery.get_items(&params).await.expect("listing");
    harness.delivery.get_item("on_roasts", &[]).await.expect("item");

    let outcome = harness.engine.handle(
        Notification::new("brand_new_article", ChangeKind::Published).with_content_type("article"),
    );
    assert_eq!(outcome.purged_entries, 1);
    assert!(!harness.delivery.store().contains(&listing_key(&params)));
    assert!(harness.delivery.store().contains(&item_key("on_roasts")));
}

#[tokio::test]
async fn schema_change_purges_everything_by_default() {
    let harness = Harness::with_ttl(Duration::from_secs(60));
    harness
        .client
        .respond("items/home", item_response("home", "home", &[]));
    harness.client.respond("types/article", content_type("article"));

    harness.delivery.get_item("home", &[]).await.expect("item");
    harness.delivery.get_type("article").await.expect("type");
    assert_eq!(harness.delivery.store().len(), 2);

    let outcome = harness
        .engine
        .handle(Notification::new("personas", ChangeKind::TaxonomyChanged));
    assert!(outcome.purge_all);
    assert!(harness.delivery.store().is_empty());
    assert_eq!(harness.delivery.store().index().key_count(), 0);
}

#[tokio::test]
async fn partial_schema_purge_targets_group_dependents_and_untyped_entries() {
    let harness = Harness::new(CacheConfig {
        full_purge_on_schema_change: false,
        ..CacheConfig::default()
    });
    let mut tagged = item_response("on_roasts", "article", &[]);
    tagged["item"]["elements"]["personas"] = json!({
        "type": "taxonomy",
        "name": "Personas",
        "taxonomy_group": "personas",
        "value": []
    });
    harness.client.respond("items/on_roasts", tagged);
    harness
        .client
        .respond("items/home", item_response("home", "home", &[]));
    harness
        .client
        .respond("items/legacy", json!({ "item": { "system": { "codename": "legacy" } } }));

    harness.delivery.get_item("on_roasts", &[]).await.expect("tagged");
    harness.delivery.get_item("home", &[]).await.expect("plain");
    harness
        .delivery
        .get_item_json("legacy", &[])
        .await
        .expect("untyped");

    let outcome = harness
        .engine
        .handle(Notification::new("personas", ChangeKind::TaxonomyChanged));
    assert!(!outcome.purge_all);
    assert_eq!(outcome.purged_entries, 2);

    let store = harness.delivery.store();
    assert!(!store.contains(&item_key("on_roasts")));
    assert!(!store.contains(&CacheKey::build(Operation::GetItemJson, ["legacy"])));
    assert!(store.contains(&item_key("home")));
}

#[tokio::test]
async fn type_change_purges_type_lookups_in_partial_mode() {
    let harness = Harness::new(CacheConfig {
        full_purge_on_schema_change: false,
        ..CacheConfig::default()
    });
    harness.client.respond("types/article", content_type("article"));
    harness.client.respond("types/cafe", content_type("cafe"));

    harness.delivery.get_type("article").await.expect("article");
    harness.delivery.get_type("cafe").await.expect("cafe");

    harness
        .engine
        .handle(Notification::new("article", ChangeKind::TypeChanged));

    let store = harness.delivery.store();
    assert!(!store.contains(&CacheKey::build(Operation::GetType, ["article"])));
    assert!(store.contains(&CacheKey::build(Operation::GetType, ["cafe"])));
}

#[tokio::test]
async fn queued_notifications_apply_on_consume() {
    let harness = Harness::with_ttl(Duration::from_secs(60));
    harness
        .client
        .respond("items/home", item_response("home", "home", &[]));
    harness.delivery.get_item("home", &[]).await.expect("item");

    let notification = Notification::new("home", ChangeKind::Upserted);
    harness.engine.enqueue(notification.clone());
    harness.engine.enqueue(notification);
    assert!(harness.delivery.store().contains(&item_key("home")));

    let outcome = harness.engine.consume().expect("batch");
    assert_eq!(outcome.notifications, 1);
    assert_eq!(outcome.purged_entries, 1);
    assert!(harness.engine.consume().is_none());
}

#[tokio::test]
async fn typed_and_raw_reads_do_not_share_entries() {
    #[derive(Debug, serde::Deserialize)]
    struct Headline {
        item: HeadlineItem,
    }
    #[derive(Debug, serde::Deserialize)]
    struct HeadlineItem {
        system: HeadlineSystem,
    }
    #[derive(Debug, serde::Deserialize)]
    struct HeadlineSystem {
        name: String,
    }

    let harness = Harness::with_ttl(Duration::from_secs(60));
    harness
        .client
        .respond("items/home", item_response("home", "home", &[]));

    let raw = harness.delivery.get_item_json("home", &[]).await.expect("raw");
    let typed: Arc<Headline> = harness
        .delivery
        .get_item_as("home", &[])
        .await
        .expect("typed");

    assert_eq!(raw["item"]["system"]["codename"], "home");
    assert_eq!(typed.item.system.name, "home");
    assert_eq!(harness.client.calls("items/home"), 2);
    assert_eq!(harness.delivery.store().len(), 2);

    harness
        .engine
        .handle(Notification::new("home", ChangeKind::Upserted));
    assert!(harness.delivery.store().is_empty());
}
