use serde_json::{Value, json};
use ssverify_core::models::{AD_KIND, Document, Filter, NewDocument};
use ssverify_db::ListingRepository;

use crate::integration::common::setup_test_db;

fn doc(value: Value) -> Document {
    match value {
        Value::Object(map) => map,
        other => panic!("expected object, got {other}"),
    }
}

fn ad(url: &str, price: &str) -> NewDocument {
    NewDocument {
        kind: AD_KIND.into(),
        doc: doc(json!({
            "url": url,
            "address": "Main St 1",
            "price": price,
            "date": "2020-03-05T10:00:00.000Z"
        })),
    }
}

#[tokio::test]
#[ignore = "requires docker"]
async fn insert_and_find_by_kind() {
    let (pool, _container) = setup_test_db().await;
    let repo = ListingRepository::new(pool);

    let id = repo.insert_one(&ad("https://www.ss.com/1", "100")).await.unwrap();
    repo.insert_one(&NewDocument {
        kind: "old_price".into(),
        doc: doc(json!({"ad_id": id.to_string(), "price": "90"})),
    })
    .await
    .unwrap();

    let ads = repo.find(&Filter::Kind(AD_KIND.into())).await.unwrap();
    assert_eq!(ads.len(), 1);
    assert_eq!(ads[0].id, id);
    assert_eq!(ads[0].url(), Some("https://www.ss.com/1"));
    assert_eq!(ads[0].field("price"), Some(&json!("100")));

    let audits = repo.find(&Filter::Kind("old_price".into())).await.unwrap();
    assert_eq!(audits.len(), 1);
    assert_eq!(audits[0].field("ad_id"), Some(&json!(id.to_string())));
}

#[tokio::test]
#[ignore = "requires docker"]
async fn update_merges_fields() {
    let (pool, _container) = setup_test_db().await;
    let repo = ListingRepository::new(pool);

    let id = repo.insert_one(&ad("https://www.ss.com/1", "100")).await.unwrap();
    let matched = repo
        .update_one(&Filter::Id(id), &doc(json!({"price": "120"})))
        .await
        .unwrap();
    assert_eq!(matched, 1);

    let found = repo.find(&Filter::Id(id)).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].field("price"), Some(&json!("120")));
    assert_eq!(found[0].field("address"), Some(&json!("Main St 1")));
}

#[tokio::test]
#[ignore = "requires docker"]
async fn update_of_missing_id_matches_nothing() {
    let (pool, _container) = setup_test_db().await;
    let repo = ListingRepository::new(pool);

    let matched = repo
        .update_one(&Filter::Id(uuid::Uuid::new_v4()), &doc(json!({"price": "1"})))
        .await
        .unwrap();
    assert_eq!(matched, 0);
}

#[tokio::test]
#[ignore = "requires docker"]
async fn insert_many_returns_ids_in_order() {
    let (pool, _container) = setup_test_db().await;
    let repo = ListingRepository::new(pool);

    let docs = vec![
        ad("https://www.ss.com/1", "100"),
        ad("https://www.ss.com/2", "200"),
        ad("https://www.ss.com/3", "300"),
    ];
    let ids = repo.insert_many(&docs).await.unwrap();
    assert_eq!(ids.len(), 3);

    let expected = [
        "https://www.ss.com/1",
        "https://www.ss.com/2",
        "https://www.ss.com/3",
    ];
    for (id, url) in ids.iter().zip(expected) {
        let found = repo.find(&Filter::Id(*id)).await.unwrap();
        assert_eq!(found[0].url(), Some(url));
    }
}
