mod common;

use common::{InMemoryApi, controller, md};
use std::sync::Arc;
use tether_core::{AttrValue, INTERNAL_TAG_KEY, Lifecycle, StateStore};
use tether_retry::CallContext;

#[tokio::test]
async fn test_state_file_format() -> anyhow::Result<()> {
    let api = Arc::new(InMemoryApi::new().with_inherited("owner", "org"));
    let controller = controller(api.clone());
    let ctx = CallContext::background();
    let temp_dir = tempfile::tempdir()?;
    let store = StateStore::new(temp_dir.path());

    let desired = tether_core::DesiredResource::new("zone")
        .with_metadata("site", "nyc")
        .with_attribute("size", AttrValue::Integer(3));
    let state = controller.create(&ctx, &desired).await?;
    store.put("zone.main", state).await?;

    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(store.state_path())?)?;
    let entry = &raw["resources"]["zone.main"];
    assert_eq!(raw["version"], 1);
    assert_eq!(entry["primary_ref"], "ref/1");
    assert_eq!(entry["lifecycle"], "created");
    assert_eq!(entry["user_metadata"], serde_json::json!({ "site": "nyc" }));
    assert_eq!(entry["all_metadata_snapshot"]["owner"], "org");
    assert!(entry["all_metadata_snapshot"][INTERNAL_TAG_KEY].is_string());
    assert_eq!(
        entry["attributes"]["size"],
        serde_json::json!({ "kind": "integer", "value": 3 })
    );
    Ok(())
}

#[tokio::test]
async fn test_relocation_survives_reload() -> anyhow::Result<()> {
    let api = Arc::new(InMemoryApi::new());
    let controller = controller(api.clone());
    let ctx = CallContext::background();
    let temp_dir = tempfile::tempdir()?;

    let desired = tether_core::DesiredResource::new("zone").with_metadata("site", "nyc");
    let state = controller.create(&ctx, &desired).await?;
    StateStore::new(temp_dir.path()).put("zone.main", state).await?;

    api.rotate_ref("ref/1", "ref/2");

    // a later run starts from the file alone
    let store = StateStore::new(temp_dir.path());
    let prior = store.get("zone.main").await?.expect("stored state");
    let refreshed = controller.read(&ctx, &prior).await?.expect("relocated state");
    store.put("zone.main", refreshed).await?;

    let reloaded = StateStore::new(temp_dir.path())
        .get("zone.main")
        .await?
        .expect("stored state");
    assert_eq!(reloaded.primary_ref, "ref/2");
    assert_eq!(reloaded.lifecycle, Lifecycle::Found);
    assert_eq!(reloaded.user_metadata, md(&[("site", "nyc")]));
    assert_eq!(
        reloaded.all_metadata_snapshot[INTERNAL_TAG_KEY],
        prior.all_metadata_snapshot[INTERNAL_TAG_KEY]
    );

    // gone for good: the caller drops it from state
    api.remove("ref/2");
    assert!(controller.read(&ctx, &reloaded).await?.is_none());
    assert!(store.remove("zone.main").await?.is_some());
    assert!(store.load().await?.resources.is_empty());
    Ok(())
}
