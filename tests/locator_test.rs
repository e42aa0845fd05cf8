mod common;

use assert_matches::assert_matches;
use mediaflow::locators::LocatorCache;
use mediaflow_common::Error;

use common::TestHarness;

#[tokio::test]
async fn streaming_grant_is_reused_across_runs() {
    let harness = TestHarness::new();
    let engine = harness.engine();

    let mut asset = engine.create_asset("video.mp4").await.unwrap();
    asset.streamable = true;
    engine.persist_asset(&asset).await.unwrap();

    let cache = LocatorCache::new(engine);
    let first = cache.streaming_locator(&asset).await.unwrap();
    let second = cache.streaming_locator(&asset).await.unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(first.base_uri, second.base_uri);
}

#[tokio::test]
async fn sas_grant_is_reused_across_runs() {
    let harness = TestHarness::new();
    let engine = harness.engine();

    let asset = engine.create_asset("thumbs").await.unwrap();

    let cache = LocatorCache::new(engine);
    let first = cache.sas_locator(&asset).await.unwrap();
    let second = cache.sas_locator(&asset).await.unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(
        first.content_access_component,
        second.content_access_component
    );
}

#[tokio::test]
async fn streaming_grant_rejected_for_non_streamable_asset() {
    let harness = TestHarness::new();
    let engine = harness.engine();

    let asset = engine.create_asset("thumbs").await.unwrap();

    let cache = LocatorCache::new(engine);
    let err = cache.streaming_locator(&asset).await.unwrap_err();
    assert_matches!(err, Error::Validation(_));
}

#[tokio::test]
async fn grants_are_backdated() {
    let harness = TestHarness::new();
    let engine = harness.engine();

    let mut asset = engine.create_asset("video.mp4").await.unwrap();
    asset.streamable = true;
    engine.persist_asset(&asset).await.unwrap();

    let cache = LocatorCache::new(engine);
    let locator = cache.streaming_locator(&asset).await.unwrap();

    assert!(locator.start < chrono::Utc::now() - chrono::Duration::minutes(4));
}
