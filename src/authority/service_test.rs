use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::timeout;

use super::*;
use crate::decode_event;
use crate::AuthorityConfig;
use crate::BroadcastChannel;
use crate::ChangeEvent;
use crate::Channel;
use crate::ChannelConfig;
use crate::ChannelError;
use crate::Delivery;
use crate::Error;
use crate::MockChannel;
use crate::StoreError;
use crate::Subscription;

struct Harness {
    service: FlagService,
    subscription: Subscription,
    _shutdown: watch::Sender<()>,
}

async fn harness_with_store(store: Arc<dyn FlagStore>) -> Harness {
    let channel = Arc::new(BroadcastChannel::new(&ChannelConfig::default()));
    let subscription = channel.subscribe().await.unwrap();
    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let (publisher, _) = Publisher::start(channel, &AuthorityConfig::default(), shutdown_rx);
    Harness {
        service: FlagService::new(store, publisher),
        subscription,
        _shutdown: shutdown_tx,
    }
}

async fn harness() -> Harness {
    harness_with_store(Arc::new(MemFlagStore::new())).await
}

impl Harness {
    async fn next_event(&mut self) -> ChangeEvent {
        match timeout(Duration::from_secs(1), self.subscription.next()).await {
            Ok(Some(Delivery::Message(payload))) => decode_event(&payload).unwrap(),
            other => panic!("expected an event, got {other:?}"),
        }
    }

    async fn assert_no_event(&mut self) {
        assert!(timeout(Duration::from_millis(50), self.subscription.next()).await.is_err());
    }
}

#[tokio::test]
async fn test_create_emits_created() {
    let mut h = harness().await;

    let flag = h.service.create(FlagRequest::new("dark_mode", true)).unwrap();

    assert_eq!(flag.name, "dark_mode");
    assert!(flag.enabled);
    assert_eq!(h.next_event().await, ChangeEvent::created("dark_mode", true));
}

#[tokio::test]
async fn test_duplicate_create_fails_without_event() {
    let mut h = harness().await;
    h.service.create(FlagRequest::new("dark_mode", true)).unwrap();
    h.next_event().await;

    let result = h.service.create(FlagRequest::new("dark_mode", false));

    assert!(matches!(result, Err(Error::Store(StoreError::Duplicate(_)))));
    h.assert_no_event().await;
}

#[tokio::test]
async fn test_blank_name_is_rejected_without_event() {
    let mut h = harness().await;

    let result = h.service.create(FlagRequest::new(" ", true));

    assert!(matches!(result, Err(Error::Store(StoreError::Validation(_)))));
    h.assert_no_event().await;
}

#[tokio::test]
async fn test_toggle_flips_and_emits_updated() {
    let mut h = harness().await;
    let flag = h.service.create(FlagRequest::new("maintenance_mode", false)).unwrap();
    h.next_event().await;

    let toggled = h.service.toggle(flag.id).unwrap();
    let back = h.service.toggle(flag.id).unwrap();

    assert!(toggled.enabled);
    assert!(!back.enabled);
    assert_eq!(h.next_event().await, ChangeEvent::updated("maintenance_mode", true));
    assert_eq!(h.next_event().await, ChangeEvent::updated("maintenance_mode", false));
}

#[tokio::test]
async fn test_update_with_rename_emits_update_then_delete_of_old_name() {
    let mut h = harness().await;
    let flag = h.service.create(FlagRequest::new("dark_mode", false)).unwrap();
    h.next_event().await;

    let updated = h
        .service
        .update(flag.id, FlagRequest::new("night_mode", true).with_description("renamed"))
        .unwrap();

    assert_eq!(updated.name, "night_mode");
    assert_eq!(updated.description.as_deref(), Some("renamed"));
    assert_eq!(h.next_event().await, ChangeEvent::updated("night_mode", true));
    assert_eq!(h.next_event().await, ChangeEvent::deleted("dark_mode"));
}

#[tokio::test]
async fn test_update_rename_onto_existing_name_conflicts() {
    let mut h = harness().await;
    let flag = h.service.create(FlagRequest::new("dark_mode", false)).unwrap();
    h.service.create(FlagRequest::new("maintenance_mode", false)).unwrap();
    h.next_event().await;
    h.next_event().await;

    let result = h.service.update(flag.id, FlagRequest::new("maintenance_mode", true));

    assert!(matches!(result, Err(Error::Store(StoreError::Duplicate(_)))));
    h.assert_no_event().await;
}

#[tokio::test]
async fn test_delete_emits_deleted_and_missing_id_is_not_found() {
    let mut h = harness().await;
    let flag = h.service.create(FlagRequest::new("dark_mode", true)).unwrap();
    h.next_event().await;

    h.service.delete(flag.id).unwrap();
    assert_eq!(h.next_event().await, ChangeEvent::deleted("dark_mode"));

    assert!(matches!(h.service.delete(flag.id), Err(Error::Store(StoreError::NotFound(_)))));
    assert!(matches!(h.service.toggle(flag.id), Err(Error::Store(StoreError::NotFound(_)))));
    h.assert_no_event().await;
}

#[tokio::test]
async fn test_stats_count_enabled_and_disabled() {
    let h = harness().await;
    h.service.create(FlagRequest::new("a", true)).unwrap();
    h.service.create(FlagRequest::new("b", true)).unwrap();
    h.service.create(FlagRequest::new("c", false)).unwrap();

    let stats = h.service.stats().unwrap();

    assert_eq!(
        stats,
        FlagStats {
            total_flags: 3,
            enabled_flags: 2,
            disabled_flags: 1
        }
    );
    assert_eq!(h.service.get_by_name("c").unwrap().name, "c");
    assert!(matches!(
        h.service.get_by_name("zzz"),
        Err(Error::Store(StoreError::NameNotFound(_)))
    ));
}

#[tokio::test]
async fn test_store_failure_surfaces_and_emits_nothing() {
    let mut store = MockFlagStore::new();
    store.expect_exists_by_name().returning(|_| Ok(false));
    store
        .expect_insert()
        .returning(|_| Err(StoreError::DataCorruption { location: "test".into() }.into()));
    let mut h = harness_with_store(Arc::new(store)).await;

    let result = h.service.create(FlagRequest::new("dark_mode", true));

    assert!(matches!(result, Err(Error::Store(StoreError::DataCorruption { .. }))));
    h.assert_no_event().await;
}

#[tokio::test]
async fn test_broken_channel_never_fails_a_mutation() {
    let mut channel = MockChannel::new();
    channel
        .expect_publish()
        .returning(|_| Err(ChannelError::Closed("broker down".to_string()).into()));
    let (_shutdown_tx, shutdown_rx) = watch::channel(());
    let (publisher, _) = Publisher::start(Arc::new(channel), &AuthorityConfig::default(), shutdown_rx);
    let service = FlagService::new(Arc::new(MemFlagStore::new()), publisher);

    let flag = service.create(FlagRequest::new("dark_mode", true)).unwrap();
    service.toggle(flag.id).unwrap();
    service.delete(flag.id).unwrap();

    assert!(service.list().unwrap().is_empty());
}
