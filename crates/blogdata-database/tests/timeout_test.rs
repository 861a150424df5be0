//! Integration tests for deadlines and cancellation of full-table loads.

mod helpers;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use blogdata_core::error::ErrorKind;
use blogdata_core::result::AppResult;
use blogdata_core::traits::store::{Change, Store, StoreSession, StoredRecord};
use blogdata_core::types::id::EntityId;
use blogdata_database::MemoryStore;
use blogdata_entity::Tag;

/// A store whose full-table loads take `delay`.
#[derive(Debug)]
struct SlowStore {
    inner: MemoryStore,
    delay: Duration,
}

struct SlowSession {
    inner: Box<dyn StoreSession>,
    delay: Duration,
}

#[async_trait]
impl Store for SlowStore {
    fn driver_name(&self) -> &str {
        "slow"
    }

    async fn open_session(&self) -> AppResult<Box<dyn StoreSession>> {
        Ok(Box::new(SlowSession {
            inner: self.inner.open_session().await?,
            delay: self.delay,
        }))
    }
}

#[async_trait]
impl StoreSession for SlowSession {
    async fn load_all(&mut self, entity_type: &str) -> AppResult<Vec<StoredRecord>> {
        tokio::time::sleep(self.delay).await;
        self.inner.load_all(entity_type).await
    }

    async fn load_by_id(
        &mut self,
        entity_type: &str,
        id: EntityId,
    ) -> AppResult<Option<StoredRecord>> {
        self.inner.load_by_id(entity_type, id).await
    }

    async fn next_id(&mut self, entity_type: &str) -> AppResult<EntityId> {
        self.inner.next_id(entity_type).await
    }

    async fn commit(&mut self, changes: &[Change]) -> AppResult<()> {
        self.inner.commit(changes).await
    }

    async fn close(&mut self) -> AppResult<()> {
        self.inner.close().await
    }
}

fn slow(delay: Duration) -> Arc<SlowStore> {
    Arc::new(SlowStore {
        inner: MemoryStore::new(),
        delay,
    })
}

#[tokio::test(start_paused = true)]
async fn test_full_scan_times_out() {
    let store = slow(Duration::from_secs(60));
    let uow = helpers::blog_unit(store)
        .query_timeout(Duration::from_secs(1))
        .begin()
        .await
        .unwrap();
    let tags = uow.repository::<Tag>().unwrap();
    let mut tag = Tag::new("rust");
    tags.insert(&mut tag).await.unwrap();

    let err = tags.get_all(None).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Timeout);
    assert!(err.is_retryable());

    // The staged insert survives and point lookups are not bounded.
    assert_eq!(uow.pending_changes().await, 1);
    assert!(tags.get_by_id(tag.id).await.unwrap().is_some());
}

#[tokio::test(start_paused = true)]
async fn test_full_scan_cancelled_mid_flight() {
    let store = slow(Duration::from_secs(60));
    let uow = helpers::blog_unit(store).begin().await.unwrap();
    let tags = uow.repository::<Tag>().unwrap();
    tags.insert(&mut Tag::new("rust")).await.unwrap();

    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let err = tags.get_all_cancellable(None, &token).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Cancelled);
    assert_eq!(uow.pending_changes().await, 1);

    uow.commit().await.unwrap();
}
