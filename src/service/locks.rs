//! Per-artist async mutexes.
//!
//! Operations on different artists proceed independently; two operations on
//! the same artist queue up. Keys are always taken in sorted order so a tip
//! touching several artists cannot deadlock against another.

use crate::domain::ArtistId;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Entries beyond this count trigger a sweep of idle locks.
const PRUNE_THRESHOLD: usize = 1024;

#[derive(Debug, Clone, Default)]
pub struct ArtistLocks {
    table: Arc<Mutex<HashMap<ArtistId, Arc<AsyncMutex<()>>>>>,
}

/// Held locks; released on drop.
#[derive(Debug)]
pub struct ArtistGuards {
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl ArtistLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the locks of every artist in `artists`, deduplicated, in sorted order.
    pub async fn acquire<'a, I>(&self, artists: I) -> ArtistGuards
    where
        I: IntoIterator<Item = &'a ArtistId>,
    {
        let keys: BTreeSet<&ArtistId> = artists.into_iter().collect();
        let mutexes: Vec<Arc<AsyncMutex<()>>> = {
            let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
            if table.len() > PRUNE_THRESHOLD {
                table.retain(|_, m| Arc::strong_count(m) > 1);
            }
            keys.into_iter()
                .map(|key| table.entry(key.clone()).or_default().clone())
                .collect()
        };

        let mut guards = Vec::with_capacity(mutexes.len());
        for mutex in mutexes {
            guards.push(mutex.lock_owned().await);
        }
        ArtistGuards { _guards: guards }
    }

    pub async fn acquire_one(&self, artist: &ArtistId) -> ArtistGuards {
        self.acquire(std::iter::once(artist)).await
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.table.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_artist_serializes() {
        let locks = ArtistLocks::new();
        let artist = ArtistId::new("a1");

        let guard = locks.acquire_one(&artist).await;
        let second = tokio::time::timeout(Duration::from_millis(50), locks.acquire_one(&artist));
        assert!(second.await.is_err(), "second acquire must wait");

        drop(guard);
        let second = tokio::time::timeout(Duration::from_millis(500), locks.acquire_one(&artist));
        assert!(second.await.is_ok());
    }

    #[tokio::test]
    async fn test_different_artists_do_not_block() {
        let locks = ArtistLocks::new();
        let _a = locks.acquire_one(&ArtistId::new("a")).await;
        let artist_b = ArtistId::new("b");
        let b = tokio::time::timeout(
            Duration::from_millis(200),
            locks.acquire_one(&artist_b),
        );
        assert!(b.await.is_ok());
    }

    #[tokio::test]
    async fn test_duplicate_keys_do_not_self_deadlock() {
        let locks = ArtistLocks::new();
        let a = ArtistId::new("a");
        let b = ArtistId::new("b");
        let acquired = tokio::time::timeout(
            Duration::from_millis(200),
            locks.acquire([&b, &a, &b, &a]),
        );
        assert!(acquired.await.is_ok());
        assert_eq!(locks.len(), 2);
    }
}
