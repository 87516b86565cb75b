// Popularity ranker. A windowed leaderboard: non-archived posts created
// within the trailing window, ordered by engagement score computed at query
// time from the live counters. Results sit behind a short-TTL LRU since the
// leaderboard is the hottest read in the system.

use chrono::Duration as ChronoDuration;
use lru::LruCache;
use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::core::{current_time_millis, UserId};
use crate::entities::{EntPost, EntUser};
use crate::error::AppResult;
use crate::store::{scan_entities, EntityStore};

pub const MAX_WINDOW_DAYS: u32 = 365;
pub const MAX_LIMIT: usize = 100;

struct CachedBoard {
    computed_at: Instant,
    posts: Vec<EntPost>,
}

pub struct PopularityRanker {
    store: Arc<dyn EntityStore>,
    cache: Mutex<LruCache<(u32, usize), CachedBoard>>,
    ttl: Duration,
}

impl PopularityRanker {
    pub fn new(store: Arc<dyn EntityStore>, cache_capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(cache_capacity.max(1)).expect("non-zero capacity");
        Self {
            store,
            cache: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    /// Top `limit` posts of the trailing `window_days`, score descending,
    /// ties by creation time descending. Fixed-size, no pagination.
    pub async fn get_popular(&self, window_days: u32, limit: usize) -> AppResult<Vec<EntPost>> {
        let window_days = window_days.clamp(1, MAX_WINDOW_DAYS);
        let limit = limit.clamp(1, MAX_LIMIT);
        let key = (window_days, limit);

        if let Some(board) = self.cache_get(key) {
            return Ok(board);
        }

        let cutoff =
            current_time_millis() - ChronoDuration::days(window_days as i64).num_milliseconds();

        let active_authors: HashSet<UserId> = scan_entities::<EntUser>(self.store.as_ref())
            .await?
            .into_iter()
            .filter(|u| u.is_active)
            .map(|u| u.id)
            .collect();

        let mut posts: Vec<EntPost> = scan_entities::<EntPost>(self.store.as_ref())
            .await?
            .into_iter()
            .filter(|p| !p.is_archived)
            .filter(|p| active_authors.contains(&p.author_id))
            .filter(|p| p.created_time >= cutoff)
            .collect();

        posts.sort_by(|a, b| {
            b.engagement_score()
                .cmp(&a.engagement_score())
                .then(b.created_time.cmp(&a.created_time))
                .then(b.id.cmp(&a.id))
        });
        posts.truncate(limit);

        self.cache_put(key, posts.clone());
        Ok(posts)
    }

    fn cache_get(&self, key: (u32, usize)) -> Option<Vec<EntPost>> {
        let mut cache = self.cache.lock().expect("ranker cache poisoned");
        match cache.get(&key) {
            Some(board) if board.computed_at.elapsed() < self.ttl => Some(board.posts.clone()),
            _ => None,
        }
    }

    fn cache_put(&self, key: (u32, usize), posts: Vec<EntPost>) {
        let mut cache = self.cache.lock().expect("ranker cache poisoned");
        cache.put(
            key,
            CachedBoard {
                computed_at: Instant::now(),
                posts,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::PostId;
    use crate::entities::Visibility;
    use crate::store::{insert_entity, MemoryStore};

    const DAY_MS: i64 = 86_400_000;

    async fn seed(store: &MemoryStore) {
        let now = current_time_millis();
        let author = EntUser::new(UserId::new(1), "Grace", now).unwrap();
        insert_entity(store, &author, now).await.unwrap();

        // (id, age in days, likes)
        for (id, age_days, likes) in [(10, 1, 3), (11, 10, 9), (12, 2, 1)] {
            let created = now - age_days * DAY_MS;
            let mut post = EntPost::new(
                PostId::new(id),
                UserId::new(1),
                "post",
                None,
                vec![],
                Visibility::Public,
                created,
            )
            .unwrap();
            for u in 0..likes {
                post.toggle_like(UserId::new(100 + u), created);
            }
            insert_entity(store, &post, created).await.unwrap();
        }
    }

    fn ranker(store: Arc<MemoryStore>) -> PopularityRanker {
        PopularityRanker::new(store, 8, Duration::from_secs(30))
    }

    #[tokio::test]
    async fn window_excludes_posts_older_than_cutoff() {
        let store = Arc::new(MemoryStore::new());
        seed(store.as_ref()).await;
        let ranker = ranker(store);

        // The 10-day-old post falls outside a 7-day window...
        let week = ranker.get_popular(7, 10).await.unwrap();
        let ids: Vec<i64> = week.iter().map(|p| p.id.value()).collect();
        assert_eq!(ids, vec![10, 12]);

        // ...but inside a 14-day window, where it ranks first on score.
        let fortnight = ranker.get_popular(14, 10).await.unwrap();
        let ids: Vec<i64> = fortnight.iter().map(|p| p.id.value()).collect();
        assert_eq!(ids, vec![11, 10, 12]);
    }

    #[tokio::test]
    async fn leaderboard_truncates_to_limit() {
        let store = Arc::new(MemoryStore::new());
        seed(store.as_ref()).await;
        let ranker = ranker(store);

        let top = ranker.get_popular(14, 2).await.unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].id.value(), 11);
    }

    #[tokio::test]
    async fn cached_board_is_served_within_ttl() {
        let store = Arc::new(MemoryStore::new());
        seed(store.as_ref()).await;
        let ranker = ranker(store.clone());

        let first = ranker.get_popular(14, 10).await.unwrap();

        // A post added after the first read is not visible until the TTL
        // lapses.
        let now = current_time_millis();
        let post = EntPost::new(
            PostId::new(99),
            UserId::new(1),
            "fresh",
            None,
            vec![],
            Visibility::Public,
            now,
        )
        .unwrap();
        insert_entity(store.as_ref(), &post, now).await.unwrap();

        let second = ranker.get_popular(14, 10).await.unwrap();
        assert_eq!(
            first.iter().map(|p| p.id).collect::<Vec<_>>(),
            second.iter().map(|p| p.id).collect::<Vec<_>>()
        );
    }
}
