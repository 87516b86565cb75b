// Engagement engine. Every counter mutation is an optimistic
// read-modify-write: load the entity with its store version, mutate the
// membership set (counts recomputed from the set in the same step), then
// write conditionally on the version. Losing the race reloads and retries.

use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

use crate::core::{current_time_millis, CommentId, PostId, UserId};
use crate::entities::{EntComment, EntPost};
use crate::error::{AppError, AppResult};
use crate::events::{EventSink, FeedEvent};
use crate::store::{load_versioned, save_entity_cas, EntityStore};

const MAX_CAS_ATTEMPTS: u32 = 8;

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeToggle {
    pub now_liked: bool,
    pub likes_count: u32,
}

pub struct EngagementEngine {
    store: Arc<dyn EntityStore>,
    events: Arc<dyn EventSink>,
}

impl EngagementEngine {
    pub fn new(store: Arc<dyn EntityStore>, events: Arc<dyn EventSink>) -> Self {
        Self { store, events }
    }

    /// Flip the user's like on a post. Two racing toggles from different
    /// users both succeed (disjoint set elements); a user racing against
    /// itself resolves to a single deterministic flip via the version check.
    pub async fn toggle_like(&self, post_id: PostId, user: UserId) -> AppResult<LikeToggle> {
        let now = current_time_millis();
        let (now_liked, likes_count) = self
            .mutate_post(post_id, |post| {
                let now_liked = post.toggle_like(user, now);
                Ok((now_liked, post.likes_count()))
            })
            .await?;

        debug!(%post_id, %user, now_liked, likes_count, "like toggled");
        self.events.publish(&FeedEvent::PostLiked {
            post_id,
            user_id: user,
            now_liked,
            likes_count,
        });

        Ok(LikeToggle {
            now_liked,
            likes_count,
        })
    }

    /// Invoked by the comment-creation flow after a comment is persisted.
    pub async fn increment_comments(&self, post_id: PostId) -> AppResult<u32> {
        let now = current_time_millis();
        self.mutate_post(post_id, |post| {
            post.increment_comments(now);
            Ok(post.comments_count())
        })
        .await
    }

    /// Clamped at zero.
    pub async fn decrement_comments(&self, post_id: PostId) -> AppResult<u32> {
        let now = current_time_millis();
        self.mutate_post(post_id, |post| {
            post.decrement_comments(now);
            Ok(post.comments_count())
        })
        .await
    }

    pub async fn record_share(&self, post_id: PostId) -> AppResult<u32> {
        let now = current_time_millis();
        self.mutate_post(post_id, |post| {
            post.record_share(now);
            Ok(post.shares_count())
        })
        .await
    }

    /// Like toggle on a comment, same optimistic scheme as posts.
    pub async fn toggle_comment_like(
        &self,
        comment_id: CommentId,
        user: UserId,
    ) -> AppResult<LikeToggle> {
        let now = current_time_millis();
        for _ in 0..MAX_CAS_ATTEMPTS {
            let versioned = load_versioned::<EntComment>(self.store.as_ref(), comment_id.value())
                .await?
                .ok_or_else(|| {
                    AppError::NotFound(format!("comment {} not found", comment_id))
                })?;
            let mut comment = versioned.entity;
            let now_liked = comment.toggle_like(user, now);

            if save_entity_cas(self.store.as_ref(), &comment, versioned.version, now).await? {
                return Ok(LikeToggle {
                    now_liked,
                    likes_count: comment.likes_count(),
                });
            }
        }
        Err(AppError::Conflict(format!(
            "comment {} is under heavy contention, retry",
            comment_id
        )))
    }

    /// Run one optimistic mutation against a live (non-archived) post.
    async fn mutate_post<T>(
        &self,
        post_id: PostId,
        mut mutate: impl FnMut(&mut EntPost) -> AppResult<T>,
    ) -> AppResult<T> {
        let now = current_time_millis();
        for _ in 0..MAX_CAS_ATTEMPTS {
            let versioned = load_versioned::<EntPost>(self.store.as_ref(), post_id.value())
                .await?
                .ok_or_else(|| AppError::NotFound(format!("post {} not found", post_id)))?;
            if versioned.entity.is_archived {
                return Err(AppError::NotFound(format!("post {} not found", post_id)));
            }

            let mut post = versioned.entity;
            let result = mutate(&mut post)?;

            if save_entity_cas(self.store.as_ref(), &post, versioned.version, now).await? {
                return Ok(result);
            }
            // Lost the version race; reload and reapply.
        }
        Err(AppError::Conflict(format!(
            "post {} is under heavy contention, retry",
            post_id
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::Visibility;
    use crate::events::CaptureSink;
    use crate::store::{insert_entity, load_entity, MemoryStore};

    async fn setup_with_post() -> (EngagementEngine, Arc<MemoryStore>, Arc<CaptureSink>) {
        let store = Arc::new(MemoryStore::new());
        let events = Arc::new(CaptureSink::new());
        let engine = EngagementEngine::new(store.clone(), events.clone());

        let post = EntPost::new(
            PostId::new(100),
            UserId::new(1),
            "hello",
            None,
            vec![],
            Visibility::Public,
            0,
        )
        .unwrap();
        insert_entity(store.as_ref(), &post, 0).await.unwrap();
        (engine, store, events)
    }

    #[tokio::test]
    async fn double_toggle_restores_original_state() {
        let (engine, store, _) = setup_with_post().await;
        let post_id = PostId::new(100);
        let user = UserId::new(7);

        let t1 = engine.toggle_like(post_id, user).await.unwrap();
        assert!(t1.now_liked);
        assert_eq!(t1.likes_count, 1);

        let t2 = engine.toggle_like(post_id, user).await.unwrap();
        assert!(!t2.now_liked);
        assert_eq!(t2.likes_count, 0);

        let post: EntPost = load_entity(store.as_ref(), 100).await.unwrap().unwrap();
        assert_eq!(post.likes_count(), 0);
        assert!(!post.is_liked_by(user));
    }

    #[tokio::test]
    async fn concurrent_likes_from_different_users_both_land() {
        let (engine, store, _) = setup_with_post().await;
        let engine = Arc::new(engine);
        let post_id = PostId::new(100);

        let e1 = engine.clone();
        let e2 = engine.clone();
        let (r1, r2) = tokio::join!(
            e1.toggle_like(post_id, UserId::new(11)),
            e2.toggle_like(post_id, UserId::new(12)),
        );
        assert!(r1.unwrap().now_liked);
        assert!(r2.unwrap().now_liked);

        let post: EntPost = load_entity(store.as_ref(), 100).await.unwrap().unwrap();
        assert_eq!(post.likes_count(), 2);
    }

    #[tokio::test]
    async fn archived_post_is_not_found() {
        let (engine, store, _) = setup_with_post().await;

        let versioned = load_versioned::<EntPost>(store.as_ref(), 100)
            .await
            .unwrap()
            .unwrap();
        let mut post = versioned.entity;
        post.archive(1);
        assert!(
            save_entity_cas(store.as_ref(), &post, versioned.version, 1)
                .await
                .unwrap()
        );

        let err = engine
            .toggle_like(PostId::new(100), UserId::new(7))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn comment_count_decrement_clamps() {
        let (engine, _, _) = setup_with_post().await;
        let post_id = PostId::new(100);

        assert_eq!(engine.decrement_comments(post_id).await.unwrap(), 0);
        assert_eq!(engine.increment_comments(post_id).await.unwrap(), 1);
        assert_eq!(engine.decrement_comments(post_id).await.unwrap(), 0);
        assert_eq!(engine.decrement_comments(post_id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn comment_likes_toggle_independently_of_the_post() {
        let (engine, store, _) = setup_with_post().await;
        let comment = EntComment::new(
            CommentId::new(200),
            PostId::new(100),
            UserId::new(1),
            "nice",
            None,
            0,
        )
        .unwrap();
        insert_entity(store.as_ref(), &comment, 0).await.unwrap();

        let t1 = engine
            .toggle_comment_like(CommentId::new(200), UserId::new(7))
            .await
            .unwrap();
        assert!(t1.now_liked);
        assert_eq!(t1.likes_count, 1);

        let t2 = engine
            .toggle_comment_like(CommentId::new(200), UserId::new(7))
            .await
            .unwrap();
        assert!(!t2.now_liked);
        assert_eq!(t2.likes_count, 0);

        // The post's own counters are untouched.
        let post: EntPost = load_entity(store.as_ref(), 100).await.unwrap().unwrap();
        assert_eq!(post.likes_count(), 0);
    }

    #[tokio::test]
    async fn like_events_are_published() {
        let (engine, _, events) = setup_with_post().await;
        engine
            .toggle_like(PostId::new(100), UserId::new(5))
            .await
            .unwrap();

        let published = events.drain();
        assert_eq!(
            published,
            vec![FeedEvent::PostLiked {
                post_id: PostId::new(100),
                user_id: UserId::new(5),
                now_liked: true,
                likes_count: 1,
            }]
        );
    }
}
