// Follow graph manager. The relation is stored as a single directed edge
// per (follower, target) pair; follower/following views and counts are
// derived by query, so the two sides can never disagree.

use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use crate::core::{current_time_millis, UserId};
use crate::entities::EntUser;
use crate::error::{AppError, AppResult};
use crate::events::{EventSink, FeedEvent};
use crate::store::{load_entity, Edge, EntityStore, EDGE_FOLLOWS};

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowToggle {
    pub now_following: bool,
    pub target_follower_count: u64,
}

pub struct FollowGraph {
    store: Arc<dyn EntityStore>,
    events: Arc<dyn EventSink>,
}

impl FollowGraph {
    pub fn new(store: Arc<dyn EntityStore>, events: Arc<dyn EventSink>) -> Self {
        Self { store, events }
    }

    /// Flip the follower -> target relation. The edge insert/delete is a
    /// single atomic store mutation; the returned follower count reflects
    /// the post-mutation cardinality.
    pub async fn toggle_follow(&self, follower: UserId, target: UserId) -> AppResult<FollowToggle> {
        if follower == target {
            return Err(AppError::Validation(
                "users cannot follow themselves".to_string(),
            ));
        }

        let follower_user: EntUser = load_entity(self.store.as_ref(), follower.value())
            .await?
            .ok_or_else(|| AppError::NotFound(format!("user {} not found", follower)))?;
        if !follower_user.is_active {
            return Err(AppError::NotFound(format!("user {} not found", follower)));
        }

        let target_user: EntUser = load_entity(self.store.as_ref(), target.value())
            .await?
            .ok_or_else(|| AppError::NotFound(format!("user {} not found", target)))?;
        if !target_user.is_active {
            return Err(AppError::NotFound(format!("user {} not found", target)));
        }

        let edge = Edge {
            id1: follower.value(),
            etype: EDGE_FOLLOWS.to_string(),
            id2: target.value(),
            time: current_time_millis(),
        };

        // If the edge already existed this toggle is an unfollow. A
        // concurrent toggle of the same pair may race us to the delete;
        // either way the final state is a deterministic flip.
        let now_following = if self.store.add_edge(edge).await? {
            true
        } else {
            self.store
                .remove_edge(follower.value(), EDGE_FOLLOWS, target.value())
                .await?;
            false
        };

        let target_follower_count = self
            .store
            .count_edges_to(target.value(), EDGE_FOLLOWS)
            .await?;

        debug!(
            %follower,
            %target,
            now_following,
            target_follower_count,
            "follow toggled"
        );
        self.events.publish(&FeedEvent::FollowToggled {
            follower,
            target,
            now_following,
        });

        Ok(FollowToggle {
            now_following,
            target_follower_count,
        })
    }

    /// One-directional check: does `follower` follow `target`?
    pub async fn is_following(&self, follower: UserId, target: UserId) -> AppResult<bool> {
        self.store
            .edge_exists(follower.value(), EDGE_FOLLOWS, target.value())
            .await
    }

    /// Both directions hold simultaneously.
    pub async fn is_mutual(&self, a: UserId, b: UserId) -> AppResult<bool> {
        Ok(self.is_following(a, b).await? && self.is_following(b, a).await?)
    }

    /// Users whom `user` follows.
    pub async fn following(&self, user: UserId) -> AppResult<Vec<UserId>> {
        let ids = self
            .store
            .edges_from(user.value(), EDGE_FOLLOWS)
            .await?;
        Ok(ids.into_iter().map(UserId::new).collect())
    }

    /// Users who follow `user`.
    pub async fn followers(&self, user: UserId) -> AppResult<Vec<UserId>> {
        let ids = self.store.edges_to(user.value(), EDGE_FOLLOWS).await?;
        Ok(ids.into_iter().map(UserId::new).collect())
    }

    pub async fn following_set(&self, user: UserId) -> AppResult<HashSet<UserId>> {
        Ok(self.following(user).await?.into_iter().collect())
    }

    pub async fn follower_count(&self, user: UserId) -> AppResult<u64> {
        self.store.count_edges_to(user.value(), EDGE_FOLLOWS).await
    }

    pub async fn following_count(&self, user: UserId) -> AppResult<u64> {
        self.store
            .count_edges_from(user.value(), EDGE_FOLLOWS)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::Entity;
    use crate::events::CaptureSink;
    use crate::store::{insert_entity, MemoryStore};

    async fn setup() -> (FollowGraph, Arc<MemoryStore>, Arc<CaptureSink>) {
        let store = Arc::new(MemoryStore::new());
        let events = Arc::new(CaptureSink::new());
        let graph = FollowGraph::new(store.clone(), events.clone());

        for (id, name) in [(1, "Alice"), (2, "Bob"), (3, "Carol")] {
            let user = EntUser::new(UserId::new(id), name, 0).unwrap();
            insert_entity(store.as_ref(), &user, 0).await.unwrap();
        }
        (graph, store, events)
    }

    #[tokio::test]
    async fn follow_then_unfollow_flips_state() {
        let (graph, _, events) = setup().await;
        let a = UserId::new(1);
        let b = UserId::new(2);

        let t1 = graph.toggle_follow(a, b).await.unwrap();
        assert!(t1.now_following);
        assert_eq!(t1.target_follower_count, 1);

        let t2 = graph.toggle_follow(a, b).await.unwrap();
        assert!(!t2.now_following);
        assert_eq!(t2.target_follower_count, 0);

        let published = events.drain();
        assert_eq!(published.len(), 2);
    }

    #[tokio::test]
    async fn derived_views_stay_symmetric() {
        let (graph, _, _) = setup().await;
        let a = UserId::new(1);
        let b = UserId::new(2);
        let c = UserId::new(3);

        graph.toggle_follow(a, b).await.unwrap();
        graph.toggle_follow(c, b).await.unwrap();
        graph.toggle_follow(b, a).await.unwrap();

        // a in b.followers iff b in a.following, at every observation point
        for (x, y) in [(a, b), (b, a), (c, b), (b, c), (a, c)] {
            let forward = graph.following(x).await.unwrap().contains(&y);
            let backward = graph.followers(y).await.unwrap().contains(&x);
            assert_eq!(forward, backward);
        }

        assert!(graph.is_mutual(a, b).await.unwrap());
        assert!(!graph.is_mutual(a, c).await.unwrap());
        assert_eq!(graph.follower_count(b).await.unwrap(), 2);
        assert_eq!(graph.following_count(b).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn self_follow_fails_without_mutation() {
        let (graph, store, events) = setup().await;
        let a = UserId::new(1);

        let err = graph.toggle_follow(a, a).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(store.count_edges_from(1, EDGE_FOLLOWS).await.unwrap(), 0);
        assert!(events.drain().is_empty());
    }

    #[tokio::test]
    async fn inactive_or_missing_target_is_not_found() {
        let (graph, store, _) = setup().await;
        let a = UserId::new(1);

        let err = graph.toggle_follow(a, UserId::new(99)).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        // Deactivate Bob, then try to follow him
        let mut bob: EntUser = crate::store::load_entity(store.as_ref(), 2)
            .await
            .unwrap()
            .unwrap();
        bob.deactivate(1);
        let data = serde_json::to_string(&bob).unwrap();
        assert!(store.update(bob.entity_id(), data, 1, 1).await.unwrap());

        let err = graph.toggle_follow(a, UserId::new(2)).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
