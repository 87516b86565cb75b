// Visibility rules. Two deliberately distinct predicates:
//
// - `can_view`: per-post check, one-directional ("viewer follows author").
// - `can_browse_user_posts`: the user-listing gate, which requires a mutual
//   follow before exposing a friends-only profile's history.
//
// Both are pure functions over already-fetched facts; `VisibilityResolver`
// binds them to the follow graph and prefetches the viewer's following set
// once per feed query.

use std::collections::HashSet;
use std::sync::Arc;

use crate::core::UserId;
use crate::entities::{EntPost, EntUser, Privacy, Visibility};
use crate::error::AppResult;
use crate::graph::FollowGraph;

/// May `viewer` see this single post?
///
/// `viewer_follows_author` is the one-directional fact "viewer follows the
/// post's author"; being followed *by* the author is not sufficient.
pub fn can_view(post: &EntPost, viewer: Option<UserId>, viewer_follows_author: bool) -> bool {
    if post.visibility == Visibility::Public {
        return true;
    }
    let Some(viewer) = viewer else {
        // Anonymous viewers only see public posts
        return false;
    };
    if viewer == post.author_id {
        return true;
    }
    match post.visibility {
        Visibility::Public => true,
        Visibility::Friends => viewer_follows_author,
        Visibility::Private => false,
    }
}

/// User-listing gate: may `viewer` browse `target`'s post history at all?
pub fn can_browse_user_posts(
    target: &EntUser,
    viewer: Option<UserId>,
    mutual_follow: bool,
) -> bool {
    let Some(viewer) = viewer else {
        return target.privacy == Privacy::Public;
    };
    if viewer == target.id {
        return true;
    }
    match target.privacy {
        Privacy::Public => true,
        Privacy::Private => false,
        Privacy::Friends => mutual_follow,
    }
}

/// The viewer identity plus their prefetched following set, so a whole page
/// of candidate posts can be filtered without further graph lookups.
#[derive(Debug, Clone)]
pub struct ViewerScope {
    viewer: Option<UserId>,
    following: HashSet<UserId>,
}

impl ViewerScope {
    pub fn anonymous() -> Self {
        Self {
            viewer: None,
            following: HashSet::new(),
        }
    }

    pub fn viewer(&self) -> Option<UserId> {
        self.viewer
    }

    pub fn allows(&self, post: &EntPost) -> bool {
        can_view(post, self.viewer, self.following.contains(&post.author_id))
    }
}

pub struct VisibilityResolver {
    graph: Arc<FollowGraph>,
}

impl VisibilityResolver {
    pub fn new(graph: Arc<FollowGraph>) -> Self {
        Self { graph }
    }

    pub async fn can_view(&self, post: &EntPost, viewer: Option<UserId>) -> AppResult<bool> {
        let follows = match viewer {
            Some(v) if v != post.author_id => self.graph.is_following(v, post.author_id).await?,
            _ => false,
        };
        Ok(can_view(post, viewer, follows))
    }

    pub async fn scope(&self, viewer: Option<UserId>) -> AppResult<ViewerScope> {
        let following = match viewer {
            Some(v) => self.graph.following_set(v).await?,
            None => HashSet::new(),
        };
        Ok(ViewerScope { viewer, following })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::PostId;

    fn post(author: i64, visibility: Visibility) -> EntPost {
        EntPost::new(
            PostId::new(1),
            UserId::new(author),
            "content",
            None,
            vec![],
            visibility,
            0,
        )
        .unwrap()
    }

    fn user(id: i64, privacy: Privacy) -> EntUser {
        EntUser::new(UserId::new(id), "Someone", 0)
            .unwrap()
            .with_privacy(privacy)
    }

    #[test]
    fn public_posts_are_visible_to_everyone() {
        let p = post(1, Visibility::Public);
        assert!(can_view(&p, None, false));
        assert!(can_view(&p, Some(UserId::new(2)), false));
        assert!(can_view(&p, Some(UserId::new(1)), false));
    }

    #[test]
    fn owner_always_sees_own_post() {
        for visibility in [Visibility::Public, Visibility::Friends, Visibility::Private] {
            let p = post(1, visibility);
            assert!(can_view(&p, Some(UserId::new(1)), false));
        }
    }

    #[test]
    fn friends_visibility_is_one_directional() {
        let p = post(1, Visibility::Friends);
        // Viewer follows the author: visible
        assert!(can_view(&p, Some(UserId::new(2)), true));
        // Viewer does not follow the author (even if the author follows
        // the viewer, which is not modeled here): hidden
        assert!(!can_view(&p, Some(UserId::new(2)), false));
        // Anonymous: hidden
        assert!(!can_view(&p, None, true));
    }

    #[test]
    fn private_posts_are_owner_only() {
        let p = post(1, Visibility::Private);
        assert!(!can_view(&p, Some(UserId::new(2)), true));
        assert!(!can_view(&p, None, false));
    }

    #[test]
    fn listing_gate_requires_mutual_follow_for_friends_privacy() {
        let target = user(1, Privacy::Friends);
        assert!(can_browse_user_posts(&target, Some(UserId::new(1)), false));
        assert!(can_browse_user_posts(&target, Some(UserId::new(2)), true));
        assert!(!can_browse_user_posts(&target, Some(UserId::new(2)), false));
        assert!(!can_browse_user_posts(&target, None, true));
    }

    #[test]
    fn listing_gate_public_and_private() {
        let open = user(1, Privacy::Public);
        assert!(can_browse_user_posts(&open, None, false));
        assert!(can_browse_user_posts(&open, Some(UserId::new(2)), false));

        let closed = user(1, Privacy::Private);
        assert!(!can_browse_user_posts(&closed, Some(UserId::new(2)), true));
        assert!(can_browse_user_posts(&closed, Some(UserId::new(1)), false));
    }

    #[test]
    fn scope_filters_posts_by_prefetched_following() {
        let mut following = HashSet::new();
        following.insert(UserId::new(1));
        let scope = ViewerScope {
            viewer: Some(UserId::new(9)),
            following,
        };

        assert!(scope.allows(&post(1, Visibility::Friends)));
        assert!(!scope.allows(&post(2, Visibility::Friends)));
        assert!(scope.allows(&post(2, Visibility::Public)));
    }
}
