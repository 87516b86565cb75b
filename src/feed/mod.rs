// Feed query engine. Composes the visibility resolver with pagination and
// sort order over the entity store, annotates results with the viewer's
// like state, and owns the post/comment write paths recovered from the
// original controllers.

use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

use crate::core::{
    current_time_millis, paginate, CommentId, IdGenerator, Page, PageRequest, PostId, UserId,
};
use crate::engagement::EngagementEngine;
use crate::entities::{EntComment, EntPost, EntUser, Visibility};
use crate::error::{AppError, AppResult};
use crate::events::{EventSink, FeedEvent};
use crate::graph::FollowGraph;
use crate::store::{
    insert_entity, load_entity, load_versioned, save_entity_cas, scan_entities, EntityStore,
};
use crate::visibility::{can_browse_user_posts, VisibilityResolver};

/// Sort order for feed reads. Ties always break by id descending so
/// repeated paginated reads are deterministic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    #[default]
    CreatedDesc,
    CreatedAsc,
    MostLiked,
    MostViewed,
}

impl SortKey {
    /// Accepts the original API's `sortBy` spellings.
    pub fn parse(s: &str) -> AppResult<Self> {
        match s {
            "-createdAt" => Ok(SortKey::CreatedDesc),
            "createdAt" => Ok(SortKey::CreatedAsc),
            "-likes" | "likes" => Ok(SortKey::MostLiked),
            "-views" | "views" => Ok(SortKey::MostViewed),
            other => Err(AppError::Validation(format!(
                "sortBy: unsupported sort key '{}'",
                other
            ))),
        }
    }

    fn apply(self, posts: &mut [EntPost]) {
        match self {
            SortKey::CreatedDesc => {
                posts.sort_by(|a, b| {
                    b.created_time
                        .cmp(&a.created_time)
                        .then(b.id.cmp(&a.id))
                });
            }
            SortKey::CreatedAsc => {
                posts.sort_by(|a, b| {
                    a.created_time
                        .cmp(&b.created_time)
                        .then(b.id.cmp(&a.id))
                });
            }
            SortKey::MostLiked => {
                posts.sort_by(|a, b| {
                    b.likes_count()
                        .cmp(&a.likes_count())
                        .then(b.created_time.cmp(&a.created_time))
                        .then(b.id.cmp(&a.id))
                });
            }
            SortKey::MostViewed => {
                posts.sort_by(|a, b| {
                    b.views
                        .cmp(&a.views)
                        .then(b.created_time.cmp(&a.created_time))
                        .then(b.id.cmp(&a.id))
                });
            }
        }
    }
}

/// A post as returned to callers: entity fields plus the viewer's like
/// state and the live engagement score. Built without mutating the store.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostView {
    #[serde(flatten)]
    pub post: EntPost,
    pub is_liked: bool,
    pub engagement_score: i64,
}

impl PostView {
    pub fn new(post: EntPost, viewer: Option<UserId>) -> Self {
        let is_liked = viewer.map(|v| post.is_liked_by(v)).unwrap_or(false);
        let engagement_score = post.engagement_score();
        Self {
            post,
            is_liked,
            engagement_score,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CreatePostInput {
    pub content: String,
    pub image: Option<String>,
    pub tags: Vec<String>,
    pub visibility: Option<Visibility>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdatePostInput {
    pub content: Option<String>,
    pub image: Option<Option<String>>,
    pub tags: Option<Vec<String>>,
    pub visibility: Option<Visibility>,
}

const MAX_CAS_ATTEMPTS: u32 = 8;

pub struct FeedQueryEngine {
    store: Arc<dyn EntityStore>,
    graph: Arc<FollowGraph>,
    resolver: VisibilityResolver,
    engagement: Arc<EngagementEngine>,
    events: Arc<dyn EventSink>,
    ids: Arc<IdGenerator>,
}

impl FeedQueryEngine {
    pub fn new(
        store: Arc<dyn EntityStore>,
        graph: Arc<FollowGraph>,
        engagement: Arc<EngagementEngine>,
        events: Arc<dyn EventSink>,
        ids: Arc<IdGenerator>,
    ) -> Self {
        let resolver = VisibilityResolver::new(graph.clone());
        Self {
            store,
            graph,
            resolver,
            engagement,
            events,
            ids,
        }
    }

    /// The global feed: every non-archived post from an active author that
    /// the viewer may see, sorted and windowed.
    pub async fn get_feed(
        &self,
        viewer: Option<UserId>,
        req: PageRequest,
        sort: SortKey,
    ) -> AppResult<Page<PostView>> {
        let scope = self.resolver.scope(viewer).await?;
        let active_authors = self.active_author_ids().await?;

        let mut candidates: Vec<EntPost> = scan_entities::<EntPost>(self.store.as_ref())
            .await?
            .into_iter()
            .filter(|p| !p.is_archived)
            .filter(|p| active_authors.contains(&p.author_id))
            .filter(|p| scope.allows(p))
            .collect();

        sort.apply(&mut candidates);
        Ok(paginate(candidates, req).map(|post| PostView::new(post, viewer)))
    }

    /// A user's post history, behind the user-listing gate. For non-owners
    /// friends-only posts require a mutual follow; private posts never show.
    pub async fn get_user_posts(
        &self,
        target_id: UserId,
        viewer: Option<UserId>,
        req: PageRequest,
    ) -> AppResult<Page<PostView>> {
        let target = self.active_user(target_id).await?;
        let is_self = viewer == Some(target_id);

        let mutual = match viewer {
            Some(v) if !is_self => self.graph.is_mutual(v, target_id).await?,
            _ => false,
        };

        if !can_browse_user_posts(&target, viewer, mutual) {
            return Err(AppError::Forbidden(
                "you do not have permission to view these posts".to_string(),
            ));
        }

        let mut candidates: Vec<EntPost> = scan_entities::<EntPost>(self.store.as_ref())
            .await?
            .into_iter()
            .filter(|p| p.author_id == target_id && !p.is_archived)
            .filter(|p| {
                is_self
                    || match p.visibility {
                        Visibility::Public => true,
                        Visibility::Friends => mutual,
                        Visibility::Private => false,
                    }
            })
            .collect();

        SortKey::CreatedDesc.apply(&mut candidates);
        Ok(paginate(candidates, req).map(|post| PostView::new(post, viewer)))
    }

    /// Single-post read with visibility check. Records a view as a
    /// fire-and-forget side effect; a failure to record never fails the read.
    pub async fn get_post(&self, post_id: PostId, viewer: Option<UserId>) -> AppResult<PostView> {
        let post = self.live_post(post_id).await?;
        self.require_active_author(&post, viewer).await?;

        if !self.resolver.can_view(&post, viewer).await? {
            return Err(AppError::Forbidden(
                "you do not have permission to view this post".to_string(),
            ));
        }

        self.spawn_record_view(post_id);
        Ok(PostView::new(post, viewer))
    }

    pub async fn create_post(
        &self,
        author_id: UserId,
        input: CreatePostInput,
    ) -> AppResult<PostView> {
        self.active_user(author_id).await?;

        let now = current_time_millis();
        let post = EntPost::new(
            PostId::new(self.ids.next_id()),
            author_id,
            &input.content,
            input.image,
            input.tags,
            input.visibility.unwrap_or(Visibility::Public),
            now,
        )?;
        insert_entity(self.store.as_ref(), &post, now).await?;

        self.bump_posts_count(author_id, true).await?;

        info!(post_id = %post.id, author = %author_id, "post created");
        self.events.publish(&FeedEvent::PostCreated {
            post_id: post.id,
            author_id,
        });

        Ok(PostView::new(post, Some(author_id)))
    }

    /// Owner-only edit; a content change marks the post edited.
    pub async fn update_post(
        &self,
        post_id: PostId,
        editor: UserId,
        input: UpdatePostInput,
    ) -> AppResult<PostView> {
        let now = current_time_millis();
        for _ in 0..MAX_CAS_ATTEMPTS {
            let versioned = load_versioned::<EntPost>(self.store.as_ref(), post_id.value())
                .await?
                .ok_or_else(|| AppError::NotFound(format!("post {} not found", post_id)))?;
            let mut post = versioned.entity;
            if post.is_archived {
                return Err(AppError::NotFound(format!("post {} not found", post_id)));
            }
            if post.author_id != editor {
                return Err(AppError::Forbidden(
                    "only the author can edit this post".to_string(),
                ));
            }

            post.apply_edit(
                input.content.as_deref(),
                input.image.clone(),
                input.tags.clone(),
                input.visibility,
                now,
            )?;

            if save_entity_cas(self.store.as_ref(), &post, versioned.version, now).await? {
                info!(post_id = %post.id, editor = %editor, "post updated");
                return Ok(PostView::new(post, Some(editor)));
            }
        }
        Err(AppError::Conflict(format!(
            "post {} is under heavy contention, retry",
            post_id
        )))
    }

    /// Owner-only soft delete. The record is archived, never removed.
    pub async fn archive_post(&self, post_id: PostId, editor: UserId) -> AppResult<()> {
        let now = current_time_millis();
        for _ in 0..MAX_CAS_ATTEMPTS {
            let versioned = load_versioned::<EntPost>(self.store.as_ref(), post_id.value())
                .await?
                .ok_or_else(|| AppError::NotFound(format!("post {} not found", post_id)))?;
            let mut post = versioned.entity;
            if post.is_archived {
                return Err(AppError::NotFound(format!("post {} not found", post_id)));
            }
            if post.author_id != editor {
                return Err(AppError::Forbidden(
                    "only the author can delete this post".to_string(),
                ));
            }

            post.archive(now);
            if save_entity_cas(self.store.as_ref(), &post, versioned.version, now).await? {
                self.bump_posts_count(editor, false).await?;
                info!(post_id = %post_id, editor = %editor, "post archived");
                return Ok(());
            }
        }
        Err(AppError::Conflict(format!(
            "post {} is under heavy contention, retry",
            post_id
        )))
    }

    /// Visibility-gated share: the counter only moves for viewers who
    /// could see the post in the first place.
    pub async fn share_post(&self, post_id: PostId, user: UserId) -> AppResult<u32> {
        self.active_user(user).await?;
        let post = self.live_post(post_id).await?;

        if !self.resolver.can_view(&post, Some(user)).await? {
            return Err(AppError::Forbidden(
                "you do not have permission to share this post".to_string(),
            ));
        }

        self.engagement.record_share(post_id).await
    }

    /// Persist a comment, then bump the post's comment counter.
    pub async fn create_comment(
        &self,
        post_id: PostId,
        author_id: UserId,
        content: &str,
        parent_comment: Option<CommentId>,
    ) -> AppResult<EntComment> {
        self.active_user(author_id).await?;
        let post = self.live_post(post_id).await?;

        if !self.resolver.can_view(&post, Some(author_id)).await? {
            return Err(AppError::Forbidden(
                "you do not have permission to comment on this post".to_string(),
            ));
        }

        if let Some(parent_id) = parent_comment {
            let parent: EntComment = load_entity(self.store.as_ref(), parent_id.value())
                .await?
                .ok_or_else(|| {
                    AppError::Validation(format!("parentComment: comment {} not found", parent_id))
                })?;
            if parent.post_id != post_id {
                return Err(AppError::Validation(
                    "parentComment: parent belongs to a different post".to_string(),
                ));
            }
        }

        let now = current_time_millis();
        let comment = EntComment::new(
            CommentId::new(self.ids.next_id()),
            post_id,
            author_id,
            content,
            parent_comment,
            now,
        )?;
        insert_entity(self.store.as_ref(), &comment, now).await?;
        self.engagement.increment_comments(post_id).await?;

        self.events.publish(&FeedEvent::CommentAdded {
            post_id,
            comment_id: comment.id,
            author_id,
        });
        Ok(comment)
    }

    /// Comments of a post, newest first, behind the same visibility check
    /// as the post itself.
    pub async fn list_comments(
        &self,
        post_id: PostId,
        viewer: Option<UserId>,
        req: PageRequest,
    ) -> AppResult<Page<EntComment>> {
        let post = self.live_post(post_id).await?;
        if !self.resolver.can_view(&post, viewer).await? {
            return Err(AppError::Forbidden(
                "you do not have permission to view this post".to_string(),
            ));
        }

        let mut comments: Vec<EntComment> = scan_entities::<EntComment>(self.store.as_ref())
            .await?
            .into_iter()
            .filter(|c| c.post_id == post_id)
            .collect();
        comments.sort_by(|a, b| {
            b.created_time
                .cmp(&a.created_time)
                .then(b.id.cmp(&a.id))
        });

        Ok(paginate(comments, req))
    }

    async fn live_post(&self, post_id: PostId) -> AppResult<EntPost> {
        let post: EntPost = load_entity(self.store.as_ref(), post_id.value())
            .await?
            .ok_or_else(|| AppError::NotFound(format!("post {} not found", post_id)))?;
        if post.is_archived {
            return Err(AppError::NotFound(format!("post {} not found", post_id)));
        }
        Ok(post)
    }

    async fn active_user(&self, user_id: UserId) -> AppResult<EntUser> {
        let user: EntUser = load_entity(self.store.as_ref(), user_id.value())
            .await?
            .ok_or_else(|| AppError::NotFound(format!("user {} not found", user_id)))?;
        if !user.is_active {
            return Err(AppError::NotFound(format!("user {} not found", user_id)));
        }
        Ok(user)
    }

    /// A deactivated author's posts drop out of every visibility
    /// computation; only the author themselves can still load them.
    async fn require_active_author(&self, post: &EntPost, viewer: Option<UserId>) -> AppResult<()> {
        if viewer == Some(post.author_id) {
            return Ok(());
        }
        let author: Option<EntUser> =
            load_entity(self.store.as_ref(), post.author_id.value()).await?;
        match author {
            Some(a) if a.is_active => Ok(()),
            _ => Err(AppError::NotFound(format!("post {} not found", post.id))),
        }
    }

    async fn active_author_ids(&self) -> AppResult<HashSet<UserId>> {
        Ok(scan_entities::<EntUser>(self.store.as_ref())
            .await?
            .into_iter()
            .filter(|u| u.is_active)
            .map(|u| u.id)
            .collect())
    }

    async fn bump_posts_count(&self, user_id: UserId, created: bool) -> AppResult<()> {
        let now = current_time_millis();
        for _ in 0..MAX_CAS_ATTEMPTS {
            let Some(versioned) =
                load_versioned::<EntUser>(self.store.as_ref(), user_id.value()).await?
            else {
                return Ok(());
            };
            let mut user = versioned.entity;
            if created {
                user.record_post_created(now);
            } else {
                user.record_post_archived(now);
            }
            if save_entity_cas(self.store.as_ref(), &user, versioned.version, now).await? {
                return Ok(());
            }
        }
        warn!(user = %user_id, "posts_count update lost repeated version races");
        Ok(())
    }

    /// Fire-and-forget view accounting for single-post reads.
    fn spawn_record_view(&self, post_id: PostId) {
        let store = self.store.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            let now = current_time_millis();
            for _ in 0..MAX_CAS_ATTEMPTS {
                let versioned =
                    match load_versioned::<EntPost>(store.as_ref(), post_id.value()).await {
                        Ok(Some(v)) => v,
                        Ok(None) => return,
                        Err(e) => {
                            warn!(post = %post_id, error = %e, "failed to record view");
                            return;
                        }
                    };
                let mut post = versioned.entity;
                post.record_view();
                match save_entity_cas(store.as_ref(), &post, versioned.version, now).await {
                    Ok(true) => {
                        events.publish(&FeedEvent::PostViewed { post_id });
                        return;
                    }
                    Ok(false) => continue,
                    Err(e) => {
                        warn!(post = %post_id, error = %e, "failed to record view");
                        return;
                    }
                }
            }
        });
    }
}
