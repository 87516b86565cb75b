// HTTP surface. Thin axum handlers over the engines; the viewer identity
// arrives pre-authenticated from upstream in the `x-viewer-id` header.

pub mod viewer;

pub use viewer::Viewer;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::core::{
    current_time_millis, CommentId, IdGenerator, Page, PageRequest, PostId, UserId,
};
use crate::data_seeder::DataSeeder;
use crate::engagement::EngagementEngine;
use crate::entities::{EntComment, Visibility};
use crate::error::{AppError, AppResult};
use crate::feed::{CreatePostInput, FeedQueryEngine, PostView, SortKey, UpdatePostInput};
use crate::graph::FollowGraph;
use crate::ranking::PopularityRanker;
use crate::store::EntityStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn EntityStore>,
    pub feed: Arc<FeedQueryEngine>,
    pub graph: Arc<FollowGraph>,
    pub engagement: Arc<EngagementEngine>,
    pub ranker: Arc<PopularityRanker>,
    pub ids: Arc<IdGenerator>,
}

#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FeedParams {
    page: Option<u32>,
    limit: Option<u32>,
    sort_by: Option<String>,
}

impl FeedParams {
    fn page_request(&self) -> PageRequest {
        PageRequest::new(
            self.page.unwrap_or(1),
            self.limit.unwrap_or(PageRequest::DEFAULT_LIMIT),
        )
    }
}

#[derive(Deserialize)]
struct PopularParams {
    days: Option<u32>,
    limit: Option<usize>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatePostRequest {
    content: String,
    image: Option<String>,
    /// Comma-separated, as in the original API.
    tags: Option<String>,
    visibility: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdatePostRequest {
    content: Option<String>,
    image: Option<String>,
    tags: Option<String>,
    visibility: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateCommentRequest {
    content: String,
    parent_comment: Option<i64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LikeResponse {
    liked: bool,
    likes_count: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FollowResponse {
    is_following: bool,
    followers_count: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProfileResponse {
    #[serde(flatten)]
    user: crate::entities::EntUser,
    followers_count: u64,
    following_count: u64,
    is_following: bool,
}

fn parse_visibility(s: Option<&str>) -> AppResult<Option<Visibility>> {
    s.map(|v| v.parse()).transpose()
}

fn split_tags(tags: Option<&str>) -> Vec<String> {
    tags.map(|t| t.split(',').map(|s| s.to_string()).collect())
        .unwrap_or_default()
}

fn require_viewer(viewer: Viewer) -> AppResult<UserId> {
    viewer
        .0
        .ok_or_else(|| AppError::Unauthorized("authentication required".to_string()))
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "nexa-feed",
        "timestamp": current_time_millis()
    }))
}

async fn get_feed(
    State(state): State<AppState>,
    viewer: Viewer,
    Query(params): Query<FeedParams>,
) -> AppResult<Json<ApiResponse<Page<PostView>>>> {
    let sort = match params.sort_by.as_deref() {
        Some(s) => SortKey::parse(s)?,
        None => SortKey::default(),
    };
    let page = state
        .feed
        .get_feed(viewer.0, params.page_request(), sort)
        .await?;
    Ok(ApiResponse::ok(page))
}

async fn get_popular(
    State(state): State<AppState>,
    viewer: Viewer,
    Query(params): Query<PopularParams>,
) -> AppResult<Json<ApiResponse<Vec<PostView>>>> {
    let posts = state
        .ranker
        .get_popular(params.days.unwrap_or(7), params.limit.unwrap_or(10))
        .await?;
    let views = posts
        .into_iter()
        .map(|p| PostView::new(p, viewer.0))
        .collect();
    Ok(ApiResponse::ok(views))
}

async fn get_post(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(post_id): Path<i64>,
) -> AppResult<Json<ApiResponse<PostView>>> {
    let view = state.feed.get_post(PostId::new(post_id), viewer.0).await?;
    Ok(ApiResponse::ok(view))
}

async fn create_post(
    State(state): State<AppState>,
    viewer: Viewer,
    Json(request): Json<CreatePostRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<PostView>>)> {
    let author = require_viewer(viewer)?;
    let input = CreatePostInput {
        content: request.content,
        image: request.image,
        tags: split_tags(request.tags.as_deref()),
        visibility: parse_visibility(request.visibility.as_deref())?,
    };
    let view = state.feed.create_post(author, input).await?;
    Ok((StatusCode::CREATED, ApiResponse::ok(view)))
}

async fn update_post(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(post_id): Path<i64>,
    Json(request): Json<UpdatePostRequest>,
) -> AppResult<Json<ApiResponse<PostView>>> {
    let editor = require_viewer(viewer)?;
    let input = UpdatePostInput {
        content: request.content,
        image: request.image.map(Some),
        tags: request.tags.as_deref().map(|t| split_tags(Some(t))),
        visibility: parse_visibility(request.visibility.as_deref())?,
    };
    let view = state
        .feed
        .update_post(PostId::new(post_id), editor, input)
        .await?;
    Ok(ApiResponse::ok(view))
}

async fn delete_post(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(post_id): Path<i64>,
) -> AppResult<Json<ApiResponse<String>>> {
    let editor = require_viewer(viewer)?;
    state.feed.archive_post(PostId::new(post_id), editor).await?;
    Ok(ApiResponse::ok("post deleted".to_string()))
}

async fn like_post(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(post_id): Path<i64>,
) -> AppResult<Json<ApiResponse<LikeResponse>>> {
    let user = require_viewer(viewer)?;
    let toggle = state
        .engagement
        .toggle_like(PostId::new(post_id), user)
        .await?;
    Ok(ApiResponse::ok(LikeResponse {
        liked: toggle.now_liked,
        likes_count: toggle.likes_count,
    }))
}

async fn like_comment(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(comment_id): Path<i64>,
) -> AppResult<Json<ApiResponse<LikeResponse>>> {
    let user = require_viewer(viewer)?;
    let toggle = state
        .engagement
        .toggle_comment_like(CommentId::new(comment_id), user)
        .await?;
    Ok(ApiResponse::ok(LikeResponse {
        liked: toggle.now_liked,
        likes_count: toggle.likes_count,
    }))
}

async fn share_post(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(post_id): Path<i64>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let user = require_viewer(viewer)?;
    let shares = state.feed.share_post(PostId::new(post_id), user).await?;
    Ok(ApiResponse::ok(
        serde_json::json!({ "sharesCount": shares }),
    ))
}

async fn create_comment(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(post_id): Path<i64>,
    Json(request): Json<CreateCommentRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<EntComment>>)> {
    let author = require_viewer(viewer)?;
    let comment = state
        .feed
        .create_comment(
            PostId::new(post_id),
            author,
            &request.content,
            request.parent_comment.map(CommentId::new),
        )
        .await?;
    Ok((StatusCode::CREATED, ApiResponse::ok(comment)))
}

async fn list_comments(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(post_id): Path<i64>,
    Query(params): Query<FeedParams>,
) -> AppResult<Json<ApiResponse<Page<EntComment>>>> {
    let page = state
        .feed
        .list_comments(PostId::new(post_id), viewer.0, params.page_request())
        .await?;
    Ok(ApiResponse::ok(page))
}

async fn get_user_posts(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(user_id): Path<i64>,
    Query(params): Query<FeedParams>,
) -> AppResult<Json<ApiResponse<Page<PostView>>>> {
    let page = state
        .feed
        .get_user_posts(UserId::new(user_id), viewer.0, params.page_request())
        .await?;
    Ok(ApiResponse::ok(page))
}

async fn follow_user(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(user_id): Path<i64>,
) -> AppResult<Json<ApiResponse<FollowResponse>>> {
    let follower = require_viewer(viewer)?;
    let toggle = state
        .graph
        .toggle_follow(follower, UserId::new(user_id))
        .await?;
    Ok(ApiResponse::ok(FollowResponse {
        is_following: toggle.now_following,
        followers_count: toggle.target_follower_count,
    }))
}

async fn get_user(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(user_id): Path<i64>,
) -> AppResult<Json<ApiResponse<ProfileResponse>>> {
    let target = UserId::new(user_id);
    let user = crate::store::load_entity::<crate::entities::EntUser>(
        state.store.as_ref(),
        target.value(),
    )
    .await?
    .filter(|u| u.is_active)
    .ok_or_else(|| AppError::NotFound(format!("user {} not found", target)))?;

    let followers_count = state.graph.follower_count(target).await?;
    let following_count = state.graph.following_count(target).await?;
    let is_following = match viewer.0 {
        Some(v) if v != target => state.graph.is_following(v, target).await?,
        _ => false,
    };

    Ok(ApiResponse::ok(ProfileResponse {
        user,
        followers_count,
        following_count,
        is_following,
    }))
}

async fn get_followers(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> AppResult<Json<ApiResponse<Vec<UserId>>>> {
    let followers = state.graph.followers(UserId::new(user_id)).await?;
    Ok(ApiResponse::ok(followers))
}

async fn get_following(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> AppResult<Json<ApiResponse<Vec<UserId>>>> {
    let following = state.graph.following(UserId::new(user_id)).await?;
    Ok(ApiResponse::ok(following))
}

async fn seed_data(State(state): State<AppState>) -> AppResult<Json<ApiResponse<String>>> {
    let seeder = DataSeeder::new(state.store.clone(), state.graph.clone(), state.ids.clone());
    let summary = seeder.seed().await?;
    info!("seeded sample data: {}", summary);
    Ok(ApiResponse::ok(summary))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/posts", get(get_feed).post(create_post))
        .route("/api/posts/popular", get(get_popular))
        .route(
            "/api/posts/{id}",
            get(get_post).put(update_post).delete(delete_post),
        )
        .route("/api/posts/{id}/like", post(like_post))
        .route("/api/posts/{id}/share", post(share_post))
        .route(
            "/api/posts/{id}/comments",
            get(list_comments).post(create_comment),
        )
        .route("/api/posts/user/{userId}", get(get_user_posts))
        .route("/api/comments/{id}/like", post(like_comment))
        .route("/api/users/{id}", get(get_user))
        .route("/api/users/{id}/follow", post(follow_user))
        .route("/api/users/{id}/followers", get(get_followers))
        .route("/api/users/{id}/following", get(get_following))
        .route("/api/seed", post(seed_data))
        .layer(
            ServiceBuilder::new().layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            ),
        )
        .with_state(state)
}
