//! V1 API route definitions

use axum::{
    routing::{get, patch, post, put},
    Router,
};

use crate::api::v1::feed::video_feed;
use crate::api::v1::like::{like_video, unlike_video};
use crate::api::v1::user::{get_user_profile, login_user, register_user, update_user};
use crate::api::v1::video::{create_video, get_videos_by_user, update_video};
use crate::InnerState;

#[tracing::instrument(name = "create_v1_routes", skip(state))]
pub fn create_v1_routes(state: InnerState) -> Router {
    tracing::info!("Setting up V1 API routes");

    Router::new()
        // Account routes
        .route("/registration", post(register_user))
        .route("/authorize", post(login_user))
        .route("/users/:user_id", put(update_user))
        .route("/users/:user_id/profile", get(get_user_profile))
        // Video routes
        .route("/video", post(create_video))
        .route("/videos/:video_id", patch(update_video))
        .route("/users/:user_id/videos", get(get_videos_by_user))
        .route("/feed", get(video_feed))
        // Like routes
        .route("/likes", post(like_video).delete(unlike_video))
        .with_state(state)
}
