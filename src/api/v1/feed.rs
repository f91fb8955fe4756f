use crate::api::common::utils::timeout_query;
use crate::api::common::PaginationParams;
use crate::api::v1::video::Video;
use crate::errors::AppError;
use crate::InnerState;

use axum::extract::{Query, State};
use axum::Json;
use serde::Serialize;
use sqlx::FromRow;

/// A video joined with its owner's public display fields, shaped for list
/// rendering.
#[derive(Debug, Serialize, FromRow, Clone)]
#[serde(rename_all = "camelCase")]
pub struct VideoFeedItem {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub video: Video,
    pub username: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

#[tracing::instrument(name = "Get video feed", skip(inner))]
pub async fn video_feed(
    State(inner): State<InnerState>,
    Query(pagination): Query<PaginationParams>,
) -> Result<Json<Vec<VideoFeedItem>>, AppError> {
    let InnerState { db } = inner;

    let fetch_feed_timeout = tokio::time::Duration::from_millis(10000);

    let items = timeout_query(
        fetch_feed_timeout,
        sqlx::query_as::<_, VideoFeedItem>(
            r#"SELECT v.*, u.username, u.display_name, u.avatar_url
            FROM videos v
            JOIN users u ON u.id = v.user_id
            ORDER BY v.created_at DESC
            LIMIT $1 OFFSET $2"#,
        )
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&db),
    )
    .await?;

    tracing::debug!("Feed page holds {} items", items.len());
    Ok(Json(items))
}
