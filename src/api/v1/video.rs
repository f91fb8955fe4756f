use crate::api::common::patch::Patch;
use crate::api::common::utils::timeout_query;
use crate::errors::AppError;
use crate::InnerState;

use axum::extract::{Path, State};
use axum::Json;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Postgres, QueryBuilder};
use validator::Validate;

#[derive(Debug, Serialize, FromRow, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Video {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub video_url: String,
    pub thumbnail_url: Option<String>,
    /// Duration in seconds.
    pub duration: i32,
    pub view_count: i32,
    pub like_count: i32,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateVideoInput {
    pub user_id: i64,
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    pub description: Option<String>,
    #[validate(url)]
    pub video_url: String,
    #[validate(url)]
    pub thumbnail_url: Option<String>,
    #[validate(range(min = 1))]
    pub duration: i32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateVideoInput {
    #[serde(default)]
    pub title: Patch<String>,
    #[serde(default)]
    pub description: Patch<String>,
}

#[tracing::instrument(name = "Create new video", skip(inner, input), fields(user_id = %input.user_id, title = %input.title))]
pub async fn create_video(
    State(inner): State<InnerState>,
    Json(input): Json<CreateVideoInput>,
) -> Result<Json<Video>, AppError> {
    let InnerState { db } = inner;

    input.validate()?;

    let owner = sqlx::query_scalar::<_, i64>(r#"SELECT id FROM users WHERE id = $1"#)
        .bind(input.user_id)
        .fetch_optional(&db)
        .await?;

    if owner.is_none() {
        tracing::warn!("Video upload for unknown user {}", input.user_id);
        return Err(AppError::NotFound("User not found".to_string()));
    }

    let video = sqlx::query_as::<_, Video>(
        r#"INSERT INTO videos (user_id, title, description, video_url, thumbnail_url, duration, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, CURRENT_TIMESTAMP, CURRENT_TIMESTAMP)
        RETURNING *"#,
    )
    .bind(input.user_id)
    .bind(&input.title)
    .bind(&input.description)
    .bind(&input.video_url)
    .bind(&input.thumbnail_url)
    .bind(input.duration)
    .fetch_one(&db)
    .await?;

    tracing::info!("Created video {} for user {}", video.id, video.user_id);
    Ok(Json(video))
}

#[tracing::instrument(name = "Update video metadata", skip(inner, input), fields(video_id = %video_id))]
pub async fn update_video(
    State(inner): State<InnerState>,
    Path(video_id): Path<i64>,
    Json(input): Json<UpdateVideoInput>,
) -> Result<Json<Video>, AppError> {
    let InnerState { db } = inner;

    // Title is not a nullable column; a patch may replace it but never clear it.
    match &input.title {
        Patch::Null => {
            return Err(AppError::Validation("title cannot be null".to_string()));
        }
        Patch::Value(title) => {
            let length = title.chars().count();
            if length < 1 || length > 200 {
                return Err(AppError::Validation(
                    "title must be between 1 and 200 characters".to_string(),
                ));
            }
        }
        Patch::Unset => {}
    }

    let exists = sqlx::query_scalar::<_, i64>(r#"SELECT id FROM videos WHERE id = $1"#)
        .bind(video_id)
        .fetch_optional(&db)
        .await?;

    if exists.is_none() {
        return Err(AppError::NotFound("Video not found".to_string()));
    }

    let mut builder =
        QueryBuilder::<Postgres>::new("UPDATE videos SET updated_at = CURRENT_TIMESTAMP");

    if let Patch::Value(title) = &input.title {
        builder.push(", title = ");
        builder.push_bind(title);
    }

    match &input.description {
        Patch::Unset => {}
        Patch::Null => {
            builder.push(", description = NULL");
        }
        Patch::Value(description) => {
            builder.push(", description = ");
            builder.push_bind(description);
        }
    }

    builder.push(" WHERE id = ");
    builder.push_bind(video_id);
    builder.push(" RETURNING *");

    let video = builder.build_query_as::<Video>().fetch_one(&db).await?;

    tracing::info!("Updated video {}", video.id);
    Ok(Json(video))
}

#[tracing::instrument(name = "Get videos by user", skip(inner), fields(user_id = %user_id))]
pub async fn get_videos_by_user(
    State(inner): State<InnerState>,
    Path(user_id): Path<i64>,
) -> Result<Json<Vec<Video>>, AppError> {
    let InnerState { db } = inner;

    let fetch_videos_timeout = tokio::time::Duration::from_millis(10000);

    // Unknown users and users without uploads both come back empty.
    let videos = timeout_query(
        fetch_videos_timeout,
        sqlx::query_as::<_, Video>(
            r#"SELECT * FROM videos WHERE user_id = $1 ORDER BY created_at DESC"#,
        )
        .bind(user_id)
        .fetch_all(&db),
    )
    .await?;

    tracing::debug!("Fetched {} videos for user {}", videos.len(), user_id);
    Ok(Json(videos))
}
