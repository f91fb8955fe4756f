use crate::errors::AppError;
use crate::InnerState;

use anyhow::Context;
use axum::extract::State;
use axum::Json;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::FromRow;

#[derive(Debug, Serialize, FromRow, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Like {
    pub id: i64,
    pub user_id: i64,
    pub video_id: i64,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeVideoInput {
    pub user_id: i64,
    pub video_id: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnlikeVideoInput {
    pub user_id: i64,
    pub video_id: i64,
}

async fn ensure_pair_exists(
    db: &sqlx::PgPool,
    user_id: i64,
    video_id: i64,
) -> Result<(), AppError> {
    let user = sqlx::query_scalar::<_, i64>(r#"SELECT id FROM users WHERE id = $1"#)
        .bind(user_id)
        .fetch_optional(db)
        .await?;
    if user.is_none() {
        return Err(AppError::NotFound("User not found".to_string()));
    }

    let video = sqlx::query_scalar::<_, i64>(r#"SELECT id FROM videos WHERE id = $1"#)
        .bind(video_id)
        .fetch_optional(db)
        .await?;
    if video.is_none() {
        return Err(AppError::NotFound("Video not found".to_string()));
    }

    Ok(())
}

/// Records a like and bumps the video counter. At most one like per
/// (user, video) pair; a repeat is a no-op, not an error.
#[tracing::instrument(name = "Like video", skip(inner, input), fields(user_id = %input.user_id, video_id = %input.video_id))]
pub async fn like_video(
    State(inner): State<InnerState>,
    Json(input): Json<LikeVideoInput>,
) -> Result<Json<Value>, AppError> {
    let InnerState { db } = inner;

    ensure_pair_exists(&db, input.user_id, input.video_id).await?;

    let mut transaction = db
        .begin()
        .await
        .context("Failed to begin database transaction.")?;

    let existing = sqlx::query_scalar::<_, i64>(
        r#"SELECT id FROM likes WHERE user_id = $1 AND video_id = $2"#,
    )
    .bind(input.user_id)
    .bind(input.video_id)
    .fetch_optional(&mut *transaction)
    .await?;

    if existing.is_some() {
        tracing::debug!(
            "User {} already likes video {}",
            input.user_id,
            input.video_id
        );
        transaction
            .rollback()
            .await
            .context("Failed to roll back database transaction.")?;
        return Ok(Json(json!({ "liked": false })));
    }

    let like = sqlx::query_as::<_, Like>(
        r#"INSERT INTO likes (user_id, video_id, created_at)
        VALUES ($1, $2, CURRENT_TIMESTAMP)
        RETURNING *"#,
    )
    .bind(input.user_id)
    .bind(input.video_id)
    .fetch_one(&mut *transaction)
    .await?;

    sqlx::query(
        r#"UPDATE videos
        SET like_count = like_count + 1, updated_at = CURRENT_TIMESTAMP
        WHERE id = $1"#,
    )
    .bind(input.video_id)
    .execute(&mut *transaction)
    .await?;

    transaction
        .commit()
        .await
        .context("Failed to commit database transaction.")?;

    tracing::info!(
        "User {} liked video {} (like {})",
        input.user_id,
        input.video_id,
        like.id
    );
    Ok(Json(json!({ "liked": true })))
}

/// Removes a like and decrements the video counter in one transaction, so the
/// pair of effects is all-or-nothing. The DELETE's affected-row count decides
/// the outcome, which keeps two concurrent unlikes from double-decrementing.
#[tracing::instrument(name = "Unlike video", skip(inner, input), fields(user_id = %input.user_id, video_id = %input.video_id))]
pub async fn unlike_video(
    State(inner): State<InnerState>,
    Json(input): Json<UnlikeVideoInput>,
) -> Result<Json<Value>, AppError> {
    let InnerState { db } = inner;

    ensure_pair_exists(&db, input.user_id, input.video_id).await?;

    let mut transaction = db
        .begin()
        .await
        .context("Failed to begin database transaction.")?;

    let deleted = sqlx::query(r#"DELETE FROM likes WHERE user_id = $1 AND video_id = $2"#)
        .bind(input.user_id)
        .bind(input.video_id)
        .execute(&mut *transaction)
        .await?
        .rows_affected();

    if deleted == 0 {
        tracing::debug!(
            "No like to remove for user {} on video {}",
            input.user_id,
            input.video_id
        );
        transaction
            .rollback()
            .await
            .context("Failed to roll back database transaction.")?;
        return Ok(Json(json!({ "removed": false })));
    }

    sqlx::query(
        r#"UPDATE videos
        SET like_count = like_count - 1, updated_at = CURRENT_TIMESTAMP
        WHERE id = $1"#,
    )
    .bind(input.video_id)
    .execute(&mut *transaction)
    .await?;

    transaction
        .commit()
        .await
        .context("Failed to commit database transaction.")?;

    tracing::info!("User {} unliked video {}", input.user_id, input.video_id);
    Ok(Json(json!({ "removed": true })))
}
