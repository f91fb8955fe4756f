use crate::api::common::patch::Patch;
use crate::api::v1::video::Video;
use crate::authentication::{compute_password_hash, validate_credentials, Credentials};
use crate::errors::AppError;
use crate::InnerState;

use axum::extract::{Path, State};
use axum::Json;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Postgres, QueryBuilder};
use validator::{Validate, ValidateUrl};

#[derive(Debug, Serialize, FromRow, Clone)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    // Never leaves the server, not even on registration.
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterUserInput {
    #[validate(length(min = 3, max = 50))]
    pub username: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 6))]
    pub password: String,
    pub display_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserInput {
    #[serde(default)]
    pub display_name: Patch<String>,
    #[serde(default)]
    pub bio: Patch<String>,
    #[serde(default)]
    pub avatar_url: Patch<String>,
}

#[derive(Debug, Serialize)]
pub struct UserProfile {
    #[serde(flatten)]
    pub user: User,
    pub videos: Vec<Video>,
}

#[tracing::instrument(name = "Register new user", skip(inner, input), fields(username = %input.username))]
pub async fn register_user(
    State(inner): State<InnerState>,
    Json(input): Json<RegisterUserInput>,
) -> Result<Json<User>, AppError> {
    let InnerState { db } = inner;

    input.validate()?;

    // One lookup covers both uniqueness checks; username wins when both clash.
    let existing = sqlx::query_as::<_, (String, String)>(
        r#"SELECT username, email FROM users WHERE username = $1 OR email = $2"#,
    )
    .bind(&input.username)
    .bind(&input.email)
    .fetch_optional(&db)
    .await?;

    if let Some((username, _)) = existing {
        if username == input.username {
            tracing::warn!("Attempted to register duplicate username: {}", username);
            return Err(AppError::Conflict("Username already exists".to_string()));
        }
        tracing::warn!("Attempted to register duplicate email");
        return Err(AppError::Conflict("Email already exists".to_string()));
    }

    let password_hash = compute_password_hash(input.password).await?;

    let user = sqlx::query_as::<_, User>(
        r#"INSERT INTO users (username, email, password_hash, display_name, created_at, updated_at)
        VALUES ($1, $2, $3, $4, CURRENT_TIMESTAMP, CURRENT_TIMESTAMP)
        RETURNING *"#,
    )
    .bind(&input.username)
    .bind(&input.email)
    .bind(&password_hash)
    .bind(&input.display_name)
    .fetch_one(&db)
    .await?;

    tracing::info!("Registered user {} with id {}", user.username, user.id);
    Ok(Json(user))
}

#[tracing::instrument(name = "Authorize user", skip(inner, credentials), fields(email = %credentials.email))]
pub async fn login_user(
    State(inner): State<InnerState>,
    Json(credentials): Json<Credentials>,
) -> Result<Json<User>, AppError> {
    let InnerState { db } = inner;

    let user = validate_credentials(&credentials, &db).await?;

    Ok(Json(user))
}

#[tracing::instrument(name = "Update user profile", skip(inner, input), fields(user_id = %user_id))]
pub async fn update_user(
    State(inner): State<InnerState>,
    Path(user_id): Path<i64>,
    Json(input): Json<UpdateUserInput>,
) -> Result<Json<User>, AppError> {
    let InnerState { db } = inner;

    if let Some(url) = input.avatar_url.value() {
        if !url.validate_url() {
            return Err(AppError::Validation(
                "avatarUrl must be a valid URL".to_string(),
            ));
        }
    }

    let exists = sqlx::query_scalar::<_, i64>(r#"SELECT id FROM users WHERE id = $1"#)
        .bind(user_id)
        .fetch_optional(&db)
        .await?;

    if exists.is_none() {
        return Err(AppError::NotFound("User not found".to_string()));
    }

    // Only fields present in the body reach the statement; values are bound,
    // never interpolated.
    let mut builder =
        QueryBuilder::<Postgres>::new("UPDATE users SET updated_at = CURRENT_TIMESTAMP");

    match &input.display_name {
        Patch::Unset => {}
        Patch::Null => {
            builder.push(", display_name = NULL");
        }
        Patch::Value(display_name) => {
            builder.push(", display_name = ");
            builder.push_bind(display_name);
        }
    }

    match &input.bio {
        Patch::Unset => {}
        Patch::Null => {
            builder.push(", bio = NULL");
        }
        Patch::Value(bio) => {
            builder.push(", bio = ");
            builder.push_bind(bio);
        }
    }

    match &input.avatar_url {
        Patch::Unset => {}
        Patch::Null => {
            builder.push(", avatar_url = NULL");
        }
        Patch::Value(avatar_url) => {
            builder.push(", avatar_url = ");
            builder.push_bind(avatar_url);
        }
    }

    builder.push(" WHERE id = ");
    builder.push_bind(user_id);
    builder.push(" RETURNING *");

    let user = builder.build_query_as::<User>().fetch_one(&db).await?;

    tracing::info!("Updated profile for user {}", user.id);
    Ok(Json(user))
}

#[tracing::instrument(name = "Get user profile", skip(inner), fields(user_id = %user_id))]
pub async fn get_user_profile(
    State(inner): State<InnerState>,
    Path(user_id): Path<i64>,
) -> Result<Json<Option<UserProfile>>, AppError> {
    let InnerState { db } = inner;

    let user = sqlx::query_as::<_, User>(r#"SELECT * FROM users WHERE id = $1"#)
        .bind(user_id)
        .fetch_optional(&db)
        .await?;

    let Some(user) = user else {
        tracing::debug!("No user with id {}", user_id);
        return Ok(Json(None));
    };

    let videos = sqlx::query_as::<_, Video>(
        r#"SELECT * FROM videos WHERE user_id = $1 ORDER BY created_at DESC"#,
    )
    .bind(user_id)
    .fetch_all(&db)
    .await?;

    tracing::debug!("Profile for user {} has {} videos", user_id, videos.len());
    Ok(Json(Some(UserProfile { user, videos })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::v1::video::{create_video, CreateVideoInput};
    use crate::db::init_db;

    fn valid_register_input() -> RegisterUserInput {
        RegisterUserInput {
            username: "clipper".to_string(),
            email: "clipper@example.com".to_string(),
            password: "hunter22".to_string(),
            display_name: Some("Clipper".to_string()),
        }
    }

    #[test]
    fn register_input_accepts_valid_payload() {
        assert!(valid_register_input().validate().is_ok());
    }

    #[test]
    fn register_input_rejects_short_username() {
        let mut input = valid_register_input();
        input.username = "ab".to_string();
        assert!(input.validate().is_err());
    }

    #[test]
    fn register_input_rejects_malformed_email() {
        let mut input = valid_register_input();
        input.email = "not-an-email".to_string();
        assert!(input.validate().is_err());
    }

    #[test]
    fn register_input_rejects_short_password() {
        let mut input = valid_register_input();
        input.password = "12345".to_string();
        assert!(input.validate().is_err());
    }

    #[test]
    fn update_input_distinguishes_absent_null_and_value() {
        let input: UpdateUserInput =
            serde_json::from_str(r#"{"bio": null, "displayName": "New Name"}"#).unwrap();
        assert_eq!(input.bio, Patch::Null);
        assert_eq!(input.display_name, Patch::Value("New Name".to_string()));
        assert!(input.avatar_url.is_unset());
    }

    #[test]
    fn serialized_user_omits_password_hash() {
        let user = User {
            id: 1,
            username: "clipper".to_string(),
            email: "clipper@example.com".to_string(),
            password_hash: "$argon2id$secret".to_string(),
            display_name: None,
            bio: None,
            avatar_url: None,
            created_at: chrono::NaiveDateTime::default(),
            updated_at: chrono::NaiveDateTime::default(),
        };

        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("passwordHash"));
        assert!(!json.contains("argon2id"));
    }

    // DB-backed cases below need DATABASE_URL pointing at a migrated database.

    async fn test_state() -> InnerState {
        dotenv::dotenv().ok();
        let db = init_db().await.expect("Failed to init DB");
        InnerState { db }
    }

    fn unique(prefix: &str) -> String {
        format!(
            "{}_{}",
            prefix,
            chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
        )
    }

    async fn register(state: &InnerState, username: &str, email: &str) -> User {
        let Json(user) = register_user(
            State(state.clone()),
            Json(RegisterUserInput {
                username: username.to_string(),
                email: email.to_string(),
                password: "hunter22".to_string(),
                display_name: None,
            }),
        )
        .await
        .expect("registration failed");
        user
    }

    #[tokio::test]
    #[ignore = "requires a live database"]
    async fn duplicate_username_conflicts() {
        let state = test_state().await;
        let username = unique("dup_user");
        register(&state, &username, &format!("{}@example.com", username)).await;

        let result = register_user(
            State(state.clone()),
            Json(RegisterUserInput {
                username: username.clone(),
                email: format!("other_{}@example.com", username),
                password: "hunter22".to_string(),
                display_name: None,
            }),
        )
        .await;

        match result {
            Err(AppError::Conflict(msg)) => assert_eq!(msg, "Username already exists"),
            other => panic!("expected username conflict, got {:?}", other.is_ok()),
        }
    }

    #[tokio::test]
    #[ignore = "requires a live database"]
    async fn duplicate_email_conflicts() {
        let state = test_state().await;
        let username = unique("dup_mail");
        let email = format!("{}@example.com", username);
        register(&state, &username, &email).await;

        let result = register_user(
            State(state.clone()),
            Json(RegisterUserInput {
                username: unique("dup_mail_other"),
                email,
                password: "hunter22".to_string(),
                display_name: None,
            }),
        )
        .await;

        match result {
            Err(AppError::Conflict(msg)) => assert_eq!(msg, "Email already exists"),
            other => panic!("expected email conflict, got {:?}", other.is_ok()),
        }
    }

    #[tokio::test]
    #[ignore = "requires a live database"]
    async fn update_applies_only_present_fields() {
        let state = test_state().await;
        let username = unique("updater");
        let user = register(&state, &username, &format!("{}@example.com", username)).await;

        let Json(updated) = update_user(
            State(state.clone()),
            Path(user.id),
            Json(serde_json::from_str(r#"{"bio": "first bio", "displayName": "First"}"#).unwrap()),
        )
        .await
        .expect("first update failed");
        assert_eq!(updated.bio.as_deref(), Some("first bio"));
        assert_eq!(updated.display_name.as_deref(), Some("First"));
        assert!(updated.updated_at > user.updated_at);

        // Omitted displayName stays put, explicit null clears bio.
        let Json(updated) = update_user(
            State(state.clone()),
            Path(user.id),
            Json(serde_json::from_str(r#"{"bio": null}"#).unwrap()),
        )
        .await
        .expect("second update failed");
        assert_eq!(updated.bio, None);
        assert_eq!(updated.display_name.as_deref(), Some("First"));
    }

    #[tokio::test]
    #[ignore = "requires a live database"]
    async fn update_unknown_user_is_not_found() {
        let state = test_state().await;
        let result = update_user(
            State(state.clone()),
            Path(i64::MAX),
            Json(UpdateUserInput::default()),
        )
        .await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    #[ignore = "requires a live database"]
    async fn profile_is_null_for_unknown_user() {
        let state = test_state().await;
        let Json(profile) = get_user_profile(State(state.clone()), Path(i64::MAX))
            .await
            .expect("profile lookup failed");
        assert!(profile.is_none());
    }

    #[tokio::test]
    #[ignore = "requires a live database"]
    async fn profile_lists_all_videos_for_user() {
        let state = test_state().await;
        let username = unique("profiled");
        let user = register(&state, &username, &format!("{}@example.com", username)).await;

        let Json(empty) = get_user_profile(State(state.clone()), Path(user.id))
            .await
            .expect("profile lookup failed");
        assert!(empty.expect("user should exist").videos.is_empty());

        for n in 0..3 {
            create_video(
                State(state.clone()),
                Json(CreateVideoInput {
                    user_id: user.id,
                    title: format!("Clip {}", n),
                    description: None,
                    video_url: "https://example.com/clip.mp4".to_string(),
                    thumbnail_url: None,
                    duration: 30,
                }),
            )
            .await
            .expect("video creation failed");
        }

        let Json(profile) = get_user_profile(State(state.clone()), Path(user.id))
            .await
            .expect("profile lookup failed");
        let profile = profile.expect("user should exist");
        assert_eq!(profile.videos.len(), 3);
        assert!(profile.videos.iter().all(|v| v.user_id == user.id));
    }

    #[tokio::test]
    #[ignore = "requires a live database"]
    async fn login_roundtrip_and_rejection() {
        let state = test_state().await;
        let username = unique("login");
        let email = format!("{}@example.com", username);
        register(&state, &username, &email).await;

        let Json(user) = login_user(
            State(state.clone()),
            Json(Credentials {
                email: email.clone(),
                password: "hunter22".to_string(),
            }),
        )
        .await
        .expect("login failed");
        assert_eq!(user.email, email);

        let result = login_user(
            State(state.clone()),
            Json(Credentials {
                email,
                password: "wrong-password".to_string(),
            }),
        )
        .await;
        assert!(matches!(result, Err(AppError::Authentication(_))));
    }
}
