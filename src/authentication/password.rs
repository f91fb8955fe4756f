use crate::api::v1::user::User;
use crate::errors::AppError;
use anyhow::Context;

use argon2::password_hash::SaltString;
use argon2::{Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version};
use serde::Deserialize;
use sqlx::PgPool;

#[derive(Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(thiserror::Error, Debug)]
pub enum AuthError {
    #[error("Invalid credentials.")]
    InvalidCredentials(#[source] anyhow::Error),
    #[error(transparent)]
    UnexpectedError(#[from] anyhow::Error),
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials(e) => AppError::Authentication(e),
            AuthError::UnexpectedError(e) => AppError::Unexpected(e),
        }
    }
}

#[tracing::instrument(name = "Validate user credentials", skip(credentials, pool), fields(email = %credentials.email))]
pub async fn validate_credentials(
    credentials: &Credentials,
    pool: &PgPool,
) -> Result<User, AuthError> {
    tracing::debug!("Fetching stored credentials from database");

    let user = sqlx::query_as::<_, User>(r#"SELECT * FROM users WHERE email = $1"#)
        .bind(&credentials.email)
        .fetch_optional(pool)
        .await
        .context("Failed to fetch stored credentials")?;

    // Always verify against some hash so unknown emails take as long as
    // known ones.
    let mut expected_password_hash = String::from(
        "$argon2id$v=19$m=15000,t=2,p=1$\
        gZiV/M1gPc22ElAH/Jh1Hw$\
        CWOrkoo7oJBQ/iyh7uJ0LO2aLEfrHwTWllSAxT0zRno",
    );

    if let Some(ref user) = user {
        tracing::debug!("User found with id {}", user.id);
        expected_password_hash = user.password_hash.clone();
    }

    verify_password_hash(&expected_password_hash, &credentials.password)?;

    match user {
        Some(user) => {
            tracing::info!("Credential validation successful for user: {}", user.email);
            Ok(user)
        }
        None => Err(AuthError::InvalidCredentials(anyhow::anyhow!(
            "Unknown email."
        ))),
    }
}

#[tracing::instrument(name = "Verify password hash", skip(expected_password_hash, password_candidate))]
fn verify_password_hash(
    expected_password_hash: &str,
    password_candidate: &str,
) -> Result<(), AuthError> {
    let expected_password_hash = PasswordHash::new(expected_password_hash)
        .context("Failed to parse hash in PHC string format.")?;

    Argon2::default()
        .verify_password(password_candidate.as_bytes(), &expected_password_hash)
        .context("Invalid password.")
        .map_err(AuthError::InvalidCredentials)
}

#[tracing::instrument(name = "Compute password hash", skip(password))]
pub async fn compute_password_hash(password: String) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut rand::thread_rng());

    let params = Params::new(15000, 2, 1, None).map_err(|e| {
        AppError::Unexpected(anyhow::Error::new(e).context("Failed to create Argon2 params"))
    })?;

    let hasher = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let password_hash = hasher
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| {
            AppError::Unexpected(anyhow::Error::new(e).context("Failed to hash password"))
        })?
        .to_string();

    tracing::debug!(
        "Password hash computed successfully (length: {})",
        password_hash.len()
    );
    Ok(password_hash)
}
