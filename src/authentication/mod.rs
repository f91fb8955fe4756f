mod password;

pub use password::{compute_password_hash, validate_credentials, AuthError, Credentials};
