use crate::server::error::{AppResult, Error};

/// argon2id with the crate's default (OWASP) parameters
pub fn hash_password(password: &str) -> AppResult<String> {
    let salt: [u8; 16] = rand::random();
    argon2::hash_encoded(password.as_bytes(), &salt, &argon2::Config::default()).map_err(|e| {
        Error::InternalServerErrorWithContext(format!("password hashing failed: {}", e))
    })
}

/// a malformed stored hash verifies as false rather than erroring
pub fn verify_password(password: &str, password_hash: &str) -> bool {
    argon2::verify_encoded(password_hash, password.as_bytes()).unwrap_or(false)
}

/// hashing is deliberately slow, keep it off the async workers
pub async fn hash_password_blocking(password: String) -> AppResult<String> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| Error::InternalServerErrorWithContext(format!("hashing task failed: {}", e)))?
}

pub async fn verify_password_blocking(password: String, password_hash: String) -> bool {
    tokio::task::spawn_blocking(move || verify_password(&password, &password_hash))
        .await
        .unwrap_or(false)
}
