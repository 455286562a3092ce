//! bcrypt hashing, run on the blocking pool so request tasks keep moving.

use crate::error::{AppError, Result};

pub async fn hash_password(plain: String, cost: u32) -> Result<String> {
    tokio::task::spawn_blocking(move || bcrypt::hash(plain, cost))
        .await
        .map_err(AppError::internal)?
        .map_err(AppError::from)
}

pub async fn verify_password(plain: String, hash: String) -> Result<bool> {
    tokio::task::spawn_blocking(move || bcrypt::verify(plain, &hash))
        .await
        .map_err(AppError::internal)?
        .map_err(AppError::from)
}
