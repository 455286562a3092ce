//! Create the first admin account.
//!
//! Usage: create-admin <EMAIL> <PASSWORD> [NAME]
//! Falls back to ADMIN_EMAIL / ADMIN_PASSWORD / ADMIN_NAME. Requires DATABASE_URL.

use portfolio_cms::{
    auth::password::hash_password,
    config::AppConfig,
    db::{self, models::NewUser, models::ProviderKind, models::Role, DbConfig},
    store::{PgStore, UserStore},
    validation::password_strength,
};
use std::{env, process};

fn arg_or_env(index: usize, key: &str) -> Option<String> {
    env::args()
        .nth(index)
        .or_else(|| env::var(key).ok())
        .filter(|v| !v.trim().is_empty())
}

fn fail(message: impl std::fmt::Display) -> ! {
    eprintln!("Error: {}", message);
    process::exit(1);
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let (Some(email), Some(password)) = (arg_or_env(1, "ADMIN_EMAIL"), arg_or_env(2, "ADMIN_PASSWORD"))
    else {
        eprintln!("Usage: cargo run --bin create-admin <EMAIL> <PASSWORD> [NAME]");
        process::exit(1);
    };
    let name = arg_or_env(3, "ADMIN_NAME").unwrap_or_else(|| "Administrator".to_string());

    if password_strength(&password).is_err() {
        fail("password needs 8+ characters with upper, lower, digit and one of @$!%*?&");
    }

    let config = AppConfig::from_env();
    let Some(db_config) = DbConfig::from_app(&config) else {
        fail("DATABASE_URL must be set; the in-memory store does not outlive this process");
    };

    let pool = db::init_pool(&db_config)
        .await
        .unwrap_or_else(|e| fail(e));
    db::run_migrations(&pool).await.unwrap_or_else(|e| fail(e));
    let store = PgStore::new(pool.clone());

    let email = email.trim().to_lowercase();
    if store
        .find_user_by_email(&email)
        .await
        .unwrap_or_else(|e| fail(e))
        .is_some()
    {
        fail(format!("an account for {} already exists", email));
    }

    let password_hash = hash_password(password, config.bcrypt_cost)
        .await
        .unwrap_or_else(|e| fail(e));
    let admin = store
        .insert_user(NewUser {
            email,
            password_hash: Some(password_hash),
            name,
            avatar: None,
            role: Role::Admin,
            provider: ProviderKind::Local,
            provider_id: None,
        })
        .await
        .unwrap_or_else(|e| fail(e));

    println!("\nAdmin created");
    println!("Id    : {}", admin.id);
    println!("Email : {}", admin.email);
    println!("Cost  : {}\n", config.bcrypt_cost);

    pool.close().await;
}
