/**
 * Auth Module
 * Tokens, password hashing, identity providers and request extractors
 */
pub mod extract;
pub mod jwt;
pub mod password;
pub mod provider;

pub use extract::{AdminUser, AuthUser, MaybeAuthUser};
pub use jwt::{token_digest, Claims, JwtKeys, TokenPair};
pub use provider::{AuthProvider, Credentials, ExternalProfile, Identity};

pub const TOKEN_COOKIE: &str = "token";
pub const OAUTH_STATE_COOKIE: &str = "oauth_state";

/// `Set-Cookie` value for an HttpOnly, strict same-site cookie.
pub fn cookie(name: &str, value: &str, max_age_secs: i64, secure: bool) -> String {
    build_cookie(name, value, max_age_secs, secure, "Strict")
}

/// Like [`cookie`] but sent on the top-level redirect back from an OAuth provider.
pub fn redirect_cookie(name: &str, value: &str, max_age_secs: i64, secure: bool) -> String {
    build_cookie(name, value, max_age_secs, secure, "Lax")
}

/// `Set-Cookie` value that expires `name` immediately.
pub fn clear_cookie(name: &str, secure: bool) -> String {
    cookie(name, "", 0, secure)
}

fn build_cookie(name: &str, value: &str, max_age_secs: i64, secure: bool, same_site: &str) -> String {
    let mut cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite={}; Max-Age={}",
        name,
        value,
        same_site,
        max_age_secs.max(0)
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}
