/**
 * Authentication Providers
 * Local password accounts and the Google / GitHub authorization-code flows
 */
use reqwest::header::{ACCEPT, USER_AGENT};
use serde::Deserialize;

use crate::auth::password::verify_password;
use crate::config::{OAuthClientConfig, OAuthConfig};
use crate::db::models::{NewUser, ProviderKind, Role, User};
use crate::error::{AppError, Result};
use crate::store::UserStore;

const GOOGLE_AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v3/userinfo";

const GITHUB_AUTHORIZE_URL: &str = "https://github.com/login/oauth/authorize";
const GITHUB_TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
const GITHUB_USER_URL: &str = "https://api.github.com/user";
const GITHUB_EMAILS_URL: &str = "https://api.github.com/user/emails";

const CLIENT_AGENT: &str = concat!("portfolio-cms/", env!("CARGO_PKG_VERSION"));

const INVALID_CREDENTIALS: &str = "Invalid credentials";

/// What a caller presents to a provider
#[derive(Debug, Clone)]
pub enum Credentials {
    Password { email: String, password: String },
    AuthorizationCode { code: String },
}

/// Profile asserted by an OAuth provider
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalProfile {
    pub provider: ProviderKind,
    pub provider_id: String,
    pub email: String,
    pub name: String,
    pub avatar: Option<String>,
}

#[derive(Debug, Clone)]
pub enum Identity {
    /// An existing account that proved its password
    Account(User),
    External(ExternalProfile),
}

#[derive(Debug, Clone)]
pub struct OAuthClient {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

#[derive(Debug, Clone)]
pub enum AuthProvider {
    Local,
    GoogleOAuth(OAuthClient),
    GitHubOAuth(OAuthClient),
}

#[derive(Deserialize)]
struct AccessTokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct GoogleUser {
    sub: String,
    email: Option<String>,
    name: Option<String>,
    picture: Option<String>,
}

#[derive(Deserialize)]
struct GitHubUser {
    id: i64,
    login: String,
    name: Option<String>,
    email: Option<String>,
    avatar_url: Option<String>,
}

#[derive(Deserialize)]
struct GitHubEmail {
    email: String,
    primary: bool,
    verified: bool,
}

impl AuthProvider {
    /// The configured OAuth provider for `kind`, if its client credentials are set.
    pub fn oauth(kind: ProviderKind, config: &OAuthConfig) -> Option<Self> {
        let client = |c: &OAuthClientConfig| OAuthClient {
            client_id: c.client_id.clone(),
            client_secret: c.client_secret.clone(),
            redirect_uri: format!(
                "{}/api/v1/auth/{}/callback",
                config.callback_base.trim_end_matches('/'),
                kind
            ),
        };
        match kind {
            ProviderKind::Google => config.google.as_ref().map(|c| Self::GoogleOAuth(client(c))),
            ProviderKind::Github => config.github.as_ref().map(|c| Self::GitHubOAuth(client(c))),
            ProviderKind::Local => Some(Self::Local),
        }
    }

    pub fn kind(&self) -> ProviderKind {
        match self {
            AuthProvider::Local => ProviderKind::Local,
            AuthProvider::GoogleOAuth(_) => ProviderKind::Google,
            AuthProvider::GitHubOAuth(_) => ProviderKind::Github,
        }
    }

    /// Consent-screen URL carrying `state` back to the callback.
    pub fn authorize_url(&self, state: &str) -> Result<String> {
        let (base, client, scope) = match self {
            AuthProvider::Local => {
                return Err(AppError::BadRequest(
                    "Local accounts have no authorization flow".into(),
                ))
            }
            AuthProvider::GoogleOAuth(c) => (GOOGLE_AUTHORIZE_URL, c, "openid email profile"),
            AuthProvider::GitHubOAuth(c) => (GITHUB_AUTHORIZE_URL, c, "user:email"),
        };
        let url = reqwest::Url::parse_with_params(
            base,
            &[
                ("client_id", client.client_id.as_str()),
                ("redirect_uri", client.redirect_uri.as_str()),
                ("response_type", "code"),
                ("scope", scope),
                ("state", state),
            ],
        )
        .map_err(AppError::internal)?;
        Ok(url.into())
    }

    pub async fn verify<U>(
        &self,
        users: &U,
        http: &reqwest::Client,
        credentials: Credentials,
    ) -> Result<Identity>
    where
        U: UserStore + ?Sized,
    {
        match (self, credentials) {
            (AuthProvider::Local, Credentials::Password { email, password }) => {
                verify_local(users, &email, password).await
            }
            (AuthProvider::GoogleOAuth(client), Credentials::AuthorizationCode { code }) => {
                google_profile(http, client, &code).await.map(Identity::External)
            }
            (AuthProvider::GitHubOAuth(client), Credentials::AuthorizationCode { code }) => {
                github_profile(http, client, &code).await.map(Identity::External)
            }
            _ => Err(AppError::BadRequest(
                "Unsupported credentials for this provider".into(),
            )),
        }
    }
}

async fn verify_local<U>(users: &U, email: &str, password: String) -> Result<Identity>
where
    U: UserStore + ?Sized,
{
    let user = users
        .find_user_by_email(&email.to_lowercase())
        .await?
        .filter(|u| u.is_active)
        .ok_or_else(|| AppError::Unauthorized(INVALID_CREDENTIALS.into()))?;

    let hash = user
        .password_hash
        .clone()
        .ok_or_else(|| AppError::Unauthorized(INVALID_CREDENTIALS.into()))?;

    if !verify_password(password, hash).await? {
        return Err(AppError::Unauthorized(INVALID_CREDENTIALS.into()));
    }
    Ok(Identity::Account(user))
}

async fn exchange_code(
    http: &reqwest::Client,
    token_url: &str,
    client: &OAuthClient,
    code: &str,
) -> Result<String> {
    let token: AccessTokenResponse = http
        .post(token_url)
        .header(ACCEPT, "application/json")
        .form(&[
            ("code", code),
            ("client_id", client.client_id.as_str()),
            ("client_secret", client.client_secret.as_str()),
            ("redirect_uri", client.redirect_uri.as_str()),
            ("grant_type", "authorization_code"),
        ])
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    Ok(token.access_token)
}

async fn google_profile(
    http: &reqwest::Client,
    client: &OAuthClient,
    code: &str,
) -> Result<ExternalProfile> {
    let access_token = exchange_code(http, GOOGLE_TOKEN_URL, client, code).await?;
    let user: GoogleUser = http
        .get(GOOGLE_USERINFO_URL)
        .bearer_auth(&access_token)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    let email = user.email.ok_or_else(missing_email)?;
    Ok(ExternalProfile {
        provider: ProviderKind::Google,
        provider_id: user.sub,
        name: user.name.unwrap_or_else(|| email.clone()),
        email: email.to_lowercase(),
        avatar: user.picture,
    })
}

async fn github_profile(
    http: &reqwest::Client,
    client: &OAuthClient,
    code: &str,
) -> Result<ExternalProfile> {
    let access_token = exchange_code(http, GITHUB_TOKEN_URL, client, code).await?;
    let user: GitHubUser = http
        .get(GITHUB_USER_URL)
        .bearer_auth(&access_token)
        .header(USER_AGENT, CLIENT_AGENT)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    let email = match user.email {
        Some(email) => email,
        None => {
            let emails: Vec<GitHubEmail> = http
                .get(GITHUB_EMAILS_URL)
                .bearer_auth(&access_token)
                .header(USER_AGENT, CLIENT_AGENT)
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;
            emails
                .into_iter()
                .find(|e| e.primary && e.verified)
                .map(|e| e.email)
                .ok_or_else(missing_email)?
        }
    };

    Ok(ExternalProfile {
        provider: ProviderKind::Github,
        provider_id: user.id.to_string(),
        name: user.name.unwrap_or(user.login),
        email: email.to_lowercase(),
        avatar: user.avatar_url,
    })
}

fn missing_email() -> AppError {
    AppError::Unauthorized("OAuth provider did not return an email address".into())
}

/// The account an identity signs in as. External profiles match by provider
/// id, then by email (linking the provider), else a new account is created.
pub async fn resolve_account<U>(users: &U, identity: Identity) -> Result<User>
where
    U: UserStore + ?Sized,
{
    let profile = match identity {
        Identity::Account(user) => return Ok(user),
        Identity::External(profile) => profile,
    };

    let existing = match users
        .find_user_by_provider(profile.provider, &profile.provider_id)
        .await?
    {
        Some(user) => Some(user),
        None => match users.find_user_by_email(&profile.email).await? {
            Some(user) if user.provider_id.is_none() => {
                users
                    .link_provider(&user.id, profile.provider, &profile.provider_id)
                    .await?;
                tracing::info!(user_id = %user.id, provider = %profile.provider, "linked auth provider");
                users.find_user(&user.id).await?
            }
            other => other,
        },
    };

    let user = match existing {
        Some(user) => user,
        None => {
            let user = users
                .insert_user(NewUser {
                    email: profile.email,
                    password_hash: None,
                    name: profile.name,
                    avatar: profile.avatar,
                    role: Role::User,
                    provider: profile.provider,
                    provider_id: Some(profile.provider_id),
                })
                .await?;
            tracing::info!(user_id = %user.id, provider = %user.provider, "user registered via oauth");
            user
        }
    };

    if !user.is_active {
        return Err(AppError::Unauthorized(INVALID_CREDENTIALS.into()));
    }
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::password::hash_password;
    use crate::config::AppConfig;
    use crate::store::MemoryStore;

    fn oauth_config() -> OAuthConfig {
        OAuthConfig {
            google: Some(OAuthClientConfig {
                client_id: "google-id".into(),
                client_secret: "google-secret".into(),
            }),
            github: None,
            callback_base: "http://localhost:5000/".into(),
        }
    }

    async fn local_user(store: &MemoryStore, email: &str, active: bool) -> User {
        let user = store
            .insert_user(NewUser {
                email: email.into(),
                password_hash: Some(hash_password("Password1!".into(), 4).await.unwrap()),
                name: "Local User".into(),
                avatar: None,
                role: Role::User,
                provider: ProviderKind::Local,
                provider_id: None,
            })
            .await
            .unwrap();
        if !active {
            store.set_active(&user.id, false).await;
        }
        user
    }

    #[test]
    fn test_oauth_requires_client_credentials() {
        let config = oauth_config();
        assert!(AuthProvider::oauth(ProviderKind::Google, &config).is_some());
        assert!(AuthProvider::oauth(ProviderKind::Github, &config).is_none());
        assert!(AuthProvider::oauth(ProviderKind::Github, &AppConfig::default().oauth).is_none());
    }

    #[test]
    fn test_authorize_url_carries_state_and_callback() {
        let provider = AuthProvider::oauth(ProviderKind::Google, &oauth_config()).unwrap();
        let url = reqwest::Url::parse(&provider.authorize_url("abc123").unwrap()).unwrap();
        let params: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(params["state"], "abc123");
        assert_eq!(params["client_id"], "google-id");
        assert_eq!(
            params["redirect_uri"],
            "http://localhost:5000/api/v1/auth/google/callback"
        );
        assert!(AuthProvider::Local.authorize_url("x").is_err());
    }

    #[tokio::test]
    async fn test_local_verify() {
        let store = MemoryStore::new();
        let http = reqwest::Client::new();
        local_user(&store, "jane@example.com", true).await;

        let ok = AuthProvider::Local
            .verify(
                &store,
                &http,
                Credentials::Password {
                    email: "Jane@Example.com".into(),
                    password: "Password1!".into(),
                },
            )
            .await;
        assert!(matches!(ok, Ok(Identity::Account(u)) if u.email == "jane@example.com"));

        let wrong = AuthProvider::Local
            .verify(
                &store,
                &http,
                Credentials::Password {
                    email: "jane@example.com".into(),
                    password: "nope".into(),
                },
            )
            .await;
        assert!(matches!(wrong, Err(AppError::Unauthorized(m)) if m == "Invalid credentials"));
    }

    #[tokio::test]
    async fn test_inactive_account_cannot_sign_in() {
        let store = MemoryStore::new();
        local_user(&store, "off@example.com", false).await;
        let result = AuthProvider::Local
            .verify(
                &store,
                &reqwest::Client::new(),
                Credentials::Password {
                    email: "off@example.com".into(),
                    password: "Password1!".into(),
                },
            )
            .await;
        assert!(matches!(result, Err(AppError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_mismatched_credentials_are_rejected() {
        let store = MemoryStore::new();
        let result = AuthProvider::Local
            .verify(
                &store,
                &reqwest::Client::new(),
                Credentials::AuthorizationCode { code: "x".into() },
            )
            .await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_external_profile_links_existing_email() {
        let store = MemoryStore::new();
        let local = local_user(&store, "jane@example.com", true).await;
        let profile = ExternalProfile {
            provider: ProviderKind::Github,
            provider_id: "42".into(),
            email: "jane@example.com".into(),
            name: "Jane".into(),
            avatar: None,
        };

        let user = resolve_account(&store, Identity::External(profile.clone()))
            .await
            .unwrap();
        assert_eq!(user.id, local.id);
        assert_eq!(user.provider, ProviderKind::Github);

        let again = resolve_account(&store, Identity::External(profile)).await.unwrap();
        assert_eq!(again.id, local.id);
    }

    #[tokio::test]
    async fn test_external_profile_creates_account() {
        let store = MemoryStore::new();
        let user = resolve_account(
            &store,
            Identity::External(ExternalProfile {
                provider: ProviderKind::Google,
                provider_id: "g-1".into(),
                email: "new@example.com".into(),
                name: "New Person".into(),
                avatar: Some("https://example.com/a.png".into()),
            }),
        )
        .await
        .unwrap();
        assert_eq!(user.role, Role::User);
        assert!(user.password_hash.is_none());
        assert!(user.has_login_path());
    }
}
