#![cfg(not(tarpaulin_include))]

use crate::app::AppState;
use crate::config::{AuthBackend, ServerConfig};
use crate::session::SESSION_COOKIE;
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use log::{info, warn};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::{self, create_dir_all};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};
use thiserror::Error;

/// Shortest accepted password
pub const MIN_PASSWORD_LEN: usize = 6;

/// How long a recovery code stays valid
pub const RECOVERY_CODE_TTL: Duration = Duration::from_secs(60 * 60);

/// Authentication failures
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("An account with this email already exists.")]
    AlreadyRegistered,

    #[error("No account is registered with this email.")]
    UnknownEmail,

    #[error("Invalid reset code.")]
    InvalidCode,

    #[error("The reset code has expired.")]
    CodeExpired,

    #[error("Password recovery is not available for this account backend.")]
    Unsupported,

    #[error("User storage error: {0}")]
    Storage(String),

    #[error("Authentication backend error: {0}")]
    Backend(String),
}

impl AuthError {
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::InvalidInput(_) => "invalid_input",
            AuthError::AlreadyRegistered => "already_registered",
            AuthError::UnknownEmail => "unknown_email",
            AuthError::InvalidCode => "invalid_code",
            AuthError::CodeExpired => "code_expired",
            AuthError::Unsupported => "unsupported",
            AuthError::Storage(_) => "storage_error",
            AuthError::Backend(_) => "backend_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::InvalidInput(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AuthError::AlreadyRegistered => StatusCode::CONFLICT,
            AuthError::UnknownEmail => StatusCode::NOT_FOUND,
            AuthError::InvalidCode | AuthError::CodeExpired => StatusCode::BAD_REQUEST,
            AuthError::Unsupported => StatusCode::NOT_IMPLEMENTED,
            AuthError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AuthError::Backend(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        if matches!(self, AuthError::Storage(_) | AuthError::Backend(_)) {
            warn!("authentication failure: {}", self);
        }
        let body = Json(json!({ "error": self.kind(), "message": self.to_string() }));
        (self.status(), body).into_response()
    }
}

/// A signed-in account
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuthUser {
    pub email: String,
    pub name: String,
}

/// A freshly issued password recovery code
#[derive(Clone, Debug)]
pub struct RecoveryCode {
    pub code: String,
    pub expires_at: SystemTime,
}

/// Account storage behind the login screens
///
/// Implementations block (file or network I/O, password hashing); call them
/// off the async runtime.
pub trait AuthProvider: Send + Sync {
    /// Returns the account when `password` matches, `None` otherwise.
    fn verify(&self, email: &str, password: &str) -> Result<Option<AuthUser>, AuthError>;

    /// Registers a new account.
    fn create_account(&self, email: &str, password: &str, name: &str) -> Result<AuthUser, AuthError>;

    /// Issues a single-use recovery code for `email`.
    fn request_recovery(&self, email: &str) -> Result<RecoveryCode, AuthError>;

    /// Replaces the password if `code` is the valid recovery code of `email`.
    fn reset_password(&self, email: &str, code: &str, new_password: &str) -> Result<(), AuthError>;
}

/// Builds the provider selected by `config`.
///
/// # Errors
/// * [`AuthError::InvalidInput`] if the convex backend is chosen without a URL
/// * [`AuthError::Storage`] if the local users file cannot be created
pub fn provider_from_config(config: &ServerConfig) -> Result<Arc<dyn AuthProvider>, AuthError> {
    match config.auth_backend {
        AuthBackend::Local => Ok(Arc::new(LocalAuthProvider::open(&config.users_file)?)),
        AuthBackend::Convex => {
            let url = config.convex_url.as_deref().ok_or_else(|| {
                AuthError::InvalidInput("CONVEX_URL is required for the convex backend".to_string())
            })?;
            Ok(Arc::new(ConvexAuthProvider::new(url)))
        }
    }
}

/// Trims and lowercases an email address so lookups ignore case.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Display name derived from an email address: the part before `@`.
pub fn display_name(email: &str) -> String {
    email.trim().split('@').next().unwrap_or_default().to_string()
}

fn validate_email(email: &str) -> Result<(), AuthError> {
    let (local, domain) = email
        .split_once('@')
        .ok_or_else(|| AuthError::InvalidInput("Please enter a valid email address.".to_string()))?;
    if local.is_empty() || domain.is_empty() {
        return Err(AuthError::InvalidInput("Please enter a valid email address.".to_string()));
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthError::InvalidInput(format!(
            "Password must be at least {} characters.",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

/// Generate an 8 character recovery code from `A-Z0-9`
pub fn generate_reset_code() -> String {
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    let mut rng = rand::thread_rng();

    (0..8)
        .map(|_| {
            let idx = rng.gen_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect()
}

/// Stored account of the local backend
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct User {
    pub email: String,
    pub name: String,

    /// Argon2 hash of the user's password
    pub password_hash: String,

    /// Password reset code (if a reset has been requested)
    #[serde(default)]
    pub reset_code: Option<String>,

    /// Expiration time for the reset code
    #[serde(default)]
    pub reset_code_expires: Option<SystemTime>,
}

/// Accounts kept in a JSON file, keyed by normalized email
pub struct LocalAuthProvider {
    path: PathBuf,
    lock: Mutex<()>,
}

impl LocalAuthProvider {
    /// Opens the users file, creating it (and its directory) when missing
    ///
    /// # Arguments
    /// * `path` - Location of the users file
    ///
    /// # Errors
    /// * [`AuthError::Storage`] if the directory or file cannot be created
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AuthError> {
        let path = path.as_ref().to_path_buf();

        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                create_dir_all(dir).map_err(|e| AuthError::Storage(e.to_string()))?;
            }
        }
        if !path.exists() {
            fs::write(&path, b"{}").map_err(|e| AuthError::Storage(e.to_string()))?;
        }

        Ok(LocalAuthProvider {
            path,
            lock: Mutex::new(()),
        })
    }

    fn read_users(&self) -> Result<HashMap<String, User>, AuthError> {
        let contents = fs::read_to_string(&self.path)
            .map_err(|e| AuthError::Storage(format!("failed to read users file: {}", e)))?;
        serde_json::from_str(&contents)
            .map_err(|e| AuthError::Storage(format!("failed to parse users file: {}", e)))
    }

    fn write_users(&self, users: &HashMap<String, User>) -> Result<(), AuthError> {
        let json = serde_json::to_string_pretty(users)
            .map_err(|e| AuthError::Storage(format!("failed to serialize users: {}", e)))?;
        fs::write(&self.path, json)
            .map_err(|e| AuthError::Storage(format!("failed to write users file: {}", e)))
    }

    // Serializes read-modify-write cycles on the users file.
    fn with_users<T>(
        &self,
        f: impl FnOnce(&mut HashMap<String, User>) -> Result<(T, bool), AuthError>,
    ) -> Result<T, AuthError> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| AuthError::Storage("users file lock poisoned".to_string()))?;
        let mut users = self.read_users()?;
        let (result, changed) = f(&mut users)?;
        if changed {
            self.write_users(&users)?;
        }
        Ok(result)
    }
}

impl AuthProvider for LocalAuthProvider {
    fn verify(&self, email: &str, password: &str) -> Result<Option<AuthUser>, AuthError> {
        let key = normalize_email(email);
        self.with_users(|users| {
            let user = match users.get(&key) {
                Some(user) => user,
                None => return Ok((None, false)),
            };
            let verified = verify_password(password, &user.password_hash)?.then(|| AuthUser {
                email: user.email.clone(),
                name: user.name.clone(),
            });
            Ok((verified, false))
        })
    }

    fn create_account(&self, email: &str, password: &str, name: &str) -> Result<AuthUser, AuthError> {
        let key = normalize_email(email);
        validate_email(&key)?;
        validate_password(password)?;

        self.with_users(|users| {
            if users.contains_key(&key) {
                return Err(AuthError::AlreadyRegistered);
            }
            let user = User {
                email: key.clone(),
                name: name.to_string(),
                password_hash: hash_password(password)?,
                reset_code: None,
                reset_code_expires: None,
            };
            users.insert(key.clone(), user);
            Ok((
                AuthUser {
                    email: key.clone(),
                    name: name.to_string(),
                },
                true,
            ))
        })
    }

    fn request_recovery(&self, email: &str) -> Result<RecoveryCode, AuthError> {
        let key = normalize_email(email);
        self.with_users(|users| {
            let user = users.get_mut(&key).ok_or(AuthError::UnknownEmail)?;
            let code = RecoveryCode {
                code: generate_reset_code(),
                expires_at: SystemTime::now() + RECOVERY_CODE_TTL,
            };
            user.reset_code = Some(code.code.clone());
            user.reset_code_expires = Some(code.expires_at);
            Ok((code, true))
        })
    }

    fn reset_password(&self, email: &str, code: &str, new_password: &str) -> Result<(), AuthError> {
        let key = normalize_email(email);
        validate_password(new_password)?;

        self.with_users(|users| {
            let user = users.get_mut(&key).ok_or(AuthError::UnknownEmail)?;
            let (stored, expires) = match (&user.reset_code, user.reset_code_expires) {
                (Some(stored), Some(expires)) => (stored.clone(), expires),
                _ => return Err(AuthError::InvalidCode),
            };
            if SystemTime::now() > expires {
                user.reset_code = None;
                user.reset_code_expires = None;
                return Ok((Err(AuthError::CodeExpired), true));
            }
            if stored != code.trim().to_uppercase() {
                return Err(AuthError::InvalidCode);
            }

            user.password_hash = hash_password(new_password)?;
            user.reset_code = None;
            user.reset_code_expires = None;
            Ok((Ok(()), true))
        })?
    }
}

fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::Storage("password hashing failed".to_string()))
}

fn verify_password(password: &str, hash: &str) -> Result<bool, AuthError> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|_| AuthError::Storage("invalid password hash format".to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// Accounts kept in a Convex deployment
///
/// Talks to the deployment's HTTP API (`users:verifyUser`, `users:createUser`).
/// Passwords travel as SHA-256 hex digests; password recovery is not offered.
pub struct ConvexAuthProvider {
    base_url: String,
    agent: ureq::Agent,
}

#[derive(Debug, Deserialize)]
struct ConvexReply {
    status: String,
    #[serde(default)]
    value: Value,
    #[serde(rename = "errorMessage", default)]
    error_message: Option<String>,
}

impl ConvexAuthProvider {
    pub fn new(base_url: &str) -> Self {
        ConvexAuthProvider {
            base_url: base_url.trim_end_matches('/').to_string(),
            agent: ureq::AgentBuilder::new()
                .timeout(Duration::from_secs(15))
                .build(),
        }
    }

    /// Runs a query or mutation function and returns its value.
    fn call(&self, kind: &str, path: &str, args: Value) -> Result<Value, AuthError> {
        let url = format!("{}/api/{}", self.base_url, kind);
        let body = json!({ "path": path, "args": args, "format": "json" });

        let response = match self.agent.post(&url).send_json(body) {
            Ok(response) => response,
            Err(ureq::Error::Status(_, response)) => response,
            Err(e) => return Err(AuthError::Backend(e.to_string())),
        };
        let reply: ConvexReply = response
            .into_json()
            .map_err(|e| AuthError::Backend(format!("unreadable reply from {}: {}", path, e)))?;

        if reply.status == "success" {
            Ok(reply.value)
        } else {
            Err(convex_error(reply.error_message.as_deref().unwrap_or("unknown error")))
        }
    }
}

fn convex_error(message: &str) -> AuthError {
    if message.contains("already exists") {
        AuthError::AlreadyRegistered
    } else {
        AuthError::Backend(message.to_string())
    }
}

/// SHA-256 of `password` as lowercase hex.
pub fn sha256_hex(password: &str) -> String {
    Sha256::digest(password.as_bytes())
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

impl AuthProvider for ConvexAuthProvider {
    fn verify(&self, email: &str, password: &str) -> Result<Option<AuthUser>, AuthError> {
        let value = self.call(
            "query",
            "users:verifyUser",
            json!({ "email": email.trim(), "passwordHash": sha256_hex(password) }),
        )?;
        if value.is_null() {
            return Ok(None);
        }
        serde_json::from_value(value)
            .map(Some)
            .map_err(|e| AuthError::Backend(e.to_string()))
    }

    fn create_account(&self, email: &str, password: &str, name: &str) -> Result<AuthUser, AuthError> {
        let email = email.trim();
        validate_email(email)?;
        validate_password(password)?;
        self.call(
            "mutation",
            "users:createUser",
            json!({ "email": email, "passwordHash": sha256_hex(password), "name": name }),
        )?;
        Ok(AuthUser {
            email: email.to_string(),
            name: name.to_string(),
        })
    }

    fn request_recovery(&self, _email: &str) -> Result<RecoveryCode, AuthError> {
        Err(AuthError::Unsupported)
    }

    fn reset_password(&self, _email: &str, _code: &str, _new_password: &str) -> Result<(), AuthError> {
        Err(AuthError::Unsupported)
    }
}

/// Login form data
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Signup form data
#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

/// Password reset request data
#[derive(Debug, Deserialize)]
pub struct PasswordResetRequest {
    pub email: String,
}

/// Password reset confirmation data
#[derive(Debug, Deserialize)]
pub struct PasswordResetConfirm {
    pub email: String,
    pub code: String,
    pub new_password: String,
}

// Runs a blocking provider call on tokio's blocking pool.
async fn run_blocking<T: Send + 'static>(
    f: impl FnOnce() -> Result<T, AuthError> + Send + 'static,
) -> Result<T, AuthError> {
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AuthError::Backend(e.to_string()))?
}

fn session_cookie(session_id: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, session_id))
        .path("/")
        .http_only(true)
        .build()
}

/// Handle user login
///
/// Verifies the credentials and opens a session.
///
/// # Returns
/// * The account and a session cookie, or 401 when the credentials do not match
pub async fn handle_login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(credentials): Json<LoginRequest>,
) -> Response {
    if credentials.email.trim().is_empty() || credentials.password.is_empty() {
        return AuthError::InvalidInput("Please enter your email and password.".to_string())
            .into_response();
    }

    let auth = state.auth.clone();
    let email = credentials.email.clone();
    match run_blocking(move || auth.verify(&email, &credentials.password)).await {
        Ok(Some(user)) => {
            info!("user {} logged in", user.email);
            let session_id = state.sessions.create(user.clone());
            (jar.add(session_cookie(session_id)), Json(user)).into_response()
        }
        Ok(None) => {
            warn!("failed login for {}", credentials.email.trim());
            (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "invalid_credentials", "message": "Incorrect email or password." })),
            )
                .into_response()
        }
        Err(e) => e.into_response(),
    }
}

/// Handle user registration
///
/// Creates the account, named after the local part of the email, and logs it in.
pub async fn handle_signup(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(form): Json<SignupRequest>,
) -> Result<(StatusCode, CookieJar, Json<AuthUser>), AuthError> {
    if form.email.trim().is_empty() || form.password.is_empty() {
        return Err(AuthError::InvalidInput("Please fill in every field.".to_string()));
    }
    if form.password != form.confirm_password {
        return Err(AuthError::InvalidInput("Passwords do not match.".to_string()));
    }
    validate_password(&form.password)?;

    let auth = state.auth.clone();
    let name = display_name(&form.email);
    let user = run_blocking(move || auth.create_account(&form.email, &form.password, &name)).await?;

    info!("registered user {}", user.email);
    let session_id = state.sessions.create(user.clone());
    Ok((StatusCode::CREATED, jar.add(session_cookie(session_id)), Json(user)))
}

/// Handle user logout
///
/// Drops the session and clears the cookie.
pub async fn handle_logout(State(state): State<Arc<AppState>>, jar: CookieJar) -> (CookieJar, StatusCode) {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        state.sessions.remove(cookie.value());
    }
    (
        jar.remove(Cookie::build(SESSION_COOKIE).path("/")),
        StatusCode::NO_CONTENT,
    )
}

/// Handle a password recovery request
///
/// Issues a recovery code and mails it when an SMTP relay is configured.
pub async fn handle_forgot_password(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PasswordResetRequest>,
) -> Result<Json<Value>, AuthError> {
    let auth = state.auth.clone();
    let email = request.email.clone();
    let code = run_blocking(move || auth.request_recovery(&email)).await?;

    match state.mailer.clone() {
        Some(mailer) => {
            let to = request.email.trim().to_string();
            run_blocking(move || {
                mailer
                    .send_recovery_code(&to, &code.code)
                    .map_err(|e| AuthError::Backend(format!("failed to send email: {}", e)))
            })
            .await?;
            info!("recovery code mailed to {}", request.email.trim());
        }
        None => warn!(
            "no SMTP relay configured, recovery code for {} was not delivered",
            request.email.trim()
        ),
    }

    Ok(Json(json!({ "status": "sent" })))
}

/// Handle password reset confirmation
pub async fn handle_reset_password(
    State(state): State<Arc<AppState>>,
    Json(confirm): Json<PasswordResetConfirm>,
) -> Result<Json<Value>, AuthError> {
    let auth = state.auth.clone();
    let email = confirm.email.clone();
    run_blocking(move || auth.reset_password(&email, &confirm.code, &confirm.new_password)).await?;

    info!("password reset for {}", confirm.email.trim());
    Ok(Json(json!({ "status": "reset" })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn provider(dir: &tempfile::TempDir) -> LocalAuthProvider {
        LocalAuthProvider::open(dir.path().join("database").join("users.json")).unwrap()
    }

    #[test]
    fn open_creates_users_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("users.json");
        LocalAuthProvider::open(&path).unwrap();
        assert_eq!(fs::read_to_string(path).unwrap(), "{}");
    }

    #[test]
    fn account_round_trip() {
        let dir = tempdir().unwrap();
        let auth = provider(&dir);

        let user = auth.create_account("Ana@Example.com", "secret1", "ana").unwrap();
        assert_eq!(user.email, "ana@example.com");

        let found = auth.verify(" ANA@example.com", "secret1").unwrap();
        assert_eq!(found, Some(user));
        assert_eq!(auth.verify("ana@example.com", "wrong!").unwrap(), None);
        assert_eq!(auth.verify("nobody@example.com", "secret1").unwrap(), None);

        let stored = fs::read_to_string(dir.path().join("database").join("users.json")).unwrap();
        assert!(!stored.contains("secret1"));
    }

    #[test]
    fn duplicate_and_invalid_accounts_are_rejected() {
        let dir = tempdir().unwrap();
        let auth = provider(&dir);
        auth.create_account("ana@example.com", "secret1", "ana").unwrap();

        assert!(matches!(
            auth.create_account("ana@example.com", "another", "ana"),
            Err(AuthError::AlreadyRegistered)
        ));
        assert!(matches!(
            auth.create_account("bob@example.com", "short", "bob"),
            Err(AuthError::InvalidInput(_))
        ));
        assert!(matches!(
            auth.create_account("not-an-email", "secret1", "x"),
            Err(AuthError::InvalidInput(_))
        ));
    }

    #[test]
    fn recovery_code_resets_password_once() {
        let dir = tempdir().unwrap();
        let auth = provider(&dir);
        auth.create_account("ana@example.com", "secret1", "ana").unwrap();

        let code = auth.request_recovery("ana@example.com").unwrap();
        assert_eq!(code.code.len(), 8);
        assert!(code.code.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));

        assert!(matches!(
            auth.reset_password("ana@example.com", "WRONG123", "newpass"),
            Err(AuthError::InvalidCode)
        ));
        auth.reset_password("ana@example.com", &code.code, "newpass").unwrap();
        assert!(auth.verify("ana@example.com", "newpass").unwrap().is_some());
        assert!(auth.verify("ana@example.com", "secret1").unwrap().is_none());

        assert!(matches!(
            auth.reset_password("ana@example.com", &code.code, "another1"),
            Err(AuthError::InvalidCode)
        ));
    }

    #[test]
    fn expired_code_is_rejected() {
        let dir = tempdir().unwrap();
        let auth = provider(&dir);
        auth.create_account("ana@example.com", "secret1", "ana").unwrap();
        let code = auth.request_recovery("ana@example.com").unwrap();

        let mut users = auth.read_users().unwrap();
        let user = users.get_mut("ana@example.com").unwrap();
        user.reset_code_expires = Some(SystemTime::now() - Duration::from_secs(1));
        auth.write_users(&users).unwrap();

        assert!(matches!(
            auth.reset_password("ana@example.com", &code.code, "newpass"),
            Err(AuthError::CodeExpired)
        ));
        assert!(matches!(
            auth.reset_password("ana@example.com", &code.code, "newpass"),
            Err(AuthError::InvalidCode)
        ));
    }

    #[test]
    fn recovery_for_unknown_email() {
        let dir = tempdir().unwrap();
        let auth = provider(&dir);
        assert!(matches!(
            auth.request_recovery("ghost@example.com"),
            Err(AuthError::UnknownEmail)
        ));
    }

    #[test]
    fn helpers() {
        assert_eq!(display_name("maria.silva@example.com"), "maria.silva");
        assert_eq!(
            sha256_hex("password"),
            "5e884898da28047151d0e56f8dc6292773603d0d6aabbdd62a11ef721d1542d8"
        );
        assert!(matches!(convex_error("Uncaught Error: User already exists"), AuthError::AlreadyRegistered));
        assert!(matches!(convex_error("boom"), AuthError::Backend(_)));
    }

    #[test]
    fn convex_recovery_is_unsupported() {
        let auth = ConvexAuthProvider::new("https://example.convex.cloud/");
        assert!(matches!(auth.request_recovery("a@b.c"), Err(AuthError::Unsupported)));
        assert!(matches!(
            auth.reset_password("a@b.c", "CODE", "secret1"),
            Err(AuthError::Unsupported)
        ));
    }
}
