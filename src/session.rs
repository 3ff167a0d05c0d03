#![cfg(not(tarpaulin_include))]

use crate::app::AppState;
use crate::login::AuthUser;
use crate::pipeline::{Dataset, Selections};
use axum::{
    Json,
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime};
use uuid::Uuid;

/// Name of the cookie carrying the session id
pub const SESSION_COOKIE: &str = "session";

/// The upload a session is working on
#[derive(Clone, Debug)]
pub struct Workspace {
    pub dataset: Arc<Dataset>,
    pub selections: Selections,
}

/// User session data
#[derive(Clone, Debug)]
pub struct Session {
    pub user: AuthUser,

    /// Time when the session expires
    pub expires_at: SystemTime,

    /// Current upload, if any
    pub workspace: Option<Workspace>,
}

/// The caller's session, inserted into request extensions by [`require_auth`]
#[derive(Clone, Debug)]
pub struct CurrentSession {
    pub id: String,
    pub user: AuthUser,
}

/// Active sessions, keyed by session id
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Session>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        SessionStore {
            sessions: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Create a new user session
    ///
    /// # Returns
    /// * `String` - A unique session ID
    pub fn create(&self, user: AuthUser) -> String {
        let session_id = Uuid::new_v4().to_string();
        let session = Session {
            user,
            expires_at: SystemTime::now() + self.ttl,
            workspace: None,
        };

        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        sessions.insert(session_id.clone(), session);

        session_id
    }

    /// Returns the session's user, dropping the session if it has expired.
    pub fn validate(&self, session_id: &str) -> Option<AuthUser> {
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        match sessions.get(session_id) {
            Some(session) if session.expires_at > SystemTime::now() => Some(session.user.clone()),
            Some(_) => {
                sessions.remove(session_id);
                None
            }
            None => None,
        }
    }

    pub fn remove(&self, session_id: &str) {
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        sessions.remove(session_id);
    }

    pub fn workspace(&self, session_id: &str) -> Option<Workspace> {
        let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
        sessions.get(session_id).and_then(|s| s.workspace.clone())
    }

    /// Replaces the session's workspace; false if the session is gone.
    pub fn set_workspace(&self, session_id: &str, workspace: Workspace) -> bool {
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        match sessions.get_mut(session_id) {
            Some(session) => {
                session.workspace = Some(workspace);
                true
            }
            None => false,
        }
    }

    /// Swaps in new selections if the session still holds `dataset`.
    ///
    /// Returns false when the session is gone or a newer upload replaced the
    /// dataset the selections were checked against.
    pub fn replace_selections(
        &self,
        session_id: &str,
        dataset: &Arc<Dataset>,
        selections: Selections,
    ) -> bool {
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        match sessions.get_mut(session_id).and_then(|s| s.workspace.as_mut()) {
            Some(workspace) if Arc::ptr_eq(&workspace.dataset, dataset) => {
                workspace.selections = selections;
                true
            }
            _ => false,
        }
    }

    /// Drops every expired session and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = SystemTime::now();
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        let before = sessions.len();
        sessions.retain(|_, s| s.expires_at > now);
        before - sessions.len()
    }
}

/// Authentication middleware
///
/// Lets the request through when the session cookie names a live session,
/// answers 401 otherwise.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        if let Some(user) = state.sessions.validate(cookie.value()) {
            request.extensions_mut().insert(CurrentSession {
                id: cookie.value().to_string(),
                user,
            });
            return next.run(request).await;
        }
    }

    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "error": "unauthorized", "message": "Please log in." })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> AuthUser {
        AuthUser {
            email: "ana@example.com".to_string(),
            name: "ana".to_string(),
        }
    }

    fn workspace() -> Workspace {
        let dataset = Dataset::from_upload(b"region,sales\nN,100\n", "sales.csv").unwrap();
        let selections = Selections::defaults(&dataset.columns).unwrap();
        Workspace {
            dataset: Arc::new(dataset),
            selections,
        }
    }

    #[test]
    fn sessions_validate_until_removed() {
        let store = SessionStore::new(Duration::from_secs(60));
        let id = store.create(user());
        assert_eq!(store.validate(&id), Some(user()));
        assert_eq!(store.validate("unknown"), None);

        store.remove(&id);
        assert_eq!(store.validate(&id), None);
    }

    #[test]
    fn expired_sessions_are_dropped() {
        let store = SessionStore::new(Duration::ZERO);
        let id = store.create(user());
        assert_eq!(store.validate(&id), None);

        store.create(user());
        assert_eq!(store.purge_expired(), 1);
    }

    #[test]
    fn workspaces_are_per_session() {
        let store = SessionStore::new(Duration::from_secs(60));
        let a = store.create(user());
        let b = store.create(user());

        assert!(store.set_workspace(&a, workspace()));
        assert!(store.workspace(&a).is_some());
        assert!(store.workspace(&b).is_none());
        assert!(!store.set_workspace("gone", workspace()));
    }

    #[test]
    fn selections_do_not_overwrite_newer_upload() {
        let store = SessionStore::new(Duration::from_secs(60));
        let id = store.create(user());
        let first = workspace();
        let checked_against = first.dataset.clone();
        store.set_workspace(&id, first);

        let mut changed = store.workspace(&id).unwrap().selections;
        changed.report_columns = vec!["sales".to_string()];
        assert!(store.replace_selections(&id, &checked_against, changed.clone()));
        assert_eq!(store.workspace(&id).unwrap().selections, changed);

        // A second upload lands before the next selection update.
        let second = workspace();
        let newest = second.dataset.clone();
        store.set_workspace(&id, second);

        assert!(!store.replace_selections(&id, &checked_against, changed.clone()));
        let current = store.workspace(&id).unwrap();
        assert!(Arc::ptr_eq(&current.dataset, &newest));
        assert_ne!(current.selections, changed);

        assert!(!store.replace_selections("gone", &newest, changed));
    }
}
