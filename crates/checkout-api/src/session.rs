//! # Sessions
//!
//! Server-side session state keyed by a random id in the `sessionid` cookie.
//! The session carries the shopping bag, the customer's save-info preference
//! and one-shot flash messages shown on the next rendered page.
//!
//! Sessions are created on first write. A visitor who only reads pages is
//! never stored and never receives a cookie.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::Response,
};
use checkout_core::Bag;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{OnceCell, RwLock};
use tracing::debug;
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "sessionid";

/// Sessions idle for longer than this are dropped
const SESSION_TTL: Duration = Duration::from_secs(14 * 24 * 60 * 60);

/// Severity of a flash message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageLevel {
    Info,
    Success,
    Warning,
    Error,
}

impl MessageLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageLevel::Info => "info",
            MessageLevel::Success => "success",
            MessageLevel::Warning => "warning",
            MessageLevel::Error => "error",
        }
    }
}

/// A one-shot notice for the next page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlashMessage {
    pub level: MessageLevel,
    pub text: String,
}

/// Everything stored against a session id
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionData {
    #[serde(default)]
    pub bag: Bag,
    /// Whether the customer ticked "save this delivery information"
    #[serde(default)]
    pub save_info: Option<bool>,
    #[serde(default)]
    pub messages: Vec<FlashMessage>,
}

struct Entry {
    data: SessionData,
    last_seen: Instant,
}

/// Shared in-process session store
#[derive(Clone, Default)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<Uuid, Entry>>>,
    secure_cookies: bool,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: mark issued cookies `Secure` (HTTPS only)
    pub fn with_secure_cookies(mut self, secure: bool) -> Self {
        self.secure_cookies = secure;
        self
    }

    pub fn secure_cookies(&self) -> bool {
        self.secure_cookies
    }

    /// Start a session holding `data`, dropping expired sessions on the way
    pub async fn create_with(&self, data: SessionData) -> Uuid {
        let id = Uuid::new_v4();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, entry| entry.last_seen.elapsed() < SESSION_TTL);
        if sessions.len() < before {
            debug!("Expired {} sessions", before - sessions.len());
        }
        sessions.insert(
            id,
            Entry {
                data,
                last_seen: Instant::now(),
            },
        );
        id
    }

    pub async fn create(&self) -> Uuid {
        self.create_with(SessionData::default()).await
    }

    /// Mark a session as used; false when it does not exist or has expired
    pub async fn touch(&self, id: Uuid) -> bool {
        let mut sessions = self.sessions.write().await;
        let Some(entry) = sessions.get_mut(&id) else {
            return false;
        };
        if entry.last_seen.elapsed() < SESSION_TTL {
            entry.last_seen = Instant::now();
            return true;
        }
        sessions.remove(&id);
        false
    }

    pub async fn load(&self, id: Uuid) -> Option<SessionData> {
        self.sessions.read().await.get(&id).map(|e| e.data.clone())
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    async fn update<R>(&self, id: Uuid, f: impl FnOnce(&mut SessionData) -> R) -> R {
        let mut sessions = self.sessions.write().await;
        let entry = sessions.entry(id).or_insert_with(|| Entry {
            data: SessionData::default(),
            last_seen: Instant::now(),
        });
        f(&mut entry.data)
    }
}

/// Handle to the current request's session
///
/// Clones share the same id, so a session created through one clone is seen
/// by the others and by the middleware that issues the cookie.
#[derive(Clone)]
pub struct Session {
    id: Arc<OnceCell<Uuid>>,
    store: SessionStore,
}

impl Session {
    /// Handle for an existing session id, or for one created on first write
    pub fn new(store: SessionStore, id: Option<Uuid>) -> Self {
        Self {
            id: Arc::new(OnceCell::new_with(id)),
            store,
        }
    }

    /// The session id, if the session has been stored
    pub fn id(&self) -> Option<Uuid> {
        self.id.get().copied()
    }

    /// Mutate the session data in place under a single store lock,
    /// creating the session if needed
    pub async fn update<R>(&self, f: impl FnOnce(&mut SessionData) -> R) -> R {
        let id = *self.id.get_or_init(|| self.store.create()).await;
        self.store.update(id, f).await
    }

    /// Like [`Session::update`], but an unstored session is left alone and
    /// yields `R::default()`
    pub async fn update_existing<R: Default>(&self, f: impl FnOnce(&mut SessionData) -> R) -> R {
        match self.id() {
            Some(id) => self.store.update(id, f).await,
            None => R::default(),
        }
    }

    pub async fn bag(&self) -> Bag {
        self.update_existing(|data| data.bag.clone()).await
    }

    /// Empty the bag; returns whether it held anything
    pub async fn clear_bag(&self) -> bool {
        self.update_existing(|data| !std::mem::take(&mut data.bag).is_empty())
            .await
    }

    pub async fn save_info(&self) -> Option<bool> {
        self.update_existing(|data| data.save_info).await
    }

    pub async fn set_save_info(&self, save_info: bool) {
        self.update(|data| data.save_info = Some(save_info)).await
    }

    pub async fn flash(&self, level: MessageLevel, text: impl Into<String>) {
        let text = text.into();
        self.update(|data| data.messages.push(FlashMessage { level, text }))
            .await
    }

    /// Remove and return pending messages
    pub async fn take_messages(&self) -> Vec<FlashMessage> {
        self.update_existing(|data| std::mem::take(&mut data.messages))
            .await
    }
}

impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Session>()
            .cloned()
            .ok_or((StatusCode::INTERNAL_SERVER_ERROR, "session layer not installed"))
    }
}

/// Read the session id from the request's cookies
pub fn session_id_from_headers(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .filter_map(|cookie| cookie.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .and_then(|(_, value)| Uuid::parse_str(value.trim()).ok())
}

fn session_cookie(id: Uuid, secure: bool) -> String {
    let mut cookie = format!("{}={}; Path=/; HttpOnly; SameSite=Lax", SESSION_COOKIE, id);
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Middleware: attach a [`Session`] to the request. A missing, unknown or
/// expired cookie gets a fresh cookie only if the handler stored something.
pub async fn session_layer(
    State(store): State<SessionStore>,
    mut request: Request,
    next: Next,
) -> Response {
    let existing = match session_id_from_headers(request.headers()) {
        Some(id) if store.touch(id).await => Some(id),
        _ => None,
    };

    let session = Session::new(store.clone(), existing);
    request.extensions_mut().insert(session.clone());

    let mut response = next.run(request).await;

    if existing.is_none() {
        if let Some(id) = session.id() {
            debug!(session = %id, "Issuing session cookie");
            if let Ok(value) = HeaderValue::from_str(&session_cookie(id, store.secure_cookies()))
            {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
        }
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_from_cookie_header() {
        let id = Uuid::new_v4();
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_str(&format!("csrftoken=abc; {}={}", SESSION_COOKIE, id)).unwrap(),
        );

        assert_eq!(session_id_from_headers(&headers), Some(id));
    }

    #[test]
    fn test_session_id_ignores_garbage() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("sessionid=not-a-uuid"));
        assert_eq!(session_id_from_headers(&headers), None);
        assert_eq!(session_id_from_headers(&HeaderMap::new()), None);
    }

    #[test]
    fn test_session_cookie_attributes() {
        let id = Uuid::new_v4();

        let plain = session_cookie(id, false);
        assert_eq!(
            plain,
            format!("sessionid={}; Path=/; HttpOnly; SameSite=Lax", id)
        );

        let secure = session_cookie(id, true);
        assert!(secure.ends_with("; Secure"));
        assert!(secure.contains("HttpOnly"));
    }

    #[tokio::test]
    async fn test_session_bag_and_messages() {
        let store = SessionStore::new();
        let id = store.create().await;
        let session = Session::new(store.clone(), Some(id));

        let mut bag = Bag::new();
        bag.add("2", 1, None);
        session.update(|data| data.bag = bag.clone()).await;
        session.flash(MessageLevel::Success, "Added").await;

        assert_eq!(store.load(id).await.unwrap().bag, bag);
        assert_eq!(session.take_messages().await.len(), 1);
        assert!(session.take_messages().await.is_empty());

        assert!(session.clear_bag().await);
        assert!(!session.clear_bag().await);
        assert!(session.bag().await.is_empty());
    }

    #[tokio::test]
    async fn test_touch_unknown_session() {
        let store = SessionStore::new();
        assert!(!store.touch(Uuid::new_v4()).await);

        let id = store.create().await;
        assert!(store.touch(id).await);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_reads_do_not_create_a_session() {
        let store = SessionStore::new();
        let session = Session::new(store.clone(), None);

        assert!(session.bag().await.is_empty());
        assert!(session.take_messages().await.is_empty());
        assert_eq!(session.save_info().await, None);
        assert!(!session.clear_bag().await);
        assert_eq!(session.id(), None);
        assert_eq!(store.len().await, 0);

        session.flash(MessageLevel::Info, "Hello").await;
        let id = session.id().unwrap();
        assert_eq!(store.len().await, 1);
        assert_eq!(store.load(id).await.unwrap().messages.len(), 1);
    }

    #[tokio::test]
    async fn test_clones_share_a_lazily_created_session() {
        let store = SessionStore::new();
        let session = Session::new(store.clone(), None);
        let handle = session.clone();

        handle.set_save_info(true).await;

        assert_eq!(session.id(), handle.id());
        assert_eq!(session.save_info().await, Some(true));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_updates_are_not_lost() {
        let store = SessionStore::new();
        let session = Session::new(store.clone(), Some(store.create().await));

        let tasks: Vec<_> = (0..200)
            .map(|_| {
                let session = session.clone();
                tokio::spawn(async move {
                    session.update(|data| data.bag.add("2", 1, None)).await;
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(session.bag().await.quantity_of("2", None), 200);
    }
}
