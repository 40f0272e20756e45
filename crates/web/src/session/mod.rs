//! Sealed, self-expiring sessions.
//!
//! A [`Session`] lives in the event for the duration of a request and travels between requests
//! as an opaque token, produced by a [`Sealer`] from the JSON form of the session. The token is
//! read from a request header (`x-{name}-session` by default) or, failing that, from the
//! cookie named after the session, and written back as a cookie on every update.
//!
//! A token that cannot be unsealed (tampered, malformed, expired) is ignored: the request
//! starts a fresh session instead of failing.
//!
//! ```no_run
//! use micro_event::session::SessionConfig;
//! use micro_event::{Event, HttpError};
//! use serde_json::{json, Map};
//! use std::time::Duration;
//!
//! async fn visit(event: &mut Event, config: &SessionConfig) -> Result<String, HttpError> {
//!     let mut session = event.session(config)?;
//!     let visits = session.data().get("visits").and_then(|v| v.as_u64()).unwrap_or(0) + 1;
//!
//!     let mut patch = Map::new();
//!     patch.insert("visits".to_string(), json!(visits));
//!     session.update(patch)?;
//!
//!     Ok(format!("visit #{visits} of session {}", session.id()))
//! }
//!
//! let config = SessionConfig::builder("a password of at least thirty two bytes")
//!     .max_age(Duration::from_secs(3600))
//!     .build();
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use micro_event_http::codec::cookie::CookieOptions;
use micro_event_http::seal::{AeadSealer, SealError, SealOptions, Sealer};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::event::Event;

const DEFAULT_NAME: &str = "micro-event";

type IdGenerator = Arc<dyn Fn() -> String + Send + Sync>;

static DEFAULT_ID_GENERATOR: Lazy<IdGenerator> = Lazy::new(|| Arc::new(|| Uuid::new_v4().to_string()) as IdGenerator);

static EMPTY_SESSION: Lazy<Session> = Lazy::new(Session::default);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Session {
    /// empty until the session is minted
    pub id: String,
    /// milliseconds since the unix epoch
    pub created_at: u64,
    pub data: Map<String, Value>,
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("seal error: {0}")]
    Seal(#[from] SealError),

    #[error("session payload error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("session expired")]
    Expired,
}

/// Where the session token may be read from besides the cookie.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SessionHeader {
    /// `x-{name}-session`, lower cased
    #[default]
    Default,
    Named(String),
    Disabled,
}

pub struct SessionConfig {
    password: String,
    name: String,
    max_age: Option<Duration>,
    cookie: Option<CookieOptions>,
    session_header: SessionHeader,
    generate_id: IdGenerator,
    sealer: Arc<dyn Sealer>,
    seal_options: SealOptions,
}

impl SessionConfig {
    pub fn builder(password: impl Into<String>) -> SessionConfigBuilder {
        SessionConfigBuilder::new(password.into())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn max_age(&self) -> Option<Duration> {
        self.max_age
    }

    pub fn cookie(&self) -> Option<&CookieOptions> {
        self.cookie.as_ref()
    }

    /// The request header carrying the token, if reading it from a header is enabled.
    pub fn header_name(&self) -> Option<String> {
        match &self.session_header {
            SessionHeader::Default => Some(format!("x-{}-session", self.name.to_lowercase())),
            SessionHeader::Named(name) => Some(name.to_lowercase()),
            SessionHeader::Disabled => None,
        }
    }

    /// The sealing options, the token lifetime defaulting to the session max age.
    pub fn seal_options(&self) -> SealOptions {
        self.seal_options.with_ttl(self.seal_options.ttl.or(self.max_age))
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("name", &self.name)
            .field("max_age", &self.max_age)
            .field("cookie", &self.cookie)
            .field("session_header", &self.session_header)
            .field("sealer", &self.sealer)
            .field("seal_options", &self.seal_options)
            .finish_non_exhaustive()
    }
}

pub struct SessionConfigBuilder {
    config: SessionConfig,
}

impl SessionConfigBuilder {
    fn new(password: String) -> Self {
        Self {
            config: SessionConfig {
                password,
                name: DEFAULT_NAME.to_string(),
                max_age: None,
                cookie: Some(default_cookie()),
                session_header: SessionHeader::Default,
                generate_id: Arc::clone(&DEFAULT_ID_GENERATOR),
                sealer: Arc::new(AeadSealer::new()),
                seal_options: SealOptions::default(),
            },
        }
    }

    /// Session name, used as cookie name and to build the default header name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    #[must_use]
    pub fn max_age(mut self, max_age: Duration) -> Self {
        self.config.max_age = Some(max_age);
        self
    }

    /// Cookie attributes, layered over the defaults (`Path=/; HttpOnly; Secure`): only the
    /// attributes set in `cookie` replace a default.
    #[must_use]
    pub fn cookie(mut self, cookie: CookieOptions) -> Self {
        self.config.cookie = Some(default_cookie().merge(&cookie));
        self
    }

    /// Never writes the session cookie; the token has to travel some other way.
    #[must_use]
    pub fn disable_cookie(mut self) -> Self {
        self.config.cookie = None;
        self
    }

    #[must_use]
    pub fn session_header(mut self, session_header: SessionHeader) -> Self {
        self.config.session_header = session_header;
        self
    }

    #[must_use]
    pub fn generate_id<F>(mut self, generate_id: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.config.generate_id = Arc::new(generate_id);
        self
    }

    #[must_use]
    pub fn sealer<S: Sealer + 'static>(mut self, sealer: S) -> Self {
        self.config.sealer = Arc::new(sealer);
        self
    }

    #[must_use]
    pub fn seal_options(mut self, seal_options: SealOptions) -> Self {
        self.config.seal_options = seal_options;
        self
    }

    pub fn build(self) -> SessionConfig {
        self.config
    }
}

impl fmt::Debug for SessionConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfigBuilder").field("config", &self.config).finish()
    }
}

fn default_cookie() -> CookieOptions {
    CookieOptions::new().with_path("/").with_secure(true).with_http_only(true)
}

fn now_millis() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

/// Returns the session of the event, restoring it from the request or minting a new one.
///
/// A freshly minted session is persisted right away.
pub fn get_session<'e>(event: &'e mut Event, config: &SessionConfig) -> Result<&'e mut Session, SessionError> {
    if !event.sessions().contains_key(&config.name) {
        let mut session = read_session(event, config).unwrap_or_default();
        let minted = session.id.is_empty();
        if minted {
            session.id = (config.generate_id)();
            session.created_at = now_millis();
            debug!(name = %config.name, id = %session.id, "session minted");
        }
        event.sessions_mut().insert(config.name.clone(), session);
        if minted {
            persist(event, config)?;
        }
    }
    Ok(stored(event, config))
}

/// Merges `patch` into the session data and persists the session.
pub fn update_session<'e>(event: &'e mut Event, config: &SessionConfig, patch: Map<String, Value>) -> Result<&'e mut Session, SessionError> {
    update_session_with(event, config, |_| patch)
}

/// Merges the object computed from the current data into the session data and persists the session.
pub fn update_session_with<'e, F>(event: &'e mut Event, config: &SessionConfig, f: F) -> Result<&'e mut Session, SessionError>
where
    F: FnOnce(&Map<String, Value>) -> Map<String, Value>,
{
    let session = get_session(event, config)?;
    let patch = f(&session.data);
    session.data.extend(patch);

    persist(event, config)?;
    Ok(stored(event, config))
}

/// Seals the session of the event into a token.
pub fn seal_session(event: &mut Event, config: &SessionConfig) -> Result<String, SessionError> {
    let session = get_session(event, config)?;
    seal(config, session)
}

/// Restores a session from a token.
///
/// Besides the sealer's own checks, fails with [`SessionError::Expired`] when the session is
/// older than the configured max age.
pub fn unseal_session(config: &SessionConfig, token: &str) -> Result<Session, SessionError> {
    let payload = config.sealer.unseal(&config.password, token, &config.seal_options())?;
    let session = serde_json::from_slice::<Session>(&payload)?;

    if let Some(max_age) = config.max_age {
        let age = now_millis().saturating_sub(session.created_at);
        if u128::from(age) > max_age.as_millis() {
            return Err(SessionError::Expired);
        }
    }
    Ok(session)
}

/// Drops the session of the event and expires its cookie.
///
/// The cookie is expired even when writing it is disabled, with the default attributes.
pub fn clear_session(event: &mut Event, config: &SessionConfig) {
    event.sessions_mut().remove(&config.name);
    let cookie = config.cookie.clone().unwrap_or_else(default_cookie);
    event.delete_cookie(&config.name, &cookie);
}

fn read_session(event: &Event, config: &SessionConfig) -> Option<Session> {
    let token = config.header_name().and_then(|name| event.header(&name)).or_else(|| event.cookie(&config.name))?;

    match unseal_session(config, &token) {
        Ok(session) => Some(session),
        Err(e) => {
            debug!(name = %config.name, cause = %e, "ignoring unreadable session token");
            None
        }
    }
}

fn seal(config: &SessionConfig, session: &Session) -> Result<String, SessionError> {
    let payload = serde_json::to_vec(session)?;
    Ok(config.sealer.seal(&config.password, &payload, &config.seal_options())?)
}

fn persist(event: &mut Event, config: &SessionConfig) -> Result<(), SessionError> {
    let Some(cookie) = &config.cookie else {
        return Ok(());
    };
    let Some(session) = event.sessions().get(&config.name) else {
        return Ok(());
    };

    let token = seal(config, session)?;
    let mut options = cookie.clone();
    if options.expires.is_none() {
        options.expires = config.max_age.map(|max_age| UNIX_EPOCH + Duration::from_millis(session.created_at) + max_age);
    }
    event.set_cookie(&config.name, &token, &options);
    Ok(())
}

fn stored<'e>(event: &'e mut Event, config: &SessionConfig) -> &'e mut Session {
    event.sessions_mut().entry(config.name.clone()).or_default()
}

/// The session of one event, as returned by [`Event::session`].
pub struct SessionManager<'e, 'c> {
    event: &'e mut Event,
    config: &'c SessionConfig,
}

impl Event {
    /// Returns the session described by `config`, restoring or minting it on first access.
    pub fn session<'e, 'c>(&'e mut self, config: &'c SessionConfig) -> Result<SessionManager<'e, 'c>, SessionError> {
        get_session(self, config)?;
        Ok(SessionManager { event: self, config })
    }
}

impl SessionManager<'_, '_> {
    fn current(&self) -> &Session {
        self.event.sessions().get(&self.config.name).unwrap_or(&EMPTY_SESSION)
    }

    pub fn id(&self) -> &str {
        &self.current().id
    }

    pub fn created_at(&self) -> u64 {
        self.current().created_at
    }

    pub fn data(&self) -> &Map<String, Value> {
        &self.current().data
    }

    pub fn update(&mut self, patch: Map<String, Value>) -> Result<(), SessionError> {
        update_session(self.event, self.config, patch).map(|_| ())
    }

    pub fn update_with<F>(&mut self, f: F) -> Result<(), SessionError>
    where
        F: FnOnce(&Map<String, Value>) -> Map<String, Value>,
    {
        update_session_with(self.event, self.config, f).map(|_| ())
    }

    pub fn seal(&mut self) -> Result<String, SessionError> {
        seal_session(self.event, self.config)
    }

    pub fn clear(self) {
        clear_session(self.event, self.config);
    }
}

impl fmt::Debug for SessionManager<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager").field("name", &self.config.name).field("session", self.current()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::{clear_session, get_session, unseal_session, update_session, Session, SessionConfig, SessionError, SessionHeader};
    use crate::event::Event;
    use bytes::Bytes;
    use micro_event_http::codec::cookie::{CookieOptions, SameSite};
    use http::Request;
    use http_body_util::Empty;
    use serde_json::{json, Map, Value};
    use std::time::Duration;

    const PASSWORD: &str = "an adequately long password for the tests";

    fn config() -> SessionConfig {
        SessionConfig::builder(PASSWORD).name("test").build()
    }

    fn event_with(builder: http::request::Builder) -> Event {
        Event::new(builder.body(Empty::<Bytes>::new()).unwrap())
    }

    fn event() -> Event {
        event_with(Request::get("/"))
    }

    fn patch(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("patch must be an object"),
        }
    }

    fn set_cookies(event: &Event) -> Vec<String> {
        event.response_headers().get_all("set-cookie").iter().map(|v| v.to_str().unwrap().to_string()).collect()
    }

    fn token_of(event: &Event, name: &str) -> String {
        let prefix = format!("{name}=");
        let cookie = set_cookies(event).into_iter().find(|c| c.starts_with(&prefix)).unwrap();
        cookie[prefix.len()..].split(';').next().unwrap().to_string()
    }

    #[test]
    fn test_new_session_is_minted_and_persisted() {
        let config = config();
        let mut event = event();

        let session = get_session(&mut event, &config).unwrap().clone();
        assert!(!session.id.is_empty());
        assert!(session.created_at > 0);
        assert!(session.data.is_empty());

        let cookies = set_cookies(&event);
        assert_eq!(cookies.len(), 1);
        assert!(cookies[0].starts_with("test="));
        assert!(cookies[0].ends_with("; HttpOnly; Secure; Path=/"));

        let again = get_session(&mut event, &config).unwrap().clone();
        assert_eq!(again, session);
        assert_eq!(set_cookies(&event).len(), 1);
    }

    #[test]
    fn test_round_trip_through_cookie() {
        let config = config();
        let mut first = event();
        let id = update_session(&mut first, &config, patch(json!({"user": "alice"}))).unwrap().id.clone();
        let token = token_of(&first, "test");

        let mut second = event_with(Request::get("/").header("cookie", format!("test={token}")));
        let session = get_session(&mut second, &config).unwrap();
        assert_eq!(session.id, id);
        assert_eq!(session.data.get("user"), Some(&json!("alice")));
        assert!(set_cookies(&second).is_empty());
    }

    #[test]
    fn test_round_trip_through_header() {
        let config = config();
        assert_eq!(config.header_name().as_deref(), Some("x-test-session"));

        let mut first = event();
        update_session(&mut first, &config, patch(json!({"n": 1}))).unwrap();
        let token = token_of(&first, "test");

        let mut second = event_with(Request::get("/").header("x-test-session", token).header("cookie", "test=garbage"));
        assert_eq!(get_session(&mut second, &config).unwrap().data.get("n"), Some(&json!(1)));

        let disabled = SessionConfig::builder(PASSWORD).name("test").session_header(SessionHeader::Disabled).build();
        assert_eq!(disabled.header_name(), None);
    }

    #[test]
    fn test_update_with_merges() {
        let config = config();
        let mut event = event();
        update_session(&mut event, &config, patch(json!({"a": 1, "b": 2}))).unwrap();

        let mut manager = event.session(&config).unwrap();
        manager.update_with(|data| patch(json!({"b": data["b"].as_i64().unwrap() * 10, "c": 3}))).unwrap();
        assert_eq!(Value::Object(manager.data().clone()), json!({"a": 1, "b": 20, "c": 3}));
    }

    #[test]
    fn test_tampered_token_starts_over() {
        let config = config();
        let mut first = event();
        let id = update_session(&mut first, &config, patch(json!({"role": "user"}))).unwrap().id.clone();

        let mut token = token_of(&first, "test").into_bytes();
        let middle = token.len() / 2;
        token[middle] = if token[middle] == b'A' { b'B' } else { b'A' };
        let token = String::from_utf8(token).unwrap();

        assert!(unseal_session(&config, &token).is_err());

        let mut second = event_with(Request::get("/").header("cookie", format!("test={token}")));
        let session = get_session(&mut second, &config).unwrap();
        assert_ne!(session.id, id);
        assert!(session.data.is_empty());
        assert_eq!(set_cookies(&second).len(), 1);
    }

    #[test]
    fn test_expired_session() {
        let config = SessionConfig::builder(PASSWORD).name("test").max_age(Duration::from_secs(60)).build();

        let stale = Session { id: "stale".to_string(), created_at: super::now_millis() - 120_000, data: Map::new() };
        let payload = serde_json::to_vec(&stale).unwrap();
        let token = config.sealer.seal(PASSWORD, &payload, &config.seal_options()).unwrap();

        assert!(matches!(unseal_session(&config, &token), Err(SessionError::Expired)));

        let mut event = event_with(Request::get("/").header("cookie", format!("test={token}")));
        assert_ne!(get_session(&mut event, &config).unwrap().id, "stale");
        assert!(set_cookies(&event)[0].contains("; Expires="));
    }

    #[test]
    fn test_clear_session() {
        let config = config();
        let mut event = event();
        event.session(&config).unwrap().clear();

        let cookies = set_cookies(&event);
        assert_eq!(cookies, vec!["test=; HttpOnly; Secure; Path=/; Max-Age=0".to_string()]);

        clear_session(&mut event, &config);
        assert!(event.sessions().is_empty());
    }

    #[test]
    fn test_custom_id_and_disabled_cookie() {
        let config = SessionConfig::builder(PASSWORD).generate_id(|| "fixed-id".to_string()).disable_cookie().build();
        let mut event = event();

        let manager = event.session(&config).unwrap();
        assert_eq!(manager.id(), "fixed-id");
        assert!(set_cookies(&event).is_empty());

        clear_session(&mut event, &config);
        assert_eq!(set_cookies(&event), vec!["micro-event=; HttpOnly; Secure; Path=/; Max-Age=0".to_string()]);
    }

    #[test]
    fn test_cookie_options_keep_defaults() {
        let config = SessionConfig::builder(PASSWORD).name("test").cookie(CookieOptions::new().with_same_site(SameSite::Lax)).build();
        let mut lax = event();
        get_session(&mut lax, &config).unwrap();

        let cookie = set_cookies(&lax).remove(0);
        let mut attributes = cookie.split("; ").skip(1).collect::<Vec<_>>();
        attributes.sort_unstable();
        assert_eq!(attributes, vec!["HttpOnly", "Path=/", "SameSite=Lax", "Secure"]);

        let config = SessionConfig::builder(PASSWORD).name("test").cookie(CookieOptions::new().with_secure(false)).build();
        let mut insecure = event();
        get_session(&mut insecure, &config).unwrap();
        assert!(set_cookies(&insecure)[0].ends_with("; HttpOnly; Path=/"));
    }

    #[test]
    fn test_short_password_fails_to_persist() {
        let config = SessionConfig::builder("too short").build();
        let error = get_session(&mut event(), &config).unwrap_err();
        assert!(matches!(error, SessionError::Seal(_)));
    }
}
