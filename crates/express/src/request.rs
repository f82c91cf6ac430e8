//! The express-style request adapter.
//!
//! A native request handle is only readable while the server callback that
//! received it runs. [`RequestAdapter::new`] therefore snapshots every field
//! that is available synchronously (method, headers, query string, remote
//! address) before returning. Route parameters and the parsed query are
//! derived lazily from that snapshot and memoized; `url` and `path` are
//! recomputed on every access because nested routers move `base_url` around.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use micro_express::{AppConfig, RequestAdapter};
//! use micro_native::memory::{MemoryRequest, MemoryResponse};
//! use micro_native::route_param_names;
//!
//! let native = MemoryRequest::builder()
//!     .url("/users/42?active=true")
//!     .route("/users/:id")
//!     .header("Accept", "application/json")
//!     .build()
//!     .unwrap();
//! let (response, _writer) = MemoryResponse::new("127.0.0.1");
//!
//! let raw_path = native.url();
//! let req = RequestAdapter::new(native, response, raw_path, route_param_names("/users/:id"), Arc::new(AppConfig::default()));
//!
//! assert_eq!(req.method(), "GET");
//! assert_eq!(req.param("id"), Some("42"));
//! assert_eq!(req.query().get_str("active"), Some("true"));
//! assert_eq!(req.original_url(), "/users/42?active=true");
//! assert_eq!(req.accepts(&["html", "json"]), Some("json"));
//! ```

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use http::header::{self, HeaderMap, HeaderName};
use http::uri::PathAndQuery;
use micro_native::{NativeRequest, NativeResponse};
use mime::Mime;
use once_cell::sync::OnceCell;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::body::{AbortSignal, BodyRef, BodyState, Outcome, ReplayBody, ingest};
use crate::config::AppConfig;
use crate::error::{BodyError, RequestError};
use crate::event::{Event, EventEmitter, EventKind, Listener};
use crate::negotiate::{negotiate, type_is};
use crate::query::ParsedQuery;

/// One inbound request, readable for as long as the handler chain needs it.
///
/// `Q` is the native request handle and `S` the native response handle. The
/// request handle is only consulted again for lazily derived route
/// parameters and for header lookups missing from the snapshot; both are only
/// answered while the native server keeps the handle valid, so `params` must
/// be touched before the handler chain gives control back to the server.
#[derive(Debug)]
pub struct RequestAdapter<Q, S> {
    req: Q,
    res: S,
    app: Arc<AppConfig>,

    method: String,
    headers: HeaderMap<String>,
    raw_query: String,
    remote_address: Bytes,
    original_url: String,
    original_path: String,
    base_url: String,

    param_names: Vec<String>,
    params: OnceCell<HashMap<String, String>>,
    query: OnceCell<ParsedQuery>,

    parsed_body: Option<serde_json::Value>,
    raw_body: Option<String>,
    body_state: BodyState,

    abort: Arc<AbortSignal>,
    events: EventEmitter,
}

impl<Q, S> RequestAdapter<Q, S>
where
    Q: NativeRequest,
    S: NativeResponse,
{
    /// Wraps a native request/response pair.
    ///
    /// Must run inside the native callback that delivered `req`: every field
    /// the adapter exposes later is copied out of `req` here. The abort
    /// callback of `res` is claimed by the adapter to track connection closure.
    pub fn new(req: Q, mut res: S, raw_path: impl Into<String>, param_names: Vec<String>, app: Arc<AppConfig>) -> Self {
        let headers = snapshot_headers(&req);
        let method = req.method().to_ascii_uppercase();
        let raw_query = req.query();
        let remote_address = res.remote_address_as_text();

        let mut original_url: String = raw_path.into();
        if original_url.is_empty() {
            original_url.push('/');
        }
        let original_path = pathname(&original_url);
        if !raw_query.is_empty() {
            original_url.push('?');
            original_url.push_str(&raw_query);
        }

        debug!(method = %method, url = %original_url, headers = headers.len(), "snapshot native request");

        let events = EventEmitter::new();
        let abort = Arc::new(AbortSignal::default());
        res.on_aborted(abort.handler(&events));

        Self {
            req,
            res,
            app,
            method,
            headers,
            raw_query,
            remote_address,
            original_url,
            original_path,
            base_url: String::new(),
            param_names,
            params: OnceCell::new(),
            query: OnceCell::new(),
            parsed_body: None,
            raw_body: None,
            body_state: BodyState::Idle,
            abort,
            events,
        }
    }

    /// Looks a header up by name, in any case.
    ///
    /// Headers missing from the snapshot are asked of the native handle, which
    /// only answers while it is still valid.
    pub fn header(&self, name: &str) -> Option<Cow<'_, str>> {
        let name = name.to_ascii_lowercase();
        match self.headers.get(name.as_str()) {
            Some(value) => Some(Cow::Borrowed(value.as_str())),
            None => self.req.header(&name).map(Cow::Owned),
        }
    }

    /// Alias of [`header`](Self::header).
    pub fn get(&self, name: &str) -> Option<Cow<'_, str>> {
        self.header(name)
    }

    /// Route parameters by placeholder name, read from the native handle on
    /// first access and memoized.
    pub fn params(&self) -> &HashMap<String, String> {
        self.params.get_or_init(|| {
            self.param_names
                .iter()
                .enumerate()
                .map(|(index, name)| (name.clone(), self.req.parameter(index).unwrap_or_default()))
                .collect()
        })
    }

    /// The route parameter bound to placeholder `name`.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params().get(name).map(String::as_str)
    }

    /// Reads the whole request body, bounded by the configured deadline.
    ///
    /// Resolves to whether the body is non-empty. On timeout the bytes that
    /// did arrive are committed as the raw body, `content-length` is rewritten
    /// to their length, and they are also carried by [`BodyError::TimedOut`].
    /// A request body can only be read once.
    pub async fn read_body(&mut self) -> Result<bool, BodyError> {
        if self.body_state != BodyState::Idle {
            return Err(BodyError::AlreadyRead);
        }

        let timeout = self.app.body_timeout();
        self.body_state = BodyState::Reading;
        debug!(timeout = ?timeout, "start reading request body");

        match ingest(&mut self.res, &self.abort, timeout).await {
            Outcome::Complete(bytes) => {
                let body = String::from_utf8_lossy(&bytes).into_owned();
                debug!(received = bytes.len(), "request body received");

                let non_empty = !body.is_empty();
                self.raw_body = Some(body);
                self.body_state = BodyState::Complete;
                Ok(non_empty)
            }

            Outcome::TimedOut(partial) => {
                warn!(received = partial.len(), timeout = ?timeout, "request body not completed in time");

                self.raw_body = Some(String::from_utf8_lossy(&partial).into_owned());
                self.headers.insert(header::CONTENT_LENGTH, partial.len().to_string());
                self.body_state = BodyState::TimedOut;
                Err(BodyError::timed_out(partial, timeout))
            }

            Outcome::Aborted => {
                self.abort.trigger(&self.events);
                self.body_state = BodyState::Aborted;
                Err(BodyError::Aborted)
            }
        }
    }

    /// Marks the connection as closed; called by the connection lifecycle.
    ///
    /// Emits [`Event::Aborted`] and [`Event::Close`] the first time. Later
    /// calls to [`read_body`](Self::read_body) and
    /// [`response_mut`](Self::response_mut) fail. A read already in flight is
    /// only interrupted by the native abort callback.
    pub fn mark_aborted(&self) {
        self.abort.trigger(&self.events);
    }
}

impl<Q, S> RequestAdapter<Q, S> {
    /// The uppercase request method.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// The method as an [`http::Method`], if it is a valid token.
    pub fn http_method(&self) -> Result<http::Method, http::method::InvalidMethod> {
        http::Method::from_bytes(self.method.as_bytes())
    }

    /// The header snapshot, keyed by lowercase name.
    ///
    /// A `referer` header is also present as `referrer`.
    pub fn headers(&self) -> &HeaderMap<String> {
        &self.headers
    }

    /// The route placeholder names, in positional order.
    pub fn param_names(&self) -> &[String] {
        &self.param_names
    }

    /// The raw query string, without `?`.
    pub fn raw_query(&self) -> &str {
        &self.raw_query
    }

    /// The parsed query string, memoized.
    pub fn query(&self) -> &ParsedQuery {
        self.query.get_or_init(|| ParsedQuery::parse(&self.raw_query))
    }

    /// Deserializes the query string into `T`, nested keys included.
    pub fn query_as<T: DeserializeOwned>(&self) -> Result<T, RequestError> {
        Ok(serde_qs::from_str(&self.raw_query)?)
    }

    /// The full request target: path plus `?query` when there is one. Never empty.
    pub fn original_url(&self) -> &str {
        &self.original_url
    }

    /// The mount prefix under which this request is being handled.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Sets the mount prefix; routers call this when descending into a sub-app.
    pub fn set_base_url(&mut self, base_url: impl Into<String>) {
        self.base_url = base_url.into();
    }

    /// [`original_url`](Self::original_url) relative to [`base_url`](Self::base_url).
    pub fn url(&self) -> String {
        strip_base(&self.original_url, &self.base_url)
    }

    /// The pathname relative to [`base_url`](Self::base_url), without the query.
    pub fn path(&self) -> String {
        strip_base(&self.original_path, &self.base_url)
    }

    /// The peer address as reported by the native response handle.
    pub fn remote_address(&self) -> &Bytes {
        &self.remote_address
    }

    /// The client address. With `trust_proxy`, the first `x-forwarded-for`
    /// entry wins over the peer address.
    pub fn ip(&self) -> String {
        if self.app.trust_proxy() {
            let forwarded = self
                .headers
                .get("x-forwarded-for")
                .and_then(|value| value.split(',').next())
                .map(str::trim)
                .filter(|ip| !ip.is_empty());
            if let Some(ip) = forwarded {
                return ip.to_owned();
            }
        }
        String::from_utf8_lossy(&self.remote_address).into_owned()
    }

    /// The parsed `content-type` header.
    pub fn content_type(&self) -> Option<Mime> {
        self.headers.get(header::CONTENT_TYPE).and_then(|value| value.parse().ok())
    }

    /// Whether the request content type is `kind`, e.g. `json`, `text/*`.
    pub fn is(&self, kind: &str) -> bool {
        self.content_type().is_some_and(|content_type| type_is(&content_type, kind))
    }

    /// The offer the `accept` header prefers, or `None` if none is acceptable.
    pub fn accepts<'o>(&self, offers: &[&'o str]) -> Option<&'o str> {
        negotiate(self.headers.get(header::ACCEPT).map(String::as_str), offers)
    }

    /// The body: an assigned value if a body parser set one, else the raw body.
    ///
    /// Any assigned value takes precedence, including JSON `null` or `false`;
    /// the raw text stays reachable through [`raw_body`](Self::raw_body).
    pub fn body(&self) -> Option<BodyRef<'_>> {
        match (&self.parsed_body, &self.raw_body) {
            (Some(value), _) => Some(BodyRef::Parsed(value)),
            (None, Some(raw)) => Some(BodyRef::Raw(raw)),
            (None, None) => None,
        }
    }

    /// Assigns the body slot, hiding the raw body from [`body`](Self::body).
    pub fn set_body(&mut self, body: serde_json::Value) {
        self.parsed_body = Some(body);
    }

    /// The ingested body text, complete or partial.
    pub fn raw_body(&self) -> Option<&str> {
        self.raw_body.as_deref()
    }

    /// Deserializes the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, RequestError> {
        match self.body().ok_or(RequestError::MissingBody)? {
            BodyRef::Parsed(value) => Ok(T::deserialize(value)?),
            BodyRef::Raw(raw) => Ok(serde_json::from_str(raw)?),
        }
    }

    /// Deserializes the raw body as `application/x-www-form-urlencoded`.
    pub fn form<T: DeserializeOwned>(&self) -> Result<T, RequestError> {
        let raw = self.raw_body.as_deref().ok_or(RequestError::MissingBody)?;
        Ok(serde_urlencoded::from_str(raw)?)
    }

    /// Parses a JSON raw body into the body slot.
    ///
    /// Returns whether a value is assigned afterwards. Requests that are not
    /// JSON, or carry an empty body, are left untouched.
    pub fn parse_json_body(&mut self) -> Result<bool, RequestError> {
        if self.parsed_body.is_some() {
            return Ok(true);
        }
        if !self.is("json") {
            return Ok(false);
        }

        match self.raw_body.as_deref() {
            Some(raw) if !raw.is_empty() => {
                self.parsed_body = Some(serde_json::from_str(raw)?);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// The buffered body as an [`http_body::Body`] yielding it in one frame.
    pub fn body_stream(&self) -> ReplayBody {
        let data = self.raw_body.as_ref().map(|raw| Bytes::copy_from_slice(raw.as_bytes())).unwrap_or_default();
        ReplayBody::new(data)
    }

    /// Where body ingestion stands.
    pub fn body_state(&self) -> BodyState {
        self.body_state
    }

    /// Whether the connection closed before the response was sent.
    pub fn is_aborted(&self) -> bool {
        self.abort.is_aborted()
    }

    /// Subscribes to request events.
    ///
    /// A [`EventKind::Data`] listener registered once the raw body is in place
    /// is not kept: on the next scheduling turn it receives the whole body in
    /// one event, then `End` and `Close` are emitted to their listeners.
    /// Every other registration is a plain subscription.
    pub fn on<F>(&self, kind: EventKind, listener: F) -> &Self
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let listener: Listener = Arc::new(listener);
        match (&self.raw_body, kind) {
            (Some(raw), EventKind::Data) => {
                self.events.replay_body(Bytes::copy_from_slice(raw.as_bytes()), listener);
            }
            _ => self.events.on(kind, listener),
        }
        self
    }

    /// Emits `event` to its listeners; returns whether any was called.
    pub fn emit(&self, event: &Event) -> bool {
        self.events.emit(event)
    }

    /// The request's event hub.
    pub fn events(&self) -> &EventEmitter {
        &self.events
    }

    /// The application settings this request runs under.
    pub fn app(&self) -> &AppConfig {
        &self.app
    }

    /// The native response handle.
    pub fn response(&self) -> &S {
        &self.res
    }

    /// The native response handle, unless the connection is already gone.
    pub fn response_mut(&mut self) -> Result<&mut S, RequestError> {
        if self.abort.is_aborted() {
            return Err(RequestError::Aborted);
        }
        Ok(&mut self.res)
    }
}

fn snapshot_headers<Q: NativeRequest>(req: &Q) -> HeaderMap<String> {
    let mut headers = HeaderMap::default();
    req.for_each_header(&mut |name: &str, value: &str| {
        let Ok(name) = HeaderName::from_bytes(name.as_bytes()) else {
            warn!(name, "drop header with invalid name");
            return;
        };

        // also readable under the correctly spelled name
        if name == header::REFERER {
            headers.insert(HeaderName::from_static("referrer"), value.to_owned());
        }
        headers.insert(name, value.to_owned());
    });
    headers
}

fn pathname(url: &str) -> String {
    match PathAndQuery::try_from(url) {
        Ok(path_and_query) => path_and_query.path().to_owned(),
        Err(e) => {
            debug!(url, cause = %e, "can't parse request path, fallback to raw split");
            url.split(['?', '#']).next().filter(|path| !path.is_empty()).unwrap_or("/").to_owned()
        }
    }
}

fn strip_base(value: &str, base_url: &str) -> String {
    let stripped = value.strip_prefix(base_url).unwrap_or(value);
    if stripped.starts_with('/') { stripped.to_owned() } else { format!("/{stripped}") }
}
