//! An express-style request adapter over one-shot native request handles.
//!
//! Embedded HTTP servers hand each request to a callback as a pair of native
//! handles: a request handle that is only readable during that callback, and
//! a response handle that receives the request body later, chunk by chunk,
//! with no deadline of its own. Handler code written against an express-like
//! request object expects the opposite: a long-lived object whose headers,
//! query, route parameters and body can be read again and again.
//!
//! [`RequestAdapter`] reconciles the two:
//!
//! - **Snapshot**: method, headers, query string and remote address are copied
//!   out of the native request during construction.
//! - **Lazy views**: route parameters and the parsed query are derived on first
//!   access and memoized; `url` and `path` follow the mutable `base_url`.
//! - **Body ingestion**: [`RequestAdapter::read_body`] drains the chunk callback
//!   into one buffer, bounded by [`AppConfig::body_timeout`], and fails on
//!   timeout or connection abort.
//! - **Stream compatibility**: a `Data` listener registered after the body is
//!   buffered gets the whole body replayed on the next scheduling turn.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use micro_express::{AppConfig, RequestAdapter};
//! use micro_native::memory::{MemoryRequest, MemoryResponse};
//! use micro_native::route_param_names;
//!
//! #[tokio::main]
//! async fn main() {
//!     let native = MemoryRequest::builder()
//!         .method("post")
//!         .url("/users/42")
//!         .route("/users/{id}")
//!         .header("Content-Type", "application/json")
//!         .build()
//!         .unwrap();
//!     let (response, writer) = MemoryResponse::new("127.0.0.1");
//!     writer.finish(r#"{"name":"ada"}"#);
//!
//!     let raw_path = native.url();
//!     let mut req = RequestAdapter::new(native, response, raw_path, route_param_names("/users/{id}"), Arc::new(AppConfig::default()));
//!     assert_eq!(req.param("id"), Some("42"));
//!
//!     assert!(req.read_body().await.unwrap());
//!     req.parse_json_body().unwrap();
//! }
//! ```

mod body;
mod config;
mod error;
mod event;
mod negotiate;
mod query;
mod request;

pub use body::BodyRef;
pub use body::BodyState;
pub use body::ReplayBody;
pub use config::AppConfig;
pub use config::AppConfigBuilder;
pub use config::DEFAULT_BODY_TIMEOUT;
pub use error::BodyError;
pub use error::RequestError;
pub use event::Event;
pub use event::EventEmitter;
pub use event::EventKind;
pub use event::Listener;
pub use query::ParsedQuery;
pub use query::QueryValue;
pub use request::RequestAdapter;
