//! The native request/response handle contract.
//!
//! An embedded HTTP server hands every request to its callback as a pair of
//! handles with strict validity windows:
//!
//! - the request handle ([`NativeRequest`]) is only readable while the
//!   callback that received it is running synchronously,
//! - the response handle ([`NativeResponse`]) stays valid until the response
//!   completes, and is the anchor for push-based body delivery.
//!
//! This crate captures that contract as two traits and ships an in-memory
//! implementation ([`memory`]) which models the same windows: request handles
//! can be invalidated, and body chunks are pushed through a [`memory::PayloadWriter`]
//! with no backpressure and no deadline of their own.
//!
//! # Example
//!
//! ```
//! use micro_native::memory::{MemoryRequest, MemoryResponse};
//! use micro_native::NativeRequest;
//!
//! let request = MemoryRequest::builder()
//!     .method("post")
//!     .url("/users/42?active=true")
//!     .route("/users/{id}")
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(request.method(), "post");
//! assert_eq!(request.query(), "active=true");
//! assert_eq!(request.parameter(0).as_deref(), Some("42"));
//!
//! let (_response, writer) = MemoryResponse::new("127.0.0.1");
//! writer.finish("hello");
//! ```

mod error;
mod handle;
mod route;

pub mod memory;

pub use error::NativeError;
pub use handle::AbortHandler;
pub use handle::DataHandler;
pub use handle::NativeRequest;
pub use handle::NativeResponse;
pub use route::route_param_names;
