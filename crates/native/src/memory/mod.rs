//! In-memory native handles.
//!
//! [`MemoryRequest`] and [`MemoryResponse`] behave like the handles an
//! embedded server passes to its request callback:
//!
//! - a [`MemoryRequest`] can be invalidated, after which every accessor
//!   returns empty values,
//! - a [`MemoryResponse`] receives body chunks pushed by its paired
//!   [`PayloadWriter`], which plays the client side of the connection.

mod request;
mod response;

pub use request::MemoryRequest;
pub use request::MemoryRequestBuilder;
pub use response::MemoryResponse;
pub use response::PayloadWriter;
