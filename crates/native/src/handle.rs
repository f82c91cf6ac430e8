use bytes::Bytes;

/// Callback receiving body chunks, invoked one or more times with
/// `(chunk, is_last)`. Exactly one invocation carries `is_last = true`,
/// unless the connection aborts first.
pub type DataHandler = Box<dyn FnMut(Bytes, bool) + Send>;

/// Callback fired once when the connection closes before the response is sent.
pub type AbortHandler = Box<dyn FnOnce() + Send>;

/// A request handle owned by the native server.
///
/// Every accessor is only meaningful during the synchronous callback that
/// delivered the handle. Once that window closes, implementations return
/// empty values instead of the request data; callers must snapshot what they
/// need before returning control to the server.
pub trait NativeRequest {
    /// Enumerates every `(name, value)` header pair once. Names are lowercase.
    fn for_each_header(&self, visit: &mut dyn FnMut(&str, &str));

    /// The request method as reported by the server, in any case.
    fn method(&self) -> String;

    /// The raw query string without the leading `?`, possibly empty.
    fn query(&self) -> String;

    /// The value captured by the route placeholder at `index`.
    fn parameter(&self, index: usize) -> Option<String>;

    /// Direct header lookup by lowercase name.
    fn header(&self, name: &str) -> Option<String>;
}

/// A response handle owned by the native server.
///
/// Response writing is not part of this contract, the handle is only used as
/// the anchor for body delivery and connection lifecycle notifications.
pub trait NativeResponse {
    /// The peer address in its textual form, as raw bytes.
    fn remote_address_as_text(&self) -> Bytes;

    /// Registers the body chunk callback. Registering replaces any previous one.
    fn on_data(&mut self, handler: DataHandler);

    /// Registers the abort callback. Registering replaces any previous one.
    fn on_aborted(&mut self, handler: AbortHandler);
}
