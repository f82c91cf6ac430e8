use std::sync::Arc;

use arc_swap::ArcSwapOption;
use tracing::trace;

use crate::route::{route_param_names, to_matchit_pattern};
use crate::{NativeError, NativeRequest};

#[derive(Debug, Clone)]
struct RequestState {
    method: String,
    url: String,
    query: String,
    headers: Vec<(String, String)>,
    parameters: Vec<String>,
}

/// A clonable request handle over shared state.
///
/// Clones observe the same state, so a test can keep one clone to mutate or
/// invalidate the request after handing another one to the code under test.
#[derive(Debug, Clone)]
pub struct MemoryRequest {
    state: Arc<ArcSwapOption<RequestState>>,
}

impl MemoryRequest {
    pub fn builder() -> MemoryRequestBuilder {
        MemoryRequestBuilder::default()
    }

    /// The request path without the query string, empty once invalidated.
    pub fn url(&self) -> String {
        self.state.load_full().map(|state| state.url.clone()).unwrap_or_default()
    }

    /// Closes the validity window. Every accessor returns empty values afterwards.
    pub fn invalidate(&self) {
        trace!("invalidate native request");
        self.state.store(None);
    }

    pub fn is_valid(&self) -> bool {
        self.state.load().is_some()
    }

    /// Replaces the placeholder value at `index`, growing the list if needed.
    pub fn set_parameter(&self, index: usize, value: impl Into<String>) {
        let value = value.into();
        self.update(|state| {
            if state.parameters.len() <= index {
                state.parameters.resize(index + 1, String::new());
            }
            state.parameters[index].clone_from(&value);
        });
    }

    /// Replaces every value of header `name`, or appends it.
    pub fn set_header(&self, name: impl AsRef<str>, value: impl Into<String>) {
        let name = name.as_ref().to_ascii_lowercase();
        let value = value.into();
        self.update(|state| {
            state.headers.retain(|(existing, _)| existing != &name);
            state.headers.push((name.clone(), value.clone()));
        });
    }

    fn update<F: FnMut(&mut RequestState)>(&self, mut f: F) {
        self.state.rcu(|current| {
            current.as_ref().map(|state| {
                let mut next = RequestState::clone(state);
                f(&mut next);
                Arc::new(next)
            })
        });
    }
}

impl NativeRequest for MemoryRequest {
    fn for_each_header(&self, visit: &mut dyn FnMut(&str, &str)) {
        if let Some(state) = self.state.load_full() {
            for (name, value) in &state.headers {
                visit(name, value);
            }
        }
    }

    fn method(&self) -> String {
        self.state.load_full().map(|state| state.method.clone()).unwrap_or_default()
    }

    fn query(&self) -> String {
        self.state.load_full().map(|state| state.query.clone()).unwrap_or_default()
    }

    fn parameter(&self, index: usize) -> Option<String> {
        self.state.load_full().and_then(|state| state.parameters.get(index).cloned())
    }

    fn header(&self, name: &str) -> Option<String> {
        self.state.load_full().and_then(|state| {
            state
                .headers
                .iter()
                .rev()
                .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
                .map(|(_, value)| value.clone())
        })
    }
}

#[derive(Debug, Default)]
pub struct MemoryRequestBuilder {
    method: Option<String>,
    url: Option<String>,
    headers: Vec<(String, String)>,
    route: Option<String>,
}

impl MemoryRequestBuilder {
    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    /// The request target, path plus an optional `?query`.
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers.push((name.as_ref().to_ascii_lowercase(), value.into()));
        self
    }

    /// The route pattern this request matched, e.g. `/users/{id}` or `/users/:id`.
    pub fn route(mut self, pattern: impl Into<String>) -> Self {
        self.route = Some(pattern.into());
        self
    }

    pub fn build(self) -> Result<MemoryRequest, NativeError> {
        let url = self.url.unwrap_or_default();
        let (url, query) = match url.split_once('?') {
            Some((path, query)) => (path.to_owned(), query.to_owned()),
            None => (url, String::new()),
        };

        let parameters = match &self.route {
            Some(pattern) => match_route(pattern, &url)?,
            None => Vec::new(),
        };

        let state = RequestState {
            method: self.method.unwrap_or_else(|| "get".to_owned()),
            url,
            query,
            headers: self.headers,
            parameters,
        };

        Ok(MemoryRequest { state: Arc::new(ArcSwapOption::from_pointee(state)) })
    }
}

fn match_route(pattern: &str, path: &str) -> Result<Vec<String>, NativeError> {
    let mut router = matchit::Router::new();
    router.insert(to_matchit_pattern(pattern), ()).map_err(NativeError::invalid_route)?;

    let matched = router.at(path).map_err(|e| NativeError::route_mismatch(path, e))?;

    Ok(route_param_names(pattern)
        .iter()
        .map(|name| matched.params.get(name).unwrap_or_default().to_owned())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers_of(request: &MemoryRequest) -> Vec<(String, String)> {
        let mut headers = Vec::new();
        request.for_each_header(&mut |name: &str, value: &str| headers.push((name.to_owned(), value.to_owned())));
        headers
    }

    #[test]
    fn build_splits_url_and_query() {
        let request = MemoryRequest::builder().url("/users/42?active=true&x=1").build().unwrap();

        assert_eq!(request.url(), "/users/42");
        assert_eq!(request.query(), "active=true&x=1");
        assert_eq!(request.method(), "get");
    }

    #[test]
    fn build_resolves_placeholders() {
        let request = MemoryRequest::builder()
            .url("/users/42/posts/7")
            .route("/users/:id/posts/{post}")
            .build()
            .unwrap();

        assert_eq!(request.parameter(0).as_deref(), Some("42"));
        assert_eq!(request.parameter(1).as_deref(), Some("7"));
        assert_eq!(request.parameter(2), None);
    }

    #[test]
    fn build_rejects_mismatched_route() {
        let result = MemoryRequest::builder().url("/teams/1").route("/users/{id}").build();

        assert!(matches!(result, Err(NativeError::RouteMismatch { .. })));
    }

    #[test]
    fn header_names_are_lowercase() {
        let request = MemoryRequest::builder().header("Content-Type", "text/plain").build().unwrap();

        assert_eq!(headers_of(&request), vec![("content-type".to_owned(), "text/plain".to_owned())]);
        assert_eq!(request.header("content-type").as_deref(), Some("text/plain"));
    }

    #[test]
    fn invalidated_request_reads_empty() {
        let request = MemoryRequest::builder()
            .method("post")
            .url("/users/42?a=1")
            .route("/users/{id}")
            .header("host", "localhost")
            .build()
            .unwrap();

        let clone = request.clone();
        clone.invalidate();

        assert!(!request.is_valid());
        assert_eq!(request.method(), "");
        assert_eq!(request.query(), "");
        assert_eq!(request.url(), "");
        assert_eq!(request.parameter(0), None);
        assert_eq!(request.header("host"), None);
        assert!(headers_of(&request).is_empty());
    }

    #[test]
    fn mutation_is_shared_between_clones() {
        let request = MemoryRequest::builder().url("/users/42").route("/users/{id}").build().unwrap();
        let clone = request.clone();

        clone.set_parameter(0, "43");
        clone.set_header("X-Trace", "abc");

        assert_eq!(request.parameter(0).as_deref(), Some("43"));
        assert_eq!(request.header("x-trace").as_deref(), Some("abc"));
    }
}
