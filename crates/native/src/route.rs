//! Route placeholder helpers.
//!
//! The native server resolves placeholders by index; the router that matched
//! the request supplies the ordered placeholder names. Both `{name}` (and the
//! catch-all `{*name}`) and `:name` pattern styles are understood.

/// Returns the placeholder names of `pattern`, in order of appearance.
///
/// ```
/// use micro_native::route_param_names;
///
/// assert_eq!(route_param_names("/users/:id/posts/{post}"), vec!["id", "post"]);
/// assert!(route_param_names("/health").is_empty());
/// ```
pub fn route_param_names(pattern: &str) -> Vec<String> {
    pattern.split('/').filter_map(segment_param).map(str::to_owned).collect()
}

/// Rewrites `:name` segments into the `{name}` syntax understood by `matchit`.
pub(crate) fn to_matchit_pattern(pattern: &str) -> String {
    pattern
        .split('/')
        .map(|segment| match segment.strip_prefix(':') {
            Some(name) if !name.is_empty() => format!("{{{name}}}"),
            _ => segment.to_owned(),
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn segment_param(segment: &str) -> Option<&str> {
    if let Some(name) = segment.strip_prefix(':') {
        return (!name.is_empty()).then_some(name);
    }

    let inner = segment.strip_prefix('{')?.strip_suffix('}')?;
    let name = inner.strip_prefix('*').unwrap_or(inner);
    (!name.is_empty()).then_some(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_in_order() {
        assert_eq!(route_param_names("/a/{x}/b/{y}"), vec!["x", "y"]);
        assert_eq!(route_param_names("/a/:x/b/:y"), vec!["x", "y"]);
        assert_eq!(route_param_names("/static/{*rest}"), vec!["rest"]);
    }

    #[test]
    fn ignores_plain_segments() {
        assert!(route_param_names("/").is_empty());
        assert!(route_param_names("/a/:/b").is_empty());
        assert!(route_param_names("/a/{}/b").is_empty());
    }

    #[test]
    fn rewrites_colon_segments() {
        assert_eq!(to_matchit_pattern("/users/:id"), "/users/{id}");
        assert_eq!(to_matchit_pattern("/users/{id}"), "/users/{id}");
        assert_eq!(to_matchit_pattern("/"), "/");
    }
}
