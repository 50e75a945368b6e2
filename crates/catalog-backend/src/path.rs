//! Helpers for `/`-separated backend paths.

/// Join two path fragments with a single `/`, skipping empty sides.
///
/// ```
/// use catalog_backend::path::join;
///
/// assert_eq!(join("completed/data", "a.bin"), "completed/data/a.bin");
/// assert_eq!(join("", "a.bin"), "a.bin");
/// assert_eq!(join("completed/meta/", ""), "completed/meta");
/// ```
pub fn join(base: &str, rest: &str) -> String {
    let base = base.trim_end_matches('/');
    let rest = rest.trim_start_matches('/');
    match (base.is_empty(), rest.is_empty()) {
        (true, _) => rest.to_string(),
        (false, true) => base.to_string(),
        (false, false) => format!("{base}/{rest}"),
    }
}

/// Parent of a path, or `None` for top-level entries and the root.
pub fn parent(path: &str) -> Option<&str> {
    let path = path.trim_end_matches('/');
    path.rfind('/').map(|idx| &path[..idx])
}

/// Final component of a path.
pub fn file_name(path: &str) -> &str {
    let path = path.trim_end_matches('/');
    path.rsplit('/').next().unwrap_or(path)
}

/// Every proper ancestor of `path`, shallowest first.
pub fn ancestors(path: &str) -> Vec<&str> {
    let path = path.trim_end_matches('/');
    path.match_indices('/').map(|(idx, _)| &path[..idx]).collect()
}

/// Strip `prefix/` from the front of `path`.
pub fn strip_dir<'a>(path: &'a str, dir: &str) -> Option<&'a str> {
    let dir = dir.trim_end_matches('/');
    if dir.is_empty() {
        return Some(path);
    }
    path.strip_prefix(dir)?.strip_prefix('/')
}

/// Normalize a path: trim surrounding slashes.
pub fn normalize(path: &str) -> &str {
    path.trim_matches('/')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_variants() {
        assert_eq!(join("a", "b"), "a/b");
        assert_eq!(join("a/", "/b"), "a/b");
        assert_eq!(join("", ""), "");
    }

    #[test]
    fn parent_and_name() {
        assert_eq!(parent("a/b/c"), Some("a/b"));
        assert_eq!(parent("a"), None);
        assert_eq!(file_name("a/b/c"), "c");
        assert_eq!(file_name("c"), "c");
    }

    #[test]
    fn ancestors_shallowest_first() {
        assert_eq!(ancestors("a/b/c"), vec!["a", "a/b"]);
        assert!(ancestors("a").is_empty());
    }

    #[test]
    fn strip_dir_requires_separator() {
        assert_eq!(strip_dir("completed/meta/x", "completed/meta"), Some("x"));
        assert_eq!(strip_dir("completed/metadata", "completed/meta"), None);
        assert_eq!(strip_dir("x", ""), Some("x"));
    }
}
