//! Path relevance filter

/// Whether `path` is relevant to any of `fragments`.
///
/// An empty fragment list disables filtering. A path matches a fragment when
/// the path contains the fragment, the fragment contains the path, or the
/// path starts with the fragment.
pub fn is_relevant(path: &str, fragments: &[String]) -> bool {
    if fragments.is_empty() {
        return true;
    }

    fragments.iter().any(|fragment| {
        path.contains(fragment.as_str())
            || fragment.contains(path)
            || path.starts_with(fragment.as_str())
    })
}
