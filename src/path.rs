//! Path classification.
//!
//! Paths are slash-delimited. Empty segments (leading, trailing or doubled
//! slashes) are ignored. An even segment count addresses a single document
//! (`users/u1`), an odd count addresses a collection (`users`,
//! `users/u1/todos`).

/// Non-empty segments of a path.
pub fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

/// Whether `path` addresses a single document.
pub fn is_document_path(path: &str) -> bool {
    segments(path).count() % 2 == 0
}

/// Last segment of a path; for a document path this is its id.
pub fn last_segment(path: &str) -> Option<&str> {
    segments(path).last()
}

/// Append a segment to a path.
pub fn join(base: &str, segment: &str) -> String {
    let base = base.trim_end_matches('/');
    let segment = segment.trim_start_matches('/');
    if base.is_empty() {
        segment.to_string()
    } else {
        format!("{}/{}", base, segment)
    }
}
