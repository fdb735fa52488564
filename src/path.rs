//! Logical paths from the document root.

use std::fmt;

/// One step of a path: a field name or a sequence index.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathKey {
    Field(String),
    Index(usize),
}

impl PathKey {
    pub fn as_field(&self) -> Option<&str> {
        match self {
            PathKey::Field(name) => Some(name),
            PathKey::Index(_) => None,
        }
    }

    pub fn is_index(&self) -> bool {
        matches!(self, PathKey::Index(_))
    }
}

impl From<&str> for PathKey {
    fn from(name: &str) -> Self {
        PathKey::Field(name.to_string())
    }
}

impl From<String> for PathKey {
    fn from(name: String) -> Self {
        PathKey::Field(name)
    }
}

impl From<usize> for PathKey {
    fn from(index: usize) -> Self {
        PathKey::Index(index)
    }
}

impl fmt::Display for PathKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathKey::Field(name) => f.write_str(name),
            PathKey::Index(index) => write!(f, "{}", index),
        }
    }
}

/// Render a path as a JSON Pointer (RFC 6901). The root is `""`.
pub fn to_pointer(path: &[PathKey]) -> String {
    let mut out = String::new();
    for key in path {
        out.push('/');
        match key {
            PathKey::Field(name) => out.push_str(&name.replace('~', "~0").replace('/', "~1")),
            PathKey::Index(index) => out.push_str(&index.to_string()),
        }
    }
    out
}

/// Split a JSON Pointer into unescaped segments.
///
/// Accepts an optional leading `#` so fragments work too. `""` and `"#"` denote
/// the root; `"/"` is the single empty key, as in RFC 6901.
pub fn pointer_segments(pointer: &str) -> Vec<String> {
    let path = pointer.strip_prefix('#').unwrap_or(pointer);
    if path.is_empty() {
        return Vec::new();
    }
    let path = path.strip_prefix('/').unwrap_or(path);
    path.split('/')
        // ~1 before ~0 so "~01" decodes to "~1"
        .map(|part| part.replace("~1", "/").replace("~0", "~"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pointer_of_root_is_empty() {
        assert_eq!(to_pointer(&[]), "");
    }

    #[test]
    fn pointer_escapes_special_characters() {
        let path = vec![
            PathKey::from("a/b"),
            PathKey::from(2usize),
            PathKey::from("m~n"),
        ];
        assert_eq!(to_pointer(&path), "/a~1b/2/m~0n");
    }

    #[test]
    fn segments_unescape() {
        assert_eq!(pointer_segments("/a~1b/2/m~0n"), vec!["a/b", "2", "m~n"]);
        assert_eq!(pointer_segments("#/results/0"), vec!["results", "0"]);
    }

    #[test]
    fn segments_of_root() {
        assert!(pointer_segments("").is_empty());
        assert!(pointer_segments("#").is_empty());
    }

    #[test]
    fn empty_segments_are_keys() {
        assert_eq!(pointer_segments("/"), vec![""]);
        assert_eq!(pointer_segments("#/"), vec![""]);
        assert_eq!(pointer_segments("//a"), vec!["", "a"]);
        assert_eq!(pointer_segments("/a/"), vec!["a", ""]);
    }
}
