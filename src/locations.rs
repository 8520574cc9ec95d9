//! Schema location resolution
//!
//! Locations found in `schemaLocation` attributes are resolved against the
//! location of the document that mentions them. Resolution is purely lexical;
//! nothing here touches the file system.

use std::path::PathBuf;
use url::Url;

use crate::error::{LoadError, Result};

/// A classified schema location
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// Path relative to the loader root, already normalized
    Relative(String),
    /// Absolute file system path (including `file:` URLs)
    Absolute(PathBuf),
    /// Any other URL (`http:`, `urn:`, …)
    Url(Url),
}

impl Location {
    /// Classify a location string
    pub fn classify(location: &str) -> Result<Self> {
        if location.starts_with('/') || location.starts_with('\\') {
            return Ok(Location::Absolute(PathBuf::from(location)));
        }
        // Single-letter schemes are drive letters, not URLs
        if let Some((scheme, _)) = location.split_once(':') {
            if scheme.len() > 1 && scheme.chars().all(|c| c.is_ascii_alphanumeric() || "+-.".contains(c)) {
                let url = Url::parse(location)?;
                if url.scheme() == "file" {
                    let path = url.to_file_path().map_err(|_| {
                        LoadError::new("file URL does not name a local path")
                            .with_location(location)
                    })?;
                    return Ok(Location::Absolute(path));
                }
                return Ok(Location::Url(url));
            }
            if scheme.len() == 1 {
                return Ok(Location::Absolute(PathBuf::from(location)));
            }
        }
        Ok(Location::Relative(normalize_path(location)))
    }

    /// Whether this location needs a network fetch
    pub fn is_remote(&self) -> bool {
        matches!(self, Location::Url(url) if matches!(url.scheme(), "http" | "https" | "ftp"))
    }

    /// Whether a relative location climbs above its root after normalization
    pub fn escapes_root(&self) -> bool {
        matches!(self, Location::Relative(path) if path == ".." || path.starts_with("../"))
    }
}

/// Resolve `relative` against the location of the document `base`
///
/// Absolute paths and URLs are returned unchanged.
pub fn join_location(base: &str, relative: &str) -> String {
    let relative = relative.trim();
    match Location::classify(relative) {
        Ok(Location::Relative(_)) => {}
        _ => return relative.to_string(),
    }
    let dir = match base.rfind('/') {
        Some(idx) => &base[..=idx],
        None => "",
    };
    normalize_path(&format!("{}{}", dir, relative))
}

/// Collapse `.` and `..` segments and duplicate separators
pub fn normalize_path(path: &str) -> String {
    let absolute = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => {
                if matches!(parts.last(), Some(last) if *last != "..") {
                    parts.pop();
                } else if !absolute {
                    parts.push("..");
                }
            }
            other => parts.push(other),
        }
    }
    let joined = parts.join("/");
    if absolute {
        format!("/{}", joined)
    } else {
        joined
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_url() {
        let loc = Location::classify("http://example.com/schema.xsd").unwrap();
        assert!(loc.is_remote());
        let loc = Location::classify("urn:x:y").unwrap();
        assert!(matches!(loc, Location::Url(_)));
        assert!(!loc.is_remote());
    }

    #[test]
    fn test_classify_paths() {
        assert!(matches!(
            Location::classify("/tmp/schema.xsd").unwrap(),
            Location::Absolute(_)
        ));
        assert!(matches!(
            Location::classify("C:/schemas/a.xsd").unwrap(),
            Location::Absolute(_)
        ));
        assert_eq!(
            Location::classify("./a/../b.xsd").unwrap(),
            Location::Relative("b.xsd".to_string())
        );
    }

    #[test]
    fn test_join_location() {
        assert_eq!(join_location("main.xsd", "types.xsd"), "types.xsd");
        assert_eq!(join_location("dir/main.xsd", "types.xsd"), "dir/types.xsd");
        assert_eq!(join_location("dir/main.xsd", "../common/t.xsd"), "common/t.xsd");
        assert_eq!(
            join_location("dir/main.xsd", "https://example.com/x.xsd"),
            "https://example.com/x.xsd"
        );
    }

    #[test]
    fn test_escapes_root() {
        assert!(Location::classify("../x.xsd").unwrap().escapes_root());
        assert!(!Location::classify("a/../x.xsd").unwrap().escapes_root());
    }
}
