//! Medium path newtype used by the driver backends.
//!
//! `MediumPath` is an absolute, normalized path on the medium. It rejects
//! `.`/`..` components, `//`, null bytes, and anything longer than
//! `MAX_PATH_LENGTH`, so a host-backed medium can never address files
//! outside its root directory.

use std::fmt;
use std::io::{self, ErrorKind};

/// Longest path (and entry name) the medium accepts, in bytes.
pub const MAX_PATH_LENGTH: usize = 128;

/// Absolute path on the medium.
///
/// Invariants (enforced at construction):
/// - Starts with `/`
/// - No `.` or `..` components, no `//`, no null bytes
/// - No trailing `/` (except root `/`)
/// - At most `MAX_PATH_LENGTH` bytes
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MediumPath(String);

impl MediumPath {
    /// Validate and normalize a caller path.
    ///
    /// A missing leading `/` is added, a single trailing `/` is dropped and
    /// the empty string names the root.
    pub fn new(path: &str) -> io::Result<Self> {
        if path.contains('\0') {
            return Err(io::Error::new(
                ErrorKind::InvalidInput,
                "path cannot contain null bytes",
            ));
        }
        let mut normalized = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{}", path)
        };
        if normalized.len() > 1 && normalized.ends_with('/') {
            normalized.pop();
        }
        if normalized.len() > MAX_PATH_LENGTH {
            return Err(io::Error::new(
                ErrorKind::InvalidInput,
                format!("path longer than {} bytes: {}", MAX_PATH_LENGTH, path),
            ));
        }
        if normalized.contains("//") {
            return Err(io::Error::new(
                ErrorKind::InvalidInput,
                format!("path cannot contain '//': {}", path),
            ));
        }
        if normalized.split('/').any(|c| c == "." || c == "..") {
            return Err(io::Error::new(
                ErrorKind::InvalidInput,
                format!("path cannot contain '.' or '..': {}", path),
            ));
        }
        Ok(Self(normalized))
    }

    pub fn root() -> Self {
        Self("/".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// Parent path, or `None` for the root.
    pub fn parent(&self) -> Option<MediumPath> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind('/') {
            Some(0) => Some(MediumPath::root()),
            Some(pos) => Some(MediumPath(self.0[..pos].to_string())),
            None => None,
        }
    }

    /// Final component, or `None` for the root.
    pub fn file_name(&self) -> Option<&str> {
        if self.is_root() {
            return None;
        }
        self.0.rsplit('/').next()
    }

    /// Append a single entry name.
    pub fn join(&self, name: &str) -> io::Result<MediumPath> {
        if name.is_empty() || name.contains('/') {
            return Err(io::Error::new(
                ErrorKind::InvalidInput,
                format!("not a single entry name: {}", name),
            ));
        }
        if self.is_root() {
            MediumPath::new(&format!("/{}", name))
        } else {
            MediumPath::new(&format!("{}/{}", self.0, name))
        }
    }

    /// Path relative to the root, without the leading `/`.
    pub fn relative(&self) -> &str {
        &self.0[1..]
    }

    /// Whether `self` is `other` or lies beneath it.
    pub fn starts_with(&self, other: &MediumPath) -> bool {
        other.is_root()
            || self.0 == other.0
            || (self.0.starts_with(&other.0) && self.0[other.0.len()..].starts_with('/'))
    }
}

impl fmt::Display for MediumPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_paths() {
        assert!(MediumPath::new("/lists/run.list").is_ok());
        assert!(MediumPath::new("/").is_ok());
    }

    #[test]
    fn test_normalizes_leading_and_trailing_slash() {
        assert_eq!(MediumPath::new("data/a.bin").unwrap().as_str(), "/data/a.bin");
        assert_eq!(MediumPath::new("/data/").unwrap().as_str(), "/data");
        assert!(MediumPath::new("").unwrap().is_root());
    }

    #[test]
    fn test_rejects_dot_components() {
        assert!(MediumPath::new("/data/../etc").is_err());
        assert!(MediumPath::new("/./data").is_err());
    }

    #[test]
    fn test_rejects_double_slash_and_nulls() {
        assert!(MediumPath::new("/data//a").is_err());
        assert!(MediumPath::new("/data/\0a").is_err());
    }

    #[test]
    fn test_rejects_overlong() {
        let long = format!("/{}", "x".repeat(MAX_PATH_LENGTH));
        assert!(MediumPath::new(&long).is_err());
        let fits = format!("/{}", "x".repeat(MAX_PATH_LENGTH - 1));
        assert!(MediumPath::new(&fits).is_ok());
    }

    #[test]
    fn test_parent_and_file_name() {
        let p = MediumPath::new("/a/b/c.prof").unwrap();
        assert_eq!(p.parent().unwrap().as_str(), "/a/b");
        assert_eq!(p.file_name(), Some("c.prof"));
        assert_eq!(MediumPath::new("/top").unwrap().parent(), Some(MediumPath::root()));
        assert!(MediumPath::root().parent().is_none());
        assert_eq!(MediumPath::root().file_name(), None);
    }

    #[test]
    fn test_join() {
        let base = MediumPath::new("/lists").unwrap();
        assert_eq!(base.join("x.list").unwrap().as_str(), "/lists/x.list");
        assert_eq!(MediumPath::root().join("x").unwrap().as_str(), "/x");
        assert!(base.join("a/b").is_err());
        assert!(base.join("..").is_err());
    }

    #[test]
    fn test_starts_with() {
        let dir = MediumPath::new("/data").unwrap();
        assert!(MediumPath::new("/data/x").unwrap().starts_with(&dir));
        assert!(dir.starts_with(&dir));
        assert!(!MediumPath::new("/database").unwrap().starts_with(&dir));
        assert!(dir.starts_with(&MediumPath::root()));
    }
}
