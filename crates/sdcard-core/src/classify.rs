//! Coarse content-type tagging for catalog listings.

use std::fmt;

/// Suffix of list program files.
pub const LIST_EXT: &str = ".list";

/// Suffix of saved instrument profiles.
pub const PROFILE_EXT: &str = ".prof";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Folder,
    List,
    Profile,
    Binary,
}

impl EntryKind {
    /// Tag reported to remote catalog callers.
    pub fn tag(&self) -> &'static str {
        match self {
            EntryKind::Folder => "FOLD",
            EntryKind::List => "LIST",
            EntryKind::Profile => "PROF",
            EntryKind::Binary => "BIN",
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Directories win over any suffix; suffix matching is case-sensitive.
pub fn classify(name: &str, is_directory: bool) -> EntryKind {
    if is_directory {
        EntryKind::Folder
    } else if name.ends_with(LIST_EXT) {
        EntryKind::List
    } else if name.ends_with(PROFILE_EXT) {
        EntryKind::Profile
    } else {
        EntryKind::Binary
    }
}
