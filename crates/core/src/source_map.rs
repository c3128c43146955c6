//! File identity for multi-file compilation units.
//!
//! A `FileId` is a small opaque handle; the map from id back to a display
//! path lives in `SourceMap`. A single `.bas` file registers one entry;
//! included modules each get their own, so every `SourceLocation` can name
//! its file without carrying a `PathBuf` around everywhere.

use std::path::{Path, PathBuf};

/// Opaque handle to a registered source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(u32);

impl FileId {
    /// The id assigned to the first file registered in a fresh `SourceMap`.
    pub const FIRST: FileId = FileId(0);

    fn index(self) -> usize {
        self.0 as usize
    }
}

/// Registry of source file paths, indexed by `FileId`.
#[derive(Debug, Clone, Default)]
pub struct SourceMap {
    paths: Vec<PathBuf>,
}

impl SourceMap {
    pub fn new() -> Self {
        SourceMap { paths: Vec::new() }
    }

    /// Register a file and return its id. Calling this twice with the same
    /// path yields two distinct ids; callers that want de-duplication should
    /// track that themselves (includes are resolved at most once by the
    /// resolver, which already knows what it has visited).
    pub fn add(&mut self, path: impl Into<PathBuf>) -> FileId {
        let id = FileId(self.paths.len() as u32);
        self.paths.push(path.into());
        id
    }

    pub fn path(&self, id: FileId) -> &Path {
        &self.paths[id.index()]
    }

    pub fn display(&self, id: FileId) -> String {
        self.path(id).display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_registered_file_gets_first_id() {
        let mut map = SourceMap::new();
        let id = map.add("main.bas");
        assert_eq!(id, FileId::FIRST);
        assert_eq!(map.display(id), "main.bas");
    }

    #[test]
    fn distinct_files_get_distinct_ids() {
        let mut map = SourceMap::new();
        let a = map.add("main.bas");
        let b = map.add("util.bas");
        assert_ne!(a, b);
        assert_eq!(map.display(b), "util.bas");
    }
}
