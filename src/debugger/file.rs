use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use crate::debugger::id::Id;

pub type FileId = Id<File>;

/// Source position reported by a host thread.
#[derive(Clone)]
pub struct Location {
    pub file: Arc<File>,
    pub line: i64,
}

impl Location {
    pub fn new(file: Arc<File>, line: i64) -> Location {
        Location { file, line }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Flavor {
    /// Source text lives only in memory, served by sourceReference.
    Virtual,
    /// Source is a file on disk, addressed by path.
    Physical,
}

/// A source unit with its line breakpoints.
pub struct File {
    pub id: FileId,
    pub dir: String,
    pub name: String,
    flavor: Flavor,
    source: Option<String>,
    breakpoints: Mutex<HashSet<i64>>,
}

impl File {
    pub(super) fn new_virtual(id: FileId, name: &str, source: &str) -> File {
        File {
            id,
            dir: String::new(),
            name: name.to_string(),
            flavor: Flavor::Virtual,
            source: Some(source.to_string()),
            breakpoints: Mutex::new(HashSet::new()),
        }
    }

    pub(super) fn new_physical(id: FileId, dir: &str, name: &str, source: Option<&str>) -> File {
        File {
            id,
            dir: dir.to_string(),
            name: name.to_string(),
            flavor: Flavor::Physical,
            source: source.map(str::to_string),
            breakpoints: Mutex::new(HashSet::new()),
        }
    }

    pub fn is_virtual(&self) -> bool {
        self.flavor == Flavor::Virtual
    }

    pub fn path(&self) -> String {
        if self.dir.is_empty() {
            self.name.clone()
        } else {
            format!("{}/{}", self.dir, self.name)
        }
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn add_breakpoint(&self, line: i64) {
        self.breakpoints.lock().unwrap().insert(line);
    }

    pub fn clear_breakpoints(&self) {
        self.breakpoints.lock().unwrap().clear();
    }

    /// Replace the whole breakpoint set in one step, so a concurrent
    /// `has_breakpoint` never observes a half-applied update.
    pub fn set_breakpoints(&self, lines: impl IntoIterator<Item = i64>) {
        let mut breakpoints = self.breakpoints.lock().unwrap();
        breakpoints.clear();
        breakpoints.extend(lines);
    }

    pub fn has_breakpoint(&self, line: i64) -> bool {
        self.breakpoints.lock().unwrap().contains(&line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_joins_dir_and_name() {
        let file = File::new_physical(Id::new(1), "shaders/water", "caustics.frag", None);
        assert_eq!(file.path(), "shaders/water/caustics.frag");

        let bare = File::new_physical(Id::new(2), "", "caustics.frag", None);
        assert_eq!(bare.path(), "caustics.frag");
    }

    #[test]
    fn virtual_file_keeps_source() {
        let file = File::new_virtual(Id::new(1), "a.frag", "void main() {}\n");
        assert!(file.is_virtual());
        assert_eq!(file.source(), Some("void main() {}\n"));
        assert_eq!(file.path(), "a.frag");
    }

    #[test]
    fn breakpoint_set_is_replaced_atomically() {
        let file = File::new_virtual(Id::new(1), "a.frag", "");
        file.add_breakpoint(3);
        file.set_breakpoints([10, 20]);

        assert!(file.has_breakpoint(10));
        assert!(file.has_breakpoint(20));
        assert!(!file.has_breakpoint(3));
        assert!(!file.has_breakpoint(15));

        file.clear_breakpoints();
        assert!(!file.has_breakpoint(10));
    }
}
