use globset::{Glob, GlobSet, GlobSetBuilder};
use log::warn;
use std::ffi::OsStr;
use std::fs;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;

pub const IGNORE_FILE: &str = ".gitignore";

/// Glob patterns from a single ignore file, applied to basenames of the
/// directory the file lives in and of all descendants.
///
/// Only plain shell globs (`*`, `?`, `[...]`) are understood; negation,
/// anchoring and directory suffixes are not. A task carries at most one
/// inherited set, so a directory that loads its own set replaces whatever
/// an ancestor provided for everything below it. Sets never compose.
#[derive(Debug)]
pub struct IgnoreSet {
    globs: GlobSet,
    len: usize,
}

impl IgnoreSet {
    /// Loads `dir/.gitignore`. Absence, unreadability and an all-comment
    /// file all come back as `None`; only real read trouble is logged.
    pub fn load(dir: &Path) -> Option<Arc<IgnoreSet>> {
        let path = dir.join(IGNORE_FILE);
        let file = match fs::File::open(&path) {
            Ok(f) => f,
            Err(ref e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("cannot read {}: {}", path.display(), e);
                return None;
            }
        };
        IgnoreSet::parse(BufReader::new(file), &path).map(Arc::new)
    }

    /// One glob per line; `#` comments, blank lines and trailing whitespace
    /// are dropped. A set without a single usable pattern is no set at all.
    fn parse(reader: impl BufRead, origin: &Path) -> Option<IgnoreSet> {
        let mut builder = GlobSetBuilder::new();
        let mut len = 0;
        for line in reader.lines() {
            let line = match line {
                Ok(l) => l,
                Err(err) => {
                    warn!("cannot read {}: {}", origin.display(), err);
                    break;
                }
            };
            let pat = line.trim_end();
            if pat.is_empty() || pat.starts_with('#') {
                continue;
            }
            match Glob::new(pat) {
                Ok(glob) => {
                    builder.add(glob);
                    len += 1;
                }
                Err(err) => warn!("{}: bad pattern '{}': {}", origin.display(), pat, err),
            }
        }
        if len == 0 {
            return None;
        }
        match builder.build() {
            Ok(globs) => Some(IgnoreSet { globs, len }),
            Err(err) => {
                warn!("{}: {}", origin.display(), err);
                None
            }
        }
    }

    pub fn matches(&self, name: &OsStr) -> bool {
        self.globs.is_match(name)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn set(contents: &str) -> Option<IgnoreSet> {
        IgnoreSet::parse(Cursor::new(contents.to_owned()), Path::new("test"))
    }

    #[test]
    fn skips_comments_blanks_and_trailing_whitespace() {
        let s = set("# build output\n\ntarget   \n*.o\n").unwrap();
        assert_eq!(s.len(), 2);
        assert!(s.matches(OsStr::new("target")));
        assert!(s.matches(OsStr::new("main.o")));
        assert!(!s.matches(OsStr::new("# build output")));
    }

    #[test]
    fn empty_file_is_no_set() {
        assert!(set("").is_none());
        assert!(set("# only comments\n\n").is_none());
    }

    #[test]
    fn shell_glob_classes() {
        let s = set("?.txt\n[ab]*.log\n").unwrap();
        assert!(s.matches(OsStr::new("x.txt")));
        assert!(!s.matches(OsStr::new("xy.txt")));
        assert!(s.matches(OsStr::new("a-debug.log")));
        assert!(!s.matches(OsStr::new("c.log")));
    }

    #[test]
    fn bad_pattern_is_skipped_not_fatal() {
        let s = set("pattern[*\nnode_modules\n").unwrap();
        assert_eq!(s.len(), 1);
        assert!(s.matches(OsStr::new("node_modules")));
    }

    #[test]
    fn load_from_directory() {
        let t = TempDir::new().unwrap();
        assert!(IgnoreSet::load(t.path()).is_none());

        fs::write(t.path().join(IGNORE_FILE), "node_modules\n").unwrap();
        let s = IgnoreSet::load(t.path()).unwrap();
        assert!(s.matches(OsStr::new("node_modules")));
        assert!(!s.matches(OsStr::new("src")));
    }
}
