//! Helpers shared by the module tests.

use crate::filter::Entry;
use crate::walk::MatchHandler;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Creates `root/rel` (and any missing parents) with `contents`.
pub fn write_file(root: &Path, rel: &str, contents: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, contents).unwrap();
}

/// In-memory sink target that the test can read back.
#[derive(Clone, Default)]
pub struct CaptureBuf(Arc<Mutex<Vec<u8>>>);

impl CaptureBuf {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for CaptureBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Match handler that records paths relative to the walk root, in whatever
/// order the workers produce them.
pub struct Collector {
    root: PathBuf,
    seen: Mutex<Vec<String>>,
}

impl Collector {
    pub fn new(root: PathBuf) -> Collector {
        Collector {
            root,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn relative(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

impl MatchHandler for Collector {
    fn on_match(&self, entry: &Entry) {
        let rel = entry.path.strip_prefix(&self.root).unwrap_or(&entry.path);
        self.seen
            .lock()
            .unwrap()
            .push(rel.display().to_string());
    }
}
