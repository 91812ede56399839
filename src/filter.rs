use crate::config::SearchConfig;
use crate::output::Sink;
use crate::scan::{self, ScanResult};
use std::ffi::OsString;
use std::fs::Metadata;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::MetadataExt;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    File,
    Dir,
    Symlink,
}

impl FileKind {
    /// Classifies an `lstat` result. Sockets, pipes and devices have no
    /// kind here and never match or recurse.
    pub fn of(meta: &Metadata) -> Option<FileKind> {
        let ft = meta.file_type();
        if ft.is_symlink() {
            Some(FileKind::Symlink)
        } else if ft.is_dir() {
            Some(FileKind::Dir)
        } else if ft.is_file() {
            Some(FileKind::File)
        } else {
            None
        }
    }

    pub fn tag(self) -> char {
        match self {
            FileKind::File => 'f',
            FileKind::Dir => 'd',
            FileKind::Symlink => 'l',
        }
    }
}

/// One directory entry under consideration, with its `lstat` result.
/// Transient: built, filtered, possibly reported, then dropped.
#[derive(Debug)]
pub struct Entry {
    pub path: PathBuf,
    pub name: OsString,
    pub meta: Metadata,
    pub kind: FileKind,
    pub depth: usize,
}

/// Filter chain result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Failed a predicate.
    Skip,
    /// Passed every predicate; hand to the match handler.
    Match,
    /// Passed, but the content scan already wrote line records, so the
    /// handler must stay quiet.
    Emitted,
}

/// Applies the predicates in order: type mask, name regex, size, mtime,
/// extension, content, owner, permissions. Short-circuits on the first
/// failure. Size, mtime, extension and content apply to regular files
/// only and fail anything else once configured.
pub fn evaluate(cfg: &SearchConfig, sink: &Sink, entry: &Entry) -> Verdict {
    if !cfg.types.accepts(entry.kind) {
        return Verdict::Skip;
    }
    if !cfg.name_re.is_match(entry.name.as_bytes()) {
        return Verdict::Skip;
    }

    let is_file = entry.kind == FileKind::File;
    if let Some(size) = &cfg.size {
        if !is_file || !size.matches(entry.meta.len()) {
            return Verdict::Skip;
        }
    }
    if let Some(mtime) = &cfg.mtime {
        if !is_file || !mtime.matches(age_secs(&entry.meta)) {
            return Verdict::Skip;
        }
    }
    if let Some(ext) = &cfg.extension {
        if !is_file || !ends_with(entry.name.as_bytes(), ext.as_bytes(), cfg.ignore_case) {
            return Verdict::Skip;
        }
    }

    let mut emitted = false;
    if let Some(re) = &cfg.content_re {
        if !is_file {
            return Verdict::Skip;
        }
        match scan::scan_file(cfg, re, sink, &entry.path) {
            ScanResult::NoMatch => return Verdict::Skip,
            ScanResult::Match => {}
            ScanResult::Emitted => emitted = true,
        }
    }

    if let Some(uid) = cfg.owner {
        if entry.meta.uid() != uid {
            return Verdict::Skip;
        }
    }
    if let Some(perms) = cfg.perms {
        if entry.meta.mode() & 0o777 != perms {
            return Verdict::Skip;
        }
    }

    if emitted {
        Verdict::Emitted
    } else {
        Verdict::Match
    }
}

fn age_secs(meta: &Metadata) -> i64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    now - meta.mtime()
}

fn ends_with(name: &[u8], suffix: &[u8], ignore_case: bool) -> bool {
    if suffix.len() > name.len() {
        return false;
    }
    let tail = &name[name.len() - suffix.len()..];
    if ignore_case {
        tail.eq_ignore_ascii_case(suffix)
    } else {
        tail == suffix
    }
}
