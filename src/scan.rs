use crate::config::SearchConfig;
use crate::output::Sink;
use log::{debug, warn};
use regex::bytes::Regex;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Outcome of scanning one file's contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanResult {
    NoMatch,
    Match,
    /// Matched, and every matching line already went to the sink as
    /// `path:NN:line`; the caller must not emit a path record on top.
    Emitted,
}

/// Line-by-line content scan. Lines are handled as raw bytes, so binary
/// and non-UTF-8 files simply match or don't. Without line numbers the
/// scan stops at the first hit.
pub fn scan_file(cfg: &SearchConfig, re: &Regex, sink: &Sink, path: &Path) -> ScanResult {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(err) => {
            warn!("cannot read {}: {}", path.display(), err);
            return ScanResult::NoMatch;
        }
    };
    debug!("scanning {}", path.display());
    let mut reader = BufReader::new(file);
    let mut line = Vec::new();
    let mut line_num = 0u64;
    let mut found = false;
    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(err) => {
                warn!("cannot read {}: {}", path.display(), err);
                break;
            }
        }
        line_num += 1;
        while line
            .last()
            .map_or(false, |b| *b == b'\n' || *b == b'\r')
        {
            line.pop();
        }
        if re.is_match(&line) {
            found = true;
            if cfg.line_numbers {
                sink.content_line(path, line_num, &line);
            } else {
                break;
            }
        }
    }
    match (found, cfg.line_numbers) {
        (true, true) => ScanResult::Emitted,
        (true, false) => ScanResult::Match,
        (false, _) => ScanResult::NoMatch,
    }
}
