use crate::pool::SubmitError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Setup failures. Any of these aborts the program before the walk starts;
/// per-entry trouble during the walk is logged and skipped instead.
#[derive(Debug, Error)]
pub enum FfErr {
    #[error("invalid regex '{0}': {1}")]
    BadRegex(String, regex::Error),
    #[error("invalid size filter '{0}'")]
    BadSize(String),
    #[error("invalid mtime filter '{0}'")]
    BadMtime(String),
    #[error("invalid permission filter '{0}'")]
    BadPerms(String),
    #[error("invalid type filter '{0}'")]
    BadType(String),
    #[error("unknown output format '{0}'")]
    BadFormat(String),
    #[error("user not found: {0}")]
    UnknownUser(String),
    #[error("cannot open output file {}: {}", .0.display(), .1)]
    OutputFile(PathBuf, io::Error),
    #[error("cannot create thread pool: {0}")]
    Pool(io::Error),
    #[error("thread pool needs at least one worker and a non-empty queue")]
    PoolSize,
    #[error("cannot start walk: {0}")]
    Seed(SubmitError),
}

impl FfErr {
    /// One-line usage hint shown below the error message.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            FfErr::BadSize(_) => Some("use N, NK, NM or NG, with an optional + or - prefix"),
            FfErr::BadMtime(_) => Some("use Nd (e.g. 7d), with an optional + or - prefix"),
            FfErr::BadPerms(_) => Some("use a 3-digit octal number, e.g. 755"),
            FfErr::BadType(_) => Some("combine the characters f, d and l"),
            FfErr::BadFormat(_) => Some("choose one of text, json, csv"),
            FfErr::UnknownUser(_) => Some("check the user name"),
            _ => None,
        }
    }
}
