//! Parallel filesystem search engine: a bounded task pool walks one
//! directory per task, applies name/content/metadata filters and hands
//! matches to a pluggable handler. The `fastfind` binary is the full CLI;
//! `hound` reuses the engine for secret scanning.

pub mod config;
pub mod errors;
pub mod filter;
pub mod ignore;
pub mod output;
pub mod pool;
pub mod scan;
pub mod statistics;
pub mod walk;

#[cfg(test)]
pub(crate) mod testutil;

pub use crate::config::{OutputFormat, SearchConfig};
pub use crate::errors::FfErr;
pub use crate::filter::{Entry, FileKind};
pub use crate::output::{Output, Sink};
pub use crate::statistics::WalkStats;
pub use crate::walk::{run, MatchHandler, SinkHandler};
