use crate::config::SearchConfig;
use crate::errors::FfErr;
use crate::filter::{self, Entry, FileKind, Verdict};
use crate::ignore::IgnoreSet;
use crate::output::Sink;
use crate::pool::{Spawner, TaskPool};
use crate::statistics::WalkStats;
use log::warn;
use std::fs;
use std::os::unix::ffi::OsStrExt;
use std::path::PathBuf;
use std::sync::Arc;

/// Per-match callback, invoked without any lock held. The default writes a
/// sink record; the CLI layer plugs in exec/delete actions instead.
pub trait MatchHandler: Send + Sync {
    fn on_match(&self, entry: &Entry);
}

/// Default handler: one formatted record per match.
pub struct SinkHandler {
    pub sink: Arc<Sink>,
}

impl MatchHandler for SinkHandler {
    fn on_match(&self, entry: &Entry) {
        self.sink.record(entry);
    }
}

/// State shared by every task of one walk.
struct Shared {
    config: Arc<SearchConfig>,
    sink: Arc<Sink>,
    handler: Arc<dyn MatchHandler>,
    stats: Arc<WalkStats>,
    spawner: Spawner,
}

/// One directory to enumerate. Owned by exactly one worker; dropping it
/// releases the owned path and the inherited ignore set.
struct WalkTask {
    shared: Arc<Shared>,
    dir: PathBuf,
    depth: usize,
    inherited: Option<Arc<IgnoreSet>>,
}

impl WalkTask {
    fn run(self) {
        let stats = Arc::clone(&self.shared.stats);
        self.process();
        stats.task_done();
    }

    fn process(self) {
        let cfg = &*self.shared.config;
        if let Some(max) = cfg.max_depth {
            if self.depth > max {
                return;
            }
        }
        self.shared.stats.dir_scanned();

        let iter = match fs::read_dir(&self.dir) {
            Ok(it) => it,
            Err(err) => {
                warn!("cannot open {}: {}", self.dir.display(), err);
                return;
            }
        };
        let local = if cfg.read_ignores {
            IgnoreSet::load(&self.dir)
        } else {
            None
        };

        for dent in iter {
            let dent = match dent {
                Ok(d) => d,
                Err(_) => continue,
            };
            let name = dent.file_name();
            let path = self.dir.join(&name);
            // lstat, never stat: symlinks must be seen as links.
            let meta = match fs::symlink_metadata(&path) {
                Ok(m) => m,
                Err(_) => continue,
            };

            if cfg.skip_hidden && name.as_bytes().first() == Some(&b'.') {
                continue;
            }
            if cfg.exclude_dirs.iter().any(|d| *d == name) {
                continue;
            }
            if cfg.read_ignores {
                let ignored = local.as_ref().map_or(false, |s| s.matches(&name))
                    || self.inherited.as_ref().map_or(false, |s| s.matches(&name));
                if ignored {
                    continue;
                }
            }

            let kind = match FileKind::of(&meta) {
                Some(k) => k,
                None => continue,
            };
            let entry = Entry {
                path,
                name,
                meta,
                kind,
                depth: self.depth,
            };

            match filter::evaluate(cfg, &self.shared.sink, &entry) {
                Verdict::Skip => {}
                Verdict::Match => {
                    self.shared.stats.match_found(kind == FileKind::File);
                    self.shared.handler.on_match(&entry);
                }
                Verdict::Emitted => {
                    self.shared.stats.match_found(kind == FileKind::File);
                }
            }

            if kind == FileKind::Dir {
                let descend = cfg.max_depth.map_or(true, |max| self.depth + 1 < max);
                if descend {
                    // Prefer the local set; children never see both.
                    let next = local.as_ref().or_else(|| self.inherited.as_ref());
                    let child = WalkTask {
                        shared: Arc::clone(&self.shared),
                        dir: entry.path,
                        depth: self.depth + 1,
                        inherited: next.map(Arc::clone),
                    };
                    self.shared.stats.task_created();
                    if let Err(err) = self.shared.spawner.submit(Box::new(move || child.run())) {
                        // The dropped task gives back its ignore-set
                        // reference; only the counter needs undoing.
                        self.shared.stats.task_done();
                        warn!("cannot queue directory task: {}", err);
                    }
                }
            }
        }
    }
}

/// Runs a complete walk: seeds the root task, blocks until the task tree
/// has drained, shuts the pool down and brackets the output.
pub fn run(
    config: Arc<SearchConfig>,
    sink: Arc<Sink>,
    handler: Arc<dyn MatchHandler>,
) -> Result<Arc<WalkStats>, FfErr> {
    let stats = Arc::new(WalkStats::new());
    let mut pool = TaskPool::new(config.threads, config.queue_cap)?;
    let shared = Arc::new(Shared {
        config: Arc::clone(&config),
        sink: Arc::clone(&sink),
        handler,
        stats: Arc::clone(&stats),
        spawner: pool.spawner(),
    });

    sink.begin();
    let seed = WalkTask {
        shared,
        dir: config.root.clone(),
        depth: 0,
        inherited: None,
    };
    stats.task_created();
    if let Err(err) = pool.submit(Box::new(move || seed.run())) {
        stats.task_done();
        return Err(FfErr::Seed(err));
    }
    stats.wait_idle();
    pool.shutdown();
    sink.finish();
    Ok(stats)
}
