use anyhow::{Context, Result};
use colored::Colorize;
use fastfind::config::{
    self, MtimeFilter, OutputFormat, SearchConfig, SizeFilter, TypeMask,
};
use fastfind::errors::FfErr;
use fastfind::filter::{Entry, FileKind};
use fastfind::ignore::IGNORE_FILE;
use fastfind::output::{Output, Sink};
use fastfind::walk::{self, MatchHandler, SinkHandler};
use lazy_static::lazy_static;
use log::warn;
use std::ffi::OsString;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::Instant;
use structopt::StructOpt;

lazy_static! {
    static ref AFTER_HELP: String = format!(
        "Ignore patterns are read from {} files in each visited directory: one \
         shell glob per line matched against basenames, with '#' comments and \
         blank lines skipped.",
        IGNORE_FILE
    );
}

#[derive(StructOpt, Debug, Clone)]
#[structopt(after_help = AFTER_HELP.as_str())]
struct Opt {
    /// Regex the basename must match
    #[structopt(short = "p", long, value_name = "REGEX")]
    pattern: String,
    /// Directory to start from
    #[structopt(value_name = "DIRECTORY", parse(from_os_str))]
    directory: Option<PathBuf>,
    /// Directory to start from (the positional DIRECTORY wins)
    #[structopt(
        short = "d",
        long = "directory",
        value_name = "DIR",
        parse(from_os_str)
    )]
    dir: Option<PathBuf>,
    /// Suffix filter for regular files, e.g. '.txt' (leading dot optional)
    #[structopt(short = "e", long = "ext", value_name = "SUFFIX")]
    extension: Option<String>,
    /// Entry types to report: any combination of f, d and l
    #[structopt(short = "t", long = "type", value_name = "MASK")]
    types: Option<TypeMask>,
    /// Case-insensitive name, content and extension matching
    #[structopt(short = "i", long)]
    ignore_case: bool,
    /// Recursion depth limit
    #[structopt(short = "m", long, value_name = "N")]
    max_depth: Option<usize>,
    /// Writes matches to FILE instead of stdout (disables color)
    #[structopt(short = "o", long, value_name = "FILE", parse(from_os_str))]
    output: Option<PathBuf>,
    /// ls -l style records
    #[structopt(short = "l", long)]
    long_listing: bool,
    /// Does not skip dotfiles
    #[structopt(short = "s", long)]
    show_hidden: bool,
    /// Skips dotfiles (the default; overrides --show-hidden)
    #[structopt(long)]
    no_hidden: bool,
    /// Regex matched against each line of regular files
    #[structopt(long, value_name = "REGEX")]
    content: Option<String>,
    /// Size filter: +N bigger, -N smaller, N exact; K/M/G suffixes
    #[structopt(long, value_name = "SIZE")]
    size: Option<SizeFilter>,
    /// Age filter in days: +N older, -N newer, N that very day
    #[structopt(long, value_name = "AGE")]
    mtime: Option<MtimeFilter>,
    /// Only entries owned by USER
    #[structopt(long, value_name = "USER")]
    owner: Option<String>,
    /// Exact permission bits, octal
    #[structopt(long, value_name = "OCTAL", parse(try_from_str = config::parse_perms))]
    perms: Option<u32>,
    /// Directory basename to skip entirely (may be given multiple times)
    #[structopt(long, value_name = "NAME", number_of_values(1))]
    exclude: Vec<String>,
    /// Honors .gitignore files (the default)
    #[structopt(long)]
    ignore_vcs: bool,
    /// Does not load .gitignore files
    #[structopt(long, conflicts_with = "ignore-vcs")]
    no_ignore: bool,
    /// Runs CMD for each match; {} is replaced with the quoted path
    #[structopt(long, value_name = "CMD")]
    exec: Option<String>,
    /// Deletes matches instead of printing them
    #[structopt(long)]
    delete: bool,
    /// Asks before each delete
    #[structopt(long)]
    interactive: bool,
    /// With --content, prints every matching line as path:NN:line
    #[structopt(long = "with-line-number")]
    with_line_number: bool,
    /// Record format
    #[structopt(long, value_name = "FORMAT", default_value = "text")]
    format: OutputFormat,
    /// Worker threads (0 or absent: one per CPU)
    #[structopt(long, value_name = "N")]
    threads: Option<usize>,
    /// Colorizes matches. If set to "auto", color is on if run in a terminal.
    #[structopt(short = "C", long, value_name = "WHEN", default_value = "auto",
                possible_values(&["always", "never", "auto"]))]
    color: String,
    /// Displays additional output like per-file scan progress
    #[structopt(short = "v", long)]
    verbose: bool,
    /// Shows every scanned file and lots of other stuff (implies --verbose)
    #[structopt(long)]
    debug: bool,
}

#[derive(Debug, Clone)]
pub struct App {
    opt: Opt,
    output: Output,
}

impl App {
    fn startdir(&self) -> PathBuf {
        self.opt
            .directory
            .clone()
            .or_else(|| self.opt.dir.clone())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    fn colorize(&self) -> bool {
        if self.opt.output.is_some() {
            return false;
        }
        match self.opt.color.as_str() {
            "always" => true,
            "never" => false,
            _ => atty::is(atty::Stream::Stdout),
        }
    }

    fn config(&self) -> Result<SearchConfig, FfErr> {
        let opt = &self.opt;
        let mut cfg = SearchConfig::new(self.startdir(), &opt.pattern, opt.ignore_case)?;
        cfg.content_re = opt
            .content
            .as_ref()
            .map(|p| SearchConfig::compile_pattern(p, opt.ignore_case))
            .transpose()?;
        cfg.extension = opt.extension.as_ref().map(|e| config::normalize_ext(e));
        cfg.max_depth = opt.max_depth;
        if let Some(types) = opt.types {
            cfg.types = types;
        }
        cfg.size = opt.size;
        cfg.mtime = opt.mtime;
        cfg.owner = opt
            .owner
            .as_ref()
            .map(|name| {
                users::get_user_by_name(name)
                    .map(|u| u.uid())
                    .ok_or_else(|| FfErr::UnknownUser(name.clone()))
            })
            .transpose()?;
        cfg.perms = opt.perms;
        cfg.exclude_dirs = opt.exclude.iter().map(OsString::from).collect();
        cfg.read_ignores = opt.ignore_vcs || !opt.no_ignore;
        cfg.skip_hidden = !opt.show_hidden || opt.no_hidden;
        cfg.format = if opt.long_listing {
            OutputFormat::Long
        } else {
            opt.format
        };
        cfg.color = cfg.format == OutputFormat::Text && self.colorize();
        cfg.line_numbers = opt.with_line_number;
        cfg.threads = opt.threads.filter(|n| *n > 0).unwrap_or_else(num_cpus::get);
        Ok(cfg)
    }

    fn sink(&self, cfg: &SearchConfig) -> Result<Arc<Sink>, FfErr> {
        let out: Box<dyn Write + Send> = match &self.opt.output {
            Some(path) => Box::new(
                fs::File::create(path).map_err(|e| FfErr::OutputFile(path.clone(), e))?,
            ),
            None => Box::new(io::stdout()),
        };
        Ok(Arc::new(Sink::new(out, cfg.format, cfg.color)))
    }

    fn handler(&self, sink: &Arc<Sink>) -> Arc<dyn MatchHandler> {
        if let Some(template) = &self.opt.exec {
            Arc::new(ExecHandler {
                sink: Arc::clone(sink),
                template: template.clone(),
            })
        } else if self.opt.delete {
            Arc::new(DeleteHandler {
                sink: Arc::clone(sink),
                interactive: self.opt.interactive,
            })
        } else {
            Arc::new(SinkHandler {
                sink: Arc::clone(sink),
            })
        }
    }

    /// Main entry point.
    pub fn run(&self) -> Result<i32> {
        self.output.log_init();
        let cfg = Arc::new(self.config()?);
        let sink = self.sink(&cfg)?;
        let handler = self.handler(&sink);
        let started = Instant::now();
        let stats = walk::run(Arc::clone(&cfg), sink, handler).context("cannot start walk")?;
        stats.print_summary(started.elapsed());
        Ok(0)
    }
}

impl From<Opt> for App {
    fn from(opt: Opt) -> Self {
        let color = match opt.color.as_str() {
            "always" => Some(true),
            "never" => Some(false),
            _ => None,
        };
        let output = Output::new(opt.verbose, opt.debug, color);
        App { opt, output }
    }
}

/// Runs a shell template for each match, serialized through the sink lock
/// so command output does not shear through records.
struct ExecHandler {
    sink: Arc<Sink>,
    template: String,
}

impl MatchHandler for ExecHandler {
    fn on_match(&self, entry: &Entry) {
        let quoted = shell_quote(&entry.path);
        let cmd = if self.template.contains("{}") {
            self.template.replace("{}", &quoted)
        } else {
            format!("{} {}", self.template, quoted)
        };
        self.sink.exclusive(|_out| {
            if let Err(err) = Command::new("/bin/sh").arg("-c").arg(&cmd).status() {
                warn!("exec failed for {}: {}", entry.path.display(), err);
            }
        });
    }
}

fn shell_quote(path: &Path) -> String {
    format!("'{}'", path.display().to_string().replace('\'', r"'\''"))
}

/// Deletes each match, optionally after a [y/N] prompt on the sink.
struct DeleteHandler {
    sink: Arc<Sink>,
    interactive: bool,
}

impl MatchHandler for DeleteHandler {
    fn on_match(&self, entry: &Entry) {
        let interactive = self.interactive;
        self.sink.exclusive(|out| {
            if interactive {
                let _ = write!(out, "delete {}? [y/N] ", entry.path.display());
                let _ = out.flush();
                let mut answer = String::new();
                if io::stdin().read_line(&mut answer).is_err() {
                    return;
                }
                if !matches!(answer.trim(), "y" | "Y") {
                    return;
                }
            }
            let res = match entry.kind {
                FileKind::Dir => fs::remove_dir(&entry.path),
                _ => fs::remove_file(&entry.path),
            };
            if let Err(err) = res {
                warn!("cannot delete {}: {}", entry.path.display(), err);
            }
        });
    }
}

fn report_error(err: &anyhow::Error) {
    eprintln!("{} {:#}", "fastfind error:".red().bold(), err);
    if let Some(ff) = err.downcast_ref::<FfErr>() {
        if let Some(hint) = ff.hint() {
            eprintln!("{}", format!("-> HINT: {}", hint).dimmed());
        }
    }
}

fn main() {
    let app = App::from(Opt::from_args());
    match app.run() {
        Err(ref err) => {
            report_error(err);
            std::process::exit(1)
        }
        Ok(exitcode) => std::process::exit(exitcode),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app(opts: &[&str]) -> App {
        let mut argv = vec!["fastfind", "-p", ".*"];
        argv.extend_from_slice(opts);
        App::from(Opt::from_iter(&argv))
    }

    #[test]
    fn positional_directory_wins() {
        let a = app(&["-d", "/tmp", "somewhere"]);
        assert_eq!(a.startdir(), PathBuf::from("somewhere"));
        let a = app(&["-d", "/tmp"]);
        assert_eq!(a.startdir(), PathBuf::from("/tmp"));
        let a = app(&[]);
        assert_eq!(a.startdir(), PathBuf::from("."));
    }

    #[test]
    fn long_listing_overrides_format() {
        let cfg = app(&["-l", "--format", "json"]).config().unwrap();
        assert_eq!(cfg.format, OutputFormat::Long);
    }

    #[test]
    fn hidden_flag_combinations() {
        assert!(app(&[]).config().unwrap().skip_hidden);
        assert!(!app(&["-s"]).config().unwrap().skip_hidden);
        assert!(app(&["-s", "--no-hidden"]).config().unwrap().skip_hidden);
    }

    #[test]
    fn extension_is_normalized() {
        let cfg = app(&["-e", "txt"]).config().unwrap();
        assert_eq!(cfg.extension.as_deref(), Some(".txt"));
    }

    #[test]
    fn unknown_user_is_a_setup_error() {
        let err = app(&["--owner", "no-such-user-here"]).config().unwrap_err();
        assert!(matches!(err, FfErr::UnknownUser(_)));
        assert!(err.hint().is_some());
    }

    #[test]
    fn zero_threads_falls_back_to_cpu_count() {
        let cfg = app(&["--threads", "0"]).config().unwrap();
        assert!(cfg.threads > 0);
    }

    #[test]
    fn shell_quoting_survives_quotes() {
        assert_eq!(shell_quote(Path::new("/a b")), "'/a b'");
        assert_eq!(shell_quote(Path::new("a'b")), r"'a'\''b'");
    }
}
