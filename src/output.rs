use crate::config::OutputFormat;
use crate::filter::{Entry, FileKind};
use atty::Stream;
use chrono::{Local, TimeZone};
use colored::Colorize;
use log::{warn, Level, LevelFilter};
use serde::Serialize;
use std::io::{self, Write};
use std::os::unix::fs::MetadataExt;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const PROG: &str = "fastfind";

/// Logging and terminal color setup.
#[derive(Debug, Clone, PartialEq)]
pub struct Output {
    level: LevelFilter,
    color: Option<bool>,
}

impl Output {
    pub fn new(verbose: bool, debug: bool, color: Option<bool>) -> Output {
        Output {
            level: match (verbose, debug) {
                (_, true) => LevelFilter::Debug,
                (true, _) => LevelFilter::Info,
                _ => LevelFilter::Warn,
            },
            color: color.or_else(|| Some(atty::is(Stream::Stdout) && atty::is(Stream::Stderr))),
        }
    }

    pub fn log_init(&self) {
        if let Some(colorcontrol) = self.color {
            colored::control::set_override(colorcontrol);
        }
        let mut builder = env_logger::Builder::new();
        builder
            .format(|buf, r| match r.level() {
                Level::Error => writeln!(buf, "{} {}: {}", PROG, "error".red().bold(), r.args()),
                Level::Warn => writeln!(buf, "{} {}: {}", PROG, "warning".yellow(), r.args()),
                Level::Info => writeln!(buf, "{}: {}", PROG, r.args()),
                _ => writeln!(buf, "{}", r.args().to_string().blue()),
            })
            .filter(None, self.level);
        // Tests and the hound binary may initialize twice; the first one wins.
        let _ = builder.try_init();
    }
}

#[derive(Serialize)]
struct JsonRecord<'a> {
    path: &'a str,
    #[serde(rename = "type")]
    kind: char,
    size: u64,
    mtime: i64,
}

struct SinkState {
    out: Box<dyn Write + Send>,
    first_record: bool,
}

/// Match-record destination shared by every worker.
///
/// The mutex covers record assembly as well as the write, so concurrent
/// records never interleave. Each record is flushed as a whole line.
pub struct Sink {
    format: OutputFormat,
    color: bool,
    state: Mutex<SinkState>,
}

impl Sink {
    pub fn new(out: Box<dyn Write + Send>, format: OutputFormat, color: bool) -> Sink {
        Sink {
            format,
            color,
            state: Mutex::new(SinkState {
                out,
                first_record: true,
            }),
        }
    }

    pub fn stdout(format: OutputFormat, color: bool) -> Sink {
        Sink::new(Box::new(io::stdout()), format, color)
    }

    fn lock(&self) -> MutexGuard<SinkState> {
        self.state.lock().expect("BUG: sink lock poisoned")
    }

    /// Format preamble, written before the walk starts.
    pub fn begin(&self) {
        let mut st = self.lock();
        let res = match self.format {
            OutputFormat::Json => write!(st.out, "[\n"),
            OutputFormat::Csv => writeln!(st.out, "path,type,size,mtime"),
            _ => Ok(()),
        };
        if let Err(err) = res.and_then(|_| st.out.flush()) {
            warn!("write error: {}", err);
        }
    }

    /// Format epilogue, written after the last task has finished.
    pub fn finish(&self) {
        let mut st = self.lock();
        let res = match self.format {
            OutputFormat::Json => {
                if st.first_record {
                    write!(st.out, "]\n")
                } else {
                    write!(st.out, "\n]\n")
                }
            }
            _ => Ok(()),
        };
        if let Err(err) = res.and_then(|_| st.out.flush()) {
            warn!("write error: {}", err);
        }
    }

    /// One record for a matching entry.
    pub fn record(&self, entry: &Entry) {
        let mut guard = self.lock();
        let st = &mut *guard;
        let first = st.first_record;
        st.first_record = false;
        let res = match self.format {
            OutputFormat::Text => self.write_text(&mut st.out, entry),
            OutputFormat::Json => self.write_json(&mut st.out, entry, first),
            OutputFormat::Csv => self.write_csv(&mut st.out, entry),
            OutputFormat::Long => self.write_long(&mut st.out, entry),
        };
        if let Err(err) = res.and_then(|_| st.out.flush()) {
            warn!("write error: {}", err);
        }
    }

    /// One `path:NN:line` content match, independent of the record format.
    pub fn content_line(&self, path: &Path, line_num: u64, line: &[u8]) {
        let mut st = self.lock();
        let res = writeln!(
            st.out,
            "{}:{}:{}",
            path.display(),
            line_num,
            String::from_utf8_lossy(line)
        );
        if let Err(err) = res.and_then(|_| st.out.flush()) {
            warn!("write error: {}", err);
        }
    }

    /// Runs `f` while holding the sink lock. External match actions use
    /// this so prompts and command output do not interleave with records.
    pub fn exclusive<T>(&self, f: impl FnOnce(&mut dyn Write) -> T) -> T {
        let mut st = self.lock();
        f(&mut *st.out)
    }

    fn write_text(&self, out: &mut Box<dyn Write + Send>, entry: &Entry) -> io::Result<()> {
        let path = entry.path.display().to_string();
        let tag = format!("[{}]", entry.kind.tag());
        if !self.color {
            return writeln!(out, "{} {}", path, tag);
        }
        let painted = match entry.kind {
            FileKind::Dir => path.blue().bold(),
            FileKind::Symlink => path.cyan().bold(),
            FileKind::File if entry.meta.mode() & 0o100 != 0 => path.green().bold(),
            FileKind::File => path.normal(),
        };
        writeln!(out, "{} {}", painted, tag.dimmed())
    }

    fn write_json(
        &self,
        out: &mut Box<dyn Write + Send>,
        entry: &Entry,
        first: bool,
    ) -> io::Result<()> {
        let path = entry.path.to_string_lossy();
        let rec = JsonRecord {
            path: &path,
            kind: entry.kind.tag(),
            size: entry.meta.len(),
            mtime: entry.meta.mtime(),
        };
        let json = serde_json::to_string(&rec)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        if first {
            write!(out, "{}", json)
        } else {
            write!(out, ",\n{}", json)
        }
    }

    fn write_csv(&self, out: &mut Box<dyn Write + Send>, entry: &Entry) -> io::Result<()> {
        let path = entry.path.to_string_lossy().replace('"', "\"\"");
        writeln!(
            out,
            "\"{}\",{},{},{}",
            path,
            entry.kind.tag(),
            entry.meta.len(),
            entry.meta.mtime()
        )
    }

    fn write_long(&self, out: &mut Box<dyn Write + Send>, entry: &Entry) -> io::Result<()> {
        let meta = &entry.meta;
        let when = Local
            .timestamp_opt(meta.mtime(), 0)
            .single()
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "????-??-?? ??:??".to_owned());
        writeln!(
            out,
            "{} {:>4} {:<8} {:<8} {:>8} {} {}",
            mode_string(meta.mode(), entry.kind),
            meta.nlink(),
            meta.uid(),
            meta.gid(),
            meta.len(),
            when,
            entry.path.display()
        )
    }
}

/// `drwxr-xr-x` style permission column.
pub fn mode_string(mode: u32, kind: FileKind) -> String {
    const RWX: [(u32, usize, u8); 9] = [
        (0o400, 1, b'r'),
        (0o200, 2, b'w'),
        (0o100, 3, b'x'),
        (0o040, 4, b'r'),
        (0o020, 5, b'w'),
        (0o010, 6, b'x'),
        (0o004, 7, b'r'),
        (0o002, 8, b'w'),
        (0o001, 9, b'x'),
    ];
    let mut buf = *b"----------";
    buf[0] = match kind {
        FileKind::Dir => b'd',
        FileKind::Symlink => b'l',
        FileKind::File => b'-',
    };
    for &(bit, pos, ch) in &RWX {
        if mode & bit != 0 {
            buf[pos] = ch;
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{write_file, CaptureBuf};
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn entry(path: &Path) -> Entry {
        let meta = fs::symlink_metadata(path).unwrap();
        let kind = FileKind::of(&meta).unwrap();
        Entry {
            path: path.to_owned(),
            name: path.file_name().unwrap().to_owned(),
            meta,
            kind,
            depth: 1,
        }
    }

    fn sink(format: OutputFormat) -> (Sink, CaptureBuf) {
        let buf = CaptureBuf::default();
        (Sink::new(Box::new(buf.clone()), format, false), buf)
    }

    #[test]
    fn mode_strings() {
        assert_eq!(mode_string(0o755, FileKind::Dir), "drwxr-xr-x");
        assert_eq!(mode_string(0o644, FileKind::File), "-rw-r--r--");
        assert_eq!(mode_string(0o777, FileKind::Symlink), "lrwxrwxrwx");
        assert_eq!(mode_string(0o000, FileKind::File), "----------");
    }

    #[test]
    fn text_record_carries_type_tag() {
        let t = TempDir::new().unwrap();
        write_file(t.path(), "x.txt", "hi");
        let (s, buf) = sink(OutputFormat::Text);
        s.record(&entry(&t.path().join("x.txt")));
        let out = buf.contents();
        assert!(out.ends_with("x.txt [f]\n"), "got: {:?}", out);
    }

    #[test]
    fn json_output_is_a_valid_array() {
        let t = TempDir::new().unwrap();
        write_file(t.path(), "a", "x");
        write_file(t.path(), "b", "xy");
        let (s, buf) = sink(OutputFormat::Json);
        s.begin();
        s.record(&entry(&t.path().join("a")));
        s.record(&entry(&t.path().join("b")));
        s.finish();
        let parsed: serde_json::Value = serde_json::from_str(&buf.contents()).unwrap();
        let arr = parsed.as_array().unwrap();
        assert_eq!(arr.len(), 2);
        assert_eq!(arr[0]["type"], "f");
        assert_eq!(arr[1]["size"], 2);
    }

    #[test]
    fn json_empty_walk_is_an_empty_array() {
        let (s, buf) = sink(OutputFormat::Json);
        s.begin();
        s.finish();
        let parsed: serde_json::Value = serde_json::from_str(&buf.contents()).unwrap();
        assert_eq!(parsed.as_array().unwrap().len(), 0);
    }

    #[test]
    fn csv_quotes_the_path() {
        let t = TempDir::new().unwrap();
        write_file(t.path(), "x.txt", "hi");
        let (s, buf) = sink(OutputFormat::Csv);
        s.begin();
        s.record(&entry(&t.path().join("x.txt")));
        let out = buf.contents();
        let mut lines = out.lines();
        assert_eq!(lines.next().unwrap(), "path,type,size,mtime");
        let row = lines.next().unwrap();
        assert!(row.starts_with('"'));
        assert!(row.contains("x.txt\",f,2,"), "got: {:?}", row);
    }

    #[test]
    fn csv_doubles_embedded_quotes() {
        let t = TempDir::new().unwrap();
        write_file(t.path(), "a\"b.txt", "hi");
        let (s, buf) = sink(OutputFormat::Csv);
        s.record(&entry(&t.path().join("a\"b.txt")));
        assert!(buf.contents().contains("a\"\"b.txt"));
    }

    #[test]
    fn long_listing_shape() {
        let t = TempDir::new().unwrap();
        write_file(t.path(), "x", "hello");
        let path = t.path().join("x");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();
        let (s, buf) = sink(OutputFormat::Long);
        s.record(&entry(&path));
        let out = buf.contents();
        assert!(out.starts_with("-rw-r--r--"), "got: {:?}", out);
        assert!(out.trim_end().ends_with("/x"));
    }

    #[test]
    fn content_lines_bypass_the_record_format() {
        let (s, buf) = sink(OutputFormat::Json);
        s.content_line(Path::new("/tmp/f"), 7, b"TOKEN=abc");
        assert_eq!(buf.contents(), "/tmp/f:7:TOKEN=abc\n");
    }
}
