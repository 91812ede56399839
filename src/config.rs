use crate::errors::FfErr;
use crate::filter::FileKind;
use regex::bytes::{Regex, RegexBuilder};
use std::ffi::OsString;
use std::path::PathBuf;
use std::str::FromStr;

/// Queue slots in the task pool.
pub const DEFAULT_QUEUE_CAP: usize = 4096;

pub const DAY_SECS: u64 = 24 * 60 * 60;

/// Entry types a search reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeMask {
    pub file: bool,
    pub dir: bool,
    pub symlink: bool,
}

impl TypeMask {
    pub fn all() -> Self {
        TypeMask {
            file: true,
            dir: true,
            symlink: true,
        }
    }

    pub fn accepts(&self, kind: FileKind) -> bool {
        match kind {
            FileKind::File => self.file,
            FileKind::Dir => self.dir,
            FileKind::Symlink => self.symlink,
        }
    }
}

impl Default for TypeMask {
    fn default() -> Self {
        TypeMask::all()
    }
}

impl FromStr for TypeMask {
    type Err = FfErr;

    /// Any combination of `f`, `d`, `l`. An empty mask means everything.
    fn from_str(s: &str) -> Result<Self, FfErr> {
        let mut mask = TypeMask {
            file: false,
            dir: false,
            symlink: false,
        };
        for c in s.chars() {
            match c {
                'f' => mask.file = true,
                'd' => mask.dir = true,
                'l' => mask.symlink = true,
                _ => return Err(FfErr::BadType(s.to_owned())),
            }
        }
        if mask == (TypeMask {
            file: false,
            dir: false,
            symlink: false,
        }) {
            mask = TypeMask::all();
        }
        Ok(mask)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cmp {
    Less,
    Equal,
    Greater,
}

/// `--size` filter: threshold in bytes plus comparator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeFilter {
    pub cmp: Cmp,
    pub bytes: u64,
}

impl SizeFilter {
    pub fn matches(&self, size: u64) -> bool {
        match self.cmp {
            Cmp::Less => size < self.bytes,
            Cmp::Equal => size == self.bytes,
            Cmp::Greater => size > self.bytes,
        }
    }
}

impl FromStr for SizeFilter {
    type Err = FfErr;

    /// `[+|-]N[K|M|G]`, suffix case-insensitive. `+` means bigger than,
    /// `-` smaller than, no prefix an exact byte count.
    fn from_str(s: &str) -> Result<Self, FfErr> {
        let err = || FfErr::BadSize(s.to_owned());
        let (cmp, rest) = match s.as_bytes().first() {
            Some(b'+') => (Cmp::Greater, &s[1..]),
            Some(b'-') => (Cmp::Less, &s[1..]),
            _ => (Cmp::Equal, s),
        };
        let split = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or_else(|| rest.len());
        let (digits, suffix) = rest.split_at(split);
        if digits.is_empty() {
            return Err(err());
        }
        let n: u64 = digits.parse().map_err(|_| err())?;
        let mult: u64 = match suffix.to_ascii_uppercase().as_str() {
            "" => 1,
            "K" => 1 << 10,
            "M" => 1 << 20,
            "G" => 1 << 30,
            _ => return Err(err()),
        };
        Ok(SizeFilter {
            cmp,
            bytes: n * mult,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgeCmp {
    /// `+Nd`: modified at least N days ago.
    Older,
    /// `-Nd`: modified at most N days ago.
    Newer,
    /// `Nd`: age falls within the day starting at N days.
    Within,
}

/// `--mtime` filter: age threshold in seconds plus comparator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MtimeFilter {
    pub cmp: AgeCmp,
    pub secs: u64,
}

impl MtimeFilter {
    pub fn matches(&self, age_secs: i64) -> bool {
        let t = self.secs as i64;
        match self.cmp {
            AgeCmp::Older => age_secs >= t,
            AgeCmp::Newer => age_secs <= t,
            AgeCmp::Within => age_secs >= t && age_secs < t + DAY_SECS as i64,
        }
    }
}

impl FromStr for MtimeFilter {
    type Err = FfErr;

    /// `[+|-]N[d]`, threshold in days.
    fn from_str(s: &str) -> Result<Self, FfErr> {
        let err = || FfErr::BadMtime(s.to_owned());
        let (cmp, rest) = match s.as_bytes().first() {
            Some(b'+') => (AgeCmp::Older, &s[1..]),
            Some(b'-') => (AgeCmp::Newer, &s[1..]),
            _ => (AgeCmp::Within, s),
        };
        let digits = rest.trim_end_matches(|c| c == 'd' || c == 'D');
        if digits.is_empty() || digits.len() < rest.len().saturating_sub(1) {
            return Err(err());
        }
        let days: u64 = digits.parse().map_err(|_| err())?;
        Ok(MtimeFilter {
            cmp,
            secs: days * DAY_SECS,
        })
    }
}

/// `--perms` filter: exactly 9 low mode bits, given in octal.
pub fn parse_perms(s: &str) -> Result<u32, FfErr> {
    let err = || FfErr::BadPerms(s.to_owned());
    if s.is_empty() {
        return Err(err());
    }
    let val = u32::from_str_radix(s, 8).map_err(|_| err())?;
    if val > 0o777 {
        return Err(err());
    }
    Ok(val)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
    Csv,
    Long,
}

impl FromStr for OutputFormat {
    type Err = FfErr;

    fn from_str(s: &str) -> Result<Self, FfErr> {
        match s {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "csv" => Ok(OutputFormat::Csv),
            _ => Err(FfErr::BadFormat(s.to_owned())),
        }
    }
}

/// Ensures the suffix filter carries its dot.
pub fn normalize_ext(ext: &str) -> String {
    if ext.starts_with('.') {
        ext.to_owned()
    } else {
        format!(".{}", ext)
    }
}

/// Everything a walk needs to know. Immutable once built; tasks share it
/// behind an `Arc`.
#[derive(Debug)]
pub struct SearchConfig {
    pub root: PathBuf,
    pub name_re: Regex,
    pub content_re: Option<Regex>,
    pub extension: Option<String>,
    pub ignore_case: bool,
    pub max_depth: Option<usize>,
    pub types: TypeMask,
    pub size: Option<SizeFilter>,
    pub mtime: Option<MtimeFilter>,
    pub owner: Option<u32>,
    pub perms: Option<u32>,
    pub exclude_dirs: Vec<OsString>,
    pub read_ignores: bool,
    pub skip_hidden: bool,
    pub format: OutputFormat,
    pub color: bool,
    pub line_numbers: bool,
    pub threads: usize,
    pub queue_cap: usize,
}

impl SearchConfig {
    /// Baseline config: names matching `pattern` under `root`, all entry
    /// types, ignore files honored, dotfiles skipped.
    pub fn new(
        root: impl Into<PathBuf>,
        pattern: &str,
        ignore_case: bool,
    ) -> Result<SearchConfig, FfErr> {
        Ok(SearchConfig {
            root: root.into(),
            name_re: SearchConfig::compile_pattern(pattern, ignore_case)?,
            content_re: None,
            extension: None,
            ignore_case,
            max_depth: None,
            types: TypeMask::all(),
            size: None,
            mtime: None,
            owner: None,
            perms: None,
            exclude_dirs: Vec::new(),
            read_ignores: true,
            skip_hidden: true,
            format: OutputFormat::Text,
            color: false,
            line_numbers: false,
            threads: num_cpus::get(),
            queue_cap: DEFAULT_QUEUE_CAP,
        })
    }

    /// Compiles once, at setup time. Byte regexes keep non-UTF-8 names and
    /// file contents matchable.
    pub fn compile_pattern(pattern: &str, ignore_case: bool) -> Result<Regex, FfErr> {
        RegexBuilder::new(pattern)
            .case_insensitive(ignore_case)
            .build()
            .map_err(|e| FfErr::BadRegex(pattern.to_owned(), e))
    }
}
