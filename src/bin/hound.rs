use anyhow::{Context, Result};
use fastfind::config::{OutputFormat, SearchConfig, TypeMask};
use fastfind::filter::Entry;
use fastfind::output::{Output, Sink};
use fastfind::walk::{self, MatchHandler};
use log::warn;
use regex::bytes::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::sync::Arc;
use structopt::StructOpt;

/// One secret-detection rule, as it appears in the JSON rule file.
#[derive(Debug, Deserialize)]
struct RuleSpec {
    id: String,
    #[serde(default = "default_description")]
    description: String,
    regex: String,
    #[serde(default)]
    min_entropy: f64,
}

fn default_description() -> String {
    "No description provided.".to_owned()
}

struct Rule {
    id: String,
    description: String,
    regex: Regex,
    min_entropy: f64,
}

fn compile_rules(specs: Vec<RuleSpec>) -> Result<Vec<Rule>> {
    specs
        .into_iter()
        .map(|spec| {
            let regex = Regex::new(&spec.regex)
                .with_context(|| format!("rule '{}': invalid regex", spec.id))?;
            Ok(Rule {
                id: spec.id,
                description: spec.description,
                regex,
                min_entropy: spec.min_entropy,
            })
        })
        .collect()
}

/// Byte-wise Shannon entropy; random tokens score high, prose scores low.
fn shannon_entropy(data: &[u8]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let mut freq = [0usize; 256];
    for b in data {
        freq[*b as usize] += 1;
    }
    let len = data.len() as f64;
    freq.iter()
        .filter(|n| **n > 0)
        .map(|n| {
            let p = *n as f64 / len;
            -p * p.log2()
        })
        .sum()
}

#[derive(Serialize)]
struct Finding<'a> {
    file: &'a str,
    line: u64,
    rule_id: &'a str,
    description: &'a str,
    #[serde(rename = "match")]
    matched: &'a str,
    entropy: f64,
}

/// Scans every regular file the walker reports against the rule list and
/// prints one JSON object per finding, flushed per line.
struct HoundHandler {
    rules: Vec<Rule>,
    sink: Arc<Sink>,
}

impl MatchHandler for HoundHandler {
    fn on_match(&self, entry: &Entry) {
        let file = match fs::File::open(&entry.path) {
            Ok(f) => f,
            Err(err) => {
                warn!("cannot read {}: {}", entry.path.display(), err);
                return;
            }
        };
        let mut reader = BufReader::new(file);
        let mut line = Vec::new();
        let mut line_num = 0u64;
        loop {
            line.clear();
            match reader.read_until(b'\n', &mut line) {
                Ok(0) => break,
                Ok(_) => {}
                Err(err) => {
                    warn!("cannot read {}: {}", entry.path.display(), err);
                    break;
                }
            }
            line_num += 1;
            for rule in &self.rules {
                for m in rule.regex.find_iter(&line) {
                    let matched = m.as_bytes();
                    let entropy = if rule.min_entropy > 0.0 {
                        shannon_entropy(matched)
                    } else {
                        0.0
                    };
                    if rule.min_entropy > 0.0 && entropy < rule.min_entropy {
                        continue;
                    }
                    self.report(entry, line_num, rule, matched, entropy);
                }
            }
        }
    }
}

impl HoundHandler {
    fn report(&self, entry: &Entry, line: u64, rule: &Rule, matched: &[u8], entropy: f64) {
        let path = entry.path.to_string_lossy();
        let text = String::from_utf8_lossy(matched);
        let finding = Finding {
            file: &path,
            line,
            rule_id: &rule.id,
            description: &rule.description,
            matched: &text,
            entropy,
        };
        match serde_json::to_string(&finding) {
            Ok(json) => self.sink.exclusive(|out| {
                let _ = writeln!(out, "{}", json);
                let _ = out.flush();
            }),
            Err(err) => warn!("cannot encode finding: {}", err),
        }
    }
}

#[derive(StructOpt, Debug)]
#[structopt(about = "Scans a directory tree for secrets matching a JSON rule list")]
struct Opt {
    /// JSON file holding an array of detection rules
    #[structopt(value_name = "RULES", parse(from_os_str))]
    rules: PathBuf,
    /// Directory to scan
    #[structopt(value_name = "DIRECTORY", parse(from_os_str), default_value = ".")]
    directory: PathBuf,
    /// Worker threads (0 or absent: one per CPU)
    #[structopt(long, value_name = "N")]
    threads: Option<usize>,
    /// Displays additional output
    #[structopt(short = "v", long)]
    verbose: bool,
}

fn run(opt: &Opt) -> Result<()> {
    let raw = fs::read_to_string(&opt.rules)
        .with_context(|| format!("cannot read rule file {}", opt.rules.display()))?;
    let specs: Vec<RuleSpec> =
        serde_json::from_str(&raw).context("rule file must hold a JSON array of rules")?;
    let rules = compile_rules(specs)?;

    // The simple form of the engine: every regular file matches, the
    // handler does the content work.
    let mut cfg = SearchConfig::new(&opt.directory, ".*", false)?;
    cfg.types = TypeMask {
        file: true,
        dir: false,
        symlink: false,
    };
    cfg.read_ignores = false;
    if let Some(n) = opt.threads.filter(|n| *n > 0) {
        cfg.threads = n;
    }

    let sink = Arc::new(Sink::stdout(OutputFormat::Text, false));
    let handler = Arc::new(HoundHandler {
        rules,
        sink: Arc::clone(&sink),
    });
    walk::run(Arc::new(cfg), sink, handler)?;
    Ok(())
}

fn main() {
    let opt = Opt::from_args();
    Output::new(opt.verbose, false, None).log_init();
    if let Err(err) = run(&opt) {
        eprintln!("hound error: {:#}", err);
        std::process::exit(1);
    }
}
