//! Process discovery from the /proc filesystem.
//!
//! Walks `/proc/<pid>` entries, matches them against the configured role
//! rules and turns each match into a `ProcessObservation`. When several
//! processes match one role, the oldest one (earliest start time, then lowest
//! PID) is reported.

use ahash::AHashMap as HashMap;
use chrono::Utc;
use once_cell::sync::Lazy;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::report::ProcessObservation;

/// Kernel clock ticks per second, used to convert utime/stime.
pub static CLOCK_TICKS: Lazy<f64> = Lazy::new(|| {
    let ticks = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
    if ticks > 0 {
        ticks as f64
    } else {
        100.0
    }
});

/// Memory page size in bytes, used to convert the RSS page count.
pub static PAGE_SIZE: Lazy<u64> = Lazy::new(|| {
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 {
        size as u64
    } else {
        4096
    }
});

/// Produces the observations for one sampling tick.
pub trait ProcessSource: Send + Sync {
    fn sample(&self) -> Vec<ProcessObservation>;
}

/// Rule mapping processes onto a logical role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleRule {
    pub role: String,
    /// Exact process names (`comm` or executable basename).
    #[serde(default)]
    pub matches: Vec<String>,
    /// Substrings of the full command line.
    #[serde(default, alias = "cmdline-matches")]
    pub cmdline_matches: Vec<String>,
}

impl RoleRule {
    /// True when the process name or command line satisfies this rule.
    pub fn matches(&self, comm: &str, cmdline: &[String]) -> bool {
        let exe = cmdline
            .first()
            .and_then(|arg0| Path::new(arg0).file_name())
            .and_then(|n| n.to_str());

        if self
            .matches
            .iter()
            .any(|m| m == comm || exe.map_or(false, |e| e == m))
        {
            return true;
        }

        if self.cmdline_matches.is_empty() || cmdline.is_empty() {
            return false;
        }
        let joined = cmdline.join(" ");
        self.cmdline_matches.iter().any(|m| joined.contains(m.as_str()))
    }
}

/// Selected fields of /proc/<pid>/stat.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProcStat {
    pub utime_ticks: u64,
    pub stime_ticks: u64,
    pub start_time_ticks: u64,
    pub vsize_bytes: u64,
    pub rss_pages: u64,
}

impl ProcStat {
    /// Total CPU time (user + system) in seconds.
    pub fn cpu_time_seconds(&self) -> f64 {
        (self.utime_ticks + self.stime_ticks) as f64 / *CLOCK_TICKS
    }
}

/// Parses the contents of /proc/<pid>/stat.
///
/// The process name may contain spaces and parentheses, so fields are
/// counted from the last closing parenthesis.
pub fn parse_stat(content: &str) -> Result<ProcStat, std::io::Error> {
    let rest = content
        .rfind(')')
        .map(|i| &content[i + 1..])
        .ok_or_else(|| std::io::Error::other("Invalid stat format: missing ')'"))?;

    // rest[0] is field 3 (state)
    let parts: Vec<&str> = rest.split_whitespace().collect();
    if parts.len() < 22 {
        return Err(std::io::Error::other(format!(
            "Invalid stat format: expected at least 22 fields after name, got {}",
            parts.len()
        )));
    }

    let field = |idx: usize, name: &str| -> Result<u64, std::io::Error> {
        parts[idx]
            .parse::<u64>()
            .map_err(|e| std::io::Error::other(format!("Failed to parse {}: {}", name, e)))
    };

    Ok(ProcStat {
        utime_ticks: field(11, "utime")?,
        stime_ticks: field(12, "stime")?,
        start_time_ticks: field(19, "starttime")?,
        vsize_bytes: field(20, "vsize")?,
        rss_pages: field(21, "rss")?,
    })
}

/// A matched process before per-role selection.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub start_time_ticks: u64,
    pub observation: ProcessObservation,
}

/// Keeps one candidate per role: earliest start time, then lowest PID.
pub fn select_per_role(candidates: Vec<Candidate>) -> Vec<ProcessObservation> {
    let mut best: HashMap<String, Candidate> = HashMap::new();
    for c in candidates {
        let older = match best.get(&c.observation.role) {
            Some(current) => {
                (c.start_time_ticks, c.observation.pid)
                    < (current.start_time_ticks, current.observation.pid)
            }
            None => true,
        };
        if older {
            best.insert(c.observation.role.clone(), c);
        }
    }
    let mut out: Vec<ProcessObservation> = best.into_values().map(|c| c.observation).collect();
    out.sort_by(|a, b| a.role.cmp(&b.role));
    out
}

/// /proc/<pid> directory entry.
#[derive(Debug, Clone)]
pub struct ProcEntry {
    pub pid: u32,
    pub proc_path: PathBuf,
}

/// Scans the /proc directory for numeric PID entries.
pub fn collect_proc_entries(root: &Path) -> Vec<ProcEntry> {
    let mut out = Vec::new();
    if let Ok(entries) = fs::read_dir(root) {
        for entry in entries.flatten() {
            let p = entry.path();
            let pid: u32 = match p.file_name().and_then(|s| s.to_str()).map(str::parse) {
                Some(Ok(v)) => v,
                _ => continue,
            };
            out.push(ProcEntry { pid, proc_path: p });
        }
    }
    out
}

/// Reads the process name from `comm`.
pub fn read_comm(proc_path: &Path) -> Option<String> {
    let s = fs::read_to_string(proc_path.join("comm")).ok()?;
    let t = s.trim();
    if t.is_empty() {
        None
    } else {
        Some(t.to_string())
    }
}

/// Reads the NUL-separated command line arguments.
pub fn read_cmdline(proc_path: &Path) -> Vec<String> {
    match fs::read(proc_path.join("cmdline")) {
        Ok(content) => content
            .split(|&b| b == 0u8)
            .filter(|s| !s.is_empty())
            .map(|s| String::from_utf8_lossy(s).into_owned())
            .collect(),
        Err(_) => Vec::new(),
    }
}

/// Process source backed by the /proc filesystem.
pub struct ProcScanner {
    root: PathBuf,
    rules: Vec<RoleRule>,
}

impl ProcScanner {
    pub fn new(rules: Vec<RoleRule>) -> Self {
        Self::with_root("/proc", rules)
    }

    pub fn with_root(root: impl Into<PathBuf>, rules: Vec<RoleRule>) -> Self {
        Self {
            root: root.into(),
            rules,
        }
    }

    pub fn rules(&self) -> &[RoleRule] {
        &self.rules
    }

    /// All processes matching any rule, before per-role selection.
    pub fn candidates(&self) -> Vec<Candidate> {
        let entries = collect_proc_entries(&self.root);
        debug!("Collected {} process entries from {}", entries.len(), self.root.display());

        entries
            .par_iter()
            .filter_map(|entry| self.inspect(entry))
            .collect()
    }

    fn inspect(&self, entry: &ProcEntry) -> Option<Candidate> {
        let comm = read_comm(&entry.proc_path)?;
        let cmdline = read_cmdline(&entry.proc_path);
        let rule = self.rules.iter().find(|r| r.matches(&comm, &cmdline))?;

        let content = fs::read_to_string(entry.proc_path.join("stat")).ok()?;
        let stat = match parse_stat(&content) {
            Ok(s) => s,
            Err(e) => {
                debug!("Skipping pid {} for role {}: {}", entry.pid, rule.role, e);
                return None;
            }
        };

        Some(Candidate {
            start_time_ticks: stat.start_time_ticks,
            observation: ProcessObservation {
                role: rule.role.clone(),
                pid: entry.pid,
                timestamp: Utc::now(),
                cpu_time_seconds: stat.cpu_time_seconds(),
                virtual_memory_bytes: stat.vsize_bytes,
                rss_bytes: stat.rss_pages * *PAGE_SIZE,
            },
        })
    }
}

impl ProcessSource for ProcScanner {
    fn sample(&self) -> Vec<ProcessObservation> {
        select_per_role(self.candidates())
    }
}
