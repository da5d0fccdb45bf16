//! Harvest progress reporting.
//!
//! Each reference's outcome is reported with the file or identifier it
//! concerns. Progress goes to **stderr** so stdout stays parseable (the final
//! summary is printed there, optionally as JSON).

use std::io::Write;

use clap::ValueEnum;

/// A single progress event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HarvestEvent {
    /// Starting subject `n` of `total`.
    Subject { n: u64, total: u64, name: String },
    /// References found on a page.
    Discovered { page: String, count: u64 },
    /// A download is about to start.
    Downloading {
        n: u64,
        total: u64,
        filename: String,
    },
    Downloaded { filename: String, bytes: u64 },
    /// The target file already exists; no network retrieval was made.
    AlreadyPresent { filename: String },
    /// The name the server declared already exists; the body was not stored.
    VerifiedPresent { filename: String },
    Renamed { from: String, to: String },
    HyperlinksStripped { filename: String, count: u64 },
    /// A page or reference could not be processed; the run continues.
    Failed { target: String, reason: String },
}

/// Reports harvest progress. Implementations write to stderr (human or JSON).
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: HarvestEvent);
}

/// Human-friendly progress on stderr.
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: HarvestEvent) {
        let line = match &event {
            HarvestEvent::Subject { n, total, name } => {
                format!("subject {}/{}  {}\n", n, total, name)
            }
            HarvestEvent::Discovered { page, count } => {
                format!("  found {} document link(s) on {}\n", count, page)
            }
            HarvestEvent::Downloading { n, total, filename } => {
                format!("  downloading [{}/{}]  {}\n", n, total, filename)
            }
            HarvestEvent::Downloaded { filename, bytes } => {
                format!("  saved  {} ({} bytes)\n", filename, format_number(*bytes))
            }
            HarvestEvent::AlreadyPresent { filename } => {
                format!("  skip   {} (already exists)\n", filename)
            }
            HarvestEvent::VerifiedPresent { filename } => {
                format!("  skip   {} (exists under the server's name)\n", filename)
            }
            HarvestEvent::Renamed { from, to } => format!("  rename {} -> {}\n", from, to),
            HarvestEvent::HyperlinksStripped { filename, count } => {
                format!("  unlink {} ({} link(s) removed)\n", filename, count)
            }
            HarvestEvent::Failed { target, reason } => {
                format!("  failed {}: {}\n", target, reason)
            }
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: HarvestEvent) {
        let obj = match &event {
            HarvestEvent::Subject { n, total, name } => serde_json::json!({
                "event": "subject", "n": n, "total": total, "name": name
            }),
            HarvestEvent::Discovered { page, count } => serde_json::json!({
                "event": "discovered", "page": page, "count": count
            }),
            HarvestEvent::Downloading { n, total, filename } => serde_json::json!({
                "event": "downloading", "n": n, "total": total, "filename": filename
            }),
            HarvestEvent::Downloaded { filename, bytes } => serde_json::json!({
                "event": "downloaded", "filename": filename, "bytes": bytes
            }),
            HarvestEvent::AlreadyPresent { filename } => serde_json::json!({
                "event": "already_present", "filename": filename
            }),
            HarvestEvent::VerifiedPresent { filename } => serde_json::json!({
                "event": "verified_present", "filename": filename
            }),
            HarvestEvent::Renamed { from, to } => serde_json::json!({
                "event": "renamed", "from": from, "to": to
            }),
            HarvestEvent::HyperlinksStripped { filename, count } => serde_json::json!({
                "event": "hyperlinks_stripped", "filename": filename, "count": count
            }),
            HarvestEvent::Failed { target, reason } => serde_json::json!({
                "event": "failed", "target": target, "reason": reason
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: HarvestEvent) {}
}

pub(crate) fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_number_comma() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }
}
