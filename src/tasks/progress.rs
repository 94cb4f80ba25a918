// ABOUTME: Parsing of git --progress output and throttled transfer-rate sampling

use lazy_static::lazy_static;
use regex::Regex;
use std::time::{Duration, Instant};

lazy_static! {
    // "Receiving objects:  45% (450/1000), 1.20 MiB | 2.00 MiB/s"
    // "remote: Counting objects: 100% (10/10), done."
    static ref PROGRESS_LINE: Regex = Regex::new(
        r"^(?P<remote>remote:\s*)?(?P<phase>[A-Za-z][A-Za-z ]*?):\s+(?P<percent>\d{1,3})%\s+\((?P<current>\d+)/(?P<total>\d+)\)"
    )
    .expect("progress regex is valid");
}

/// One structured progress line reported by git
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressLine {
    pub phase: String,
    pub percent: u8,
    pub current: u64,
    pub total: u64,
    /// Reported by the remote side (`remote:` prefix)
    pub remote: bool,
}

impl ProgressLine {
    pub fn is_complete(&self) -> bool {
        self.percent >= 100
    }
}

/// Parse a single line; `None` for lines without a known progress structure
pub fn parse_progress_line(line: &str) -> Option<ProgressLine> {
    let caps = PROGRESS_LINE.captures(line.trim())?;

    let percent: u16 = caps.name("percent")?.as_str().parse().ok()?;
    let current = caps.name("current")?.as_str().parse().ok()?;
    let total = caps.name("total")?.as_str().parse().ok()?;

    Some(ProgressLine {
        phase: caps.name("phase")?.as_str().trim().to_string(),
        percent: u8::try_from(percent.min(100)).ok()?,
        current,
        total,
        remote: caps.name("remote").is_some(),
    })
}

/// Byte-rate sampler that only yields a new rate once per interval,
/// independent of how much output the child produces.
#[derive(Debug, Clone)]
pub struct SpeedSampler {
    interval: Duration,
    last_instant: Instant,
    last_bytes: u64,
    rate: Option<f64>,
}

impl SpeedSampler {
    pub fn new(interval: Duration, started: Instant) -> Self {
        Self {
            interval,
            last_instant: started,
            last_bytes: 0,
            rate: None,
        }
    }

    /// Feed the running byte total; returns a fresh rate (bytes/sec) when
    /// at least `interval` has passed since the previous sample.
    pub fn sample(&mut self, now: Instant, total_bytes: u64) -> Option<f64> {
        let elapsed = now.saturating_duration_since(self.last_instant);
        if elapsed < self.interval || elapsed.is_zero() {
            return None;
        }

        let delta = total_bytes.saturating_sub(self.last_bytes);
        #[allow(clippy::cast_precision_loss)]
        let rate = delta as f64 / elapsed.as_secs_f64();

        self.last_instant = now;
        self.last_bytes = total_bytes;
        self.rate = Some(rate);
        Some(rate)
    }

    /// Most recent rate, if any sample has been taken
    pub fn current_rate(&self) -> Option<f64> {
        self.rate
    }
}

/// Human-readable transfer rate: `B/s`, `KB/s` or `MB/s`
pub fn format_rate(bytes_per_sec: f64) -> String {
    const KIB: f64 = 1024.0;
    const MIB: f64 = 1024.0 * 1024.0;

    if bytes_per_sec < KIB {
        format!("{bytes_per_sec:.0} B/s")
    } else if bytes_per_sec < MIB {
        format!("{:.1} KB/s", bytes_per_sec / KIB)
    } else {
        format!("{:.1} MB/s", bytes_per_sec / MIB)
    }
}
