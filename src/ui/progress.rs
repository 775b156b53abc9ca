use crate::protocol::ProgressEvent;
use crate::settings::ProgressSettings;
use colored::Colorize;
use lazy_static::lazy_static;
use rand::Rng;
use regex::Regex;
use std::io::{self, Write};
use std::time::{Duration, Instant};

pub(crate) const SPINNER_FRAMES: [&str; 4] = ["·", "˚", "•", "˚"];

lazy_static! {
    static ref WRITE_STATS: Regex =
        Regex::new(r"Wrote\s+(\d+)\s+bytes\s*\((\d+)\s+files?\)").expect("write stats pattern is valid");
}

/// Bytes and files reported by a wipe's progress messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteStats {
    pub bytes: u64,
    pub files: u64,
}

impl WriteStats {
    /// Parse "Wrote N bytes (M files)" anywhere in a progress message.
    pub fn parse(message: &str) -> Option<Self> {
        let caps = WRITE_STATS.captures(message)?;
        Some(Self {
            bytes: caps[1].parse().ok()?,
            files: caps[2].parse().ok()?,
        })
    }
}

/// Authoritative progress: the highest percent seen so far.
///
/// The Engine's stream is not guaranteed to be monotonic; the display is.
#[derive(Debug, Default, Clone)]
pub struct ProgressTracker {
    percent: u8,
    message: String,
    stats: Option<WriteStats>,
    events: u64,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when the target moved forward.
    pub fn observe(&mut self, event: &ProgressEvent) -> bool {
        self.events += 1;
        if !event.message.is_empty() {
            self.message = event.message.clone();
            if let Some(stats) = WriteStats::parse(&event.message) {
                self.stats = Some(stats);
            }
        }
        if event.percent > self.percent {
            self.percent = event.percent;
            true
        } else {
            false
        }
    }

    pub fn percent(&self) -> u8 {
        self.percent
    }

    /// Target as a fraction in 0.0..=1.0
    pub fn target(&self) -> f64 {
        f64::from(self.percent) / 100.0
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn stats(&self) -> Option<WriteStats> {
        self.stats
    }

    pub fn events(&self) -> u64 {
        self.events
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Stall {
    at: f64,
    duration: Duration,
    used: bool,
}

/// Cosmetic smoothing of the displayed value towards the tracker's target.
///
/// Never moves past the target and never feeds back into it. Stall points are
/// drawn once per operation from the configured ranges.
#[derive(Debug, Clone)]
pub struct ProgressEaser {
    displayed: f64,
    min_step: f64,
    factor: f64,
    stalls: Vec<Stall>,
    stalled_until: Option<Instant>,
}

impl ProgressEaser {
    pub fn new<R: Rng + ?Sized>(settings: &ProgressSettings, rng: &mut R) -> Self {
        let count = if settings.stall_count_max > settings.stall_count_min {
            rng.gen_range(settings.stall_count_min..=settings.stall_count_max)
        } else {
            settings.stall_count_min
        };

        let mut stalls: Vec<Stall> = (0..count)
            .map(|_| {
                let at = if settings.stall_window_end > settings.stall_window_start {
                    rng.gen_range(settings.stall_window_start..settings.stall_window_end)
                } else {
                    settings.stall_window_start
                };
                let ms = if settings.stall_ms_max > settings.stall_ms_min {
                    rng.gen_range(settings.stall_ms_min..=settings.stall_ms_max)
                } else {
                    settings.stall_ms_min
                };
                Stall {
                    at,
                    duration: Duration::from_millis(ms),
                    used: false,
                }
            })
            .collect();
        stalls.sort_by(|a, b| a.at.total_cmp(&b.at));

        Self {
            displayed: 0.0,
            min_step: settings.ease_min_step,
            factor: settings.ease_factor,
            stalls,
            stalled_until: None,
        }
    }

    /// Easer without stalls
    pub fn smooth(settings: &ProgressSettings) -> Self {
        Self {
            displayed: 0.0,
            min_step: settings.ease_min_step,
            factor: settings.ease_factor,
            stalls: Vec::new(),
            stalled_until: None,
        }
    }

    pub fn displayed(&self) -> f64 {
        self.displayed
    }

    pub fn stall_points(&self) -> Vec<f64> {
        self.stalls.iter().map(|s| s.at).collect()
    }

    /// Advance one frame towards `target` (0.0..=1.0).
    pub fn tick(&mut self, target: f64, now: Instant) -> f64 {
        let target = target.clamp(0.0, 1.0);

        if let Some(until) = self.stalled_until {
            if now < until && target < 1.0 {
                return self.displayed;
            }
            self.stalled_until = None;
        }

        let delta = target - self.displayed;
        if delta <= 0.0 {
            return self.displayed;
        }

        let step = delta.min(self.min_step + delta * self.factor);
        let next = self.displayed + step;

        if target < 1.0 {
            if let Some(stall) = self
                .stalls
                .iter_mut()
                .find(|s| !s.used && s.at > self.displayed && s.at <= next)
            {
                stall.used = true;
                self.displayed = stall.at;
                self.stalled_until = Some(now + stall.duration);
                return self.displayed;
            }
        }

        self.displayed = next.min(target);
        self.displayed
    }

    /// Jump straight to the end once the operation has finished.
    pub fn complete(&mut self) {
        self.displayed = 1.0;
        self.stalled_until = None;
    }
}

/// Single-line terminal progress bar.
pub struct ProgressBar {
    width: usize,
    frame: usize,
    start: Instant,
    drawn: bool,
}

impl ProgressBar {
    /// width = number of bar character slots (not including the brackets)
    pub fn new(width: usize) -> Self {
        Self {
            width,
            frame: 0,
            start: Instant::now(),
            drawn: false,
        }
    }

    pub fn filled_slots(&self, fraction: f64) -> usize {
        let fraction = if fraction.is_nan() {
            0.0
        } else {
            fraction.clamp(0.0, 1.0)
        };
        ((fraction * self.width as f64).round() as usize).min(self.width)
    }

    /// Build the bar line without printing it.
    pub fn line(&mut self, fraction: f64, message: &str, stats: Option<WriteStats>) -> String {
        let filled = self.filled_slots(fraction);
        let empty = self.width - filled;
        let pct = if fraction.is_nan() {
            0.0
        } else {
            fraction.clamp(0.0, 1.0) * 100.0
        };
        self.frame = (self.frame + 1) % SPINNER_FRAMES.len();

        let bar = format!(
            "{}{}",
            "█".repeat(filled).green().bold(),
            "░".repeat(empty).bright_black()
        );

        let info = match stats {
            Some(stats) => {
                let elapsed = self.start.elapsed().as_secs_f64().max(0.0001);
                let speed = stats.bytes as f64 / elapsed;
                let eta = estimate_eta(elapsed, pct / 100.0)
                    .map(format_clock)
                    .unwrap_or_else(|| "--:--".to_string());
                format!(
                    "{} written, {} files @ {}/s  ETA {}",
                    human_bytes(stats.bytes),
                    stats.files,
                    human_rate(speed),
                    eta
                )
            }
            None => format!("{} {}", message, SPINNER_FRAMES[self.frame]),
        };

        format!("[{}] {:>5.1}%  {}", bar, pct, info.cyan())
    }

    /// Redraw in place on stderr.
    pub fn draw(&mut self, fraction: f64, message: &str, stats: Option<WriteStats>) {
        let line = self.line(fraction, message, stats);
        let mut err = io::stderr();
        if self.drawn {
            let _ = write!(err, "\x1b[2K\r{}", line);
        } else {
            let _ = write!(err, "{}", line);
            self.drawn = true;
        }
        err.flush().ok();
    }

    pub fn finish(&mut self) {
        if self.drawn {
            eprintln!();
            self.drawn = false;
        }
    }
}

/// Seconds left given elapsed time and the completed fraction.
pub fn estimate_eta(elapsed_secs: f64, fraction: f64) -> Option<u64> {
    if fraction <= 0.0 || fraction.is_nan() || elapsed_secs <= 0.0 {
        return None;
    }
    if fraction >= 1.0 {
        return Some(0);
    }
    Some((elapsed_secs * (1.0 - fraction) / fraction).round() as u64)
}

/// Byte count as a short readable string: "512 B", "1.50 KB".
pub fn human_bytes(bytes: u64) -> String {
    let units = ["B", "KB", "MB", "GB", "TB", "PB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut val = bytes as f64;
    let mut i = 0usize;
    while val >= 1024.0 && i + 1 < units.len() {
        val /= 1024.0;
        i += 1;
    }
    format!("{:.2} {}", val, units[i])
}

/// Transfer rate in bytes per second.
pub fn human_rate(bps: f64) -> String {
    if bps.is_nan() || bps <= 0.0 {
        return "0 B".to_string();
    }
    human_bytes(bps as u64)
}

/// Clock-style duration for ETAs: `M:SS`, or `H:MM:SS` past an hour
pub fn format_clock(total_secs: u64) -> String {
    let (minutes, secs) = (total_secs / 60, total_secs % 60);
    match (minutes / 60, minutes % 60) {
        (0, minutes) => format!("{}:{:02}", minutes, secs),
        (hours, minutes) => format!("{}:{:02}:{:02}", hours, minutes, secs),
    }
}
