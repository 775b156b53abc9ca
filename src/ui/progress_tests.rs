// Tests for progress tracking, easing and the terminal bar
//
// Tests cover: human_bytes conversion, duration formatting, write stats parsing,
// take-max tracking, easing steps and stalls, and bar slot calculations.

use super::progress::*;
use crate::protocol::ProgressEvent;
use crate::settings::ProgressSettings;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::time::{Duration, Instant};

// ==================== HUMAN BYTES CONVERSION TESTS ====================

#[test]
fn test_human_bytes_small_values() {
    assert_eq!(human_bytes(0), "0 B");
    assert_eq!(human_bytes(10), "10 B");
    assert_eq!(human_bytes(1023), "1023 B");
}

#[test]
fn test_human_bytes_units() {
    assert_eq!(human_bytes(1024), "1.00 KB");
    assert_eq!(human_bytes(1536), "1.50 KB");
    assert_eq!(human_bytes(1024 * 1024), "1.00 MB");
    assert_eq!(human_bytes(5 * 1024 * 1024 * 1024), "5.00 GB");
    assert_eq!(human_bytes(1024u64.pow(4)), "1.00 TB");
}

#[test]
fn test_human_bytes_caps_at_largest_unit() {
    let result = human_bytes(u64::MAX);
    assert!(result.ends_with(" PB"), "got {}", result);
}

#[test]
fn test_human_rate_non_positive() {
    assert_eq!(human_rate(0.0), "0 B");
    assert_eq!(human_rate(-5.0), "0 B");
    assert_eq!(human_rate(f64::NAN), "0 B");
    assert_eq!(human_rate(2048.0), "2.00 KB");
}

// ==================== DURATION FORMATTING TESTS ====================

#[test]
fn test_format_clock_minutes() {
    assert_eq!(format_clock(0), "0:00");
    assert_eq!(format_clock(59), "0:59");
    assert_eq!(format_clock(61), "1:01");
    assert_eq!(format_clock(3599), "59:59");
}

#[test]
fn test_format_clock_hours() {
    assert_eq!(format_clock(3600), "1:00:00");
    assert_eq!(format_clock(3661), "1:01:01");
    assert_eq!(format_clock(36000 + 59), "10:00:59");
}

#[test]
fn test_estimate_eta() {
    assert_eq!(estimate_eta(10.0, 0.0), None);
    assert_eq!(estimate_eta(0.0, 0.5), None);
    assert_eq!(estimate_eta(10.0, 0.5), Some(10));
    assert_eq!(estimate_eta(30.0, 0.75), Some(10));
    assert_eq!(estimate_eta(10.0, 1.0), Some(0));
}

// ==================== WRITE STATS TESTS ====================

#[test]
fn test_write_stats_parse() {
    let stats = WriteStats::parse("Wrote 1048576 bytes (3 files)").unwrap();
    assert_eq!(stats.bytes, 1_048_576);
    assert_eq!(stats.files, 3);

    let single = WriteStats::parse("Filling free space... Wrote 512 bytes (1 file)").unwrap();
    assert_eq!(single, WriteStats { bytes: 512, files: 1 });
}

#[test]
fn test_write_stats_rejects_other_messages() {
    assert_eq!(WriteStats::parse("Scanning C:\\"), None);
    assert_eq!(WriteStats::parse("Wrote some bytes"), None);
    assert_eq!(WriteStats::parse(""), None);
}

// ==================== TRACKER TESTS ====================

#[test]
fn test_tracker_takes_max() {
    let mut tracker = ProgressTracker::new();
    assert!(tracker.observe(&ProgressEvent::new(40, "forty")));
    assert!(!tracker.observe(&ProgressEvent::new(25, "went back")));
    assert_eq!(tracker.percent(), 40);
    assert_eq!(tracker.message(), "went back");
    assert!(tracker.observe(&ProgressEvent::new(41, "")));
    assert_eq!(tracker.message(), "went back");
    assert_eq!(tracker.events(), 3);
    assert!((tracker.target() - 0.41).abs() < 1e-9);
}

#[test]
fn test_tracker_keeps_last_write_stats() {
    let mut tracker = ProgressTracker::new();
    tracker.observe(&ProgressEvent::new(10, "Wrote 100 bytes (1 files)"));
    tracker.observe(&ProgressEvent::new(20, "Syncing"));
    assert_eq!(tracker.stats(), Some(WriteStats { bytes: 100, files: 1 }));
}

// ==================== EASER TESTS ====================

#[test]
fn test_easer_step_formula() {
    let settings = ProgressSettings::default();
    let mut easer = ProgressEaser::smooth(&settings);
    let now = Instant::now();

    // delta 1.0: min(1.0, 0.02 + 0.2) = 0.22
    let first = easer.tick(1.0, now);
    assert!((first - 0.22).abs() < 1e-9, "got {}", first);

    // Small deltas close in one step
    let mut near = ProgressEaser::smooth(&settings);
    let v = near.tick(0.01, now);
    assert!((v - 0.01).abs() < 1e-12);
}

#[test]
fn test_easer_never_passes_target() {
    let settings = ProgressSettings::default();
    let mut easer = ProgressEaser::smooth(&settings);
    let now = Instant::now();
    for _ in 0..200 {
        let v = easer.tick(0.5, now);
        assert!(v <= 0.5 + 1e-12);
    }
    assert!((easer.displayed() - 0.5).abs() < 1e-9);

    // Target moving backwards leaves the display where it is
    assert!((easer.tick(0.3, now) - 0.5).abs() < 1e-9);
}

#[test]
fn test_easer_stall_points_within_window() {
    let settings = ProgressSettings::default();
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..50 {
        let easer = ProgressEaser::new(&settings, &mut rng);
        let points = easer.stall_points();
        assert!(points.len() >= 3 && points.len() <= 4);
        assert!(points.windows(2).all(|w| w[0] <= w[1]));
        for p in points {
            assert!(p >= settings.stall_window_start && p < settings.stall_window_end);
        }
    }
}

#[test]
fn test_easer_holds_at_stall_until_deadline() {
    let settings = ProgressSettings {
        stall_count_min: 1,
        stall_count_max: 1,
        stall_ms_min: 500,
        stall_ms_max: 500,
        stall_window_start: 0.10,
        stall_window_end: 0.10,
        ..ProgressSettings::default()
    };
    let mut rng = StdRng::seed_from_u64(1);
    let mut easer = ProgressEaser::new(&settings, &mut rng);
    let start = Instant::now();

    // First step would reach 0.12; the stall at 0.10 catches it
    let v = easer.tick(0.5, start);
    assert!((v - 0.10).abs() < 1e-9, "got {}", v);
    assert!((easer.tick(0.5, start + Duration::from_millis(100)) - 0.10).abs() < 1e-9);

    let after = easer.tick(0.5, start + Duration::from_millis(600));
    assert!(after > 0.10);
}

#[test]
fn test_easer_completion_ignores_stalls() {
    let settings = ProgressSettings::default();
    let mut rng = StdRng::seed_from_u64(3);
    let mut easer = ProgressEaser::new(&settings, &mut rng);
    let now = Instant::now();
    for _ in 0..100 {
        easer.tick(1.0, now);
    }
    assert!((easer.displayed() - 1.0).abs() < 1e-9);

    let mut other = ProgressEaser::new(&settings, &mut rng);
    other.complete();
    assert_eq!(other.displayed(), 1.0);
}

// ==================== PROGRESS BAR TESTS ====================

#[test]
fn test_filled_slots_clamped() {
    let bar = ProgressBar::new(40);
    assert_eq!(bar.filled_slots(0.0), 0);
    assert_eq!(bar.filled_slots(0.5), 20);
    assert_eq!(bar.filled_slots(1.0), 40);
    assert_eq!(bar.filled_slots(1.5), 40);
    assert_eq!(bar.filled_slots(-0.5), 0);
    assert_eq!(bar.filled_slots(f64::NAN), 0);
}

#[test]
fn test_zero_width_bar() {
    let mut bar = ProgressBar::new(0);
    assert_eq!(bar.filled_slots(1.0), 0);
    let line = bar.line(0.5, "working", None);
    assert!(line.contains("50.0%"));
}

#[test]
fn test_line_shows_message_or_stats() {
    let mut bar = ProgressBar::new(20);
    let line = bar.line(0.25, "Scanning /home", None);
    assert!(line.contains("25.0%"));
    assert!(line.contains("Scanning /home"));

    let line = bar.line(0.5, "ignored", Some(WriteStats { bytes: 2048, files: 2 }));
    assert!(line.contains("2.00 KB written, 2 files"));
    assert!(line.contains("ETA"));
    assert!(!line.contains("ignored"));
}

#[test]
fn test_spinner_cycles() {
    let mut bar = ProgressBar::new(10);
    let frames: Vec<String> = (0..SPINNER_FRAMES.len() * 2)
        .map(|_| bar.line(0.1, "x", None))
        .collect();
    assert_eq!(frames[0], frames[SPINNER_FRAMES.len()]);
}
