use std::sync::Once;

use chrono::{TimeZone, Utc};
use harvester_core::{DateWindow, SeenSet, Source, Verdict, WindowState};

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(engine_logging::initialize_for_tests);
}

#[test]
fn admit_is_idempotent_per_key() {
    init_logging();
    let mut seen = SeenSet::new();
    assert!(seen.admit(Source::Reddit, "a1"));
    assert!(!seen.admit(Source::Reddit, "a1"));
    assert!(!seen.admit(Source::Reddit, "a1"));
    assert_eq!(seen.len(), 1);
}

#[test]
fn same_id_on_different_sources_is_distinct() {
    init_logging();
    let mut seen = SeenSet::new();
    assert!(seen.admit(Source::Reddit, "42"));
    assert!(seen.admit(Source::Bluesky, "42"));
    assert_eq!(seen.len(), 2);
}

#[test]
fn repeated_sequence_keeps_first_seen_only() {
    init_logging();
    let mut seen = SeenSet::new();
    let stream = ["a1", "a2", "a1", "a3", "a2", "a1"];
    let admitted: Vec<&str> = stream
        .iter()
        .copied()
        .filter(|id| seen.admit(Source::Stocktwits, id))
        .collect();
    assert_eq!(admitted, vec!["a1", "a2", "a3"]);
}

fn window_march() -> DateWindow {
    DateWindow {
        start: Some(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()),
        end: Some(Utc.with_ymd_and_hms(2024, 3, 31, 23, 59, 59).unwrap()),
    }
}

#[test]
fn inside_window_keeps() {
    init_logging();
    let mut state = WindowState::new(Some(window_march()));
    let ts = Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap();
    assert_eq!(state.accept(Some(ts), true), Verdict::Keep);
    assert!(!state.exceeded_older_bound());
}

#[test]
fn unknown_timestamp_keeps() {
    init_logging();
    let mut state = WindowState::new(Some(window_march()));
    assert_eq!(state.accept(None, true), Verdict::Keep);
}

#[test]
fn newer_than_end_drops_without_stopping() {
    init_logging();
    let mut state = WindowState::new(Some(window_march()));
    let ts = Utc.with_ymd_and_hms(2024, 4, 2, 0, 0, 0).unwrap();
    assert_eq!(state.accept(Some(ts), true), Verdict::Drop);
    assert!(!state.exceeded_older_bound());
}

#[test]
fn older_than_start_stops_reverse_chronological_tiers() {
    init_logging();
    let mut state = WindowState::new(Some(window_march()));
    let ts = Utc.with_ymd_and_hms(2024, 2, 28, 0, 0, 0).unwrap();
    assert_eq!(state.accept(Some(ts), true), Verdict::StopTier);
    assert!(state.exceeded_older_bound());
}

#[test]
fn older_than_start_only_drops_on_unordered_tiers() {
    init_logging();
    let mut state = WindowState::new(Some(window_march()));
    let ts = Utc.with_ymd_and_hms(2024, 2, 28, 0, 0, 0).unwrap();
    assert_eq!(state.accept(Some(ts), false), Verdict::Drop);
    assert!(!state.exceeded_older_bound());
}

#[test]
fn exceeded_flag_latches_for_the_run() {
    init_logging();
    let mut state = WindowState::new(Some(window_march()));
    let old = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let inside = Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap();
    assert_eq!(state.accept(Some(old), true), Verdict::StopTier);
    assert_eq!(state.accept(Some(inside), true), Verdict::Keep);
    assert!(state.exceeded_older_bound());
}

#[test]
fn no_window_keeps_everything() {
    init_logging();
    let mut state = WindowState::new(None);
    let ts = Utc.with_ymd_and_hms(1999, 1, 1, 0, 0, 0).unwrap();
    assert_eq!(state.accept(Some(ts), true), Verdict::Keep);
    assert_eq!(state.accept(None, false), Verdict::Keep);
}
