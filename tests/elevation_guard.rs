// Relaunch guard across two process generations
//
// The first generation hands its relaunch plan to the mock; the plan's argv
// and env then become the second generation's startup inputs.

use mockall::mock;
use seve_clear::elevation::{
    guard_present, strip_marker, ElevationGuard, ElevationOutcome, ElevationPhase,
    PrivilegeProbe, RelaunchPlan, Relauncher, ELEVATED_ENV, ELEVATED_MARKER,
};
use seve_clear::PipelineError;
use std::ffi::{OsStr, OsString};
use std::sync::{Arc, Mutex};

mock! {
    Probe {}
    impl PrivilegeProbe for Probe {
        fn is_elevated(&self) -> bool;
    }
}

mock! {
    Launcher {}
    impl Relauncher for Launcher {
        fn relaunch(&self, plan: &RelaunchPlan) -> std::io::Result<i32>;
    }
}

fn probe(elevated: bool) -> MockProbe {
    let mut probe = MockProbe::new();
    probe.expect_is_elevated().return_const(elevated);
    probe
}

fn args(list: &[&str]) -> Vec<OsString> {
    list.iter().map(OsString::from).collect()
}

fn env_from(pairs: Vec<(String, String)>) -> impl Fn(&str) -> Option<OsString> {
    move |key| {
        pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| OsString::from(v))
    }
}

#[test]
fn test_relaunch_happens_at_most_once() {
    let captured: Arc<Mutex<Option<RelaunchPlan>>> = Arc::default();
    let sink = Arc::clone(&captured);

    let mut launcher = MockLauncher::new();
    launcher.expect_relaunch().times(1).returning(move |plan| {
        *sink.lock().unwrap() = Some(plan.clone());
        Ok(0)
    });

    let first = ElevationGuard::new(probe(false), launcher, "pkexec");
    let outcome = first
        .ensure(&args(&["seve", "wipe", "/dev/sdb"]), |_| None)
        .unwrap();
    assert_eq!(outcome, ElevationOutcome::Relaunched { exit_code: 0 });

    let plan = captured.lock().unwrap().take().expect("plan was handed over");
    assert_eq!(plan.program, "pkexec");
    assert_eq!(plan.args.last().map(OsString::as_os_str), Some(OsStr::new(ELEVATED_MARKER)));

    // pkexec scrubs the environment: the second generation only sees argv
    let mut no_relaunch = MockLauncher::new();
    no_relaunch.expect_relaunch().times(0);
    let second = ElevationGuard::new(probe(false), no_relaunch, "pkexec");
    let outcome = second.ensure(&plan.args, |_| None).unwrap();

    match outcome {
        ElevationOutcome::Continue(state) => {
            assert!(state.retry_guard_set);
            assert!(!state.achieved);
            assert_eq!(state.phase, ElevationPhase::NotElevated);
        }
        other => panic!("second generation relaunched again: {:?}", other),
    }

    // The marker never reaches argument parsing
    let parsed = strip_marker(plan.args.clone());
    assert!(parsed.iter().all(|a| a != ELEVATED_MARKER));
    assert!(parsed.iter().any(|a| a == "wipe"));
}

#[test]
fn test_env_only_guard_survives_helpers_that_drop_argv_extras() {
    let mut launcher = MockLauncher::new();
    launcher.expect_relaunch().times(0);
    let guard = ElevationGuard::new(probe(false), launcher, "sudo");

    let env = env_from(vec![(ELEVATED_ENV.to_string(), "true".to_string())]);
    let outcome = guard.ensure(&args(&["seve", "list"]), env).unwrap();
    assert!(matches!(outcome, ElevationOutcome::Continue(s) if s.retry_guard_set));
}

#[test]
fn test_elevated_second_generation_reports_elevated() {
    let mut launcher = MockLauncher::new();
    launcher.expect_relaunch().times(0);
    let guard = ElevationGuard::new(probe(true), launcher, "pkexec");

    let outcome = guard
        .ensure(&args(&["seve", "list", ELEVATED_MARKER]), |_| None)
        .unwrap();
    let state = outcome.state();
    assert!(state.achieved);
    assert!(state.retry_guard_set);
    assert_eq!(state.phase, ElevationPhase::Elevated);
}

#[test]
fn test_missing_helper_is_an_elevation_error() {
    let mut launcher = MockLauncher::new();
    launcher
        .expect_relaunch()
        .returning(|_| Err(std::io::Error::new(std::io::ErrorKind::NotFound, "pkexec not installed")));
    let guard = ElevationGuard::new(probe(false), launcher, "pkexec");

    let err = guard.ensure(&args(&["seve"]), |_| None).unwrap_err();
    match err {
        PipelineError::Elevation(message) => assert!(message.contains("pkexec not installed")),
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn test_guard_detection() {
    assert!(guard_present(&args(&["seve", ELEVATED_MARKER]), None));
    assert!(guard_present(&args(&["seve"]), Some(OsStr::new("1"))));
    assert!(guard_present(&args(&["seve"]), Some(OsStr::new("YES"))));
    assert!(!guard_present(&args(&["seve"]), Some(OsStr::new("0"))));
    assert!(!guard_present(&args(&["seve", "--seve-elevated=0"]), None));
}
