// Privilege elevation with a one-shot relaunch guard
//
// Checked once at startup:
//
//   NotElevated --(relaunch with guard)--> Relaunching --(new process)--> Elevated
//
// The relaunched process carries the guard both as a reserved environment
// variable and as a trailing argv marker (pkexec scrubs the environment, so
// the marker is what survives there). Either one present means "never
// relaunch again", even if the probe still says we are not elevated.

use crate::{PipelineError, PipelineResult};
use serde::{Deserialize, Serialize};
use std::ffi::{OsStr, OsString};
use std::path::PathBuf;
use std::sync::OnceLock;
use tracing::{info, warn};

/// Developer escape hatch: skip the elevation check entirely
pub const SKIP_ELEVATION_ENV: &str = "SEVE_SKIP_ELEVATION";
/// Set on the relaunched child
pub const ELEVATED_ENV: &str = "SEVE_ELEVATED";
/// Appended to the relaunched child's arguments
pub const ELEVATED_MARKER: &str = "--seve-elevated=1";

static ELEVATION_STATE: OnceLock<ElevationState> = OnceLock::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElevationPhase {
    NotElevated,
    Relaunching,
    Elevated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElevationState {
    pub required: bool,
    pub achieved: bool,
    pub retry_guard_set: bool,
    pub phase: ElevationPhase,
}

/// Is this process running with elevated rights?
#[cfg_attr(test, mockall::automock)]
pub trait PrivilegeProbe {
    fn is_elevated(&self) -> bool;
}

/// Starts the elevated copy of this process and waits for it.
#[cfg_attr(test, mockall::automock)]
pub trait Relauncher {
    fn relaunch(&self, plan: &RelaunchPlan) -> std::io::Result<i32>;
}

/// Effective uid 0 on unix.
#[derive(Debug, Default, Clone, Copy)]
pub struct EffectiveUidProbe;

impl PrivilegeProbe for EffectiveUidProbe {
    #[cfg(unix)]
    fn is_elevated(&self) -> bool {
        unsafe { libc::geteuid() == 0 }
    }

    #[cfg(not(unix))]
    fn is_elevated(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelaunchPlan {
    /// Elevation helper, e.g. `pkexec`
    pub program: String,
    pub args: Vec<OsString>,
    pub env: Vec<(String, String)>,
}

/// Runs the plan as a blocking child process.
#[derive(Debug, Default, Clone, Copy)]
pub struct CommandRelauncher;

impl Relauncher for CommandRelauncher {
    fn relaunch(&self, plan: &RelaunchPlan) -> std::io::Result<i32> {
        let status = std::process::Command::new(&plan.program)
            .args(&plan.args)
            .envs(plan.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .status()?;
        // Killed by a signal: report as generic failure
        Ok(status.code().unwrap_or(1))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElevationOutcome {
    /// Keep running in this process
    Continue(ElevationState),
    /// The elevated copy ran; exit with its code
    Relaunched { exit_code: i32 },
}

impl ElevationOutcome {
    pub fn state(&self) -> ElevationState {
        match self {
            ElevationOutcome::Continue(state) => *state,
            ElevationOutcome::Relaunched { .. } => ElevationState {
                required: true,
                achieved: false,
                retry_guard_set: false,
                phase: ElevationPhase::Relaunching,
            },
        }
    }
}

pub struct ElevationGuard<P, R> {
    probe: P,
    relauncher: R,
    relaunch_program: String,
}

fn flag_set(value: Option<&OsStr>) -> bool {
    match value.and_then(OsStr::to_str) {
        Some(v) => matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"),
        None => false,
    }
}

/// True when this process is already the relaunched copy.
pub fn guard_present(args: &[OsString], env_elevated: Option<&OsStr>) -> bool {
    flag_set(env_elevated) || args.iter().any(|a| a == ELEVATED_MARKER)
}

/// Drop the guard marker before argument parsing.
pub fn strip_marker(args: impl IntoIterator<Item = OsString>) -> Vec<OsString> {
    args.into_iter().filter(|a| a != ELEVATED_MARKER).collect()
}

impl<P: PrivilegeProbe, R: Relauncher> ElevationGuard<P, R> {
    pub fn new(probe: P, relauncher: R, relaunch_program: impl Into<String>) -> Self {
        Self {
            probe,
            relauncher,
            relaunch_program: relaunch_program.into(),
        }
    }

    /// Decide whether to continue here or hand over to an elevated copy.
    ///
    /// `args` is the full argv including the program path; `env` looks up
    /// process environment variables.
    pub fn ensure<E>(&self, args: &[OsString], env: E) -> PipelineResult<ElevationOutcome>
    where
        E: Fn(&str) -> Option<OsString>,
    {
        if flag_set(env(SKIP_ELEVATION_ENV).as_deref()) {
            let achieved = self.probe.is_elevated();
            info!(achieved, "Elevation check skipped by override");
            return Ok(ElevationOutcome::Continue(ElevationState {
                required: false,
                achieved,
                retry_guard_set: false,
                phase: if achieved {
                    ElevationPhase::Elevated
                } else {
                    ElevationPhase::NotElevated
                },
            }));
        }

        let guard = guard_present(args, env(ELEVATED_ENV).as_deref());

        if self.probe.is_elevated() {
            return Ok(ElevationOutcome::Continue(ElevationState {
                required: true,
                achieved: true,
                retry_guard_set: guard,
                phase: ElevationPhase::Elevated,
            }));
        }

        if guard {
            warn!("Relaunched process is still not elevated; continuing without privileges");
            return Ok(ElevationOutcome::Continue(ElevationState {
                required: true,
                achieved: false,
                retry_guard_set: true,
                phase: ElevationPhase::NotElevated,
            }));
        }

        let plan = self.plan(args);
        info!(program = %plan.program, "Relaunching with elevated privileges");
        let exit_code = self
            .relauncher
            .relaunch(&plan)
            .map_err(|e| PipelineError::Elevation(format!("{}: {}", plan.program, e)))?;
        Ok(ElevationOutcome::Relaunched { exit_code })
    }

    /// Relaunch command line: helper, our argv, then the guard marker.
    pub fn plan(&self, args: &[OsString]) -> RelaunchPlan {
        let mut relaunch_args: Vec<OsString> = Vec::with_capacity(args.len() + 1);
        match args.split_first() {
            Some((program, rest)) => {
                // pkexec needs an absolute path
                let exe = std::env::current_exe()
                    .map(PathBuf::into_os_string)
                    .unwrap_or_else(|_| program.clone());
                relaunch_args.push(exe);
                relaunch_args.extend(rest.iter().cloned());
            }
            None => {
                if let Ok(exe) = std::env::current_exe() {
                    relaunch_args.push(exe.into_os_string());
                }
            }
        }
        relaunch_args.push(OsString::from(ELEVATED_MARKER));

        RelaunchPlan {
            program: self.relaunch_program.clone(),
            args: relaunch_args,
            env: vec![(ELEVATED_ENV.to_string(), "1".to_string())],
        }
    }
}

/// Record the startup decision. Only the first call has any effect.
pub fn record_state(state: ElevationState) -> bool {
    ELEVATION_STATE.set(state).is_ok()
}

pub fn current_state() -> Option<ElevationState> {
    ELEVATION_STATE.get().copied()
}
