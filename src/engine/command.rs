use crate::settings::EngineSettings;
use crate::{WipeLevel, WipePattern};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::PathBuf;

/// Which companion script handles a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineScript {
    Scanner,
    Wipe,
}

/// Everything the Engine can be asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCommand {
    ListDrives,
    Scan { roots: Vec<String> },
    DriveInfo { drive: String },
    Wipe {
        level: WipeLevel,
        drive: String,
        pattern: WipePattern,
    },
    WipeFile {
        path: String,
        passes: u32,
        pattern: WipePattern,
    },
    Locate { path: String },
    Search { root: String, query: String },
}

impl EngineCommand {
    pub fn args(&self) -> Vec<String> {
        match self {
            EngineCommand::ListDrives => vec!["--list-drives".into()],
            EngineCommand::Scan { roots } => {
                let mut args = vec!["--scan".to_string()];
                args.extend(roots.iter().cloned());
                args
            }
            EngineCommand::DriveInfo { drive } => {
                vec!["--get-drive-info".into(), drive.clone()]
            }
            EngineCommand::Wipe {
                level,
                drive,
                pattern,
            } => vec![
                "--wipe".into(),
                "--level".into(),
                level.as_u8().to_string(),
                "--drive".into(),
                drive.clone(),
                "--pattern".into(),
                pattern.as_str().into(),
            ],
            EngineCommand::WipeFile {
                path,
                passes,
                pattern,
            } => vec![
                "--wipe-file".into(),
                "--path".into(),
                path.clone(),
                "--passes".into(),
                passes.to_string(),
                "--pattern".into(),
                pattern.as_str().into(),
            ],
            EngineCommand::Locate { path } => vec!["--locate".into(), path.clone()],
            EngineCommand::Search { root, query } => {
                vec!["--search".into(), root.clone(), query.clone()]
            }
        }
    }

    pub fn script(&self) -> EngineScript {
        match self {
            EngineCommand::DriveInfo { .. }
            | EngineCommand::Wipe { .. }
            | EngineCommand::WipeFile { .. } => EngineScript::Wipe,
            _ => EngineScript::Scanner,
        }
    }

    /// Short name used for logs and diagnostics files
    pub fn label(&self) -> &'static str {
        match self {
            EngineCommand::ListDrives => "list_drives",
            EngineCommand::Scan { .. } => "scan",
            EngineCommand::DriveInfo { .. } => "drive_info",
            EngineCommand::Wipe { .. } => "wipe",
            EngineCommand::WipeFile { .. } => "wipe_file",
            EngineCommand::Locate { .. } => "locate",
            EngineCommand::Search { .. } => "search",
        }
    }

    pub fn is_destructive(&self) -> bool {
        matches!(
            self,
            EngineCommand::Wipe { .. } | EngineCommand::WipeFile { .. }
        )
    }

    /// Destructive and search runs keep their raw output for post-mortems.
    pub fn keeps_diagnostics(&self) -> bool {
        self.is_destructive() || matches!(self, EngineCommand::Search { .. })
    }
}

/// A fully resolved process launch.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineInvocation {
    pub label: &'static str,
    pub program: String,
    /// Checked for existence before spawning
    pub script: Option<PathBuf>,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    /// Set on top of the inherited environment
    pub env: BTreeMap<String, OsString>,
    /// Run outside the terminal's process group so Ctrl-C cannot reach it
    pub detached: bool,
}

impl EngineInvocation {
    pub fn build(settings: &EngineSettings, command: &EngineCommand) -> Self {
        let (script, prefix) = match command.script() {
            EngineScript::Scanner => (settings.scanner_script.clone(), settings.scanner_args.clone()),
            EngineScript::Wipe => (settings.wipe_script.clone(), Vec::new()),
        };

        let mut args = prefix;
        args.extend(command.args());

        Self {
            label: command.label(),
            program: settings.program.clone(),
            script,
            args,
            working_dir: settings.working_dir.clone(),
            env: injected_env(settings, std::env::var_os(&settings.library_path_var)),
            detached: command.is_destructive(),
        }
    }

    /// Arguments as passed to the program, script first.
    pub fn argv(&self) -> Vec<OsString> {
        let mut argv: Vec<OsString> = Vec::with_capacity(self.args.len() + 1);
        if let Some(script) = &self.script {
            argv.push(script.clone().into_os_string());
        }
        argv.extend(self.args.iter().map(OsString::from));
        argv
    }
}

/// Variables layered over the inherited environment.
///
/// The library directory goes in front of whatever the parent already has for
/// `library_path_var`, so the system-wide setting is never replaced.
pub fn injected_env(
    settings: &EngineSettings,
    inherited_library_path: Option<OsString>,
) -> BTreeMap<String, OsString> {
    let mut env: BTreeMap<String, OsString> = settings
        .env_pairs()
        .into_iter()
        .map(|(k, v)| (k, OsString::from(v)))
        .collect();

    if let Some(library) = &settings.library_path {
        let mut paths = vec![library.clone()];
        if let Some(existing) = &inherited_library_path {
            paths.extend(std::env::split_paths(existing).filter(|p| p != library));
        }
        // join_paths only fails on separators inside a path; keep ours alone then
        let joined = std::env::join_paths(&paths)
            .unwrap_or_else(|_| library.clone().into_os_string());
        env.insert(settings.library_path_var.clone(), joined);
    }

    env
}
