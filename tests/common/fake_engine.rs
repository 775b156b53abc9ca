/// Scriptable engine stand-in
///
/// Each registered response is keyed by the command flag the host passes
/// first (`--wipe`, `--scan`, ...). The generated script logs every call so
/// tests can check the exact command line the host produced.
use seve_clear::settings::{EngineSettings, PipelineConfig};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// What the engine prints and how it exits for one command.
#[derive(Clone, Debug)]
pub struct EngineResponse {
    pub progress: Vec<(u32, String)>,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl EngineResponse {
    pub fn json(value: serde_json::Value) -> Self {
        Self {
            progress: Vec::new(),
            stdout: value.to_string(),
            stderr: String::new(),
            exit_code: 0,
        }
    }

    #[allow(dead_code)]
    pub fn raw(stdout: &str) -> Self {
        Self {
            progress: Vec::new(),
            stdout: stdout.to_string(),
            stderr: String::new(),
            exit_code: 0,
        }
    }

    #[allow(dead_code)]
    pub fn failure(stderr: &str, exit_code: i32) -> Self {
        Self {
            progress: Vec::new(),
            stdout: String::new(),
            stderr: stderr.to_string(),
            exit_code,
        }
    }

    #[allow(dead_code)]
    pub fn with_progress(mut self, steps: &[(u32, &str)]) -> Self {
        self.progress = steps.iter().map(|(p, m)| (*p, m.to_string())).collect();
        self
    }
}

pub struct FakeEngine {
    dir: TempDir,
    responses: Vec<(String, EngineResponse)>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("temp dir"),
            responses: Vec::new(),
        }
    }

    pub fn respond(mut self, flag: &str, response: EngineResponse) -> Self {
        self.responses.push((flag.to_string(), response));
        self
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    fn log_path(&self) -> PathBuf {
        self.dir.path().join("calls.log")
    }

    fn script(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "printf '%s\\n' \"$*\" >> '{}'", self.log_path().display());
        let _ = writeln!(out, "case \"$1\" in");
        for (flag, response) in &self.responses {
            let _ = writeln!(out, "  {})", flag);
            for (percent, message) in &response.progress {
                let _ = writeln!(out, "    printf '%s\\n' '::progress::{}::{}'", percent, message);
            }
            if !response.stdout.is_empty() {
                let _ = writeln!(out, "    cat <<'SEVE_STDOUT'\n{}\nSEVE_STDOUT", response.stdout);
            }
            if !response.stderr.is_empty() {
                let _ = writeln!(out, "    cat >&2 <<'SEVE_STDERR'\n{}\nSEVE_STDERR", response.stderr);
            }
            let _ = writeln!(out, "    exit {}\n    ;;", response.exit_code);
        }
        let _ = writeln!(out, "  *)\n    echo \"unknown command $1\" >&2\n    exit 64\n    ;;");
        let _ = writeln!(out, "esac");
        out
    }

    /// Write the script and return a config that launches it.
    pub fn install(&self) -> PipelineConfig {
        let script = self.dir.path().join("engine.sh");
        std::fs::write(&script, self.script()).expect("write engine script");

        PipelineConfig {
            engine: EngineSettings {
                program: "/bin/sh".into(),
                scanner_script: Some(script.clone()),
                wipe_script: Some(script),
                extra_env: Vec::new(),
                ..EngineSettings::default()
            },
            ..PipelineConfig::default()
        }
    }

    /// Command lines the engine received, oldest first.
    #[allow(dead_code)]
    pub fn calls(&self) -> Vec<String> {
        std::fs::read_to_string(self.log_path())
            .map(|text| text.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// Create a file under the engine's temp dir.
    #[allow(dead_code)]
    pub fn file(&self, name: &str, contents: &str) -> String {
        let path = self.dir.path().join(name);
        std::fs::write(&path, contents).expect("write fixture file");
        path.to_string_lossy().into_owned()
    }
}
