//! Validated subprocess execution of skill scripts.
//!
//! Scripts run as ordinary child processes under the invoking user, with a
//! fail-closed validation pipeline in front of the spawn: path containment,
//! permission-bit checks, tool policy, and interpreter resolution. There is
//! no kernel-level sandboxing here; callers needing stronger isolation must
//! layer it on top.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::error::SkillError;
use crate::types::SkillMetadata;

/// Exit code reported when a script is killed for exceeding its timeout.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Marker appended to stderr on timeout; result classification looks for it.
const TIMEOUT_MARKER: &str = "Timeout";

/// Marker appended to a captured stream that was cut at the size cap.
const TRUNCATION_MARKER: &str = "[... output truncated ...]";

/// Serialized-argument display cap for audit lines.
const AUDIT_ARGS_MAX_CHARS: usize = 256;

/// Capability name that grants script execution in `allowed-tools`.
const BASH_CAPABILITY: &str = "Bash";

const LIBRARY_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Outcome of a completed (or killed) script run. Process failures are data,
/// not errors: a non-zero exit code still produces an `Ok` result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptExecutionResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub execution_time_ms: u64,
    /// Resolved absolute path of the executed script.
    pub script_path: PathBuf,
    pub signal: Option<String>,
    pub signal_number: Option<i32>,
    pub stdout_truncated: bool,
    pub stderr_truncated: bool,
}

impl ScriptExecutionResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn timed_out(&self) -> bool {
        self.exit_code == TIMEOUT_EXIT_CODE && self.stderr.contains(TIMEOUT_MARKER)
    }

    pub fn signaled(&self) -> bool {
        self.signal_number.is_some()
    }
}

/// Runs skill scripts through the validation pipeline and a blocking
/// subprocess with timeout enforcement and bounded output capture.
#[derive(Debug, Clone)]
pub struct ScriptExecutor {
    timeout: Duration,
    max_output_bytes: usize,
    max_argument_bytes: usize,
}

impl Default for ScriptExecutor {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_output_bytes: 10 * 1024 * 1024,
            max_argument_bytes: 10 * 1024 * 1024,
        }
    }
}

impl ScriptExecutor {
    pub fn new(timeout: Duration, max_output_bytes: usize) -> Self {
        Self {
            timeout,
            max_output_bytes,
            ..Self::default()
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Validate and run `script_path` (relative to the skill's base
    /// directory), passing `arguments` as compact JSON on stdin.
    pub fn execute(
        &self,
        script_path: &Path,
        arguments: &serde_json::Value,
        skill_base_dir: &Path,
        skill: &SkillMetadata,
    ) -> Result<ScriptExecutionResult, SkillError> {
        let base = skill_base_dir.canonicalize().map_err(|err| {
            error!(
                "cannot resolve base directory {}: {err}",
                skill_base_dir.display()
            );
            SkillError::PathSecurity {
                requested: script_path.to_path_buf(),
                base_directory: skill_base_dir.to_path_buf(),
            }
        })?;

        let resolved = self.validate_script_path(script_path, &base)?;
        self.check_permission_bits(&resolved)?;
        check_tool_policy(skill)?;
        let interpreter = resolve_interpreter(&resolved)?;

        let payload =
            serde_json::to_vec(arguments).map_err(|err| SkillError::ArgumentSerialization {
                reason: err.to_string(),
            })?;
        if payload.len() > self.max_argument_bytes {
            return Err(SkillError::ArgumentSize {
                size: payload.len(),
                limit: self.max_argument_bytes,
            });
        }

        let display_path = resolved
            .strip_prefix(&base)
            .unwrap_or(resolved.as_path())
            .to_path_buf();

        let outcome = self.run_subprocess(&interpreter, &resolved, &base, &payload, skill);
        match outcome {
            Ok(result) => {
                emit_audit(skill, &display_path, arguments, Some(&result));
                Ok(result)
            }
            Err(err) => {
                emit_audit(skill, &display_path, arguments, None);
                Err(err)
            }
        }
    }

    /// Canonicalize and confine the script path to the skill's base
    /// directory. An entry that exists but cannot be resolved (broken
    /// symlink, link loop) is treated as a security violation, not a
    /// missing file.
    fn validate_script_path(
        &self,
        script_path: &Path,
        base: &Path,
    ) -> Result<PathBuf, SkillError> {
        let candidate = if script_path.is_absolute() {
            script_path.to_path_buf()
        } else {
            base.join(script_path)
        };

        let entry = std::fs::symlink_metadata(&candidate).ok();
        let is_symlink = entry
            .as_ref()
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false);

        let resolved = match candidate.canonicalize() {
            Ok(resolved) => resolved,
            Err(_) if entry.is_some() => {
                error!(
                    "script path {} exists but cannot be resolved",
                    candidate.display()
                );
                return Err(SkillError::PathSecurity {
                    requested: script_path.to_path_buf(),
                    base_directory: base.to_path_buf(),
                });
            }
            Err(_) => {
                return Err(SkillError::ScriptFileNotFound { path: candidate });
            }
        };

        if !path_contained(&resolved, base) {
            error!(
                "script path escapes skill directory: {} is outside {} (symlink: {is_symlink})",
                resolved.display(),
                base.display()
            );
            return Err(SkillError::PathSecurity {
                requested: script_path.to_path_buf(),
                base_directory: base.to_path_buf(),
            });
        }
        // Symlinked entries get an independent containment check on the
        // link's resolved target.
        if is_symlink {
            let target = std::fs::canonicalize(&resolved).unwrap_or_else(|_| resolved.clone());
            if !path_contained(&target, base) {
                return Err(SkillError::PathSecurity {
                    requested: script_path.to_path_buf(),
                    base_directory: base.to_path_buf(),
                });
            }
        }
        if !resolved.is_file() {
            return Err(SkillError::ScriptFileNotFound { path: resolved });
        }
        Ok(resolved)
    }

    /// Reject setuid/setgid scripts outright.
    #[cfg(unix)]
    fn check_permission_bits(&self, path: &Path) -> Result<(), SkillError> {
        use std::os::unix::fs::PermissionsExt;

        let metadata = std::fs::metadata(path).map_err(|_| SkillError::ScriptFileNotFound {
            path: path.to_path_buf(),
        })?;
        let mode = metadata.permissions().mode();
        let setuid = mode & 0o4000 != 0;
        let setgid = mode & 0o2000 != 0;
        if setuid || setgid {
            error!(
                "refusing script {} with elevated permission bits (mode {:o})",
                path.display(),
                mode
            );
            return Err(SkillError::ScriptPermission {
                path: path.to_path_buf(),
                mode,
                setuid,
                setgid,
            });
        }
        Ok(())
    }

    #[cfg(not(unix))]
    fn check_permission_bits(&self, _path: &Path) -> Result<(), SkillError> {
        Ok(())
    }

    fn run_subprocess(
        &self,
        interpreter: &Path,
        script: &Path,
        base: &Path,
        payload: &[u8],
        skill: &SkillMetadata,
    ) -> Result<ScriptExecutionResult, SkillError> {
        let start = Instant::now();
        let mut child = Command::new(interpreter)
            .arg(script)
            .current_dir(base)
            .env("SKILL_NAME", &skill.name)
            .env("SKILL_BASE_DIR", base)
            .env(
                "SKILL_VERSION",
                skill.version.as_deref().unwrap_or("0.0.0"),
            )
            .env("SKILLRUNNER_VERSION", LIBRARY_VERSION)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| SkillError::Spawn {
                script: script.to_path_buf(),
                source,
            })?;

        // Feed arguments from a separate thread so a child that never reads
        // stdin cannot deadlock us against a full pipe.
        let stdin_handle = child.stdin.take().map(|mut stdin| {
            let payload = payload.to_vec();
            std::thread::spawn(move || {
                let _ = stdin.write_all(&payload);
            })
        });
        let stdout_handle = child.stdout.take().map(|mut out| {
            std::thread::spawn(move || {
                let mut buf = Vec::new();
                let _ = std::io::Read::read_to_end(&mut out, &mut buf);
                buf
            })
        });
        let stderr_handle = child.stderr.take().map(|mut err| {
            std::thread::spawn(move || {
                let mut buf = Vec::new();
                let _ = std::io::Read::read_to_end(&mut err, &mut buf);
                buf
            })
        });

        let deadline = start + self.timeout;
        let mut timed_out = false;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break Some(status),
                Ok(None) => {
                    if Instant::now() >= deadline {
                        warn!(
                            "script {} exceeded {}s timeout, killing",
                            script.display(),
                            self.timeout.as_secs()
                        );
                        let _ = child.kill();
                        let _ = child.wait();
                        timed_out = true;
                        break None;
                    }
                    std::thread::sleep(Duration::from_millis(10));
                }
                Err(source) => {
                    let _ = child.kill();
                    return Err(SkillError::Spawn {
                        script: script.to_path_buf(),
                        source,
                    });
                }
            }
        };

        if let Some(handle) = stdin_handle {
            let _ = handle.join();
        }
        let stdout_raw = stdout_handle
            .and_then(|h| h.join().ok())
            .unwrap_or_default();
        let stderr_raw = stderr_handle
            .and_then(|h| h.join().ok())
            .unwrap_or_default();

        let execution_time_ms = start.elapsed().as_millis() as u64;
        let (exit_code, signal_number) = classify_status(status, timed_out);
        let signal = signal_number.map(signal_name);

        let (stdout, stdout_truncated) = truncate_stream(stdout_raw, self.max_output_bytes);
        let (mut stderr, stderr_truncated) = truncate_stream(stderr_raw, self.max_output_bytes);
        if timed_out {
            if !stderr.is_empty() && !stderr.ends_with('\n') {
                stderr.push('\n');
            }
            stderr.push_str(TIMEOUT_MARKER);
        }

        Ok(ScriptExecutionResult {
            stdout,
            stderr,
            exit_code,
            execution_time_ms,
            script_path: script.to_path_buf(),
            signal,
            signal_number,
            stdout_truncated,
            stderr_truncated,
        })
    }
}

/// Component-wise containment: `path` must be strictly inside `base`.
fn path_contained(path: &Path, base: &Path) -> bool {
    path.starts_with(base) && path != base
}

/// An empty `allowed-tools` list permits everything; a non-empty list must
/// grant the Bash capability, either bare or parameterized (`Bash(...)`).
fn check_tool_policy(skill: &SkillMetadata) -> Result<(), SkillError> {
    if skill.allowed_tools.is_empty() {
        return Ok(());
    }
    let granted = skill.allowed_tools.iter().any(|tool| {
        tool == BASH_CAPABILITY || tool.starts_with(&format!("{BASH_CAPABILITY}("))
    });
    if granted {
        Ok(())
    } else {
        Err(SkillError::ToolRestriction {
            skill: skill.name.clone(),
            allowed_tools: skill.allowed_tools.clone(),
        })
    }
}

/// Map the script's extension to an interpreter and confirm it is on PATH.
fn resolve_interpreter(script: &Path) -> Result<PathBuf, SkillError> {
    let ext = script
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    let name = match ext.as_str() {
        "py" => "python3",
        "sh" => "bash",
        "js" => "node",
        "rb" => "ruby",
        "pl" => "perl",
        "bat" | "cmd" => "cmd",
        "ps1" => "powershell",
        _ => {
            return Err(SkillError::InterpreterNotFound {
                interpreter: format!(".{ext}"),
                script: script.to_path_buf(),
            })
        }
    };
    which::which(name).map_err(|_| SkillError::InterpreterNotFound {
        interpreter: name.to_string(),
        script: script.to_path_buf(),
    })
}

fn classify_status(status: Option<std::process::ExitStatus>, timed_out: bool) -> (i32, Option<i32>) {
    if timed_out {
        return (TIMEOUT_EXIT_CODE, None);
    }
    let Some(status) = status else {
        return (TIMEOUT_EXIT_CODE, None);
    };
    if let Some(code) = status.code() {
        return (code, None);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(sig) = status.signal() {
            return (-sig, Some(sig));
        }
    }
    (-1, None)
}

fn signal_name(signal: i32) -> String {
    match signal {
        1 => "SIGHUP".to_string(),
        2 => "SIGINT".to_string(),
        3 => "SIGQUIT".to_string(),
        6 => "SIGABRT".to_string(),
        9 => "SIGKILL".to_string(),
        11 => "SIGSEGV".to_string(),
        13 => "SIGPIPE".to_string(),
        15 => "SIGTERM".to_string(),
        _ => format!("UNKNOWN_SIGNAL_{signal}"),
    }
}

fn truncate_stream(raw: Vec<u8>, cap: usize) -> (String, bool) {
    if raw.len() > cap {
        let mut text = String::from_utf8_lossy(&raw[..cap]).into_owned();
        text.push('\n');
        text.push_str(TRUNCATION_MARKER);
        (text, true)
    } else {
        (String::from_utf8_lossy(&raw).into_owned(), false)
    }
}

/// One audit line per execution attempt that reached the spawn stage,
/// emitted on the dedicated `audit` target regardless of outcome.
fn emit_audit(
    skill: &SkillMetadata,
    script: &Path,
    arguments: &serde_json::Value,
    result: Option<&ScriptExecutionResult>,
) {
    info!(target: "audit", "{}", audit_line(skill, script, arguments, result));
}

fn audit_line(
    skill: &SkillMetadata,
    script: &Path,
    arguments: &serde_json::Value,
    result: Option<&ScriptExecutionResult>,
) -> String {
    let mut args_repr = arguments.to_string();
    if args_repr.chars().count() > AUDIT_ARGS_MAX_CHARS {
        args_repr = args_repr.chars().take(AUDIT_ARGS_MAX_CHARS).collect();
        args_repr.push_str("...");
    }
    let (exit_code, execution_time_ms, signal, stdout_truncated, stderr_truncated) = match result {
        Some(r) => (
            r.exit_code.to_string(),
            r.execution_time_ms.to_string(),
            r.signal.clone().unwrap_or_else(|| "none".to_string()),
            r.stdout_truncated,
            r.stderr_truncated,
        ),
        None => (
            "error".to_string(),
            "0".to_string(),
            "none".to_string(),
            false,
            false,
        ),
    };
    format!(
        "AUDIT: timestamp={} skill={} script={} args={} exit_code={} execution_time_ms={} signal={} stdout_truncated={} stderr_truncated={}",
        chrono::Utc::now().to_rfc3339(),
        skill.name,
        script.display(),
        args_repr,
        exit_code,
        execution_time_ms,
        signal,
        stdout_truncated,
        stderr_truncated,
    )
}
