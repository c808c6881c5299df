//! Error types for skill discovery and script execution.
//!
//! One closed enum covers the whole library surface. Each variant carries the
//! structured fields callers need to react programmatically (paths, modes,
//! limits) rather than a bare message.

use std::path::PathBuf;

use crate::types::InitMode;

/// Unified error type for the library.
#[derive(Debug, thiserror::Error)]
pub enum SkillError {
    /// An explicitly configured source path does not exist or is not a
    /// directory. Default source paths are exempt and silently skipped.
    #[error("configured {parameter} path does not exist or is not a directory: {path}")]
    Configuration { parameter: String, path: PathBuf },

    /// SKILL.md frontmatter is structurally invalid (missing delimiters,
    /// bad YAML, empty block).
    #[error("invalid frontmatter in {path}: {reason}")]
    InvalidFrontmatter { path: PathBuf, reason: String },

    /// A required frontmatter field is missing or empty.
    #[error("missing required field '{field}' in {path}")]
    MissingRequiredField { path: PathBuf, field: String },

    /// Plugin manifest parsing or validation failed.
    #[error("invalid plugin manifest at {path}: {reason}")]
    ManifestInvalid { path: PathBuf, reason: String },

    /// Sync and async methods were mixed on one manager instance.
    #[error("manager is initialized in {active} mode; {requested} call rejected. Create a new manager instance")]
    State {
        active: InitMode,
        requested: InitMode,
    },

    /// Skill name not present in the registry.
    #[error("skill '{name}' not found. Available skills: {}", format_names(.available))]
    SkillNotFound {
        name: String,
        available: Vec<String>,
    },

    /// Script name not present among a skill's detected scripts.
    #[error("script '{script}' not found in skill '{skill}'. Detected scripts: {}", format_names(.detected))]
    ScriptNotFound {
        script: String,
        skill: String,
        detected: Vec<String>,
    },

    /// A script path resolves outside the skill's base directory, or symlink
    /// resolution failed.
    #[error("path security violation: {requested} escapes base directory {base_directory}")]
    PathSecurity {
        requested: PathBuf,
        base_directory: PathBuf,
    },

    /// The resolved script path does not exist or is not a regular file.
    #[error("script file not found: {path}")]
    ScriptFileNotFound { path: PathBuf },

    /// Script carries setuid or setgid permission bits.
    #[error("script {path} has dangerous permissions (mode {mode:o}, setuid={setuid}, setgid={setgid})")]
    ScriptPermission {
        path: PathBuf,
        mode: u32,
        setuid: bool,
        setgid: bool,
    },

    /// The skill's allowed-tools list does not grant script execution.
    #[error("skill '{skill}' does not allow script execution (requires 'Bash'). Allowed tools: {}", format_names(.allowed_tools))]
    ToolRestriction {
        skill: String,
        allowed_tools: Vec<String>,
    },

    /// No interpreter is mapped for the script extension, or the mapped
    /// interpreter is not on PATH.
    #[error("interpreter '{interpreter}' not available for script {script}")]
    InterpreterNotFound { interpreter: String, script: PathBuf },

    /// Script arguments could not be serialized to JSON.
    #[error("failed to serialize script arguments: {reason}")]
    ArgumentSerialization { reason: String },

    /// Serialized arguments exceed the configured size cap.
    #[error("arguments too large: {size} bytes (limit {limit})")]
    ArgumentSize { size: usize, limit: usize },

    /// Skill content file could not be read.
    #[error("failed to read skill content at {path}: {source}")]
    ContentLoad {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Subprocess spawn or pipe wiring failed.
    #[error("failed to execute script {script}: {source}")]
    Spawn {
        script: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn format_names(names: &[String]) -> String {
    if names.is_empty() {
        "none".to_string()
    } else {
        names.join(", ")
    }
}
