//! Core data types for the skill system.

use std::fmt;
use std::path::PathBuf;

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::error::SkillError;
use crate::parser;
use crate::scripts::{ScriptDetector, ScriptMetadata};

/// Maximum size of invocation argument strings (1 MB).
pub const MAX_ARGUMENT_BYTES: usize = 1024 * 1024;

/// Placeholder substituted with invocation arguments in skill content.
const ARGUMENTS_PLACEHOLDER: &str = "$ARGUMENTS";

/// Kind of filesystem location a skill source points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// Project-local skills directory (highest priority).
    Project,
    /// Anthropic config directory (`.claude/skills`).
    AnthropicConfig,
    /// Plugin root with a `.claude-plugin/plugin.json` manifest.
    Plugin,
    /// Additional caller-supplied search path (lowest priority).
    Custom,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::AnthropicConfig => "anthropic_config",
            Self::Plugin => "plugin",
            Self::Custom => "custom",
        }
    }
}

/// A prioritized filesystem root scanned for skills.
///
/// Sources are immutable once the manager is built; their order is priority
/// descending with construction order breaking ties.
#[derive(Debug, Clone)]
pub struct SkillSource {
    pub source_type: SourceType,
    /// Absolute directory path. Exists at construction time.
    pub directory: PathBuf,
    pub priority: i32,
    /// Parsed plugin manifest, populated lazily during discovery for
    /// `Plugin` sources.
    pub plugin_manifest: Option<PluginManifest>,
}

/// Plugin descriptor parsed from `.claude-plugin/plugin.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginManifest {
    pub name: String,
    pub version: String,
    /// Plugin-root-relative skill directories, each scanned as an
    /// independent skill source.
    #[serde(default)]
    pub skills: Vec<String>,
}

/// Immutable metadata for one discovered skill.
///
/// Owned by the manager's registry keyed by `name`; lower-priority duplicates
/// are discarded during discovery, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillMetadata {
    /// Unique name within a merged registry.
    pub name: String,
    pub description: String,
    /// Absolute path to the SKILL.md manifest file.
    pub skill_path: PathBuf,
    pub version: Option<String>,
    /// Allowed tool identifiers. Empty means unrestricted.
    #[serde(default)]
    pub allowed_tools: Vec<String>,
}

/// Initialization mode of a [`crate::manager::SkillManager`].
///
/// Once a manager leaves `Uninitialized` the mode is fixed for its lifetime;
/// calls belonging to the other mode fail fast with [`SkillError::State`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitMode {
    Uninitialized,
    Sync,
    Async,
}

impl fmt::Display for InitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Uninitialized => "uninitialized",
            Self::Sync => "sync",
            Self::Async => "async",
        };
        f.write_str(s)
    }
}

/// A loaded skill: metadata plus its base directory, with a lazily computed,
/// memoized script list.
#[derive(Debug)]
pub struct Skill {
    pub metadata: SkillMetadata,
    /// Parent directory of the SKILL.md file.
    pub base_directory: PathBuf,
    scripts: OnceCell<Vec<ScriptMetadata>>,
}

impl Skill {
    /// Construct from registry metadata. Touches no filesystem beyond path
    /// arithmetic.
    pub fn new(metadata: SkillMetadata) -> Self {
        let base_directory = metadata
            .skill_path
            .parent()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        Self {
            metadata,
            base_directory,
            scripts: OnceCell::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Detected scripts for this skill.
    ///
    /// Detection runs once per `Skill` instance on first access and the
    /// result is memoized for the instance's lifetime.
    pub fn scripts(&self) -> &[ScriptMetadata] {
        self.scripts
            .get_or_init(|| ScriptDetector::default().detect_scripts(&self.base_directory))
    }

    /// Load the skill body and substitute invocation arguments.
    ///
    /// The returned prompt is prefixed with the skill's base directory so the
    /// consumer can resolve bundled file references. `$ARGUMENTS` in the body
    /// is replaced with `arguments`; if the placeholder is absent and
    /// arguments are non-empty they are appended on their own line.
    pub fn invoke(&self, arguments: &str) -> Result<String, SkillError> {
        if arguments.len() > MAX_ARGUMENT_BYTES {
            return Err(SkillError::ArgumentSize {
                size: arguments.len(),
                limit: MAX_ARGUMENT_BYTES,
            });
        }

        let content = std::fs::read_to_string(&self.metadata.skill_path).map_err(|source| {
            SkillError::ContentLoad {
                path: self.metadata.skill_path.clone(),
                source,
            }
        })?;
        let body = parser::skill_body(&content);

        let body = if body.contains(ARGUMENTS_PLACEHOLDER) {
            body.replace(ARGUMENTS_PLACEHOLDER, arguments)
        } else if !arguments.is_empty() {
            format!("{}\n\nArguments: {}", body.trim_end(), arguments)
        } else {
            body.to_string()
        };

        Ok(format!(
            "Base directory for this skill: {}\n\n{}",
            self.base_directory.display(),
            body
        ))
    }

    /// Async variant of [`Skill::invoke`]; the blocking file read runs on a
    /// worker thread.
    pub async fn ainvoke(&self, arguments: &str) -> Result<String, SkillError> {
        if arguments.len() > MAX_ARGUMENT_BYTES {
            return Err(SkillError::ArgumentSize {
                size: arguments.len(),
                limit: MAX_ARGUMENT_BYTES,
            });
        }

        let path = self.metadata.skill_path.clone();
        let content = tokio::task::spawn_blocking(move || std::fs::read_to_string(&path))
            .await
            .map_err(|e| SkillError::ContentLoad {
                path: self.metadata.skill_path.clone(),
                source: std::io::Error::other(e),
            })?
            .map_err(|source| SkillError::ContentLoad {
                path: self.metadata.skill_path.clone(),
                source,
            })?;
        let body = parser::skill_body(&content);

        let body = if body.contains(ARGUMENTS_PLACEHOLDER) {
            body.replace(ARGUMENTS_PLACEHOLDER, arguments)
        } else if !arguments.is_empty() {
            format!("{}\n\nArguments: {}", body.trim_end(), arguments)
        } else {
            body.to_string()
        };

        Ok(format!(
            "Base directory for this skill: {}\n\n{}",
            self.base_directory.display(),
            body
        ))
    }
}
