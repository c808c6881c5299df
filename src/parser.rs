//! SKILL.md frontmatter and plugin manifest parsing.
//!
//! A skill manifest is a markdown document starting with a YAML frontmatter
//! block delimited by `---` lines. Required fields are `name` and
//! `description`; `version` and `allowed-tools` are optional. Plugin
//! manifests are JSON documents at a fixed path under the plugin root.

use std::path::Path;

use serde::Deserialize;

use crate::error::SkillError;
use crate::types::{PluginManifest, SkillMetadata};

/// Maximum plugin manifest size accepted before parsing (1 MB).
const MAX_MANIFEST_BYTES: u64 = 1024 * 1024;

/// Raw frontmatter structure for deserialization.
#[derive(Debug, Deserialize)]
struct SkillFrontmatter {
    name: Option<String>,
    description: Option<String>,
    version: Option<String>,
    #[serde(rename = "allowed-tools")]
    allowed_tools: Option<AllowedTools>,
}

/// `allowed-tools` appears either as a YAML list or as a single
/// whitespace-separated string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AllowedTools {
    List(Vec<String>),
    Flat(String),
}

impl AllowedTools {
    fn into_vec(self) -> Vec<String> {
        match self {
            Self::List(items) => items,
            Self::Flat(s) => s.split_whitespace().map(str::to_string).collect(),
        }
    }
}

/// Parse a SKILL.md file from disk into validated metadata.
pub fn parse_skill_file(path: &Path) -> Result<SkillMetadata, SkillError> {
    let content = std::fs::read_to_string(path).map_err(|source| SkillError::ContentLoad {
        path: path.to_path_buf(),
        source,
    })?;
    parse_skill_content(&content, path)
}

/// Parse SKILL.md content into validated metadata.
pub fn parse_skill_content(content: &str, path: &Path) -> Result<SkillMetadata, SkillError> {
    let frontmatter = split_frontmatter(content).ok_or_else(|| SkillError::InvalidFrontmatter {
        path: path.to_path_buf(),
        reason: "missing or unclosed YAML frontmatter (--- delimiters)".to_string(),
    })?;

    let fm: SkillFrontmatter =
        serde_yaml::from_str(frontmatter).map_err(|e| SkillError::InvalidFrontmatter {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    let name = fm
        .name
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| SkillError::MissingRequiredField {
            path: path.to_path_buf(),
            field: "name".to_string(),
        })?;
    let description = fm
        .description
        .filter(|d| !d.trim().is_empty())
        .ok_or_else(|| SkillError::MissingRequiredField {
            path: path.to_path_buf(),
            field: "description".to_string(),
        })?;

    let skill_path = path
        .canonicalize()
        .unwrap_or_else(|_| path.to_path_buf());

    Ok(SkillMetadata {
        name,
        description,
        skill_path,
        version: fm.version,
        allowed_tools: fm.allowed_tools.map(AllowedTools::into_vec).unwrap_or_default(),
    })
}

/// Extract the frontmatter block. Returns `None` when the content does not
/// start with a closed `---` pair or the block is empty.
fn split_frontmatter(content: &str) -> Option<&str> {
    let content = content.trim_start();
    let rest = content.strip_prefix("---")?;
    let closing = rest.find("\n---")?;
    let frontmatter = rest[..closing].trim();
    if frontmatter.is_empty() {
        None
    } else {
        Some(frontmatter)
    }
}

/// Markdown body after the frontmatter block. Content without valid
/// frontmatter is returned whole.
pub fn skill_body(content: &str) -> &str {
    let trimmed = content.trim_start();
    if let Some(rest) = trimmed.strip_prefix("---") {
        if let Some(closing) = rest.find("\n---") {
            return rest[closing + 4..].trim_start_matches(['\r', '\n']);
        }
    }
    content
}

/// Parse and validate a plugin manifest file.
///
/// Validation covers required fields (`name`, `version`) and skill directory
/// entries, which must be plugin-root-relative without traversal components.
pub fn parse_plugin_manifest(path: &Path) -> Result<PluginManifest, SkillError> {
    let size = std::fs::metadata(path)
        .map(|m| m.len())
        .unwrap_or(0);
    if size > MAX_MANIFEST_BYTES {
        return Err(SkillError::ManifestInvalid {
            path: path.to_path_buf(),
            reason: format!("manifest exceeds {} bytes", MAX_MANIFEST_BYTES),
        });
    }

    let content = std::fs::read_to_string(path).map_err(|e| SkillError::ManifestInvalid {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let manifest: PluginManifest =
        serde_json::from_str(&content).map_err(|e| SkillError::ManifestInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    if manifest.name.trim().is_empty() {
        return Err(SkillError::ManifestInvalid {
            path: path.to_path_buf(),
            reason: "missing required field 'name'".to_string(),
        });
    }
    if manifest.version.trim().is_empty() {
        return Err(SkillError::ManifestInvalid {
            path: path.to_path_buf(),
            reason: "missing required field 'version'".to_string(),
        });
    }
    for entry in &manifest.skills {
        let p = Path::new(entry);
        if p.is_absolute() || p.components().any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return Err(SkillError::ManifestInvalid {
                path: path.to_path_buf(),
                reason: format!("skill directory entry escapes plugin root: {}", entry),
            });
        }
    }

    Ok(manifest)
}
