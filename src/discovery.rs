//! Locating SKILL.md manifests under prioritized source directories.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::parser;
use crate::types::{PluginManifest, SkillSource, SourceType};

/// Canonical manifest file name. Matching is case-insensitive on disk.
pub const SKILL_FILE_NAME: &str = "SKILL.md";

/// Plugin-root-relative path of the plugin descriptor.
pub const PLUGIN_MANIFEST_PATH: &str = ".claude-plugin/plugin.json";

/// Scans source directories for skill manifests. Stateless; all discovery
/// errors are recovered locally so one bad directory never aborts a scan.
#[derive(Debug, Clone, Copy, Default)]
pub struct SkillDiscovery;

impl SkillDiscovery {
    pub fn new() -> Self {
        Self
    }

    /// Discover skill manifest paths under one source.
    ///
    /// Plugin sources are scanned per manifest entry; a plugin without a
    /// valid manifest contributes nothing.
    pub fn discover_skills(&self, source: &SkillSource) -> Vec<PathBuf> {
        match source.source_type {
            SourceType::Plugin => self.discover_plugin_skills(source),
            _ => self.scan_directory(&source.directory),
        }
    }

    /// Async variant of [`SkillDiscovery::discover_skills`]; the directory
    /// walk runs on a blocking worker thread.
    pub async fn adiscover_skills(&self, source: &SkillSource) -> Vec<PathBuf> {
        let source = source.clone();
        match tokio::task::spawn_blocking(move || SkillDiscovery.discover_skills(&source)).await {
            Ok(paths) => paths,
            Err(err) => {
                if err.is_panic() {
                    std::panic::resume_unwind(err.into_panic());
                }
                warn!("async skill discovery task was cancelled");
                Vec::new()
            }
        }
    }

    /// One-level scan: each immediate subdirectory of `dir` is checked for a
    /// SKILL.md (first case-insensitive match wins). Nested skills are not
    /// searched.
    pub fn scan_directory(&self, dir: &Path) -> Vec<PathBuf> {
        let mut found = Vec::new();
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) => {
                warn!("cannot read skill source {}: {err}", dir.display());
                return found;
            }
        };

        for entry in entries {
            let entry = match entry {
                Ok(e) => e,
                Err(err) => {
                    warn!("skipping unreadable entry in {}: {err}", dir.display());
                    continue;
                }
            };
            let subdir = entry.path();
            if !subdir.is_dir() {
                continue;
            }
            if let Some(manifest) = find_skill_file(&subdir) {
                found.push(manifest);
            }
        }
        found
    }

    fn discover_plugin_skills(&self, source: &SkillSource) -> Vec<PathBuf> {
        let manifest = match source
            .plugin_manifest
            .clone()
            .or_else(|| discover_plugin_manifest(&source.directory))
        {
            Some(m) => m,
            None => {
                debug!(
                    "plugin at {} has no usable manifest, skipping",
                    source.directory.display()
                );
                return Vec::new();
            }
        };
        debug!(
            "scanning plugin '{}' v{} at {}",
            manifest.name,
            manifest.version,
            source.directory.display()
        );

        // Each manifest entry is a container directory that gets the same
        // one-level scan as any other source.
        let mut found = Vec::new();
        for entry in &manifest.skills {
            let skill_dir = source.directory.join(entry);
            if !skill_dir.is_dir() {
                warn!(
                    "plugin '{}' lists missing skill directory {}",
                    manifest.name,
                    skill_dir.display()
                );
                continue;
            }
            found.extend(self.scan_directory(&skill_dir));
        }
        found
    }
}

/// Parse the plugin descriptor for a plugin root. Invalid or absent
/// manifests disable the plugin rather than failing discovery.
pub fn discover_plugin_manifest(plugin_dir: &Path) -> Option<PluginManifest> {
    let manifest_path = plugin_dir.join(PLUGIN_MANIFEST_PATH);
    if !manifest_path.is_file() {
        return None;
    }
    match parser::parse_plugin_manifest(&manifest_path) {
        Ok(manifest) => Some(manifest),
        Err(err) => {
            warn!(
                "ignoring plugin at {}: {err}",
                plugin_dir.display()
            );
            None
        }
    }
}

/// First case-insensitive `SKILL.md` directly inside `dir`, if any.
fn find_skill_file(dir: &Path) -> Option<PathBuf> {
    let entries = std::fs::read_dir(dir).ok()?;
    for entry in entries.flatten() {
        let name = entry.file_name();
        let matches = name
            .to_str()
            .map(|n| n.eq_ignore_ascii_case(SKILL_FILE_NAME))
            .unwrap_or(false);
        if matches && entry.path().is_file() {
            return Some(entry.path());
        }
    }
    None
}
