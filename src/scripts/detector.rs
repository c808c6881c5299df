//! Filesystem scan for executable helper scripts bundled with a skill.

use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::describe::ScriptDescriptionExtractor;

/// Directory names never descended into during a scripts scan.
const EXCLUDED_DIRS: &[&str] = &["__pycache__", "node_modules", ".venv", "venv"];

/// Root-level file extensions that are documentation or data, not scripts.
const EXCLUDED_ROOT_EXTENSIONS: &[&str] = &["md", "txt", "json"];

/// Kind of script, inferred from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptType {
    Python,
    Shell,
    Javascript,
    Ruby,
    Perl,
    Batch,
    Powershell,
}

impl ScriptType {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "py" => Some(Self::Python),
            "sh" => Some(Self::Shell),
            "js" => Some(Self::Javascript),
            "rb" => Some(Self::Ruby),
            "pl" => Some(Self::Perl),
            "bat" | "cmd" => Some(Self::Batch),
            "ps1" => Some(Self::Powershell),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Python => "python",
            Self::Shell => "shell",
            Self::Javascript => "javascript",
            Self::Ruby => "ruby",
            Self::Perl => "perl",
            Self::Batch => "batch",
            Self::Powershell => "powershell",
        }
    }
}

/// A discovered script, addressed by its stem name within the skill.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptMetadata {
    /// File stem, used to select the script for execution.
    pub name: String,
    /// Path relative to the skill's base directory.
    pub path: PathBuf,
    pub script_type: ScriptType,
    pub description: String,
}

impl ScriptMetadata {
    /// `<skill>.<script>` form used in logs and listings.
    pub fn qualified_name(&self, skill_name: &str) -> String {
        format!("{}.{}", skill_name, self.name)
    }
}

/// Scans a skill's base directory for runnable scripts: the `scripts/`
/// subtree up to a bounded depth, plus loose scripts next to the manifest.
#[derive(Debug, Clone)]
pub struct ScriptDetector {
    max_depth: usize,
    max_description_lines: usize,
    extractor: ScriptDescriptionExtractor,
}

impl Default for ScriptDetector {
    fn default() -> Self {
        Self {
            max_depth: 5,
            max_description_lines: 50,
            extractor: ScriptDescriptionExtractor::default(),
        }
    }
}

impl ScriptDetector {
    pub fn new(max_depth: usize) -> Self {
        Self {
            max_depth,
            ..Self::default()
        }
    }

    /// Detect all scripts under `base_dir`. Unreadable entries are skipped
    /// with a warning; the scan itself never fails.
    pub fn detect_scripts(&self, base_dir: &Path) -> Vec<ScriptMetadata> {
        let start = Instant::now();
        let mut scripts = Vec::new();

        let scripts_dir = base_dir.join("scripts");
        if scripts_dir.is_dir() {
            self.scan_scripts_dir(base_dir, &scripts_dir, &mut scripts);
        }
        self.scan_root(base_dir, &mut scripts);

        info!(
            base_dir = %base_dir.display(),
            count = scripts.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "script detection complete"
        );
        scripts
    }

    /// Walk `scripts/` up to the configured depth. A script at depth 0 is a
    /// direct child of `scripts/`, so the walker is allowed one extra level.
    fn scan_scripts_dir(&self, base_dir: &Path, scripts_dir: &Path, out: &mut Vec<ScriptMetadata>) {
        let walker = WalkDir::new(scripts_dir)
            .min_depth(1)
            .max_depth(self.max_depth + 1)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| !is_excluded(entry.file_name(), entry.path_is_symlink()));

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(err) => {
                    warn!("skipping unreadable entry under {}: {err}", scripts_dir.display());
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            if let Some(metadata) = self.build_metadata(base_dir, entry.path()) {
                out.push(metadata);
            }
        }
    }

    /// Non-recursive scan of the base directory itself for loose scripts.
    fn scan_root(&self, base_dir: &Path, out: &mut Vec<ScriptMetadata>) {
        let entries = match std::fs::read_dir(base_dir) {
            Ok(entries) => entries,
            Err(err) => {
                warn!("cannot read skill directory {}: {err}", base_dir.display());
                return;
            }
        };

        for entry in entries {
            let entry = match entry {
                Ok(e) => e,
                Err(err) => {
                    warn!("skipping unreadable entry in {}: {err}", base_dir.display());
                    continue;
                }
            };
            let file_name = entry.file_name();
            let path = entry.path();

            let is_symlink = path
                .symlink_metadata()
                .map(|m| m.file_type().is_symlink())
                .unwrap_or(true);
            if is_excluded(&file_name, is_symlink) || !path.is_file() {
                continue;
            }
            let ext = match path.extension().and_then(|e| e.to_str()) {
                Some(ext) => ext.to_ascii_lowercase(),
                None => continue,
            };
            if EXCLUDED_ROOT_EXTENSIONS.contains(&ext.as_str()) {
                continue;
            }
            if let Some(metadata) = self.build_metadata(base_dir, &path) {
                out.push(metadata);
            }
        }
    }

    fn build_metadata(&self, base_dir: &Path, path: &Path) -> Option<ScriptMetadata> {
        let ext = path.extension().and_then(|e| e.to_str())?;
        let script_type = ScriptType::from_extension(ext)?;
        let name = path.file_stem()?.to_str()?.to_string();
        let relative = match path.strip_prefix(base_dir) {
            Ok(rel) => rel.to_path_buf(),
            Err(_) => {
                debug!("script {} escapes base dir, skipping", path.display());
                return None;
            }
        };
        let description = self
            .extractor
            .extract(path, script_type, self.max_description_lines);
        Some(ScriptMetadata {
            name,
            path: relative,
            script_type,
            description,
        })
    }
}

/// Dot-prefixed names, cache directories, and symlinks are never scanned.
fn is_excluded(file_name: &std::ffi::OsStr, is_symlink: bool) -> bool {
    if is_symlink {
        return true;
    }
    match file_name.to_str() {
        Some(name) => name.starts_with('.') || EXCLUDED_DIRS.contains(&name),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    fn names(scripts: &[ScriptMetadata]) -> Vec<&str> {
        let mut v: Vec<&str> = scripts.iter().map(|s| s.name.as_str()).collect();
        v.sort();
        v
    }

    #[test]
    fn test_detects_scripts_in_scripts_dir() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "scripts/extract.py", "\"\"\"Extract text\"\"\"\n");
        write(temp.path(), "scripts/backup.sh", "# Backup\ntrue\n");

        let scripts = ScriptDetector::default().detect_scripts(temp.path());
        assert_eq!(names(&scripts), vec!["backup", "extract"]);

        let extract = scripts.iter().find(|s| s.name == "extract").unwrap();
        assert_eq!(extract.script_type, ScriptType::Python);
        assert_eq!(extract.path, PathBuf::from("scripts/extract.py"));
        assert_eq!(extract.description, "Extract text");
    }

    #[test]
    fn test_detects_root_level_scripts() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "SKILL.md", "---\nname: x\n---\n");
        write(temp.path(), "helper.py", "");
        write(temp.path(), "notes.txt", "not a script");
        write(temp.path(), "data.json", "{}");

        let scripts = ScriptDetector::default().detect_scripts(temp.path());
        assert_eq!(names(&scripts), vec!["helper"]);
    }

    #[test]
    fn test_depth_boundary_inclusive() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "scripts/a/b/deep.py", "");

        // Script depth is 2 (two directories below scripts/).
        let found = ScriptDetector::new(2).detect_scripts(temp.path());
        assert_eq!(names(&found), vec!["deep"]);

        let missed = ScriptDetector::new(1).detect_scripts(temp.path());
        assert!(missed.is_empty());
    }

    #[test]
    fn test_excludes_hidden_and_cache_dirs() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "scripts/run.py", "");
        write(temp.path(), "scripts/.hidden.py", "");
        write(temp.path(), "scripts/__pycache__/cached.py", "");
        write(temp.path(), "scripts/node_modules/dep.js", "");
        write(temp.path(), "scripts/.git/hook.sh", "");

        let scripts = ScriptDetector::default().detect_scripts(temp.path());
        assert_eq!(names(&scripts), vec!["run"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_are_never_reported() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "scripts/real.py", "");
        std::os::unix::fs::symlink(
            temp.path().join("scripts/real.py"),
            temp.path().join("scripts/link.py"),
        )
        .unwrap();

        let scripts = ScriptDetector::default().detect_scripts(temp.path());
        assert_eq!(names(&scripts), vec!["real"]);
    }

    #[test]
    fn test_unknown_extensions_skipped() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "scripts/tool.py", "");
        write(temp.path(), "scripts/library.so", "");
        write(temp.path(), "scripts/README", "");

        let scripts = ScriptDetector::default().detect_scripts(temp.path());
        assert_eq!(names(&scripts), vec!["tool"]);
    }

    #[test]
    fn test_missing_scripts_dir_scans_root_only() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "solo.sh", "# Lone script\n");

        let scripts = ScriptDetector::default().detect_scripts(temp.path());
        assert_eq!(names(&scripts), vec!["solo"]);
    }

    #[test]
    fn test_qualified_name() {
        let meta = ScriptMetadata {
            name: "extract".into(),
            path: PathBuf::from("scripts/extract.py"),
            script_type: ScriptType::Python,
            description: String::new(),
        };
        assert_eq!(meta.qualified_name("pdf-tools"), "pdf-tools.extract");
    }
}
