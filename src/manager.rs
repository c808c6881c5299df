//! Skill registry management over prioritized sources.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{error, info, warn};

use crate::discovery::SkillDiscovery;
use crate::error::SkillError;
use crate::parser;
use crate::scripts::{ScriptExecutionResult, ScriptExecutor};
use crate::types::{InitMode, Skill, SkillMetadata, SkillSource, SourceType};

const PROJECT_PRIORITY: i32 = 100;
const ANTHROPIC_CONFIG_PRIORITY: i32 = 50;
const PLUGIN_PRIORITY: i32 = 10;
const CUSTOM_BASE_PRIORITY: i32 = 5;

const DEFAULT_PROJECT_DIR: &str = "skills";
const DEFAULT_ANTHROPIC_CONFIG_DIR: &str = ".claude/skills";

/// Configures the source set for a [`SkillManager`].
///
/// Explicitly supplied paths must exist at build time; the built-in defaults
/// are skipped silently when absent.
#[derive(Debug, Default)]
pub struct SkillManagerBuilder {
    project_dir: Option<PathBuf>,
    anthropic_config_dir: Option<PathBuf>,
    plugin_roots: Vec<PathBuf>,
    additional_paths: Vec<PathBuf>,
    executor: Option<ScriptExecutor>,
}

impl SkillManagerBuilder {
    pub fn project_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.project_dir = Some(path.into());
        self
    }

    pub fn anthropic_config_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.anthropic_config_dir = Some(path.into());
        self
    }

    /// Register a plugin root (the directory holding `.claude-plugin/`).
    pub fn plugin_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.plugin_roots.push(path.into());
        self
    }

    /// Register an extra search path, scanned after all built-in sources.
    pub fn additional_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.additional_paths.push(path.into());
        self
    }

    pub fn script_executor(mut self, executor: ScriptExecutor) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Validate the configured paths and assemble the prioritized source
    /// list. No skill discovery happens here.
    pub fn build(self) -> Result<SkillManager, SkillError> {
        let mut sources = Vec::new();

        match &self.project_dir {
            Some(path) => {
                let dir = resolve_explicit("project_dir", path)?;
                sources.push(make_source(SourceType::Project, dir, PROJECT_PRIORITY));
            }
            None => {
                if let Some(dir) = resolve_default(Path::new(DEFAULT_PROJECT_DIR)) {
                    sources.push(make_source(SourceType::Project, dir, PROJECT_PRIORITY));
                }
            }
        }

        match &self.anthropic_config_dir {
            Some(path) => {
                let dir = resolve_explicit("anthropic_config_dir", path)?;
                sources.push(make_source(
                    SourceType::AnthropicConfig,
                    dir,
                    ANTHROPIC_CONFIG_PRIORITY,
                ));
            }
            None => {
                if let Some(dir) = resolve_default(Path::new(DEFAULT_ANTHROPIC_CONFIG_DIR)) {
                    sources.push(make_source(
                        SourceType::AnthropicConfig,
                        dir,
                        ANTHROPIC_CONFIG_PRIORITY,
                    ));
                }
            }
        }

        for path in &self.plugin_roots {
            let dir = resolve_explicit("plugin_root", path)?;
            sources.push(make_source(SourceType::Plugin, dir, PLUGIN_PRIORITY));
        }

        for (index, path) in self.additional_paths.iter().enumerate() {
            let dir = resolve_explicit("additional_path", path)?;
            sources.push(make_source(
                SourceType::Custom,
                dir,
                CUSTOM_BASE_PRIORITY - index as i32,
            ));
        }

        // Stable sort keeps construction order among equal priorities.
        sources.sort_by(|a, b| b.priority.cmp(&a.priority));

        Ok(SkillManager {
            sources,
            skills: HashMap::new(),
            init_mode: InitMode::Uninitialized,
            executor: self.executor.unwrap_or_default(),
        })
    }
}

/// Owns the merged skill registry and dispatches invocation and script
/// execution.
///
/// A manager is initialized exactly once, by either [`SkillManager::discover`]
/// or [`SkillManager::adiscover`]; from then on only methods of that mode are
/// accepted.
#[derive(Debug)]
pub struct SkillManager {
    sources: Vec<SkillSource>,
    skills: HashMap<String, SkillMetadata>,
    init_mode: InitMode,
    executor: ScriptExecutor,
}

impl SkillManager {
    pub fn builder() -> SkillManagerBuilder {
        SkillManagerBuilder::default()
    }

    pub fn init_mode(&self) -> InitMode {
        self.init_mode
    }

    pub fn sources(&self) -> &[SkillSource] {
        &self.sources
    }

    /// Scan all sources and build the registry. Fixes the manager in sync
    /// mode. Returns the number of registered skills.
    pub fn discover(&mut self) -> Result<usize, SkillError> {
        if self.init_mode == InitMode::Async {
            return Err(SkillError::State {
                active: self.init_mode,
                requested: InitMode::Sync,
            });
        }
        self.skills = build_registry(&self.sources);
        self.init_mode = InitMode::Sync;
        info!(
            skills = self.skills.len(),
            sources = self.sources.len(),
            "skill discovery complete"
        );
        Ok(self.skills.len())
    }

    /// Async counterpart of [`SkillManager::discover`]; fixes the manager in
    /// async mode. The filesystem scan runs on a blocking worker thread.
    pub async fn adiscover(&mut self) -> Result<usize, SkillError> {
        if self.init_mode == InitMode::Sync {
            return Err(SkillError::State {
                active: self.init_mode,
                requested: InitMode::Async,
            });
        }
        let sources = self.sources.clone();
        let registry =
            match tokio::task::spawn_blocking(move || build_registry(&sources)).await {
                Ok(registry) => registry,
                Err(err) => {
                    if err.is_panic() {
                        std::panic::resume_unwind(err.into_panic());
                    }
                    warn!("async discovery task was cancelled");
                    HashMap::new()
                }
            };
        self.skills = registry;
        self.init_mode = InitMode::Async;
        info!(
            skills = self.skills.len(),
            sources = self.sources.len(),
            "skill discovery complete"
        );
        Ok(self.skills.len())
    }

    /// Registered skills, sorted by name.
    pub fn list_skills(&self) -> Vec<&SkillMetadata> {
        let mut skills: Vec<&SkillMetadata> = self.skills.values().collect();
        skills.sort_by(|a, b| a.name.cmp(&b.name));
        skills
    }

    pub fn get_skill(&self, name: &str) -> Result<&SkillMetadata, SkillError> {
        self.skills.get(name).ok_or_else(|| SkillError::SkillNotFound {
            name: name.to_string(),
            available: self.skill_names(),
        })
    }

    /// Materialize a [`Skill`] for the named registry entry.
    pub fn load_skill(&self, name: &str) -> Result<Skill, SkillError> {
        let metadata = self.get_skill(name)?;
        Ok(Skill::new(metadata.clone()))
    }

    /// Render the named skill's prompt with `arguments` substituted.
    pub fn invoke_skill(&self, name: &str, arguments: &str) -> Result<String, SkillError> {
        self.require_mode(InitMode::Sync)?;
        self.load_skill(name)?.invoke(arguments)
    }

    /// Async counterpart of [`SkillManager::invoke_skill`].
    pub async fn ainvoke_skill(&self, name: &str, arguments: &str) -> Result<String, SkillError> {
        self.require_mode(InitMode::Async)?;
        self.load_skill(name)?.ainvoke(arguments).await
    }

    /// Run a named script bundled with a skill, blocking until it finishes
    /// or times out.
    pub fn execute_skill_script(
        &self,
        skill_name: &str,
        script_name: &str,
        arguments: &serde_json::Value,
    ) -> Result<ScriptExecutionResult, SkillError> {
        self.require_mode(InitMode::Sync)?;
        let skill = self.load_skill(skill_name)?;
        let script = find_script(&skill, script_name)?;
        self.executor
            .execute(&script, arguments, &skill.base_directory, &skill.metadata)
    }

    /// Async counterpart of [`SkillManager::execute_skill_script`]; the
    /// subprocess runs on a blocking worker thread.
    pub async fn aexecute_skill_script(
        &self,
        skill_name: &str,
        script_name: &str,
        arguments: &serde_json::Value,
    ) -> Result<ScriptExecutionResult, SkillError> {
        self.require_mode(InitMode::Async)?;
        let skill = self.load_skill(skill_name)?;
        let script = find_script(&skill, script_name)?;

        let executor = self.executor.clone();
        let arguments = arguments.clone();
        let base_directory = skill.base_directory.clone();
        let metadata = skill.metadata.clone();
        let script_path = script.clone();
        match tokio::task::spawn_blocking(move || {
            executor.execute(&script_path, &arguments, &base_directory, &metadata)
        })
        .await
        {
            Ok(result) => result,
            Err(err) => {
                if err.is_panic() {
                    std::panic::resume_unwind(err.into_panic());
                }
                Err(SkillError::Spawn {
                    script,
                    source: std::io::Error::other(err),
                })
            }
        }
    }

    fn require_mode(&self, requested: InitMode) -> Result<(), SkillError> {
        if self.init_mode == requested {
            Ok(())
        } else {
            Err(SkillError::State {
                active: self.init_mode,
                requested,
            })
        }
    }

    fn skill_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.skills.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Resolve the relative path of a named script within a loaded skill.
fn find_script(skill: &Skill, script_name: &str) -> Result<PathBuf, SkillError> {
    let scripts = skill.scripts();
    scripts
        .iter()
        .find(|s| s.name == script_name)
        .map(|s| s.path.clone())
        .ok_or_else(|| SkillError::ScriptNotFound {
            script: script_name.to_string(),
            skill: skill.name().to_string(),
            detected: scripts.iter().map(|s| s.name.clone()).collect(),
        })
}

/// Merge skills from all sources. Sources arrive priority-descending, so the
/// first registration of a name wins and later duplicates are shadowed.
fn build_registry(sources: &[SkillSource]) -> HashMap<String, SkillMetadata> {
    let discovery = SkillDiscovery::new();
    let mut registry: HashMap<String, SkillMetadata> = HashMap::new();

    for source in sources {
        for manifest_path in discovery.discover_skills(source) {
            match parser::parse_skill_file(&manifest_path) {
                Ok(metadata) => {
                    if let Some(existing) = registry.get(&metadata.name) {
                        warn!(
                            "duplicate skill '{}' at {} shadowed by higher-priority entry at {}",
                            metadata.name,
                            metadata.skill_path.display(),
                            existing.skill_path.display()
                        );
                    } else {
                        registry.insert(metadata.name.clone(), metadata);
                    }
                }
                Err(err) => {
                    error!(
                        "failed to parse skill manifest {}: {err}",
                        manifest_path.display()
                    );
                }
            }
        }
    }
    registry
}

fn make_source(source_type: SourceType, directory: PathBuf, priority: i32) -> SkillSource {
    SkillSource {
        source_type,
        directory,
        priority,
        plugin_manifest: None,
    }
}

/// Expand, canonicalize, and require an explicitly configured directory.
fn resolve_explicit(parameter: &str, path: &Path) -> Result<PathBuf, SkillError> {
    let expanded = expand_tilde(path);
    match expanded.canonicalize() {
        Ok(dir) if dir.is_dir() => Ok(dir),
        _ => Err(SkillError::Configuration {
            parameter: parameter.to_string(),
            path: expanded,
        }),
    }
}

/// Default source locations are optional; absence is not an error.
fn resolve_default(path: &Path) -> Option<PathBuf> {
    let expanded = expand_tilde(path);
    match expanded.canonicalize() {
        Ok(dir) if dir.is_dir() => Some(dir),
        _ => None,
    }
}

fn expand_tilde(path: &Path) -> PathBuf {
    PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn make_skill(root: &Path, dir_name: &str, skill_name: &str) {
        let dir = root.join(dir_name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("SKILL.md"),
            format!("---\nname: {skill_name}\ndescription: test skill\n---\nBody of {skill_name}: $ARGUMENTS\n"),
        )
        .unwrap();
    }

    #[test]
    fn test_explicit_missing_path_is_configuration_error() {
        let err = SkillManager::builder()
            .project_dir("/nonexistent/skills")
            .build()
            .unwrap_err();
        assert!(matches!(err, SkillError::Configuration { .. }));
    }

    #[test]
    fn test_default_paths_silently_skipped() {
        let manager = SkillManager::builder().build().unwrap();
        // No error even though neither default directory need exist.
        assert_eq!(manager.init_mode(), InitMode::Uninitialized);
    }

    #[test]
    fn test_discovery_and_lookup() {
        let temp = TempDir::new().unwrap();
        make_skill(temp.path(), "pdf", "pdf-extractor");
        make_skill(temp.path(), "csv", "csv-tools");

        let mut manager = SkillManager::builder()
            .project_dir(temp.path())
            .build()
            .unwrap();
        assert_eq!(manager.discover().unwrap(), 2);
        assert_eq!(manager.init_mode(), InitMode::Sync);

        let names: Vec<&str> = manager.list_skills().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["csv-tools", "pdf-extractor"]);
        assert!(manager.get_skill("pdf-extractor").is_ok());
    }

    #[test]
    fn test_unknown_skill_lists_available() {
        let temp = TempDir::new().unwrap();
        make_skill(temp.path(), "pdf", "pdf-extractor");

        let mut manager = SkillManager::builder()
            .project_dir(temp.path())
            .build()
            .unwrap();
        manager.discover().unwrap();

        let err = manager.get_skill("missing").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("'missing'"));
        assert!(msg.contains("pdf-extractor"));
    }

    #[test]
    fn test_project_shadows_lower_priority_duplicate() {
        let project = TempDir::new().unwrap();
        let extra = TempDir::new().unwrap();
        make_skill(project.path(), "dup", "shared");
        make_skill(extra.path(), "dup", "shared");

        let mut manager = SkillManager::builder()
            .project_dir(project.path())
            .additional_path(extra.path())
            .build()
            .unwrap();
        manager.discover().unwrap();

        let skill = manager.get_skill("shared").unwrap();
        assert!(skill.skill_path.starts_with(project.path().canonicalize().unwrap()));
    }

    #[test]
    fn test_sources_ordered_by_priority() {
        let project = TempDir::new().unwrap();
        let config = TempDir::new().unwrap();
        let extra_a = TempDir::new().unwrap();
        let extra_b = TempDir::new().unwrap();

        let manager = SkillManager::builder()
            .additional_path(extra_a.path())
            .additional_path(extra_b.path())
            .anthropic_config_dir(config.path())
            .project_dir(project.path())
            .build()
            .unwrap();

        let priorities: Vec<i32> = manager.sources().iter().map(|s| s.priority).collect();
        assert_eq!(priorities, vec![100, 50, 5, 4]);
        assert_eq!(manager.sources()[0].source_type, SourceType::Project);
        // Equal-priority order follows registration order.
        let a = extra_a.path().canonicalize().unwrap();
        assert_eq!(manager.sources()[2].directory, a);
    }

    #[test]
    fn test_invoke_skill_substitutes_arguments() {
        let temp = TempDir::new().unwrap();
        make_skill(temp.path(), "pdf", "pdf-extractor");

        let mut manager = SkillManager::builder()
            .project_dir(temp.path())
            .build()
            .unwrap();
        manager.discover().unwrap();

        let prompt = manager.invoke_skill("pdf-extractor", "report.pdf").unwrap();
        assert!(prompt.starts_with("Base directory for this skill: "));
        assert!(prompt.contains("Body of pdf-extractor: report.pdf"));
    }

    #[test]
    fn test_sync_manager_rejects_async_calls() {
        let temp = TempDir::new().unwrap();
        make_skill(temp.path(), "pdf", "pdf-extractor");

        let mut manager = SkillManager::builder()
            .project_dir(temp.path())
            .build()
            .unwrap();
        manager.discover().unwrap();

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let err = runtime
            .block_on(manager.ainvoke_skill("pdf-extractor", ""))
            .unwrap_err();
        assert!(matches!(
            err,
            SkillError::State {
                active: InitMode::Sync,
                requested: InitMode::Async,
            }
        ));
        let err = runtime.block_on(manager.adiscover()).unwrap_err();
        assert!(matches!(err, SkillError::State { .. }));
    }

    #[tokio::test]
    async fn test_async_manager_rejects_sync_calls() {
        let temp = TempDir::new().unwrap();
        make_skill(temp.path(), "pdf", "pdf-extractor");

        let mut manager = SkillManager::builder()
            .project_dir(temp.path())
            .build()
            .unwrap();
        manager.adiscover().await.unwrap();
        assert_eq!(manager.init_mode(), InitMode::Async);

        let err = manager.invoke_skill("pdf-extractor", "").unwrap_err();
        assert!(matches!(
            err,
            SkillError::State {
                active: InitMode::Async,
                requested: InitMode::Sync,
            }
        ));
        assert!(matches!(manager.discover(), Err(SkillError::State { .. })));

        // Async calls keep working.
        let prompt = manager.ainvoke_skill("pdf-extractor", "x").await.unwrap();
        assert!(prompt.contains("Body of pdf-extractor: x"));
    }

    #[test]
    fn test_uninitialized_manager_rejects_invocation() {
        let manager = SkillManager::builder().build().unwrap();
        let err = manager.invoke_skill("anything", "").unwrap_err();
        assert!(matches!(
            err,
            SkillError::State {
                active: InitMode::Uninitialized,
                ..
            }
        ));
    }

    #[test]
    fn test_execute_unknown_script_lists_detected() {
        let temp = TempDir::new().unwrap();
        make_skill(temp.path(), "pdf", "pdf-extractor");
        let scripts_dir = temp.path().join("pdf/scripts");
        fs::create_dir_all(&scripts_dir).unwrap();
        fs::write(scripts_dir.join("extract.py"), "print('ok')\n").unwrap();

        let mut manager = SkillManager::builder()
            .project_dir(temp.path())
            .build()
            .unwrap();
        manager.discover().unwrap();

        let err = manager
            .execute_skill_script("pdf-extractor", "ghost", &serde_json::json!({}))
            .unwrap_err();
        match err {
            SkillError::ScriptNotFound { detected, .. } => {
                assert_eq!(detected, vec!["extract".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_execute_skill_script_end_to_end() {
        let temp = TempDir::new().unwrap();
        make_skill(temp.path(), "pdf", "pdf-extractor");
        let scripts_dir = temp.path().join("pdf/scripts");
        fs::create_dir_all(&scripts_dir).unwrap();
        fs::write(
            scripts_dir.join("extract.py"),
            "import sys, json\nprint(json.load(sys.stdin)['file'])\n",
        )
        .unwrap();

        let mut manager = SkillManager::builder()
            .project_dir(temp.path())
            .build()
            .unwrap();
        manager.discover().unwrap();

        let result = manager
            .execute_skill_script(
                "pdf-extractor",
                "extract",
                &serde_json::json!({"file": "report.pdf"}),
            )
            .unwrap();
        assert!(result.success());
        assert_eq!(result.stdout.trim(), "report.pdf");
    }

    #[tokio::test]
    async fn test_aexecute_skill_script() {
        let temp = TempDir::new().unwrap();
        make_skill(temp.path(), "pdf", "pdf-extractor");
        let scripts_dir = temp.path().join("pdf/scripts");
        fs::create_dir_all(&scripts_dir).unwrap();
        fs::write(scripts_dir.join("ok.sh"), "echo done\n").unwrap();

        let mut manager = SkillManager::builder()
            .project_dir(temp.path())
            .build()
            .unwrap();
        manager.adiscover().await.unwrap();

        let result = manager
            .aexecute_skill_script("pdf-extractor", "ok", &serde_json::json!({}))
            .await
            .unwrap();
        assert!(result.success());
        assert_eq!(result.stdout.trim(), "done");
    }
}
