//! Skill bundle discovery and secure script execution.
//!
//! A skill is a directory holding a `SKILL.md` manifest (YAML frontmatter
//! plus a Markdown prompt body) and optionally a `scripts/` directory of
//! helper scripts. This crate discovers skills across prioritized sources
//! (project, Anthropic config, plugins, custom paths), merges them into a
//! registry, renders skill prompts with argument substitution, and runs
//! bundled scripts through a validated subprocess pipeline.
//!
//! The entry point is [`SkillManager`]:
//!
//! ```no_run
//! use skillrunner::SkillManager;
//!
//! fn main() -> Result<(), skillrunner::SkillError> {
//!     let mut manager = SkillManager::builder()
//!         .project_dir("./skills")
//!         .build()?;
//!     manager.discover()?;
//!
//!     let prompt = manager.invoke_skill("pdf-extractor", "report.pdf")?;
//!     println!("{prompt}");
//!
//!     let result = manager.execute_skill_script(
//!         "pdf-extractor",
//!         "extract",
//!         &serde_json::json!({"file": "report.pdf"}),
//!     )?;
//!     println!("exit {}: {}", result.exit_code, result.stdout);
//!     Ok(())
//! }
//! ```
//!
//! Each manager is initialized in either sync or async mode by its first
//! discovery call and rejects calls of the other mode from then on.

pub mod discovery;
pub mod error;
pub mod manager;
pub mod parser;
pub mod scripts;
pub mod types;

pub use discovery::SkillDiscovery;
pub use error::SkillError;
pub use manager::{SkillManager, SkillManagerBuilder};
pub use scripts::{
    ScriptDescriptionExtractor, ScriptDetector, ScriptExecutionResult, ScriptExecutor,
    ScriptMetadata, ScriptType,
};
pub use types::{InitMode, PluginManifest, Skill, SkillMetadata, SkillSource, SourceType};
