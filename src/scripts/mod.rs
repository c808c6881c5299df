//! Script detection, description extraction, and validated execution.

pub mod describe;
pub mod detector;
pub mod executor;

pub use describe::ScriptDescriptionExtractor;
pub use detector::{ScriptDetector, ScriptMetadata, ScriptType};
pub use executor::{ScriptExecutionResult, ScriptExecutor, TIMEOUT_EXIT_CODE};
