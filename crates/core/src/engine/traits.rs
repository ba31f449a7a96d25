//! Trait definitions for the engine module.

use async_trait::async_trait;
use std::sync::Arc;

use super::error::EngineError;

/// Result of a single engine invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutcome {
    /// Process exit code (`-1` when the process was killed by a signal).
    pub exit_code: i32,
    /// Diagnostic log emitted by the engine.
    pub log: String,
}

impl ExecOutcome {
    /// Whether the invocation succeeded.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// The last `lines` lines of the log, for error reports.
    pub fn log_tail(&self, lines: usize) -> String {
        let all: Vec<&str> = self.log.lines().collect();
        let start = all.len().saturating_sub(lines);
        all[start..].join("\n")
    }
}

/// An isolated codec engine instance with a private virtual filesystem.
///
/// File names are flat entry names inside the instance's namespace. Two
/// instances never observe each other's entries.
#[async_trait]
pub trait CodecEngine: Send + Sync {
    /// Label of the namespace this instance is bound to.
    fn namespace(&self) -> &str;

    /// Writes (or replaces) an entry.
    async fn write_file(&self, name: &str, data: &[u8]) -> Result<(), EngineError>;

    /// Reads an entry.
    async fn read_file(&self, name: &str) -> Result<Vec<u8>, EngineError>;

    /// Deletes an entry.
    async fn delete_file(&self, name: &str) -> Result<(), EngineError>;

    /// Lists the entries currently present, sorted by name.
    async fn list_files(&self) -> Result<Vec<String>, EngineError>;

    /// Runs the engine with the given arguments inside the namespace.
    ///
    /// A non-zero exit is reported through [`ExecOutcome`], not as an error.
    async fn exec(&self, args: &[String]) -> Result<ExecOutcome, EngineError>;
}

/// Creates engine instances, one per namespace.
#[async_trait]
pub trait EngineFactory: Send + Sync {
    /// Creates an engine bound to `namespace` inside the job scope `scope`.
    async fn create(&self, scope: &str, namespace: &str)
        -> Result<Arc<dyn CodecEngine>, EngineError>;

    /// Releases every namespace created under `scope`.
    async fn release_scope(&self, scope: &str) -> Result<(), EngineError>;
}

/// Rejects names that could escape a namespace.
pub fn validate_name(name: &str) -> Result<(), EngineError> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0')
    {
        return Err(EngineError::invalid_name(name));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_name() {
        assert!(validate_name("chunk_0.mp4").is_ok());
        assert!(validate_name("concat_list.txt").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("..").is_err());
        assert!(validate_name("../escape.mp4").is_err());
        assert!(validate_name("dir\\file").is_err());
    }

    #[test]
    fn test_log_tail() {
        let outcome = ExecOutcome {
            exit_code: 1,
            log: "a\nb\nc\nd".to_string(),
        };
        assert!(!outcome.success());
        assert_eq!(outcome.log_tail(2), "c\nd");
        assert_eq!(outcome.log_tail(10), "a\nb\nc\nd");
    }
}
