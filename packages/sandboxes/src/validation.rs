// ABOUTME: Input validation for sandbox operations
// ABOUTME: Rejects malformed file batches and IDs before any remote call is made

use crate::error::{Result, SandboxError};
use crate::types::ProjectFile;

/// Validates a file batch before provisioning or synchronization.
///
/// The batch must be non-empty and every entry must carry a non-empty
/// path/content pair. Paths are also checked for traversal sequences since
/// they are interpolated into remote shell commands.
pub fn validate_file_batch(files: &[ProjectFile]) -> Result<()> {
    if files.is_empty() {
        return Err(SandboxError::Validation(
            "File batch cannot be empty".to_string(),
        ));
    }

    for file in files {
        if file.path.trim().is_empty() {
            return Err(SandboxError::Validation(
                "File entry is missing a path".to_string(),
            ));
        }
        if file.content.is_empty() {
            return Err(SandboxError::Validation(format!(
                "File '{}' has no content",
                file.path
            )));
        }
        if file.path.contains("..") {
            return Err(SandboxError::Validation(format!(
                "File path '{}' contains a traversal sequence",
                file.path
            )));
        }
        if file.path.contains('\0') || file.path.chars().any(|c| c.is_control()) {
            return Err(SandboxError::Validation(format!(
                "File path '{}' contains control characters",
                file.path
            )));
        }
    }

    Ok(())
}

/// Validates a sandbox ID supplied by a caller
pub fn validate_sandbox_id(sandbox_id: &str) -> Result<()> {
    if sandbox_id.is_empty() {
        return Err(SandboxError::Validation(
            "Sandbox ID cannot be empty".to_string(),
        ));
    }
    if !sandbox_id
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(SandboxError::Validation(format!(
            "Sandbox ID '{}' contains invalid characters",
            sandbox_id
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(path: &str, content: &str) -> ProjectFile {
        ProjectFile {
            path: path.to_string(),
            content: content.to_string(),
            file_type: None,
        }
    }

    #[test]
    fn test_empty_batch_rejected() {
        assert!(matches!(
            validate_file_batch(&[]),
            Err(SandboxError::Validation(_))
        ));
    }

    #[test]
    fn test_missing_content_rejected() {
        let files = vec![file("a", "")];
        assert!(matches!(
            validate_file_batch(&files),
            Err(SandboxError::Validation(_))
        ));
    }

    #[test]
    fn test_missing_path_rejected() {
        let files = vec![file("  ", "x")];
        assert!(validate_file_batch(&files).is_err());
    }

    #[test]
    fn test_valid_batch_accepted() {
        let files = vec![file("a", "x"), file("src/App.tsx", "export default 1;")];
        assert!(validate_file_batch(&files).is_ok());
    }

    #[test]
    fn test_traversal_rejected() {
        let files = vec![file("../etc/passwd", "x")];
        assert!(validate_file_batch(&files).is_err());
    }

    #[test]
    fn test_sandbox_id_validation() {
        assert!(validate_sandbox_id("sbx-123_abc").is_ok());
        assert!(validate_sandbox_id("").is_err());
        assert!(validate_sandbox_id("sbx/123").is_err());
        assert!(validate_sandbox_id("sbx 123").is_err());
    }
}
