//! Process exit codes for the CLI driver.

/// Exit codes distinguishing the interesting terminal states:
/// - 0: completed, duplicates found (or scan completed)
/// - 1: unexpected failure
/// - 2: completed, no duplicates found
/// - 3: completed with non-fatal per-file errors
/// - 130: interrupted by the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    /// Completed normally.
    Success = 0,
    /// An unexpected error occurred.
    GeneralError = 1,
    /// Completed normally, but no duplicates were found.
    NoDuplicates = 2,
    /// Completed, but some files were skipped due to errors.
    PartialSuccess = 3,
    /// Interrupted by the user (Ctrl+C).
    Interrupted = 130,
}

impl ExitCode {
    /// Numeric process exit code.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_values() {
        assert_eq!(ExitCode::Success.as_i32(), 0);
        assert_eq!(ExitCode::GeneralError.as_i32(), 1);
        assert_eq!(ExitCode::NoDuplicates.as_i32(), 2);
        assert_eq!(ExitCode::PartialSuccess.as_i32(), 3);
        assert_eq!(ExitCode::Interrupted.as_i32(), 130);
    }
}
