//! Argument sanitizer for values that end up on a command line.
//!
//! Service install paths and provider-supplied identifiers are interpolated
//! into exec lines; this check rejects anything that could break out of a
//! single argument. It is a gate, not an escaper — callers that need shell
//! metacharacters must quote at the call site instead.

use crate::error::{NexusError, Result};

/// Characters that let a value chain or redirect command execution.
pub const SHELL_METACHARACTERS: &[char] = &[';', '&', '|', '`', '$', '<', '>'];

/// True when `arg` is safe to pass as a single command-line argument.
pub fn is_safe_argument(arg: &str) -> bool {
    check_argument(arg).is_ok()
}

/// Validate `arg`, returning the reason it was rejected.
///
/// An argument is safe iff it is non-empty, contains no NUL byte, no other
/// control characters, and none of [`SHELL_METACHARACTERS`].
pub fn check_argument(arg: &str) -> Result<()> {
    if arg.is_empty() {
        return Err(NexusError::InvalidInput("argument is empty".into()));
    }
    if arg.contains('\0') {
        return Err(NexusError::InvalidInput("argument contains a NUL byte".into()));
    }
    if let Some(c) = arg.chars().find(|c| c.is_control()) {
        return Err(NexusError::InvalidInput(format!(
            "argument contains control character U+{:04X}",
            c as u32
        )));
    }
    if let Some(c) = arg.chars().find(|c| SHELL_METACHARACTERS.contains(c)) {
        return Err(NexusError::InvalidInput(format!(
            "argument contains shell metacharacter `{c}`"
        )));
    }
    Ok(())
}
