//! Validated git commit identifiers.
//!
//! Preview namespaces, work directories and render jobs are all keyed by the
//! commit id, so anything that reaches the filesystem or the git executable has
//! to pass through [`CommitHash::parse`] first. Abbreviated ids are accepted;
//! they are normalised to lowercase but never expanded.

use std::fmt;

use thiserror::Error;

const MIN_COMMIT_LEN: usize = 4;
const MAX_COMMIT_LEN: usize = 64;

/// Errors raised while validating a commit identifier.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommitError {
    #[error("commit id is empty")]
    Empty,
    #[error("commit id `{input}` must be between {MIN_COMMIT_LEN} and {MAX_COMMIT_LEN} characters")]
    Length { input: String },
    #[error("commit id `{input}` is not hexadecimal")]
    NotHex { input: String },
}

/// A hexadecimal git object id, lowercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommitHash(String);

impl CommitHash {
    pub fn parse(input: &str) -> Result<Self, CommitError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(CommitError::Empty);
        }

        if !(MIN_COMMIT_LEN..=MAX_COMMIT_LEN).contains(&trimmed.len()) {
            return Err(CommitError::Length {
                input: trimmed.to_string(),
            });
        }

        if !trimmed.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(CommitError::NotHex {
                input: trimmed.to_string(),
            });
        }

        Ok(Self(trimmed.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CommitHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CommitHash {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_full_and_abbreviated_ids() {
        let full = CommitHash::parse("0123456789abcdef0123456789abcdef01234567").expect("full id");
        assert_eq!(full.as_str().len(), 40);

        let short = CommitHash::parse("abc1").expect("short id");
        assert_eq!(short.as_str(), "abc1");
    }

    #[test]
    fn normalises_to_lowercase() {
        let commit = CommitHash::parse(" DEADBEEF ").expect("valid id");
        assert_eq!(commit.to_string(), "deadbeef");
    }

    #[test]
    fn rejects_path_like_input() {
        assert!(matches!(
            CommitHash::parse("../etc"),
            Err(CommitError::NotHex { .. })
        ));
        assert!(matches!(
            CommitHash::parse("main/branch"),
            Err(CommitError::NotHex { .. })
        ));
    }

    #[test]
    fn rejects_empty_and_out_of_range_lengths() {
        assert_eq!(CommitHash::parse("   "), Err(CommitError::Empty));
        assert!(matches!(
            CommitHash::parse("abc"),
            Err(CommitError::Length { .. })
        ));
        assert!(matches!(
            CommitHash::parse(&"a".repeat(65)),
            Err(CommitError::Length { .. })
        ));
    }
}
