//! core type-safe identifiers and validated names.
//!
//! every id that crosses a component boundary gets its own newtype so a
//! commit id can never be passed where a merge request id is expected.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::VcsError;

/// generate a fresh lowercase ULID string
fn generate_token() -> String {
    ulid::Ulid::new().to_string().to_lowercase()
}

/// Identifier of a repository, the namespace for commits and branches.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RepositoryId(String);

impl RepositoryId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a new ULID-based repository id.
    pub fn generate() -> Self {
        Self(generate_token())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RepositoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a commit.
///
/// Commit ids are opaque monotonic tokens, not hashes of the commit body.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommitId(String);

impl CommitId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a new ULID-based commit id.
    pub fn generate() -> Self {
        Self(generate_token())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// short form of the commit id (last 8 chars, the random part of a ULID)
    pub fn short(&self) -> &str {
        let start = self.0.len().saturating_sub(8);
        &self.0[start..]
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a merge request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MergeRequestId(String);

impl MergeRequestId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(generate_token())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MergeRequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque actor id supplied by the identity provider. Recorded, never checked.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(String);

impl ActorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ActorId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Content hash of a file body: the git blob object id, hex encoded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentHash(String);

impl ContentHash {
    /// number of hex digits in a hash
    pub const HEX_LEN: usize = 40;

    /// Parse a hash from its hex form, normalizing to lowercase.
    pub fn parse(hex: &str) -> Result<Self, InvalidNameError> {
        if hex.is_empty() {
            return Err(InvalidNameError::Empty);
        }
        if hex.len() != Self::HEX_LEN {
            return Err(InvalidNameError::InvalidHash(hex.to_string()));
        }
        if let Some((position, c)) = hex.chars().enumerate().find(|(_, c)| !c.is_ascii_hexdigit()) {
            return Err(InvalidNameError::InvalidCharacter { char: c, position });
        }
        Ok(Self(hex.to_ascii_lowercase()))
    }

    /// Hash a byte sequence the way git hashes a blob.
    pub fn compute(bytes: &[u8]) -> Result<Self, git2::Error> {
        let oid = git2::Oid::hash_object(git2::ObjectType::Blob, bytes)?;
        Ok(Self::from_oid(oid))
    }

    pub(crate) fn from_oid(oid: git2::Oid) -> Self {
        Self(oid.to_string())
    }

    pub(crate) fn to_oid(&self) -> Result<git2::Oid, git2::Error> {
        git2::Oid::from_str(&self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn short(&self) -> &str {
        &self.0[..7]
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for ContentHash {
    type Error = InvalidNameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ContentHash> for String {
    fn from(value: ContentHash) -> Self {
        value.0
    }
}

impl FromStr for ContentHash {
    type Err = VcsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).map_err(|e| VcsError::invalid_hash(s, e))
    }
}

/// A validated branch name.
///
/// Valid names:
/// - 1-255 bytes
/// - no whitespace or control characters
/// - no `..`, no leading or trailing `/`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BranchName(String);

impl BranchName {
    /// the conventional default branch
    pub const MAIN: &'static str = "main";

    pub fn new(name: impl Into<String>) -> Result<Self, InvalidNameError> {
        let name = name.into();
        Self::validate(&name)?;
        Ok(Self(name))
    }

    fn validate(name: &str) -> Result<(), InvalidNameError> {
        if name.is_empty() {
            return Err(InvalidNameError::Empty);
        }
        if name.len() > 255 {
            return Err(InvalidNameError::TooLong(name.len()));
        }
        for (i, c) in name.chars().enumerate() {
            if c.is_whitespace() || c.is_control() || c == '\\' {
                return Err(InvalidNameError::InvalidCharacter { char: c, position: i });
            }
        }
        if name.contains("..") || name.contains("//") || name.starts_with('/') || name.ends_with('/') {
            return Err(InvalidNameError::InvalidPath(name.to_string()));
        }
        Ok(())
    }

    pub fn main() -> Self {
        Self(Self::MAIN.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BranchName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for BranchName {
    type Error = InvalidNameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<BranchName> for String {
    fn from(value: BranchName) -> Self {
        value.0
    }
}

impl FromStr for BranchName {
    type Err = VcsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s).map_err(|e| VcsError::invalid_branch(s, e))
    }
}

/// A normalized repository-relative file path.
///
/// Always forward-slash separated with no leading slash, no empty segments
/// and no `.`/`..` segments. Backslashes are accepted on input and folded
/// into `/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FilePath(String);

impl FilePath {
    pub fn new(path: impl AsRef<str>) -> Result<Self, InvalidNameError> {
        let raw = path.as_ref();
        let unified = raw.replace('\\', "/");
        let trimmed = unified.trim_start_matches('/');

        if trimmed.is_empty() {
            return Err(InvalidNameError::Empty);
        }
        if trimmed.ends_with('/') {
            return Err(InvalidNameError::InvalidPath(raw.to_string()));
        }
        for segment in trimmed.split('/') {
            if segment.is_empty() || segment == "." || segment == ".." {
                return Err(InvalidNameError::InvalidSegment(segment.to_string()));
            }
            if let Some((position, c)) = segment.chars().enumerate().find(|(_, c)| c.is_control()) {
                return Err(InvalidNameError::InvalidCharacter { char: c, position });
            }
        }

        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// iterate the `/`-delimited segments
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }

    /// number of segments, `a/b.txt` has depth 2
    pub fn depth(&self) -> usize {
        self.0.split('/').count()
    }

    /// the final segment
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for FilePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for FilePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for FilePath {
    type Error = InvalidNameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<FilePath> for String {
    fn from(value: FilePath) -> Self {
        value.0
    }
}

impl FromStr for FilePath {
    type Err = VcsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s).map_err(|e| VcsError::invalid_path(s, e))
    }
}

/// error type for invalid names (branches, paths, hashes)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidNameError {
    Empty,
    TooLong(usize),
    InvalidCharacter { char: char, position: usize },
    InvalidSegment(String),
    InvalidPath(String),
    InvalidHash(String),
}

impl fmt::Display for InvalidNameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "name cannot be empty"),
            Self::TooLong(len) => write!(f, "name too long: {} bytes", len),
            Self::InvalidCharacter { char, position } => {
                write!(f, "invalid character {:?} at position {}", char, position)
            }
            Self::InvalidSegment(segment) => write!(f, "invalid path segment: '{}'", segment),
            Self::InvalidPath(path) => write!(f, "invalid path: '{}'", path),
            Self::InvalidHash(hash) => {
                write!(f, "invalid content hash '{}': expected {} hex digits", hash, ContentHash::HEX_LEN)
            }
        }
    }
}

impl std::error::Error for InvalidNameError {}
