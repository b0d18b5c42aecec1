//! JSON-pointer paths for addressing document structure.
//!
//! Paths follow RFC 6901 syntax: `/artboards/0/children/2/visible`. Tokens
//! unescape `~1` to `/` and `~0` to `~`. Array indices are unsigned decimal
//! integers with no leading zeros (a lone `0` is valid).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// PointerError
// ---------------------------------------------------------------------------

/// Error returned when a pointer string is malformed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PointerError {
    /// The invalid pointer text.
    pub value: String,
    /// Human-readable explanation.
    pub reason: String,
}

impl fmt::Display for PointerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid pointer {:?} — {}", self.value, self.reason)
    }
}

impl std::error::Error for PointerError {}

// ---------------------------------------------------------------------------
// Pointer
// ---------------------------------------------------------------------------

/// A parsed JSON pointer.
///
/// The empty pointer (`""`) addresses the document root. Serialized as its
/// escaped string form.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Pointer {
    tokens: Vec<String>,
}

impl Pointer {
    /// The root pointer.
    #[must_use]
    pub const fn root() -> Self {
        Self { tokens: Vec::new() }
    }

    /// Parse a pointer from its escaped string form.
    ///
    /// # Errors
    /// Returns an error if the string is non-empty but does not start with
    /// `/`, or contains an invalid `~` escape.
    pub fn parse(s: &str) -> Result<Self, PointerError> {
        if s.is_empty() {
            return Ok(Self::root());
        }
        let Some(rest) = s.strip_prefix('/') else {
            return Err(PointerError {
                value: s.to_owned(),
                reason: "pointer must be empty or start with '/'".to_owned(),
            });
        };
        let mut tokens = Vec::new();
        for raw in rest.split('/') {
            tokens.push(unescape(raw).map_err(|reason| PointerError {
                value: s.to_owned(),
                reason,
            })?);
        }
        Ok(Self { tokens })
    }

    /// Parse a relative suffix without a leading slash (`frame/x`), as used
    /// for property keys appended to a node path.
    ///
    /// # Errors
    /// Returns an error on empty input or invalid escapes.
    pub fn parse_suffix(s: &str) -> Result<Self, PointerError> {
        if s.is_empty() {
            return Err(PointerError {
                value: s.to_owned(),
                reason: "property key must not be empty".to_owned(),
            });
        }
        let mut tokens = Vec::new();
        for raw in s.split('/') {
            tokens.push(unescape(raw).map_err(|reason| PointerError {
                value: s.to_owned(),
                reason,
            })?);
        }
        Ok(Self { tokens })
    }

    /// The unescaped tokens.
    #[must_use]
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// `true` if this is the root pointer.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Number of tokens.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// `true` if the pointer has no tokens.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Split into (parent tokens, last token); `None` for the root pointer.
    #[must_use]
    pub fn split_last(&self) -> Option<(&[String], &str)> {
        self.tokens
            .split_last()
            .map(|(last, parent)| (parent, last.as_str()))
    }

    /// Split into (parent pointer, last token); `None` for the root pointer.
    #[must_use]
    pub fn split_parent(&self) -> Option<(Self, &str)> {
        self.tokens.split_last().map(|(last, parent)| {
            (
                Self {
                    tokens: parent.to_vec(),
                },
                last.as_str(),
            )
        })
    }

    /// A new pointer with `token` appended.
    #[must_use]
    pub fn child(&self, token: impl Into<String>) -> Self {
        let mut tokens = self.tokens.clone();
        tokens.push(token.into());
        Self { tokens }
    }

    /// A new pointer with all of `suffix`'s tokens appended.
    #[must_use]
    pub fn append(&self, suffix: &Self) -> Self {
        let mut tokens = self.tokens.clone();
        tokens.extend(suffix.tokens.iter().cloned());
        Self { tokens }
    }

    /// Interpret a token as an array index: unsigned decimal, no leading
    /// zeros (a lone `0` is valid).
    #[must_use]
    pub fn as_index(token: &str) -> Option<usize> {
        if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        if token.len() > 1 && token.starts_with('0') {
            return None;
        }
        token.parse().ok()
    }
}

fn unescape(raw: &str) -> Result<String, String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c == '~' {
            match chars.next() {
                Some('0') => out.push('~'),
                Some('1') => out.push('/'),
                other => {
                    return Err(format!(
                        "invalid escape '~{}' (expected ~0 or ~1)",
                        other.map_or(String::new(), |c| c.to_string())
                    ));
                }
            }
        } else {
            out.push(c);
        }
    }
    Ok(out)
}

fn escape(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}

impl fmt::Display for Pointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for token in &self.tokens {
            write!(f, "/{}", escape(token))?;
        }
        Ok(())
    }
}

impl FromStr for Pointer {
    type Err = PointerError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Pointer {
    type Error = PointerError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<Pointer> for String {
    fn from(p: Pointer) -> Self {
        p.to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
