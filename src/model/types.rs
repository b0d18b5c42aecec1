//! Core identity and value types for the document model.
//!
//! Foundation types used throughout the engine: document and node
//! identifiers, schema versions, frame rectangles, canonical-content hashes,
//! and the validation error vocabulary shared by the parser and validator.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};

// ---------------------------------------------------------------------------
// Id validation (shared by DocumentId and NodeId)
// ---------------------------------------------------------------------------

/// Maximum length of a document or node identifier.
pub const MAX_ID_LEN: usize = 64;

fn validate_id(s: &str, what: &'static str) -> Result<(), IdError> {
    if s.is_empty() {
        return Err(IdError {
            value: s.to_owned(),
            reason: format!("{what} must not be empty"),
        });
    }
    if s.len() > MAX_ID_LEN {
        return Err(IdError {
            value: s.to_owned(),
            reason: format!(
                "{what} must be at most {MAX_ID_LEN} characters, got {}",
                s.len()
            ),
        });
    }
    if !s
        .chars()
        .all(|c| c.is_ascii_graphic() && c != '/' && c != '~')
    {
        return Err(IdError {
            value: s.to_owned(),
            reason: format!(
                "{what} must contain only printable ASCII characters excluding '/' and '~'"
            ),
        });
    }
    Ok(())
}

/// Error returned when an identifier string is malformed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IdError {
    /// The invalid value.
    pub value: String,
    /// Human-readable explanation.
    pub reason: String,
}

impl fmt::Display for IdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid identifier {:?} — {}", self.value, self.reason)
    }
}

impl std::error::Error for IdError {}

// ---------------------------------------------------------------------------
// DocumentId
// ---------------------------------------------------------------------------

/// A globally unique, ULID-like opaque document identifier.
///
/// The engine never interprets the contents beyond validation: 1–64
/// printable ASCII characters, excluding `/` and `~` (so ids can be embedded
/// in JSON pointers without escaping).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocumentId(String);

impl DocumentId {
    /// Create a `DocumentId` from a string, validating format.
    ///
    /// # Errors
    /// Returns an error if the string is empty, too long, or contains
    /// characters outside printable ASCII (or `/` / `~`).
    pub fn new(s: &str) -> Result<Self, IdError> {
        validate_id(s, "document id")?;
        Ok(Self(s.to_owned()))
    }

    /// Mint a fresh ULID-backed document id.
    #[must_use]
    pub fn generate() -> Self {
        Self(ulid::Ulid::new().to_string())
    }

    /// Return the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for DocumentId {
    type Err = IdError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for DocumentId {
    type Error = IdError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        validate_id(&s, "document id")?;
        Ok(Self(s))
    }
}

impl From<DocumentId> for String {
    fn from(id: DocumentId) -> Self {
        id.0
    }
}

// ---------------------------------------------------------------------------
// NodeId
// ---------------------------------------------------------------------------

/// A node identifier, unique within one document.
///
/// Artboards and nodes share a single id namespace. Ids are stable across
/// document versions — they are the anchor the diff and merge engines pair
/// nodes by.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeId(String);

impl NodeId {
    /// Create a `NodeId` from a string, validating format.
    ///
    /// # Errors
    /// Returns an error if the string is empty, too long, or contains
    /// characters outside printable ASCII (or `/` / `~`).
    pub fn new(s: &str) -> Result<Self, IdError> {
        validate_id(s, "node id")?;
        Ok(Self(s.to_owned()))
    }

    /// Mint a fresh ULID-backed node id.
    #[must_use]
    pub fn generate() -> Self {
        Self(ulid::Ulid::new().to_string())
    }

    /// Return the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for NodeId {
    type Err = IdError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for NodeId {
    type Error = IdError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        validate_id(&s, "node id")?;
        Ok(Self(s))
    }
}

impl From<NodeId> for String {
    fn from(id: NodeId) -> Self {
        id.0
    }
}

// ---------------------------------------------------------------------------
// SchemaVersion
// ---------------------------------------------------------------------------

/// The schema major version this engine accepts.
pub const SUPPORTED_SCHEMA_MAJOR: u32 = 0;
/// The schema minor version this engine accepts.
pub const SUPPORTED_SCHEMA_MINOR: u32 = 1;

/// A validated `major.minor.patch` schema version string.
///
/// The engine accepts `0.1.x` documents only; schema migration is out of
/// scope, so any other version is rejected at parse time.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SchemaVersion {
    raw: String,
    major: u32,
    minor: u32,
    patch: u32,
}

impl SchemaVersion {
    /// Parse a `major.minor.patch` version string.
    ///
    /// # Errors
    /// Returns an error if the string is not three dot-separated unsigned
    /// decimal components.
    pub fn new(s: &str) -> Result<Self, IdError> {
        let parts: Vec<&str> = s.split('.').collect();
        if parts.len() != 3 {
            return Err(IdError {
                value: s.to_owned(),
                reason: "schema version must have the form major.minor.patch".to_owned(),
            });
        }
        let mut nums = [0_u32; 3];
        for (slot, part) in nums.iter_mut().zip(&parts) {
            *slot = part.parse().map_err(|_| IdError {
                value: s.to_owned(),
                reason: format!("version component {part:?} is not an unsigned integer"),
            })?;
        }
        Ok(Self {
            raw: s.to_owned(),
            major: nums[0],
            minor: nums[1],
            patch: nums[2],
        })
    }

    /// The current schema version new documents are created with.
    #[must_use]
    pub fn current() -> Self {
        Self {
            raw: format!("{SUPPORTED_SCHEMA_MAJOR}.{SUPPORTED_SCHEMA_MINOR}.0"),
            major: SUPPORTED_SCHEMA_MAJOR,
            minor: SUPPORTED_SCHEMA_MINOR,
            patch: 0,
        }
    }

    /// Return `true` if this version is accepted by the engine.
    #[must_use]
    pub const fn is_supported(&self) -> bool {
        self.major == SUPPORTED_SCHEMA_MAJOR && self.minor == SUPPORTED_SCHEMA_MINOR
    }

    /// Return the raw version string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Major component.
    #[must_use]
    pub const fn major(&self) -> u32 {
        self.major
    }

    /// Minor component.
    #[must_use]
    pub const fn minor(&self) -> u32 {
        self.minor
    }

    /// Patch component.
    #[must_use]
    pub const fn patch(&self) -> u32 {
        self.patch
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for SchemaVersion {
    type Err = IdError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for SchemaVersion {
    type Error = IdError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(&s)
    }
}

impl From<SchemaVersion> for String {
    fn from(v: SchemaVersion) -> Self {
        v.raw
    }
}

// ---------------------------------------------------------------------------
// Rect
// ---------------------------------------------------------------------------

/// A frame rectangle in abstract document pixels.
///
/// `width` and `height` must be finite and non-negative; `x` and `y` must be
/// finite. Violations are reported by the validator rather than prevented at
/// construction — rectangles arrive from untrusted JSON and are checked in
/// context so the error can carry the offending pointer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    /// Horizontal offset.
    pub x: f64,
    /// Vertical offset.
    pub y: f64,
    /// Width, non-negative.
    pub width: f64,
    /// Height, non-negative.
    pub height: f64,
}

impl Rect {
    /// Construct a rectangle from components.
    #[must_use]
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Reason this rectangle is invalid, or `None` if it is well-formed.
    #[must_use]
    pub fn invalid_reason(&self) -> Option<&'static str> {
        if !(self.x.is_finite() && self.y.is_finite()) {
            return Some("x and y must be finite");
        }
        if !(self.width.is_finite() && self.height.is_finite()) {
            return Some("width and height must be finite");
        }
        if self.width < 0.0 || self.height < 0.0 {
            return Some("width and height must be non-negative");
        }
        None
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}) {}x{}", self.x, self.y, self.width, self.height)
    }
}

// ---------------------------------------------------------------------------
// DocumentHash
// ---------------------------------------------------------------------------

/// A SHA-256 digest of a document's canonical bytes, as 64 lowercase hex
/// characters.
///
/// Two documents with equal canonical bytes have equal hashes; mutation
/// events carry the pre-mutation hash so callers can detect concurrent
/// change cheaply.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocumentHash(String);

impl DocumentHash {
    /// Hash a canonical byte sequence.
    #[must_use]
    pub fn of_bytes(bytes: &[u8]) -> Self {
        use fmt::Write as _;
        let digest = Sha256::digest(bytes);
        let mut hex = String::with_capacity(64);
        for byte in digest {
            let _ = write!(hex, "{byte:02x}");
        }
        Self(hex)
    }

    /// Parse a hash from a 64-character lowercase hex string.
    ///
    /// # Errors
    /// Returns an error if the string is not exactly 64 lowercase hex digits.
    pub fn from_hex(s: &str) -> Result<Self, IdError> {
        if s.len() != 64
            || !s
                .chars()
                .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
        {
            return Err(IdError {
                value: s.to_owned(),
                reason: "expected 64 lowercase hex characters".to_owned(),
            });
        }
        Ok(Self(s.to_owned()))
    }

    /// Return the hex digest as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for DocumentHash {
    type Error = IdError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::from_hex(&s)
    }
}

impl From<DocumentHash> for String {
    fn from(h: DocumentHash) -> Self {
        h.0
    }
}

// ---------------------------------------------------------------------------
// Severity
// ---------------------------------------------------------------------------

/// Severity of a diff operation or conflict.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational; safe to apply or ignore.
    Info,
    /// Needs attention but not destructive.
    Warning,
    /// Destructive or intent-ambiguous.
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

// ---------------------------------------------------------------------------
// ValidationError
// ---------------------------------------------------------------------------

/// The machine-stable kind of a validation failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ValidationErrorKind {
    /// Input bytes are not well-formed JSON.
    InvalidJson,
    /// The document's schema version is not accepted by this engine.
    UnsupportedSchema,
    /// A node carries an unknown `type` tag.
    UnknownVariant,
    /// An id appears more than once in the document.
    DuplicateId,
    /// A frame width or height is negative (or not finite).
    NegativeDimension,
    /// A required field is absent.
    MissingField,
    /// A field holds the wrong JSON type.
    InvalidType,
    /// A field holds a malformed value (bad id, bad version string, …).
    InvalidValue,
}

impl ValidationErrorKind {
    /// Stable tag UIs can key translations off.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidJson => "invalid-json",
            Self::UnsupportedSchema => "unsupported-schema",
            Self::UnknownVariant => "unknown-variant",
            Self::DuplicateId => "duplicate-id",
            Self::NegativeDimension => "negative-dimension",
            Self::MissingField => "missing-field",
            Self::InvalidType => "invalid-type",
            Self::InvalidValue => "invalid-value",
        }
    }
}

impl fmt::Display for ValidationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A schema or invariant violation, anchored to a JSON pointer.
///
/// Parsing is all-or-nothing: the first offending location aborts the parse.
/// [`crate::model::validate::validate`] instead collects every violation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    /// What went wrong.
    pub kind: ValidationErrorKind,
    /// JSON pointer of the offending location (`""` for the document root).
    pub pointer: String,
    /// Human-readable explanation.
    pub message: String,
}

impl ValidationError {
    /// Create a validation error at the given pointer.
    #[must_use]
    pub fn new(
        kind: ValidationErrorKind,
        pointer: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            pointer: pointer.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let at = if self.pointer.is_empty() {
            "<root>"
        } else {
            &self.pointer
        };
        write!(f, "{} at {at}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ValidationError {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // -- DocumentId / NodeId --

    #[test]
    fn node_id_valid() {
        let id = NodeId::new("frame-1").unwrap();
        assert_eq!(id.as_str(), "frame-1");
    }

    #[test]
    fn node_id_rejects_empty() {
        assert!(NodeId::new("").is_err());
    }

    #[test]
    fn node_id_rejects_slash() {
        assert!(NodeId::new("a/b").is_err());
    }

    #[test]
    fn node_id_rejects_tilde() {
        assert!(NodeId::new("a~b").is_err());
    }

    #[test]
    fn node_id_rejects_whitespace() {
        assert!(NodeId::new("a b").is_err());
    }

    #[test]
    fn node_id_rejects_too_long() {
        assert!(NodeId::new(&"x".repeat(65)).is_err());
        assert!(NodeId::new(&"x".repeat(64)).is_ok());
    }

    #[test]
    fn node_id_generate_is_valid_and_unique() {
        let a = NodeId::generate();
        let b = NodeId::generate();
        assert_ne!(a, b);
        assert!(NodeId::new(a.as_str()).is_ok());
    }

    #[test]
    fn node_id_serde_roundtrip() {
        let id = NodeId::new("hero-title").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"hero-title\"");
        let decoded: NodeId = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, id);
    }

    #[test]
    fn node_id_serde_rejects_invalid() {
        assert!(serde_json::from_str::<NodeId>("\"a/b\"").is_err());
    }

    #[test]
    fn document_id_from_str() {
        let id: DocumentId = "01HXAMPLE".parse().unwrap();
        assert_eq!(id.as_str(), "01HXAMPLE");
    }

    // -- SchemaVersion --

    #[test]
    fn schema_version_parses() {
        let v = SchemaVersion::new("0.1.0").unwrap();
        assert_eq!(v.major(), 0);
        assert_eq!(v.minor(), 1);
        assert_eq!(v.patch(), 0);
        assert!(v.is_supported());
    }

    #[test]
    fn schema_version_patch_variants_supported() {
        assert!(SchemaVersion::new("0.1.7").unwrap().is_supported());
    }

    #[test]
    fn schema_version_unsupported() {
        assert!(!SchemaVersion::new("0.2.0").unwrap().is_supported());
        assert!(!SchemaVersion::new("1.0.0").unwrap().is_supported());
    }

    #[test]
    fn schema_version_rejects_malformed() {
        assert!(SchemaVersion::new("0.1").is_err());
        assert!(SchemaVersion::new("a.b.c").is_err());
        assert!(SchemaVersion::new("").is_err());
        assert!(SchemaVersion::new("0.1.0.0").is_err());
    }

    #[test]
    fn schema_version_current_is_supported() {
        assert!(SchemaVersion::current().is_supported());
    }

    #[test]
    fn schema_version_serde_roundtrip() {
        let v = SchemaVersion::new("0.1.0").unwrap();
        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(json, "\"0.1.0\"");
        let decoded: SchemaVersion = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, v);
    }

    // -- Rect --

    #[test]
    fn rect_valid() {
        assert!(Rect::new(0.0, 0.0, 100.0, 50.0).invalid_reason().is_none());
    }

    #[test]
    fn rect_zero_size_is_valid() {
        assert!(Rect::new(-5.0, -5.0, 0.0, 0.0).invalid_reason().is_none());
    }

    #[test]
    fn rect_negative_width() {
        assert!(Rect::new(0.0, 0.0, -1.0, 10.0).invalid_reason().is_some());
    }

    #[test]
    fn rect_negative_height() {
        assert!(Rect::new(0.0, 0.0, 10.0, -0.5).invalid_reason().is_some());
    }

    #[test]
    fn rect_non_finite() {
        assert!(
            Rect::new(f64::NAN, 0.0, 1.0, 1.0)
                .invalid_reason()
                .is_some()
        );
        assert!(
            Rect::new(0.0, 0.0, f64::INFINITY, 1.0)
                .invalid_reason()
                .is_some()
        );
    }

    // -- DocumentHash --

    #[test]
    fn document_hash_is_stable() {
        let a = DocumentHash::of_bytes(b"{}\n");
        let b = DocumentHash::of_bytes(b"{}\n");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn document_hash_differs_on_content() {
        assert_ne!(DocumentHash::of_bytes(b"a"), DocumentHash::of_bytes(b"b"));
    }

    #[test]
    fn document_hash_hex_roundtrip() {
        let h = DocumentHash::of_bytes(b"hello");
        let parsed = DocumentHash::from_hex(h.as_str()).unwrap();
        assert_eq!(parsed, h);
    }

    #[test]
    fn document_hash_rejects_bad_hex() {
        assert!(DocumentHash::from_hex("abc").is_err());
        assert!(DocumentHash::from_hex(&"G".repeat(64)).is_err());
        assert!(DocumentHash::from_hex(&"A".repeat(64)).is_err());
    }

    // -- Severity --

    #[test]
    fn severity_display_and_order() {
        assert_eq!(format!("{}", Severity::Info), "info");
        assert_eq!(format!("{}", Severity::Warning), "warning");
        assert_eq!(format!("{}", Severity::Error), "error");
        assert!(Severity::Info < Severity::Warning);
        assert!(Severity::Warning < Severity::Error);
    }

    #[test]
    fn severity_serde_lowercase() {
        assert_eq!(
            serde_json::to_string(&Severity::Warning).unwrap(),
            "\"warning\""
        );
    }

    // -- ValidationError --

    #[test]
    fn validation_error_display() {
        let err = ValidationError::new(
            ValidationErrorKind::MissingField,
            "/artboards/0/id",
            "field `id` is required",
        );
        let msg = format!("{err}");
        assert!(msg.contains("missing-field"));
        assert!(msg.contains("/artboards/0/id"));
        assert!(msg.contains("required"));
    }

    #[test]
    fn validation_error_root_pointer() {
        let err = ValidationError::new(ValidationErrorKind::InvalidJson, "", "bad JSON");
        assert!(format!("{err}").contains("<root>"));
    }

    #[test]
    fn validation_kind_tags_are_kebab_case() {
        assert_eq!(
            ValidationErrorKind::UnsupportedSchema.as_str(),
            "unsupported-schema"
        );
        assert_eq!(ValidationErrorKind::DuplicateId.as_str(), "duplicate-id");
        assert_eq!(
            ValidationErrorKind::NegativeDimension.as_str(),
            "negative-dimension"
        );
        assert_eq!(
            serde_json::to_string(&ValidationErrorKind::UnknownVariant).unwrap(),
            "\"unknown-variant\""
        );
    }
}
