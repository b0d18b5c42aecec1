//! Parsing and validation of untrusted document bytes.
//!
//! [`parse`] is a hand-rolled decoder over [`serde_json::Value`] that tracks
//! the JSON pointer of the first offending location, so every rejection
//! names exactly where the input went wrong. Parsing is all-or-nothing: a
//! partial document is never exposed.
//!
//! [`validate`] re-checks the structural invariants on an already-typed
//! document and collects *every* violation — used after patches and merges,
//! where the input is trusted to be shaped correctly but the invariants
//! (unique ids, non-negative dimensions) must be re-established.
//!
//! Unknown object keys are ignored on read; canonical serialization emits
//! only schema fields. This matches the serde-derived decoder used when
//! materializing patched value trees.

use std::collections::BTreeSet;

use serde_json::Value;

use super::document::{Artboard, Document};
use super::node::{JsonMap, Node, NodeHeader, SemanticKey};
use super::types::{
    DocumentId, NodeId, Rect, SchemaVersion, ValidationError, ValidationErrorKind,
};

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Parse a UTF-8 JSON byte sequence into a validated [`Document`].
///
/// Rejects unsupported schema versions, unknown variant tags, duplicate ids,
/// missing required fields, wrong JSON types, and negative frame dimensions.
///
/// # Errors
/// Returns a [`ValidationError`] carrying the JSON pointer of the first
/// offending location.
pub fn parse(bytes: &[u8]) -> Result<Document, ValidationError> {
    let value: Value = serde_json::from_slice(bytes).map_err(|e| {
        ValidationError::new(ValidationErrorKind::InvalidJson, "", e.to_string())
    })?;
    parse_value(&value)
}

/// Parse an already-deserialized JSON value into a validated [`Document`].
///
/// # Errors
/// Same contract as [`parse`].
pub fn parse_value(value: &Value) -> Result<Document, ValidationError> {
    let mut seen = BTreeSet::new();
    decode_document(value, &mut seen)
}

/// Re-check every invariant on a typed document, collecting all violations.
///
/// # Errors
/// Returns the full list of violations; an empty list is impossible (the
/// `Err` branch always carries at least one entry).
pub fn validate(doc: &Document) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if !doc.schema_version.is_supported() {
        errors.push(ValidationError::new(
            ValidationErrorKind::UnsupportedSchema,
            "/schemaVersion",
            format!("schema version {} is not supported", doc.schema_version),
        ));
    }

    let mut seen: BTreeSet<&NodeId> = BTreeSet::new();
    for (ai, artboard) in doc.artboards.iter().enumerate() {
        let ptr = format!("/artboards/{ai}");
        if !seen.insert(&artboard.id) {
            errors.push(ValidationError::new(
                ValidationErrorKind::DuplicateId,
                format!("{ptr}/id"),
                format!("id {:?} appears more than once", artboard.id.as_str()),
            ));
        }
        check_rect(&artboard.frame, &ptr, &mut errors);
        for (ci, child) in artboard.children.iter().enumerate() {
            validate_node(child, &format!("{ptr}/children/{ci}"), &mut seen, &mut errors);
        }
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

fn validate_node<'doc>(
    node: &'doc Node,
    ptr: &str,
    seen: &mut BTreeSet<&'doc NodeId>,
    errors: &mut Vec<ValidationError>,
) {
    let header = node.header();
    if !seen.insert(&header.id) {
        errors.push(ValidationError::new(
            ValidationErrorKind::DuplicateId,
            format!("{ptr}/id"),
            format!("id {:?} appears more than once", header.id.as_str()),
        ));
    }
    check_rect(&header.frame, ptr, errors);
    if let Some(data) = &header.data {
        for (key, value) in data {
            if !is_scalar(value) {
                errors.push(ValidationError::new(
                    ValidationErrorKind::InvalidType,
                    format!("{ptr}/data/{key}"),
                    "data values must be scalars (null, bool, number, string)",
                ));
            }
        }
    }
    for (ci, child) in node.children().iter().enumerate() {
        validate_node(child, &format!("{ptr}/children/{ci}"), seen, errors);
    }
}

fn check_rect(rect: &Rect, node_ptr: &str, errors: &mut Vec<ValidationError>) {
    if let Some(reason) = rect.invalid_reason() {
        errors.push(ValidationError::new(
            ValidationErrorKind::NegativeDimension,
            format!("{node_ptr}/frame"),
            reason,
        ));
    }
}

const fn is_scalar(value: &Value) -> bool {
    matches!(
        value,
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_)
    )
}

// ---------------------------------------------------------------------------
// Decoder — pointer-tracking walk over the value tree
// ---------------------------------------------------------------------------

type DecodeResult<T> = Result<T, ValidationError>;

fn err(kind: ValidationErrorKind, ptr: impl Into<String>, msg: impl Into<String>) -> ValidationError {
    ValidationError::new(kind, ptr, msg)
}

fn as_object<'v>(value: &'v Value, ptr: &str) -> DecodeResult<&'v JsonMap> {
    value.as_object().ok_or_else(|| {
        err(
            ValidationErrorKind::InvalidType,
            ptr,
            format!("expected an object, found {}", json_type_name(value)),
        )
    })
}

fn require<'v>(obj: &'v JsonMap, key: &str, ptr: &str) -> DecodeResult<&'v Value> {
    obj.get(key).ok_or_else(|| {
        err(
            ValidationErrorKind::MissingField,
            format!("{ptr}/{key}"),
            format!("field `{key}` is required"),
        )
    })
}

fn require_str<'v>(obj: &'v JsonMap, key: &str, ptr: &str) -> DecodeResult<&'v str> {
    let value = require(obj, key, ptr)?;
    value.as_str().ok_or_else(|| {
        err(
            ValidationErrorKind::InvalidType,
            format!("{ptr}/{key}"),
            format!("expected a string, found {}", json_type_name(value)),
        )
    })
}

fn require_f64(obj: &JsonMap, key: &str, ptr: &str) -> DecodeResult<f64> {
    let value = require(obj, key, ptr)?;
    value.as_f64().ok_or_else(|| {
        err(
            ValidationErrorKind::InvalidType,
            format!("{ptr}/{key}"),
            format!("expected a number, found {}", json_type_name(value)),
        )
    })
}

fn optional_bool(obj: &JsonMap, key: &str, ptr: &str) -> DecodeResult<Option<bool>> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(other) => Err(err(
            ValidationErrorKind::InvalidType,
            format!("{ptr}/{key}"),
            format!("expected a boolean, found {}", json_type_name(other)),
        )),
    }
}

fn optional_object(obj: &JsonMap, key: &str, ptr: &str) -> DecodeResult<Option<JsonMap>> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(map)) => Ok(Some(map.clone())),
        Some(other) => Err(err(
            ValidationErrorKind::InvalidType,
            format!("{ptr}/{key}"),
            format!("expected an object, found {}", json_type_name(other)),
        )),
    }
}

const fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn decode_document(value: &Value, seen: &mut BTreeSet<String>) -> DecodeResult<Document> {
    let obj = as_object(value, "")?;

    let version_raw = require_str(obj, "schemaVersion", "")?;
    let schema_version = SchemaVersion::new(version_raw).map_err(|e| {
        err(ValidationErrorKind::InvalidValue, "/schemaVersion", e.reason)
    })?;
    if !schema_version.is_supported() {
        return Err(err(
            ValidationErrorKind::UnsupportedSchema,
            "/schemaVersion",
            format!("schema version {version_raw} is not supported"),
        ));
    }

    let id_raw = require_str(obj, "id", "")?;
    let id = DocumentId::new(id_raw)
        .map_err(|e| err(ValidationErrorKind::InvalidValue, "/id", e.reason))?;

    let name = require_str(obj, "name", "")?.to_owned();

    let mut artboards = Vec::new();
    match obj.get("artboards") {
        None | Some(Value::Null) => {}
        Some(Value::Array(items)) => {
            for (i, item) in items.iter().enumerate() {
                artboards.push(decode_artboard(item, &format!("/artboards/{i}"), seen)?);
            }
        }
        Some(other) => {
            return Err(err(
                ValidationErrorKind::InvalidType,
                "/artboards",
                format!("expected an array, found {}", json_type_name(other)),
            ));
        }
    }

    Ok(Document {
        schema_version,
        id,
        name,
        artboards,
    })
}

fn decode_artboard(
    value: &Value,
    ptr: &str,
    seen: &mut BTreeSet<String>,
) -> DecodeResult<Artboard> {
    let obj = as_object(value, ptr)?;
    let id = decode_node_id(obj, ptr, seen)?;
    let name = require_str(obj, "name", ptr)?.to_owned();
    let frame = decode_rect(require(obj, "frame", ptr)?, &format!("{ptr}/frame"))?;
    let children = decode_children(obj, ptr, seen)?;
    Ok(Artboard {
        id,
        name,
        frame,
        children,
    })
}

fn decode_node(value: &Value, ptr: &str, seen: &mut BTreeSet<String>) -> DecodeResult<Node> {
    let obj = as_object(value, ptr)?;
    let tag = require_str(obj, "type", ptr)?;
    let header = decode_header(obj, ptr, seen)?;

    match tag {
        "frame" => {
            let children = decode_children(obj, ptr, seen)?;
            Ok(Node::Frame { header, children })
        }
        "text" => {
            let text = require_str(obj, "text", ptr)?.to_owned();
            let text_style = optional_object(obj, "textStyle", ptr)?;
            Ok(Node::Text {
                header,
                text,
                text_style,
            })
        }
        "component" => {
            let component_key = require_str(obj, "componentKey", ptr)?.to_owned();
            let props = optional_object(obj, "props", ptr)?.unwrap_or_default();
            Ok(Node::Component {
                header,
                component_key,
                props,
            })
        }
        other => Err(err(
            ValidationErrorKind::UnknownVariant,
            format!("{ptr}/type"),
            format!("unknown node type {other:?} (expected frame, text, or component)"),
        )),
    }
}

fn decode_header(obj: &JsonMap, ptr: &str, seen: &mut BTreeSet<String>) -> DecodeResult<NodeHeader> {
    let id = decode_node_id(obj, ptr, seen)?;
    let name = require_str(obj, "name", ptr)?.to_owned();
    let visible = optional_bool(obj, "visible", ptr)?;
    let frame = decode_rect(require(obj, "frame", ptr)?, &format!("{ptr}/frame"))?;
    let style = optional_object(obj, "style", ptr)?;
    let layout = optional_object(obj, "layout", ptr)?;

    let semantic_key = match obj.get("semanticKey") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(SemanticKey::new(s).map_err(|e| {
            err(
                ValidationErrorKind::InvalidValue,
                format!("{ptr}/semanticKey"),
                e.reason,
            )
        })?),
        Some(other) => {
            return Err(err(
                ValidationErrorKind::InvalidType,
                format!("{ptr}/semanticKey"),
                format!("expected a string, found {}", json_type_name(other)),
            ));
        }
    };

    let data = optional_object(obj, "data", ptr)?;
    if let Some(map) = &data {
        for (key, value) in map {
            if !is_scalar(value) {
                return Err(err(
                    ValidationErrorKind::InvalidType,
                    format!("{ptr}/data/{key}"),
                    "data values must be scalars (null, bool, number, string)",
                ));
            }
        }
    }

    Ok(NodeHeader {
        id,
        name,
        visible,
        frame,
        style,
        layout,
        semantic_key,
        data,
    })
}

fn decode_node_id(obj: &JsonMap, ptr: &str, seen: &mut BTreeSet<String>) -> DecodeResult<NodeId> {
    let raw = require_str(obj, "id", ptr)?;
    let id = NodeId::new(raw).map_err(|e| {
        err(
            ValidationErrorKind::InvalidValue,
            format!("{ptr}/id"),
            e.reason,
        )
    })?;
    if !seen.insert(raw.to_owned()) {
        return Err(err(
            ValidationErrorKind::DuplicateId,
            format!("{ptr}/id"),
            format!("id {raw:?} appears more than once"),
        ));
    }
    Ok(id)
}

fn decode_children(obj: &JsonMap, ptr: &str, seen: &mut BTreeSet<String>) -> DecodeResult<Vec<Node>> {
    match obj.get("children") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => {
            let mut children = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                children.push(decode_node(item, &format!("{ptr}/children/{i}"), seen)?);
            }
            Ok(children)
        }
        Some(other) => Err(err(
            ValidationErrorKind::InvalidType,
            format!("{ptr}/children"),
            format!("expected an array, found {}", json_type_name(other)),
        )),
    }
}

fn decode_rect(value: &Value, ptr: &str) -> DecodeResult<Rect> {
    let obj = as_object(value, ptr)?;
    let rect = Rect {
        x: require_f64(obj, "x", ptr)?,
        y: require_f64(obj, "y", ptr)?,
        width: require_f64(obj, "width", ptr)?,
        height: require_f64(obj, "height", ptr)?,
    };
    if let Some(reason) = rect.invalid_reason() {
        return Err(err(ValidationErrorKind::NegativeDimension, ptr, reason));
    }
    Ok(rect)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
