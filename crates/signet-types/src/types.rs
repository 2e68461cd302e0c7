use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One uploaded input file belonging to a document.
///
/// Immutable once uploaded. `storage_ref` is an opaque locator resolved
/// by the host's storage collaborator; the engine never interprets it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceFile {
    pub file_id: String,
    pub storage_ref: String,
    pub original_name: String,
    pub declared_mime_type: String,
    #[serde(default)]
    pub fields: Vec<Field>,
}

/// Field type, determining how a signer's value is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Text,
    Name,
    Email,
    Phone,
    Date,
    Checkbox,
    Signature,
    Initial,
}

impl FieldKind {
    /// Text-like kinds all render identically (single line, boxed).
    pub fn is_text_like(self) -> bool {
        matches!(
            self,
            FieldKind::Text
                | FieldKind::Name
                | FieldKind::Email
                | FieldKind::Phone
                | FieldKind::Date
        )
    }
}

/// Where a field sits on its page, in one of two authoring conventions.
///
/// Both use a top-left origin. Exactly one representation is present per
/// field; the coordinate resolver matches exhaustively on this.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldPosition {
    /// Percentages of page width/height. Resolution-independent; preferred.
    #[serde(rename_all = "camelCase")]
    Percent {
        left_percent: f64,
        top_percent: f64,
        width_percent: f64,
        height_percent: f64,
    },
    /// Legacy absolute pixels in the coordinate space the field was
    /// authored in. `original_width`/`original_height` describe that
    /// space; when absent, the target page's own dimensions are assumed
    /// and no scaling occurs.
    #[serde(rename_all = "camelCase")]
    Pixels {
        x: f64,
        y: f64,
        width: f64,
        height: f64,
        #[serde(default)]
        original_width: Option<f64>,
        #[serde(default)]
        original_height: Option<f64>,
    },
}

/// A positioned, typed placeholder awaiting a signer's input.
///
/// `page_number` is 1-based within the owning source file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: FieldKind,
    pub page_number: u32,
    #[serde(flatten)]
    pub position: FieldPosition,
    #[serde(default)]
    pub required: bool,
}

/// A signer's submitted value for one field.
///
/// Untagged so that checkbox values arrive as either a JSON boolean or
/// the literal string `"true"`/`"false"`, and signature values as either
/// a data-URI string or plain text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Checked(bool),
    Text(String),
}

impl FieldValue {
    /// Checkbox semantics: boolean `true` and the string `"true"` both
    /// count as checked; everything else does not.
    pub fn is_truthy(&self) -> bool {
        match self {
            FieldValue::Checked(b) => *b,
            FieldValue::Text(s) => s == "true",
        }
    }

    /// An empty string carries no drawable content.
    pub fn is_empty(&self) -> bool {
        matches!(self, FieldValue::Text(s) if s.is_empty())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            FieldValue::Checked(_) => None,
        }
    }
}

/// One signer of a document. Only signers with `signed == true`
/// participate in composition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Signer {
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub signed: bool,
    #[serde(default)]
    pub signed_at: Option<DateTime<Utc>>,
    /// Keyed by field id.
    #[serde(default)]
    pub field_values: HashMap<String, FieldValue>,
}

/// A document to compose: its title and ordered source files.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSpec {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    pub files: Vec<SourceFile>,
}

/// Final output of a composition run: a single flattened PDF and a
/// suggested filename. Persistence is the host's concern.
#[derive(Debug, Clone)]
pub struct ComposedDocument {
    pub bytes: Vec<u8>,
    pub filename: String,
}
