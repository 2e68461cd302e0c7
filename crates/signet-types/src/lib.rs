//! Shared data model for the Signet composition engine.
//!
//! These types describe a document being signed: its uploaded source
//! files, the positioned fields authored onto them, and the values each
//! signer submitted. The composition engine consumes them read-only.

pub mod types;

pub use types::{
    ComposedDocument, DocumentSpec, Field, FieldKind, FieldPosition, FieldValue, Signer,
    SourceFile,
};
