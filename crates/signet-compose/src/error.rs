use thiserror::Error;

/// Errors surfaced by the composition engine.
///
/// Only `NoSignedData` and `NoPagesProduced` abort a composition run.
/// The file- and field-level variants exist so inner layers can report
/// precisely what went wrong; callers of the top-level entry point never
/// see them because they are caught, logged, and converted into skips.
#[derive(Error, Debug)]
pub enum ComposeError {
    #[error("No signer has completed signing")]
    NoSignedData,

    #[error("No input file produced any pages")]
    NoPagesProduced,

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to fetch stored bytes: {0}")]
    StorageFetchFailed(String),

    #[error("Field has no valid coordinates: {0}")]
    NoValidCoordinates(String),

    #[error("Failed to parse input: {0}")]
    ParseError(String),

    #[error("Raster conversion failed: {0}")]
    RasterError(String),

    #[error("PDF operation failed: {0}")]
    OperationError(String),
}
