//! Failure classes shared by every engine error.

use std::fmt;

/// How a failure is handled by callers.
///
/// Everything except [`ErrorClass::DataQuality`] surfaces immediately and
/// aborts the unit of work. Data-quality failures are counted per record
/// and only escalate once the error budget is spent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Malformed header, unsupported format version, missing required field
    Specification,
    /// Unknown taxon, assembly, selection or modification id
    ReferenceIntegrity,
    /// Per-record drops that exceeded their budget
    DataQuality,
    /// Annotation directory/database mismatch, assembly-version mismatch
    Consistency,
    /// Interval toolkit or liftover failure
    ExternalTool,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorClass::Specification => "specification",
            ErrorClass::ReferenceIntegrity => "reference-integrity",
            ErrorClass::DataQuality => "data-quality",
            ErrorClass::Consistency => "consistency",
            ErrorClass::ExternalTool => "external-tool",
        };
        f.write_str(s)
    }
}
