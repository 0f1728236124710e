use std::ops::Range;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Structural(#[from] StructuralError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Encoding(#[from] EncodingError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Fatal to the whole decode: the buffer does not contain what the
/// container layout promises.
#[derive(Debug, thiserror::Error)]
pub enum StructuralError {
    #[error("archive signature not found in {scanned} bytes")]
    SignatureNotFound { scanned: usize },

    #[error("buffer truncated at offset {offset:#x}: need {need} bytes, have {have}")]
    Truncated { offset: usize, need: usize, have: usize },

    #[error("package table lists {found} packages, expected at least {expected}")]
    TooFewPackages { expected: usize, found: usize },

    #[error("package {index} missing from archive")]
    PackageMissing { index: usize },

    #[error("rebuilt archive is {total} bytes, exceeding the addressable {max} bytes")]
    PackageOverflow { total: u64, max: u64 },

    #[error("firmware image is a known incompatible hardware variant (probe {probe:#x} = {marker:#06x})")]
    IncompatibleVariant { probe: usize, marker: u16 },
}

/// Fatal to one table or region only; siblings keep decoding.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("table size {size} is not a multiple of record stride {stride}")]
    StrideMismatch { size: usize, stride: usize },

    #[error("bits-per-pixel class {0} is not in the lookup")]
    UnknownBppClass(u16),

    #[error("tile size class {0} is not in the lookup")]
    UnknownSizeClass(u16),

    #[error("offset {offset:#x} points outside its {len}-byte region")]
    OffsetOutOfRange { offset: usize, len: usize },

    #[error("offset list is not non-decreasing at entry {index} ({prev:#x} > {next:#x})")]
    OffsetsNotMonotonic { index: usize, prev: usize, next: usize },

    #[error("group [{start}, {start}+{len}) exceeds the {available} decoded sequences")]
    GroupOutOfRange { start: usize, len: usize, available: usize },

    #[error("region truncated at offset {offset:#x}: need {need} bytes, have {have}")]
    Truncated { offset: usize, need: usize, have: usize },

    #[error("depends on table {table}, which failed to decode")]
    DependencyFailed { table: usize },
}

/// Recoverable: the offending reference renders as a visibly-marked
/// placeholder; it never aborts a decode.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReferenceError {
    #[error("entity {entity} does not resolve to a row (table has {rows})")]
    DanglingEntity { entity: u16, rows: usize },

    #[error("group [{start}, {start}+{len}) exceeds the {available} decoded sequences")]
    GroupOutOfRange { start: usize, len: usize, available: usize },
}

/// A table that failed to decode, reported alongside the tables that
/// succeeded (partial failure, never silent).
#[derive(Debug)]
pub struct TableFault {
    pub table: usize,
    pub range: Range<usize>,
    pub error: SchemaError,
}

impl std::fmt::Display for TableFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "table {} ({:#x}..{:#x}): {}",
            self.table, self.range.start, self.range.end, self.error
        )
    }
}

/// One unrepresentable piece of an input string, reported by position so
/// the caller can highlight it.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct InvalidSpan {
    /// Character index into the input string.
    pub position: usize,
    pub text: String,
}

#[derive(Debug, thiserror::Error)]
pub enum EncodingError {
    #[error("{} substring(s) not representable in the active character table", spans.len())]
    Unmapped { spans: Vec<InvalidSpan> },

    #[error("imported table would leave in-use code {code:#06x} unmapped")]
    ImportOrphansCode { code: u16 },

    #[error("character table entry {code:#06x} has rendering {text:?}; multi-character renderings must be brace-delimited")]
    InvalidRendering { code: u16, text: String },

    #[error("renderings {text:?} assigned to both {first:#06x} and {second:#06x}")]
    DuplicateRendering { text: String, first: u16, second: u16 },
}

/// Rejections raised when committing an edit; the snapshot is left as it was.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("{field}: value {value} outside {min}..={max}")]
    OutOfRange { field: &'static str, value: u32, min: u32, max: u32 },

    #[error("{field}: {len} codepoints exceed the {max}-word field")]
    TextTooLong { field: &'static str, len: usize, max: usize },

    #[error("subimage {subimage}: pixel index {index} exceeds the {colors} available colors")]
    PixelOutOfPalette { subimage: usize, index: u16, colors: usize },
}
