use std::fmt;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug)]
pub enum Error {
    /// Ran out of input partway through a read. This is always fatal for the parse call that hit
    /// it.
    UnexpectedEof {
        step: &'static str,
        offset: usize,
        need: usize,
        have: usize,
    },
    /// A tag or length field didn't resolve to a known structure: a tag with non-alphanumeric
    /// characters, a block index outside the block-size table, or an item overrunning its
    /// enclosing list. The parser recovers from these by collapsing the enclosing list into opaque
    /// bytes, so callers only see this inside [`Diagnostic`][crate::Diagnostic] records.
    StructuralAmbiguity { offset: usize, reason: String },
    /// A DEFLATE stream inside a compressed list or packed object failed to inflate, or inflated
    /// to a different length than declared.
    CompressionFailure { offset: usize, reason: String },
    /// Inflated data would have been larger than the configured maximum.
    LengthTooLong { max: usize, actual: usize },
    /// The root framing of the file is invalid. Nothing past this point can be located.
    BadRoot(String),
    /// A tree edit that would produce an invalid structure.
    BadEdit(String),
    /// Reading the input failed before parsing started.
    Io(std::io::Error),
}

impl Error {
    /// True for the error kinds the parser recovers from locally.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::StructuralAmbiguity { .. })
    }

    pub(crate) fn ambiguity(offset: usize, reason: impl Into<String>) -> Self {
        Error::StructuralAmbiguity {
            offset,
            reason: reason.into(),
        }
    }

    pub(crate) fn compression(offset: usize, reason: impl Into<String>) -> Self {
        Error::CompressionFailure {
            offset,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::UnexpectedEof {
                step,
                offset,
                need,
                have,
            } => write!(
                f,
                "Unexpected end of data at offset {:#x} on step [{}]: needed {} bytes, had {}",
                offset, step, need, have
            ),
            Error::StructuralAmbiguity { offset, ref reason } => {
                write!(f, "Unparsable structure at offset {:#x}: {}", offset, reason)
            }
            Error::CompressionFailure { offset, ref reason } => write!(
                f,
                "Failed decompression of region at offset {:#x}: {}",
                offset, reason
            ),
            Error::LengthTooLong { max, actual } => write!(
                f,
                "Data too long: was {} bytes, maximum allowed is {}",
                actual, max
            ),
            Error::BadRoot(ref err) => write!(f, "Invalid root chunk: {}", err),
            Error::BadEdit(ref err) => write!(f, "Invalid edit: {}", err),
            Error::Io(ref err) => write!(f, "I/O failure: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match *self {
            Error::Io(ref err) => Some(err),
            _ => None,
        }
    }
}

impl std::convert::From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}
