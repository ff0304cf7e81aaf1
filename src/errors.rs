use std::fmt::{Display, Formatter};
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RasterError>;

/// Position of a block in a band's block grid, used to give failures context.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct BlockRef {
    /// 1-based band index.
    pub band: usize,
    pub block_x: usize,
    pub block_y: usize,
}

impl Display for BlockRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "band {} block ({}, {})",
            self.band, self.block_x, self.block_y
        )
    }
}

/// One block that could not be written back during a flush.
#[derive(Debug)]
pub struct BlockFailure {
    pub block: BlockRef,
    pub error: RasterError,
}

#[derive(Debug, Error)]
pub enum RasterError {
    #[error("Illegal argument in '{method_name}': {msg}")]
    IllegalArgument {
        method_name: &'static str,
        msg: String,
    },
    #[error("I/O error{}: {source}", context_suffix(.block))]
    IoError {
        block: Option<BlockRef>,
        #[source]
        source: std::io::Error,
    },
    #[error("Format error{}: {msg}", context_suffix(.block))]
    FormatError { block: Option<BlockRef>, msg: String },
    #[error("Attempt to write to read only dataset in '{method_name}'")]
    NoWriteAccess { method_name: &'static str },
    #[error("'{method_name}' not supported for this dataset")]
    NotSupported { method_name: &'static str },
    #[error("Failed to flush {} block(s): {}", .failures.len(), summarize(.failures))]
    FlushFailed { failures: Vec<BlockFailure> },
    #[error("Unknown driver '{0}'")]
    UnknownDriver(String),
    #[error("Unable to open '{}': {msg}", .path.display())]
    OpenFailed { path: PathBuf, msg: String },
    #[error("Bad argument: {0}")]
    BadArgument(String),
    #[cfg(feature = "ndarray")]
    #[error(transparent)]
    NdarrayShapeError(#[from] ndarray::ShapeError),
}

impl RasterError {
    /// Attaches block coordinates to an I/O or format error that was raised
    /// without them. Other variants are returned untouched.
    pub fn at_block(self, at: BlockRef) -> Self {
        match self {
            RasterError::IoError {
                block: None,
                source,
            } => RasterError::IoError {
                block: Some(at),
                source,
            },
            RasterError::FormatError { block: None, msg } => RasterError::FormatError {
                block: Some(at),
                msg,
            },
            other => other,
        }
    }

    pub(crate) fn illegal(method_name: &'static str, msg: impl Into<String>) -> Self {
        RasterError::IllegalArgument {
            method_name,
            msg: msg.into(),
        }
    }

    pub(crate) fn format(msg: impl Into<String>) -> Self {
        RasterError::FormatError {
            block: None,
            msg: msg.into(),
        }
    }
}

impl From<std::io::Error> for RasterError {
    fn from(source: std::io::Error) -> Self {
        RasterError::IoError {
            block: None,
            source,
        }
    }
}

fn context_suffix(block: &Option<BlockRef>) -> String {
    match block {
        Some(b) => format!(" at {b}"),
        None => String::new(),
    }
}

fn summarize(failures: &[BlockFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("[{}: {}]", f.block, f.error))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_carries_block() {
        let err: RasterError = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "short").into();
        let at = BlockRef {
            band: 2,
            block_x: 3,
            block_y: 4,
        };
        let err = err.at_block(at);
        match &err {
            RasterError::IoError { block, .. } => assert_eq!(*block, Some(at)),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(err.to_string(), "I/O error at band 2 block (3, 4): short");
    }

    #[test]
    fn at_block_keeps_existing_context() {
        let first = BlockRef {
            band: 1,
            block_x: 0,
            block_y: 0,
        };
        let err = RasterError::FormatError {
            block: Some(first),
            msg: "bad".into(),
        }
        .at_block(BlockRef {
            band: 1,
            block_x: 9,
            block_y: 9,
        });
        assert!(matches!(err, RasterError::FormatError { block: Some(b), .. } if b == first));
    }
}
