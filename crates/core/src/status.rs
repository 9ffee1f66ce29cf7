//! Transaction status values and their cache encoding.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Where a transaction stands in the ingestion/finalization pipeline.
///
/// Ordering follows the numeric value. `Failed` sits between `Pending` and
/// `Committed`: a failure outranks a later `Pending` observation but never a
/// committed or finalized state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum TransactionStatus {
    Unknown = 0,
    Pending = 1,
    Failed = 2,
    Committed = 3,
    Finalized = 4,
}

impl TransactionStatus {
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Unknown),
            1 => Some(Self::Pending),
            2 => Some(Self::Failed),
            3 => Some(Self::Committed),
            4 => Some(Self::Finalized),
            _ => None,
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unknown => "unknown",
            Self::Pending => "pending",
            Self::Failed => "failed",
            Self::Committed => "committed",
            Self::Finalized => "finalized",
        };
        f.write_str(name)
    }
}

/// Errors decoding a cached status record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordDecodeError {
    #[error("empty status record")]
    Empty,

    #[error("unknown status byte {0}")]
    UnknownStatus(u8),

    #[error("status message is not valid utf-8")]
    InvalidMessage,
}

/// A status plus an optional human-readable message (e.g. a rejection reason).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionStatusRecord {
    pub status: TransactionStatus,
    pub message: Option<String>,
}

impl TransactionStatusRecord {
    pub fn new(status: TransactionStatus) -> Self {
        Self {
            status,
            message: None,
        }
    }

    pub fn with_message(status: TransactionStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: Some(message.into()),
        }
    }

    /// Encode as one status byte followed by the UTF-8 message bytes.
    pub fn encode(&self) -> Vec<u8> {
        let message = self.message.as_deref().unwrap_or_default();
        let mut bytes = Vec::with_capacity(1 + message.len());
        bytes.push(self.status.as_byte());
        bytes.extend_from_slice(message.as_bytes());
        bytes
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, RecordDecodeError> {
        let (&first, rest) = bytes.split_first().ok_or(RecordDecodeError::Empty)?;
        let status =
            TransactionStatus::from_byte(first).ok_or(RecordDecodeError::UnknownStatus(first))?;

        let message = if rest.is_empty() {
            None
        } else {
            let text = std::str::from_utf8(rest).map_err(|_| RecordDecodeError::InvalidMessage)?;
            Some(text.to_owned())
        };

        Ok(Self { status, message })
    }
}

impl From<TransactionStatus> for TransactionStatusRecord {
    fn from(status: TransactionStatus) -> Self {
        Self::new(status)
    }
}
