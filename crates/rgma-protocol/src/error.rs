// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types shared by every layer of the protocol engine.
//!
//! Callers only ever see [`RgmaError`]. A single servlet round trip can also
//! report that the server has forgotten the resource; that outcome is carried
//! by [`CallError::UnknownResource`] and is consumed by the resource proxy.

use thiserror::Error;

/// Message carried by an unknown-resource answer once it is surfaced.
pub const UNKNOWN_RESOURCE_MESSAGE: &str = "Unknown resource.";

/// A classified failure returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RgmaError {
    /// Retrying later may succeed.
    #[error("temporary error: {message}")]
    Temporary {
        message: String,
        /// Statements committed before the failure (batch inserts only)
        num_successful_ops: u32,
    },

    /// Retrying will not help.
    #[error("permanent error: {message}")]
    Permanent {
        message: String,
        /// Statements committed before the failure (batch inserts only)
        num_successful_ops: u32,
    },
}

impl RgmaError {
    pub fn temporary(message: impl Into<String>) -> Self {
        Self::Temporary {
            message: message.into(),
            num_successful_ops: 0,
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::Permanent {
            message: message.into(),
            num_successful_ops: 0,
        }
    }

    /// Human-readable message without the classification prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::Temporary { message, .. } | Self::Permanent { message, .. } => message,
        }
    }

    pub fn num_successful_ops(&self) -> u32 {
        match self {
            Self::Temporary {
                num_successful_ops, ..
            }
            | Self::Permanent {
                num_successful_ops, ..
            } => *num_successful_ops,
        }
    }

    pub fn is_temporary(&self) -> bool {
        matches!(self, Self::Temporary { .. })
    }

    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent { .. })
    }
}

/// Outcome of a failed servlet round trip.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
    #[error(transparent)]
    Failed(#[from] RgmaError),

    /// The server has no record of the addressed resource.
    #[error("unknown resource")]
    UnknownResource,
}

impl CallError {
    pub fn is_unknown_resource(&self) -> bool {
        matches!(self, Self::UnknownResource)
    }
}

impl From<CallError> for RgmaError {
    /// An unknown resource that reaches this conversion is no longer
    /// recoverable here and surfaces as a temporary failure.
    fn from(err: CallError) -> Self {
        match err {
            CallError::Failed(err) => err,
            CallError::UnknownResource => RgmaError::temporary(UNKNOWN_RESOURCE_MESSAGE),
        }
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, RgmaError>;
