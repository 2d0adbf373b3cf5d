// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Error types for shared texture memory operations.
//!
//! Every fallible internal step returns [`Error`]. The public entry points on
//! [`crate::SharedTextureMemory`] never return these directly; instead they hand the error
//! to the owning [`crate::Device`], which records it as a [`ReportedError`] and
//! the entry point returns a `bool` or an inert error object.

use wgpu::{Extent3d, TextureDimension, TextureFormat, TextureUsages};

/// Top-level error type.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// The caller did something the protocol does not allow.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// An allocator ran out of room.
    #[error("out of memory while {context}")]
    OutOfMemory { context: String },
    /// The owning device was destroyed or lost.
    #[error("device is lost")]
    DeviceLost,
    /// A backend failed in a way that is not the caller's fault.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation(_))
    }

    pub fn is_out_of_memory(&self) -> bool {
        matches!(self, Error::OutOfMemory { .. })
    }

    /// Returns the validation error, if this is one.
    pub fn as_validation(&self) -> Option<&ValidationError> {
        match self {
            Error::Validation(v) => Some(v),
            _ => None,
        }
    }
}

/// Validation failures.
///
/// Shape mismatches carry the expected and the actual value so the report names both.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("texture dimension ({actual:?}) is not {expected:?}")]
    Dimension {
        expected: TextureDimension,
        actual: TextureDimension,
    },
    #[error("mip level count ({actual}) is not 1")]
    MipLevelCount { actual: u32 },
    #[error("array layer count ({actual}) is not 1")]
    ArrayLayerCount { actual: u32 },
    #[error("sample count ({actual}) is not 1")]
    SampleCount { actual: u32 },
    #[error("shared texture memory size ({memory:?}) doesn't match descriptor size ({descriptor:?})")]
    SizeMismatch {
        memory: Extent3d,
        descriptor: Extent3d,
    },
    #[error(
        "shared texture memory format ({memory:?}) doesn't match descriptor format ({descriptor:?})"
    )]
    FormatMismatch {
        memory: TextureFormat,
        descriptor: TextureFormat,
    },
    #[error("texture usage ({requested:?}) is not a subset of the allowed usages ({allowed:?})")]
    UsageNotSubset {
        requested: TextureUsages,
        allowed: TextureUsages,
    },
    #[error("texture usage must not be empty")]
    EmptyUsage,
    #[error("extent ({size:?}) has a zero-sized dimension")]
    ZeroSize { size: Extent3d },
    #[error("extent ({size:?}) exceeds the device limit of {limit}")]
    TooLarge { size: Extent3d, limit: u32 },
    #[error("cannot begin access with {texture} on {memory} which is currently accessed by {current}")]
    AlreadyAccessed {
        texture: String,
        memory: String,
        current: String,
    },
    #[error("{texture} ends access on {memory} but is not currently accessed by it (current: {current})")]
    NotCurrentlyAccessed {
        texture: String,
        memory: String,
        current: String,
    },
    #[error("{object} is invalid")]
    InvalidObject { object: String },
    #[error("{object} is associated with another device")]
    ForeignObject { object: String },
    #[error("{texture} was not created from {memory}")]
    NotCreatedFromMemory { texture: String, memory: String },
    #[error("{texture} with multi-planar format {format:?} must be initialized")]
    UninitializedMultiPlanar {
        texture: String,
        format: TextureFormat,
    },
    #[error("{texture} used in a submit without current access")]
    NoAccess { texture: String },
    #[error("{memory} is an invalid shared texture memory")]
    InvalidSharedTextureMemory { memory: String },
}

/// An error consumed by a device, together with the call that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportedError {
    /// "calling X.Op(Y)" style description of the failing call.
    pub context: String,
    pub error: Error,
}

impl std::fmt::Display for ReportedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}\n - While {}", self.error, self.context)
    }
}

impl std::error::Error for ReportedError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}
