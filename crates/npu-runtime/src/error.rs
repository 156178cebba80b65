// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for the runtime and the stable error-kind enumeration.
//!
//! Every failure surfaces as a [`RuntimeError`]. Callers that need to branch
//! on category use [`RuntimeError::kind`], which maps every variant
//! (including wrapped lower-layer errors) onto the closed [`ErrorKind`] set.
//! [`ErrorKind::code`] is the stable integer form; `0` means success.

use npu_memory::MemoryError;
use npu_platform::PlatformError;
use model_image::ImageError;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tensor_meta::TensorMetaError;

/// Closed set of failure categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ErrorKind {
    /// Null, zero or out-of-range parameter caught before dispatch.
    InvalidArgument = 1,
    /// Stale, zero or foreign handle.
    InvalidHandle = 2,
    /// Operation not allowed in the current state.
    InvalidState = 3,
    /// Execute with a missing or undersized buffer.
    IoBindingIncomplete = 4,
    /// Activation or transport failure.
    DeviceUnavailable = 5,
    /// Allocation failure, including huge-page exhaustion.
    OutOfResources = 6,
    /// Destroy attempted on a resource with pending dependents.
    Busy = 7,
    /// A wait exceeded the caller's deadline.
    Timeout = 8,
    /// Unexpected internal condition. The affected model is invalidated.
    Internal = 9,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 9] = [
        ErrorKind::InvalidArgument,
        ErrorKind::InvalidHandle,
        ErrorKind::InvalidState,
        ErrorKind::IoBindingIncomplete,
        ErrorKind::DeviceUnavailable,
        ErrorKind::OutOfResources,
        ErrorKind::Busy,
        ErrorKind::Timeout,
        ErrorKind::Internal,
    ];

    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.code() == code)
    }

    /// Result code of a call: `0` on success, the kind's code otherwise.
    pub fn code_of<T>(result: &Result<T, RuntimeError>) -> i32 {
        match result {
            Ok(_) => 0,
            Err(e) => e.code(),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::InvalidArgument => "invalid argument",
            ErrorKind::InvalidHandle => "invalid handle",
            ErrorKind::InvalidState => "invalid state",
            ErrorKind::IoBindingIncomplete => "io binding incomplete",
            ErrorKind::DeviceUnavailable => "device unavailable",
            ErrorKind::OutOfResources => "out of resources",
            ErrorKind::Busy => "busy",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors returned by every runtime operation.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The handle is zero, was never issued, or was invalidated.
    #[error("invalid {kind} handle {raw}")]
    InvalidHandle { kind: &'static str, raw: u64 },

    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A declared tensor is unbound, undersized, or bound to freed memory.
    #[error("io binding incomplete: {direction} '{tensor}' (index {index}): {detail}")]
    IoBindingIncomplete {
        direction: &'static str,
        tensor: String,
        index: usize,
        detail: String,
    },

    #[error("device {device} unavailable: {reason}")]
    DeviceUnavailable { device: u32, reason: String },

    #[error("out of resources: {0}")]
    OutOfResources(String),

    #[error("busy: {0}")]
    Busy(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Unexpected internal condition (corruption, backend protocol desync).
    #[error("fatal: {0}")]
    Fatal(String),

    /// Memory allocation or access failed.
    #[error("memory error: {0}")]
    Memory(#[from] MemoryError),

    /// Model image could not be read or is malformed.
    #[error("model image error: {0}")]
    Image(#[from] ImageError),

    /// Board enumeration or probing failed.
    #[error("platform error: {0}")]
    Platform(#[from] PlatformError),

    /// Tensor metadata query failed.
    #[error("tensor error: {0}")]
    Tensor(#[from] TensorMetaError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl RuntimeError {
    /// Maps this error onto its category.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RuntimeError::InvalidArgument(_) | RuntimeError::Config(_) | RuntimeError::Tensor(_) => {
                ErrorKind::InvalidArgument
            }
            RuntimeError::InvalidHandle { .. } => ErrorKind::InvalidHandle,
            RuntimeError::InvalidState(_) => ErrorKind::InvalidState,
            RuntimeError::IoBindingIncomplete { .. } => ErrorKind::IoBindingIncomplete,
            RuntimeError::DeviceUnavailable { .. } => ErrorKind::DeviceUnavailable,
            RuntimeError::OutOfResources(_) => ErrorKind::OutOfResources,
            RuntimeError::Busy(_) => ErrorKind::Busy,
            RuntimeError::Timeout(_) => ErrorKind::Timeout,
            RuntimeError::Fatal(_) => ErrorKind::Internal,
            RuntimeError::Memory(e) => match e {
                MemoryError::OutOfMemory { .. } => ErrorKind::OutOfResources,
                MemoryError::PoolCorruption(_) => ErrorKind::Internal,
                _ => ErrorKind::InvalidArgument,
            },
            RuntimeError::Image(_) => ErrorKind::InvalidArgument,
            RuntimeError::Platform(e) => match e {
                PlatformError::Unavailable { .. } => ErrorKind::DeviceUnavailable,
                PlatformError::UnknownDevice(_) | PlatformError::InvalidConfig(_) => {
                    ErrorKind::InvalidArgument
                }
            },
        }
    }

    pub fn code(&self) -> i32 {
        self.kind().code()
    }

    pub(crate) fn handle<H: crate::Handle>(h: H) -> Self {
        RuntimeError::InvalidHandle {
            kind: H::KIND,
            raw: h.raw(),
        }
    }
}

/// Locks `m`, mapping poisoning to [`RuntimeError::Fatal`].
pub(crate) fn lock<T>(m: &Mutex<T>) -> Result<MutexGuard<'_, T>, RuntimeError> {
    m.lock()
        .map_err(|_| RuntimeError::Fatal("runtime lock poisoned".into()))
}
