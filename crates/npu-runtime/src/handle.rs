// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Strongly-typed opaque handles and the tables that issue them.
//!
//! Each handle kind is its own type, so a stream can never be passed where a
//! context is expected. Values are never reused within a table and zero is
//! never issued, so stale handles are always detected.

use crate::RuntimeError;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};

/// Common behaviour of every handle type.
pub trait Handle: Copy + Eq + std::hash::Hash + std::fmt::Debug {
    /// Human-readable kind, used in error messages.
    const KIND: &'static str;

    fn from_raw(raw: u64) -> Self;
    fn raw(self) -> u64;

    fn is_null(self) -> bool {
        self.raw() == 0
    }
}

macro_rules! define_handle {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
        pub struct $name(u64);

        impl $name {
            /// The "no handle" value.
            pub const NULL: $name = $name(0);
        }

        impl Handle for $name {
            const KIND: &'static str = $kind;

            fn from_raw(raw: u64) -> Self {
                $name(raw)
            }

            fn raw(self) -> u64 {
                self.0
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}#{}", $kind, self.0)
            }
        }
    };
}

define_handle!(
    /// A logical execution context bound to one device.
    ContextHandle,
    "context"
);
define_handle!(
    /// An ordered asynchronous work queue.
    StreamHandle,
    "stream"
);
define_handle!(
    /// A loaded model.
    ModelId,
    "model"
);
define_handle!(
    /// Introspection handle over a model's IO contract.
    IoInfoHandle,
    "io-info"
);
define_handle!(
    /// A set of buffers bound to a model's inputs and outputs.
    IoSetHandle,
    "io-set"
);
define_handle!(
    /// A per-model execution context.
    ModelContextHandle,
    "model-context"
);

/// Issues handles of one kind and stores their entries.
pub(crate) struct HandleTable<H: Handle, T> {
    next: u64,
    entries: HashMap<u64, T>,
    _kind: PhantomData<H>,
}

impl<H: Handle, T> HandleTable<H, T> {
    pub(crate) fn new() -> Self {
        Self {
            next: 1,
            entries: HashMap::new(),
            _kind: PhantomData,
        }
    }

    pub(crate) fn insert(&mut self, entry: T) -> H {
        let raw = self.next;
        self.next += 1;
        self.entries.insert(raw, entry);
        H::from_raw(raw)
    }

    pub(crate) fn get(&self, h: H) -> Result<&T, RuntimeError> {
        self.entries.get(&h.raw()).ok_or_else(|| RuntimeError::handle(h))
    }

    pub(crate) fn get_mut(&mut self, h: H) -> Result<&mut T, RuntimeError> {
        self.entries
            .get_mut(&h.raw())
            .ok_or_else(|| RuntimeError::handle(h))
    }

    pub(crate) fn remove(&mut self, h: H) -> Result<T, RuntimeError> {
        self.entries
            .remove(&h.raw())
            .ok_or_else(|| RuntimeError::handle(h))
    }

    pub(crate) fn contains(&self, h: H) -> bool {
        self.entries.contains_key(&h.raw())
    }

    /// Removes every entry for which `pred` holds and returns their handles.
    pub(crate) fn remove_where(&mut self, mut pred: impl FnMut(&T) -> bool) -> Vec<(H, T)> {
        let doomed: Vec<u64> = self
            .entries
            .iter()
            .filter(|(_, e)| pred(e))
            .map(|(raw, _)| *raw)
            .collect();
        let mut out: Vec<(H, T)> = doomed
            .into_iter()
            .filter_map(|raw| self.entries.remove(&raw).map(|e| (H::from_raw(raw), e)))
            .collect();
        out.sort_by_key(|(h, _)| h.raw());
        out
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (H, &T)> {
        self.entries.iter().map(|(raw, e)| (H::from_raw(*raw), e))
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

impl<H: Handle, T> Default for HandleTable<H, T> {
    fn default() -> Self {
        Self::new()
    }
}

static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(1);

/// Unique id per manager instance, keying thread-local slots.
pub(crate) fn next_instance_id() -> u64 {
    NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn test_null_never_issued() {
        let mut t: HandleTable<StreamHandle, ()> = HandleTable::new();
        let h = t.insert(());
        assert!(!h.is_null());
        assert!(StreamHandle::NULL.is_null());
        assert_eq!(t.get(StreamHandle::NULL).unwrap_err().kind(), ErrorKind::InvalidHandle);
    }

    #[test]
    fn test_ids_not_reused() {
        let mut t: HandleTable<ModelId, &str> = HandleTable::new();
        let a = t.insert("a");
        t.remove(a).unwrap();
        let b = t.insert("b");
        assert_ne!(a, b);
        assert!(t.get(a).is_err());
        assert!(matches!(
            t.remove(a),
            Err(RuntimeError::InvalidHandle { kind: "model", .. })
        ));
    }

    #[test]
    fn test_remove_where() {
        let mut t: HandleTable<IoSetHandle, u32> = HandleTable::new();
        for v in [1, 2, 1, 3] {
            t.insert(v);
        }
        let removed = t.remove_where(|v| *v == 1);
        assert_eq!(removed.len(), 2);
        assert!(removed[0].0 < removed[1].0);
        assert_eq!(t.len(), 2);
    }

    #[test]
    fn test_display() {
        assert_eq!(ContextHandle::from_raw(3).to_string(), "context#3");
        assert_eq!(format!("{:?}", ModelId::from_raw(9)), "ModelId(9)");
    }
}
