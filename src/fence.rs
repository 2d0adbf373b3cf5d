// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Shared fences.
//!
//! A [SharedFence] is an opaque synchronization object that another API or process
//! signals with increasing `u64` values. This crate never waits on a fence from the CPU; it
//! only moves fence handles between the caller and the queue.

use crate::device::{DeviceObject, ObjectId};
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

/// The OS or API object behind a fence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SharedFenceType {
    VkSemaphoreOpaqueFd,
    VkSemaphoreSyncFd,
    VkSemaphoreZirconHandle,
    DxgiSharedHandle,
    MtlSharedEvent,
    /// A device's own queue timeline.
    Timeline,
}

#[derive(Debug, Clone)]
pub struct SharedFenceDescriptor {
    pub label: String,
    pub kind: SharedFenceType,
    /// Raw handle value (fd, HANDLE, event pointer...). Opaque to this crate.
    pub handle: u64,
}

/// What a receiver needs to import the fence on its side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SharedFenceExportInfo {
    pub kind: SharedFenceType,
    pub handle: u64,
}

struct FenceInner {
    id: ObjectId,
    device_id: ObjectId,
    label: String,
    kind: SharedFenceType,
    handle: u64,
    is_error: bool,
}

/// A reference-counted fence handle.
///
/// Cloning adds a reference, dropping releases one.
#[derive(Clone)]
pub struct SharedFence {
    inner: Arc<FenceInner>,
}

impl SharedFence {
    pub(crate) fn new(
        device_id: ObjectId,
        id: ObjectId,
        descriptor: &SharedFenceDescriptor,
        is_error: bool,
    ) -> Self {
        SharedFence {
            inner: Arc::new(FenceInner {
                id,
                device_id,
                label: descriptor.label.clone(),
                kind: descriptor.kind,
                handle: descriptor.handle,
                is_error,
            }),
        }
    }

    pub fn kind(&self) -> SharedFenceType {
        self.inner.kind
    }

    pub fn export_info(&self) -> SharedFenceExportInfo {
        SharedFenceExportInfo {
            kind: self.inner.kind,
            handle: self.inner.handle,
        }
    }

    /// Number of live handles to this fence.
    pub fn strong_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Whether both handles refer to the same fence.
    pub fn same_fence(&self, other: &SharedFence) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl DeviceObject for SharedFence {
    const KIND: &'static str = "SharedFence";

    fn id(&self) -> ObjectId {
        self.inner.id
    }

    fn device_id(&self) -> ObjectId {
        self.inner.device_id
    }

    fn label(&self) -> &str {
        &self.inner.label
    }

    fn is_error(&self) -> bool {
        self.inner.is_error
    }
}

impl Debug for SharedFence {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedFence")
            .field("id", &self.inner.id)
            .field("label", &self.inner.label)
            .field("kind", &self.inner.kind)
            .field("is_error", &self.inner.is_error)
            .finish()
    }
}

/// A fence and the value it will be signaled with.
#[derive(Debug, Clone)]
pub struct FenceAndSignalValue {
    pub fence: SharedFence,
    pub signaled_value: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> SharedFenceDescriptor {
        SharedFenceDescriptor {
            label: "producer".to_string(),
            kind: SharedFenceType::DxgiSharedHandle,
            handle: 0x44,
        }
    }

    #[test]
    #[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
    fn clone_adds_reference() {
        let fence = SharedFence::new(ObjectId(1), ObjectId(7), &descriptor(), false);
        assert_eq!(fence.strong_count(), 1);
        let other = fence.clone();
        assert_eq!(fence.strong_count(), 2);
        assert!(fence.same_fence(&other));
        drop(other);
        assert_eq!(fence.strong_count(), 1);
    }

    #[test]
    #[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
    fn export_round_trips_descriptor() {
        let fence = SharedFence::new(ObjectId(1), ObjectId(7), &descriptor(), false);
        assert_eq!(
            fence.export_info(),
            SharedFenceExportInfo {
                kind: SharedFenceType::DxgiSharedHandle,
                handle: 0x44
            }
        );
        assert_eq!(fence.describe(), "[SharedFence \"producer\"]");
    }
}
