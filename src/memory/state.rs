// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
State shared between a [SharedTextureMemory] and the textures created from it.

Textures keep this state alive, not the memory. The state points back at its memory weakly,
so a texture can still ask which memory it came from after that memory is gone.
*/

use crate::device::ExecutionSerial;
use crate::fence::FenceAndSignalValue;
use crate::memory::{MemoryInner, SharedTextureMemory};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

#[derive(Debug)]
pub struct SharedTextureMemoryState {
    memory: Weak<MemoryInner>,
    pending_fences: Mutex<Vec<FenceAndSignalValue>>,
    last_usage_serial: AtomicU64,
}

impl SharedTextureMemoryState {
    pub(crate) fn new(memory: Weak<MemoryInner>) -> Self {
        SharedTextureMemoryState {
            memory,
            pending_fences: Mutex::new(Vec::new()),
            last_usage_serial: AtomicU64::new(0),
        }
    }

    pub(crate) fn push_pending_fence(&self, fence: FenceAndSignalValue) {
        self.pending_fences.lock().unwrap().push(fence);
    }

    /// Moves every pending fence into `out`, leaving none behind.
    pub fn acquire_pending_fences(&self, out: &mut Vec<FenceAndSignalValue>) {
        let mut pending = self.pending_fences.lock().unwrap();
        if out.is_empty() {
            std::mem::swap(&mut *pending, out);
        } else {
            out.append(&mut pending);
        }
    }

    pub fn pending_fence_count(&self) -> usize {
        self.pending_fences.lock().unwrap().len()
    }

    pub fn set_last_usage_serial(&self, serial: ExecutionSerial) {
        self.last_usage_serial.store(serial.0, Ordering::Release);
    }

    /// Most recent submission that used the memory.
    pub fn last_usage_serial(&self) -> ExecutionSerial {
        ExecutionSerial(self.last_usage_serial.load(Ordering::Acquire))
    }

    /// The memory this state belongs to, if it still exists.
    pub fn shared_texture_memory(&self) -> Option<SharedTextureMemory> {
        self.memory
            .upgrade()
            .map(|inner| SharedTextureMemory { inner })
    }

    /// Whether this state was created for `memory`.
    ///
    /// Compares identity only and never upgrades, so it is safe after the memory is dropped.
    pub fn belongs_to(&self, memory: &SharedTextureMemory) -> bool {
        std::ptr::eq(self.memory.as_ptr(), Arc::as_ptr(&memory.inner))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{Device, DeviceDescriptor};
    use crate::fence::{SharedFenceDescriptor, SharedFenceType};
    use crate::memory::{SharedTextureMemoryDescriptor, SharedTextureMemoryProperties};

    fn memory(device: &Device) -> SharedTextureMemory {
        device.import_shared_texture_memory(&SharedTextureMemoryDescriptor {
            label: "m".to_string(),
            properties: SharedTextureMemoryProperties {
                usage: wgpu::TextureUsages::COPY_SRC,
                size: wgpu::Extent3d {
                    width: 8,
                    height: 8,
                    depth_or_array_layers: 1,
                },
                format: wgpu::TextureFormat::R8Unorm,
            },
        })
    }

    #[test]
    #[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
    fn acquire_drains_everything() {
        let device = Device::software(DeviceDescriptor::default());
        let memory = memory(&device);
        let state = memory.state();
        let fence = device.import_shared_fence(&SharedFenceDescriptor {
            label: "f".to_string(),
            kind: SharedFenceType::MtlSharedEvent,
            handle: 1,
        });
        for value in 1..=3 {
            state.push_pending_fence(FenceAndSignalValue {
                fence: fence.clone(),
                signaled_value: value,
            });
        }
        assert_eq!(state.pending_fence_count(), 3);

        let mut out = Vec::new();
        state.acquire_pending_fences(&mut out);
        assert_eq!(out.len(), 3);
        assert_eq!(state.pending_fence_count(), 0);
        let values: Vec<u64> = out.iter().map(|f| f.signaled_value).collect();
        assert_eq!(values, vec![1, 2, 3]);

        state.acquire_pending_fences(&mut out);
        assert_eq!(out.len(), 3);
    }

    #[test]
    #[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
    fn back_reference_is_weak() {
        let device = Device::software(DeviceDescriptor::default());
        let memory = memory(&device);
        let other = self::memory(&device);
        let state = memory.state().clone();
        assert!(state.belongs_to(&memory));
        assert!(!state.belongs_to(&other));
        assert!(state.shared_texture_memory().is_some());

        drop(memory);
        assert!(state.shared_texture_memory().is_none());
        assert!(!state.belongs_to(&other));
    }

    #[test]
    #[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
    fn last_usage_serial_round_trips() {
        let device = Device::software(DeviceDescriptor::default());
        let memory = memory(&device);
        assert_eq!(memory.state().last_usage_serial(), ExecutionSerial(0));
        memory.state().set_last_usage_serial(ExecutionSerial(42));
        assert_eq!(memory.last_usage_serial(), ExecutionSerial(42));
    }
}
