// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! A backend without a GPU.
//!
//! Textures are byte counts charged against an optional budget. Ending an access submits
//! to the device's queue and hands back the queue fence at the submitted serial.

use crate::access::BeginAccessDescriptor;
use crate::device::{Device, DeviceObject};
use crate::error::Error;
use crate::fence::FenceAndSignalValue;
use crate::imp::{Backend, BackendTexture};
use crate::memory::SharedTextureMemory;
use crate::pixel_formats;
use crate::texture::{Texture, TextureDescriptor};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Clones share their budget and fault injection, so a caller can keep one after handing
/// another to [Device::new].
#[derive(Debug, Clone)]
pub struct SoftwareBackend {
    budget: Option<u64>,
    allocated: Arc<AtomicU64>,
    fail_next_end_access: Arc<AtomicBool>,
}

impl SoftwareBackend {
    /// A backend with no memory budget.
    pub fn new() -> Self {
        SoftwareBackend {
            budget: None,
            allocated: Arc::new(AtomicU64::new(0)),
            fail_next_end_access: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A backend that fails texture creation with [Error::OutOfMemory] past `bytes`.
    pub fn with_budget(bytes: u64) -> Self {
        SoftwareBackend {
            budget: Some(bytes),
            ..Self::new()
        }
    }

    /// Makes the next end access hook fail.
    pub fn fail_next_end_access(&self) {
        self.fail_next_end_access.store(true, Ordering::Relaxed);
    }

    /// Bytes held by live textures.
    pub fn allocated_bytes(&self) -> u64 {
        self.allocated.load(Ordering::Relaxed)
    }
}

impl Default for SoftwareBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for SoftwareBackend {
    fn name(&self) -> &'static str {
        "software"
    }

    fn create_texture_impl(
        &self,
        _device: &Device,
        _memory: &SharedTextureMemory,
        descriptor: &TextureDescriptor,
    ) -> Result<BackendTexture, Error> {
        let bytes = pixel_formats::allocation_size(descriptor.format, descriptor.size);
        let reserved = self
            .allocated
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |allocated| {
                let next = allocated.checked_add(bytes)?;
                match self.budget {
                    Some(budget) if next > budget => None,
                    _ => Some(next),
                }
            });
        if reserved.is_err() {
            return Err(Error::OutOfMemory {
                context: format!("allocating {bytes} bytes for texture \"{}\"", descriptor.label),
            });
        }
        logwise::trace_sync!("Allocated {bytes} bytes", bytes = bytes);
        Ok(BackendTexture::Software(SoftwareTexture {
            bytes,
            ledger: Some(self.allocated.clone()),
        }))
    }

    fn begin_access_impl(
        &self,
        _device: &Device,
        _texture: &Texture,
        _descriptor: &BeginAccessDescriptor,
    ) -> Result<(), Error> {
        Ok(())
    }

    fn end_access_impl(&self, device: &Device, texture: &Texture) -> Result<FenceAndSignalValue, Error> {
        if self.fail_next_end_access.swap(false, Ordering::Relaxed) {
            return Err(Error::Internal(format!(
                "end access on {} failed",
                texture.describe()
            )));
        }
        let serial = device.next_serial();
        Ok(FenceAndSignalValue {
            fence: device.queue_fence(),
            signaled_value: serial.0,
        })
    }
}

/// Storage for one software texture.
///
/// Its bytes are returned to the backend's budget on drop.
#[derive(Debug)]
pub struct SoftwareTexture {
    bytes: u64,
    ledger: Option<Arc<AtomicU64>>,
}

impl SoftwareTexture {
    #[cfg(test)]
    pub(crate) fn detached(bytes: u64) -> Self {
        SoftwareTexture { bytes, ledger: None }
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }
}

impl Drop for SoftwareTexture {
    fn drop(&mut self) {
        if let Some(ledger) = &self.ledger {
            ledger.fetch_sub(self.bytes, Ordering::AcqRel);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceDescriptor;
    use crate::memory::{SharedTextureMemoryDescriptor, SharedTextureMemoryProperties};

    fn import(device: &Device) -> SharedTextureMemory {
        device.import_shared_texture_memory(&SharedTextureMemoryDescriptor {
            label: "budgeted".to_string(),
            properties: SharedTextureMemoryProperties {
                usage: wgpu::TextureUsages::TEXTURE_BINDING,
                size: wgpu::Extent3d {
                    width: 16,
                    height: 16,
                    depth_or_array_layers: 1,
                },
                format: wgpu::TextureFormat::Rgba8Unorm,
            },
        })
    }

    #[test]
    #[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
    fn budget_is_enforced_and_released() {
        let backend = SoftwareBackend::with_budget(1024);
        let device = Device::software(DeviceDescriptor::default());
        let memory = import(&device);
        let descriptor = TextureDescriptor::for_properties("a", &memory.properties());

        let first = backend.create_texture_impl(&device, &memory, &descriptor).unwrap();
        assert_eq!(backend.allocated_bytes(), 1024);
        let second = backend.create_texture_impl(&device, &memory, &descriptor);
        assert!(second.unwrap_err().is_out_of_memory());

        drop(first);
        assert_eq!(backend.allocated_bytes(), 0);
        assert!(backend.create_texture_impl(&device, &memory, &descriptor).is_ok());
    }

    #[test]
    #[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
    fn end_access_signals_queue_fence() {
        let backend = SoftwareBackend::new();
        let device = Device::software(DeviceDescriptor::default());
        let memory = import(&device);
        let texture = memory.create_texture(None);
        let produced = backend.end_access_impl(&device, &texture).unwrap();
        assert!(produced.fence.same_fence(&device.queue_fence()));
        assert_eq!(produced.signaled_value, device.last_submitted_serial().0);
        assert_eq!(produced.fence.describe(), device.queue_fence().describe());

        backend.fail_next_end_access();
        assert!(matches!(
            backend.end_access_impl(&device, &texture),
            Err(Error::Internal(_))
        ));
        //only once
        assert!(backend.end_access_impl(&device, &texture).is_ok());
    }
}
