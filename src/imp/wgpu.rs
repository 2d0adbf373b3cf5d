// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
use crate::access::BeginAccessDescriptor;
use crate::device::{Device, DeviceObject};
use crate::error::{Error, ValidationError};
use crate::fence::FenceAndSignalValue;
use crate::imp::{Backend, BackendTexture};
use crate::memory::SharedTextureMemory;
use crate::texture::{Texture, TextureDescriptor};
use wgpu::Trace;

#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("no adapter available for a shared texture memory device")]
    NoSuchAdapter,
    #[error("opening a shared texture memory device: {0}")]
    RequestDeviceError(#[from] wgpu::RequestDeviceError),
}

/// Backs textures with real `wgpu` textures.
#[derive(Debug)]
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
}

impl WgpuBackend {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        WgpuBackend { device, queue }
    }

    /// Picks an adapter from the environment and opens a device on it.
    ///
    /// Fails if the adapter lacks any of `features`. Multi-planar formats need
    /// [wgpu::Features::TEXTURE_FORMAT_NV12] and friends.
    pub async fn request(features: wgpu::Features) -> Result<Self, RequestError> {
        let descriptor = wgpu::InstanceDescriptor::from_env_or_default();
        let instance = wgpu::Instance::new(&descriptor);
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions::default())
            .await
            .map_err(|_| RequestError::NoSuchAdapter)?;
        let descriptor = wgpu::DeviceDescriptor {
            label: wgpu::Label::from("shared texture memory device"),
            required_features: features,
            required_limits: adapter.limits(),
            memory_hints: Default::default(),
            trace: Trace::Off,
        };
        let (device, queue) = adapter.request_device(&descriptor).await?;
        Ok(WgpuBackend { device, queue })
    }

    pub fn wgpu_device(&self) -> &wgpu::Device {
        &self.device
    }

    /// Limits of the underlying device, for use in a [crate::DeviceDescriptor].
    pub fn limits(&self) -> wgpu::Limits {
        self.device.limits()
    }
}

impl Backend for WgpuBackend {
    fn name(&self) -> &'static str {
        "wgpu"
    }

    fn create_texture_impl(
        &self,
        _device: &Device,
        memory: &SharedTextureMemory,
        descriptor: &TextureDescriptor,
    ) -> Result<BackendTexture, Error> {
        let required = descriptor.format.required_features();
        if !self.device.features().contains(required) {
            return Err(Error::Internal(format!(
                "{} needs {:?} for {:?}",
                memory.describe(),
                required,
                descriptor.format
            )));
        }
        let limit = self.device.limits().max_texture_dimension_2d;
        if descriptor.size.width > limit || descriptor.size.height > limit {
            return Err(ValidationError::TooLarge {
                size: descriptor.size,
                limit,
            }
            .into());
        }
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&descriptor.label),
            size: descriptor.size,
            mip_level_count: descriptor.mip_level_count,
            sample_count: descriptor.sample_count,
            dimension: descriptor.dimension,
            format: descriptor.format,
            usage: descriptor.usage,
            view_formats: &[],
        });
        Ok(BackendTexture::Wgpu(texture))
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
        //flush whatever used the texture so the serial covers it
        self.queue.submit(std::iter::empty());
        let serial = device.next_serial();
        logwise::trace_sync!(
            "Flushed wgpu queue for {texture} at serial {serial}",
            texture = logwise::privacy::LogIt(&texture.describe()),
            serial = serial.0
        );
        Ok(FenceAndSignalValue {
            fence: device.queue_fence(),
            signaled_value: serial.0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::RequestError;

    #[test]
    fn request_errors_name_the_failure() {
        assert_eq!(
            RequestError::NoSuchAdapter.to_string(),
            "no adapter available for a shared texture memory device"
        );
        let source: &dyn std::error::Error = &RequestError::NoSuchAdapter;
        assert!(source.source().is_none());
    }
}
