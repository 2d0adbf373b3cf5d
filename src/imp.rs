// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Backend hooks.
//!
//! The access protocol itself is backend-independent. What a texture *is*, and what it
//! means to begin and end an access on one, is up to the [Backend] a [crate::Device] was
//! created with.

use crate::access::BeginAccessDescriptor;
use crate::device::Device;
use crate::error::Error;
use crate::fence::FenceAndSignalValue;
use crate::memory::SharedTextureMemory;
use crate::texture::{Texture, TextureDescriptor};
use std::fmt::Debug;

mod software;
pub use software::{SoftwareBackend, SoftwareTexture};

#[cfg(all(feature = "backend_wgpu", not(target_arch = "wasm32")))]
mod wgpu;
#[cfg(all(feature = "backend_wgpu", not(target_arch = "wasm32")))]
pub use self::wgpu::{RequestError, WgpuBackend};

/// Per-backend hooks called by [SharedTextureMemory] once its own validation has passed.
pub trait Backend: Debug + Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Allocates the backend object for a texture over `memory`.
    fn create_texture_impl(
        &self,
        device: &Device,
        memory: &SharedTextureMemory,
        descriptor: &TextureDescriptor,
    ) -> Result<BackendTexture, Error>;

    fn begin_access_impl(
        &self,
        device: &Device,
        texture: &Texture,
        descriptor: &BeginAccessDescriptor,
    ) -> Result<(), Error>;

    /// Returns the fence, and the value it will reach, once GPU work of this access completes.
    fn end_access_impl(&self, device: &Device, texture: &Texture) -> Result<FenceAndSignalValue, Error>;
}

/// The backend object behind a [Texture].
#[derive(Debug)]
pub enum BackendTexture {
    Software(SoftwareTexture),
    #[cfg(all(feature = "backend_wgpu", not(target_arch = "wasm32")))]
    Wgpu(::wgpu::Texture),
}
