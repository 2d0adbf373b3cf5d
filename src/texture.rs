// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Textures created over shared texture memory.
//!
//! A [Texture] is a view over a [crate::SharedTextureMemory]. It is only usable while
//! its memory has granted it access, and it tracks, per subresource, whether its content is
//! known to be initialized.

use crate::device::{Device, DeviceObject, ObjectId};
use crate::imp::BackendTexture;
use crate::memory::SharedTextureMemory;
use crate::memory::SharedTextureMemoryProperties;
use crate::memory::state::SharedTextureMemoryState;
use crate::pixel_formats;
use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use wgpu::{Extent3d, TextureDimension, TextureFormat, TextureUsages};

/// Describes a texture to create.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureDescriptor {
    pub label: String,
    pub size: Extent3d,
    pub mip_level_count: u32,
    pub sample_count: u32,
    pub dimension: TextureDimension,
    pub format: TextureFormat,
    pub usage: TextureUsages,
}

impl TextureDescriptor {
    /// A single-sampled 2D descriptor matching `properties` exactly.
    pub fn for_properties(label: &str, properties: &SharedTextureMemoryProperties) -> Self {
        TextureDescriptor {
            label: label.to_string(),
            size: properties.size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: TextureDimension::D2,
            format: properties.format,
            usage: properties.usage,
        }
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.label = label.to_string();
        self
    }

    pub fn with_usage(mut self, usage: TextureUsages) -> Self {
        self.usage = usage;
        self
    }

    pub fn with_dimension(mut self, dimension: TextureDimension) -> Self {
        self.dimension = dimension;
        self
    }

    pub fn with_size(mut self, size: Extent3d) -> Self {
        self.size = size;
        self
    }

    pub fn with_format(mut self, format: TextureFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_mip_level_count(mut self, mip_level_count: u32) -> Self {
        self.mip_level_count = mip_level_count;
        self
    }

    pub fn with_sample_count(mut self, sample_count: u32) -> Self {
        self.sample_count = sample_count;
        self
    }

    fn array_layer_count(&self) -> u32 {
        match self.dimension {
            TextureDimension::D2 => self.size.depth_or_array_layers,
            TextureDimension::D1 | TextureDimension::D3 => 1,
        }
    }
}

/// A range of subresources: aspects x mip levels x array layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubresourceRange {
    pub aspect_count: u32,
    pub base_mip_level: u32,
    pub mip_level_count: u32,
    pub base_array_layer: u32,
    pub array_layer_count: u32,
}

impl SubresourceRange {
    pub fn single(aspect_count: u32, mip_level: u32, array_layer: u32) -> Self {
        SubresourceRange {
            aspect_count,
            base_mip_level: mip_level,
            mip_level_count: 1,
            base_array_layer: array_layer,
            array_layer_count: 1,
        }
    }
}

#[derive(Debug)]
enum TextureKind {
    Valid {
        backend: BackendTexture,
        //None for textures not created from shared texture memory
        memory_state: Option<Arc<SharedTextureMemoryState>>,
    },
    Error,
}

pub(crate) struct TextureInner {
    id: ObjectId,
    device: Device,
    descriptor: TextureDescriptor,
    kind: TextureKind,
    has_access: AtomicBool,
    //one flag per subresource, aspect-major
    content_initialized: Mutex<Vec<bool>>,
}

/// A texture handle. Cloning yields a handle to the same texture.
#[derive(Clone)]
pub struct Texture {
    pub(crate) inner: Arc<TextureInner>,
}

impl Texture {
    pub(crate) fn new(
        device: &Device,
        descriptor: TextureDescriptor,
        backend: BackendTexture,
        memory_state: Option<Arc<SharedTextureMemoryState>>,
    ) -> Self {
        let kind = TextureKind::Valid {
            backend,
            memory_state,
        };
        Self::with_kind(device, descriptor, kind)
    }

    /// An inert texture standing in for one that failed to be created.
    pub fn make_error(device: &Device, descriptor: TextureDescriptor) -> Self {
        Self::with_kind(device, descriptor, TextureKind::Error)
    }

    fn with_kind(device: &Device, descriptor: TextureDescriptor, kind: TextureKind) -> Self {
        //error textures track nothing; their descriptor may be arbitrarily large
        let subresources = match kind {
            TextureKind::Valid { .. } => subresource_count(&descriptor),
            TextureKind::Error => 0,
        };
        Texture {
            inner: Arc::new(TextureInner {
                id: device.next_object_id(),
                device: device.clone(),
                kind,
                has_access: AtomicBool::new(true),
                content_initialized: Mutex::new(vec![false; subresources]),
                descriptor,
            }),
        }
    }

    pub fn device(&self) -> &Device {
        &self.inner.device
    }

    pub fn descriptor(&self) -> &TextureDescriptor {
        &self.inner.descriptor
    }

    pub fn format(&self) -> TextureFormat {
        self.inner.descriptor.format
    }

    pub fn size(&self) -> Extent3d {
        self.inner.descriptor.size
    }

    pub fn usage(&self) -> TextureUsages {
        self.inner.descriptor.usage
    }

    pub fn dimension(&self) -> TextureDimension {
        self.inner.descriptor.dimension
    }

    pub fn mip_level_count(&self) -> u32 {
        self.inner.descriptor.mip_level_count
    }

    pub fn sample_count(&self) -> u32 {
        self.inner.descriptor.sample_count
    }

    pub fn backend(&self) -> Option<&BackendTexture> {
        match &self.inner.kind {
            TextureKind::Valid { backend, .. } => Some(backend),
            TextureKind::Error => None,
        }
    }

    #[cfg(all(feature = "backend_wgpu", not(target_arch = "wasm32")))]
    pub fn wgpu_texture(&self) -> Option<&wgpu::Texture> {
        match self.backend() {
            Some(BackendTexture::Wgpu(texture)) => Some(texture),
            _ => None,
        }
    }

    // access

    /// Whether the texture may currently be used.
    ///
    /// Textures created from shared texture memory only have access between a successful
    /// begin and the matching end.
    pub fn has_access(&self) -> bool {
        self.inner.has_access.load(Ordering::Acquire)
    }

    pub(crate) fn set_has_access(&self, has_access: bool) {
        self.inner.has_access.store(has_access, Ordering::Release);
    }

    /// State shared with the memory this texture was created from.
    pub fn shared_texture_memory_state(&self) -> Option<&Arc<SharedTextureMemoryState>> {
        match &self.inner.kind {
            TextureKind::Valid { memory_state, .. } => memory_state.as_ref(),
            TextureKind::Error => None,
        }
    }

    pub(crate) fn was_created_from(&self, memory: &SharedTextureMemory) -> bool {
        self.shared_texture_memory_state()
            .is_some_and(|state| state.belongs_to(memory))
    }

    /// Waits on the memory's pending fences and records this submission as its last use.
    pub(crate) fn synchronize_before_use(&self, device: &Device) {
        if let Some(state) = self.shared_texture_memory_state() {
            let mut fences = Vec::new();
            state.acquire_pending_fences(&mut fences);
            state.set_last_usage_serial(device.pending_command_serial());
            device.wait_fences(fences);
        }
    }

    // subresources

    pub fn all_subresources(&self) -> SubresourceRange {
        SubresourceRange {
            aspect_count: pixel_formats::aspect_count(self.format()),
            base_mip_level: 0,
            mip_level_count: self.inner.descriptor.mip_level_count,
            base_array_layer: 0,
            array_layer_count: self.inner.descriptor.array_layer_count(),
        }
    }

    fn subresource_indices(&self, range: &SubresourceRange) -> impl Iterator<Item = usize> {
        let all = self.all_subresources();
        let mips = all.mip_level_count as usize;
        let layers = all.array_layer_count as usize;
        let range = *range;
        let aspects = range.aspect_count.min(all.aspect_count) as usize;
        let mip_start = range.base_mip_level as usize;
        let mip_end = (range.base_mip_level.saturating_add(range.mip_level_count) as usize).min(mips);
        let layer_start = range.base_array_layer as usize;
        let layer_end =
            (range.base_array_layer.saturating_add(range.array_layer_count) as usize).min(layers);
        (0..aspects).flat_map(move |aspect| {
            (layer_start..layer_end).flat_map(move |layer| {
                (mip_start..mip_end).map(move |mip| (aspect * layers + layer) * mips + mip)
            })
        })
    }

    /// Marks content in `range` as initialized or not.
    ///
    /// Does nothing on an error texture.
    pub fn set_is_subresource_content_initialized(&self, initialized: bool, range: &SubresourceRange) {
        if self.is_error() {
            return;
        }
        let mut flags = self.inner.content_initialized.lock().unwrap();
        for index in self.subresource_indices(range) {
            flags[index] = initialized;
        }
    }

    /// Whether every subresource in `range` holds initialized content.
    ///
    /// Error textures always report initialized content.
    pub fn is_subresource_content_initialized(&self, range: &SubresourceRange) -> bool {
        if self.is_error() {
            return true;
        }
        let flags = self.inner.content_initialized.lock().unwrap();
        self.subresource_indices(range).all(|index| flags[index])
    }
}

fn subresource_count(descriptor: &TextureDescriptor) -> usize {
    let count = u64::from(pixel_formats::aspect_count(descriptor.format))
        * u64::from(descriptor.mip_level_count)
        * u64::from(descriptor.array_layer_count());
    usize::try_from(count).unwrap_or(usize::MAX)
}

impl DeviceObject for Texture {
    const KIND: &'static str = "Texture";

    fn id(&self) -> ObjectId {
        self.inner.id
    }

    fn device_id(&self) -> ObjectId {
        self.inner.device.id()
    }

    fn label(&self) -> &str {
        &self.inner.descriptor.label
    }

    fn is_error(&self) -> bool {
        matches!(self.inner.kind, TextureKind::Error)
    }
}

impl Debug for Texture {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Texture")
            .field("id", &self.inner.id)
            .field("descriptor", &self.inner.descriptor)
            .field("kind", &self.inner.kind)
            .field("has_access", &self.inner.has_access)
            .finish()
    }
}

impl PartialEq for Texture {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Texture {}
