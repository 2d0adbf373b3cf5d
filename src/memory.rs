// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Shared texture memory and its access protocol.

A [SharedTextureMemory] is one allocation shared with another API or process. It creates
[Texture] views over that allocation and lets at most one of them be in access at a time.

Both [SharedTextureMemory::begin_access] and [SharedTextureMemory::end_access] run in two
phases. The first phase does the bookkeeping that must survive a failed call: claiming or
releasing the access slot, and recording or draining fences. The second phase validates
and calls into the backend. A failure in the second phase is reported, but the first phase
is never undone, so every `begin_access` that claimed the slot is matched by exactly one
`end_access` and no fence is lost along the way.
*/

pub mod state;

use crate::access::{BeginAccessDescriptor, EndAccessState};
use crate::device::{Device, DeviceObject, ExecutionSerial, ObjectId};
use crate::error::{Error, ValidationError};
use crate::pixel_formats;
use crate::texture::{Texture, TextureDescriptor};
use state::SharedTextureMemoryState;
use std::fmt::{Debug, Formatter};
use std::sync::{Arc, Mutex};
use wgpu::{Extent3d, TextureDimension, TextureFormat, TextureUsages};

/// What the shared allocation is.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SharedTextureMemoryProperties {
    pub usage: TextureUsages,
    pub size: Extent3d,
    pub format: TextureFormat,
}

#[derive(Debug, Clone)]
pub struct SharedTextureMemoryDescriptor {
    pub label: String,
    pub properties: SharedTextureMemoryProperties,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MemoryKind {
    Valid,
    //import failed; every operation reports instead of acting
    Error,
}

pub(crate) struct MemoryInner {
    id: ObjectId,
    device: Device,
    label: String,
    properties: SharedTextureMemoryProperties,
    kind: MemoryKind,
    state: Arc<SharedTextureMemoryState>,
    current_access: Mutex<Option<Texture>>,
}

/// A handle to shared texture memory. Cloning yields a handle to the same memory.
#[derive(Clone)]
pub struct SharedTextureMemory {
    pub(crate) inner: Arc<MemoryInner>,
}

impl SharedTextureMemory {
    pub(crate) fn new(device: &Device, descriptor: &SharedTextureMemoryDescriptor) -> Self {
        Self::with_kind(device, descriptor, MemoryKind::Valid)
    }

    pub(crate) fn make_error(device: &Device, descriptor: &SharedTextureMemoryDescriptor) -> Self {
        Self::with_kind(device, descriptor, MemoryKind::Error)
    }

    fn with_kind(device: &Device, descriptor: &SharedTextureMemoryDescriptor, kind: MemoryKind) -> Self {
        let inner = Arc::new_cyclic(|weak| MemoryInner {
            id: device.next_object_id(),
            device: device.clone(),
            label: descriptor.label.clone(),
            properties: descriptor.properties,
            kind,
            state: Arc::new(SharedTextureMemoryState::new(weak.clone())),
            current_access: Mutex::new(None),
        });
        logwise::info_sync!(
            "Imported shared texture memory {label} ({kind})",
            label = logwise::privacy::LogIt(&descriptor.label),
            kind = logwise::privacy::LogIt(&kind)
        );
        SharedTextureMemory { inner }
    }

    pub fn device(&self) -> &Device {
        &self.inner.device
    }

    /// Whether this is the error variant produced by a failed import.
    pub fn is_error(&self) -> bool {
        self.inner.kind == MemoryKind::Error
    }

    pub fn is_device_lost(&self) -> bool {
        !self.inner.device.is_alive()
    }

    /// State shared with textures created from this memory.
    pub fn state(&self) -> &Arc<SharedTextureMemoryState> {
        &self.inner.state
    }

    pub fn last_usage_serial(&self) -> ExecutionSerial {
        self.inner.state.last_usage_serial()
    }

    /// The texture currently in access, if any.
    pub fn current_access(&self) -> Option<Texture> {
        self.inner.current_access.lock().unwrap().clone()
    }

    fn validate_is_valid(&self) -> Result<(), Error> {
        match self.inner.kind {
            MemoryKind::Valid => Ok(()),
            MemoryKind::Error => Err(ValidationError::InvalidSharedTextureMemory {
                memory: self.describe(),
            }
            .into()),
        }
    }

    /// The properties this memory was imported with.
    ///
    /// On the error variant this also reports an error.
    pub fn properties(&self) -> SharedTextureMemoryProperties {
        self.inner.device.consumed_error(self.validate_is_valid(), || {
            format!("calling {}.GetProperties()", self.describe())
        });
        self.inner.properties
    }

    // texture creation

    /// Creates a texture over this memory.
    ///
    /// With no descriptor the texture takes this memory's size, format and usage. Invalid
    /// requests yield an error texture. New textures have no access until
    /// [Self::begin_access].
    pub fn create_texture(&self, descriptor: Option<&TextureDescriptor>) -> Texture {
        let device = &self.inner.device;
        let descriptor = match descriptor {
            Some(descriptor) => descriptor.clone(),
            None => TextureDescriptor::for_properties(&self.inner.label, &self.inner.properties),
        };
        let context = || format!("calling {}.CreateTexture(\"{}\")", self.describe(), descriptor.label);
        let result = self
            .validate_is_valid()
            .and_then(|()| self.create_texture_inner(&descriptor));
        match device.consumed_error(result, context) {
            Some(texture) => texture,
            None => Texture::make_error(device, descriptor),
        }
    }

    fn create_texture_inner(&self, descriptor: &TextureDescriptor) -> Result<Texture, Error> {
        let device = &self.inner.device;
        device.validate_is_alive()?;
        self.validate_texture_descriptor(descriptor)?;
        let backend = device.backend().create_texture_impl(device, self, descriptor)?;
        let texture = Texture::new(device, descriptor.clone(), backend, Some(self.inner.state.clone()));
        texture.set_has_access(false);
        logwise::info_sync!(
            "Created {texture} from {memory}",
            texture = logwise::privacy::LogIt(&texture.describe()),
            memory = logwise::privacy::LogIt(&self.describe())
        );
        Ok(texture)
    }

    fn validate_texture_descriptor(&self, descriptor: &TextureDescriptor) -> Result<(), ValidationError> {
        let properties = &self.inner.properties;
        if descriptor.dimension != TextureDimension::D2 {
            return Err(ValidationError::Dimension {
                expected: TextureDimension::D2,
                actual: descriptor.dimension,
            });
        }
        if descriptor.mip_level_count != 1 {
            return Err(ValidationError::MipLevelCount {
                actual: descriptor.mip_level_count,
            });
        }
        if descriptor.size.depth_or_array_layers != 1 {
            return Err(ValidationError::ArrayLayerCount {
                actual: descriptor.size.depth_or_array_layers,
            });
        }
        if descriptor.sample_count != 1 {
            return Err(ValidationError::SampleCount {
                actual: descriptor.sample_count,
            });
        }
        if descriptor.size != properties.size {
            return Err(ValidationError::SizeMismatch {
                memory: properties.size,
                descriptor: descriptor.size,
            });
        }
        if descriptor.format != properties.format {
            return Err(ValidationError::FormatMismatch {
                memory: properties.format,
                descriptor: descriptor.format,
            });
        }
        if descriptor.usage.is_empty() {
            return Err(ValidationError::EmptyUsage);
        }
        if !properties.usage.contains(descriptor.usage) {
            return Err(ValidationError::UsageNotSubset {
                requested: descriptor.usage,
                allowed: properties.usage,
            });
        }
        Ok(())
    }

    // access

    /// Begins access with `texture`.
    ///
    /// Returns whether the access slot was claimed. That can be `true` even when the call
    /// reported an error: once the slot is claimed the caller owes one [Self::end_access].
    pub fn begin_access(&self, texture: &Texture, descriptor: &BeginAccessDescriptor) -> bool {
        let context = || format!("calling {}.BeginAccess({})", self.describe(), texture.describe());
        let mut did_begin = false;
        let result = self
            .validate_is_valid()
            .and_then(|()| self.begin_access_inner(texture, descriptor, &mut did_begin));
        self.inner.device.consumed_error(result, context);
        did_begin
    }

    fn begin_access_inner(
        &self,
        texture: &Texture,
        descriptor: &BeginAccessDescriptor,
        did_begin: &mut bool,
    ) -> Result<(), Error> {
        self.claim_access(texture)?;
        *did_begin = true;
        //tracked even if validation below fails
        for fence in &descriptor.fences {
            self.inner.state.push_pending_fence(fence.clone());
        }

        let device = &self.inner.device;
        device.validate_is_alive()?;
        device.validate_object(texture)?;
        for fence in &descriptor.fences {
            device.validate_object(&fence.fence)?;
        }
        if !texture.was_created_from(self) {
            return Err(ValidationError::NotCreatedFromMemory {
                texture: texture.describe(),
                memory: self.describe(),
            }
            .into());
        }
        if pixel_formats::is_multi_planar(texture.format()) && !descriptor.initialized {
            return Err(ValidationError::UninitializedMultiPlanar {
                texture: texture.describe(),
                format: texture.format(),
            }
            .into());
        }

        device.backend().begin_access_impl(device, texture, descriptor)?;
        if !texture.is_error() {
            texture.set_has_access(true);
            texture.set_is_subresource_content_initialized(descriptor.initialized, &texture.all_subresources());
        }
        Ok(())
    }

    fn claim_access(&self, texture: &Texture) -> Result<(), Error> {
        let mut current = self.inner.current_access.lock().unwrap();
        if let Some(current) = current.as_ref() {
            return Err(ValidationError::AlreadyAccessed {
                texture: texture.describe(),
                memory: self.describe(),
                current: current.describe(),
            }
            .into());
        }
        *current = Some(texture.clone());
        logwise::trace_sync!(
            "{texture} claimed access to {memory}",
            texture = logwise::privacy::LogIt(&texture.describe()),
            memory = logwise::privacy::LogIt(&self.describe())
        );
        Ok(())
    }

    /// Clears the access slot.
    ///
    /// Returns whether `texture` was the one holding it. When it was not, the holder loses
    /// its access anyway.
    fn release_access(&self, texture: &Texture) -> bool {
        let previous = self.inner.current_access.lock().unwrap().take();
        match previous {
            Some(previous) if previous == *texture => {
                logwise::trace_sync!(
                    "{texture} released access to {memory}",
                    texture = logwise::privacy::LogIt(&texture.describe()),
                    memory = logwise::privacy::LogIt(&self.describe())
                );
                true
            }
            Some(displaced) => {
                if !displaced.is_error() {
                    displaced.set_has_access(false);
                }
                logwise::warn_sync!(
                    "{displaced} lost access to {memory} through a mismatched end",
                    displaced = logwise::privacy::LogIt(&displaced.describe()),
                    memory = logwise::privacy::LogIt(&self.describe())
                );
                false
            }
            None => false,
        }
    }

    /// Ends access with `texture`, writing the fences to wait on into `state`.
    ///
    /// The access slot is cleared whether or not the call succeeds. `state` is written even
    /// when an error is reported; release what it holds with [EndAccessState::free_members].
    pub fn end_access(&self, texture: &Texture, state: &mut EndAccessState) -> bool {
        let context = || format!("calling {}.EndAccess({})", self.describe(), texture.describe());
        let mut did_end = false;
        let result = self
            .validate_is_valid()
            .and_then(|()| self.end_access_inner(texture, state, &mut did_end));
        if !did_end && result.is_err() {
            //nothing was drained
            state.write(Vec::new(), false);
        }
        self.inner.device.consumed_error(result, context);
        did_end
    }

    fn end_access_inner(
        &self,
        texture: &Texture,
        state: &mut EndAccessState,
        did_end: &mut bool,
    ) -> Result<(), Error> {
        let current = self.current_access().map(|t| t.describe());
        if !self.release_access(texture) {
            return Err(ValidationError::NotCurrentlyAccessed {
                texture: texture.describe(),
                memory: self.describe(),
                current: current.unwrap_or_else(|| "nothing".to_string()),
            }
            .into());
        }
        *did_end = true;

        let mut fences = Vec::new();
        self.inner.state.acquire_pending_fences(&mut fences);
        let drained_count = fences.len() as u64;
        logwise::trace_sync!(
            "Drained {count} pending fences from {memory}",
            count = drained_count,
            memory = logwise::privacy::LogIt(&self.describe())
        );
        if !texture.is_error() {
            texture.set_has_access(false);
        }

        let result = self.end_access_hook(texture).map(|fence| fences.push(fence));
        let initialized =
            texture.is_error() || texture.is_subresource_content_initialized(&texture.all_subresources());
        state.write(fences, initialized);
        result
    }

    fn end_access_hook(&self, texture: &Texture) -> Result<crate::fence::FenceAndSignalValue, Error> {
        let device = &self.inner.device;
        device.validate_is_alive()?;
        device.validate_object(texture)?;
        if !texture.was_created_from(self) {
            return Err(ValidationError::NotCreatedFromMemory {
                texture: texture.describe(),
                memory: self.describe(),
            }
            .into());
        }
        device.backend().end_access_impl(device, texture)
    }
}

impl DeviceObject for SharedTextureMemory {
    const KIND: &'static str = "SharedTextureMemory";

    fn id(&self) -> ObjectId {
        self.inner.id
    }

    fn device_id(&self) -> ObjectId {
        self.inner.device.id()
    }

    fn label(&self) -> &str {
        &self.inner.label
    }

    fn is_error(&self) -> bool {
        self.inner.kind == MemoryKind::Error
    }
}

impl Debug for SharedTextureMemory {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedTextureMemory")
            .field("id", &self.inner.id)
            .field("label", &self.inner.label)
            .field("properties", &self.inner.properties)
            .field("kind", &self.inner.kind)
            .finish()
    }
}

impl PartialEq for SharedTextureMemory {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for SharedTextureMemory {}
