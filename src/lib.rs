// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*! shared_texture_memory coordinates access to GPU texture memory that is shared with
something outside your process or outside your graphics API.

Think of a video decoder writing frames into a texture that your renderer samples, or a
compositor handing a surface back and forth with a client. Both sides touch the same
allocation, and nobody may write while somebody else is reading. The sides agree on
ordering through *fences*: opaque synchronization objects that are signaled with a
monotonically increasing `u64`.

# The protocol

```text
               begin_access(texture, fences in)            end_access(texture)
  [no access] ─────────────────────────────────▶ [texture] ─────────────────────▶ [no access]
                                                                                 + fences out
```

1.  Import a [SharedTextureMemory] on a [Device]. It knows its usage, size and format.
2.  Create one or more [Texture] views with [SharedTextureMemory::create_texture].
    New textures have no access; you cannot use them yet.
3.  Call [SharedTextureMemory::begin_access] with the fences the other side gave you.
    Exactly one texture per memory may be in access at a time.
4.  Use the texture. Submitting work that uses it waits on the fences you passed in.
5.  Call [SharedTextureMemory::end_access]. You get back an [EndAccessState] with the fences
    the other side must wait on before it touches the memory again.

| Step         | On success                             | On failure                                 |
|--------------|----------------------------------------|--------------------------------------------|
| create       | live texture, no access                | inert error texture                        |
| begin_access | slot claimed, texture has access       | slot still claimed if it was free          |
| end_access   | slot released, fences + completion out | slot released, fences still handed back    |

The failure column is deliberate. Once you call `begin_access` on a free memory you owe
it exactly one `end_access`, even if the begin reported an error, and fences you hand in are
never dropped on the floor.

# Errors

Entry points never return `Result`. Like WebGPU, they report into the owning device's
error channel (see [Device::pop_error]) and return `bool` or an inert error object so that
the calling code can carry on.

```
use shared_texture_memory::{BeginAccessDescriptor, Device, DeviceDescriptor, EndAccessState,
    SharedTextureMemoryDescriptor, SharedTextureMemoryProperties};

let device = Device::software(DeviceDescriptor::default());
let memory = device.import_shared_texture_memory(&SharedTextureMemoryDescriptor {
    label: "decoded frame".to_string(),
    properties: SharedTextureMemoryProperties {
        usage: wgpu::TextureUsages::TEXTURE_BINDING,
        size: wgpu::Extent3d { width: 256, height: 256, depth_or_array_layers: 1 },
        format: wgpu::TextureFormat::Rgba8Unorm,
    },
});
let texture = memory.create_texture(None);
assert!(memory.begin_access(&texture, &BeginAccessDescriptor::new(true)));
assert!(texture.has_access());

let mut state = EndAccessState::default();
assert!(memory.end_access(&texture, &mut state));
assert_eq!(state.fence_count(), 1);
assert!(state.initialized);
state.free_members();
```

# Backends

The software backend is always available and is what the tests use. With the
`backend_wgpu` feature (on by default) a `WgpuBackend` creates real `wgpu` textures on
native targets.
*/

pub mod access;
pub mod device;
pub mod error;
pub mod fence;
mod imp;
pub mod memory;
pub mod pixel_formats;
pub mod texture;

pub use access::{BeginAccessDescriptor, EndAccessState};
pub use device::{Device, DeviceDescriptor, DeviceObject, ExecutionSerial, ObjectId};
pub use error::{Error, ReportedError, ValidationError};
pub use fence::{FenceAndSignalValue, SharedFence, SharedFenceDescriptor, SharedFenceType};
pub use imp::{Backend, BackendTexture, SoftwareBackend, SoftwareTexture};
#[cfg(all(feature = "backend_wgpu", not(target_arch = "wasm32")))]
pub use imp::{RequestError, WgpuBackend};
pub use memory::state::SharedTextureMemoryState;
pub use memory::{SharedTextureMemory, SharedTextureMemoryDescriptor, SharedTextureMemoryProperties};
pub use texture::{SubresourceRange, Texture, TextureDescriptor};

pub use wgpu;
