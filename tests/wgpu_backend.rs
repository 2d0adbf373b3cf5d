// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
#![cfg(all(feature = "backend_wgpu", not(target_arch = "wasm32")))]

use shared_texture_memory::wgpu::{self, Extent3d, TextureFormat, TextureUsages};
use shared_texture_memory::{
    BeginAccessDescriptor, Device, DeviceDescriptor, DeviceObject, EndAccessState, SharedTextureMemoryDescriptor,
    SharedTextureMemoryProperties, WgpuBackend,
};
use test_executors::async_test;

async fn backend() -> Option<WgpuBackend> {
    match WgpuBackend::request(wgpu::Features::empty()).await {
        Ok(backend) => Some(backend),
        Err(e) => {
            logwise::warn_sync!(
                "Skipping wgpu test: {err}",
                err = logwise::privacy::LogIt(&e)
            );
            None
        }
    }
}

#[async_test]
async fn wgpu_texture_access_round_trip() {
    let Some(backend) = backend().await else {
        return;
    };
    let limits = backend.limits();
    let device = Device::new(
        DeviceDescriptor {
            label: "wgpu".to_string(),
            limits,
            ..Default::default()
        },
        Box::new(backend),
    );
    let memory = device.import_shared_texture_memory(&SharedTextureMemoryDescriptor {
        label: "shared".to_string(),
        properties: SharedTextureMemoryProperties {
            usage: TextureUsages::TEXTURE_BINDING | TextureUsages::COPY_DST,
            size: Extent3d {
                width: 64,
                height: 64,
                depth_or_array_layers: 1,
            },
            format: TextureFormat::Rgba8Unorm,
        },
    });
    let texture = memory.create_texture(None);
    assert!(texture.wgpu_texture().is_some());
    assert_eq!(texture.wgpu_texture().map(|t| t.width()), Some(64));

    assert!(memory.begin_access(&texture, &BeginAccessDescriptor::new(true)));
    assert!(device.submit(&[&texture]));
    let mut state = EndAccessState::default();
    assert!(memory.end_access(&texture, &mut state));
    assert_eq!(state.fence_count(), 1);
    assert_eq!(state.signaled_values()[0], device.last_submitted_serial().0);
    assert_eq!(device.errors_pending(), 0);
}

#[async_test]
async fn wgpu_rejects_unsupported_multi_planar() {
    let Some(backend) = backend().await else {
        return;
    };
    if backend.wgpu_device().features().contains(wgpu::Features::TEXTURE_FORMAT_NV12) {
        return;
    }
    let device = Device::new(DeviceDescriptor::default(), Box::new(backend));
    let memory = device.import_shared_texture_memory(&SharedTextureMemoryDescriptor {
        label: "video".to_string(),
        properties: SharedTextureMemoryProperties {
            usage: TextureUsages::TEXTURE_BINDING,
            size: Extent3d {
                width: 64,
                height: 64,
                depth_or_array_layers: 1,
            },
            format: TextureFormat::NV12,
        },
    });
    let texture = memory.create_texture(None);
    assert!(texture.is_error());
    let reported = device.pop_error().expect("missing feature reported");
    assert!(matches!(reported.error, shared_texture_memory::Error::Internal(_)));
}
