// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Format facts the access protocol needs.
//!
//! Shared texture memory uses [`wgpu::TextureFormat`] directly. This module answers the few
//! questions the protocol asks about a format:
//!
//! - Is it multi-planar? Multi-planar formats (e.g. NV12) store luma and chroma in separate
//!   planes and cannot be implicitly initialized, so access to them must declare the
//!   content initialized.
//! - How many aspects does it have? Content-initialized state is tracked per aspect.
//! - Roughly how many bytes does a texture of this format occupy? Used for memory budgets.
//!
//! # Examples
//!
//! ```
//! use shared_texture_memory::pixel_formats::{aspect_count, is_multi_planar};
//!
//! assert!(is_multi_planar(wgpu::TextureFormat::NV12));
//! assert_eq!(aspect_count(wgpu::TextureFormat::NV12), 2);
//! assert_eq!(aspect_count(wgpu::TextureFormat::Rgba8Unorm), 1);
//! ```

use wgpu::{Extent3d, TextureAspect, TextureFormat};

/// Whether `format` stores its content in more than one plane.
pub fn is_multi_planar(format: TextureFormat) -> bool {
    format.is_multi_planar_format()
}

/// Number of aspects tracked separately for `format`.
///
/// Every multi-planar format wgpu exposes is biplanar.
pub fn aspect_count(format: TextureFormat) -> u32 {
    if is_multi_planar(format) { 2 } else { 1 }
}

/// Approximate byte footprint of one mip level of `size` in `format`.
pub fn allocation_size(format: TextureFormat, size: Extent3d) -> u64 {
    let width = size.width as u64;
    let height = size.height as u64;
    let layers = size.depth_or_array_layers as u64;
    if is_multi_planar(format) {
        //full-resolution luma plus 2x2-subsampled chroma
        let luma = format.block_copy_size(Some(TextureAspect::Plane0)).unwrap_or(1) as u64;
        let chroma = format.block_copy_size(Some(TextureAspect::Plane1)).unwrap_or(2) as u64;
        let chroma_texels = width.div_ceil(2) * height.div_ceil(2);
        return (width * height * luma + chroma_texels * chroma) * layers;
    }
    let (block_width, block_height) = format.block_dimensions();
    let blocks = width.div_ceil(block_width as u64) * height.div_ceil(block_height as u64);
    //combined depth-stencil formats have no single copy size
    let block_size = format.block_copy_size(None).unwrap_or(8) as u64;
    blocks * block_size * layers
}
