// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Descriptors passed into and out of an access.

use crate::fence::{FenceAndSignalValue, SharedFence};

/// Input to [crate::SharedTextureMemory::begin_access].
#[derive(Debug, Clone, Default)]
pub struct BeginAccessDescriptor {
    /// Fences the queue must wait on before the texture is used.
    pub fences: Vec<FenceAndSignalValue>,
    /// Whether the memory's content is initialized when the access begins.
    pub initialized: bool,
}

impl BeginAccessDescriptor {
    pub fn new(initialized: bool) -> Self {
        BeginAccessDescriptor {
            fences: Vec::new(),
            initialized,
        }
    }

    pub fn with_fence(mut self, fence: SharedFence, signaled_value: u64) -> Self {
        self.fences.push(FenceAndSignalValue {
            fence,
            signaled_value,
        });
        self
    }

    pub fn fence_count(&self) -> usize {
        self.fences.len()
    }
}

/// Output of [crate::SharedTextureMemory::end_access].
///
/// The fences and signaled values are two arrays of equal length. They are `None` rather than
/// empty when no fences were produced. Call [EndAccessState::free_members] (or drop the state)
/// to release the fence references it holds.
#[derive(Debug, Default)]
pub struct EndAccessState {
    fences: Option<Box<[SharedFence]>>,
    signaled_values: Option<Box<[u64]>>,
    /// Whether the memory's content is initialized after the access.
    pub initialized: bool,
}

impl EndAccessState {
    /// Replaces the content of this state.
    ///
    /// The previous arrays, if any, are released first.
    pub(crate) fn write(&mut self, fences: Vec<FenceAndSignalValue>, initialized: bool) {
        self.free_members();
        if !fences.is_empty() {
            let (fences, values): (Vec<_>, Vec<_>) = fences
                .into_iter()
                .map(|f| (f.fence, f.signaled_value))
                .unzip();
            self.fences = Some(fences.into_boxed_slice());
            self.signaled_values = Some(values.into_boxed_slice());
        }
        self.initialized = initialized;
    }

    pub fn fence_count(&self) -> usize {
        self.fences.as_ref().map_or(0, |f| f.len())
    }

    pub fn fences(&self) -> &[SharedFence] {
        self.fences.as_deref().unwrap_or(&[])
    }

    pub fn signaled_values(&self) -> &[u64] {
        self.signaled_values.as_deref().unwrap_or(&[])
    }

    /// Fence and value pairs, in the order they were produced.
    pub fn iter(&self) -> impl Iterator<Item = (&SharedFence, u64)> {
        self.fences().iter().zip(self.signaled_values().iter().copied())
    }

    /// Whether the output arrays are allocated.
    pub fn has_allocated_arrays(&self) -> bool {
        self.fences.is_some() || self.signaled_values.is_some()
    }

    /// Releases every fence reference and both arrays.
    ///
    /// Safe to call more than once.
    pub fn free_members(&mut self) {
        self.fences = None;
        self.signaled_values = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::ObjectId;
    use crate::fence::{SharedFenceDescriptor, SharedFenceType};

    fn fence(handle: u64) -> SharedFence {
        SharedFence::new(
            ObjectId(1),
            ObjectId(handle + 10),
            &SharedFenceDescriptor {
                label: format!("fence {handle}"),
                kind: SharedFenceType::VkSemaphoreSyncFd,
                handle,
            },
            false,
        )
    }

    #[test]
    #[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
    fn empty_write_leaves_arrays_absent() {
        let mut state = EndAccessState::default();
        state.write(Vec::new(), true);
        assert_eq!(state.fence_count(), 0);
        assert!(!state.has_allocated_arrays());
        assert!(state.initialized);
        assert!(state.fences().is_empty());
    }

    #[test]
    #[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
    fn write_keeps_pairs_aligned() {
        let a = fence(1);
        let b = fence(2);
        let mut state = EndAccessState::default();
        state.write(
            vec![
                FenceAndSignalValue {
                    fence: a.clone(),
                    signaled_value: 5,
                },
                FenceAndSignalValue {
                    fence: b.clone(),
                    signaled_value: 9,
                },
            ],
            false,
        );
        assert_eq!(state.fence_count(), 2);
        assert_eq!(state.signaled_values(), &[5, 9]);
        let pairs: Vec<_> = state.iter().map(|(f, v)| (f.export_info().handle, v)).collect();
        assert_eq!(pairs, vec![(1, 5), (2, 9)]);
        assert_eq!(a.strong_count(), 2);

        state.free_members();
        assert_eq!(a.strong_count(), 1);
        assert_eq!(b.strong_count(), 1);
        assert!(!state.has_allocated_arrays());
        //twice is fine
        state.free_members();
        assert_eq!(state.fence_count(), 0);
    }

    #[test]
    #[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
    fn begin_descriptor_builder() {
        let d = BeginAccessDescriptor::new(true).with_fence(fence(3), 7);
        assert_eq!(d.fence_count(), 1);
        assert_eq!(d.fences[0].signaled_value, 7);
        assert!(d.initialized);
    }
}
