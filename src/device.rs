// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! The device substrate.
//!
//! A [Device] owns everything the access protocol leans on but does not implement itself:
//!
//! - liveness ([Device::validate_is_alive]),
//! - object ownership ([Device::validate_object]),
//! - execution serials for the queue,
//! - the error channel that entry points consume their errors into.

use crate::error::{Error, ReportedError, ValidationError};
use crate::fence::{FenceAndSignalValue, SharedFence, SharedFenceDescriptor, SharedFenceType};
use crate::imp::{Backend, SoftwareBackend};
use crate::memory::{SharedTextureMemory, SharedTextureMemoryDescriptor, SharedTextureMemoryProperties};
use crate::texture::Texture;
use std::collections::VecDeque;
use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

static NEXT_DEVICE_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies an object.
///
/// Object ids are unique within their device; devices themselves draw from a process-wide
/// counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId(pub(crate) u64);

impl ObjectId {
    pub fn get(&self) -> u64 {
        self.0
    }
}

/// A monotonic counter identifying a queue submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ExecutionSerial(pub u64);

/// Anything a device can validate.
pub trait DeviceObject {
    /// Type name used in error messages, e.g. `Texture`.
    const KIND: &'static str;

    fn id(&self) -> ObjectId;
    /// Id of the device that created this object.
    fn device_id(&self) -> ObjectId;
    fn label(&self) -> &str;
    fn is_error(&self) -> bool;

    /// `[Texture "label"]`
    fn describe(&self) -> String {
        format!("[{} \"{}\"]", Self::KIND, self.label())
    }
}

/// Configuration for a [Device].
#[derive(Debug, Clone)]
pub struct DeviceDescriptor {
    pub label: String,
    /// Shared texture memory larger than these limits is rejected at import.
    pub limits: wgpu::Limits,
    /// Most errors kept for [Device::pop_error]; older ones are dropped first.
    pub max_queued_errors: usize,
}

impl Default for DeviceDescriptor {
    fn default() -> Self {
        DeviceDescriptor {
            label: "device".to_string(),
            limits: wgpu::Limits::default(),
            max_queued_errors: 256,
        }
    }
}

type ErrorCallback = Arc<dyn Fn(&ReportedError) + Send + Sync>;

struct DeviceInner {
    id: ObjectId,
    label: String,
    limits: wgpu::Limits,
    backend: Box<dyn Backend>,
    alive: AtomicBool,
    next_object_id: AtomicU64,
    last_submitted_serial: AtomicU64,
    completed_serial: AtomicU64,
    queue_fence: SharedFence,
    //fences referenced by GPU waits, released once their serial completes
    in_flight: Mutex<Vec<(ExecutionSerial, SharedFence)>>,
    errors: Mutex<VecDeque<ReportedError>>,
    max_queued_errors: usize,
    uncaptured_error_callback: Mutex<Option<ErrorCallback>>,
}

impl Debug for DeviceInner {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceInner")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("backend", &self.backend)
            .field("alive", &self.alive)
            .field("last_submitted_serial", &self.last_submitted_serial)
            .field("completed_serial", &self.completed_serial)
            .finish()
    }
}

/// A device that owns shared texture memories, textures and fences.
///
/// Cloning is cheap and yields a handle to the same device.
#[derive(Debug, Clone)]
pub struct Device {
    inner: Arc<DeviceInner>,
}

impl Device {
    pub fn new(descriptor: DeviceDescriptor, backend: Box<dyn Backend>) -> Self {
        let id = ObjectId(NEXT_DEVICE_ID.fetch_add(1, Ordering::Relaxed));
        //object id 1 is the queue fence
        let queue_fence = SharedFence::new(
            id,
            ObjectId(1),
            &SharedFenceDescriptor {
                label: format!("{} queue", descriptor.label),
                kind: SharedFenceType::Timeline,
                handle: 0,
            },
            false,
        );
        logwise::info_sync!(
            "Created device {label} with {backend} backend",
            label = logwise::privacy::LogIt(&descriptor.label),
            backend = logwise::privacy::LogIt(&backend.name())
        );
        Device {
            inner: Arc::new(DeviceInner {
                id,
                label: descriptor.label,
                limits: descriptor.limits,
                backend,
                alive: AtomicBool::new(true),
                next_object_id: AtomicU64::new(2),
                last_submitted_serial: AtomicU64::new(0),
                completed_serial: AtomicU64::new(0),
                queue_fence,
                in_flight: Mutex::new(Vec::new()),
                errors: Mutex::new(VecDeque::new()),
                max_queued_errors: descriptor.max_queued_errors,
                uncaptured_error_callback: Mutex::new(None),
            }),
        }
    }

    /// A device on the [SoftwareBackend] with no memory budget.
    pub fn software(descriptor: DeviceDescriptor) -> Self {
        Self::new(descriptor, Box::new(SoftwareBackend::new()))
    }

    pub fn id(&self) -> ObjectId {
        self.inner.id
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    pub fn limits(&self) -> &wgpu::Limits {
        &self.inner.limits
    }

    pub(crate) fn backend(&self) -> &dyn Backend {
        self.inner.backend.as_ref()
    }

    pub(crate) fn next_object_id(&self) -> ObjectId {
        ObjectId(self.inner.next_object_id.fetch_add(1, Ordering::Relaxed))
    }

    pub fn describe(&self) -> String {
        format!("[Device \"{}\"]", self.inner.label)
    }

    // liveness

    pub fn is_alive(&self) -> bool {
        self.inner.alive.load(Ordering::Acquire)
    }

    /// Loses the device. Every later operation that validates liveness fails.
    pub fn destroy(&self) {
        if self.inner.alive.swap(false, Ordering::AcqRel) {
            logwise::error_sync!(
                "Device {label} was destroyed",
                label = logwise::privacy::LogIt(&self.inner.label)
            );
            self.inner.in_flight.lock().unwrap().clear();
        }
    }

    pub fn validate_is_alive(&self) -> Result<(), Error> {
        if self.is_alive() {
            Ok(())
        } else {
            Err(Error::DeviceLost)
        }
    }

    /// Checks that `object` is a valid object created by this device.
    pub fn validate_object<O: DeviceObject>(&self, object: &O) -> Result<(), Error> {
        if object.is_error() {
            return Err(ValidationError::InvalidObject {
                object: object.describe(),
            }
            .into());
        }
        if object.device_id() != self.inner.id {
            return Err(ValidationError::ForeignObject {
                object: object.describe(),
            }
            .into());
        }
        Ok(())
    }

    // serials

    /// The serial the next submission will get.
    pub fn pending_command_serial(&self) -> ExecutionSerial {
        ExecutionSerial(self.inner.last_submitted_serial.load(Ordering::Acquire) + 1)
    }

    pub fn last_submitted_serial(&self) -> ExecutionSerial {
        ExecutionSerial(self.inner.last_submitted_serial.load(Ordering::Acquire))
    }

    pub fn completed_serial(&self) -> ExecutionSerial {
        ExecutionSerial(self.inner.completed_serial.load(Ordering::Acquire))
    }

    /// Submits pending work and returns its serial.
    pub(crate) fn next_serial(&self) -> ExecutionSerial {
        let serial = self.inner.last_submitted_serial.fetch_add(1, Ordering::AcqRel) + 1;
        logwise::trace_sync!("Submitted serial {serial}", serial = serial);
        ExecutionSerial(serial)
    }

    /// Marks all submitted work complete and releases fences that were only kept alive for it.
    pub fn tick(&self) {
        let completed = self.inner.last_submitted_serial.load(Ordering::Acquire);
        self.inner
            .completed_serial
            .store(completed, Ordering::Release);
        self.inner
            .in_flight
            .lock()
            .unwrap()
            .retain(|(serial, _)| serial.0 > completed);
    }

    /// Fence whose signaled values are this device's execution serials.
    pub fn queue_fence(&self) -> SharedFence {
        self.inner.queue_fence.clone()
    }

    /// Number of fences kept alive by submitted-but-incomplete GPU waits.
    pub fn in_flight_fence_count(&self) -> usize {
        self.inner.in_flight.lock().unwrap().len()
    }

    pub(crate) fn wait_fences(&self, fences: Vec<FenceAndSignalValue>) {
        let serial = self.pending_command_serial();
        let mut in_flight = self.inner.in_flight.lock().unwrap();
        for FenceAndSignalValue {
            fence,
            signaled_value,
        } in fences
        {
            logwise::trace_sync!(
                "Queue waits on {fence} >= {value}",
                fence = logwise::privacy::LogIt(&fence.describe()),
                value = signaled_value
            );
            in_flight.push((serial, fence));
        }
    }

    // errors

    /// Consumes `result`.
    ///
    /// Errors are logged, queued for [Self::pop_error] and passed to the uncaptured error
    /// callback. Returns the success value, if any.
    pub fn consumed_error<T>(
        &self,
        result: Result<T, Error>,
        context: impl FnOnce() -> String,
    ) -> Option<T> {
        match result {
            Ok(t) => Some(t),
            Err(error) => {
                let reported = ReportedError {
                    context: context(),
                    error,
                };
                logwise::warn_sync!(
                    "{device}: {error}",
                    device = logwise::privacy::LogIt(&self.inner.label),
                    error = logwise::privacy::LogIt(&reported.to_string())
                );
                //the callback may re-enter the device, so it runs unlocked
                let callback = self.inner.uncaptured_error_callback.lock().unwrap().clone();
                if let Some(callback) = callback {
                    callback(&reported);
                }
                self.push_error(reported);
                None
            }
        }
    }

    fn push_error(&self, reported: ReportedError) {
        let mut errors = self.inner.errors.lock().unwrap();
        if self.inner.max_queued_errors == 0 {
            return;
        }
        while errors.len() >= self.inner.max_queued_errors {
            if let Some(dropped) = errors.pop_front() {
                logwise::warn_sync!(
                    "{device}: error queue full, dropping {error}",
                    device = logwise::privacy::LogIt(&self.inner.label),
                    error = logwise::privacy::LogIt(&dropped.to_string())
                );
            }
        }
        errors.push_back(reported);
    }

    /// Oldest error not yet popped.
    pub fn pop_error(&self) -> Option<ReportedError> {
        self.inner.errors.lock().unwrap().pop_front()
    }

    pub fn errors_pending(&self) -> usize {
        self.inner.errors.lock().unwrap().len()
    }

    pub fn set_uncaptured_error_callback<F>(&self, callback: F)
    where
        F: Fn(&ReportedError) + Send + Sync + 'static,
    {
        *self.inner.uncaptured_error_callback.lock().unwrap() = Some(Arc::new(callback));
    }

    // factories

    /// Imports shared texture memory.
    ///
    /// Invalid requests yield the error variant of [SharedTextureMemory], whose operations
    /// report errors instead of doing anything.
    pub fn import_shared_texture_memory(
        &self,
        descriptor: &SharedTextureMemoryDescriptor,
    ) -> SharedTextureMemory {
        let result = self
            .validate_is_alive()
            .and_then(|()| self.validate_memory_properties(&descriptor.properties));
        let context = || {
            format!(
                "calling {}.ImportSharedTextureMemory(\"{}\")",
                self.describe(),
                descriptor.label
            )
        };
        match self.consumed_error(result, context) {
            Some(()) => SharedTextureMemory::new(self, descriptor),
            None => SharedTextureMemory::make_error(self, descriptor),
        }
    }

    fn validate_memory_properties(&self, properties: &SharedTextureMemoryProperties) -> Result<(), Error> {
        if properties.usage.is_empty() {
            return Err(ValidationError::EmptyUsage.into());
        }
        let size = properties.size;
        if size.width == 0 || size.height == 0 || size.depth_or_array_layers == 0 {
            return Err(ValidationError::ZeroSize { size }.into());
        }
        let max_2d = self.inner.limits.max_texture_dimension_2d;
        if size.width > max_2d || size.height > max_2d {
            return Err(ValidationError::TooLarge { size, limit: max_2d }.into());
        }
        let max_layers = self.inner.limits.max_texture_array_layers;
        if size.depth_or_array_layers > max_layers {
            return Err(ValidationError::TooLarge {
                size,
                limit: max_layers,
            }
            .into());
        }
        Ok(())
    }

    /// Imports a fence shared by another API or process.
    pub fn import_shared_fence(&self, descriptor: &SharedFenceDescriptor) -> SharedFence {
        let context = || {
            format!(
                "calling {}.ImportSharedFence(\"{}\")",
                self.describe(),
                descriptor.label
            )
        };
        let is_error = self
            .consumed_error(self.validate_is_alive(), context)
            .is_none();
        SharedFence::new(self.inner.id, self.next_object_id(), descriptor, is_error)
    }

    /// Submits work using `textures`.
    ///
    /// Textures created from shared texture memory must currently have access. Each one
    /// waits on the fences pending on its memory before use.
    pub fn submit(&self, textures: &[&Texture]) -> bool {
        let result = self.submit_inner(textures);
        self.consumed_error(result, || format!("calling {}.Submit()", self.describe()))
            .is_some()
    }

    fn submit_inner(&self, textures: &[&Texture]) -> Result<(), Error> {
        self.validate_is_alive()?;
        for texture in textures {
            self.validate_object(*texture)?;
            if texture.shared_texture_memory_state().is_some() && !texture.has_access() {
                return Err(ValidationError::NoAccess {
                    texture: texture.describe(),
                }
                .into());
            }
        }
        for texture in textures {
            texture.synchronize_before_use(self);
        }
        self.next_serial();
        Ok(())
    }
}

impl PartialEq for Device {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Device {}

impl std::hash::Hash for Device {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::ptr::hash(Arc::as_ptr(&self.inner), state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn properties(width: u32) -> SharedTextureMemoryProperties {
        SharedTextureMemoryProperties {
            usage: wgpu::TextureUsages::TEXTURE_BINDING,
            size: wgpu::Extent3d {
                width,
                height: 16,
                depth_or_array_layers: 1,
            },
            format: wgpu::TextureFormat::Rgba8Unorm,
        }
    }

    #[test]
    #[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
    fn serials_advance() {
        let device = Device::software(DeviceDescriptor::default());
        assert_eq!(device.last_submitted_serial(), ExecutionSerial(0));
        assert_eq!(device.pending_command_serial(), ExecutionSerial(1));
        assert_eq!(device.next_serial(), ExecutionSerial(1));
        assert_eq!(device.pending_command_serial(), ExecutionSerial(2));
        assert_eq!(device.completed_serial(), ExecutionSerial(0));
        device.tick();
        assert_eq!(device.completed_serial(), ExecutionSerial(1));
    }

    #[test]
    #[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
    fn destroyed_device_rejects_import() {
        let device = Device::software(DeviceDescriptor::default());
        device.destroy();
        assert!(!device.is_alive());
        let memory = device.import_shared_texture_memory(&SharedTextureMemoryDescriptor {
            label: "lost".to_string(),
            properties: properties(16),
        });
        assert!(memory.is_error());
        assert_eq!(device.pop_error().unwrap().error, Error::DeviceLost);
    }

    #[test]
    #[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
    fn import_validates_limits() {
        let mut descriptor = DeviceDescriptor::default();
        descriptor.limits.max_texture_dimension_2d = 64;
        let device = Device::software(descriptor);
        let memory = device.import_shared_texture_memory(&SharedTextureMemoryDescriptor {
            label: "too wide".to_string(),
            properties: properties(128),
        });
        assert!(memory.is_error());
        let reported = device.pop_error().unwrap();
        assert!(matches!(
            reported.error,
            Error::Validation(ValidationError::TooLarge { limit: 64, .. })
        ));
        assert!(reported.context.contains("ImportSharedTextureMemory"));
    }

    #[test]
    #[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
    fn foreign_objects_fail_validation() {
        let a = Device::software(DeviceDescriptor::default());
        let b = Device::software(DeviceDescriptor::default());
        let fence = b.import_shared_fence(&SharedFenceDescriptor {
            label: "b fence".to_string(),
            kind: SharedFenceType::VkSemaphoreOpaqueFd,
            handle: 3,
        });
        assert!(b.validate_object(&fence).is_ok());
        assert!(matches!(
            a.validate_object(&fence),
            Err(Error::Validation(ValidationError::ForeignObject { .. }))
        ));
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }

    #[test]
    #[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
    fn callback_sees_consumed_errors() {
        let device = Device::software(DeviceDescriptor::default());
        let seen = Arc::new(AtomicUsize::new(0));
        let move_seen = seen.clone();
        device.set_uncaptured_error_callback(move |_| {
            move_seen.fetch_add(1, Ordering::Relaxed);
        });
        let value: Option<u8> = device.consumed_error(Err(Error::DeviceLost), || "test".to_string());
        assert!(value.is_none());
        assert_eq!(device.consumed_error(Ok(3), || "test".to_string()), Some(3));
        assert_eq!(seen.load(Ordering::Relaxed), 1);
        assert_eq!(device.errors_pending(), 1);
    }

    #[test]
    #[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
    fn callback_can_reenter_the_device() {
        let device = Device::software(DeviceDescriptor::default());
        let memory = device.import_shared_texture_memory(&SharedTextureMemoryDescriptor {
            label: "reentrant".to_string(),
            properties: properties(16),
        });
        let texture = memory.create_texture(None);
        let calls = Arc::new(AtomicUsize::new(0));
        let move_calls = calls.clone();
        let move_memory = memory.clone();
        let move_texture = texture.clone();
        device.set_uncaptured_error_callback(move |_| {
            //only the first error recurses
            if move_calls.fetch_add(1, Ordering::Relaxed) == 0 {
                let mut state = crate::access::EndAccessState::default();
                assert!(!move_memory.end_access(&move_texture, &mut state));
                //the nested error lands before the outer one
                assert_eq!(move_memory.device().errors_pending(), 1);
            }
        });
        let mut state = crate::access::EndAccessState::default();
        //no access was begun, so this reports an error
        assert!(!memory.end_access(&texture, &mut state));
        assert_eq!(calls.load(Ordering::Relaxed), 2);
        assert_eq!(device.errors_pending(), 2);
    }

    #[test]
    #[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
    fn error_queue_drops_oldest_when_full() {
        let device = Device::software(DeviceDescriptor {
            max_queued_errors: 4,
            ..Default::default()
        });
        for n in 0..10 {
            let _: Option<()> = device.consumed_error(Err(Error::DeviceLost), || format!("call {n}"));
        }
        assert_eq!(device.errors_pending(), 4);
        assert_eq!(device.pop_error().unwrap().context, "call 6");
        assert_eq!(device.pop_error().unwrap().context, "call 7");
    }

    #[test]
    #[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
    fn zero_capacity_queue_still_notifies() {
        let device = Device::software(DeviceDescriptor {
            max_queued_errors: 0,
            ..Default::default()
        });
        let seen = Arc::new(AtomicUsize::new(0));
        let move_seen = seen.clone();
        device.set_uncaptured_error_callback(move |_| {
            move_seen.fetch_add(1, Ordering::Relaxed);
        });
        let _: Option<()> = device.consumed_error(Err(Error::DeviceLost), || "dropped".to_string());
        assert_eq!(seen.load(Ordering::Relaxed), 1);
        assert_eq!(device.errors_pending(), 0);
    }
}
