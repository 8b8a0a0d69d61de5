//! Live GPU resource accounting
//!
//! Renderers report every buffer, texture, material binding and device they
//! create or destroy into a shared [`ResourceCounters`]. The counters outlive
//! the renderer, so callers can check that a torn-down session released
//! everything it allocated.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

/// Kinds of tracked GPU resources
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Buffer,
    Texture,
    MaterialBinding,
    Device,
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceStats {
    pub buffers: usize,
    pub textures: usize,
    pub material_bindings: usize,
    pub devices: usize,
}

impl ResourceStats {
    pub fn is_empty(&self) -> bool {
        *self == ResourceStats::default()
    }
}

#[derive(Debug, Default)]
struct Counters {
    buffers: AtomicUsize,
    textures: AtomicUsize,
    material_bindings: AtomicUsize,
    devices: AtomicUsize,
}

/// Shared, cloneable handle to the live-resource counters
#[derive(Debug, Clone, Default)]
pub struct ResourceCounters {
    inner: Arc<Counters>,
}

impl ResourceCounters {
    pub fn new() -> Self {
        Self::default()
    }

    fn counter(&self, kind: ResourceKind) -> &AtomicUsize {
        match kind {
            ResourceKind::Buffer => &self.inner.buffers,
            ResourceKind::Texture => &self.inner.textures,
            ResourceKind::MaterialBinding => &self.inner.material_bindings,
            ResourceKind::Device => &self.inner.devices,
        }
    }

    pub fn created(&self, kind: ResourceKind, count: usize) {
        self.counter(kind).fetch_add(count, Ordering::Relaxed);
    }

    pub fn released(&self, kind: ResourceKind, count: usize) {
        let counter = self.counter(kind);
        let previous = counter.fetch_sub(count, Ordering::Relaxed);
        debug_assert!(previous >= count, "released more {kind:?} resources than were created");
        if previous < count {
            // Keep the counter meaningful in release builds
            counter.store(0, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> ResourceStats {
        ResourceStats {
            buffers: self.inner.buffers.load(Ordering::Relaxed),
            textures: self.inner.textures.load(Ordering::Relaxed),
            material_bindings: self.inner.material_bindings.load(Ordering::Relaxed),
            devices: self.inner.devices.load(Ordering::Relaxed),
        }
    }
}
