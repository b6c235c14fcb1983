//! Allocation lifecycle.
//!
//! The manager mints descriptors: every heap allocation gets a fresh
//! non-zero segment from a per-manager monotone counter, and segments are
//! never reused within one execution even after deallocation. Deallocation
//! only removes the object from lookup — live object states keep the
//! descriptor itself alive through their shared references.

use std::rc::Rc;

use hashbrown::HashMap;
use tracing::debug;

use segmem_expr::{ArrayCache, Term};

use crate::context::Context;
use crate::object::{AllocSite, MemoryObject};

const FIRST_SEGMENT: u64 = 1;

/// Mints and tracks [`MemoryObject`]s.
#[derive(Debug)]
pub struct MemoryManager {
    context: Context,
    array_cache: ArrayCache,
    next_segment: u64,
    by_segment: HashMap<u64, Rc<MemoryObject>>,
}

impl MemoryManager {
    /// A manager for the given target context.
    pub fn new(context: Context) -> Self {
        MemoryManager {
            context,
            array_cache: ArrayCache::new(),
            next_segment: FIRST_SEGMENT,
            by_segment: HashMap::new(),
        }
    }

    /// The target context allocations are created under.
    pub fn context(&self) -> Context {
        self.context
    }

    /// The cache symbolic backing arrays are interned through.
    pub fn array_cache_mut(&mut self) -> &mut ArrayCache {
        &mut self.array_cache
    }

    /// Allocate a fresh object of `size` bytes (possibly symbolic) in a
    /// fresh segment, at base address zero within it.
    pub fn allocate(
        &mut self,
        size: &Term,
        is_local: bool,
        is_global: bool,
        is_fixed: bool,
        alloc_site: AllocSite,
    ) -> Rc<MemoryObject> {
        let segment = self.next_segment;
        self.next_segment += 1;
        let object = Rc::new(MemoryObject::new(
            segment,
            0,
            size,
            is_local,
            is_global,
            is_fixed,
            alloc_site,
            self.context,
        ));
        debug!(info = %object.alloc_info(), "allocated");
        self.by_segment.insert(segment, object.clone());
        object
    }

    /// Allocate a legacy fixed object at a concrete address, outside the
    /// segmented heap (segment zero).
    pub fn allocate_fixed(
        &mut self,
        address: u64,
        size: &Term,
        alloc_site: AllocSite,
    ) -> Rc<MemoryObject> {
        let object = Rc::new(MemoryObject::new(
            0,
            address,
            size,
            false,
            false,
            true,
            alloc_site,
            self.context,
        ));
        debug!(info = %object.alloc_info(), "allocated fixed");
        object
    }

    /// Drop the object from lookup. The segment number is retired for good;
    /// outstanding references keep the descriptor itself valid.
    pub fn deallocate(&mut self, object: &Rc<MemoryObject>) {
        debug!(info = %object.alloc_info(), "deallocated");
        self.by_segment.remove(&object.segment());
    }

    /// Promote an object to global.
    pub fn mark_global(&self, object: &MemoryObject) {
        object.set_global(true);
    }

    /// Name an object for diagnostics.
    pub fn set_name(&self, object: &MemoryObject, name: impl Into<String>) {
        object.set_name(name);
    }

    /// The live object owning `segment`, if any.
    pub fn lookup_segment(&self, segment: u64) -> Option<&Rc<MemoryObject>> {
        self.by_segment.get(&segment)
    }

    /// Number of live (looked-up-able) heap objects.
    pub fn live_objects(&self) -> usize {
        self.by_segment.len()
    }
}

impl Default for MemoryManager {
    fn default() -> Self {
        Self::new(Context::default())
    }
}
