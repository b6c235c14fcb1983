//! Live contents of one allocation: the two planes plus ownership state.
//!
//! The offset plane always exists. The segment plane is materialized the
//! first time anything with a possibly non-zero segment is stored; until
//! then every stored byte is a scalar and segment reads yield constant
//! zero. The copy-on-write owner tag belongs to the enclosing address
//! space: a write may mutate in place only when the tag matches the current
//! state id, otherwise the space clones first — [`ObjectState::clone`] is
//! that fork, sharing update-list tails and resetting the tag.

use std::rc::Rc;
use std::sync::Arc;

use tracing::{debug, trace};

use segmem_expr::{Array, Expr, Term, Width};

use crate::error::{MemResult, MemoryError};
use crate::kvalue::KValue;
use crate::object::MemoryObject;
use crate::plane::ObjectStatePlane;
use crate::solver::TimingSolver;

/// Owner tag of a state no address space has claimed yet.
pub const UNOWNED: u64 = 0;

/// The mutable contents bound to one [`MemoryObject`].
#[derive(Debug)]
pub struct ObjectState {
    object: Rc<MemoryObject>,
    cow_owner: u64,
    read_only: bool,
    segment_plane: Option<ObjectStatePlane>,
    offset_plane: ObjectStatePlane,
}

impl ObjectState {
    /// Concrete, uninitialized contents: every byte reads as zero until the
    /// caller initializes or writes it.
    pub fn new(object: Rc<MemoryObject>) -> Self {
        let size = object.concrete_size().unwrap_or_else(|| {
            panic!("cannot bind contents to a symbolic-size object: {}", object.alloc_info())
        });
        let root = Array::new(format!("mo{}_off", object.id()), size);
        let offset_plane = ObjectStatePlane::concrete(object.clone(), root, 0);
        ObjectState {
            object,
            cow_owner: UNOWNED,
            read_only: false,
            segment_plane: None,
            offset_plane,
        }
    }

    /// Symbolic contents backed by `array`. Segments start out zero: making
    /// a region symbolic makes its *values* unknown, not its provenance.
    pub fn with_array(object: Rc<MemoryObject>, array: Arc<Array>) -> Self {
        let offset_plane = ObjectStatePlane::symbolic(object.clone(), array);
        ObjectState {
            object,
            cow_owner: UNOWNED,
            read_only: false,
            segment_plane: None,
            offset_plane,
        }
    }

    /// Carry contents over to a replacement object (realloc): planes are
    /// forked, the descriptor is swapped.
    pub fn rebind(source: &ObjectState, object: Rc<MemoryObject>) -> Self {
        let mut state = source.clone();
        state.offset_plane.rebind_object(object.clone());
        if let Some(plane) = &mut state.segment_plane {
            plane.rebind_object(object.clone());
        }
        state.object = object;
        state
    }

    /// The descriptor this state is bound to.
    pub fn object(&self) -> &Rc<MemoryObject> {
        &self.object
    }

    /// The copy-on-write owner tag.
    pub fn owner(&self) -> u64 {
        self.cow_owner
    }

    /// Claim the state for an address space.
    pub fn set_owner(&mut self, owner: u64) {
        self.cow_owner = owner;
    }

    /// Writes rejected?
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Toggle write rejection.
    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    /// The value plane.
    pub fn offset_plane(&self) -> &ObjectStatePlane {
        &self.offset_plane
    }

    /// The provenance plane, if it has been materialized.
    pub fn segment_plane(&self) -> Option<&ObjectStatePlane> {
        self.segment_plane.as_ref()
    }

    /// Make all contents concrete zero.
    pub fn initialize_to_zero(&mut self) {
        self.offset_plane.initialize_to_zero();
        if let Some(plane) = &mut self.segment_plane {
            plane.initialize_to_zero();
        }
    }

    /// Make all contents concrete and arbitrary. Segments stay zero:
    /// arbitrary bytes are still scalars.
    pub fn initialize_to_random(&mut self) {
        self.offset_plane.initialize_to_random();
        if let Some(plane) = &mut self.segment_plane {
            plane.initialize_to_zero();
        }
    }

    /// The byte at a concrete offset as a `KValue`.
    pub fn read8(&mut self, offset: usize) -> KValue {
        let segment = match &mut self.segment_plane {
            Some(plane) => plane.read8(offset),
            None => Expr::zero(8),
        };
        KValue::new(segment, self.offset_plane.read8(offset))
    }

    /// A `width`-bit read at a concrete offset, assembled in the context's
    /// byte order.
    pub fn read(&mut self, offset: usize, width: Width) -> KValue {
        let order = self.object.context().byte_order();
        let segment = match &mut self.segment_plane {
            Some(plane) => plane.read(offset, width, order),
            None => Expr::zero(width),
        };
        KValue::new(segment, self.offset_plane.read(offset, width, order))
    }

    /// A `width`-bit read at a symbolic offset.
    pub fn read_symbolic(&mut self, offset: &Term, width: Width) -> KValue {
        let order = self.object.context().byte_order();
        let segment = match &mut self.segment_plane {
            Some(plane) => plane.read_symbolic(offset, width, order),
            None => Expr::zero(width),
        };
        KValue::new(segment, self.offset_plane.read_symbolic(offset, width, order))
    }

    fn check_writable(&self) -> MemResult<()> {
        if self.read_only {
            debug!(object = %self.object.alloc_info(), "rejected write to read-only object");
            return Err(MemoryError::ReadOnlyWrite {
                name: self.object.name(),
                id: self.object.id(),
            });
        }
        Ok(())
    }

    /// Materialize the segment plane when a possibly non-zero segment is
    /// about to be stored. A constant-zero segment costs nothing.
    fn prepare_segment_plane(&mut self, segment: &Term) {
        if self.segment_plane.is_some() {
            return;
        }
        if let Some(bv) = segment.as_constant() {
            if bv.is_zero() {
                return;
            }
        }
        let size = self.offset_plane.size_bound() as u64;
        let root = Array::new(format!("mo{}_seg", self.object.id()), size);
        trace!(object = %self.object.alloc_info(), "materializing segment plane");
        self.segment_plane = Some(ObjectStatePlane::concrete(self.object.clone(), root, 0));
    }

    /// Store `value` at a concrete offset, both planes in step.
    pub fn write(&mut self, offset: usize, value: &KValue) -> MemResult<()> {
        self.check_writable()?;
        self.prepare_segment_plane(value.segment());
        let order = self.object.context().byte_order();
        if let Some(plane) = &mut self.segment_plane {
            plane.write(offset, value.segment(), order);
        }
        self.offset_plane.write(offset, value.offset(), order);
        Ok(())
    }

    /// Store `value` at a symbolic offset. Both planes are flushed before
    /// either write lands, so the solver always sees the two planes of a
    /// byte described by update lists of the same generation.
    pub fn write_symbolic(&mut self, offset: &Term, value: &KValue) -> MemResult<()> {
        self.check_writable()?;
        self.prepare_segment_plane(value.segment());
        let order = self.object.context().byte_order();
        if let Some(plane) = &mut self.segment_plane {
            plane.flush_for_write();
        }
        self.offset_plane.flush_for_write();
        if let Some(plane) = &mut self.segment_plane {
            plane.write_symbolic(offset, value.segment(), order);
        }
        self.offset_plane.write_symbolic(offset, value.offset(), order);
        Ok(())
    }

    /// Concrete byte store: `segment` and `value` are the raw plane bytes.
    pub fn write8_raw(&mut self, offset: usize, segment: u8, value: u8) -> MemResult<()> {
        self.check_writable()?;
        if segment != 0 {
            self.prepare_segment_plane(&Expr::constant(u64::from(segment), 8));
        }
        if let Some(plane) = &mut self.segment_plane {
            plane.write8(offset, segment);
        }
        self.offset_plane.write8(offset, value);
        Ok(())
    }

    /// Concrete 16-bit store of a `(segment, value)` pair.
    pub fn write16_raw(&mut self, offset: usize, segment: u16, value: u16) -> MemResult<()> {
        self.check_writable()?;
        let order = self.object.context().byte_order();
        if segment != 0 {
            self.prepare_segment_plane(&Expr::constant(u64::from(segment), 16));
        }
        if let Some(plane) = &mut self.segment_plane {
            plane.write16(offset, segment, order);
        }
        self.offset_plane.write16(offset, value, order);
        Ok(())
    }

    /// Concrete 32-bit store of a `(segment, value)` pair.
    pub fn write32_raw(&mut self, offset: usize, segment: u32, value: u32) -> MemResult<()> {
        self.check_writable()?;
        let order = self.object.context().byte_order();
        if segment != 0 {
            self.prepare_segment_plane(&Expr::constant(u64::from(segment), 32));
        }
        if let Some(plane) = &mut self.segment_plane {
            plane.write32(offset, segment, order);
        }
        self.offset_plane.write32(offset, value, order);
        Ok(())
    }

    /// Concrete 64-bit store of a `(segment, value)` pair.
    pub fn write64_raw(&mut self, offset: usize, segment: u64, value: u64) -> MemResult<()> {
        self.check_writable()?;
        let order = self.object.context().byte_order();
        if segment != 0 {
            self.prepare_segment_plane(&Expr::constant(segment, 64));
        }
        if let Some(plane) = &mut self.segment_plane {
            plane.write64(offset, segment, order);
        }
        self.offset_plane.write64(offset, value, order);
        Ok(())
    }

    /// Concretize the value plane through the solver. The segment plane is
    /// deliberately left alone: externalization snapshots carry values, not
    /// provenance.
    pub fn flush_to_concrete_store(&mut self, solver: &mut dyn TimingSolver) -> MemResult<()> {
        self.offset_plane.flush_to_concrete_store(solver)
    }
}

/// Forking: planes are deep-copied (update-list tails stay shared), the
/// owner tag resets so the next writer through an address space clones or
/// claims explicitly.
impl Clone for ObjectState {
    fn clone(&self) -> Self {
        trace!(object = %self.object.alloc_info(), "forking object state");
        ObjectState {
            object: self.object.clone(),
            cow_owner: UNOWNED,
            read_only: self.read_only,
            segment_plane: self.segment_plane.clone(),
            offset_plane: self.offset_plane.clone(),
        }
    }
}
