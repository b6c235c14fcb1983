//! One byte-addressable plane of an object's contents.
//!
//! A plane tracks each byte in the most precise form available: a concrete
//! byte in `concrete_store`, a known symbolic term in `known_symbolics`, or
//! — once symbolic indices get involved — an entry in the persistent update
//! list the solver reads. The `unflushed` mask marks precisely-known bytes
//! that have not yet been folded into the update list; flushing folds them
//! in lazily, only when a symbolic-index access actually needs the list to
//! be complete.
//!
//! Invariants, holding at every public-method boundary:
//! - a byte is never both concrete and known-symbolic;
//! - an unflushed byte is precisely known (concrete or known-symbolic);
//! - the abstract value of byte `i` is its known-symbolic term if present,
//!   else its concrete byte if masked concrete, else `initial_value` on a
//!   non-symbolic plane, else whatever the update list implies over the
//!   root array.

use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use fixedbitset::FixedBitSet;
use rand::Rng;
use tracing::trace;

use segmem_expr::{Array, Expr, Term, UpdateList, Width, BOOL_WIDTH};

use crate::context::ByteOrder;
use crate::error::MemResult;
use crate::object::MemoryObject;
use crate::solver::TimingSolver;

/// One plane: concrete bytes, known symbolic bytes, and the lazy update
/// list serving symbolic-index accesses.
#[derive(Clone)]
pub struct ObjectStatePlane {
    object: Rc<MemoryObject>,
    /// Concrete byte contents; empty until materialized, in which case
    /// every byte reads as `initial_value`.
    concrete_store: Vec<u8>,
    concrete_mask: FixedBitSet,
    /// Lazily allocated; an empty vector means no byte is known-symbolic.
    known_symbolics: Vec<Option<Term>>,
    unflushed_mask: FixedBitSet,
    updates: UpdateList,
    size_bound: usize,
    symbolic: bool,
    initial_value: u8,
}

fn concrete_bound(object: &MemoryObject) -> usize {
    let Some(size) = object.concrete_size() else {
        panic!("cannot bind contents to a symbolic-size object: {}", object.alloc_info());
    };
    size as usize
}

/// Copy of `mask` at a new length; `fill` decides whether bits gained by
/// growth come up set.
fn resized_mask(mask: &FixedBitSet, new_len: usize, fill: bool) -> FixedBitSet {
    let mut out = FixedBitSet::with_capacity(new_len);
    for bit in mask.ones() {
        if bit < new_len {
            out.insert(bit);
        }
    }
    if fill && new_len > mask.len() {
        out.set_range(mask.len().., true);
    }
    out
}

impl ObjectStatePlane {
    /// A concrete plane over `root`, with every byte reading as
    /// `initial_value` until written. Born fully concrete and fully
    /// unflushed.
    pub fn concrete(object: Rc<MemoryObject>, root: Arc<Array>, initial_value: u8) -> Self {
        let size_bound = concrete_bound(&object);
        let mut all = FixedBitSet::with_capacity(size_bound);
        all.set_range(.., true);
        ObjectStatePlane {
            object,
            concrete_store: Vec::new(),
            concrete_mask: all.clone(),
            known_symbolics: Vec::new(),
            unflushed_mask: all,
            updates: UpdateList::new(root),
            size_bound,
            symbolic: false,
            initial_value,
        }
    }

    /// A symbolic plane whose bytes come from `array`. Nothing is precisely
    /// known; every read resolves through the update list into the array.
    pub fn symbolic(object: Rc<MemoryObject>, array: Arc<Array>) -> Self {
        let size_bound = concrete_bound(&object);
        assert_eq!(
            array.size(),
            size_bound as u64,
            "backing array size does not match object size"
        );
        ObjectStatePlane {
            object,
            concrete_store: Vec::new(),
            concrete_mask: FixedBitSet::with_capacity(size_bound),
            known_symbolics: Vec::new(),
            unflushed_mask: FixedBitSet::with_capacity(size_bound),
            updates: UpdateList::new(array),
            size_bound,
            symbolic: true,
            initial_value: 0,
        }
    }

    /// Number of bytes this plane addresses.
    pub fn size_bound(&self) -> usize {
        self.size_bound
    }

    /// True iff the plane was initialized from a symbolic array.
    pub fn is_symbolic(&self) -> bool {
        self.symbolic
    }

    /// The write log backing symbolic-index accesses.
    pub fn updates(&self) -> &UpdateList {
        &self.updates
    }

    /// The concrete byte image (externalization snapshot). Bytes never
    /// materialized read as the plane's initial value.
    pub fn concrete_byte(&self, offset: usize) -> u8 {
        assert!(offset < self.size_bound, "byte {offset} past plane bound {}", self.size_bound);
        self.concrete_value(offset)
    }

    /// Swap the owning object and resize the per-byte state to its size.
    /// Bytes gained by growth read as the initial value and start out
    /// precisely known, like a freshly built concrete plane; shrinking
    /// truncates every per-byte map so the plane's own bound is tight again.
    pub(crate) fn rebind_object(&mut self, object: Rc<MemoryObject>) {
        let new_bound = concrete_bound(&object);
        let old_bound = self.size_bound;
        self.object = object;
        if new_bound == old_bound {
            return;
        }
        self.concrete_mask = resized_mask(&self.concrete_mask, new_bound, true);
        self.unflushed_mask = resized_mask(&self.unflushed_mask, new_bound, true);
        if !self.concrete_store.is_empty() {
            self.concrete_store.resize(new_bound, self.initial_value);
        }
        if !self.known_symbolics.is_empty() {
            self.known_symbolics.resize(new_bound, None);
        }
        self.size_bound = new_bound;
    }

    fn concrete_value(&self, offset: usize) -> u8 {
        self.concrete_store.get(offset).copied().unwrap_or(self.initial_value)
    }

    fn materialize_store(&mut self) {
        if self.concrete_store.is_empty() {
            self.concrete_store = vec![self.initial_value; self.size_bound];
        }
    }

    fn known_symbolic(&self, offset: usize) -> Option<&Term> {
        self.known_symbolics.get(offset).and_then(Option::as_ref)
    }

    fn set_known_symbolic(&mut self, offset: usize, value: Term) {
        if self.known_symbolics.is_empty() {
            self.known_symbolics = vec![None; self.size_bound];
        }
        self.known_symbolics[offset] = Some(value);
    }

    fn index_term(&self, offset: usize) -> Term {
        Expr::constant(offset as u64, self.object.context().pointer_width())
    }

    /// Make every byte concrete zero.
    pub fn initialize_to_zero(&mut self) {
        self.concrete_store = vec![0; self.size_bound];
        self.make_all_concrete();
    }

    /// Make every byte concrete with an arbitrary value.
    pub fn initialize_to_random(&mut self) {
        let mut rng = rand::rng();
        self.concrete_store = (0..self.size_bound).map(|_| rng.random()).collect();
        self.make_all_concrete();
    }

    fn make_all_concrete(&mut self) {
        self.concrete_mask.set_range(.., true);
        self.known_symbolics.clear();
        self.unflushed_mask.set_range(.., true);
    }

    /// The byte at a concrete offset, in its most precise form: a constant,
    /// a known symbolic term, or a read through the update list.
    pub fn read8(&mut self, offset: usize) -> Term {
        assert!(offset < self.size_bound, "read past plane bound: {offset} >= {}", self.size_bound);
        if self.concrete_mask.contains(offset) {
            return Expr::constant(u64::from(self.concrete_value(offset)), 8);
        }
        if let Some(term) = self.known_symbolic(offset) {
            return term.clone();
        }
        self.flush_for_read();
        let index = self.index_term(offset);
        Expr::read(&self.updates, &index)
    }

    /// The byte at a symbolic offset: always a read through the (completed)
    /// update list.
    pub fn read8_symbolic(&mut self, index: &Term) -> Term {
        self.flush_for_read();
        Expr::read(&self.updates, index)
    }

    /// A `width`-bit read at a concrete offset, assembled in `order`.
    /// Width 1 reads the low bit of the addressed byte.
    pub fn read(&mut self, offset: usize, width: Width, order: ByteOrder) -> Term {
        if width == BOOL_WIDTH {
            let byte = self.read8(offset);
            return Expr::extract(&byte, 0, 1);
        }
        assert!(width % 8 == 0, "read of non-byte width {width}");
        let bytes = (width / 8) as usize;
        assert!(
            offset + bytes <= self.size_bound,
            "read past plane bound: {offset}+{bytes} > {}",
            self.size_bound
        );
        let mut result = self.read8(offset);
        for k in 1..bytes {
            let byte = self.read8(offset + k);
            result = match order {
                ByteOrder::LittleEndian => Expr::concat(&byte, &result),
                ByteOrder::BigEndian => Expr::concat(&result, &byte),
            };
        }
        result
    }

    /// A `width`-bit read at a symbolic offset.
    pub fn read_symbolic(&mut self, offset: &Term, width: Width, order: ByteOrder) -> Term {
        if width == BOOL_WIDTH {
            let byte = self.read8_symbolic(offset);
            return Expr::extract(&byte, 0, 1);
        }
        assert!(width % 8 == 0, "read of non-byte width {width}");
        let bytes = (width / 8) as usize;
        let mut result = self.read8_symbolic(offset);
        for k in 1..bytes {
            let index = Expr::add(offset, &self.index_term(k));
            let byte = self.read8_symbolic(&index);
            result = match order {
                ByteOrder::LittleEndian => Expr::concat(&byte, &result),
                ByteOrder::BigEndian => Expr::concat(&result, &byte),
            };
        }
        result
    }

    /// Store a concrete byte.
    pub fn write8(&mut self, offset: usize, value: u8) {
        assert!(offset < self.size_bound, "write past plane bound: {offset} >= {}", self.size_bound);
        self.materialize_store();
        self.concrete_store[offset] = value;
        self.concrete_mask.insert(offset);
        if let Some(slot) = self.known_symbolics.get_mut(offset) {
            *slot = None;
        }
        self.unflushed_mask.insert(offset);
    }

    /// Store a byte-wide term; constants take the concrete path.
    pub fn write8_term(&mut self, offset: usize, value: &Term) {
        assert_eq!(value.width(), 8, "byte write of {}-bit term", value.width());
        if let Some(bv) = value.as_constant() {
            self.write8(offset, bv.bits() as u8);
            return;
        }
        assert!(offset < self.size_bound, "write past plane bound: {offset} >= {}", self.size_bound);
        self.set_known_symbolic(offset, value.clone());
        self.concrete_mask.set(offset, false);
        self.unflushed_mask.insert(offset);
    }

    /// Store a byte-wide term at a symbolic offset. The whole plane is
    /// flushed first so the update list alone describes the contents, then
    /// the write lands as the newest entry.
    pub fn write8_symbolic(&mut self, index: &Term, value: &Term) {
        assert_eq!(value.width(), 8, "byte write of {}-bit term", value.width());
        self.flush_for_write();
        self.updates.extend(index.clone(), value.clone());
    }

    /// A `width`-bit write at a concrete offset, fanned out in `order`.
    /// Width 1 zero-extends to a byte.
    pub fn write(&mut self, offset: usize, value: &Term, order: ByteOrder) {
        let width = value.width();
        if width == BOOL_WIDTH {
            self.write(offset, &Expr::zext(value, 8), order);
            return;
        }
        assert!(width % 8 == 0, "write of non-byte width {width}");
        let bytes = (width / 8) as usize;
        assert!(
            offset + bytes <= self.size_bound,
            "write past plane bound: {offset}+{bytes} > {}",
            self.size_bound
        );
        for k in 0..bytes {
            let byte = Expr::extract(value, (8 * k) as u32, 8);
            let position = match order {
                ByteOrder::LittleEndian => offset + k,
                ByteOrder::BigEndian => offset + bytes - 1 - k,
            };
            self.write8_term(position, &byte);
        }
    }

    /// A `width`-bit write at a symbolic offset.
    pub fn write_symbolic(&mut self, offset: &Term, value: &Term, order: ByteOrder) {
        let width = value.width();
        if width == BOOL_WIDTH {
            self.write_symbolic(offset, &Expr::zext(value, 8), order);
            return;
        }
        assert!(width % 8 == 0, "write of non-byte width {width}");
        let bytes = (width / 8) as usize;
        for k in 0..bytes {
            let byte = Expr::extract(value, (8 * k) as u32, 8);
            let delta = match order {
                ByteOrder::LittleEndian => k,
                ByteOrder::BigEndian => bytes - 1 - k,
            };
            let index = Expr::add(offset, &self.index_term(delta));
            self.write8_symbolic(&index, &byte);
        }
    }

    /// Concrete 16-bit convenience write.
    pub fn write16(&mut self, offset: usize, value: u16, order: ByteOrder) {
        self.write_concrete_bytes(offset, &value.to_le_bytes(), order);
    }

    /// Concrete 32-bit convenience write.
    pub fn write32(&mut self, offset: usize, value: u32, order: ByteOrder) {
        self.write_concrete_bytes(offset, &value.to_le_bytes(), order);
    }

    /// Concrete 64-bit convenience write.
    pub fn write64(&mut self, offset: usize, value: u64, order: ByteOrder) {
        self.write_concrete_bytes(offset, &value.to_le_bytes(), order);
    }

    fn write_concrete_bytes(&mut self, offset: usize, le_bytes: &[u8], order: ByteOrder) {
        for (k, &byte) in le_bytes.iter().enumerate() {
            let position = match order {
                ByteOrder::LittleEndian => offset + k,
                ByteOrder::BigEndian => offset + le_bytes.len() - 1 - k,
            };
            self.write8(position, byte);
        }
    }

    /// Fold every precisely-known, unflushed byte into the update list. The
    /// bytes stay precisely known; a second call is a no-op.
    pub fn flush_for_read(&mut self) {
        if self.unflushed_mask.count_ones(..) == 0 {
            return;
        }
        let pending: Vec<usize> = self.unflushed_mask.ones().collect();
        trace!(
            object = %self.object.alloc_info(),
            bytes = pending.len(),
            "flushing plane for read"
        );
        for offset in pending {
            debug_assert!(
                self.concrete_mask.contains(offset) || self.known_symbolic(offset).is_some(),
                "unflushed byte {offset} has no precise value"
            );
            let value = match self.known_symbolic(offset) {
                Some(term) => term.clone(),
                None => Expr::constant(u64::from(self.concrete_value(offset)), 8),
            };
            let index = self.index_term(offset);
            self.updates.extend(index, value);
        }
        self.unflushed_mask.clear();
    }

    /// Flush as for a read, then drop all per-byte precision: after a write
    /// at a symbolic offset any byte may have been overwritten, so only the
    /// update list may speak for the contents. Bytes that were already
    /// imprecise are by invariant represented there (an earlier entry, or
    /// the symbolic root array itself) and need no new entry.
    pub fn flush_for_write(&mut self) {
        self.flush_for_read();
        self.concrete_mask.clear();
        self.known_symbolics.clear();
    }

    /// Ask the solver for a concrete value of every non-concrete byte and
    /// store it into the concrete image. Masks and known-symbolic terms are
    /// untouched: this is an externalization snapshot, not a state change.
    /// On solver failure the remaining bytes are left as they were.
    pub fn flush_to_concrete_store(&mut self, solver: &mut dyn TimingSolver) -> MemResult<()> {
        for offset in 0..self.size_bound {
            if self.concrete_mask.contains(offset) {
                continue;
            }
            let term = match self.known_symbolic(offset) {
                Some(term) => term.clone(),
                None => {
                    let index = self.index_term(offset);
                    Expr::read(&self.updates, &index)
                }
            };
            let value = solver.get_value(&term)?;
            self.materialize_store();
            self.concrete_store[offset] = value.bits() as u8;
        }
        Ok(())
    }
}

impl fmt::Debug for ObjectStatePlane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // One state character per byte: concrete, symbolic, or flushed,
        // uppercase while unflushed.
        let states: String = (0..self.size_bound)
            .map(|i| {
                let c = if self.concrete_mask.contains(i) {
                    'c'
                } else if self.known_symbolic(i).is_some() {
                    's'
                } else {
                    'f'
                };
                if self.unflushed_mask.contains(i) {
                    c.to_ascii_uppercase()
                } else {
                    c
                }
            })
            .collect();
        f.debug_struct("ObjectStatePlane")
            .field("object", &self.object.alloc_info())
            .field("symbolic", &self.symbolic)
            .field("bytes", &states)
            .field("updates", &self.updates.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::object::AllocSite;
    use crate::solver::AssignmentSolver;
    use segmem_expr::Assignment;

    fn test_object(size: u64) -> Rc<MemoryObject> {
        Rc::new(MemoryObject::new(
            1,
            0,
            &Expr::constant(size, 64),
            true,
            false,
            false,
            AllocSite::UNKNOWN,
            Context::default(),
        ))
    }

    fn concrete_plane(size: u64) -> ObjectStatePlane {
        let object = test_object(size);
        let root = Array::new(format!("mo{}_test", object.id()), size);
        ObjectStatePlane::concrete(object, root, 0)
    }

    fn symbolic_index(name: &str) -> Term {
        let byte = Expr::read(&UpdateList::new(Array::new(name, 1)), &Expr::constant(0, 32));
        Expr::zext(&byte, 64)
    }

    #[test]
    fn unwritten_bytes_read_as_initial_value() {
        let object = test_object(4);
        let root = Array::new("seg_root", 4);
        let mut plane = ObjectStatePlane::concrete(object, root, 0xee);
        assert_eq!(plane.read8(2).as_constant().unwrap().bits(), 0xee);
    }

    #[test]
    fn concrete_roundtrip_little_endian() {
        let mut plane = concrete_plane(4);
        for (i, b) in [0x11u8, 0x22, 0x33, 0x44].into_iter().enumerate() {
            plane.write8(i, b);
        }
        let word = plane.read(0, 32, ByteOrder::LittleEndian);
        assert_eq!(word.as_constant().unwrap().bits(), 0x44332211);
        let word = plane.read(0, 32, ByteOrder::BigEndian);
        assert_eq!(word.as_constant().unwrap().bits(), 0x11223344);
    }

    #[test]
    fn wide_write_fans_out_per_byte_order() {
        let mut plane = concrete_plane(4);
        plane.write(0, &Expr::constant(0xaabbccdd, 32), ByteOrder::LittleEndian);
        assert_eq!(plane.read8(0).as_constant().unwrap().bits(), 0xdd);
        assert_eq!(plane.read8(3).as_constant().unwrap().bits(), 0xaa);

        let mut plane = concrete_plane(4);
        plane.write(0, &Expr::constant(0xaabbccdd, 32), ByteOrder::BigEndian);
        assert_eq!(plane.read8(0).as_constant().unwrap().bits(), 0xaa);
        assert_eq!(plane.read8(3).as_constant().unwrap().bits(), 0xdd);
    }

    #[test]
    fn constant_term_writes_take_the_concrete_path() {
        let mut plane = concrete_plane(2);
        plane.write8_term(0, &Expr::constant(0x7f, 8));
        // Still zero updates: the byte went into the concrete store.
        assert!(plane.updates().is_empty());
        assert_eq!(plane.read8(0).as_constant().unwrap().bits(), 0x7f);
    }

    #[test]
    fn symbolic_byte_write_then_read_returns_the_term() {
        let mut plane = concrete_plane(2);
        let t = Expr::read(&UpdateList::new(Array::new("t", 1)), &Expr::constant(0, 32));
        plane.write8_term(1, &t);
        assert_eq!(plane.read8(1), t);
    }

    #[test]
    fn flush_for_read_is_idempotent() {
        let mut plane = concrete_plane(3);
        plane.write8(0, 0xaa);
        plane.write8(1, 0xbb);
        plane.flush_for_read();
        let after_first = plane.updates().len();
        plane.flush_for_read();
        assert_eq!(plane.updates().len(), after_first);
        // Bytes stay precisely known after a read flush.
        assert_eq!(plane.read8(0).as_constant().unwrap().bits(), 0xaa);
    }

    #[test]
    fn symbolic_offset_write_drops_precision() {
        let mut plane = concrete_plane(4);
        for (i, b) in [0xaau8, 0xbb, 0xcc, 0xdd].into_iter().enumerate() {
            plane.write8(i, b);
        }
        let idx = symbolic_index("i");
        let t = Expr::read(&UpdateList::new(Array::new("t", 1)), &Expr::constant(0, 32));
        plane.write8_symbolic(&idx, &t);
        // Reading byte 0 now goes through the update list: the symbolic
        // write may have landed anywhere.
        let byte0 = plane.read8(0);
        assert!(!byte0.is_constant());

        // Under i == 0 the write shadows byte 0; under i == 3 it does not.
        let t_arr = match t.as_ref() {
            Expr::Read { updates, .. } => updates.root().clone(),
            _ => unreachable!(),
        };
        let i_arr = match idx.as_ref() {
            Expr::ZExt { expr, .. } => match expr.as_ref() {
                Expr::Read { updates, .. } => updates.root().clone(),
                _ => unreachable!(),
            },
            _ => unreachable!(),
        };
        let mut model = Assignment::new();
        model.bind(&t_arr, vec![0x5a]);
        model.bind(&i_arr, vec![0]);
        assert_eq!(model.evaluate(&byte0).unwrap().bits(), 0x5a);
        let mut model = Assignment::new();
        model.bind(&t_arr, vec![0x5a]);
        model.bind(&i_arr, vec![3]);
        assert_eq!(model.evaluate(&byte0).unwrap().bits(), 0xaa);
    }

    #[test]
    fn flush_to_concrete_store_resolves_symbolic_bytes() {
        let object = test_object(2);
        let array = Array::new("sym", 2);
        let mut plane = ObjectStatePlane::symbolic(object, array.clone());
        let mut model = Assignment::new();
        model.bind(&array, vec![0x41, 0x42]);
        let mut solver = AssignmentSolver::new(model);
        plane.flush_to_concrete_store(&mut solver).unwrap();
        assert_eq!(plane.concrete_byte(0), 0x41);
        assert_eq!(plane.concrete_byte(1), 0x42);
        // Masks untouched: the bytes are still symbolic to readers.
        assert!(!plane.read8(0).is_constant());
    }

    #[test]
    fn initialize_to_zero_makes_all_bytes_concrete() {
        let object = test_object(3);
        let array = Array::new("sym3", 3);
        let mut plane = ObjectStatePlane::symbolic(object, array);
        plane.initialize_to_zero();
        for i in 0..3 {
            assert_eq!(plane.read8(i).as_constant().unwrap().bits(), 0);
        }
    }

    #[test]
    fn convenience_writers_split_by_byte_order() {
        let mut plane = concrete_plane(8);
        plane.write32(0, 0x0a0b0c0d, ByteOrder::LittleEndian);
        assert_eq!(plane.read8(0).as_constant().unwrap().bits(), 0x0d);
        assert_eq!(plane.read8(3).as_constant().unwrap().bits(), 0x0a);
        plane.write16(4, 0x1122, ByteOrder::BigEndian);
        assert_eq!(plane.read8(4).as_constant().unwrap().bits(), 0x11);
        assert_eq!(plane.read8(5).as_constant().unwrap().bits(), 0x22);
    }

    #[test]
    #[should_panic(expected = "past plane bound")]
    fn out_of_range_concrete_access_is_fatal() {
        let mut plane = concrete_plane(2);
        plane.write8(2, 0);
    }

    #[test]
    fn rebind_growth_extends_every_per_byte_map() {
        let mut plane = concrete_plane(4);
        plane.write8(3, 0x33);
        let t = Expr::read(&UpdateList::new(Array::new("t", 1)), &Expr::constant(0, 32));
        plane.write8_term(1, &t);

        plane.rebind_object(test_object(8));
        assert_eq!(plane.size_bound(), 8);
        // Old contents survive in their precise forms.
        assert_eq!(plane.read8(3).as_constant().unwrap().bits(), 0x33);
        assert_eq!(plane.read8(1), t);
        // Gained bytes read as the initial value and accept writes.
        assert_eq!(plane.read8(7).as_constant().unwrap().bits(), 0);
        plane.write8(7, 0x77);
        assert_eq!(plane.read8(7).as_constant().unwrap().bits(), 0x77);
    }

    #[test]
    #[should_panic(expected = "past plane bound")]
    fn rebind_shrink_tightens_the_bound() {
        let mut plane = concrete_plane(8);
        plane.write8(6, 0x66);
        plane.rebind_object(test_object(4));
        let _ = plane.read8(6);
    }
}
