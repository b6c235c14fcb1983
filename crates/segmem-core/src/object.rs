//! Allocation descriptors.
//!
//! A [`MemoryObject`] records where an allocation lives (segment, base
//! address), how big it is (a term: sizes may be symbolic), and where it came
//! from. It generates the bounds-check predicates the executor discharges
//! against the path condition; it never holds contents — those live in the
//! object states bound to it.

use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use segmem_expr::{Expr, Term};

use crate::context::Context;
use crate::kvalue::KValue;

static NEXT_ID: AtomicU64 = AtomicU64::new(0);

/// Opaque token naming the program location an allocation originated from
/// (the allocating instruction, the global's definition, or unknown).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AllocSite(pub u64);

impl AllocSite {
    /// Origin not tracked.
    pub const UNKNOWN: AllocSite = AllocSite(0);
}

impl fmt::Display for AllocSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "site#{}", self.0)
    }
}

/// An allocation: identity, placement, size, and provenance flags.
///
/// Shared between the memory manager and every object state bound to it;
/// the descriptor stays alive as long as any of them holds a reference.
#[derive(Debug)]
pub struct MemoryObject {
    id: u64,
    segment: u64,
    address: u64,
    size: Term,
    name: RefCell<String>,
    is_local: bool,
    is_global: Cell<bool>,
    is_fixed: bool,
    is_user_specified: Cell<bool>,
    alloc_site: AllocSite,
    context: Context,
}

impl MemoryObject {
    /// Create a descriptor. `size` is zero-extended to the context's pointer
    /// width. A `segment` of zero is reserved for fixed/legacy objects that
    /// live outside the segmented heap.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        segment: u64,
        address: u64,
        size: &Term,
        is_local: bool,
        is_global: bool,
        is_fixed: bool,
        alloc_site: AllocSite,
        context: Context,
    ) -> MemoryObject {
        MemoryObject {
            id: NEXT_ID.fetch_add(1, AtomicOrdering::Relaxed),
            segment,
            address,
            size: Expr::zext(size, context.pointer_width()),
            name: RefCell::new("unnamed".to_owned()),
            is_local,
            is_global: Cell::new(is_global),
            is_fixed,
            is_user_specified: Cell::new(false),
            alloc_site,
            context,
        }
    }

    /// Unique id, monotone across the process.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The allocation's segment number; zero for fixed/legacy objects.
    pub fn segment(&self) -> u64 {
        self.segment
    }

    /// Concrete base address within the segment.
    pub fn address(&self) -> u64 {
        self.address
    }

    /// The size term, at pointer width.
    pub fn size_expr(&self) -> &Term {
        &self.size
    }

    /// The size in bytes when it is concrete.
    pub fn concrete_size(&self) -> Option<u64> {
        self.size.as_constant().map(|bv| bv.bits())
    }

    /// Current name.
    pub fn name(&self) -> String {
        self.name.borrow().clone()
    }

    /// Rename the object (names are diagnostic only).
    pub fn set_name(&self, name: impl Into<String>) {
        *self.name.borrow_mut() = name.into();
    }

    /// Stack allocation?
    pub fn is_local(&self) -> bool {
        self.is_local
    }

    /// Global allocation?
    pub fn is_global(&self) -> bool {
        self.is_global.get()
    }

    /// Promote to global after the fact.
    pub fn set_global(&self, global: bool) {
        self.is_global.set(global);
    }

    /// Placed at a caller-chosen fixed address?
    pub fn is_fixed(&self) -> bool {
        self.is_fixed
    }

    /// Declared by the user rather than the program under execution?
    pub fn is_user_specified(&self) -> bool {
        self.is_user_specified.get()
    }

    /// Flag as user-declared.
    pub fn set_user_specified(&self, user: bool) {
        self.is_user_specified.set(user);
    }

    /// The origin token supplied at allocation.
    pub fn alloc_site(&self) -> AllocSite {
        self.alloc_site
    }

    /// The context the object was allocated under.
    pub fn context(&self) -> Context {
        self.context
    }

    /// The segment as a pointer-width constant.
    pub fn segment_expr(&self) -> Term {
        self.context.constant(self.segment)
    }

    /// The base address as a pointer-width constant.
    pub fn base_expr(&self) -> Term {
        self.context.constant(self.address)
    }

    /// A pointer to the object's base.
    pub fn pointer(&self) -> KValue {
        KValue::new(self.segment_expr(), self.base_expr())
    }

    /// A pointer `offset` bytes past the base.
    pub fn pointer_at(&self, offset: u64) -> KValue {
        KValue::new(
            self.segment_expr(),
            Expr::add(&self.base_expr(), &self.context.constant(offset)),
        )
    }

    /// The offset of `pointer` relative to the base: `pointer − base`.
    pub fn offset_expr(&self, pointer: &Term) -> Term {
        Expr::sub(pointer, &self.base_expr())
    }

    /// Offset predicate for a plain pointer: `offset < size`, except that a
    /// zero-sized object admits only `offset == 0` (the one-past pointer,
    /// never a dereference).
    pub fn bounds_check_offset(&self, offset: &Term) -> Term {
        if self.size.is_constant_zero() {
            Expr::eq(offset, &self.context.zero())
        } else {
            Expr::ult(offset, &self.size)
        }
    }

    /// Offset predicate for an access of `bytes` bytes:
    /// `offset < size − (bytes − 1)`. An access wider than a concrete size
    /// can never fit and is rejected outright; for symbolic sizes the
    /// unsigned subtraction is left for the solver to examine.
    pub fn bounds_check_offset_bytes(&self, offset: &Term, bytes: u32) -> Term {
        assert!(bytes >= 1, "bounds check of a zero-byte access");
        if let Some(size) = self.concrete_size() {
            if u64::from(bytes) > size {
                return Expr::from_bool(false);
            }
        }
        let slack = Expr::constant(u64::from(bytes) - 1, self.size.width());
        Expr::ult(offset, &Expr::sub(&self.size, &slack))
    }

    /// Segment predicate: segment zero (unknown provenance, conservatively
    /// allowed to resolve here) or this object's own segment. A null pointer
    /// passes this check and still fails the offset bound.
    fn bounds_check_segment(&self, segment: &Term) -> Term {
        Expr::or(
            &Expr::eq(segment, &Expr::constant(0, segment.width())),
            &Expr::eq(segment, &self.segment_expr()),
        )
    }

    /// Full predicate for dereferencing `pointer` one byte wide.
    pub fn bounds_check_pointer(&self, pointer: &KValue) -> Term {
        Expr::and(
            &self.bounds_check_segment(pointer.segment()),
            &self.bounds_check_offset(&self.offset_expr(pointer.offset())),
        )
    }

    /// Full predicate for an access of `bytes` bytes through `pointer`.
    pub fn bounds_check_pointer_bytes(&self, pointer: &KValue, bytes: u32) -> Term {
        Expr::and(
            &self.bounds_check_segment(pointer.segment()),
            &self.bounds_check_offset_bytes(&self.offset_expr(pointer.offset()), bytes),
        )
    }

    /// The base address, printable.
    pub fn address_string(&self) -> String {
        self.address.to_string()
    }

    /// The size, printable; `"symbolic"` when not constant.
    pub fn size_string(&self) -> String {
        match self.concrete_size() {
            Some(n) => n.to_string(),
            None => "symbolic".to_owned(),
        }
    }

    /// An identifying line for diagnostics.
    pub fn alloc_info(&self) -> String {
        format!(
            "mo{}[{}] '{}' segment {} allocated at {}",
            self.id,
            self.size_string(),
            self.name.borrow(),
            self.segment,
            self.alloc_site,
        )
    }

    /// Total order: id short-circuits equality, then address, size and
    /// allocation site break ties. Symbolic sizes order by term identity,
    /// which is arbitrary but stable within one execution.
    pub fn compare(&self, other: &MemoryObject) -> Ordering {
        if self.id == other.id {
            return Ordering::Equal;
        }
        self.address
            .cmp(&other.address)
            .then_with(|| match (self.concrete_size(), other.concrete_size()) {
                (Some(a), Some(b)) => a.cmp(&b),
                _ => {
                    let a = Arc::as_ptr(&self.size) as usize;
                    let b = Arc::as_ptr(&other.size) as usize;
                    a.cmp(&b)
                }
            })
            .then_with(|| self.alloc_site.cmp(&other.alloc_site))
    }
}
