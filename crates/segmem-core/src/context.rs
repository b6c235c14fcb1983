//! Target configuration carried by every allocation.

use segmem_expr::{Expr, Term, Width};

/// Byte order used when multi-byte reads and writes are assembled from
/// per-byte plane accesses. Planes themselves are byte-order-agnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    /// Least significant byte at the lowest offset.
    LittleEndian,
    /// Most significant byte at the lowest offset.
    BigEndian,
}

/// Pointer width and byte order of the program under execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Context {
    pointer_width: Width,
    byte_order: ByteOrder,
}

impl Context {
    /// Create a context. The pointer width must be a byte multiple between
    /// 8 and 64 bits.
    pub fn new(pointer_width: Width, byte_order: ByteOrder) -> Self {
        assert!(
            (8..=64).contains(&pointer_width) && pointer_width % 8 == 0,
            "unsupported pointer width {pointer_width}"
        );
        Context { pointer_width, byte_order }
    }

    /// Pointer width in bits.
    pub fn pointer_width(&self) -> Width {
        self.pointer_width
    }

    /// Byte order for multi-byte access assembly.
    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    /// A pointer-width constant term.
    pub fn constant(&self, value: u64) -> Term {
        Expr::constant(value, self.pointer_width)
    }

    /// The pointer-width zero term.
    pub fn zero(&self) -> Term {
        self.constant(0)
    }
}

/// 64-bit little-endian, the common bitcode target.
impl Default for Context {
    fn default() -> Self {
        Context::new(64, ByteOrder::LittleEndian)
    }
}
