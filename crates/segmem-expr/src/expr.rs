//! The term language: immutable, shared bit-vector expressions.
//!
//! Every constructor is a total pure function returning a [`Term`]. Constant
//! operands fold; the unit identities (`0 + x`, `1 · x`, shift-by-zero, ...)
//! rewrite to the untouched operand so that structural identity survives
//! no-op arithmetic. `Ne`, `Ugt`, `Uge`, `Sgt` and `Sge` canonicalize into
//! `Not`/`Ult`/`Ule`/`Slt`/`Sle` at construction, so downstream code never
//! pattern-matches on them.

// These constructors build AST nodes, not perform operations.
// Implementing std::ops traits would be semantically incorrect.
#![allow(clippy::should_implement_trait)]

use std::fmt;
use std::sync::Arc;

use crate::bitvector::{BitVector, Width, BOOL_WIDTH};
use crate::updates::UpdateList;

/// A shared, immutable expression.
pub type Term = Arc<Expr>;

/// Two-operand arithmetic, bitwise and shift operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    UDiv,
    SDiv,
    URem,
    SRem,
    And,
    Or,
    Xor,
    Shl,
    LShr,
    AShr,
}

/// Comparison operators surviving canonicalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpOp {
    Eq,
    Ult,
    Ule,
    Slt,
    Sle,
}

/// A bit-vector expression node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Expr {
    /// A concrete value.
    Constant(BitVector),
    /// A byte read from an update list at the given index.
    Read {
        /// The write log being read through.
        updates: UpdateList,
        /// The index being read.
        index: Term,
    },
    /// `cond ? then_ : else_` over equal-width branches.
    Select {
        /// 1-bit condition.
        cond: Term,
        /// Value when the condition holds.
        then_: Term,
        /// Value otherwise.
        else_: Term,
    },
    /// Bit concatenation; `msb` occupies the high bits.
    Concat {
        /// Most significant part.
        msb: Term,
        /// Least significant part.
        lsb: Term,
    },
    /// `width` bits of `expr` starting at bit `bit_off`.
    Extract {
        /// Source expression.
        expr: Term,
        /// Low bit position of the slice.
        bit_off: u32,
        /// Slice width.
        width: Width,
    },
    /// Zero-extension to `width`.
    ZExt {
        /// Source expression.
        expr: Term,
        /// Result width.
        width: Width,
    },
    /// Sign-extension to `width`.
    SExt {
        /// Source expression.
        expr: Term,
        /// Result width.
        width: Width,
    },
    /// Width-preserving binary operation.
    Binop {
        /// Operator.
        op: BinOp,
        /// Left operand.
        lhs: Term,
        /// Right operand.
        rhs: Term,
    },
    /// Comparison; always 1 bit wide.
    Cmp {
        /// Operator.
        op: CmpOp,
        /// Left operand.
        lhs: Term,
        /// Right operand.
        rhs: Term,
    },
    /// Bitwise complement (Boolean negation at width 1).
    Not(Term),
}

fn same_width(lhs: &Term, rhs: &Term) -> Width {
    let w = lhs.width();
    assert_eq!(w, rhs.width(), "term width mismatch: {lhs} vs {rhs}");
    w
}

impl Expr {
    /// Width of this expression in bits.
    pub fn width(&self) -> Width {
        match self {
            Expr::Constant(bv) => bv.width(),
            Expr::Read { .. } => 8,
            Expr::Select { then_, .. } => then_.width(),
            Expr::Concat { msb, lsb } => msb.width() + lsb.width(),
            Expr::Extract { width, .. } | Expr::ZExt { width, .. } | Expr::SExt { width, .. } => {
                *width
            }
            Expr::Binop { lhs, .. } => lhs.width(),
            Expr::Cmp { .. } => BOOL_WIDTH,
            Expr::Not(inner) => inner.width(),
        }
    }

    /// The concrete value, if this is a constant node.
    pub fn as_constant(&self) -> Option<BitVector> {
        match self {
            Expr::Constant(bv) => Some(*bv),
            _ => None,
        }
    }

    /// True iff this is a constant node.
    pub fn is_constant(&self) -> bool {
        matches!(self, Expr::Constant(_))
    }

    /// True iff this is the constant zero.
    pub fn is_constant_zero(&self) -> bool {
        self.as_constant().is_some_and(BitVector::is_zero)
    }

    /// A constant term.
    pub fn constant(bits: u64, width: Width) -> Term {
        Arc::new(Expr::Constant(BitVector::new(bits, width)))
    }

    /// A constant term from an existing bit-vector.
    pub fn from_bitvector(bv: BitVector) -> Term {
        Arc::new(Expr::Constant(bv))
    }

    /// The 1-bit constant for `b`.
    pub fn from_bool(b: bool) -> Term {
        Self::from_bitvector(BitVector::from_bool(b))
    }

    /// The zero term of any width. Widths past the 64-bit constant limit
    /// are built by extension.
    pub fn zero(width: Width) -> Term {
        if width <= 64 {
            Self::constant(0, width)
        } else {
            Arc::new(Expr::ZExt { expr: Self::constant(0, 64), width })
        }
    }

    /// A byte read at `index` through `updates`. A constant index folds
    /// through constant-index writes until it hits a match, a symbolic
    /// write, or the root array.
    pub fn read(updates: &UpdateList, index: &Term) -> Term {
        if let Some(idx) = index.as_constant() {
            let mut node = updates.head();
            while let Some(n) = node {
                match n.index().as_constant() {
                    Some(ui) if ui.bits() == idx.bits() => return n.value().clone(),
                    Some(_) => node = n.next(),
                    // A symbolic write may or may not shadow this index;
                    // the solver has to decide.
                    None => break,
                }
            }
            return Arc::new(Expr::Read {
                updates: UpdateList::with_head(updates.root().clone(), node.cloned()),
                index: index.clone(),
            });
        }
        Arc::new(Expr::Read { updates: updates.clone(), index: index.clone() })
    }

    /// `cond ? then_ : else_`.
    pub fn select(cond: &Term, then_: &Term, else_: &Term) -> Term {
        assert_eq!(cond.width(), BOOL_WIDTH, "select condition must be 1 bit");
        same_width(then_, else_);
        if let Some(c) = cond.as_constant() {
            return if c.is_zero() { else_.clone() } else { then_.clone() };
        }
        if then_ == else_ {
            return then_.clone();
        }
        Arc::new(Expr::Select { cond: cond.clone(), then_: then_.clone(), else_: else_.clone() })
    }

    /// Concatenate `msb` over `lsb`. Constants below 64 combined bits fold,
    /// and adjacent extracts of one source fuse back into a single extract.
    pub fn concat(msb: &Term, lsb: &Term) -> Term {
        if let (Some(a), Some(b)) = (msb.as_constant(), lsb.as_constant()) {
            if a.width() + b.width() <= 64 {
                return Self::from_bitvector(a.concat(b));
            }
        }
        if let (
            Expr::Extract { expr: hi_src, bit_off: hi_off, width: hi_w },
            Expr::Extract { expr: lo_src, bit_off: lo_off, width: lo_w },
        ) = (msb.as_ref(), lsb.as_ref())
        {
            if hi_src == lo_src && *hi_off == lo_off + lo_w {
                return Self::extract(hi_src, *lo_off, hi_w + lo_w);
            }
        }
        Arc::new(Expr::Concat { msb: msb.clone(), lsb: lsb.clone() })
    }

    /// N-ary concatenation; `parts[0]` is the most significant part.
    pub fn concat_n(parts: &[Term]) -> Term {
        assert!(!parts.is_empty(), "concat of zero terms");
        let mut result = parts[parts.len() - 1].clone();
        for part in parts[..parts.len() - 1].iter().rev() {
            result = Self::concat(part, &result);
        }
        result
    }

    /// Slice `width` bits of `expr` starting at `bit_off`. Slices fold
    /// through constants, nested extracts, and concat arms.
    pub fn extract(expr: &Term, bit_off: u32, width: Width) -> Term {
        let ew = expr.width();
        assert!(width >= 1 && bit_off + width <= ew, "extract out of range");
        if bit_off == 0 && width == ew {
            return expr.clone();
        }
        if let Some(bv) = expr.as_constant() {
            return Self::from_bitvector(bv.extract(bit_off, width));
        }
        match expr.as_ref() {
            Expr::Concat { msb, lsb } => {
                let lw = lsb.width();
                if bit_off >= lw {
                    return Self::extract(msb, bit_off - lw, width);
                }
                if bit_off + width <= lw {
                    return Self::extract(lsb, bit_off, width);
                }
                let lo_w = lw - bit_off;
                let hi = Self::extract(msb, 0, width - lo_w);
                let lo = Self::extract(lsb, bit_off, lo_w);
                Self::concat(&hi, &lo)
            }
            Expr::Extract { expr: inner, bit_off: inner_off, .. } => {
                Self::extract(inner, bit_off + inner_off, width)
            }
            _ => Arc::new(Expr::Extract { expr: expr.clone(), bit_off, width }),
        }
    }

    /// Zero-extend to `width`; narrower targets truncate via extract.
    pub fn zext(expr: &Term, width: Width) -> Term {
        let ew = expr.width();
        if width == ew {
            return expr.clone();
        }
        if width < ew {
            return Self::extract(expr, 0, width);
        }
        if let Some(bv) = expr.as_constant() {
            if width <= 64 {
                return Self::from_bitvector(bv.zext(width));
            }
        }
        Arc::new(Expr::ZExt { expr: expr.clone(), width })
    }

    /// Sign-extend to `width`; narrower targets truncate via extract.
    pub fn sext(expr: &Term, width: Width) -> Term {
        let ew = expr.width();
        if width == ew {
            return expr.clone();
        }
        if width < ew {
            return Self::extract(expr, 0, width);
        }
        if let Some(bv) = expr.as_constant() {
            if width <= 64 {
                return Self::from_bitvector(bv.sext(width));
            }
        }
        Arc::new(Expr::SExt { expr: expr.clone(), width })
    }

    fn binop(op: BinOp, lhs: &Term, rhs: &Term) -> Term {
        Arc::new(Expr::Binop { op, lhs: lhs.clone(), rhs: rhs.clone() })
    }

    /// `lhs + rhs`.
    pub fn add(lhs: &Term, rhs: &Term) -> Term {
        same_width(lhs, rhs);
        match (lhs.as_constant(), rhs.as_constant()) {
            (Some(a), Some(b)) => Self::from_bitvector(a.add(b)),
            (Some(a), None) if a.is_zero() => rhs.clone(),
            (None, Some(b)) if b.is_zero() => lhs.clone(),
            _ => Self::binop(BinOp::Add, lhs, rhs),
        }
    }

    /// `lhs - rhs`.
    pub fn sub(lhs: &Term, rhs: &Term) -> Term {
        same_width(lhs, rhs);
        match (lhs.as_constant(), rhs.as_constant()) {
            (Some(a), Some(b)) => Self::from_bitvector(a.sub(b)),
            (None, Some(b)) if b.is_zero() => lhs.clone(),
            _ => Self::binop(BinOp::Sub, lhs, rhs),
        }
    }

    /// `lhs * rhs`.
    pub fn mul(lhs: &Term, rhs: &Term) -> Term {
        let w = same_width(lhs, rhs);
        match (lhs.as_constant(), rhs.as_constant()) {
            (Some(a), Some(b)) => Self::from_bitvector(a.mul(b)),
            (Some(a), None) if a.is_one() => rhs.clone(),
            (None, Some(b)) if b.is_one() => lhs.clone(),
            (Some(a), None) if a.is_zero() => Self::constant(0, w),
            (None, Some(b)) if b.is_zero() => Self::constant(0, w),
            _ => Self::binop(BinOp::Mul, lhs, rhs),
        }
    }

    /// Unsigned division. A constant zero divisor is left symbolic; the
    /// executor owns division guards.
    pub fn udiv(lhs: &Term, rhs: &Term) -> Term {
        same_width(lhs, rhs);
        match (lhs.as_constant(), rhs.as_constant()) {
            (Some(a), Some(b)) if !b.is_zero() => Self::from_bitvector(a.udiv(b)),
            (None, Some(b)) if b.is_one() => lhs.clone(),
            _ => Self::binop(BinOp::UDiv, lhs, rhs),
        }
    }

    /// Signed division; same zero-divisor policy as [`Expr::udiv`].
    pub fn sdiv(lhs: &Term, rhs: &Term) -> Term {
        same_width(lhs, rhs);
        match (lhs.as_constant(), rhs.as_constant()) {
            (Some(a), Some(b)) if !b.is_zero() => Self::from_bitvector(a.sdiv(b)),
            (None, Some(b)) if b.is_one() => lhs.clone(),
            _ => Self::binop(BinOp::SDiv, lhs, rhs),
        }
    }

    /// Unsigned remainder; same zero-divisor policy as [`Expr::udiv`].
    pub fn urem(lhs: &Term, rhs: &Term) -> Term {
        let w = same_width(lhs, rhs);
        match (lhs.as_constant(), rhs.as_constant()) {
            (Some(a), Some(b)) if !b.is_zero() => Self::from_bitvector(a.urem(b)),
            (None, Some(b)) if b.is_one() => Self::constant(0, w),
            _ => Self::binop(BinOp::URem, lhs, rhs),
        }
    }

    /// Signed remainder; same zero-divisor policy as [`Expr::udiv`].
    pub fn srem(lhs: &Term, rhs: &Term) -> Term {
        same_width(lhs, rhs);
        match (lhs.as_constant(), rhs.as_constant()) {
            (Some(a), Some(b)) if !b.is_zero() => Self::from_bitvector(a.srem(b)),
            _ => Self::binop(BinOp::SRem, lhs, rhs),
        }
    }

    /// Bitwise and.
    pub fn and(lhs: &Term, rhs: &Term) -> Term {
        let w = same_width(lhs, rhs);
        match (lhs.as_constant(), rhs.as_constant()) {
            (Some(a), Some(b)) => Self::from_bitvector(a.and(b)),
            (Some(a), None) if a.is_zero() => Self::constant(0, w),
            (None, Some(b)) if b.is_zero() => Self::constant(0, w),
            (Some(a), None) if a.is_all_ones() => rhs.clone(),
            (None, Some(b)) if b.is_all_ones() => lhs.clone(),
            _ => Self::binop(BinOp::And, lhs, rhs),
        }
    }

    /// Bitwise or.
    pub fn or(lhs: &Term, rhs: &Term) -> Term {
        same_width(lhs, rhs);
        match (lhs.as_constant(), rhs.as_constant()) {
            (Some(a), Some(b)) => Self::from_bitvector(a.or(b)),
            (Some(a), None) if a.is_zero() => rhs.clone(),
            (None, Some(b)) if b.is_zero() => lhs.clone(),
            (Some(a), None) if a.is_all_ones() => lhs.clone(),
            (None, Some(b)) if b.is_all_ones() => rhs.clone(),
            _ => Self::binop(BinOp::Or, lhs, rhs),
        }
    }

    /// Bitwise exclusive or.
    pub fn xor(lhs: &Term, rhs: &Term) -> Term {
        same_width(lhs, rhs);
        match (lhs.as_constant(), rhs.as_constant()) {
            (Some(a), Some(b)) => Self::from_bitvector(a.xor(b)),
            (Some(a), None) if a.is_zero() => rhs.clone(),
            (None, Some(b)) if b.is_zero() => lhs.clone(),
            _ => Self::binop(BinOp::Xor, lhs, rhs),
        }
    }

    /// Left shift.
    pub fn shl(lhs: &Term, rhs: &Term) -> Term {
        same_width(lhs, rhs);
        match (lhs.as_constant(), rhs.as_constant()) {
            (Some(a), Some(b)) => Self::from_bitvector(a.shl(b)),
            (None, Some(b)) if b.is_zero() => lhs.clone(),
            _ => Self::binop(BinOp::Shl, lhs, rhs),
        }
    }

    /// Logical right shift.
    pub fn lshr(lhs: &Term, rhs: &Term) -> Term {
        same_width(lhs, rhs);
        match (lhs.as_constant(), rhs.as_constant()) {
            (Some(a), Some(b)) => Self::from_bitvector(a.lshr(b)),
            (None, Some(b)) if b.is_zero() => lhs.clone(),
            _ => Self::binop(BinOp::LShr, lhs, rhs),
        }
    }

    /// Arithmetic right shift.
    pub fn ashr(lhs: &Term, rhs: &Term) -> Term {
        same_width(lhs, rhs);
        match (lhs.as_constant(), rhs.as_constant()) {
            (Some(a), Some(b)) => Self::from_bitvector(a.ashr(b)),
            (None, Some(b)) if b.is_zero() => lhs.clone(),
            _ => Self::binop(BinOp::AShr, lhs, rhs),
        }
    }

    /// Bitwise complement; double complements cancel.
    pub fn not(expr: &Term) -> Term {
        if let Some(bv) = expr.as_constant() {
            return Self::from_bitvector(bv.not());
        }
        if let Expr::Not(inner) = expr.as_ref() {
            return inner.clone();
        }
        Arc::new(Expr::Not(expr.clone()))
    }

    fn cmp(op: CmpOp, lhs: &Term, rhs: &Term) -> Term {
        Arc::new(Expr::Cmp { op, lhs: lhs.clone(), rhs: rhs.clone() })
    }

    /// `lhs == rhs`, 1 bit wide.
    pub fn eq(lhs: &Term, rhs: &Term) -> Term {
        same_width(lhs, rhs);
        if let (Some(a), Some(b)) = (lhs.as_constant(), rhs.as_constant()) {
            return Self::from_bool(a == b);
        }
        if lhs == rhs {
            return Self::from_bool(true);
        }
        Self::cmp(CmpOp::Eq, lhs, rhs)
    }

    /// `lhs != rhs`, canonicalized to `Not(Eq)`.
    pub fn ne(lhs: &Term, rhs: &Term) -> Term {
        Self::not(&Self::eq(lhs, rhs))
    }

    /// Unsigned `lhs < rhs`.
    pub fn ult(lhs: &Term, rhs: &Term) -> Term {
        same_width(lhs, rhs);
        if let (Some(a), Some(b)) = (lhs.as_constant(), rhs.as_constant()) {
            return Self::from_bool(a.ult(b));
        }
        if lhs == rhs {
            return Self::from_bool(false);
        }
        Self::cmp(CmpOp::Ult, lhs, rhs)
    }

    /// Unsigned `lhs <= rhs`.
    pub fn ule(lhs: &Term, rhs: &Term) -> Term {
        same_width(lhs, rhs);
        if let (Some(a), Some(b)) = (lhs.as_constant(), rhs.as_constant()) {
            return Self::from_bool(a.ule(b));
        }
        if lhs == rhs {
            return Self::from_bool(true);
        }
        Self::cmp(CmpOp::Ule, lhs, rhs)
    }

    /// Unsigned `lhs > rhs`, canonicalized to `Ult(rhs, lhs)`.
    pub fn ugt(lhs: &Term, rhs: &Term) -> Term {
        Self::ult(rhs, lhs)
    }

    /// Unsigned `lhs >= rhs`, canonicalized to `Ule(rhs, lhs)`.
    pub fn uge(lhs: &Term, rhs: &Term) -> Term {
        Self::ule(rhs, lhs)
    }

    /// Signed `lhs < rhs`.
    pub fn slt(lhs: &Term, rhs: &Term) -> Term {
        same_width(lhs, rhs);
        if let (Some(a), Some(b)) = (lhs.as_constant(), rhs.as_constant()) {
            return Self::from_bool(a.slt(b));
        }
        if lhs == rhs {
            return Self::from_bool(false);
        }
        Self::cmp(CmpOp::Slt, lhs, rhs)
    }

    /// Signed `lhs <= rhs`.
    pub fn sle(lhs: &Term, rhs: &Term) -> Term {
        same_width(lhs, rhs);
        if let (Some(a), Some(b)) = (lhs.as_constant(), rhs.as_constant()) {
            return Self::from_bool(a.sle(b));
        }
        if lhs == rhs {
            return Self::from_bool(true);
        }
        Self::cmp(CmpOp::Sle, lhs, rhs)
    }

    /// Signed `lhs > rhs`, canonicalized to `Slt(rhs, lhs)`.
    pub fn sgt(lhs: &Term, rhs: &Term) -> Term {
        Self::slt(rhs, lhs)
    }

    /// Signed `lhs >= rhs`, canonicalized to `Sle(rhs, lhs)`.
    pub fn sge(lhs: &Term, rhs: &Term) -> Term {
        Self::sle(rhs, lhs)
    }

    /// `expr == 0`, 1 bit wide.
    pub fn is_zero(expr: &Term) -> Term {
        Self::eq(expr, &Self::zero(expr.width()))
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Constant(bv) => {
                if bv.width() == BOOL_WIDTH {
                    write!(f, "{}", if bv.is_zero() { "false" } else { "true" })
                } else {
                    write!(f, "{}", bv.bits())
                }
            }
            Expr::Read { updates, index } => {
                write!(f, "(read {}[{}] {})", updates.root().name(), updates.len(), index)
            }
            Expr::Select { cond, then_, else_ } => write!(f, "(ite {cond} {then_} {else_})"),
            Expr::Concat { msb, lsb } => write!(f, "(concat {msb} {lsb})"),
            Expr::Extract { expr, bit_off, width } => {
                write!(f, "(extract[{bit_off}+:{width}] {expr})")
            }
            Expr::ZExt { expr, width } => write!(f, "(zext[{width}] {expr})"),
            Expr::SExt { expr, width } => write!(f, "(sext[{width}] {expr})"),
            Expr::Binop { op, lhs, rhs } => {
                let name = match op {
                    BinOp::Add => "add",
                    BinOp::Sub => "sub",
                    BinOp::Mul => "mul",
                    BinOp::UDiv => "udiv",
                    BinOp::SDiv => "sdiv",
                    BinOp::URem => "urem",
                    BinOp::SRem => "srem",
                    BinOp::And => "and",
                    BinOp::Or => "or",
                    BinOp::Xor => "xor",
                    BinOp::Shl => "shl",
                    BinOp::LShr => "lshr",
                    BinOp::AShr => "ashr",
                };
                write!(f, "({name} {lhs} {rhs})")
            }
            Expr::Cmp { op, lhs, rhs } => {
                let name = match op {
                    CmpOp::Eq => "eq",
                    CmpOp::Ult => "ult",
                    CmpOp::Ule => "ule",
                    CmpOp::Slt => "slt",
                    CmpOp::Sle => "sle",
                };
                write!(f, "({name} {lhs} {rhs})")
            }
            Expr::Not(inner) => write!(f, "(not {inner})"),
        }
    }
}
