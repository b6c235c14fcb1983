//! The two-plane value algebra.
//!
//! A [`KValue`] pairs a segment term with an offset term of equal width. A
//! scalar is a value whose segment is the constant zero; a pointer carries
//! the (non-zero) segment of the allocation it was derived from. Every
//! operation distributes over the pair so that provenance is preserved
//! through pointer arithmetic and erased exactly where the source language
//! would erase it (integer division, bitwise operations, shifts).

// These constructors build AST nodes, not perform operations.
// Implementing std::ops traits would be semantically incorrect.
#![allow(clippy::should_implement_trait)]

use std::fmt;

use segmem_expr::{BitVector, Expr, Term, Width};

/// A first-class value: `(segment, offset)` of equal widths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KValue {
    segment: Term,
    offset: Term,
}

impl KValue {
    /// Pair a segment with an offset. The widths must match.
    pub fn new(segment: Term, offset: Term) -> Self {
        assert_eq!(
            segment.width(),
            offset.width(),
            "segment/offset width mismatch: {segment} vs {offset}"
        );
        KValue { segment, offset }
    }

    /// A scalar: segment is the zero term of the offset's width.
    pub fn from_value(offset: Term) -> Self {
        let segment = Expr::zero(offset.width());
        KValue { segment, offset }
    }

    /// A constant scalar.
    pub fn constant(bits: u64, width: Width) -> Self {
        Self::from_value(Expr::constant(bits, width))
    }

    /// The segment plane term.
    pub fn segment(&self) -> &Term {
        &self.segment
    }

    /// The offset plane term.
    pub fn offset(&self) -> &Term {
        &self.offset
    }

    /// The offset plane term, read as a plain value.
    pub fn value(&self) -> &Term {
        &self.offset
    }

    /// Width of both planes, in bits.
    pub fn width(&self) -> Width {
        self.offset.width()
    }

    /// True iff both planes are constants.
    pub fn is_constant(&self) -> bool {
        self.segment.is_constant() && self.offset.is_constant()
    }

    /// Both planes as constants, when constant.
    pub fn as_constant(&self) -> Option<(BitVector, BitVector)> {
        Some((self.segment.as_constant()?, self.offset.as_constant()?))
    }

    /// `segment == 0 ∧ offset == 0`, 1 bit wide.
    pub fn is_zero(&self) -> Term {
        Expr::and(&Expr::is_zero(&self.segment), &Expr::is_zero(&self.offset))
    }

    fn check_width(&self, other: &KValue) {
        assert_eq!(
            self.width(),
            other.width(),
            "operand width mismatch: {self} vs {other}"
        );
    }

    /// Zero-extend both planes to `width`.
    pub fn zext(&self, width: Width) -> KValue {
        KValue {
            segment: Expr::zext(&self.segment, width),
            offset: Expr::zext(&self.offset, width),
        }
    }

    /// Sign-extend both planes to `width`.
    pub fn sext(&self, width: Width) -> KValue {
        KValue {
            segment: Expr::sext(&self.segment, width),
            offset: Expr::sext(&self.offset, width),
        }
    }

    /// Slice both planes.
    pub fn extract(&self, bit_off: u32, width: Width) -> KValue {
        KValue {
            segment: Expr::extract(&self.segment, bit_off, width),
            offset: Expr::extract(&self.offset, bit_off, width),
        }
    }

    /// Concatenate both planes, `self` as the most significant part.
    pub fn concat(&self, lsb: &KValue) -> KValue {
        KValue {
            segment: Expr::concat(&self.segment, &lsb.segment),
            offset: Expr::concat(&self.offset, &lsb.offset),
        }
    }

    /// N-ary concatenation; `parts[0]` is the most significant part.
    pub fn concat_values(parts: &[KValue]) -> KValue {
        assert!(!parts.is_empty(), "concat of zero values");
        let segments: Vec<Term> = parts.iter().map(|p| p.segment.clone()).collect();
        let offsets: Vec<Term> = parts.iter().map(|p| p.offset.clone()).collect();
        KValue {
            segment: Expr::concat_n(&segments),
            offset: Expr::concat_n(&offsets),
        }
    }

    /// Per-plane addition: adding a scalar to a pointer preserves the
    /// pointer's segment because `0 + s = s`.
    pub fn add(&self, other: &KValue) -> KValue {
        self.check_width(other);
        KValue {
            segment: Expr::add(&self.segment, &other.segment),
            offset: Expr::add(&self.offset, &other.offset),
        }
    }

    /// Per-plane subtraction.
    pub fn sub(&self, other: &KValue) -> KValue {
        self.check_width(other);
        KValue {
            segment: Expr::sub(&self.segment, &other.segment),
            offset: Expr::sub(&self.offset, &other.offset),
        }
    }

    /// Multiplication of offsets with *added* segments: the sum keeps
    /// `1 · p = p` intact (the scalar side contributes segment zero) while a
    /// product of two pointers gets a visibly nonsensical segment, which is
    /// intentional — such products have no defined provenance.
    pub fn mul(&self, other: &KValue) -> KValue {
        self.check_width(other);
        KValue {
            segment: Expr::add(&self.segment, &other.segment),
            offset: Expr::mul(&self.offset, &other.offset),
        }
    }

    fn offset_only(&self, other: &KValue, op: fn(&Term, &Term) -> Term) -> KValue {
        self.check_width(other);
        KValue {
            segment: Expr::zero(self.width()),
            offset: op(&self.offset, &other.offset),
        }
    }

    /// Unsigned division of offsets; the result is a scalar.
    pub fn udiv(&self, other: &KValue) -> KValue {
        self.offset_only(other, Expr::udiv)
    }

    /// Signed division of offsets; the result is a scalar.
    pub fn sdiv(&self, other: &KValue) -> KValue {
        self.offset_only(other, Expr::sdiv)
    }

    /// Unsigned remainder of offsets; the result is a scalar.
    pub fn urem(&self, other: &KValue) -> KValue {
        self.offset_only(other, Expr::urem)
    }

    /// Signed remainder of offsets; the result is a scalar.
    pub fn srem(&self, other: &KValue) -> KValue {
        self.offset_only(other, Expr::srem)
    }

    /// Bitwise and of offsets; the result is a scalar.
    pub fn and(&self, other: &KValue) -> KValue {
        self.offset_only(other, Expr::and)
    }

    /// Bitwise or of offsets; the result is a scalar.
    pub fn or(&self, other: &KValue) -> KValue {
        self.offset_only(other, Expr::or)
    }

    /// Bitwise exclusive or of offsets; the result is a scalar.
    pub fn xor(&self, other: &KValue) -> KValue {
        self.offset_only(other, Expr::xor)
    }

    /// Left shift of offsets; the result is a scalar.
    pub fn shl(&self, other: &KValue) -> KValue {
        self.offset_only(other, Expr::shl)
    }

    /// Logical right shift of offsets; the result is a scalar.
    pub fn lshr(&self, other: &KValue) -> KValue {
        self.offset_only(other, Expr::lshr)
    }

    /// Arithmetic right shift of offsets; the result is a scalar.
    pub fn ashr(&self, other: &KValue) -> KValue {
        self.offset_only(other, Expr::ashr)
    }

    /// Equality over both planes: segments and offsets must both agree.
    pub fn eq(&self, other: &KValue) -> KValue {
        self.check_width(other);
        KValue::from_value(Expr::and(
            &Expr::eq(&self.segment, &other.segment),
            &Expr::eq(&self.offset, &other.offset),
        ))
    }

    /// Disequality: De Morgan dual of [`KValue::eq`].
    pub fn ne(&self, other: &KValue) -> KValue {
        self.check_width(other);
        KValue::from_value(Expr::or(
            &Expr::ne(&self.segment, &other.segment),
            &Expr::ne(&self.offset, &other.offset),
        ))
    }

    fn lexicographic(&self, other: &KValue, cmp: fn(&Term, &Term) -> Term) -> KValue {
        self.check_width(other);
        KValue::from_value(Expr::select(
            &Expr::eq(&self.segment, &other.segment),
            &cmp(&self.offset, &other.offset),
            &cmp(&self.segment, &other.segment),
        ))
    }

    /// Unsigned `>`, lexicographic over `(segment, offset)`.
    pub fn ugt(&self, other: &KValue) -> KValue {
        self.lexicographic(other, Expr::ugt)
    }

    /// Unsigned `>=`, lexicographic over `(segment, offset)`.
    pub fn uge(&self, other: &KValue) -> KValue {
        self.lexicographic(other, Expr::uge)
    }

    /// Unsigned `<`, lexicographic over `(segment, offset)`.
    pub fn ult(&self, other: &KValue) -> KValue {
        self.lexicographic(other, Expr::ult)
    }

    /// Unsigned `<=`, lexicographic over `(segment, offset)`.
    pub fn ule(&self, other: &KValue) -> KValue {
        self.lexicographic(other, Expr::ule)
    }

    /// Signed `>`, lexicographic over `(segment, offset)`.
    pub fn sgt(&self, other: &KValue) -> KValue {
        self.lexicographic(other, Expr::sgt)
    }

    /// Signed `>=`, lexicographic over `(segment, offset)`.
    pub fn sge(&self, other: &KValue) -> KValue {
        self.lexicographic(other, Expr::sge)
    }

    /// Signed `<`, lexicographic over `(segment, offset)`.
    pub fn slt(&self, other: &KValue) -> KValue {
        self.lexicographic(other, Expr::slt)
    }

    /// Signed `<=`, lexicographic over `(segment, offset)`.
    pub fn sle(&self, other: &KValue) -> KValue {
        self.lexicographic(other, Expr::sle)
    }

    /// `self ? then_ : else_`, distributed over both planes. `self`'s offset
    /// plane is the condition bit.
    pub fn select(&self, then_: &KValue, else_: &KValue) -> KValue {
        then_.check_width(else_);
        KValue {
            segment: Expr::select(&self.offset, &then_.segment, &else_.segment),
            offset: Expr::select(&self.offset, &then_.offset, &else_.offset),
        }
    }
}

/// Scalars print as their offset; anything with a possibly non-zero segment
/// prints as `segment:offset`.
impl fmt::Display for KValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segment.is_constant_zero() {
            write!(f, "{}", self.offset)
        } else {
            write!(f, "{}:{}", self.segment, self.offset)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use segmem_expr::{Array, UpdateList};

    fn pointer(segment: u64, offset: u64) -> KValue {
        KValue::new(Expr::constant(segment, 64), Expr::constant(offset, 64))
    }

    fn symbolic(name: &str) -> KValue {
        let byte = Expr::read(&UpdateList::new(Array::new(name, 1)), &Expr::constant(0, 32));
        KValue::from_value(Expr::zext(&byte, 64))
    }

    #[test]
    fn add_distributes_over_both_planes() {
        let p = pointer(7, 4);
        let n = KValue::constant(3, 64);
        let q = p.add(&n);
        assert_eq!(q.segment().as_constant().unwrap().bits(), 7);
        assert_eq!(q.offset().as_constant().unwrap().bits(), 7);
    }

    #[test]
    fn mul_by_one_is_identity_on_pointers() {
        let p = pointer(5, 12);
        let one = KValue::constant(1, 64);
        assert_eq!(p.mul(&one), p);
        assert_eq!(one.mul(&p), p);
    }

    #[test]
    fn division_erases_provenance() {
        let p = pointer(5, 12);
        let two = KValue::constant(2, 64);
        let q = p.udiv(&two);
        assert!(q.segment().is_constant_zero());
        assert_eq!(q.offset().as_constant().unwrap().bits(), 6);
        assert!(p.and(&two).segment().is_constant_zero());
        assert!(p.shl(&two).segment().is_constant_zero());
    }

    #[test]
    fn eq_requires_both_planes_to_agree() {
        let a = pointer(3, 8);
        let b = pointer(5, 8);
        assert!(a.eq(&b).offset().as_constant().unwrap().is_zero());
        assert!(a.ne(&b).offset().as_constant().unwrap().is_true());
        assert!(a.eq(&a.clone()).offset().as_constant().unwrap().is_true());
    }

    #[test]
    fn comparisons_are_lexicographic_across_segments() {
        let a = pointer(3, 100);
        let b = pointer(5, 0);
        // Different segments: the segment comparison decides.
        assert!(a.ult(&b).offset().as_constant().unwrap().is_true());
        assert!(b.ugt(&a).offset().as_constant().unwrap().is_true());
        // Same segment: offsets decide.
        let c = pointer(3, 101);
        assert!(a.ult(&c).offset().as_constant().unwrap().is_true());
    }

    #[test]
    fn comparison_on_equal_symbolic_segments_reduces_to_offsets() {
        let seg = symbolic("seg");
        let x = KValue::new(seg.offset().clone(), symbolic("x").offset().clone());
        let y = KValue::new(seg.offset().clone(), symbolic("y").offset().clone());
        let lt = x.ult(&y);
        // seg == seg folds to true, so the select must fold to the offset
        // comparison.
        assert_eq!(lt.offset(), &Expr::ult(x.offset(), y.offset()));
    }

    #[test]
    fn select_uses_offset_plane_as_condition() {
        let t = pointer(1, 10);
        let e = pointer(2, 20);
        let cond_true = KValue::constant(1, 1);
        let cond_false = KValue::constant(0, 1);
        assert_eq!(cond_true.select(&t, &e), t);
        assert_eq!(cond_false.select(&t, &e), e);
    }

    #[test]
    fn extract_and_extend_touch_both_planes() {
        let p = pointer(0x0102, 0x0304);
        let low = p.extract(0, 8);
        assert_eq!(low.segment().as_constant().unwrap().bits(), 0x02);
        assert_eq!(low.offset().as_constant().unwrap().bits(), 0x04);
        let wide = low.zext(32);
        assert_eq!(wide.width(), 32);
        assert_eq!(wide.segment().as_constant().unwrap().bits(), 0x02);
    }

    #[test]
    fn concat_values_assembles_both_planes() {
        let hi = pointer(0x01, 0xaa).extract(0, 8);
        let lo = pointer(0x02, 0xbb).extract(0, 8);
        let joined = KValue::concat_values(&[hi, lo]);
        assert_eq!(joined.width(), 16);
        assert_eq!(joined.segment().as_constant().unwrap().bits(), 0x0102);
        assert_eq!(joined.offset().as_constant().unwrap().bits(), 0xaabb);
    }

    #[test]
    fn is_zero_needs_both_planes_zero() {
        assert!(KValue::constant(0, 64).is_zero().as_constant().unwrap().is_true());
        assert!(pointer(1, 0).is_zero().as_constant().unwrap().is_zero());
        assert!(pointer(0, 1).is_zero().as_constant().unwrap().is_zero());
    }

    #[test]
    #[should_panic(expected = "width mismatch")]
    fn mixed_widths_are_fatal() {
        let a = KValue::constant(1, 32);
        let b = KValue::constant(1, 64);
        let _ = a.add(&b);
    }

    proptest! {
        #[test]
        fn prop_scalar_ops_preserve_width(a in any::<u64>(), b in any::<u64>()) {
            let x = KValue::constant(a, 64);
            let y = KValue::constant(b, 64);
            let ops: [fn(&KValue, &KValue) -> KValue; 6] =
                [KValue::add, KValue::sub, KValue::mul, KValue::and, KValue::or, KValue::xor];
            for op in ops {
                prop_assert_eq!(op(&x, &y).width(), 64);
            }
            let cmps: [fn(&KValue, &KValue) -> KValue; 5] =
                [KValue::ult, KValue::ule, KValue::slt, KValue::eq, KValue::ne];
            for cmp in cmps {
                prop_assert_eq!(cmp(&x, &y).width(), 1);
            }
        }

        #[test]
        fn prop_segments_add_under_add_and_sub(s1 in any::<u64>(), s2 in any::<u64>(), o1 in any::<u64>(), o2 in any::<u64>()) {
            let a = KValue::new(Expr::constant(s1, 64), Expr::constant(o1, 64));
            let b = KValue::new(Expr::constant(s2, 64), Expr::constant(o2, 64));
            prop_assert_eq!(
                a.add(&b).segment().as_constant().unwrap().bits(),
                s1.wrapping_add(s2)
            );
            prop_assert_eq!(
                a.sub(&b).segment().as_constant().unwrap().bits(),
                s1.wrapping_sub(s2)
            );
            prop_assert_eq!(
                a.mul(&b).segment().as_constant().unwrap().bits(),
                s1.wrapping_add(s2)
            );
        }

        #[test]
        fn prop_lexicographic_matches_pair_order(s1 in 0u64..4, s2 in 0u64..4, o1 in any::<u64>(), o2 in any::<u64>()) {
            let a = KValue::new(Expr::constant(s1, 64), Expr::constant(o1, 64));
            let b = KValue::new(Expr::constant(s2, 64), Expr::constant(o2, 64));
            let expected = (s1, o1) < (s2, o2);
            prop_assert_eq!(a.ult(&b).offset().as_constant().unwrap().is_true(), expected);
        }
    }
}
