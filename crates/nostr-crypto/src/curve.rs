//! Affine point arithmetic on secp256k1 (y^2 = x^3 + 7).
//!
//! Scalar multiplication is plain double-and-add over the scalar's bits and is
//! NOT constant time: the sequence of additions leaks the bit pattern of the
//! scalar through timing. A hardened build should swap in a constant-time
//! Montgomery ladder before handling keys on shared hardware.

use crate::field::{FieldElement, Scalar};
use crate::uint::U256;

const CURVE_B: u64 = 7;

const GENERATOR_X: FieldElement = FieldElement::from_limbs_unchecked([
    0x59F2_815B_16F8_1798,
    0x029B_FCDB_2DCE_28D9,
    0x55A0_6295_CE87_0B07,
    0x79BE_667E_F9DC_BBAC,
]);

const GENERATOR_Y: FieldElement = FieldElement::from_limbs_unchecked([
    0x9C47_D08F_FB10_D4B8,
    0xFD17_B448_A685_5419,
    0x5DA4_FBFC_0E11_08A8,
    0x483A_DA77_26A3_C465,
]);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Point {
    Infinity,
    Affine { x: FieldElement, y: FieldElement },
}

impl Point {
    pub fn generator() -> Self {
        Point::Affine {
            x: GENERATOR_X,
            y: GENERATOR_Y,
        }
    }

    pub fn is_infinity(&self) -> bool {
        matches!(self, Point::Infinity)
    }

    pub fn x(&self) -> Option<FieldElement> {
        match self {
            Point::Affine { x, .. } => Some(*x),
            Point::Infinity => None,
        }
    }

    pub fn y(&self) -> Option<FieldElement> {
        match self {
            Point::Affine { y, .. } => Some(*y),
            Point::Infinity => None,
        }
    }

    /// Big-endian X coordinate, `None` at infinity.
    pub fn x_bytes(&self) -> Option<[u8; 32]> {
        self.x().map(|x| x.to_be_bytes())
    }

    pub fn has_even_y(&self) -> bool {
        matches!(self, Point::Affine { y, .. } if !y.is_odd())
    }

    pub fn is_on_curve(&self) -> bool {
        match self {
            Point::Infinity => true,
            Point::Affine { x, y } => y.square() == curve_rhs(x),
        }
    }

    pub fn negate(&self) -> Self {
        match self {
            Point::Infinity => Point::Infinity,
            Point::Affine { x, y } => Point::Affine { x: *x, y: y.neg() },
        }
    }

    pub fn add(&self, other: &Point) -> Point {
        let (x1, y1, x2, y2) = match (self, other) {
            (Point::Infinity, _) => return *other,
            (_, Point::Infinity) => return *self,
            (Point::Affine { x: x1, y: y1 }, Point::Affine { x: x2, y: y2 }) => (x1, y1, x2, y2),
        };

        if x1 == x2 {
            if y1 == y2 {
                return self.double();
            }
            // P + (-P)
            return Point::Infinity;
        }

        let slope = y2.sub(y1).mul(&x2.sub(x1).invert());
        let x3 = slope.square().sub(x1).sub(x2);
        let y3 = slope.mul(&x1.sub(&x3)).sub(y1);
        Point::Affine { x: x3, y: y3 }
    }

    pub fn double(&self) -> Point {
        let (x, y) = match self {
            Point::Infinity => return Point::Infinity,
            Point::Affine { x, y } => (x, y),
        };
        if y.is_zero() {
            return Point::Infinity;
        }

        let three_x_sq = x.square().mul(&FieldElement::from_u64(3));
        let slope = three_x_sq.mul(&y.add(y).invert());
        let x3 = slope.square().sub(&x.add(x));
        let y3 = slope.mul(&x.sub(&x3)).sub(y);
        Point::Affine { x: x3, y: y3 }
    }

    /// Double-and-add, scanning `k` from the least significant bit.
    pub fn multiply(&self, k: &U256) -> Point {
        let mut result = Point::Infinity;
        let mut addend = *self;
        for i in 0..k.bits() {
            if k.bit(i) {
                result = result.add(&addend);
            }
            addend = addend.double();
        }
        result
    }

    pub fn mul_scalar(&self, k: &Scalar) -> Point {
        self.multiply(&k.value())
    }

    /// Recovers the even-Y point with the given X coordinate.
    ///
    /// Returns `None` when `x >= p` or when x^3 + 7 has no square root.
    pub fn lift_x(x_bytes: &[u8; 32]) -> Option<Point> {
        let x = FieldElement::from_be_bytes(x_bytes)?;
        let rhs = curve_rhs(&x);
        let root = rhs.sqrt()?;
        let y = if root.is_odd() { root.neg() } else { root };
        Some(Point::Affine { x, y })
    }
}

fn curve_rhs(x: &FieldElement) -> FieldElement {
    x.square().mul(x).add(&FieldElement::from_u64(CURVE_B))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::field_prime;

    fn hex32(value: &str) -> [u8; 32] {
        let bytes = hex::decode(value).unwrap();
        bytes.try_into().unwrap()
    }

    #[test]
    fn test_generator_is_on_curve() {
        assert!(Point::generator().is_on_curve());
    }

    #[test]
    fn test_double_generator() {
        let two_g = Point::generator().double();
        assert!(two_g.is_on_curve());
        assert_eq!(
            hex::encode(two_g.x_bytes().unwrap()),
            "c6047f9441ed7d6d3045406e95c07cd85c778e4b8cef3ca7abac09b95c709ee5"
        );
        assert_eq!(
            hex::encode(two_g.y().unwrap().to_be_bytes()),
            "1ae168fea63dc339a3c58419466ceaeef7f632653266d0e1236431a950cfe52a"
        );
        assert_eq!(Point::generator().add(&Point::generator()), two_g);
    }

    #[test]
    fn test_multiply_matches_repeated_addition() {
        let g = Point::generator();
        let three_g = g.add(&g).add(&g);
        assert_eq!(g.multiply(&U256::from_u64(3)), three_g);
        assert_eq!(
            hex::encode(three_g.x_bytes().unwrap()),
            "f9308a019258c31049344f85f89d5229b531c845836f99b08601f113bce036f9"
        );
    }

    #[test]
    fn test_infinity_rules() {
        let g = Point::generator();
        assert_eq!(Point::Infinity.add(&g), g);
        assert_eq!(g.add(&Point::Infinity), g);
        assert_eq!(g.add(&g.negate()), Point::Infinity);
        assert_eq!(Point::Infinity.double(), Point::Infinity);
        assert_eq!(g.multiply(&U256::ZERO), Point::Infinity);
    }

    #[test]
    fn test_multiply_by_order_is_infinity() {
        let g = Point::generator();
        assert_eq!(g.multiply(&Scalar::order()), Point::Infinity);
        let n_minus_one = Scalar::order().wrapping_sub(&U256::ONE);
        assert_eq!(g.multiply(&n_minus_one), g.negate());
    }

    #[test]
    fn test_lift_x_returns_even_root() {
        let g = Point::generator();
        let lifted = Point::lift_x(&g.x_bytes().unwrap()).unwrap();
        assert!(lifted.has_even_y());
        assert!(lifted.is_on_curve());
        // G has an even Y already.
        assert_eq!(lifted, g);

        let three_g = g.multiply(&U256::from_u64(3));
        let lifted = Point::lift_x(&three_g.x_bytes().unwrap()).unwrap();
        assert!(lifted.has_even_y());
        assert!(lifted == three_g || lifted == three_g.negate());
    }

    #[test]
    fn test_lift_x_rejects_out_of_field_x() {
        assert!(Point::lift_x(&field_prime().to_be_bytes()).is_none());
        assert!(Point::lift_x(&[0xff; 32]).is_none());
    }

    #[test]
    fn test_lift_x_rejects_non_residue() {
        // BIP-340 vector 5: x with no matching point on the curve.
        let x = hex32("eefdea4cdb677750a420fee807eacf21eb9898ae79b9768766e4faa04a2d4a34");
        assert!(Point::lift_x(&x).is_none());
    }
}
