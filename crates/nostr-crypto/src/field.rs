//! Modular arithmetic over the secp256k1 base field and scalar group.
//!
//! Both moduli are of the form 2^256 - c with a small c, so a 512-bit product
//! is reduced by folding the high half back in as `hi * c` until it vanishes.
//! Inversion uses Fermat's little theorem (a^(m-2)); both moduli are prime.

use crate::uint::U256;

#[derive(Debug, Clone, Copy)]
pub(crate) struct Modulus {
    pub(crate) m: U256,
    /// 2^256 - m.
    c: U256,
}

/// Field prime p = 2^256 - 2^32 - 977.
pub(crate) const P: Modulus = Modulus {
    m: U256::from_limbs([
        0xFFFF_FFFE_FFFF_FC2F,
        0xFFFF_FFFF_FFFF_FFFF,
        0xFFFF_FFFF_FFFF_FFFF,
        0xFFFF_FFFF_FFFF_FFFF,
    ]),
    c: U256::from_limbs([0x0000_0001_0000_03D1, 0, 0, 0]),
};

/// Group order n.
pub(crate) const N: Modulus = Modulus {
    m: U256::from_limbs([
        0xBFD2_5E8C_D036_4141,
        0xBAAE_DCE6_AF48_A03B,
        0xFFFF_FFFF_FFFF_FFFE,
        0xFFFF_FFFF_FFFF_FFFF,
    ]),
    c: U256::from_limbs([0x402D_A173_2FC9_BEBF, 0x4551_2319_50B7_5FC4, 0x1, 0]),
};

impl Modulus {
    fn add(&self, a: &U256, b: &U256) -> U256 {
        let (sum, carry) = a.overflowing_add(b);
        if carry || sum >= self.m {
            sum.wrapping_sub(&self.m)
        } else {
            sum
        }
    }

    fn sub(&self, a: &U256, b: &U256) -> U256 {
        let (diff, borrow) = a.overflowing_sub(b);
        if borrow {
            diff.wrapping_add(&self.m)
        } else {
            diff
        }
    }

    fn neg(&self, a: &U256) -> U256 {
        if a.is_zero() {
            U256::ZERO
        } else {
            self.m.wrapping_sub(a)
        }
    }

    fn mul(&self, a: &U256, b: &U256) -> U256 {
        self.reduce_wide(a.widening_mul(b))
    }

    fn reduce_wide(&self, wide: [u64; 8]) -> U256 {
        let mut lo = U256::from_limbs([wide[0], wide[1], wide[2], wide[3]]);
        let mut hi = U256::from_limbs([wide[4], wide[5], wide[6], wide[7]]);

        while !hi.is_zero() {
            let folded = hi.widening_mul(&self.c);
            let folded_lo = U256::from_limbs([folded[0], folded[1], folded[2], folded[3]]);
            let folded_hi = U256::from_limbs([folded[4], folded[5], folded[6], folded[7]]);
            let (sum, carry) = lo.overflowing_add(&folded_lo);
            lo = sum;
            hi = folded_hi.wrapping_add(&U256::from_u64(carry as u64));
        }

        while lo >= self.m {
            lo = lo.wrapping_sub(&self.m);
        }
        lo
    }

    fn pow(&self, base: &U256, exp: &U256) -> U256 {
        let mut result = U256::ONE;
        for i in (0..exp.bits()).rev() {
            result = self.mul(&result, &result);
            if exp.bit(i) {
                result = self.mul(&result, base);
            }
        }
        result
    }

    fn reduce(&self, value: &U256) -> U256 {
        if *value >= self.m {
            value.wrapping_sub(&self.m)
        } else {
            *value
        }
    }
}

/// Element of the base field, always fully reduced below p.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldElement(U256);

impl FieldElement {
    pub const ZERO: Self = Self(U256::ZERO);
    pub const ONE: Self = Self(U256::ONE);

    /// Returns `None` unless `value < p`.
    pub fn new(value: U256) -> Option<Self> {
        (value < P.m).then_some(Self(value))
    }

    pub(crate) const fn from_limbs_unchecked(limbs: [u64; 4]) -> Self {
        Self(U256::from_limbs(limbs))
    }

    pub fn from_u64(value: u64) -> Self {
        Self(U256::from_u64(value))
    }

    pub fn from_be_bytes(bytes: &[u8; 32]) -> Option<Self> {
        Self::new(U256::from_be_bytes(bytes))
    }

    pub fn to_be_bytes(&self) -> [u8; 32] {
        self.0.to_be_bytes()
    }

    pub fn value(&self) -> U256 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_odd(&self) -> bool {
        self.0.is_odd()
    }

    pub fn add(&self, rhs: &Self) -> Self {
        Self(P.add(&self.0, &rhs.0))
    }

    pub fn sub(&self, rhs: &Self) -> Self {
        Self(P.sub(&self.0, &rhs.0))
    }

    pub fn mul(&self, rhs: &Self) -> Self {
        Self(P.mul(&self.0, &rhs.0))
    }

    pub fn square(&self) -> Self {
        self.mul(self)
    }

    pub fn neg(&self) -> Self {
        Self(P.neg(&self.0))
    }

    pub fn pow(&self, exp: &U256) -> Self {
        Self(P.pow(&self.0, exp))
    }

    /// Multiplicative inverse via a^(p-2). Zero maps to zero.
    pub fn invert(&self) -> Self {
        let exp = P.m.wrapping_sub(&U256::from_u64(2));
        self.pow(&exp)
    }

    /// Euler's criterion: a^((p-1)/2) == 1 for non-zero quadratic residues.
    pub fn is_square(&self) -> bool {
        if self.is_zero() {
            return true;
        }
        let exp = P.m.wrapping_sub(&U256::ONE).shr(1);
        self.pow(&exp) == Self::ONE
    }

    /// Principal square root a^((p+1)/4), valid because p = 3 mod 4.
    /// Returns `None` when `self` is not a square.
    pub fn sqrt(&self) -> Option<Self> {
        if !self.is_square() {
            return None;
        }
        let exp = P.m.wrapping_add(&U256::ONE).shr(2);
        let root = self.pow(&exp);
        (root.square() == *self).then_some(root)
    }
}

/// Integer modulo the group order n.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scalar(U256);

impl Scalar {
    pub const ZERO: Self = Self(U256::ZERO);
    pub const ONE: Self = Self(U256::ONE);

    /// Accepts only `0 < value < n`.
    pub fn new_nonzero(value: U256) -> Option<Self> {
        (!value.is_zero() && value < N.m).then_some(Self(value))
    }

    pub fn from_u64(value: u64) -> Self {
        Self(N.reduce(&U256::from_u64(value)))
    }

    /// Interprets 32 bytes as an integer and reduces it mod n.
    pub fn from_be_bytes_reduced(bytes: &[u8; 32]) -> Self {
        Self(N.reduce(&U256::from_be_bytes(bytes)))
    }

    pub fn to_be_bytes(&self) -> [u8; 32] {
        self.0.to_be_bytes()
    }

    pub fn value(&self) -> U256 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn add(&self, rhs: &Self) -> Self {
        Self(N.add(&self.0, &rhs.0))
    }

    pub fn mul(&self, rhs: &Self) -> Self {
        Self(N.mul(&self.0, &rhs.0))
    }

    pub fn neg(&self) -> Self {
        Self(N.neg(&self.0))
    }

    pub fn order() -> U256 {
        N.m
    }
}

pub(crate) fn field_prime() -> U256 {
    P.m
}
