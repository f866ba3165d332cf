//! Arithmetic modulo a prime or power-of-two modulus.
//!
//! Elements are plain values implementing [`MpcField`]; everything that needs
//! the modulus (construction, randomness, serialization) goes through a
//! [`FieldDefinition`].

use std::{
    fmt,
    ops::{Add, Mul, Neg, Sub},
    str::FromStr,
};

use num_bigint::{BigInt, BigUint, Sign};
use rand::RngCore;

use crate::{bitvec::BitVector, Error};

mod bigint;
mod modulus;
mod prime;

pub use bigint::{BigIntElement, BigIntField};
pub use modulus::Modulus;
pub use prime::{Mersenne127, Mersenne61, PrimeFieldDefinition};

/// Element of a finite field or ring. All operations are reduced by the modulus.
pub trait MpcField:
    Clone
    + fmt::Debug
    + PartialEq
    + Eq
    + 'static
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Neg<Output = Self>
{
}

/// Describes a field: its modulus and how elements are created and encoded.
pub trait FieldDefinition: Clone + fmt::Debug + 'static {
    /// Element type of this field.
    type Element: MpcField;

    /// Modulus of this field.
    fn modulus(&self) -> &Modulus;

    /// Element for given integer, reduced by the modulus.
    fn create_from_biguint(&self, value: &BigUint) -> Self::Element;

    /// Canonical integer representative in `[0, modulus)`.
    fn to_biguint(&self, element: &Self::Element) -> BigUint;

    /// Uniformly random element.
    fn random(&self, rng: &mut dyn RngCore) -> Self::Element;

    fn create(&self, value: u64) -> Self::Element {
        self.create_from_biguint(&BigUint::from(value))
    }

    /// Element for a signed integer; negative values wrap around the modulus.
    fn create_from_bigint(&self, value: &BigInt) -> Self::Element {
        let magnitude = self.create_from_biguint(value.magnitude());
        match value.sign() {
            Sign::Minus => -magnitude,
            _ => magnitude,
        }
    }

    /// Element from a decimal string with an optional leading minus sign.
    fn create_from_str(&self, value: &str) -> Result<Self::Element, Error> {
        let parsed = BigInt::from_str(value.trim())
            .map_err(|err| Error::Malformed(format!("invalid number {value:?}: {err}")))?;
        Ok(self.create_from_bigint(&parsed))
    }

    fn zero(&self) -> Self::Element {
        self.create(0)
    }

    fn one(&self) -> Self::Element {
        self.create(1)
    }

    fn is_zero(&self, element: &Self::Element) -> bool {
        *element == self.zero()
    }

    /// Map an element to the symmetric range `(-m/2, m/2]`.
    fn convert_to_signed(&self, element: &Self::Element) -> BigInt {
        let value = self.to_biguint(element);
        let modulus = self.modulus();
        if &value > modulus.halved() {
            BigInt::from(value) - BigInt::from(modulus.value().clone())
        } else {
            BigInt::from(value)
        }
    }

    /// Fixed-width big-endian encoding of `byte_length` bytes.
    fn serialize(&self, element: &Self::Element) -> Vec<u8> {
        let width = self.modulus().byte_length();
        let bytes = self.to_biguint(element).to_bytes_be();
        let mut out = vec![0u8; width];
        out[width - bytes.len()..].copy_from_slice(&bytes);
        out
    }

    /// Concatenation of fixed-width encodings.
    fn serialize_list(&self, elements: &[Self::Element]) -> Vec<u8> {
        let mut out = Vec::with_capacity(elements.len() * self.modulus().byte_length());
        for element in elements {
            out.extend(self.serialize(element));
        }
        out
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<Self::Element, Error> {
        let width = self.modulus().byte_length();
        if bytes.len() != width {
            return Err(Error::InvalidLength {
                expected: width,
                actual: bytes.len(),
            });
        }
        Ok(self.create_from_biguint(&BigUint::from_bytes_be(bytes)))
    }

    fn deserialize_list(&self, bytes: &[u8]) -> Result<Vec<Self::Element>, Error> {
        let width = self.modulus().byte_length();
        if bytes.len() % width != 0 {
            return Err(Error::InvalidLength {
                expected: (bytes.len() / width + 1) * width,
                actual: bytes.len(),
            });
        }
        bytes
            .chunks(width)
            .map(|chunk| self.deserialize(chunk))
            .collect()
    }

    /// Bits of the serialized element.
    fn to_bit_vector(&self, element: &Self::Element) -> BitVector {
        let bytes = self.serialize(element);
        let size = bytes.len() * 8;
        BitVector::from_bytes(bytes, size)
            .expect("serialized element always spans whole bytes")
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn field() -> BigIntField {
        BigIntField::new(Modulus::mersenne(31).unwrap())
    }

    #[test]
    fn test_signed_conversion() {
        let field = field();
        let minus_one = field.create_from_bigint(&BigInt::from(-1));
        assert_eq!(field.convert_to_signed(&minus_one), BigInt::from(-1));
        assert_eq!(field.convert_to_signed(&field.create(5)), BigInt::from(5));

        let half = field.modulus().halved().clone();
        let at_half = field.create_from_biguint(&half);
        assert_eq!(field.convert_to_signed(&at_half), BigInt::from(half.clone()));
        let above_half = field.create_from_biguint(&(half + 1u32));
        assert!(field.convert_to_signed(&above_half) < BigInt::from(0));
    }

    #[test]
    fn test_create_from_str() {
        let field = field();
        assert_eq!(field.create_from_str("42").unwrap(), field.create(42));
        assert_eq!(
            field.create_from_str("-3").unwrap(),
            field.zero() - field.create(3)
        );
        assert_eq!(field.create_from_str("2147483648").unwrap(), field.create(1));
        assert!(matches!(
            field.create_from_str("12ab"),
            Err(Error::Malformed(_))
        ));
    }

    #[test]
    fn test_serialization_is_fixed_width() {
        let field = field();
        assert_eq!(field.modulus().byte_length(), 4);
        assert_eq!(field.serialize(&field.create(1)), vec![0, 0, 0, 1]);
        assert_eq!(field.serialize(&field.create(0x0102_0304)), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_deserialize_rejects_bad_lengths() {
        let field = field();
        assert!(matches!(
            field.deserialize(&[1, 2, 3]),
            Err(Error::InvalidLength {
                expected: 4,
                actual: 3
            })
        ));
        assert!(matches!(
            field.deserialize_list(&[0; 9]),
            Err(Error::InvalidLength { actual: 9, .. })
        ));
        assert_eq!(field.deserialize_list(&[]).unwrap(), vec![]);
    }

    #[test]
    fn test_bit_vector_of_element() {
        let field = field();
        let bits = field.to_bit_vector(&field.create(1));
        assert_eq!(bits.len(), 32);
        assert!(bits.get(0).unwrap());
        assert!(!bits.get(1).unwrap());
    }

    proptest! {
        #[test]
        fn prop_serialization_round_trip(values in prop::collection::vec(any::<u64>(), 0..16)) {
            let field = field();
            let elements: Vec<_> = values.iter().map(|&v| field.create(v)).collect();
            for element in &elements {
                prop_assert_eq!(&field.deserialize(&field.serialize(element)).unwrap(), element);
            }
            let bytes = field.serialize_list(&elements);
            prop_assert_eq!(bytes.len(), elements.len() * 4);
            prop_assert_eq!(field.deserialize_list(&bytes).unwrap(), elements);
        }

        #[test]
        fn prop_arithmetic_matches_integers(a in any::<u64>(), b in any::<u64>()) {
            let field = field();
            let p = (1u128 << 31) - 1;
            let (x, y) = (a as u128 % p, b as u128 % p);
            let reduce = |v: u128| field.create((v % p) as u64);
            prop_assert_eq!(field.create(a) + field.create(b), reduce(x + y));
            prop_assert_eq!(field.create(a) - field.create(b), reduce(x + p - y));
            prop_assert_eq!(field.create(a) * field.create(b), reduce(x * y));
            prop_assert_eq!(-field.create(a) + field.create(a), field.zero());
        }
    }
}
