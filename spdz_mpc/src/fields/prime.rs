use std::{fmt, marker::PhantomData, sync::Arc};

use ff::{Field, PrimeField};
use num_bigint::BigUint;
use rand::RngCore;

use super::{FieldDefinition, Modulus, MpcField};

mod mersenne_61 {
    use ff::PrimeField;

    /// Finite field mod 2^61-1.
    #[derive(PrimeField)]
    #[PrimeFieldModulus = "2305843009213693951"]
    #[PrimeFieldGenerator = "37"]
    #[PrimeFieldReprEndianness = "little"]
    pub struct Mersenne61([u64; 1]);
}

mod mersenne_127 {
    use ff::PrimeField;

    /// Finite field mod 2^127-1.
    #[derive(PrimeField)]
    #[PrimeFieldModulus = "170141183460469231731687303715884105727"]
    #[PrimeFieldGenerator = "43"]
    #[PrimeFieldReprEndianness = "little"]
    pub struct Mersenne127([u64; 2]);
}

pub use mersenne_127::Mersenne127;
pub use mersenne_61::Mersenne61;

impl MpcField for Mersenne61 {}
impl MpcField for Mersenne127 {}

/// Fixed-width field whose modulus is fixed at compile time by an `ff` prime field.
pub struct PrimeFieldDefinition<F> {
    modulus: Arc<Modulus>,
    _field: PhantomData<F>,
}

impl<F: PrimeField + MpcField> PrimeFieldDefinition<F> {
    pub fn new() -> Self {
        let minus_one = BigUint::from_bytes_le((-F::one()).to_repr().as_ref());
        Self {
            modulus: Arc::new(
                Modulus::new(minus_one + 1u32).expect("prime field modulus is at least 2"),
            ),
            _field: PhantomData,
        }
    }
}

impl<F: PrimeField + MpcField> Default for PrimeFieldDefinition<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F> Clone for PrimeFieldDefinition<F> {
    fn clone(&self) -> Self {
        Self {
            modulus: self.modulus.clone(),
            _field: PhantomData,
        }
    }
}

impl<F> fmt::Debug for PrimeFieldDefinition<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PrimeFieldDefinition")
            .field(&self.modulus)
            .finish()
    }
}

impl<F: PrimeField + MpcField> FieldDefinition for PrimeFieldDefinition<F> {
    type Element = F;

    fn modulus(&self) -> &Modulus {
        &self.modulus
    }

    fn create_from_biguint(&self, value: &BigUint) -> F {
        // Horner evaluation over 64-bit limbs, most significant first.
        let half = F::from(1u64 << 32);
        let base = half * half;
        value
            .to_u64_digits()
            .iter()
            .rev()
            .fold(F::zero(), |acc, &digit| acc * base + F::from(digit))
    }

    fn to_biguint(&self, element: &F) -> BigUint {
        BigUint::from_bytes_le(element.to_repr().as_ref())
    }

    fn random(&self, rng: &mut dyn RngCore) -> F {
        F::random(rng)
    }

    fn create(&self, value: u64) -> F {
        F::from(value)
    }

    fn zero(&self) -> F {
        F::zero()
    }

    fn one(&self) -> F {
        F::one()
    }

    fn is_zero(&self, element: &F) -> bool {
        bool::from(element.is_zero())
    }
}

#[cfg(test)]
mod tests {
    use num_bigint::BigInt;

    use super::*;

    #[test]
    fn test_mersenne_61_modulus() {
        let field = PrimeFieldDefinition::<Mersenne61>::new();
        assert_eq!(
            field.modulus().value(),
            &BigUint::from(2305843009213693951u64)
        );
        assert_eq!(field.modulus().byte_length(), 8);
    }

    #[test]
    fn test_mersenne_127_large_values() {
        let field = PrimeFieldDefinition::<Mersenne127>::new();
        assert_eq!(field.modulus().byte_length(), 16);

        let big = (BigUint::from(1u32) << 127u32) + 5u32;
        assert_eq!(field.create_from_biguint(&big), field.create(6));

        let x = field.create_from_biguint(&(BigUint::from(u64::MAX) * 3u32));
        assert_eq!(field.to_biguint(&x), BigUint::from(u64::MAX) * 3u32);
    }

    #[test]
    fn test_serialization_matches_bigint_field() {
        let prime = PrimeFieldDefinition::<Mersenne61>::new();
        let generic = crate::fields::BigIntField::new(prime.modulus().clone());
        for value in [0u64, 1, 255, 1 << 40, u64::MAX] {
            let a = prime.serialize(&prime.create(value));
            let b = generic.serialize(&generic.create(value));
            assert_eq!(a, b);
            assert_eq!(prime.deserialize(&a).unwrap(), prime.create(value));
        }
        let minus = prime.create_from_bigint(&BigInt::from(-10));
        assert_eq!(prime.convert_to_signed(&minus), BigInt::from(-10));
    }
}
