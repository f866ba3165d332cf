use std::{
    fmt,
    hash::{Hash, Hasher},
    ops::{Add, Mul, Neg, Sub},
    sync::Arc,
};

use num_bigint::{BigUint, RandBigInt};
use num_traits::Zero;
use rand::RngCore;

use super::{FieldDefinition, Modulus, MpcField};

/// Arbitrary-precision arithmetic modulo a modulus chosen at runtime.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BigIntField {
    modulus: Arc<Modulus>,
}

impl BigIntField {
    pub fn new(modulus: Modulus) -> Self {
        Self {
            modulus: Arc::new(modulus),
        }
    }
}

impl FieldDefinition for BigIntField {
    type Element = BigIntElement;

    fn modulus(&self) -> &Modulus {
        &self.modulus
    }

    fn create_from_biguint(&self, value: &BigUint) -> BigIntElement {
        BigIntElement {
            value: value % self.modulus.value(),
            modulus: self.modulus.clone(),
        }
    }

    fn to_biguint(&self, element: &BigIntElement) -> BigUint {
        element.value.clone()
    }

    fn random(&self, rng: &mut dyn RngCore) -> BigIntElement {
        BigIntElement {
            value: rng.gen_biguint_below(self.modulus.value()),
            modulus: self.modulus.clone(),
        }
    }
}

/// Element of a [`BigIntField`]. Carries a handle to its modulus.
#[derive(Clone)]
pub struct BigIntElement {
    value: BigUint,
    modulus: Arc<Modulus>,
}

impl BigIntElement {
    /// Canonical representative in `[0, modulus)`.
    pub fn value(&self) -> &BigUint {
        &self.value
    }

    fn with_value(&self, value: BigUint) -> Self {
        debug_assert!(&value < self.modulus.value());
        Self {
            value,
            modulus: self.modulus.clone(),
        }
    }

    fn check_same_field(&self, other: &Self) {
        debug_assert!(
            Arc::ptr_eq(&self.modulus, &other.modulus) || self.modulus == other.modulus,
            "elements from different fields"
        );
    }
}

impl MpcField for BigIntElement {}

impl PartialEq for BigIntElement {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl Eq for BigIntElement {}

impl Hash for BigIntElement {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl fmt::Debug for BigIntElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl fmt::Display for BigIntElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.value.fmt(f)
    }
}

impl Add for BigIntElement {
    type Output = BigIntElement;
    fn add(self, rhs: Self) -> Self::Output {
        self.check_same_field(&rhs);
        let mut sum = self.value + rhs.value;
        if &sum >= self.modulus.value() {
            sum -= self.modulus.value();
        }
        BigIntElement {
            value: sum,
            modulus: self.modulus,
        }
    }
}

impl Sub for BigIntElement {
    type Output = BigIntElement;
    fn sub(self, rhs: Self) -> Self::Output {
        self.check_same_field(&rhs);
        let value = if self.value >= rhs.value {
            &self.value - &rhs.value
        } else {
            self.modulus.value() - &rhs.value + &self.value
        };
        self.with_value(value)
    }
}

impl Mul for BigIntElement {
    type Output = BigIntElement;
    fn mul(self, rhs: Self) -> Self::Output {
        self.check_same_field(&rhs);
        let value = (&self.value * &rhs.value) % self.modulus.value();
        self.with_value(value)
    }
}

impl Neg for BigIntElement {
    type Output = BigIntElement;
    fn neg(self) -> Self::Output {
        if self.value.is_zero() {
            self
        } else {
            let value = self.modulus.value() - &self.value;
            self.with_value(value)
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;

    #[test]
    fn test_power_of_two_ring() {
        let ring = BigIntField::new(Modulus::power_of_two(8).unwrap());
        assert_eq!(ring.create(200) + ring.create(100), ring.create(44));
        assert_eq!(ring.create(3) - ring.create(5), ring.create(254));
        assert_eq!(ring.create(16) * ring.create(17), ring.create(16));
        assert_eq!(-ring.create(1), ring.create(255));
    }

    #[test]
    fn test_random_is_reduced() {
        let field = BigIntField::new("65521".parse().unwrap());
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let x = field.random(&mut rng);
            assert!(x.value() < field.modulus().value());
        }
    }

    #[test]
    fn test_equality_is_value_based() {
        let field = BigIntField::new(Modulus::mersenne(31).unwrap());
        let other = BigIntField::new(Modulus::mersenne(31).unwrap());
        assert_eq!(field.create(9), other.create(9));
        assert_eq!(field.create(2147483647 + 9), field.create(9));
    }
}
