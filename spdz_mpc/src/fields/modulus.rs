use std::{fmt, str::FromStr};

use num_bigint::BigUint;
use num_traits::One;

use crate::Error;

/// Modulus of a field or ring, with derived constants used for encoding.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Modulus {
    value: BigUint,
    halved: BigUint,
    bit_length: u64,
    byte_length: usize,
}

impl Modulus {
    /// Wrap given value. Must be at least 2.
    pub fn new(value: BigUint) -> Result<Self, Error> {
        if value < BigUint::from(2u32) {
            return Err(Error::InvalidModulus(format!(
                "modulus must be at least 2, got {value}"
            )));
        }
        let bit_length = value.bits();
        Ok(Self {
            halved: &value >> 1,
            byte_length: ((bit_length + 7) / 8) as usize,
            bit_length,
            value,
        })
    }

    /// Mersenne number `2^exponent - 1`.
    pub fn mersenne(exponent: u32) -> Result<Self, Error> {
        Self::new((BigUint::one() << exponent) - 1u32)
    }

    /// Power of two `2^exponent`, for arithmetic in a composite ring.
    pub fn power_of_two(exponent: u32) -> Result<Self, Error> {
        Self::new(BigUint::one() << exponent)
    }

    pub fn value(&self) -> &BigUint {
        &self.value
    }

    /// `floor(modulus / 2)`.
    pub fn halved(&self) -> &BigUint {
        &self.halved
    }

    pub fn bit_length(&self) -> u64 {
        self.bit_length
    }

    /// Width of a serialized element in bytes.
    pub fn byte_length(&self) -> usize {
        self.byte_length
    }
}

impl FromStr for Modulus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = BigUint::from_str(s.trim())
            .map_err(|err| Error::InvalidModulus(format!("{s:?}: {err}")))?;
        Self::new(value)
    }
}

impl fmt::Debug for Modulus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Modulus({})", self.value)
    }
}

impl fmt::Display for Modulus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.value.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_constants() {
        let m = Modulus::mersenne(31).unwrap();
        assert_eq!(m.value(), &BigUint::from(2147483647u64));
        assert_eq!(m.halved(), &BigUint::from(1073741823u64));
        assert_eq!(m.bit_length(), 31);
        assert_eq!(m.byte_length(), 4);

        let m = Modulus::power_of_two(64).unwrap();
        assert_eq!(m.bit_length(), 65);
        assert_eq!(m.byte_length(), 9);
    }

    #[test]
    fn test_parse() {
        let m: Modulus = "65521".parse().unwrap();
        assert_eq!(m.value(), &BigUint::from(65521u32));
        assert_eq!(m.byte_length(), 2);
        assert!("1".parse::<Modulus>().is_err());
        assert!("abc".parse::<Modulus>().is_err());
    }
}
