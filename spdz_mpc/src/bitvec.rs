//! Fixed-length bit vectors backed by a byte buffer.

use rand::RngCore;

use crate::Error;

/// Vector of bits whose length is a multiple of 8.
///
/// Logical bit `i` is stored at buffer position `len - 1 - i`, where buffer
/// position `p` is bit `7 - p % 8` of byte `p / 8` (left to right).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BitVector {
    bits: Vec<u8>,
    size: usize,
}

impl BitVector {
    /// All-zero vector of given bit length.
    pub fn new(size: usize) -> Result<Self, Error> {
        check_byte_aligned(size)?;
        Ok(Self {
            bits: vec![0; size / 8],
            size,
        })
    }

    /// Wrap raw bytes. `size` must equal the bit length of `bits`.
    pub fn from_bytes(bits: Vec<u8>, size: usize) -> Result<Self, Error> {
        check_byte_aligned(size)?;
        if bits.len() * 8 != size {
            return Err(Error::InvalidLength {
                expected: size / 8,
                actual: bits.len(),
            });
        }
        Ok(Self { bits, size })
    }

    /// Uniformly random vector of given bit length.
    pub fn random(size: usize, rng: &mut dyn RngCore) -> Result<Self, Error> {
        let mut vector = Self::new(size)?;
        rng.fill_bytes(&mut vector.bits);
        Ok(vector)
    }

    /// Number of bits.
    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bits
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bits
    }

    pub fn get(&self, index: usize) -> Result<bool, Error> {
        let position = self.position(index)?;
        Ok((self.bits[position / 8] >> (7 - position % 8)) & 1 == 1)
    }

    pub fn set(&mut self, index: usize, value: bool) -> Result<(), Error> {
        let position = self.position(index)?;
        let mask = 1 << (7 - position % 8);
        if value {
            self.bits[position / 8] |= mask;
        } else {
            self.bits[position / 8] &= !mask;
        }
        Ok(())
    }

    /// XOR `other` into this vector. Both must have the same length.
    pub fn xor(&mut self, other: &BitVector) -> Result<(), Error> {
        if self.size != other.size {
            return Err(Error::SizeMismatch {
                left: self.size,
                right: other.size,
            });
        }
        for (a, b) in self.bits.iter_mut().zip(&other.bits) {
            *a ^= b;
        }
        Ok(())
    }

    /// Lay out the byte buffers of all vectors end to end.
    ///
    /// Because of the reversed indexing, the last vector occupies the lowest
    /// logical indices of the result.
    pub fn concat(vectors: &[BitVector]) -> BitVector {
        let bits: Vec<u8> = vectors
            .iter()
            .flat_map(|v| v.bits.iter().copied())
            .collect();
        BitVector {
            size: bits.len() * 8,
            bits,
        }
    }

    fn position(&self, index: usize) -> Result<usize, Error> {
        if index >= self.size {
            return Err(Error::IndexOutOfBounds {
                index,
                size: self.size,
            });
        }
        Ok(self.size - 1 - index)
    }
}

fn check_byte_aligned(size: usize) -> Result<(), Error> {
    if size % 8 != 0 {
        return Err(Error::Malformed(format!(
            "bit vector size must be a multiple of 8, got {size}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;

    #[test]
    fn test_reversed_indexing() {
        let v = BitVector::from_bytes(vec![0b1000_0000, 0b0000_0001], 16).unwrap();
        assert!(v.get(0).unwrap());
        assert!(v.get(15).unwrap());
        assert!(!v.get(1).unwrap());
        assert!(!v.get(8).unwrap());
    }

    #[test]
    fn test_set_matches_get() {
        let mut v = BitVector::new(16).unwrap();
        v.set(3, true).unwrap();
        assert!(v.get(3).unwrap());
        assert_eq!(v.as_bytes(), &[0, 0b0000_1000]);
        v.set(3, false).unwrap();
        assert_eq!(v.as_bytes(), &[0, 0]);
    }

    #[test]
    fn test_rejects_malformed_input() {
        assert!(BitVector::new(12).is_err());
        assert!(matches!(
            BitVector::from_bytes(vec![0; 2], 8),
            Err(Error::InvalidLength { .. })
        ));
        let mut v = BitVector::new(8).unwrap();
        assert!(matches!(
            v.get(8),
            Err(Error::IndexOutOfBounds { index: 8, size: 8 })
        ));
        assert!(matches!(
            v.xor(&BitVector::new(16).unwrap()),
            Err(Error::SizeMismatch { left: 8, right: 16 })
        ));
    }

    #[test]
    fn test_xor_is_self_inverse() {
        let mut rng = StdRng::seed_from_u64(1);
        let original = BitVector::random(256, &mut rng).unwrap();
        let mut v = original.clone();
        v.xor(&original).unwrap();
        assert_eq!(v, BitVector::new(256).unwrap());
    }

    #[test]
    fn test_concat_logical_bits() {
        let mut first = BitVector::new(8).unwrap();
        first.set(2, true).unwrap();
        let mut second = BitVector::new(16).unwrap();
        second.set(9, true).unwrap();

        let joined = BitVector::concat(&[first.clone(), second.clone()]);
        assert_eq!(joined.len(), 24);
        for i in 0..16 {
            assert_eq!(joined.get(i).unwrap(), second.get(i).unwrap());
        }
        for i in 0..8 {
            assert_eq!(joined.get(16 + i).unwrap(), first.get(i).unwrap());
        }
    }

    proptest! {
        #[test]
        fn prop_concat_preserves_bytes(
            a in prop::collection::vec(any::<u8>(), 0..8),
            b in prop::collection::vec(any::<u8>(), 0..8),
        ) {
            let va = BitVector::from_bytes(a.clone(), a.len() * 8).unwrap();
            let vb = BitVector::from_bytes(b.clone(), b.len() * 8).unwrap();
            let joined = BitVector::concat(&[va, vb]);
            prop_assert_eq!(joined.len(), (a.len() + b.len()) * 8);
            let mut expected = a.clone();
            expected.extend(&b);
            prop_assert_eq!(joined.as_bytes(), &expected[..]);
        }
    }
}
