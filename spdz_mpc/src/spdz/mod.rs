//! SPDZ protocol suite: authenticated additive sharing with MAC checks.

mod engine;
pub use engine::SpdzEngine;

mod fake_dealer;
pub use fake_dealer::DummyDataSupplier;

mod mac_check;
pub use mac_check::{mac_check_share, MacCheckProtocol};

mod precomp_dealer;
pub use precomp_dealer::{PrecomputedSpdzData, PrecomputedSpdzSupplier, RawShare};

mod protocols;
pub use protocols::{
    InputProtocol, MultProtocol, OpenProtocol, OpenToProtocol, Public, Shared, SpdzNativeProtocol,
};

mod resource_pool;
pub use resource_pool::{OpenedValue, SpdzResourcePool};

mod round_sync;
pub use round_sync::{MacCheckObserver, MacCheckSchedule, MacCheckTrigger, SpdzRoundSynchronization};

mod share;
pub use share::SpdzShare;

use crate::{fields::FieldDefinition, Error, PartyId};

/// Random sharing of a secret random triple (a, b, c) that satisfies ab = c.
#[derive(Clone, Debug)]
pub struct SpdzTriple<T> {
    pub a: SpdzShare<T>,
    pub b: SpdzShare<T>,
    pub c: SpdzShare<T>,
}

/// Sharing of a random mask whose plain value is known to one party.
#[derive(Clone, Debug)]
pub struct SpdzInputMask<T> {
    pub mask: SpdzShare<T>,
    /// Plain value of the mask. Present only at the party the mask is for.
    pub real_value: Option<T>,
}

/// Source of preprocessed material for SPDZ protocol.
pub trait SpdzDataSupplier<F: FieldDefinition> {
    /// Next multiplication triple.
    fn next_triple(&mut self) -> Result<SpdzTriple<F::Element>, Error>;

    /// Next mask for an input provided by, or an output opened to, `toward`.
    fn next_input_mask(&mut self, toward: PartyId) -> Result<SpdzInputMask<F::Element>, Error>;

    /// Sharing of a random bit.
    fn next_bit_share(&mut self) -> Result<SpdzShare<F::Element>, Error> {
        Err(Error::Unsupported("random bit"))
    }

    /// Sharing of a uniformly random field element.
    fn next_random_element_share(&mut self) -> Result<SpdzShare<F::Element>, Error> {
        Err(Error::Unsupported("random element"))
    }

    /// This party's share of the MAC key.
    fn secret_shared_key(&self) -> F::Element;
}

#[cfg(test)]
pub(crate) mod testing {
    use rand::{rngs::StdRng, SeedableRng};

    use super::SpdzShare;
    use crate::fields::{FieldDefinition, MpcField};

    /// Random additive sharing of `value`.
    pub fn additive_shares<F: FieldDefinition>(
        field: &F,
        num_parties: usize,
        value: F::Element,
        rng: &mut StdRng,
    ) -> Vec<F::Element> {
        let mut shares: Vec<_> = (1..num_parties).map(|_| field.random(rng)).collect();
        let sum = shares.iter().cloned().fold(field.zero(), |acc, x| acc + x);
        shares.push(value - sum);
        shares
    }

    /// MAC key, its sharing and an authenticated sharing of `value`.
    /// The key only depends on `seed`.
    pub fn share_with_key<F: FieldDefinition>(
        field: &F,
        num_parties: usize,
        value: F::Element,
        seed: u64,
    ) -> (F::Element, Vec<F::Element>, Vec<SpdzShare<F::Element>>) {
        let mut rng = StdRng::seed_from_u64(seed);
        let key = field.random(&mut rng);
        let key_shares = additive_shares(field, num_parties, key.clone(), &mut rng);
        let values = additive_shares(field, num_parties, value.clone(), &mut rng);
        let macs = additive_shares(field, num_parties, key.clone() * value, &mut rng);
        let shares = values
            .into_iter()
            .zip(macs)
            .map(|(value, mac)| SpdzShare::new(value, mac))
            .collect();
        (key, key_shares, shares)
    }

    /// Sum of value shares and sum of MAC shares.
    pub fn reconstruct<T: MpcField>(shares: &[SpdzShare<T>]) -> (T, T) {
        shares
            .iter()
            .cloned()
            .reduce(|a, b| a + b)
            .map(SpdzShare::into_parts)
            .expect("at least one share")
    }
}
