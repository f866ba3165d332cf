use std::mem;

use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

use super::{SpdzDataSupplier, SpdzShare};
use crate::{fields::FieldDefinition, Error, PartyId};

/// Publicly opened value together with this party's MAC share of it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OpenedValue<T> {
    pub value: T,
    pub mac_share: T,
}

/// Per-party state of one SPDZ computation.
pub struct SpdzResourcePool<F: FieldDefinition> {
    party_id: PartyId,
    num_parties: usize,
    field: F,
    rng: ChaCha20Rng,
    supplier: Box<dyn SpdzDataSupplier<F>>,
    key_share: F::Element,
    openings: Vec<OpenedValue<F::Element>>,
}

impl<F: FieldDefinition> SpdzResourcePool<F> {
    /// Create pool with a randomness source seeded from the operating system.
    pub fn new(
        party_id: PartyId,
        num_parties: usize,
        field: F,
        supplier: Box<dyn SpdzDataSupplier<F>>,
    ) -> Result<Self, Error> {
        Self::with_rng(
            party_id,
            num_parties,
            field,
            supplier,
            ChaCha20Rng::from_entropy(),
        )
    }

    pub fn with_rng(
        party_id: PartyId,
        num_parties: usize,
        field: F,
        supplier: Box<dyn SpdzDataSupplier<F>>,
        rng: ChaCha20Rng,
    ) -> Result<Self, Error> {
        if party_id == 0 || party_id > num_parties {
            return Err(Error::Config(format!(
                "party {party_id} is not part of a computation of {num_parties} parties"
            )));
        }
        Ok(Self {
            party_id,
            num_parties,
            key_share: supplier.secret_shared_key(),
            field,
            rng,
            supplier,
            openings: Vec::new(),
        })
    }

    pub fn party_id(&self) -> PartyId {
        self.party_id
    }

    pub fn num_parties(&self) -> usize {
        self.num_parties
    }

    pub fn field(&self) -> &F {
        &self.field
    }

    pub fn rng(&mut self) -> &mut ChaCha20Rng {
        &mut self.rng
    }

    pub fn supplier(&mut self) -> &mut dyn SpdzDataSupplier<F> {
        self.supplier.as_mut()
    }

    pub fn key_share(&self) -> &F::Element {
        &self.key_share
    }

    /// Sharing of a public constant.
    pub fn share_public(&self, constant: F::Element) -> SpdzShare<F::Element> {
        SpdzShare::from_public(constant, self.field.zero(), &self.key_share, self.party_id)
    }

    /// Record a value opened by this party for later MAC verification.
    pub fn log_opening(&mut self, value: F::Element, mac_share: F::Element) {
        self.openings.push(OpenedValue { value, mac_share });
    }

    /// Number of opened values not verified yet.
    pub fn pending_openings(&self) -> usize {
        self.openings.len()
    }

    pub(crate) fn take_openings(&mut self) -> Vec<OpenedValue<F::Element>> {
        mem::take(&mut self.openings)
    }
}
