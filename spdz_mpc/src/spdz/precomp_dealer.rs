use std::{
    fs::File,
    io::{BufReader, BufWriter},
    path::Path,
};

use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{SpdzDataSupplier, SpdzInputMask, SpdzShare, SpdzTriple};
use crate::{fields::FieldDefinition, Error, PartyId};

/// Serialized share: fixed-width encodings of value and MAC share.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct RawShare {
    pub value: Vec<u8>,
    pub mac: Vec<u8>,
}

/// Precomputed data of one party for SPDZ protocol.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct PrecomputedSpdzData {
    pub num_parties: usize,
    pub party_id: PartyId,
    /// Decimal modulus of the field the data was generated for.
    pub modulus: String,
    pub key_share: Vec<u8>,
    pub beaver_triples: Vec<[RawShare; 3]>,
    pub random_bits: Vec<RawShare>,
    /// Masks toward each party, indexed by `party - 1`.
    pub input_masks: Vec<Vec<RawShare>>,
    /// Plain values of the masks toward this party.
    pub input_masks_plain: Vec<Vec<u8>>,
}

impl PrecomputedSpdzData {
    /// Load precomputed data from file.
    pub fn load_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        Ok(bincode::deserialize_from(reader)?)
    }

    /// Save precomputed data to file.
    pub fn save_file(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        let file = File::create(path)?;
        let writer = BufWriter::new(file);
        Ok(bincode::serialize_into(writer, self)?)
    }

    /// Act as trusted dealer: generate a MAC key and material for all parties.
    pub fn generate<F: FieldDefinition>(
        field: &F,
        num_parties: usize,
        beaver_triples: usize,
        random_bits: usize,
        input_masks: usize,
        rng: &mut dyn RngCore,
    ) -> Vec<PrecomputedSpdzData> {
        let key_shares: Vec<_> = (0..num_parties).map(|_| field.random(rng)).collect();
        let auth_key = key_shares
            .iter()
            .cloned()
            .fold(field.zero(), |acc, x| acc + x);

        let mut data: Vec<PrecomputedSpdzData> = key_shares
            .iter()
            .zip(1..)
            .map(|(key_share, party_id)| PrecomputedSpdzData {
                num_parties,
                party_id,
                modulus: field.modulus().to_string(),
                key_share: field.serialize(key_share),
                input_masks: (0..num_parties).map(|_| Vec::new()).collect(),
                ..Default::default()
            })
            .collect();

        let mut share_gen = ShareGenerator {
            field,
            num_parties,
            auth_key,
            rng,
        };

        info!(
            num_parties,
            beaver_triples, random_bits, input_masks, "generating SPDZ material"
        );
        share_gen.fill_beaver_triples(&mut data, beaver_triples);
        share_gen.fill_random_bits(&mut data, random_bits);
        for party_id in 1..=num_parties {
            share_gen.fill_input_masks_for(&mut data, party_id, input_masks);
        }

        data
    }
}

/// Generator of random SPDZ sharings.
struct ShareGenerator<'a, F: FieldDefinition> {
    field: &'a F,
    num_parties: usize,
    auth_key: F::Element,
    rng: &'a mut dyn RngCore,
}

impl<'a, F: FieldDefinition> ShareGenerator<'a, F> {
    /// Generate random sharing of given value.
    fn share(&mut self, value: F::Element) -> Vec<RawShare> {
        let field = self.field;
        let mut value_rest = value.clone();
        let mut mac_rest = value * self.auth_key.clone();
        let mut shares: Vec<_> = (1..self.num_parties)
            .map(|_| {
                let share = field.random(self.rng);
                let mac = field.random(self.rng);
                value_rest = value_rest.clone() - share.clone();
                mac_rest = mac_rest.clone() - mac.clone();
                RawShare {
                    value: field.serialize(&share),
                    mac: field.serialize(&mac),
                }
            })
            .collect();
        shares.push(RawShare {
            value: field.serialize(&value_rest),
            mac: field.serialize(&mac_rest),
        });
        shares
    }

    /// Generate random sharing of random value.
    fn share_random(&mut self) -> (Vec<RawShare>, F::Element) {
        let value = self.field.random(self.rng);
        (self.share(value.clone()), value)
    }

    /// Generate beaver triples and add them to precomputed data table.
    fn fill_beaver_triples(&mut self, data: &mut [PrecomputedSpdzData], count: usize) {
        for _ in 0..count {
            let (shares_a, a) = self.share_random();
            let (shares_b, b) = self.share_random();
            let shares_ab = self.share(a * b);
            let shares = shares_a.into_iter().zip(shares_b).zip(shares_ab);
            for (party_data, ((a, b), ab)) in data.iter_mut().zip(shares) {
                party_data.beaver_triples.push([a, b, ab]);
            }
        }
    }

    /// Generate random bits and add them to precomputed data table.
    fn fill_random_bits(&mut self, data: &mut [PrecomputedSpdzData], count: usize) {
        for _ in 0..count {
            let bit = if self.rng.gen::<bool>() {
                self.field.one()
            } else {
                self.field.zero()
            };
            for (party_data, share) in data.iter_mut().zip(self.share(bit)) {
                party_data.random_bits.push(share);
            }
        }
    }

    /// Generate input masks toward given party and add them to precomputed data table.
    fn fill_input_masks_for(
        &mut self,
        data: &mut [PrecomputedSpdzData],
        party_id: PartyId,
        count: usize,
    ) {
        for _ in 0..count {
            let (shares, plain) = self.share_random();
            for (party_data, share) in data.iter_mut().zip(shares) {
                party_data.input_masks[party_id - 1].push(share);
            }
            data[party_id - 1]
                .input_masks_plain
                .push(self.field.serialize(&plain));
        }
    }
}

/// Supplier for SPDZ protocol that serves precomputed data.
pub struct PrecomputedSpdzSupplier<F: FieldDefinition> {
    field: F,
    data: PrecomputedSpdzData,
    key_share: F::Element,
}

impl<F: FieldDefinition> PrecomputedSpdzSupplier<F> {
    /// Create new supplier given precomputed data for `field`.
    pub fn new(field: F, data: PrecomputedSpdzData) -> Result<Self, Error> {
        if data.modulus != field.modulus().to_string() {
            return Err(Error::Config(format!(
                "precomputed data is for modulus {}, not {}",
                data.modulus,
                field.modulus()
            )));
        }
        if data.input_masks.len() != data.num_parties {
            return Err(Error::InvalidLength {
                expected: data.num_parties,
                actual: data.input_masks.len(),
            });
        }
        Ok(Self {
            key_share: field.deserialize(&data.key_share)?,
            field,
            data,
        })
    }

    /// Create new supplier from file with precomputed data.
    pub fn from_file(field: F, path: impl AsRef<Path>) -> Result<Self, Error> {
        Self::new(field, PrecomputedSpdzData::load_file(path)?)
    }

    pub fn party_id(&self) -> PartyId {
        self.data.party_id
    }

    fn decode(&self, raw: &RawShare) -> Result<SpdzShare<F::Element>, Error> {
        Ok(SpdzShare {
            value: self.field.deserialize(&raw.value)?,
            mac: self.field.deserialize(&raw.mac)?,
        })
    }
}

impl<F: FieldDefinition> SpdzDataSupplier<F> for PrecomputedSpdzSupplier<F> {
    fn next_triple(&mut self) -> Result<SpdzTriple<F::Element>, Error> {
        let [a, b, c] = self
            .data
            .beaver_triples
            .pop()
            .ok_or(Error::PreprocessingExhausted("beaver triples"))?;
        Ok(SpdzTriple {
            a: self.decode(&a)?,
            b: self.decode(&b)?,
            c: self.decode(&c)?,
        })
    }

    fn next_input_mask(&mut self, toward: PartyId) -> Result<SpdzInputMask<F::Element>, Error> {
        let masks = toward
            .checked_sub(1)
            .and_then(|index| self.data.input_masks.get_mut(index))
            .ok_or_else(|| Error::Malformed(format!("no input masks toward party {toward}")))?;
        let raw = masks
            .pop()
            .ok_or(Error::PreprocessingExhausted("input masks"))?;
        let real_value = if toward == self.data.party_id {
            let plain = self
                .data
                .input_masks_plain
                .pop()
                .ok_or(Error::PreprocessingExhausted("input masks"))?;
            Some(self.field.deserialize(&plain)?)
        } else {
            None
        };
        Ok(SpdzInputMask {
            mask: self.decode(&raw)?,
            real_value,
        })
    }

    fn next_bit_share(&mut self) -> Result<SpdzShare<F::Element>, Error> {
        let raw = self
            .data
            .random_bits
            .pop()
            .ok_or(Error::PreprocessingExhausted("random bits"))?;
        self.decode(&raw)
    }

    fn secret_shared_key(&self) -> F::Element {
        self.key_share.clone()
    }
}
