use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use super::{SpdzDataSupplier, SpdzInputMask, SpdzShare, SpdzTriple};
use crate::{fields::FieldDefinition, Error, PartyId};

/// Insecure supplier for SPDZ protocol that can be used for tests.
///
/// Every party derives the full preprocessed values from the shared seed and
/// keeps only its own share, so no dealer process is needed.
pub struct DummyDataSupplier<F: FieldDefinition> {
    auth_key: FakeAuthKey<F>,
    beaver_triple_gen: FakeShareGenerator<F>,
    bits_gen: FakeShareGenerator<F>,
    random_elements_gen: FakeShareGenerator<F>,
    input_masks_gen: Vec<FakeShareGenerator<F>>,
}

impl<F: FieldDefinition> DummyDataSupplier<F> {
    /// Create new instance. All parties must use the same `seed`.
    pub fn new(field: F, num_parties: usize, party_id: PartyId, seed: u64) -> Result<Self, Error> {
        if party_id == 0 || party_id > num_parties {
            return Err(Error::Config(format!(
                "party {party_id} is not part of a computation of {num_parties} parties"
            )));
        }
        let mut rng = SmallRng::seed_from_u64(seed);
        let auth_key = FakeAuthKey::random(field, &mut rng, party_id, num_parties);
        Ok(Self {
            beaver_triple_gen: FakeShareGenerator::new(auth_key.clone(), rng.gen()),
            bits_gen: FakeShareGenerator::new(auth_key.clone(), rng.gen()),
            random_elements_gen: FakeShareGenerator::new(auth_key.clone(), rng.gen()),
            input_masks_gen: (0..num_parties)
                .map(|_| FakeShareGenerator::new(auth_key.clone(), rng.gen()))
                .collect(),
            auth_key,
        })
    }

    /// The MAC key in plain. Known to every party, which makes this supplier insecure.
    pub fn plain_auth_key(&self) -> &F::Element {
        &self.auth_key.plain_value
    }
}

impl<F: FieldDefinition> SpdzDataSupplier<F> for DummyDataSupplier<F> {
    fn next_triple(&mut self) -> Result<SpdzTriple<F::Element>, Error> {
        let (a, a_plain) = self.beaver_triple_gen.gen_random_authenticated_share();
        let (b, b_plain) = self.beaver_triple_gen.gen_random_authenticated_share();
        let c = self
            .beaver_triple_gen
            .gen_authenticated_share(a_plain * b_plain);
        Ok(SpdzTriple { a, b, c })
    }

    fn next_input_mask(&mut self, toward: PartyId) -> Result<SpdzInputMask<F::Element>, Error> {
        let generator = toward
            .checked_sub(1)
            .and_then(|index| self.input_masks_gen.get_mut(index))
            .ok_or_else(|| Error::Malformed(format!("no input masks toward party {toward}")))?;
        let (mask, plain) = generator.gen_random_authenticated_share();
        Ok(SpdzInputMask {
            mask,
            real_value: (toward == self.auth_key.party_id).then_some(plain),
        })
    }

    fn next_bit_share(&mut self) -> Result<SpdzShare<F::Element>, Error> {
        let field = &self.bits_gen.auth_key.field;
        let value = if self.bits_gen.rng.gen() {
            field.one()
        } else {
            field.zero()
        };
        Ok(self.bits_gen.gen_authenticated_share(value))
    }

    fn next_random_element_share(&mut self) -> Result<SpdzShare<F::Element>, Error> {
        Ok(self.random_elements_gen.gen_random_authenticated_share().0)
    }

    fn secret_shared_key(&self) -> F::Element {
        self.auth_key.share_value.clone()
    }
}

/// Authentication key in plain and its share.
#[derive(Clone)]
struct FakeAuthKey<F: FieldDefinition> {
    field: F,
    num_parties: usize,
    party_id: PartyId,
    share_value: F::Element,
    plain_value: F::Element,
}

impl<F: FieldDefinition> FakeAuthKey<F> {
    /// Generate fake authentication key and its share.
    fn random(field: F, rng: &mut SmallRng, party_id: PartyId, num_parties: usize) -> Self {
        let plain_value = field.random(rng);
        let share_value = gen_raw_share(&field, rng, party_id, num_parties, plain_value.clone());
        Self {
            field,
            num_parties,
            party_id,
            share_value,
            plain_value,
        }
    }
}

/// Insecure generator of SPDZ-shared values.
struct FakeShareGenerator<F: FieldDefinition> {
    auth_key: FakeAuthKey<F>,
    rng: SmallRng,
}

impl<F: FieldDefinition> FakeShareGenerator<F> {
    /// Create new generator.
    fn new(auth_key: FakeAuthKey<F>, seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
            auth_key,
        }
    }

    /// Generate local unauthenticated share of specified value.
    fn gen_raw_share(&mut self, value: F::Element) -> F::Element {
        gen_raw_share(
            &self.auth_key.field,
            &mut self.rng,
            self.auth_key.party_id,
            self.auth_key.num_parties,
            value,
        )
    }

    /// Generate local authenticated share of specified value.
    fn gen_authenticated_share(&mut self, value: F::Element) -> SpdzShare<F::Element> {
        let mac = value.clone() * self.auth_key.plain_value.clone();
        SpdzShare {
            value: self.gen_raw_share(value),
            mac: self.gen_raw_share(mac),
        }
    }

    /// Generate random value and its local authenticated share.
    fn gen_random_authenticated_share(&mut self) -> (SpdzShare<F::Element>, F::Element) {
        let value = self.auth_key.field.random(&mut self.rng);
        (self.gen_authenticated_share(value.clone()), value)
    }
}

/// Generate local unauthenticated share of specified value.
///
/// Shares of all parties form an arithmetic progression, except for party 1
/// whose share is shifted so that the shares sum up to `value`.
fn gen_raw_share<F: FieldDefinition>(
    field: &F,
    rng: &mut SmallRng,
    party_id: PartyId,
    num_parties: usize,
    value: F::Element,
) -> F::Element {
    let start = field.random(rng);
    let step = field.random(rng);
    let share = arithmetic_progression(field, start.clone(), step.clone(), party_id as u64 - 1);
    let sum = arithmetic_progression_sum(field, start, step, num_parties as u64);
    if party_id == 1 {
        share + value - sum
    } else {
        share
    }
}

/// Compute n-th term of linear progression.
fn arithmetic_progression<F: FieldDefinition>(
    field: &F,
    start: F::Element,
    step: F::Element,
    n: u64,
) -> F::Element {
    start + step * field.create(n)
}

/// Compute sum of terms 0..n-1 of linear progression.
fn arithmetic_progression_sum<F: FieldDefinition>(
    field: &F,
    start: F::Element,
    step: F::Element,
    n: u64,
) -> F::Element {
    let sum = if n % 2 == 0 {
        field.create(n / 2) * field.create(n - 1)
    } else {
        field.create(n) * field.create((n - 1) / 2)
    };
    start * field.create(n) + step * sum
}
