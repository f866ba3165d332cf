use digest::Digest;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use sha3::Sha3_256;
use tracing::warn;

use super::{OpenedValue, SpdzResourcePool};
use crate::{
    bitvec::BitVector, executor::EvaluationStatus, fields::FieldDefinition,
    network::RoundNetwork, Error, PartyId,
};

/// Bits of each party's contribution to the joint challenge seed.
const SEED_BITS: usize = 256;

/// Length of the random salt of a commitment.
const SALT_BYTES: usize = 32;

/// This party's share of `Σ r_i·mac_i − (Σ r_i·v_i)·k`.
///
/// Shares of all parties sum up to zero iff the opened values are consistent
/// with their MACs (up to the probability of an unlucky challenge).
pub fn mac_check_share<F: FieldDefinition>(
    field: &F,
    opened: &[OpenedValue<F::Element>],
    challenges: &[F::Element],
    key_share: &F::Element,
) -> Result<F::Element, Error> {
    if opened.len() != challenges.len() {
        return Err(Error::SizeMismatch {
            left: opened.len(),
            right: challenges.len(),
        });
    }
    let (value_sum, mac_sum) = opened.iter().zip(challenges).fold(
        (field.zero(), field.zero()),
        |(values, macs), (opened, r)| {
            (
                values + r.clone() * opened.value.clone(),
                macs + r.clone() * opened.mac_share.clone(),
            )
        },
    );
    Ok(mac_sum - value_sum * key_share.clone())
}

/// Expand a joint seed into one challenge per opened value.
fn challenges<F: FieldDefinition>(
    field: &F,
    seed: &BitVector,
    count: usize,
) -> Vec<F::Element> {
    let mut key = [0u8; SEED_BITS / 8];
    key.copy_from_slice(seed.as_bytes());
    let mut rng = ChaCha20Rng::from_seed(key);
    (0..count).map(|_| field.random(&mut rng)).collect()
}

/// Hash commitment `H(salt || payload)`.
fn commit(salt: &[u8], payload: &[u8]) -> Vec<u8> {
    Sha3_256::new()
        .chain_update(salt)
        .chain_update(payload)
        .finalize()
        .to_vec()
}

/// Salted payload revealed to open a commitment.
struct Opening {
    salt: Vec<u8>,
    payload: Vec<u8>,
}

impl Opening {
    fn random(payload: Vec<u8>, rng: &mut dyn RngCore) -> Self {
        let mut salt = vec![0u8; SALT_BYTES];
        rng.fill_bytes(&mut salt);
        Self { salt, payload }
    }

    fn commitment(&self) -> Vec<u8> {
        commit(&self.salt, &self.payload)
    }

    fn to_bytes(&self) -> Vec<u8> {
        [self.salt.as_slice(), self.payload.as_slice()].concat()
    }

    /// Parse opening of `party` and check it against its commitment.
    fn verify(bytes: &[u8], commitment: &[u8], party: PartyId) -> Result<Vec<u8>, Error> {
        if bytes.len() < SALT_BYTES {
            return Err(Error::Malformed(format!(
                "opening of party {party} is too short"
            )));
        }
        let (salt, payload) = bytes.split_at(SALT_BYTES);
        if commit(salt, payload) != commitment {
            warn!(party, "commitment mismatch");
            return Err(Error::CommitmentMismatch { party });
        }
        Ok(payload.to_vec())
    }
}

#[derive(Default)]
enum MacCheckState {
    #[default]
    Start,
    SeedCommitted(Opening),
    SeedRevealed(Vec<Vec<u8>>),
    GammaCommitted(Opening),
    GammaRevealed(Vec<Vec<u8>>),
}

/// Interactive check that all given opened values are consistent with their MACs.
///
/// Round 0 commits to a random seed, round 1 reveals it. Round 2 combines all
/// seeds into the challenges and commits to this party's check value, which
/// is revealed in round 3 and verified in round 4.
pub struct MacCheckProtocol<F: FieldDefinition> {
    opened: Vec<OpenedValue<F::Element>>,
    state: MacCheckState,
}

impl<F: FieldDefinition> MacCheckProtocol<F> {
    pub fn new(opened: Vec<OpenedValue<F::Element>>) -> Self {
        Self {
            opened,
            state: MacCheckState::Start,
        }
    }

    /// Number of opened values being checked.
    pub fn len(&self) -> usize {
        self.opened.len()
    }

    pub fn is_empty(&self) -> bool {
        self.opened.is_empty()
    }

    pub(crate) async fn evaluate(
        &mut self,
        round: usize,
        pool: &mut SpdzResourcePool<F>,
        network: &mut RoundNetwork,
    ) -> Result<EvaluationStatus, Error> {
        let state = std::mem::take(&mut self.state);
        self.state = match (round, state) {
            (0, MacCheckState::Start) => {
                let seed = BitVector::random(SEED_BITS, pool.rng())?;
                let opening = Opening::random(seed.into_bytes(), pool.rng());
                network.send_to_all(opening.commitment());
                MacCheckState::SeedCommitted(opening)
            }
            (1, MacCheckState::SeedCommitted(opening)) => {
                let commitments = network.receive_from_all().await?;
                network.send_to_all(opening.to_bytes());
                MacCheckState::SeedRevealed(commitments)
            }
            (2, MacCheckState::SeedRevealed(commitments)) => {
                let mut joint_seed = BitVector::new(SEED_BITS)?;
                for (party, commitment) in (1..).zip(&commitments) {
                    let bytes = network.receive(party).await?;
                    let seed = Opening::verify(&bytes, commitment, party)?;
                    joint_seed.xor(&BitVector::from_bytes(seed, SEED_BITS)?)?;
                }

                let field = pool.field().clone();
                let challenges = challenges(&field, &joint_seed, self.opened.len());
                let gamma =
                    mac_check_share(&field, &self.opened, &challenges, pool.key_share())?;
                let opening = Opening::random(field.serialize(&gamma), pool.rng());
                network.send_to_all(opening.commitment());
                MacCheckState::GammaCommitted(opening)
            }
            (3, MacCheckState::GammaCommitted(opening)) => {
                let commitments = network.receive_from_all().await?;
                network.send_to_all(opening.to_bytes());
                MacCheckState::GammaRevealed(commitments)
            }
            (4, MacCheckState::GammaRevealed(commitments)) => {
                let field = pool.field();
                let mut sum = field.zero();
                for (party, commitment) in (1..).zip(&commitments) {
                    let bytes = network.receive(party).await?;
                    let gamma = Opening::verify(&bytes, commitment, party)?;
                    sum = sum + field.deserialize(&gamma)?;
                }
                if !field.is_zero(&sum) {
                    warn!(
                        party_id = pool.party_id(),
                        openings = self.opened.len(),
                        "MAC check failed"
                    );
                    return Err(Error::MacCheckFailed {
                        openings: self.opened.len(),
                    });
                }
                return Ok(EvaluationStatus::Done);
            }
            _ => return Err(Error::AlreadyCompleted),
        };
        Ok(EvaluationStatus::Pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        fields::{BigIntElement, BigIntField, Modulus},
        spdz::testing::share_with_key,
    };

    type Element = BigIntElement;

    fn field() -> BigIntField {
        BigIntField::new(Modulus::mersenne(61).unwrap())
    }

    /// Opened values of `n` parties together with their key shares.
    fn openings(
        values: &[u64],
        n: usize,
    ) -> (Vec<Vec<OpenedValue<Element>>>, Vec<Element>) {
        let field = field();
        let mut per_party = vec![Vec::new(); n];
        let mut key_shares = Vec::new();
        for &value in values {
            let (_, keys, shares) = share_with_key(&field, n, field.create(value), 17);
            key_shares = keys;
            for (party, share) in per_party.iter_mut().zip(shares) {
                party.push(OpenedValue {
                    value: field.create(value),
                    mac_share: share.mac().clone(),
                });
            }
        }
        (per_party, key_shares)
    }

    fn gamma_sum(
        opened: &[Vec<OpenedValue<Element>>],
        keys: &[Element],
        challenges: &[Element],
    ) -> Element {
        let field = field();
        opened
            .iter()
            .zip(keys)
            .map(|(opened, key)| mac_check_share(&field, opened, challenges, key).unwrap())
            .fold(field.zero(), |acc, x| acc + x)
    }

    #[test]
    fn test_honest_openings_pass() {
        let field = field();
        let (opened, keys) = openings(&[1, 2, 3, 1 << 40], 3);
        let mut seed = BitVector::new(SEED_BITS).unwrap();
        seed.set(5, true).unwrap();
        let challenges = challenges(&field, &seed, 4);
        assert!(field.is_zero(&gamma_sum(&opened, &keys, &challenges)));
    }

    #[test]
    fn test_tampering_is_detected() {
        let field = field();
        let (mut opened, keys) = openings(&[10, 20, 30], 2);
        let challenges = challenges(&field, &BitVector::new(SEED_BITS).unwrap(), 3);

        let mut tampered = opened.clone();
        for party in &mut tampered {
            party[1].value = field.create(21);
        }
        assert!(!field.is_zero(&gamma_sum(&tampered, &keys, &challenges)));

        opened[0][2].mac_share = opened[0][2].mac_share.clone() + field.one();
        assert!(!field.is_zero(&gamma_sum(&opened, &keys, &challenges)));
    }

    #[test]
    fn test_length_mismatch() {
        let field = field();
        let (opened, keys) = openings(&[1, 2], 2);
        assert!(matches!(
            mac_check_share(&field, &opened[0], &[field.one()], &keys[0]),
            Err(Error::SizeMismatch { left: 2, right: 1 })
        ));
    }

    #[test]
    fn test_commitment_opening() {
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        let opening = Opening::random(vec![1, 2, 3], &mut rng);
        let commitment = opening.commitment();
        assert_eq!(
            Opening::verify(&opening.to_bytes(), &commitment, 2).unwrap(),
            vec![1, 2, 3]
        );

        let mut forged = opening.to_bytes();
        *forged.last_mut().unwrap() ^= 1;
        assert!(matches!(
            Opening::verify(&forged, &commitment, 2),
            Err(Error::CommitmentMismatch { party: 2 })
        ));
        assert!(matches!(
            Opening::verify(&[0; 4], &commitment, 3),
            Err(Error::Malformed(_))
        ));
    }
}
