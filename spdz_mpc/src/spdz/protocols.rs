use itertools::Itertools;

use super::{MacCheckProtocol, SpdzResourcePool, SpdzShare, SpdzTriple};
use crate::{
    deferred::Deferred, executor::EvaluationStatus, fields::FieldDefinition,
    network::RoundNetwork, Error, PartyId,
};

/// Handle to a secret-shared value.
pub type Shared<F> = Deferred<SpdzShare<<F as FieldDefinition>::Element>>;

/// Handle to a public value.
pub type Public<F> = Deferred<<F as FieldDefinition>::Element>;

/// Native protocols of the SPDZ suite.
///
/// Linear operations finish in the first round without communication.
/// `Mult`, `Input`, `Open` and `OpenTo` take two rounds, `MacCheck` five.
pub enum SpdzNativeProtocol<F: FieldDefinition> {
    Known {
        value: F::Element,
        out: Shared<F>,
    },
    Add {
        left: Shared<F>,
        right: Shared<F>,
        out: Shared<F>,
    },
    Sub {
        left: Shared<F>,
        right: Shared<F>,
        out: Shared<F>,
    },
    AddPublic {
        input: Shared<F>,
        constant: F::Element,
        out: Shared<F>,
    },
    SubPublic {
        input: Shared<F>,
        constant: F::Element,
        out: Shared<F>,
    },
    SubFromPublic {
        constant: F::Element,
        input: Shared<F>,
        out: Shared<F>,
    },
    MultPublic {
        input: Shared<F>,
        constant: F::Element,
        out: Shared<F>,
    },
    Negate {
        input: Shared<F>,
        out: Shared<F>,
    },
    Mult(MultProtocol<F>),
    Input(InputProtocol<F>),
    Open(OpenProtocol<F>),
    OpenTo(OpenToProtocol<F>),
    RandomBit {
        out: Shared<F>,
    },
    RandomElement {
        out: Shared<F>,
    },
    MacCheck(MacCheckProtocol<F>),
}

impl<F: FieldDefinition> SpdzNativeProtocol<F> {
    /// Whether the protocol reveals a value to the application.
    pub fn is_output(&self) -> bool {
        matches!(self, Self::Open(_) | Self::OpenTo(_))
    }

    /// Evaluate one round of the protocol.
    pub async fn evaluate(
        &mut self,
        round: usize,
        pool: &mut SpdzResourcePool<F>,
        network: &mut RoundNetwork,
    ) -> Result<EvaluationStatus, Error> {
        let (value, out) = match self {
            Self::Mult(protocol) => return protocol.evaluate(round, pool, network).await,
            Self::Input(protocol) => return protocol.evaluate(round, pool, network).await,
            Self::Open(protocol) => return protocol.evaluate(round, pool, network).await,
            Self::OpenTo(protocol) => return protocol.evaluate(round, pool, network).await,
            Self::MacCheck(protocol) => return protocol.evaluate(round, pool, network).await,
            Self::Known { value, out } => (pool.share_public(value.clone()), out),
            Self::Add { left, right, out } => (left.get()? + right.get()?, out),
            Self::Sub { left, right, out } => (left.get()? - right.get()?, out),
            Self::AddPublic {
                input,
                constant,
                out,
            } => (input.get()? + pool.share_public(constant.clone()), out),
            Self::SubPublic {
                input,
                constant,
                out,
            } => (input.get()? - pool.share_public(constant.clone()), out),
            Self::SubFromPublic {
                constant,
                input,
                out,
            } => (pool.share_public(constant.clone()) - input.get()?, out),
            Self::MultPublic {
                input,
                constant,
                out,
            } => (input.get()? * constant.clone(), out),
            Self::Negate { input, out } => (-input.get()?, out),
            Self::RandomBit { out } => (pool.supplier().next_bit_share()?, out),
            Self::RandomElement { out } => (pool.supplier().next_random_element_share()?, out),
        };
        out.complete(value)?;
        Ok(EvaluationStatus::Done)
    }
}

/// Sum of one field element received from every party.
async fn receive_sum<F: FieldDefinition>(
    field: &F,
    network: &mut RoundNetwork,
) -> Result<F::Element, Error> {
    let mut sum = field.zero();
    for from in 1..=network.num_parties() {
        sum = sum + field.deserialize(&network.receive(from).await?)?;
    }
    Ok(sum)
}

/// Multiplication of two secret values with a Beaver triple.
pub struct MultProtocol<F: FieldDefinition> {
    left: Shared<F>,
    right: Shared<F>,
    out: Shared<F>,
    state: Option<MultState<F::Element>>,
}

struct MultState<T> {
    triple: SpdzTriple<T>,
    d_mac: T,
    e_mac: T,
}

impl<F: FieldDefinition> MultProtocol<F> {
    pub(crate) fn new(left: Shared<F>, right: Shared<F>, out: Shared<F>) -> Self {
        Self {
            left,
            right,
            out,
            state: None,
        }
    }

    async fn evaluate(
        &mut self,
        round: usize,
        pool: &mut SpdzResourcePool<F>,
        network: &mut RoundNetwork,
    ) -> Result<EvaluationStatus, Error> {
        match round {
            0 => {
                let triple = pool.supplier().next_triple()?;
                let d = self.left.get()? - triple.a.clone();
                let e = self.right.get()? - triple.b.clone();
                let (d_value, d_mac) = d.into_parts();
                let (e_value, e_mac) = e.into_parts();
                network.send_to_all(pool.field().serialize_list(&[d_value, e_value]));
                self.state = Some(MultState {
                    triple,
                    d_mac,
                    e_mac,
                });
                Ok(EvaluationStatus::Pending)
            }
            1 => {
                let MultState {
                    triple,
                    d_mac,
                    e_mac,
                } = self.state.take().ok_or(Error::NotReady)?;
                let field = pool.field().clone();
                let (mut d, mut e) = (field.zero(), field.zero());
                for from in 1..=network.num_parties() {
                    let parts = field.deserialize_list(&network.receive(from).await?)?;
                    let actual = parts.len();
                    let (d_part, e_part) = parts
                        .into_iter()
                        .collect_tuple()
                        .ok_or(Error::InvalidLength {
                            expected: 2,
                            actual,
                        })?;
                    d = d + d_part;
                    e = e + e_part;
                }
                pool.log_opening(d.clone(), d_mac);
                pool.log_opening(e.clone(), e_mac);

                // (a + d)(b + e) = c + b·d + a·e + d·e
                let SpdzTriple { a, b, c } = triple;
                let product =
                    c + b * d.clone() + a * e.clone() + pool.share_public(d * e);
                self.out.complete(product)?;
                Ok(EvaluationStatus::Done)
            }
            _ => Err(Error::AlreadyCompleted),
        }
    }
}

/// Secret sharing of a value known to one party.
pub struct InputProtocol<F: FieldDefinition> {
    party: PartyId,
    value: Option<F::Element>,
    out: Shared<F>,
    mask: Option<SpdzShare<F::Element>>,
}

impl<F: FieldDefinition> InputProtocol<F> {
    pub(crate) fn new(value: Option<F::Element>, party: PartyId, out: Shared<F>) -> Self {
        Self {
            party,
            value,
            out,
            mask: None,
        }
    }

    async fn evaluate(
        &mut self,
        round: usize,
        pool: &mut SpdzResourcePool<F>,
        network: &mut RoundNetwork,
    ) -> Result<EvaluationStatus, Error> {
        match round {
            0 => {
                let mask = pool.supplier().next_input_mask(self.party)?;
                if pool.party_id() == self.party {
                    let real = mask.real_value.ok_or_else(|| {
                        Error::Malformed("input mask without plain value".into())
                    })?;
                    let value = self.value.take().ok_or_else(|| {
                        Error::Malformed(format!("party {} has no input value", self.party))
                    })?;
                    network.send_to_all(pool.field().serialize(&(value - real)));
                }
                self.mask = Some(mask.mask);
                Ok(EvaluationStatus::Pending)
            }
            1 => {
                let mask = self.mask.take().ok_or(Error::NotReady)?;
                let bytes = network.receive(self.party).await?;
                let delta = pool.field().deserialize(&bytes)?;
                self.out.complete(mask + pool.share_public(delta))?;
                Ok(EvaluationStatus::Done)
            }
            _ => Err(Error::AlreadyCompleted),
        }
    }
}

/// Opening of a secret value to all parties.
pub struct OpenProtocol<F: FieldDefinition> {
    input: Shared<F>,
    out: Public<F>,
    mac: Option<F::Element>,
}

impl<F: FieldDefinition> OpenProtocol<F> {
    pub(crate) fn new(input: Shared<F>, out: Public<F>) -> Self {
        Self {
            input,
            out,
            mac: None,
        }
    }

    async fn evaluate(
        &mut self,
        round: usize,
        pool: &mut SpdzResourcePool<F>,
        network: &mut RoundNetwork,
    ) -> Result<EvaluationStatus, Error> {
        match round {
            0 => {
                let (value, mac) = self.input.get()?.into_parts();
                network.send_to_all(pool.field().serialize(&value));
                self.mac = Some(mac);
                Ok(EvaluationStatus::Pending)
            }
            1 => {
                let mac = self.mac.take().ok_or(Error::NotReady)?;
                let opened = receive_sum(pool.field(), network).await?;
                pool.log_opening(opened.clone(), mac);
                self.out.complete(opened)?;
                Ok(EvaluationStatus::Done)
            }
            _ => Err(Error::AlreadyCompleted),
        }
    }
}

/// Opening of a secret value to a single party.
///
/// The value is masked with an input mask toward the receiver and the masked
/// value is opened publicly, so it is covered by MAC checks like any other
/// opening. Only the receiver can remove the mask.
pub struct OpenToProtocol<F: FieldDefinition> {
    input: Shared<F>,
    target: PartyId,
    out: Deferred<Option<F::Element>>,
    state: Option<(F::Element, Option<F::Element>)>,
}

impl<F: FieldDefinition> OpenToProtocol<F> {
    pub(crate) fn new(
        input: Shared<F>,
        target: PartyId,
        out: Deferred<Option<F::Element>>,
    ) -> Self {
        Self {
            input,
            target,
            out,
            state: None,
        }
    }

    async fn evaluate(
        &mut self,
        round: usize,
        pool: &mut SpdzResourcePool<F>,
        network: &mut RoundNetwork,
    ) -> Result<EvaluationStatus, Error> {
        match round {
            0 => {
                let mask = pool.supplier().next_input_mask(self.target)?;
                let (value, mac) = (self.input.get()? - mask.mask).into_parts();
                network.send_to_all(pool.field().serialize(&value));
                self.state = Some((mac, mask.real_value));
                Ok(EvaluationStatus::Pending)
            }
            1 => {
                let (mac, real_value) = self.state.take().ok_or(Error::NotReady)?;
                let masked = receive_sum(pool.field(), network).await?;
                pool.log_opening(masked.clone(), mac);
                let result = if pool.party_id() == self.target {
                    let real = real_value.ok_or_else(|| {
                        Error::Malformed("output mask without plain value".into())
                    })?;
                    Some(masked + real)
                } else {
                    None
                };
                self.out.complete(result)?;
                Ok(EvaluationStatus::Done)
            }
            _ => Err(Error::AlreadyCompleted),
        }
    }
}
