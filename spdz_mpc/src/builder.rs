//! Building computations out of native protocols.
//!
//! Application code never sees a value before the protocol producing it was
//! evaluated: results are [`Deferred`] handles, and code that needs the actual
//! value is written as a continuation that runs in a later step.

use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};

use crate::{
    deferred::Deferred,
    fields::FieldDefinition,
    producer::{ChainProducer, ChainStep, ChainSteps, Producer},
    spdz::{
        InputProtocol, MultProtocol, OpenProtocol, OpenToProtocol, Public, Shared,
        SpdzNativeProtocol,
    },
    PartyId,
};

/// Facts about the computation shared by all builders.
pub struct BuilderContext<F: FieldDefinition> {
    party_id: PartyId,
    num_parties: usize,
    field: F,
    closed_append: Cell<bool>,
}

impl<F: FieldDefinition> BuilderContext<F> {
    pub(crate) fn report_closed_append(&self) {
        self.closed_append.set(true);
    }

    pub(crate) fn take_closed_append(&self) -> bool {
        self.closed_append.replace(false)
    }
}

/// Collects protocols of one sequential or parallel step.
pub struct ProtocolBuilder<F: FieldDefinition> {
    context: Rc<BuilderContext<F>>,
    parallel: bool,
    children: Vec<Producer<F>>,
}

impl<F: FieldDefinition> ProtocolBuilder<F> {
    /// Root builder. Its children are evaluated sequentially.
    pub fn new(party_id: PartyId, num_parties: usize, field: F) -> Self {
        let context = BuilderContext {
            party_id,
            num_parties,
            field,
            closed_append: Cell::new(false),
        };
        Self::with_context(Rc::new(context), false)
    }

    pub(crate) fn with_context(context: Rc<BuilderContext<F>>, parallel: bool) -> Self {
        Self {
            context,
            parallel,
            children: Vec::new(),
        }
    }

    pub fn party_id(&self) -> PartyId {
        self.context.party_id
    }

    pub fn num_parties(&self) -> usize {
        self.context.num_parties
    }

    pub fn field(&self) -> &F {
        &self.context.field
    }

    /// Whether protocols appended to this builder may run in the same batch.
    pub fn is_parallel(&self) -> bool {
        self.parallel
    }

    /// Arithmetic on secret-shared values.
    pub fn numeric(&mut self) -> Numeric<'_, F> {
        Numeric { builder: self }
    }

    /// Add a step whose protocols are evaluated one after another.
    pub fn seq<T: 'static>(
        &mut self,
        build: impl FnOnce(&mut ProtocolBuilder<F>) -> Deferred<T> + 'static,
    ) -> BuildStep<F, T> {
        self.chain(false, build)
    }

    /// Add a step whose protocols are independent of each other.
    pub fn par<T: 'static>(
        &mut self,
        build: impl FnOnce(&mut ProtocolBuilder<F>) -> Deferred<T> + 'static,
    ) -> BuildStep<F, T> {
        self.chain(true, build)
    }

    pub(crate) fn into_producer(self) -> Producer<F> {
        if self.parallel {
            Producer::Parallel(self.children)
        } else {
            Producer::Sequential(self.children.into())
        }
    }

    fn chain<T: 'static>(
        &mut self,
        parallel: bool,
        build: impl FnOnce(&mut ProtocolBuilder<F>) -> Deferred<T> + 'static,
    ) -> BuildStep<F, T> {
        let steps = Rc::new(RefCell::new(ChainSteps::new(self.context.clone())));
        self.children.push(Producer::Chain(ChainProducer::new(
            steps.clone(),
            self.context.clone(),
        )));
        let start = BuildStep {
            steps,
            output: Deferred::ready(()),
        };
        start.then(parallel, move |builder, _| build(builder))
    }

    fn append<T>(
        &mut self,
        protocol: impl FnOnce(Deferred<T>) -> SpdzNativeProtocol<F>,
    ) -> Deferred<T> {
        let out = Deferred::pending();
        self.children.push(Producer::Native(Some(protocol(out.clone()))));
        out
    }
}

/// Last step of a chain, used to append continuations.
pub struct BuildStep<F: FieldDefinition, T> {
    steps: Rc<RefCell<ChainSteps<F>>>,
    output: Deferred<T>,
}

impl<F: FieldDefinition, T: 'static> BuildStep<F, T> {
    /// Continue with a sequential step once this step was evaluated.
    pub fn seq<U: 'static>(
        self,
        build: impl FnOnce(&mut ProtocolBuilder<F>, &T) -> Deferred<U> + 'static,
    ) -> BuildStep<F, U> {
        self.then(false, build)
    }

    /// Continue with a parallel step once this step was evaluated.
    pub fn par<U: 'static>(
        self,
        build: impl FnOnce(&mut ProtocolBuilder<F>, &T) -> Deferred<U> + 'static,
    ) -> BuildStep<F, U> {
        self.then(true, build)
    }

    /// Result of this step.
    pub fn output(&self) -> Deferred<T> {
        self.output.clone()
    }

    fn then<U: 'static>(
        self,
        parallel: bool,
        build: impl FnOnce(&mut ProtocolBuilder<F>, &T) -> Deferred<U> + 'static,
    ) -> BuildStep<F, U> {
        let previous = self.output;
        let output = Deferred::pending();
        let result = output.clone();
        self.steps.borrow_mut().push(ChainStep {
            parallel,
            build: Box::new(move |builder: &mut ProtocolBuilder<F>| {
                let value = previous.value()?;
                result.forward(build(builder, value))
            }),
        });
        BuildStep {
            steps: self.steps,
            output,
        }
    }
}

/// Operations on field elements shared with SPDZ.
pub struct Numeric<'a, F: FieldDefinition> {
    builder: &'a mut ProtocolBuilder<F>,
}

impl<'a, F: FieldDefinition> Numeric<'a, F> {
    /// Sharing of a public constant.
    pub fn known(&mut self, value: F::Element) -> Shared<F> {
        self.builder.append(|out| SpdzNativeProtocol::Known { value, out })
    }

    /// Share a value provided by `party`. Other parties pass `None`.
    pub fn input(&mut self, value: Option<F::Element>, party: PartyId) -> Shared<F> {
        self.builder
            .append(|out| SpdzNativeProtocol::Input(InputProtocol::new(value, party, out)))
    }

    pub fn add(&mut self, left: &Shared<F>, right: &Shared<F>) -> Shared<F> {
        let (left, right) = (left.clone(), right.clone());
        self.builder.append(|out| SpdzNativeProtocol::Add { left, right, out })
    }

    pub fn add_public(&mut self, input: &Shared<F>, constant: F::Element) -> Shared<F> {
        let input = input.clone();
        self.builder.append(|out| SpdzNativeProtocol::AddPublic {
            input,
            constant,
            out,
        })
    }

    pub fn sub(&mut self, left: &Shared<F>, right: &Shared<F>) -> Shared<F> {
        let (left, right) = (left.clone(), right.clone());
        self.builder.append(|out| SpdzNativeProtocol::Sub { left, right, out })
    }

    /// `input - constant`
    pub fn sub_public(&mut self, input: &Shared<F>, constant: F::Element) -> Shared<F> {
        let input = input.clone();
        self.builder.append(|out| SpdzNativeProtocol::SubPublic {
            input,
            constant,
            out,
        })
    }

    /// `constant - input`
    pub fn sub_from_public(&mut self, constant: F::Element, input: &Shared<F>) -> Shared<F> {
        let input = input.clone();
        self.builder.append(|out| SpdzNativeProtocol::SubFromPublic {
            constant,
            input,
            out,
        })
    }

    pub fn negate(&mut self, input: &Shared<F>) -> Shared<F> {
        let input = input.clone();
        self.builder.append(|out| SpdzNativeProtocol::Negate { input, out })
    }

    /// Multiplication of two secret values. Consumes a multiplication triple.
    pub fn mult(&mut self, left: &Shared<F>, right: &Shared<F>) -> Shared<F> {
        let (left, right) = (left.clone(), right.clone());
        self.builder
            .append(|out| SpdzNativeProtocol::Mult(MultProtocol::new(left, right, out)))
    }

    pub fn mult_public(&mut self, constant: F::Element, input: &Shared<F>) -> Shared<F> {
        let input = input.clone();
        self.builder.append(|out| SpdzNativeProtocol::MultPublic {
            input,
            constant,
            out,
        })
    }

    /// Sharing of a secret random bit.
    pub fn random_bit(&mut self) -> Shared<F> {
        self.builder.append(|out| SpdzNativeProtocol::RandomBit { out })
    }

    /// Sharing of a secret uniformly random element.
    pub fn random_element(&mut self) -> Shared<F> {
        self.builder.append(|out| SpdzNativeProtocol::RandomElement { out })
    }

    /// Reveal a secret value to all parties.
    pub fn open(&mut self, input: &Shared<F>) -> Public<F> {
        let input = input.clone();
        self.builder
            .append(|out| SpdzNativeProtocol::Open(OpenProtocol::new(input, out)))
    }

    /// Reveal a secret value to `party` only. Other parties get `None`.
    pub fn open_to(&mut self, input: &Shared<F>, party: PartyId) -> Deferred<Option<F::Element>> {
        let input = input.clone();
        self.builder
            .append(|out| SpdzNativeProtocol::OpenTo(OpenToProtocol::new(input, party, out)))
    }
}
