//! Lazily expanded tree of native protocols.
//!
//! A producer hands out native protocols batch by batch. Sequential nodes
//! only pull from their first unfinished child, so a child's protocols are
//! evaluated before anything after it is pulled. Parallel nodes pull from
//! all children. Chains hold build closures that are expanded only once all
//! earlier steps of the chain were evaluated.

use std::{cell::RefCell, collections::VecDeque, rc::Rc};

use crate::{
    builder::{BuilderContext, ProtocolBuilder},
    fields::FieldDefinition,
    spdz::SpdzNativeProtocol,
    Error,
};

/// Native protocols evaluated together in one batch.
pub struct ProtocolCollection<F: FieldDefinition> {
    protocols: Vec<SpdzNativeProtocol<F>>,
    capacity: usize,
}

impl<F: FieldDefinition> ProtocolCollection<F> {
    pub fn new(capacity: usize) -> Self {
        Self {
            protocols: Vec::new(),
            capacity,
        }
    }

    pub fn push(&mut self, protocol: SpdzNativeProtocol<F>) {
        self.protocols.push(protocol);
    }

    pub fn is_full(&self) -> bool {
        self.protocols.len() >= self.capacity
    }

    pub fn len(&self) -> usize {
        self.protocols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.protocols.is_empty()
    }

    /// Whether any protocol of the batch reveals a value to the application.
    pub fn has_output(&self) -> bool {
        self.protocols.iter().any(SpdzNativeProtocol::is_output)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut SpdzNativeProtocol<F>> {
        self.protocols.iter_mut()
    }
}

pub(crate) type BuildFn<F> = Box<dyn FnOnce(&mut ProtocolBuilder<F>) -> Result<(), Error>>;

pub(crate) struct ChainStep<F: FieldDefinition> {
    pub(crate) parallel: bool,
    pub(crate) build: BuildFn<F>,
}

/// Steps of a chain that were not expanded yet.
pub(crate) struct ChainSteps<F: FieldDefinition> {
    pending: VecDeque<ChainStep<F>>,
    /// Set once the chain ran out of steps. Nothing may be appended afterwards.
    closed: bool,
    context: Rc<BuilderContext<F>>,
}

impl<F: FieldDefinition> ChainSteps<F> {
    pub(crate) fn new(context: Rc<BuilderContext<F>>) -> Self {
        Self {
            pending: VecDeque::new(),
            closed: false,
            context,
        }
    }

    /// Queue `step`. A step appended to a closed chain is dropped and the
    /// misuse is reported by the next chain that expands a step.
    pub(crate) fn push(&mut self, step: ChainStep<F>) {
        if self.closed {
            self.context.report_closed_append();
            return;
        }
        self.pending.push_back(step);
    }
}

/// Sequence of build steps, each expanded into a sub-producer when reached.
pub struct ChainProducer<F: FieldDefinition> {
    steps: Rc<RefCell<ChainSteps<F>>>,
    current: Option<Box<Producer<F>>>,
    context: Rc<BuilderContext<F>>,
}

impl<F: FieldDefinition> ChainProducer<F> {
    pub(crate) fn new(steps: Rc<RefCell<ChainSteps<F>>>, context: Rc<BuilderContext<F>>) -> Self {
        Self {
            steps,
            current: None,
            context,
        }
    }

    fn pull(
        &mut self,
        batch: &mut ProtocolCollection<F>,
        max_depth: usize,
        depth: usize,
    ) -> Result<bool, Error> {
        loop {
            if let Some(current) = self.current.as_mut() {
                let before = batch.len();
                if current.pull(batch, max_depth, depth + 1)? {
                    return Ok(true);
                }
                self.current = None;
                if batch.len() > before {
                    // The next step may read what was just pulled.
                    return Ok(true);
                }
            }

            let next = self.steps.borrow_mut().pending.pop_front();
            let Some(step) = next else {
                self.steps.borrow_mut().closed = true;
                return Ok(false);
            };
            let mut builder = ProtocolBuilder::with_context(self.context.clone(), step.parallel);
            (step.build)(&mut builder)?;
            if self.context.take_closed_append() {
                return Err(Error::ChainClosed);
            }
            self.current = Some(Box::new(builder.into_producer()));
        }
    }
}

/// Node of the producer tree.
pub enum Producer<F: FieldDefinition> {
    Native(Option<SpdzNativeProtocol<F>>),
    Sequential(VecDeque<Producer<F>>),
    Parallel(Vec<Producer<F>>),
    Chain(ChainProducer<F>),
}

impl<F: FieldDefinition> Producer<F> {
    /// Move protocols that are ready for evaluation into `batch`.
    ///
    /// Returns whether the producer may have more protocols. A producer that
    /// returns `true` while `batch` is not full has added at least one protocol.
    pub fn pull(
        &mut self,
        batch: &mut ProtocolCollection<F>,
        max_depth: usize,
        depth: usize,
    ) -> Result<bool, Error> {
        if depth > max_depth {
            return Err(Error::NestingTooDeep { depth: max_depth });
        }
        if batch.is_full() {
            return Ok(!self.is_exhausted());
        }

        match self {
            Producer::Native(protocol) => {
                if let Some(protocol) = protocol.take() {
                    batch.push(protocol);
                }
                Ok(false)
            }
            Producer::Sequential(children) => {
                while let Some(head) = children.front_mut() {
                    let before = batch.len();
                    let more = head.pull(batch, max_depth, depth + 1)?;
                    if !more {
                        children.pop_front();
                    }
                    if more || batch.len() > before {
                        return Ok(!children.is_empty());
                    }
                }
                Ok(false)
            }
            Producer::Parallel(children) => {
                let mut remaining = Vec::with_capacity(children.len());
                for mut child in children.drain(..) {
                    if batch.is_full() || child.pull(batch, max_depth, depth + 1)? {
                        remaining.push(child);
                    }
                }
                *children = remaining;
                Ok(!children.is_empty())
            }
            Producer::Chain(chain) => chain.pull(batch, max_depth, depth),
        }
    }

    fn is_exhausted(&self) -> bool {
        match self {
            Producer::Native(protocol) => protocol.is_none(),
            Producer::Sequential(children) => children.is_empty(),
            Producer::Parallel(children) => children.is_empty(),
            Producer::Chain(chain) => {
                chain.current.is_none() && chain.steps.borrow().pending.is_empty()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        deferred::Deferred,
        fields::{BigIntField, Modulus},
        spdz::{OpenProtocol, Shared},
    };

    type Field = BigIntField;

    fn known(value: u64) -> (Producer<Field>, Shared<Field>) {
        let field = BigIntField::new(Modulus::mersenne(31).unwrap());
        let out = Deferred::pending();
        let protocol = SpdzNativeProtocol::Known {
            value: field.create(value),
            out: out.clone(),
        };
        (Producer::Native(Some(protocol)), out)
    }

    fn pull_all(producer: &mut Producer<Field>, capacity: usize) -> Vec<usize> {
        let mut sizes = Vec::new();
        loop {
            let mut batch = ProtocolCollection::new(capacity);
            let more = producer.pull(&mut batch, 16, 0).unwrap();
            if !batch.is_empty() {
                sizes.push(batch.len());
            }
            if !more {
                return sizes;
            }
        }
    }

    #[test]
    fn test_sequential_pulls_one_child_per_batch() {
        let mut producer = Producer::Sequential((0..3).map(|i| known(i).0).collect());
        assert_eq!(pull_all(&mut producer, 10), vec![1, 1, 1]);
    }

    #[test]
    fn test_parallel_respects_capacity() {
        let mut producer = Producer::Parallel((0..7).map(|i| known(i).0).collect());
        assert_eq!(pull_all(&mut producer, 3), vec![3, 3, 1]);
    }

    #[test]
    fn test_sequential_of_parallel() {
        let parallel = |n| Producer::Parallel((0..n).map(|i| known(i).0).collect());
        let mut producer = Producer::Sequential(VecDeque::from(vec![parallel(2), parallel(5)]));
        assert_eq!(pull_all(&mut producer, 4), vec![2, 4, 1]);
    }

    #[test]
    fn test_depth_limit() {
        let mut producer = Producer::Sequential(VecDeque::from(vec![Producer::Sequential(
            VecDeque::from(vec![known(1).0]),
        )]));
        let mut batch = ProtocolCollection::new(4);
        assert!(matches!(
            producer.pull(&mut batch, 1, 0),
            Err(Error::NestingTooDeep { depth: 1 })
        ));
    }

    #[test]
    fn test_output_detection() {
        let (mut producer, share) = known(3);
        let mut batch = ProtocolCollection::new(4);
        producer.pull(&mut batch, 4, 0).unwrap();
        assert!(!batch.has_output());
        batch.push(SpdzNativeProtocol::Open(OpenProtocol::new(
            share,
            Deferred::pending(),
        )));
        assert!(batch.has_output());
        assert!(!batch.is_full());
        assert_eq!(batch.len(), 2);
    }
}
