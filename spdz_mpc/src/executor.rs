//! Batched evaluation of protocol producers.
//!
//! The evaluator repeatedly pulls a batch of native protocols from the
//! producer tree and evaluates the whole batch round by round until every
//! protocol in it is done. Messages queued in a round are flushed at its end,
//! so all protocols of a batch share the same communication rounds.

use async_trait::async_trait;
use tracing::debug;

use crate::{
    config::EngineConfig,
    fields::FieldDefinition,
    network::RoundNetwork,
    producer::{Producer, ProtocolCollection},
    spdz::SpdzResourcePool,
    Error,
};

/// Outcome of evaluating one round of a protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EvaluationStatus {
    Done,
    /// Protocol needs at least one more round.
    Pending,
}

/// Counters of a finished evaluation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EvaluationStats {
    pub batches: usize,
    /// Communication rounds, including those of MAC checks.
    pub rounds: usize,
    pub gates: usize,
}

/// Everything a batch needs to be evaluated.
pub struct BatchContext<'a, F: FieldDefinition> {
    pub pool: &'a mut SpdzResourcePool<F>,
    pub network: &'a mut RoundNetwork,
    max_rounds: usize,
    stats: &'a mut EvaluationStats,
}

impl<'a, F: FieldDefinition> BatchContext<'a, F> {
    /// Evaluate all protocols of the batch to completion.
    pub async fn process_batch(&mut self, batch: &mut ProtocolCollection<F>) -> Result<(), Error> {
        let mut done = vec![false; batch.len()];
        let mut round = 0;
        loop {
            for (protocol, done) in batch.iter_mut().zip(done.iter_mut()) {
                if *done {
                    continue;
                }
                let status = protocol.evaluate(round, self.pool, self.network).await?;
                *done = status == EvaluationStatus::Done;
            }
            self.network.flush().await?;
            round += 1;
            self.stats.rounds += 1;

            if done.iter().all(|done| *done) {
                return Ok(());
            }
            if round >= self.max_rounds {
                return Err(Error::RoundLimitExceeded { rounds: round });
            }
        }
    }
}

/// Hooks called between batches, used to schedule work that spans the
/// whole computation.
#[async_trait(?Send)]
pub trait RoundSynchronization<F: FieldDefinition> {
    /// Called before `batch` is evaluated.
    async fn before_batch(
        &mut self,
        _batch: &ProtocolCollection<F>,
        _ctx: &mut BatchContext<'_, F>,
    ) -> Result<(), Error> {
        Ok(())
    }

    /// Called after a batch of `gates` protocols was evaluated.
    async fn finished_batch(
        &mut self,
        _gates: usize,
        _ctx: &mut BatchContext<'_, F>,
    ) -> Result<(), Error> {
        Ok(())
    }

    /// Called once after the last batch.
    async fn finished_eval(&mut self, _ctx: &mut BatchContext<'_, F>) -> Result<(), Error> {
        Ok(())
    }
}

/// Synchronization that does nothing.
pub struct NoSynchronization;

impl<F: FieldDefinition> RoundSynchronization<F> for NoSynchronization {}

/// Evaluates producers in batches of bounded size.
pub struct BatchEvaluator {
    batch_size: usize,
    max_rounds: usize,
    max_depth: usize,
    stats: EvaluationStats,
}

impl BatchEvaluator {
    pub fn new(config: &EngineConfig) -> Result<Self, Error> {
        config.validate()?;
        Ok(Self {
            batch_size: config.batch_size,
            max_rounds: config.max_rounds_per_batch,
            max_depth: config.max_nesting_depth,
            stats: EvaluationStats::default(),
        })
    }

    /// Counters accumulated over all evaluations of this evaluator.
    pub fn stats(&self) -> &EvaluationStats {
        &self.stats
    }

    /// Evaluate all protocols of `producer`.
    pub async fn eval<F: FieldDefinition>(
        &mut self,
        producer: &mut Producer<F>,
        pool: &mut SpdzResourcePool<F>,
        network: &mut RoundNetwork,
        sync: &mut dyn RoundSynchronization<F>,
    ) -> Result<(), Error> {
        let (batch_size, max_depth) = (self.batch_size, self.max_depth);
        let mut ctx = BatchContext {
            pool,
            network,
            max_rounds: self.max_rounds,
            stats: &mut self.stats,
        };

        loop {
            let mut batch = ProtocolCollection::new(batch_size);
            let more = producer.pull(&mut batch, max_depth, 0)?;
            if batch.is_empty() {
                if more {
                    return Err(Error::Stalled);
                }
                break;
            }

            ctx.stats.batches += 1;
            ctx.stats.gates += batch.len();
            debug!(
                party_id = ctx.pool.party_id(),
                batch = ctx.stats.batches,
                size = batch.len(),
                "evaluating batch"
            );

            sync.before_batch(&batch, &mut ctx).await?;
            ctx.process_batch(&mut batch).await?;
            sync.finished_batch(batch.len(), &mut ctx).await?;

            if !more {
                break;
            }
        }

        sync.finished_eval(&mut ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        builder::ProtocolBuilder,
        config::ReceivePolicy,
        deferred::Deferred,
        fields::{BigIntField, Modulus},
        spdz::DummyDataSupplier,
        transport::MemoryNetwork,
    };

    fn field() -> BigIntField {
        BigIntField::new(Modulus::mersenne(61).unwrap())
    }

    /// Single party setup; all messages are delivered by loopback.
    fn single_party() -> (SpdzResourcePool<BigIntField>, RoundNetwork) {
        let supplier = DummyDataSupplier::new(field(), 1, 1, 7).unwrap();
        let pool = SpdzResourcePool::new(1, 1, field(), Box::new(supplier)).unwrap();
        let channel = MemoryNetwork::new(1, ReceivePolicy::default())
            .channel(1)
            .unwrap();
        (pool, RoundNetwork::new(Box::new(channel)))
    }

    fn config(batch_size: usize, max_rounds: usize, max_depth: usize) -> EngineConfig {
        EngineConfig {
            batch_size,
            max_rounds_per_batch: max_rounds,
            max_nesting_depth: max_depth,
            ..EngineConfig::default()
        }
    }

    #[tokio::test]
    async fn test_sequential_steps_get_own_batches() {
        let (mut pool, mut network) = single_party();
        let mut builder = ProtocolBuilder::new(1, 1, field());
        let output = builder
            .seq(|b| {
                let six = b.field().create(6);
                let seven = b.field().create(7);
                let x = b.numeric().known(six);
                let y = b.numeric().known(seven);
                let z = b.numeric().mult(&x, &y);
                b.numeric().open(&z)
            })
            .output();

        let mut evaluator = BatchEvaluator::new(&EngineConfig::default()).unwrap();
        let mut producer = builder.into_producer();
        evaluator
            .eval(&mut producer, &mut pool, &mut network, &mut NoSynchronization)
            .await
            .unwrap();

        assert_eq!(output.get().unwrap(), field().create(42));
        assert_eq!(
            evaluator.stats(),
            &EvaluationStats {
                batches: 4,
                rounds: 6,
                gates: 4
            }
        );
        // Mult opens two values, open one more.
        assert_eq!(pool.pending_openings(), 3);
    }

    #[tokio::test]
    async fn test_parallel_steps_fill_batches() {
        let (mut pool, mut network) = single_party();
        let mut builder = ProtocolBuilder::new(1, 1, field());
        let outputs = builder
            .par(|b| {
                let shares: Vec<_> = (0..10)
                    .map(|i| {
                        let value = b.field().create(i);
                        b.numeric().known(value)
                    })
                    .collect();
                Deferred::ready(shares)
            })
            .output();

        let mut evaluator = BatchEvaluator::new(&config(4, 32, 64)).unwrap();
        let mut producer = builder.into_producer();
        evaluator
            .eval(&mut producer, &mut pool, &mut network, &mut NoSynchronization)
            .await
            .unwrap();

        assert_eq!(evaluator.stats().batches, 3);
        assert_eq!(evaluator.stats().gates, 10);
        let shares = outputs.get().unwrap();
        assert_eq!(shares[9].get().unwrap().value(), &field().create(9));
    }

    #[tokio::test]
    async fn test_continuations_see_previous_results() {
        let (mut pool, mut network) = single_party();
        let mut builder = ProtocolBuilder::new(1, 1, field());
        let output = builder
            .seq(|b| {
                let five = b.field().create(5);
                let x = b.numeric().known(five);
                b.numeric().open(&x)
            })
            .seq(|b, opened| {
                let doubled = opened.clone() + opened.clone();
                let one = b.field().one();
                let x = b.numeric().known(doubled);
                let y = b.numeric().add_public(&x, one);
                b.numeric().open(&y)
            })
            .output();

        let mut evaluator = BatchEvaluator::new(&EngineConfig::default()).unwrap();
        let mut producer = builder.into_producer();
        evaluator
            .eval(&mut producer, &mut pool, &mut network, &mut NoSynchronization)
            .await
            .unwrap();
        assert_eq!(output.get().unwrap(), field().create(11));
    }

    #[tokio::test]
    async fn test_round_limit() {
        let (mut pool, mut network) = single_party();
        let mut builder = ProtocolBuilder::new(1, 1, field());
        builder.seq(|b| {
            let one = b.field().one();
            let x = b.numeric().known(one);
            b.numeric().mult(&x, &x)
        });

        let mut evaluator = BatchEvaluator::new(&config(16, 1, 64)).unwrap();
        let mut producer = builder.into_producer();
        let result = evaluator
            .eval(&mut producer, &mut pool, &mut network, &mut NoSynchronization)
            .await;
        assert!(matches!(result, Err(Error::RoundLimitExceeded { rounds: 1 })));
    }

    #[tokio::test]
    async fn test_nesting_limit() {
        let (mut pool, mut network) = single_party();
        let mut builder = ProtocolBuilder::new(1, 1, field());
        builder.seq(|b| {
            b.seq(|b| {
                let one = b.field().one();
                b.numeric().known(one)
            })
            .output()
        });

        let mut evaluator = BatchEvaluator::new(&config(16, 32, 2)).unwrap();
        let mut producer = builder.into_producer();
        let result = evaluator
            .eval(&mut producer, &mut pool, &mut network, &mut NoSynchronization)
            .await;
        assert!(matches!(result, Err(Error::NestingTooDeep { depth: 2 })));
    }

    #[test]
    fn test_rejects_empty_batches() {
        assert!(matches!(
            BatchEvaluator::new(&config(0, 32, 64)),
            Err(Error::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_no_progress_is_an_error() {
        let (mut pool, mut network) = single_party();
        let mut builder = ProtocolBuilder::new(1, 1, field());
        builder.seq(|b| {
            let one = b.field().one();
            b.numeric().known(one)
        });

        let mut evaluator = BatchEvaluator {
            batch_size: 0,
            max_rounds: 32,
            max_depth: 64,
            stats: EvaluationStats::default(),
        };
        let mut producer = builder.into_producer();
        let result = evaluator
            .eval(&mut producer, &mut pool, &mut network, &mut NoSynchronization)
            .await;
        assert!(matches!(result, Err(Error::Stalled)));
        assert_eq!(evaluator.stats().batches, 0);
    }
}
