use tracing::info;

use super::{MacCheckObserver, SpdzResourcePool, SpdzRoundSynchronization};
use crate::{
    builder::ProtocolBuilder,
    config::EngineConfig,
    deferred::Deferred,
    executor::{BatchEvaluator, EvaluationStats},
    fields::FieldDefinition,
    network::RoundNetwork,
    transport::{connect_multiparty, Channel, NetworkConfig},
    Error,
};

/// Runs applications with the SPDZ protocol suite.
pub struct SpdzEngine<F: FieldDefinition> {
    pool: SpdzResourcePool<F>,
    network: RoundNetwork,
    evaluator: BatchEvaluator,
    sync: SpdzRoundSynchronization,
}

impl<F: FieldDefinition> SpdzEngine<F> {
    pub fn new(
        config: &EngineConfig,
        pool: SpdzResourcePool<F>,
        channel: impl Channel + 'static,
    ) -> Result<Self, Error> {
        if channel.party_id() != pool.party_id() || channel.num_parties() != pool.num_parties() {
            return Err(Error::Config(format!(
                "channel of party {} among {} does not match party {} among {}",
                channel.party_id(),
                channel.num_parties(),
                pool.party_id(),
                pool.num_parties()
            )));
        }
        Ok(Self {
            pool,
            network: RoundNetwork::new(Box::new(channel)),
            evaluator: BatchEvaluator::new(config)?,
            sync: SpdzRoundSynchronization::new(config.mac_check_threshold),
        })
    }

    /// Connect to the other parties listed in `network` over TCP.
    ///
    /// Receives on the connections wait at most `config.receive.timeout()`.
    pub async fn connect(
        config: &EngineConfig,
        pool: SpdzResourcePool<F>,
        network: &NetworkConfig,
    ) -> Result<Self, Error> {
        config.validate()?;
        let channel =
            connect_multiparty(network, pool.party_id(), config.receive.timeout()).await?;
        Self::new(config, pool, channel)
    }

    /// Notify `observer` about every MAC check.
    pub fn with_observer(mut self, observer: impl MacCheckObserver + 'static) -> Self {
        self.sync.set_observer(Box::new(observer));
        self
    }

    /// Evaluate the computation built by `application` and return its output.
    ///
    /// The output is returned only after all values opened during the
    /// computation passed a MAC check.
    pub async fn run<T, A>(&mut self, application: A) -> Result<T, Error>
    where
        T: Clone + 'static,
        A: FnOnce(&mut ProtocolBuilder<F>) -> Deferred<T> + 'static,
    {
        let mut root = ProtocolBuilder::new(
            self.pool.party_id(),
            self.pool.num_parties(),
            self.pool.field().clone(),
        );
        let output = root.seq(application).output();
        let mut producer = root.into_producer();

        info!(party_id = self.pool.party_id(), "starting evaluation");
        self.evaluator
            .eval(&mut producer, &mut self.pool, &mut self.network, &mut self.sync)
            .await?;
        let stats = self.evaluator.stats();
        info!(
            party_id = self.pool.party_id(),
            batches = stats.batches,
            rounds = stats.rounds,
            mac_checks = self.sync.checks(),
            "evaluation finished"
        );
        output.get()
    }

    pub fn stats(&self) -> &EvaluationStats {
        self.evaluator.stats()
    }

    /// Number of MAC checks run so far.
    pub fn mac_checks(&self) -> usize {
        self.sync.checks()
    }

    pub fn pool(&self) -> &SpdzResourcePool<F> {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::ReceivePolicy,
        fields::{BigIntField, Modulus},
        spdz::DummyDataSupplier,
        transport::MemoryNetwork,
    };

    #[test]
    fn test_channel_must_match_pool() {
        let field = BigIntField::new(Modulus::mersenne(31).unwrap());
        let supplier = DummyDataSupplier::new(field.clone(), 2, 1, 0).unwrap();
        let pool = SpdzResourcePool::new(1, 2, field, Box::new(supplier)).unwrap();
        let channel = MemoryNetwork::new(2, ReceivePolicy::default())
            .channel(2)
            .unwrap();
        assert!(matches!(
            SpdzEngine::new(&EngineConfig::default(), pool, channel),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_rejects_invalid_config() {
        let field = BigIntField::new(Modulus::mersenne(31).unwrap());
        let supplier = DummyDataSupplier::new(field.clone(), 1, 1, 0).unwrap();
        let pool = SpdzResourcePool::new(1, 1, field, Box::new(supplier)).unwrap();
        let channel = MemoryNetwork::new(1, ReceivePolicy::default())
            .channel(1)
            .unwrap();
        let config = EngineConfig {
            batch_size: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(
            SpdzEngine::new(&config, pool, channel),
            Err(Error::Config(_))
        ));
    }
}
