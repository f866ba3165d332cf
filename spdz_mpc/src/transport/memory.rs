use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex, PoisonError,
    },
};

use async_trait::async_trait;

use super::{check_peer, Channel, TransportError};
use crate::{
    config::{EngineConfig, ReceivePolicy},
    PartyId,
};

type Queue = Mutex<VecDeque<Vec<u8>>>;

struct SharedQueues {
    /// One queue per ordered pair `(from, to)`.
    queues: HashMap<(PartyId, PartyId), Queue>,
    closed: AtomicBool,
    sent: AtomicUsize,
}

/// In-process network connecting parties simulated in the same process.
#[derive(Clone)]
pub struct MemoryNetwork {
    shared: Arc<SharedQueues>,
    num_parties: usize,
    policy: ReceivePolicy,
}

impl MemoryNetwork {
    pub fn new(num_parties: usize, policy: ReceivePolicy) -> Self {
        let queues = (1..=num_parties)
            .flat_map(|from| (1..=num_parties).map(move |to| (from, to)))
            .map(|key| (key, Mutex::new(VecDeque::new())))
            .collect();
        Self {
            shared: Arc::new(SharedQueues {
                queues,
                closed: AtomicBool::new(false),
                sent: AtomicUsize::new(0),
            }),
            num_parties,
            policy,
        }
    }

    /// Network whose receives wait as long as `config.receive` allows.
    pub fn from_config(num_parties: usize, config: &EngineConfig) -> Self {
        Self::new(num_parties, config.receive)
    }

    /// Channel endpoint of party with given ID.
    pub fn channel(&self, party_id: PartyId) -> Result<MemoryChannel, TransportError> {
        check_peer(party_id, self.num_parties)?;
        Ok(MemoryChannel {
            network: self.clone(),
            party_id,
        })
    }

    /// Channel endpoints of all parties, in order of party ID.
    pub fn channels(&self) -> Vec<MemoryChannel> {
        (1..=self.num_parties)
            .map(|party_id| MemoryChannel {
                network: self.clone(),
                party_id,
            })
            .collect()
    }

    /// Close the network. Receives that find no queued data fail afterwards.
    pub fn close(&self) {
        self.shared.closed.store(true, Ordering::SeqCst);
    }

    /// Number of messages sent over the network by all parties so far.
    pub fn messages_sent(&self) -> usize {
        self.shared.sent.load(Ordering::SeqCst)
    }

    fn queue(&self, from: PartyId, to: PartyId) -> Result<&Queue, TransportError> {
        self.shared
            .queues
            .get(&(from, to))
            .ok_or(TransportError::UnknownParty { party: from.max(to) })
    }
}

/// Endpoint of a [`MemoryNetwork`].
pub struct MemoryChannel {
    network: MemoryNetwork,
    party_id: PartyId,
}

impl MemoryChannel {
    fn try_receive(&self, from: PartyId) -> Result<Option<Vec<u8>>, TransportError> {
        let mut queue = self
            .network
            .queue(from, self.party_id)?
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(queue.pop_front())
    }
}

#[async_trait(?Send)]
impl Channel for MemoryChannel {
    fn party_id(&self) -> PartyId {
        self.party_id
    }

    fn num_parties(&self) -> usize {
        self.network.num_parties
    }

    async fn send(&mut self, to: PartyId, message: Vec<u8>) -> Result<(), TransportError> {
        check_peer(to, self.network.num_parties)?;
        if self.network.shared.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed { party: to });
        }
        self.network
            .queue(self.party_id, to)?
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(message);
        self.network.shared.sent.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn receive(&mut self, from: PartyId) -> Result<Vec<u8>, TransportError> {
        check_peer(from, self.network.num_parties)?;
        let policy = self.network.policy;
        for attempt in 0..=policy.max_attempts {
            if let Some(message) = self.try_receive(from)? {
                return Ok(message);
            }
            if self.network.shared.closed.load(Ordering::SeqCst) {
                return Err(TransportError::Closed { party: from });
            }
            if attempt < policy.max_attempts {
                tokio::time::sleep(policy.poll_interval()).await;
            }
        }
        Err(TransportError::Timeout {
            party: from,
            waited: policy.timeout(),
        })
    }
}
