use std::collections::BTreeMap;

use async_trait::async_trait;
use tracing::{trace, warn};

use super::{Channel, TransportError};
use crate::PartyId;

/// Traffic exchanged with a single peer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PeerStats {
    pub messages_sent: usize,
    pub bytes_sent: usize,
    pub messages_received: usize,
    pub bytes_received: usize,
    /// Smallest received message, if any was received.
    pub min_received: Option<usize>,
    pub max_received: usize,
}

/// Traffic statistics of a channel, per peer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChannelStats {
    pub peers: BTreeMap<PartyId, PeerStats>,
}

impl ChannelStats {
    pub fn total_bytes_sent(&self) -> usize {
        self.peers.values().map(|p| p.bytes_sent).sum()
    }

    pub fn total_bytes_received(&self) -> usize {
        self.peers.values().map(|p| p.bytes_received).sum()
    }

    pub fn total_messages_sent(&self) -> usize {
        self.peers.values().map(|p| p.messages_sent).sum()
    }
}

/// Channel decorator tracing every message and counting traffic.
pub struct TracingChannel<C> {
    inner: C,
    stats: ChannelStats,
}

impl<C: Channel> TracingChannel<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            stats: ChannelStats::default(),
        }
    }

    pub fn stats(&self) -> &ChannelStats {
        &self.stats
    }

    /// Return collected statistics and start counting from zero.
    pub fn reset_stats(&mut self) -> ChannelStats {
        std::mem::take(&mut self.stats)
    }

    pub fn into_inner(self) -> C {
        self.inner
    }
}

#[async_trait(?Send)]
impl<C: Channel> Channel for TracingChannel<C> {
    fn party_id(&self) -> PartyId {
        self.inner.party_id()
    }

    fn num_parties(&self) -> usize {
        self.inner.num_parties()
    }

    async fn send(&mut self, to: PartyId, message: Vec<u8>) -> Result<(), TransportError> {
        let len = message.len();
        trace!(from = self.inner.party_id(), to, len, "send");
        self.inner.send(to, message).await?;
        let peer = self.stats.peers.entry(to).or_default();
        peer.messages_sent += 1;
        peer.bytes_sent += len;
        Ok(())
    }

    async fn receive(&mut self, from: PartyId) -> Result<Vec<u8>, TransportError> {
        let message = match self.inner.receive(from).await {
            Ok(message) => message,
            Err(err) => {
                warn!(party_id = self.inner.party_id(), from, %err, "receive failed");
                return Err(err);
            }
        };
        let len = message.len();
        trace!(to = self.inner.party_id(), from, len, "received");
        let peer = self.stats.peers.entry(from).or_default();
        peer.messages_received += 1;
        peer.bytes_received += len;
        peer.min_received = Some(peer.min_received.map_or(len, |min| min.min(len)));
        peer.max_received = peer.max_received.max(len);
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::ReceivePolicy, transport::MemoryNetwork};

    #[tokio::test]
    async fn test_counts_traffic() {
        let network = MemoryNetwork::new(2, ReceivePolicy::default());
        let mut channels = network.channels().into_iter().map(TracingChannel::new);
        let mut first = channels.next().unwrap();
        let mut second = channels.next().unwrap();

        first.send(2, vec![0; 10]).await.unwrap();
        first.send(2, vec![0; 3]).await.unwrap();
        second.receive(1).await.unwrap();
        second.receive(1).await.unwrap();

        assert_eq!(first.stats().total_bytes_sent(), 13);
        assert_eq!(first.stats().total_messages_sent(), 2);
        let peer = second.stats().peers[&1];
        assert_eq!(peer.messages_received, 2);
        assert_eq!(peer.min_received, Some(3));
        assert_eq!(peer.max_received, 10);

        let stats = second.reset_stats();
        assert_eq!(stats.total_bytes_received(), 13);
        assert_eq!(second.stats().total_bytes_received(), 0);
    }
}
