//! Point-to-point byte transport between parties.
//!
//! Party ids are 1-based. A [`Channel`] only moves opaque byte messages; all
//! framing of protocol data happens in [`crate::network`].

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::PartyId;

mod config;
mod logging;
mod memory;
mod networking;
mod stream;

pub use config::{NetworkConfig, NetworkPartyConfig};
pub use logging::{ChannelStats, PeerStats, TracingChannel};
pub use memory::{MemoryChannel, MemoryNetwork};
pub use networking::{connect_multiparty, NetChannel};
pub use stream::{
    bincode_duplex, duplex_channels, wrap_channel_with_bincode, BincodeDuplex, BincodeStreamSink,
    StreamChannel,
};

/// Error type for channels.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("error while sending message to party {party}: {reason}")]
    Send { party: PartyId, reason: String },

    #[error("no message from party {party} within {waited:?}")]
    Timeout { party: PartyId, waited: Duration },

    #[error("channel to party {party} is closed")]
    Closed { party: PartyId },

    #[error("unknown party {party}")]
    UnknownParty { party: PartyId },

    #[error("stream channels must be created within a Tokio runtime")]
    NoRuntime,
}

/// Ordered, reliable byte-message channel from one party to all others.
///
/// Sending never waits for the receiver. Receiving waits for at most the
/// channel's timeout and then fails with [`TransportError::Timeout`].
#[async_trait(?Send)]
pub trait Channel {
    /// ID of current party.
    fn party_id(&self) -> PartyId;

    /// Number of parties participating in multi-party protocol.
    fn num_parties(&self) -> usize;

    /// Send message to party with given ID.
    async fn send(&mut self, to: PartyId, message: Vec<u8>) -> Result<(), TransportError>;

    /// Receive next message from party with given ID.
    async fn receive(&mut self, from: PartyId) -> Result<Vec<u8>, TransportError>;
}

#[async_trait(?Send)]
impl<C: Channel + ?Sized> Channel for Box<C> {
    fn party_id(&self) -> PartyId {
        (**self).party_id()
    }

    fn num_parties(&self) -> usize {
        (**self).num_parties()
    }

    async fn send(&mut self, to: PartyId, message: Vec<u8>) -> Result<(), TransportError> {
        (**self).send(to, message).await
    }

    async fn receive(&mut self, from: PartyId) -> Result<Vec<u8>, TransportError> {
        (**self).receive(from).await
    }
}

/// Check that `party` is a valid peer id for a network of `num_parties`.
pub(crate) fn check_peer(party: PartyId, num_parties: usize) -> Result<(), TransportError> {
    if party == 0 || party > num_parties {
        Err(TransportError::UnknownParty { party })
    } else {
        Ok(())
    }
}
