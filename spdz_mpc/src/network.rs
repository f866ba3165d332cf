//! Round-based messaging on top of a [`Channel`].
//!
//! During a round, protocols queue messages per peer. At the end of the
//! round all messages for a peer are flushed as one frame, and during the
//! next round the first receive from a peer fetches that peer's frame.

use std::collections::VecDeque;

use tracing::trace;

use crate::{
    transport::{check_peer, Channel},
    Error, PartyId,
};

/// Per-round message buffering for the protocols of one batch.
pub struct RoundNetwork {
    channel: Box<dyn Channel>,
    party_id: PartyId,
    num_parties: usize,
    /// Messages queued during the current round, indexed by `party - 1`.
    outgoing: Vec<Vec<Vec<u8>>>,
    /// Messages received in the current round. `None` if the frame was not fetched yet.
    incoming: Vec<Option<VecDeque<Vec<u8>>>>,
}

impl RoundNetwork {
    pub fn new(channel: Box<dyn Channel>) -> Self {
        let num_parties = channel.num_parties();
        Self {
            party_id: channel.party_id(),
            num_parties,
            outgoing: vec![Vec::new(); num_parties],
            incoming: vec![None; num_parties],
            channel,
        }
    }

    pub fn party_id(&self) -> PartyId {
        self.party_id
    }

    pub fn num_parties(&self) -> usize {
        self.num_parties
    }

    /// Queue message for party `to`, delivered in the next round.
    pub fn send(&mut self, to: PartyId, message: Vec<u8>) -> Result<(), Error> {
        check_peer(to, self.num_parties)?;
        self.outgoing[to - 1].push(message);
        Ok(())
    }

    /// Queue message for every party, including the current one.
    pub fn send_to_all(&mut self, message: Vec<u8>) {
        for queue in &mut self.outgoing {
            queue.push(message.clone());
        }
    }

    /// Next message sent by party `from` in the previous round.
    pub async fn receive(&mut self, from: PartyId) -> Result<Vec<u8>, Error> {
        check_peer(from, self.num_parties)?;
        if self.incoming[from - 1].is_none() {
            let frame = self.channel.receive(from).await?;
            let messages: Vec<Vec<u8>> = bincode::deserialize(&frame)?;
            self.incoming[from - 1] = Some(messages.into());
        }
        self.incoming[from - 1]
            .as_mut()
            .and_then(VecDeque::pop_front)
            .ok_or_else(|| {
                Error::Malformed(format!("party {from} sent fewer messages than expected"))
            })
    }

    /// Next message from every party, in order of party ID.
    pub async fn receive_from_all(&mut self) -> Result<Vec<Vec<u8>>, Error> {
        let mut messages = Vec::with_capacity(self.num_parties);
        for from in 1..=self.num_parties {
            messages.push(self.receive(from).await?);
        }
        Ok(messages)
    }

    /// End current round: check that everything received was consumed and send queued messages.
    pub(crate) async fn flush(&mut self) -> Result<(), Error> {
        for (index, queue) in self.incoming.iter_mut().enumerate() {
            if let Some(left) = queue.take() {
                if !left.is_empty() {
                    return Err(Error::Malformed(format!(
                        "{} unconsumed messages from party {}",
                        left.len(),
                        index + 1
                    )));
                }
            }
        }

        for (index, queue) in self.outgoing.iter_mut().enumerate() {
            if queue.is_empty() {
                continue;
            }
            let messages = std::mem::take(queue);
            let to = index + 1;
            if to == self.party_id {
                self.incoming[index] = Some(messages.into());
            } else {
                let frame = bincode::serialize(&messages)?;
                trace!(from = self.party_id, to, messages = messages.len(), "flush");
                self.channel.send(to, frame).await?;
            }
        }
        Ok(())
    }

    /// Whether messages are waiting to be flushed.
    pub fn has_pending_messages(&self) -> bool {
        self.outgoing.iter().any(|queue| !queue.is_empty())
    }

    pub fn channel(&self) -> &dyn Channel {
        self.channel.as_ref()
    }

    pub fn into_channel(self) -> Box<dyn Channel> {
        self.channel
    }
}
