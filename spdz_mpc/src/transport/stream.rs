use std::{collections::VecDeque, fmt, time::Duration};

use async_trait::async_trait;
use futures::{
    stream::{SplitSink, SplitStream},
    Sink, SinkExt, Stream, StreamExt,
};
use tokio::{
    io::{AsyncRead, AsyncWrite, DuplexStream},
    runtime::Handle,
    sync::mpsc::{self, UnboundedSender},
};
use tokio_serde::formats::Bincode;
use tokio_util::codec::LengthDelimitedCodec;
use tracing::warn;

use super::{check_peer, Channel, TransportError};
use crate::PartyId;

/// Connection to one peer. Outgoing messages are queued for a writer task so
/// that a send never waits for the peer to read.
struct Link<S> {
    outgoing: UnboundedSender<Vec<u8>>,
    incoming: SplitStream<S>,
}

/// Channel over one duplex message stream per peer.
pub struct StreamChannel<S> {
    /// Indexed by `party - 1`; the entry of the current party is `None`.
    links: Vec<Option<Link<S>>>,
    loopback: VecDeque<Vec<u8>>,
    party_id: PartyId,
    timeout: Duration,
}

impl<S> StreamChannel<S>
where
    S: Stream + Sink<Vec<u8>> + Send + 'static,
    <S as Sink<Vec<u8>>>::Error: fmt::Display,
{
    /// Create wrapper for given list of connections, in order of party ID.
    /// All connections but the one of `party_id` must be present.
    ///
    /// Must be called within a Tokio runtime, which drives the writers.
    pub fn new(
        streams: impl IntoIterator<Item = Option<S>>,
        party_id: PartyId,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let streams: Vec<_> = streams.into_iter().collect();
        check_peer(party_id, streams.len())?;
        for (index, stream) in streams.iter().enumerate() {
            if index + 1 != party_id && stream.is_none() {
                return Err(TransportError::UnknownParty { party: index + 1 });
            }
        }
        let runtime = Handle::try_current().map_err(|_| TransportError::NoRuntime)?;

        let links = streams
            .into_iter()
            .zip(1..)
            .map(|(stream, party)| {
                stream.map(|stream| {
                    let (sink, incoming) = stream.split();
                    Link {
                        outgoing: spawn_writer(&runtime, sink, party),
                        incoming,
                    }
                })
            })
            .collect();
        Ok(Self {
            links,
            loopback: VecDeque::new(),
            party_id,
            timeout,
        })
    }
}

impl<S> StreamChannel<S> {
    fn link(&mut self, party: PartyId) -> Result<&mut Link<S>, TransportError> {
        check_peer(party, self.links.len())?;
        self.links[party - 1]
            .as_mut()
            .ok_or(TransportError::UnknownParty { party })
    }
}

/// Forward queued messages to `sink` until the channel is dropped or the
/// connection fails.
fn spawn_writer<S>(
    runtime: &Handle,
    mut sink: SplitSink<S, Vec<u8>>,
    party: PartyId,
) -> UnboundedSender<Vec<u8>>
where
    S: Sink<Vec<u8>> + Send + 'static,
    <S as Sink<Vec<u8>>>::Error: fmt::Display,
{
    let (sender, mut receiver) = mpsc::unbounded_channel::<Vec<u8>>();
    runtime.spawn(async move {
        while let Some(message) = receiver.recv().await {
            if let Err(err) = sink.send(message).await {
                warn!(party, %err, "failed to write message");
                break;
            }
        }
    });
    sender
}

#[async_trait(?Send)]
impl<S, E> Channel for StreamChannel<S>
where
    S: Stream<Item = Result<Vec<u8>, E>> + Unpin,
{
    fn party_id(&self) -> PartyId {
        self.party_id
    }

    fn num_parties(&self) -> usize {
        self.links.len()
    }

    async fn send(&mut self, to: PartyId, message: Vec<u8>) -> Result<(), TransportError> {
        if to == self.party_id {
            self.loopback.push_back(message);
            return Ok(());
        }
        self.link(to)?
            .outgoing
            .send(message)
            .map_err(|_| TransportError::Send {
                party: to,
                reason: "connection writer stopped".into(),
            })
    }

    async fn receive(&mut self, from: PartyId) -> Result<Vec<u8>, TransportError> {
        if from == self.party_id {
            return self
                .loopback
                .pop_front()
                .ok_or(TransportError::Timeout {
                    party: from,
                    waited: Duration::ZERO,
                });
        }
        let waited = self.timeout;
        let link = self.link(from)?;
        match tokio::time::timeout(waited, link.incoming.next()).await {
            Ok(Some(Ok(message))) => Ok(message),
            Ok(Some(Err(_)) | None) => Err(TransportError::Closed { party: from }),
            Err(_) => Err(TransportError::Timeout {
                party: from,
                waited,
            }),
        }
    }
}

/// Length-framed Bincode-encoded messages channel.
pub type BincodeStreamSink<T, C> =
    tokio_serde::Framed<tokio_util::codec::Framed<C, LengthDelimitedCodec>, T, T, Bincode<T, T>>;

/// Length-framed Bincode-encoded tokio's Duplex stream.
pub type BincodeDuplex<T> = BincodeStreamSink<T, DuplexStream>;

/// Create length-framed Bincode-encoded message channel from AsyncRead/Write.
pub fn wrap_channel_with_bincode<T, C>(channel: C) -> BincodeStreamSink<T, C>
where
    C: AsyncRead + AsyncWrite,
{
    let length_delimited = tokio_util::codec::Framed::new(channel, LengthDelimitedCodec::new());
    tokio_serde::Framed::new(length_delimited, Bincode::default())
}

/// Create bidirectional Bincode-encoded channel.
pub fn bincode_duplex<T>(max_buf_size: usize) -> (BincodeDuplex<T>, BincodeDuplex<T>) {
    let (a, b) = tokio::io::duplex(max_buf_size);
    (wrap_channel_with_bincode(a), wrap_channel_with_bincode(b))
}

/// Create in-process stream channels connecting `num_parties` parties.
pub fn duplex_channels(
    num_parties: usize,
    max_buf_size: usize,
    timeout: Duration,
) -> Result<Vec<StreamChannel<BincodeDuplex<Vec<u8>>>>, TransportError> {
    let mut matrix: Vec<Vec<_>> = (0..num_parties)
        .map(|_| (0..num_parties).map(|_| None).collect())
        .collect();

    for i in 0..num_parties {
        for j in 0..i {
            let (a, b) = bincode_duplex::<Vec<u8>>(max_buf_size);
            matrix[i][j] = Some(a);
            matrix[j][i] = Some(b);
        }
    }

    matrix
        .into_iter()
        .zip(1..)
        .map(|(row, party_id)| StreamChannel::new(row, party_id, timeout))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_duplex_exchange() {
        let mut channels = duplex_channels(3, 1 << 16, Duration::from_secs(1)).unwrap();
        assert_eq!(channels.len(), 3);
        assert_eq!(channels[2].party_id(), 3);

        channels[0].send(3, b"one".to_vec()).await.unwrap();
        channels[1].send(3, b"two".to_vec()).await.unwrap();
        channels[0].send(3, b"three".to_vec()).await.unwrap();

        assert_eq!(channels[2].receive(2).await.unwrap(), b"two".to_vec());
        assert_eq!(channels[2].receive(1).await.unwrap(), b"one".to_vec());
        assert_eq!(channels[2].receive(1).await.unwrap(), b"three".to_vec());
    }

    #[tokio::test]
    async fn test_loopback_and_timeout() {
        let mut channels = duplex_channels(2, 1024, Duration::from_millis(10)).unwrap();
        channels[0].send(1, vec![7]).await.unwrap();
        assert_eq!(channels[0].receive(1).await.unwrap(), vec![7]);
        assert!(matches!(
            channels[0].receive(2).await,
            Err(TransportError::Timeout { party: 2, .. })
        ));
    }

    #[tokio::test]
    async fn test_closed_peer() {
        let mut channels = duplex_channels(2, 1024, Duration::from_secs(1)).unwrap();
        drop(channels.pop());
        assert_eq!(
            channels[0].receive(2).await,
            Err(TransportError::Closed { party: 2 })
        );
    }

    #[tokio::test]
    async fn test_large_frames_do_not_block_each_other() {
        // Both parties send frames far larger than the pipe buffer before
        // either of them reads.
        let mut channels = duplex_channels(2, 64, Duration::from_secs(5)).unwrap();
        let message = vec![0xab; 1 << 16];
        channels[0].send(2, message.clone()).await.unwrap();
        channels[1].send(1, message.clone()).await.unwrap();
        channels[0].send(2, vec![1]).await.unwrap();

        assert_eq!(channels[1].receive(1).await.unwrap(), message);
        assert_eq!(channels[1].receive(1).await.unwrap(), vec![1]);
        assert_eq!(channels[0].receive(2).await.unwrap(), message);
    }

    #[test]
    fn test_requires_runtime() {
        let (a, _b) = bincode_duplex::<Vec<u8>>(64);
        assert!(matches!(
            StreamChannel::new(vec![None, Some(a)], 1, Duration::from_secs(1)),
            Err(TransportError::NoRuntime)
        ));
    }

    #[test]
    fn test_missing_link() {
        let streams: Vec<Option<BincodeDuplex<Vec<u8>>>> = vec![None, None];
        assert!(matches!(
            StreamChannel::new(streams, 1, Duration::from_secs(1)),
            Err(TransportError::UnknownParty { party: 2 })
        ));
    }
}
