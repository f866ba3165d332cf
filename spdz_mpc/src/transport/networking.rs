use std::{io, net::SocketAddr, time::Duration};

use futures::{future, stream::FuturesUnordered, StreamExt};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};
use tracing::debug;

use super::{wrap_channel_with_bincode, BincodeStreamSink, NetworkConfig, StreamChannel};
use crate::{Error, PartyId};

/// Delay in milliseconds after which connection to peer is retried.
const CONNECTION_RETRY_DELAY: u64 = 1000;

/// Handshake value exchanged when a connection is opened.
const HANDSHAKE_MAGIC: u32 = 0x5350_445A;

/// Bincode-encoded network channel.
pub type NetChannel = BincodeStreamSink<Vec<u8>, TcpStream>;

/// Establish network connections for multiparty protocol.
///
/// Party `i` listens for parties with lower IDs and connects to parties with
/// higher IDs. `timeout` bounds every later receive.
pub async fn connect_multiparty(
    config: &NetworkConfig,
    party_id: PartyId,
    timeout: Duration,
) -> Result<StreamChannel<NetChannel>, Error> {
    let parties = &config.parties;
    if party_id == 0 || party_id > parties.len() {
        return Err(Error::Config(format!(
            "party {party_id} is not part of a network of {} parties",
            parties.len()
        )));
    }
    let index = party_id - 1;
    let listen_for = listen_for_parties(parties[index].address, index);

    let connect_to = future::try_join_all(
        parties[index + 1..]
            .iter()
            .map(|config| connect_to_party(config.address, party_id)),
    );

    let (listen_for, connect_to) = futures::try_join!(listen_for, connect_to)?;
    debug!(party_id, peers = parties.len() - 1, "connected to all parties");

    let streams = listen_for
        .into_iter()
        .map(Some)
        .chain(std::iter::once(None))
        .chain(connect_to.into_iter().map(Some))
        .map(|x| x.map(wrap_channel_with_bincode));

    Ok(StreamChannel::new(streams, party_id, timeout)?)
}

/// Listen for incoming connections from the `count` parties with lower IDs.
async fn listen_for_parties(addr: SocketAddr, count: usize) -> Result<Vec<TcpStream>, io::Error> {
    if count == 0 {
        return Ok(Vec::new());
    }

    let listener = TcpListener::bind(addr).await?;
    let mut futures = FuturesUnordered::new();
    let mut connected_parties: Vec<Option<TcpStream>> = (0..count).map(|_| None).collect();

    loop {
        tokio::select! {
            tmp = listener.accept() => {
                let (socket, _) = tmp?;
                futures.push(accept_party(count, socket));
            },
            tmp = futures.next(), if !futures.is_empty() => {
                if let Some(Ok((socket, id))) = tmp {
                    if connected_parties[id - 1].is_none() {
                        connected_parties[id - 1] = Some(socket);
                        if connected_parties.iter().all(Option::is_some) {
                            break;
                        }
                    }
                }
            },
        }
    }

    Ok(connected_parties.into_iter().flatten().collect())
}

/// Process incoming connection from party.
async fn accept_party(
    count: usize,
    mut socket: TcpStream,
) -> Result<(TcpStream, PartyId), io::Error> {
    if socket.read_u32().await? != HANDSHAKE_MAGIC {
        return Err(io::Error::new(io::ErrorKind::Other, "Invalid magic"));
    }

    let party_id = socket.read_u32().await? as PartyId;
    if party_id == 0 || party_id > count {
        return Err(io::Error::new(io::ErrorKind::Other, "Invalid party ID"));
    }

    socket.write_u32(HANDSHAKE_MAGIC).await?;
    socket.flush().await?;

    Ok((socket, party_id))
}

/// Connect to party with higher ID.
async fn connect_to_party(
    addr: SocketAddr,
    this_party_id: PartyId,
) -> Result<TcpStream, io::Error> {
    let mut socket = loop {
        match TcpStream::connect(addr).await {
            Ok(socket) => break socket,
            _ => tokio::time::sleep(Duration::from_millis(CONNECTION_RETRY_DELAY)).await,
        }
    };

    socket.write_u32(HANDSHAKE_MAGIC).await?;
    socket.write_u32(this_party_id as u32).await?;
    socket.flush().await?;

    if socket.read_u32().await? != HANDSHAKE_MAGIC {
        return Err(io::Error::new(io::ErrorKind::Other, "Invalid magic"));
    }

    Ok(socket)
}
