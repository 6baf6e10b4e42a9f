//! Framed TCP sessions between peers.
//!
//! A connection becomes a session only after both sides exchange a hello
//! frame naming their identity and service tag; mismatched tags are closed
//! without an event. Each established session gets a writer task fed
//! through a channel and a read loop that reports inbound frames, with
//! teardown reported as a `Disconnected` state change.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use takibi_shared::error::DecodeError;
use takibi_shared::PeerIdentity;

use crate::error::TransportError;
use crate::event::{PeerConnectionState, TransportEvent};
use crate::lan::framing::FrameCodec;

/// JSON discriminant of the session hello frame.
pub const HELLO_TYPE: &str = "takibi_hello";

/// How long to wait for the peer's hello before giving up.
const HELLO_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-session writer channel depth.
const WRITER_QUEUE: usize = 64;

/// The local side of the session layer, shared with the accept loop.
#[derive(Debug, Clone)]
pub(crate) struct LocalContext {
    pub identity: PeerIdentity,
    pub service_tag: String,
}

pub(crate) type SharedLocal = Arc<Mutex<Option<LocalContext>>>;

/// Established sessions keyed by peer identity.
pub(crate) type PeerRegistry = Arc<Mutex<HashMap<PeerIdentity, PeerLink>>>;

pub(crate) struct PeerLink {
    pub writer: mpsc::Sender<Bytes>,
    pub cancel: CancellationToken,
}

/// First frame on every session, in both directions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hello {
    #[serde(rename = "type")]
    payload_type: String,
    #[serde(rename = "peerID")]
    pub peer: String,
    #[serde(rename = "serviceType")]
    pub service_tag: String,
}

impl Hello {
    pub fn new(identity: &PeerIdentity, service_tag: impl Into<String>) -> Self {
        Self {
            payload_type: HELLO_TYPE.to_string(),
            peer: identity.to_string(),
            service_tag: service_tag.into(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("hello serialization")
    }

    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        let hello: Hello =
            serde_json::from_slice(data).map_err(|e| DecodeError::Message(e.to_string()))?;
        if hello.payload_type != HELLO_TYPE {
            return Err(DecodeError::WrongPayloadType(hello.payload_type));
        }
        Ok(hello)
    }
}

type Reader = FramedRead<OwnedReadHalf, FrameCodec>;
type Writer = FramedWrite<OwnedWriteHalf, FrameCodec>;

/// Accept inbound connections until cancelled.
pub(crate) async fn run_listener(
    listener: TcpListener,
    local: SharedLocal,
    registry: PeerRegistry,
    events: mpsc::UnboundedSender<TransportEvent>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, addr)) => {
                        debug!(addr = %addr, "Inbound connection");
                        tokio::spawn(handle_inbound(
                            stream,
                            local.clone(),
                            registry.clone(),
                            events.clone(),
                        ));
                    }
                    Err(error) => {
                        warn!(error = %error, "Accept failed");
                    }
                }
            }
        }
    }

    debug!("Session listener stopped");
}

async fn handle_inbound(
    stream: TcpStream,
    local: SharedLocal,
    registry: PeerRegistry,
    events: mpsc::UnboundedSender<TransportEvent>,
) {
    // No local identity yet means the session side has never been started;
    // drop the connection.
    let Some(context) = local.lock().expect("local lock").clone() else {
        return;
    };

    let (read_half, write_half) = stream.into_split();
    let mut reader = FramedRead::new(read_half, FrameCodec::new());
    let mut writer = FramedWrite::new(write_half, FrameCodec::new());

    let Some(peer) = await_hello(&mut reader, &context.service_tag).await else {
        return;
    };

    let _ = events.send(TransportEvent::PeerStateChanged {
        peer: peer.clone(),
        state: PeerConnectionState::Connecting,
    });

    let hello = Hello::new(&context.identity, &context.service_tag);
    if writer.send(Bytes::from(hello.encode())).await.is_err() {
        return;
    }

    run_session(peer, reader, writer, registry, events).await;
}

/// Dial a discovered peer and establish a session.
pub(crate) async fn connect_outbound(
    addr: SocketAddr,
    peer: PeerIdentity,
    context: LocalContext,
    registry: PeerRegistry,
    events: mpsc::UnboundedSender<TransportEvent>,
) {
    let _ = events.send(TransportEvent::PeerStateChanged {
        peer: peer.clone(),
        state: PeerConnectionState::Connecting,
    });

    let stream = match TcpStream::connect(addr).await {
        Ok(stream) => stream,
        Err(error) => {
            warn!(peer = %peer, addr = %addr, error = %error, "Dial failed");
            let _ = events.send(TransportEvent::Failed {
                error: TransportError::Unavailable(error.to_string()),
            });
            return;
        }
    };

    let (read_half, write_half) = stream.into_split();
    let mut reader = FramedRead::new(read_half, FrameCodec::new());
    let mut writer = FramedWrite::new(write_half, FrameCodec::new());

    let hello = Hello::new(&context.identity, &context.service_tag);
    if writer.send(Bytes::from(hello.encode())).await.is_err() {
        return;
    }

    let Some(confirmed) = await_hello(&mut reader, &context.service_tag).await else {
        return;
    };
    if confirmed != peer {
        warn!(expected = %peer, got = %confirmed, "Peer identity mismatch on hello");
        return;
    }

    run_session(peer, reader, writer, registry, events).await;
}

/// Wait for the peer's hello and validate the service tag.
async fn await_hello(reader: &mut Reader, service_tag: &str) -> Option<PeerIdentity> {
    let frame = match timeout(HELLO_TIMEOUT, reader.next()).await {
        Ok(Some(Ok(frame))) => frame,
        Ok(Some(Err(error))) => {
            debug!(error = %error, "Hello frame error");
            return None;
        }
        Ok(None) => return None,
        Err(_) => {
            debug!("Hello timed out");
            return None;
        }
    };

    let hello = match Hello::decode(&frame) {
        Ok(hello) => hello,
        Err(error) => {
            debug!(error = %error, "Malformed hello");
            return None;
        }
    };

    if hello.service_tag != service_tag {
        debug!(got = %hello.service_tag, "Hello from another service");
        return None;
    }

    match PeerIdentity::parse(&hello.peer) {
        Ok(peer) => Some(peer),
        Err(error) => {
            debug!(name = %hello.peer, error = %error, "Hello without parsable identity");
            None
        }
    }
}

/// Register the established session and pump frames until it ends.
async fn run_session(
    peer: PeerIdentity,
    mut reader: Reader,
    mut writer: Writer,
    registry: PeerRegistry,
    events: mpsc::UnboundedSender<TransportEvent>,
) {
    let (writer_tx, mut writer_rx) = mpsc::channel::<Bytes>(WRITER_QUEUE);
    let cancel = CancellationToken::new();

    {
        let mut links = registry.lock().expect("registry lock");
        if links.contains_key(&peer) {
            // Simultaneous dials can race a second session; keep the first.
            debug!(peer = %peer, "Duplicate session, dropping the new one");
            return;
        }
        links.insert(
            peer.clone(),
            PeerLink {
                writer: writer_tx,
                cancel: cancel.clone(),
            },
        );
    }

    info!(peer = %peer, "Session established");
    let _ = events.send(TransportEvent::PeerStateChanged {
        peer: peer.clone(),
        state: PeerConnectionState::Connected,
    });

    let writer_cancel = cancel.clone();
    let writer_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = writer_cancel.cancelled() => break,
                payload = writer_rx.recv() => {
                    match payload {
                        Some(payload) => {
                            if let Err(error) = writer.send(payload).await {
                                debug!(error = %error, "Session write failed");
                                break;
                            }
                        }
                        None => break,
                    }
                }
            }
        }
    });

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            frame = reader.next() => {
                match frame {
                    Some(Ok(data)) => {
                        let _ = events.send(TransportEvent::DataReceived {
                            from: peer.clone(),
                            data: data.to_vec(),
                        });
                    }
                    Some(Err(error)) => {
                        debug!(peer = %peer, error = %error, "Session read failed");
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    cancel.cancel();
    writer_task.abort();
    registry.lock().expect("registry lock").remove(&peer);

    info!(peer = %peer, "Session closed");
    let _ = events.send(TransportEvent::PeerStateChanged {
        peer,
        state: PeerConnectionState::Disconnected,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use takibi_shared::EnvironmentTag;

    #[test]
    fn test_hello_roundtrip() {
        let identity = PeerIdentity::with_tag("Alice", EnvironmentTag::Host, 1_700_000_000);
        let hello = Hello::new(&identity, "takibi-chat");

        let decoded = Hello::decode(&hello.encode()).unwrap();
        assert_eq!(decoded, hello);
        assert_eq!(decoded.peer, "Alice-Host-1700000000");
    }

    #[test]
    fn test_hello_rejects_other_payloads() {
        assert!(Hello::decode(b"{\"type\":\"takibi_beacon\",\"peerID\":\"x\",\"serviceType\":\"y\"}").is_err());
        assert!(Hello::decode(b"junk").is_err());
    }
}
