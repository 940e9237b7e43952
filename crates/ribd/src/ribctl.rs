//! RIB snapshot control protocol.
//!
//! Datagram protocol between the RIB engine and the external
//! advertiser: the advertiser sends a REQUEST, the responder answers
//! with one REPLY frame per route entry and closes the stream with
//! ENDREPLY. Version-1 frames carry a two-byte header followed, for
//! REPLY, by one fixed-size serialized entry.

use crate::error::{Result, RibdError};
use crate::rib::Rib;
use crate::types::{RouteEntry, RouteOrigin, RoutePrefix};
use byteorder::{BigEndian, ReadBytesExt};
use chrono::Utc;
use std::io::Cursor;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::UnixDatagram;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub const CTL_VERSION_1: u8 = 0x01;

pub const MSGTYPE_REQUEST: u8 = 0x11;
pub const MSGTYPE_REPLY: u8 = 0x22;
pub const MSGTYPE_ENDREPLY: u8 = 0x23;

/// Maximum entries serialized per snapshot request.
pub const CTL_MAX_BUFFER: usize = 64;

const HEADER_LEN: usize = 2;
const ENTRY_LEN: usize = 27;

/// A decoded control frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CtlMessage {
    Request,
    Reply(RouteEntry),
    EndReply,
}

/// Encodes a frame to wire bytes.
pub fn encode(msg: &CtlMessage) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_LEN + ENTRY_LEN);
    buf.push(CTL_VERSION_1);
    match msg {
        CtlMessage::Request => buf.push(MSGTYPE_REQUEST),
        CtlMessage::EndReply => buf.push(MSGTYPE_ENDREPLY),
        CtlMessage::Reply(entry) => {
            buf.push(MSGTYPE_REPLY);
            encode_entry(&mut buf, entry);
        }
    }
    buf
}

fn encode_entry(buf: &mut Vec<u8>, entry: &RouteEntry) {
    buf.extend_from_slice(&u32::from(entry.prefix.addr).to_be_bytes());
    buf.extend_from_slice(&u32::from(entry.prefix.mask).to_be_bytes());
    buf.extend_from_slice(&u32::from(entry.next_hop).to_be_bytes());
    buf.extend_from_slice(&entry.metric.to_be_bytes());
    buf.extend_from_slice(&entry.tag.to_be_bytes());
    buf.push(match entry.origin {
        RouteOrigin::Local => 0,
        RouteOrigin::Remote => 1,
    });
    buf.extend_from_slice(&entry.last_update.to_be_bytes());
}

/// Decodes one datagram into a control frame.
pub fn decode(buf: &[u8]) -> Result<CtlMessage> {
    if buf.len() < HEADER_LEN {
        return Err(RibdError::Ctl(format!("short frame: {} bytes", buf.len())));
    }
    if buf[0] != CTL_VERSION_1 {
        return Err(RibdError::Ctl(format!("unsupported version: {:#04x}", buf[0])));
    }
    match buf[1] {
        MSGTYPE_REQUEST => Ok(CtlMessage::Request),
        MSGTYPE_ENDREPLY => Ok(CtlMessage::EndReply),
        MSGTYPE_REPLY => {
            let body = &buf[HEADER_LEN..];
            if body.len() < ENTRY_LEN {
                return Err(RibdError::Ctl(format!(
                    "truncated reply: {} of {ENTRY_LEN} entry bytes",
                    body.len()
                )));
            }
            Ok(CtlMessage::Reply(decode_entry(body)?))
        }
        other => Err(RibdError::Ctl(format!("unknown msgtype: {other:#04x}"))),
    }
}

fn decode_entry(body: &[u8]) -> Result<RouteEntry> {
    let mut cursor = Cursor::new(body);
    let addr = cursor.read_u32::<BigEndian>()?;
    let mask = cursor.read_u32::<BigEndian>()?;
    let next_hop = cursor.read_u32::<BigEndian>()?;
    let metric = cursor.read_u32::<BigEndian>()?;
    let tag = cursor.read_u16::<BigEndian>()?;
    let origin = match cursor.read_u8()? {
        0 => RouteOrigin::Local,
        1 => RouteOrigin::Remote,
        other => {
            return Err(RibdError::Ctl(format!("unknown origin: {other:#04x}")));
        }
    };
    let last_update = cursor.read_i64::<BigEndian>()?;

    Ok(RouteEntry {
        prefix: RoutePrefix::from_raw(addr, mask),
        next_hop: Ipv4Addr::from(next_hop),
        metric,
        origin,
        last_update,
        tag,
    })
}

/// Serves the control socket shared with the advertiser process.
///
/// Each REQUEST is answered from `Rib::serialize`, run through the
/// prefix filter, and closed with ENDREPLY. In passive mode the table
/// is withheld and only the end-of-stream marker goes out. Inbound
/// REPLY frames carry routes the advertiser learned from neighbors;
/// they are re-stamped at receive time and forwarded to the engine's
/// candidate queue.
pub struct SnapshotResponder {
    rib: Arc<Rib>,
    socket: UnixDatagram,
    path: PathBuf,
    passive: bool,
    candidates: mpsc::Sender<RouteEntry>,
}

impl SnapshotResponder {
    /// Binds the responder socket, replacing any stale socket file.
    pub fn bind(
        rib: Arc<Rib>,
        path: &Path,
        passive: bool,
        candidates: mpsc::Sender<RouteEntry>,
    ) -> Result<Self> {
        let _ = std::fs::remove_file(path);
        let socket = UnixDatagram::bind(path)?;
        info!(path = %path.display(), "control socket bound");
        Ok(Self {
            rib,
            socket,
            path: path.to_path_buf(),
            passive,
            candidates,
        })
    }

    pub fn local_path(&self) -> &Path {
        &self.path
    }

    /// Serves requests until the socket fails.
    pub async fn run(self) -> Result<()> {
        let mut buf = vec![0u8; HEADER_LEN + ENTRY_LEN];
        loop {
            let (len, peer) = self.socket.recv_from(&mut buf).await?;
            let Some(peer_path) = peer.as_pathname().map(Path::to_path_buf) else {
                warn!("request from unnamed peer, cannot reply");
                continue;
            };

            match decode(&buf[..len]) {
                Ok(CtlMessage::Request) => {
                    debug!(peer = %peer_path.display(), "snapshot request");
                    self.send_snapshot(&peer_path).await;
                }
                Ok(CtlMessage::Reply(entry)) => {
                    let candidate = RouteEntry::remote(
                        entry.prefix,
                        entry.next_hop,
                        entry.metric,
                        entry.tag,
                        Utc::now().timestamp(),
                    );
                    if self.candidates.try_send(candidate).is_err() {
                        warn!(route = %entry, "candidate queue full, dropping");
                    }
                }
                Ok(CtlMessage::EndReply) => {
                    debug!("ignoring stray end-of-stream frame");
                }
                Err(e) => {
                    warn!(error = %e, "malformed control frame");
                }
            }
        }
    }

    /// Streams the whole table to one peer, paging `CTL_MAX_BUFFER`
    /// entries at a time, then closes with ENDREPLY. A failed send
    /// (the peer's socket may be gone by reply time) abandons this
    /// stream but never the serve loop.
    async fn send_snapshot(&self, peer: &Path) {
        let mut sent = 0usize;
        if !self.passive {
            let mut offset = 0;
            loop {
                let page = self.rib.serialize_page(offset, CTL_MAX_BUFFER);
                if page.is_empty() {
                    break;
                }
                offset += page.len();
                for entry in page {
                    if !self.rib.filter_allows(&entry.prefix) {
                        debug!(route = %entry, "filtered from snapshot reply");
                        continue;
                    }
                    if let Err(e) = self
                        .socket
                        .send_to(&encode(&CtlMessage::Reply(entry)), peer)
                        .await
                    {
                        warn!(peer = %peer.display(), error = %e, "snapshot send failed");
                        return;
                    }
                    sent += 1;
                }
            }
        }
        if let Err(e) = self
            .socket
            .send_to(&encode(&CtlMessage::EndReply), peer)
            .await
        {
            warn!(peer = %peer.display(), error = %e, "end-of-stream send failed");
            return;
        }
        debug!(sent, "snapshot stream closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn entry() -> RouteEntry {
        RouteEntry::remote(
            RoutePrefix::new(
                Ipv4Addr::new(10, 0, 0, 0),
                Ipv4Addr::new(255, 255, 255, 0),
            ),
            Ipv4Addr::new(192, 168, 1, 1),
            2,
            7,
            1234,
        )
    }

    #[test]
    fn test_request_and_endreply_round_trip() {
        assert_eq!(
            decode(&encode(&CtlMessage::Request)).unwrap(),
            CtlMessage::Request
        );
        assert_eq!(
            decode(&encode(&CtlMessage::EndReply)).unwrap(),
            CtlMessage::EndReply
        );
    }

    #[test]
    fn test_reply_round_trip_preserves_entry() {
        let msg = CtlMessage::Reply(entry());
        let bytes = encode(&msg);
        assert_eq!(bytes.len(), HEADER_LEN + ENTRY_LEN);
        assert_eq!(decode(&bytes).unwrap(), msg);
    }

    #[test]
    fn test_local_origin_round_trips() {
        let local = RouteEntry::local(entry().prefix, 99);
        let decoded = decode(&encode(&CtlMessage::Reply(local.clone()))).unwrap();
        assert_eq!(decoded, CtlMessage::Reply(local));
    }

    #[test]
    fn test_decode_rejects_short_frame() {
        assert!(matches!(decode(&[]), Err(RibdError::Ctl(_))));
        assert!(matches!(decode(&[CTL_VERSION_1]), Err(RibdError::Ctl(_))));
    }

    #[test]
    fn test_decode_rejects_unknown_version() {
        let err = decode(&[0x02, MSGTYPE_REQUEST]).unwrap_err();
        assert!(matches!(err, RibdError::Ctl(_)));
    }

    #[test]
    fn test_decode_rejects_truncated_reply() {
        let mut bytes = encode(&CtlMessage::Reply(entry()));
        bytes.truncate(bytes.len() - 1);
        assert!(matches!(decode(&bytes), Err(RibdError::Ctl(_))));
    }

    #[test]
    fn test_decode_rejects_unknown_msgtype() {
        let err = decode(&[CTL_VERSION_1, 0x99]).unwrap_err();
        assert!(matches!(err, RibdError::Ctl(_)));
    }

    #[tokio::test]
    async fn test_responder_serves_filtered_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let rib_path = dir.path().join("rib.sock");
        let client_path = dir.path().join("client.sock");

        let rib = Arc::new(Rib::in_memory());
        rib.merge(entry());

        let (tx, _rx) = mpsc::channel(8);
        let responder = SnapshotResponder::bind(rib, &rib_path, false, tx).unwrap();
        let server = tokio::spawn(responder.run());

        let client = UnixDatagram::bind(&client_path).unwrap();
        client
            .send_to(&encode(&CtlMessage::Request), &rib_path)
            .await
            .unwrap();

        let mut buf = vec![0u8; 64];
        let (len, _) = client.recv_from(&mut buf).await.unwrap();
        assert_eq!(decode(&buf[..len]).unwrap(), CtlMessage::Reply(entry()));

        let (len, _) = client.recv_from(&mut buf).await.unwrap();
        assert_eq!(decode(&buf[..len]).unwrap(), CtlMessage::EndReply);

        server.abort();
    }

    #[tokio::test]
    async fn test_passive_responder_sends_endreply_only() {
        let dir = tempfile::tempdir().unwrap();
        let rib_path = dir.path().join("rib.sock");
        let client_path = dir.path().join("client.sock");

        let rib = Arc::new(Rib::in_memory());
        rib.merge(entry());

        let (tx, _rx) = mpsc::channel(8);
        let responder = SnapshotResponder::bind(rib, &rib_path, true, tx).unwrap();
        let server = tokio::spawn(responder.run());

        let client = UnixDatagram::bind(&client_path).unwrap();
        client
            .send_to(&encode(&CtlMessage::Request), &rib_path)
            .await
            .unwrap();

        let mut buf = vec![0u8; 64];
        let (len, _) = client.recv_from(&mut buf).await.unwrap();
        assert_eq!(decode(&buf[..len]).unwrap(), CtlMessage::EndReply);

        server.abort();
    }

    #[tokio::test]
    async fn test_snapshot_streams_tables_larger_than_one_page() {
        let dir = tempfile::tempdir().unwrap();
        let rib_path = dir.path().join("rib.sock");
        let client_path = dir.path().join("client.sock");

        let rib = Arc::new(Rib::in_memory());
        for third in 0..70u8 {
            rib.merge(RouteEntry::remote(
                RoutePrefix::new(
                    Ipv4Addr::new(10, 0, third, 0),
                    Ipv4Addr::new(255, 255, 255, 0),
                ),
                Ipv4Addr::new(192, 168, 1, 1),
                2,
                0,
                100,
            ));
        }

        let (tx, _rx) = mpsc::channel(8);
        let responder = SnapshotResponder::bind(rib, &rib_path, false, tx).unwrap();
        let server = tokio::spawn(responder.run());

        let client = UnixDatagram::bind(&client_path).unwrap();
        client
            .send_to(&encode(&CtlMessage::Request), &rib_path)
            .await
            .unwrap();

        let mut replies = 0;
        let mut buf = vec![0u8; 64];
        loop {
            let (len, _) = client.recv_from(&mut buf).await.unwrap();
            match decode(&buf[..len]).unwrap() {
                CtlMessage::Reply(_) => replies += 1,
                CtlMessage::EndReply => break,
                CtlMessage::Request => panic!("unexpected request frame"),
            }
        }
        assert_eq!(replies, 70);

        server.abort();
    }

    #[tokio::test]
    async fn test_responder_survives_vanished_peer() {
        let dir = tempfile::tempdir().unwrap();
        let rib_path = dir.path().join("rib.sock");

        let rib = Arc::new(Rib::in_memory());
        rib.merge(entry());

        let (tx, _rx) = mpsc::channel(8);
        let responder = SnapshotResponder::bind(rib, &rib_path, false, tx).unwrap();
        let server = tokio::spawn(responder.run());

        // First requester is gone by the time its reply goes out.
        let gone_path = dir.path().join("gone.sock");
        let gone = UnixDatagram::bind(&gone_path).unwrap();
        gone.send_to(&encode(&CtlMessage::Request), &rib_path)
            .await
            .unwrap();
        drop(gone);
        std::fs::remove_file(&gone_path).unwrap();

        // A later requester still gets the full stream.
        let client_path = dir.path().join("client.sock");
        let client = UnixDatagram::bind(&client_path).unwrap();
        client
            .send_to(&encode(&CtlMessage::Request), &rib_path)
            .await
            .unwrap();

        let mut buf = vec![0u8; 64];
        let (len, _) = client.recv_from(&mut buf).await.unwrap();
        assert_eq!(decode(&buf[..len]).unwrap(), CtlMessage::Reply(entry()));
        let (len, _) = client.recv_from(&mut buf).await.unwrap();
        assert_eq!(decode(&buf[..len]).unwrap(), CtlMessage::EndReply);

        server.abort();
    }

    #[tokio::test]
    async fn test_inbound_reply_becomes_candidate() {
        let dir = tempfile::tempdir().unwrap();
        let rib_path = dir.path().join("rib.sock");
        let client_path = dir.path().join("client.sock");

        let (tx, mut rx) = mpsc::channel(8);
        let responder =
            SnapshotResponder::bind(Arc::new(Rib::in_memory()), &rib_path, false, tx).unwrap();
        let server = tokio::spawn(responder.run());

        let client = UnixDatagram::bind(&client_path).unwrap();
        client
            .send_to(&encode(&CtlMessage::Reply(entry())), &rib_path)
            .await
            .unwrap();

        let candidate = rx.recv().await.unwrap();
        assert_eq!(candidate.prefix, entry().prefix);
        assert_eq!(candidate.next_hop, entry().next_hop);
        assert_eq!(candidate.origin, RouteOrigin::Remote);

        server.abort();
    }
}
