use crate::codec::Message;
use crate::ErrorSink;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};
use watchdog_common::{Cluster, NodeId, Result, WatchdogError};

/// Receive buffer size. Valid datagrams are 4 bytes; anything that fills
/// more than this is oversized garbage and fails decoding either way.
const RECV_BUFFER: usize = 8;

/// UDP send/receive with a runtime-mutable peer blacklist.
///
/// The blacklist filters both directions (receives by the decoded source
/// id, sends by the target member), so a single operator command simulates
/// a full cut between two peers. Sends run on spawned tasks; a slow
/// resolution or a full socket buffer never stalls the election loop.
#[derive(Debug)]
pub struct NetworkAdapter {
    socket: Arc<UdpSocket>,
    cluster: Cluster,
    blacklist: RwLock<HashSet<NodeId>>,
    errors: ErrorSink,
}

impl NetworkAdapter {
    pub async fn bind(cluster: Cluster, listen_on: &str, errors: ErrorSink) -> Result<Arc<Self>> {
        let socket = UdpSocket::bind(listen_on)
            .await
            .map_err(|source| WatchdogError::BindFailed {
                addr: listen_on.to_string(),
                source,
            })?;

        Ok(Arc::new(Self {
            socket: Arc::new(socket),
            cluster,
            blacklist: RwLock::new(HashSet::new()),
            errors,
        }))
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Start the background receive loop. Each decoded, non-blacklisted
    /// message is handed to `on_message`; malformed datagrams and suppressed
    /// senders go to the error channel instead.
    pub fn listen(self: &Arc<Self>, on_message: impl Fn(Message) + Send + 'static) -> JoinHandle<()> {
        let adapter = self.clone();

        tokio::spawn(async move {
            let mut buf = [0u8; RECV_BUFFER];

            loop {
                let (len, from) = match adapter.socket.recv_from(&mut buf).await {
                    Ok(received) => received,
                    Err(e) => {
                        warn!("UDP receive failed: {e}");
                        continue;
                    }
                };

                let msg = match Message::decode(&buf[..len]) {
                    Ok(msg) => msg,
                    Err(e) => {
                        adapter.errors.report(e);
                        continue;
                    }
                };

                if adapter.is_blacklisted(msg.source) {
                    adapter.errors.report(WatchdogError::Blacklisted(msg.source));
                    continue;
                }

                trace!("received {len} bytes ({msg}) from {from}");
                on_message(msg);
            }
        })
    }

    /// Send one datagram to a cluster member, off the election loop.
    /// Failures are reported on the error channel; none of them matter to
    /// the state machine.
    pub fn send(&self, target: NodeId, msg: Message) {
        let Some(member) = self.cluster.member(target) else {
            self.errors.report(WatchdogError::UnknownPeer(target));
            return;
        };

        if self.is_blacklisted(target) {
            self.errors.report(WatchdogError::Blacklisted(target));
            return;
        }

        let addr = member.udp_addr.clone();
        let socket = self.socket.clone();
        let errors = self.errors.clone();

        tokio::spawn(async move {
            // Resolution happens here so a slow DNS lookup cannot stall the
            // serialized queue.
            let resolved = match tokio::net::lookup_host(&addr).await {
                Ok(mut addrs) => addrs.next(),
                Err(e) => {
                    errors.report(WatchdogError::SendFailed {
                        addr: addr.clone(),
                        reason: e.to_string(),
                    });
                    return;
                }
            };

            let Some(resolved) = resolved else {
                errors.report(WatchdogError::SendFailed {
                    addr: addr.clone(),
                    reason: "address resolved to nothing".into(),
                });
                return;
            };

            match socket.send_to(&msg.encode(), resolved).await {
                Ok(n) => trace!("sent {n} bytes ({msg}) to {resolved}"),
                Err(e) => errors.report(WatchdogError::SendFailed {
                    addr,
                    reason: e.to_string(),
                }),
            }
        });
    }

    pub fn blacklist_add(&self, id: NodeId) {
        if self.blacklist.write().insert(id) {
            debug!("blacklisted peer {id}");
        }
    }

    pub fn blacklist_remove(&self, id: NodeId) {
        if self.blacklist.write().remove(&id) {
            debug!("whitelisted peer {id}");
        }
    }

    pub fn is_blacklisted(&self, id: NodeId) -> bool {
        self.blacklist.read().contains(&id)
    }

    /// Snapshot of the blacklist, in id order, for the diagnostic report.
    pub fn blacklist(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.blacklist.read().iter().copied().collect();
        ids.sort_unstable();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::MessageKind;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use watchdog_common::ClusterMember;

    fn msg(source: u8) -> Message {
        Message {
            source: NodeId::new(source),
            term: 1,
            kind: MessageKind::Heartbeat,
            leader: Some(NodeId::new(source)),
        }
    }

    fn member(id: u8, udp_addr: String) -> ClusterMember {
        ClusterMember {
            id: NodeId::new(id),
            udp_addr,
            http_addr: "127.0.0.1:0".into(),
        }
    }

    async fn recv_with_timeout(socket: &UdpSocket) -> Option<Vec<u8>> {
        let mut buf = [0u8; 16];
        match tokio::time::timeout(Duration::from_millis(200), socket.recv(&mut buf)).await {
            Ok(Ok(n)) => Some(buf[..n].to_vec()),
            _ => None,
        }
    }

    #[tokio::test]
    async fn test_send_respects_blacklist() {
        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let peer_addr = peer.local_addr().unwrap();

        let cluster = Cluster::new(vec![
            member(1, "127.0.0.1:0".into()),
            member(2, peer_addr.to_string()),
        ])
        .unwrap();

        let (errors, mut error_rx) = ErrorSink::channel();
        let adapter = NetworkAdapter::bind(cluster, "127.0.0.1:0", errors)
            .await
            .unwrap();

        adapter.send(NodeId::new(2), msg(1));
        assert_eq!(recv_with_timeout(&peer).await, Some(msg(1).encode().to_vec()));

        adapter.blacklist_add(NodeId::new(2));
        adapter.send(NodeId::new(2), msg(1));
        assert_eq!(recv_with_timeout(&peer).await, None);
        assert!(matches!(
            error_rx.recv().await,
            Some(WatchdogError::Blacklisted(id)) if id == NodeId::new(2)
        ));

        // Removing the id restores delivery as if it was never added.
        adapter.blacklist_remove(NodeId::new(2));
        adapter.send(NodeId::new(2), msg(1));
        assert_eq!(recv_with_timeout(&peer).await, Some(msg(1).encode().to_vec()));
    }

    #[tokio::test]
    async fn test_send_to_unknown_peer_is_reported() {
        let cluster = Cluster::new(vec![member(1, "127.0.0.1:0".into())]).unwrap();
        let (errors, mut error_rx) = ErrorSink::channel();
        let adapter = NetworkAdapter::bind(cluster, "127.0.0.1:0", errors)
            .await
            .unwrap();

        adapter.send(NodeId::new(9), msg(1));
        assert!(matches!(
            error_rx.recv().await,
            Some(WatchdogError::UnknownPeer(id)) if id == NodeId::new(9)
        ));
    }

    #[tokio::test]
    async fn test_receive_filters_blacklisted_source() {
        let cluster = Cluster::new(vec![
            member(1, "127.0.0.1:0".into()),
            member(2, "127.0.0.1:0".into()),
        ])
        .unwrap();

        let (errors, mut error_rx) = ErrorSink::channel();
        let adapter = NetworkAdapter::bind(cluster, "127.0.0.1:0", errors)
            .await
            .unwrap();
        let adapter_addr = adapter.local_addr().unwrap();

        let (msg_tx, mut msg_rx) = mpsc::unbounded_channel();
        let _listener = adapter.listen(move |m| {
            msg_tx.send(m).unwrap();
        });

        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        peer.send_to(&msg(2).encode(), adapter_addr).await.unwrap();
        assert_eq!(
            tokio::time::timeout(Duration::from_millis(500), msg_rx.recv())
                .await
                .unwrap(),
            Some(msg(2))
        );

        adapter.blacklist_add(NodeId::new(2));
        peer.send_to(&msg(2).encode(), adapter_addr).await.unwrap();
        assert!(matches!(
            tokio::time::timeout(Duration::from_millis(500), error_rx.recv())
                .await
                .unwrap(),
            Some(WatchdogError::Blacklisted(id)) if id == NodeId::new(2)
        ));

        adapter.blacklist_remove(NodeId::new(2));
        peer.send_to(&msg(2).encode(), adapter_addr).await.unwrap();
        assert_eq!(
            tokio::time::timeout(Duration::from_millis(500), msg_rx.recv())
                .await
                .unwrap(),
            Some(msg(2))
        );
    }

    #[tokio::test]
    async fn test_malformed_datagram_is_reported() {
        let cluster = Cluster::new(vec![member(1, "127.0.0.1:0".into())]).unwrap();
        let (errors, mut error_rx) = ErrorSink::channel();
        let adapter = NetworkAdapter::bind(cluster, "127.0.0.1:0", errors)
            .await
            .unwrap();
        let adapter_addr = adapter.local_addr().unwrap();

        let _listener = adapter.listen(|_| panic!("malformed datagram must not decode"));

        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        peer.send_to(&[1, 2, 3], adapter_addr).await.unwrap();

        assert!(matches!(
            tokio::time::timeout(Duration::from_millis(500), error_rx.recv())
                .await
                .unwrap(),
            Some(WatchdogError::MalformedDatagram { len: 3, .. })
        ));
    }

    #[tokio::test]
    async fn test_bind_failure() {
        let cluster = Cluster::new(vec![member(1, "127.0.0.1:0".into())]).unwrap();
        let (errors, _error_rx) = ErrorSink::channel();

        let err = NetworkAdapter::bind(cluster, "256.0.0.1:99999", errors)
            .await
            .unwrap_err();
        assert!(matches!(err, WatchdogError::BindFailed { .. }));
    }
}
