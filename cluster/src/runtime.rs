use crate::adapter::NetworkAdapter;
use crate::node::{ElectionNode, ElectionTimings, StatusSnapshot};
use crate::queue::{QueueHandle, SerialQueue};
use crate::ErrorSink;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;
use watchdog_common::{Cluster, NodeId, Result};

/// Handles to a wired, running election node.
pub struct NodeRuntime {
    pub queue: QueueHandle<ElectionNode>,
    pub status: watch::Receiver<StatusSnapshot>,
    pub adapter: Arc<NetworkAdapter>,
    pub consumer: JoinHandle<()>,
    pub listener: JoinHandle<()>,
}

impl NodeRuntime {
    /// Tear the node down, as an external failure would: nothing is
    /// flushed, peers just stop hearing from it.
    pub fn kill(&self) {
        self.consumer.abort();
        self.listener.abort();
    }
}

/// Bind the socket, wire the queue, the adapter and the state machine
/// together, and activate the node.
pub async fn start_node(
    id: NodeId,
    cluster: Cluster,
    timings: ElectionTimings,
    listen_on: &str,
    errors: ErrorSink,
) -> Result<NodeRuntime> {
    cluster.require_member(id)?;

    let adapter = NetworkAdapter::bind(cluster.clone(), listen_on, errors).await?;
    info!(%id, addr = ?adapter.local_addr(), "listening for cluster traffic");

    let (queue, consumer_queue) = SerialQueue::channel();
    let (status_tx, status) = watch::channel(StatusSnapshot::initial(id));

    let node = ElectionNode::new(id, cluster, timings, adapter.clone(), queue.clone(), status_tx);
    let consumer = consumer_queue.spawn(node);

    let listener = adapter.listen({
        let queue = queue.clone();
        move |msg| queue.enqueue(move |node: &mut ElectionNode| node.handle_message(msg))
    });

    queue.enqueue(|node: &mut ElectionNode| node.activate());

    Ok(NodeRuntime {
        queue,
        status,
        adapter,
        consumer,
        listener,
    })
}
