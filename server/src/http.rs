use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use watchdog_cluster::{ElectionNode, NetworkAdapter, QueueHandle, StatusSnapshot};
use watchdog_common::NodeId;

/// Everything the diagnostic endpoints read or touch. The endpoints never
/// block the election loop: reads come from atomic snapshots, mutations are
/// enqueued like any other event.
#[derive(Clone)]
pub struct DiagnosticState {
    pub queue: QueueHandle<ElectionNode>,
    pub status: watch::Receiver<StatusSnapshot>,
    pub adapter: Arc<NetworkAdapter>,
    pub process_running: Arc<AtomicBool>,
}

/// JSON body of `GET /state`.
#[derive(Serialize)]
struct StatusReport {
    #[serde(flatten)]
    snapshot: StatusSnapshot,
    blacklist: Vec<NodeId>,
    process: bool,
}

#[derive(Deserialize)]
struct IdQuery {
    id: u8,
}

pub fn router(state: DiagnosticState) -> Router {
    Router::new()
        .route("/state", get(report_state))
        .route("/blacklist", get(blacklist_peer))
        .route("/whitelist", get(whitelist_peer))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn report_state(State(diag): State<DiagnosticState>) -> Json<StatusReport> {
    let snapshot = diag.status.borrow().clone();

    Json(StatusReport {
        snapshot,
        blacklist: diag.adapter.blacklist(),
        process: diag.process_running.load(Ordering::SeqCst),
    })
}

async fn blacklist_peer(
    State(diag): State<DiagnosticState>,
    Query(query): Query<IdQuery>,
) -> StatusCode {
    let Some(id) = NodeId::from_wire(query.id) else {
        return StatusCode::BAD_REQUEST;
    };

    diag.queue
        .enqueue(move |node: &mut ElectionNode| node.blacklist_add(id));
    StatusCode::OK
}

async fn whitelist_peer(
    State(diag): State<DiagnosticState>,
    Query(query): Query<IdQuery>,
) -> StatusCode {
    let Some(id) = NodeId::from_wire(query.id) else {
        return StatusCode::BAD_REQUEST;
    };

    diag.queue
        .enqueue(move |node: &mut ElectionNode| node.blacklist_remove(id));
    StatusCode::OK
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use std::time::Duration;
    use tower::util::ServiceExt;
    use watchdog_cluster::{start_node, ElectionTimings, ErrorSink, NodeRuntime};
    use watchdog_common::{Cluster, ClusterMember};

    async fn diagnostic_fixture() -> (Router, NodeRuntime) {
        let member = |raw: u8| ClusterMember {
            id: NodeId::new(raw),
            udp_addr: "127.0.0.1:0".into(),
            http_addr: "127.0.0.1:0".into(),
        };
        let cluster = Cluster::new(vec![member(1), member(2), member(3)]).unwrap();

        let (errors, _error_rx) = ErrorSink::channel();
        let timings = ElectionTimings {
            min_election_timeout: Duration::from_secs(60),
            max_election_timeout: Duration::from_secs(120),
            network_interval: Duration::from_secs(60),
            heartbeat_interval: Duration::from_secs(30),
        };
        let runtime = start_node(NodeId::new(1), cluster, timings, "127.0.0.1:0", errors)
            .await
            .unwrap();

        let state = DiagnosticState {
            queue: runtime.queue.clone(),
            status: runtime.status.clone(),
            adapter: runtime.adapter.clone(),
            process_running: Arc::new(AtomicBool::new(false)),
        };

        (router(state), runtime)
    }

    async fn get(router: &Router, uri: &str) -> StatusCode {
        router
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn test_state_report() {
        let (router, runtime) = diagnostic_fixture().await;

        let response = router
            .clone()
            .oneshot(Request::builder().uri("/state").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let report: serde_json::Value = serde_json::from_slice(&body).unwrap();

        assert_eq!(report["id"], 1);
        assert!(report["state"].is_string());
        assert_eq!(report["currentTerm"], 0);
        assert_eq!(report["process"], false);
        assert!(report["blacklist"].as_array().unwrap().is_empty());
        assert!(report["events"].is_array());

        runtime.kill();
    }

    #[tokio::test]
    async fn test_blacklist_round_trip() {
        let (router, runtime) = diagnostic_fixture().await;

        assert_eq!(get(&router, "/blacklist?id=2").await, StatusCode::OK);

        // The mutation is enqueued; give the consumer a moment.
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while !runtime.adapter.is_blacklisted(NodeId::new(2)) {
            assert!(tokio::time::Instant::now() < deadline, "blacklist never applied");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(get(&router, "/whitelist?id=2").await, StatusCode::OK);
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while runtime.adapter.is_blacklisted(NodeId::new(2)) {
            assert!(tokio::time::Instant::now() < deadline, "whitelist never applied");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        runtime.kill();
    }

    #[tokio::test]
    async fn test_bad_requests() {
        let (router, runtime) = diagnostic_fixture().await;

        assert_eq!(get(&router, "/blacklist").await, StatusCode::BAD_REQUEST);
        assert_eq!(get(&router, "/blacklist?id=oops").await, StatusCode::BAD_REQUEST);
        assert_eq!(get(&router, "/blacklist?id=900").await, StatusCode::BAD_REQUEST);
        assert_eq!(get(&router, "/blacklist?id=0").await, StatusCode::BAD_REQUEST);
        assert_eq!(get(&router, "/whitelist?id=0").await, StatusCode::BAD_REQUEST);
        assert_eq!(get(&router, "/nope").await, StatusCode::NOT_FOUND);

        runtime.kill();
    }
}
