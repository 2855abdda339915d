use crate::adapter::NetworkAdapter;
use crate::ballot::Ballot;
use crate::codec::{Message, MessageKind};
use crate::events::{EventLog, EventRecord};
use crate::queue::QueueHandle;
use crate::timers::{Schedule, Timer, TimerSet};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, trace};
use watchdog_common::{Cluster, NodeId, Term, WatchdogConfig};

/// Election lifecycle of a node.
///
/// `Created` only exists between construction and the end of wiring; after
/// that the node cycles among the remaining states until the process dies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeState {
    Created,
    Idle,
    Following,
    Leading,
    Election,
}

impl std::fmt::Display for NodeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            NodeState::Created => "created",
            NodeState::Idle => "idle",
            NodeState::Following => "following",
            NodeState::Leading => "leading",
            NodeState::Election => "election",
        };
        write!(f, "{name}")
    }
}

/// Consistent copy of the observable node state, published on a watch
/// channel after every handled event. The process supervisor and the
/// diagnostic endpoint read these; neither ever touches the live state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub id: NodeId,
    pub state: NodeState,
    pub leader: Option<NodeId>,
    pub voted_for: Option<NodeId>,
    pub current_term: Term,
    pub can_run_process: bool,
    pub events: Vec<EventRecord>,
}

impl StatusSnapshot {
    pub fn initial(id: NodeId) -> Self {
        Self {
            id,
            state: NodeState::Created,
            leader: None,
            voted_for: None,
            current_term: 0,
            can_run_process: false,
            events: Vec::new(),
        }
    }
}

/// The four intervals that drive the timer set.
#[derive(Debug, Clone, Copy)]
pub struct ElectionTimings {
    pub min_election_timeout: Duration,
    pub max_election_timeout: Duration,
    pub network_interval: Duration,
    pub heartbeat_interval: Duration,
}

impl ElectionTimings {
    pub fn from_config(config: &WatchdogConfig) -> Self {
        Self {
            min_election_timeout: config.min_election_timeout(),
            max_election_timeout: config.max_election_timeout(),
            network_interval: config.network_interval(),
            heartbeat_interval: config.heartbeat_interval(),
        }
    }
}

/// The per-node election state machine.
///
/// All methods run on the serialized queue, one at a time; timers and the
/// receive loop only ever enqueue calls to them. Timer callbacks re-check
/// state on entry because cancellation is best-effort.
pub struct ElectionNode {
    id: NodeId,
    cluster: Cluster,
    state: NodeState,
    current_term: Term,
    voted_for: Option<NodeId>,
    leader: Option<NodeId>,
    votes: Ballot,
    heartbeats: Ballot,
    can_run_process: bool,
    timers: TimerSet<ElectionNode>,
    adapter: Arc<NetworkAdapter>,
    events: EventLog,
    status: watch::Sender<StatusSnapshot>,
}

impl ElectionNode {
    pub fn new(
        id: NodeId,
        cluster: Cluster,
        timings: ElectionTimings,
        adapter: Arc<NetworkAdapter>,
        queue: QueueHandle<ElectionNode>,
        status: watch::Sender<StatusSnapshot>,
    ) -> Self {
        let election_window = Schedule::Jittered {
            min: timings.min_election_timeout,
            max: timings.max_election_timeout,
        };
        let network = Schedule::Fixed(timings.network_interval);

        let timers = TimerSet {
            election: Timer::new(queue.clone(), election_window, false, |node: &mut ElectionNode| {
                node.on_election_timeout()
            }),
            leadership_aware: Timer::new(queue.clone(), network, false, |node: &mut ElectionNode| {
                node.on_leadership_aware_timeout()
            }),
            heartbeat: Timer::new(
                queue.clone(),
                Schedule::Fixed(timings.heartbeat_interval),
                true,
                |node: &mut ElectionNode| node.on_heartbeat_interval(),
            ),
            leadership_grace: Timer::new(queue.clone(), network, false, |node: &mut ElectionNode| {
                node.on_leadership_grace_timeout()
            }),
            leadership: Timer::new(queue, network, false, |node: &mut ElectionNode| {
                node.on_leadership_timeout()
            }),
        };

        let votes = Ballot::new(cluster.ids());
        let heartbeats = votes.clone();

        Self {
            id,
            cluster,
            state: NodeState::Created,
            current_term: 0,
            voted_for: None,
            leader: None,
            votes,
            heartbeats,
            can_run_process: false,
            timers,
            adapter,
            events: EventLog::new(),
            status,
        }
    }

    /// Leave `Created` once wiring is complete. Enqueued as the first task.
    pub fn activate(&mut self) {
        info!(id = %self.id, "node activating");
        self.record("node started");
        self.transition(NodeState::Idle);
        self.publish();
    }

    /// Entry point for every decoded, non-blacklisted datagram.
    pub fn handle_message(&mut self, msg: Message) {
        // The listener may beat the activation task onto the queue.
        if self.state == NodeState::Created {
            trace!("ignoring message before activation");
            return;
        }

        if msg.term < self.current_term {
            trace!("dropping stale message ({msg}), current term {}", self.current_term);
            return;
        }

        // An unrecognized type must not change any state, term included.
        if let MessageKind::Unknown(raw) = msg.kind {
            trace!("dropping message of unknown type {raw:#04x} from {}", msg.source);
            return;
        }

        // Vote requests defer term adoption to the eligibility check in
        // their handler; everything else adopts a newer term right away.
        if msg.term > self.current_term && msg.kind != MessageKind::VoteRequest {
            self.adopt_term(msg.term);
        }

        match msg.kind {
            MessageKind::Heartbeat => self.handle_heartbeat(msg),
            MessageKind::VoteRequest => self.handle_vote_request(msg),
            MessageKind::Vote => self.handle_vote(msg),
            MessageKind::Unknown(_) => unreachable!("filtered above"),
        }

        self.publish();
    }

    /// Adopt a newer term: forget the old vote and leader, invalidate any
    /// accumulated votes. Deliberately no state transition; a node only
    /// starts following once the new leader's own heartbeat confirms it.
    fn adopt_term(&mut self, term: Term) {
        debug!(from = self.current_term, to = term, "adopting newer term");
        self.current_term = term;
        self.voted_for = None;
        self.leader = None;
        self.votes.reset();
    }

    fn handle_heartbeat(&mut self, msg: Message) {
        if self.state == NodeState::Leading {
            // Only acks addressed to this leadership count; a follower still
            // heartbeating some other leader must not extend ours.
            if msg.leader != Some(self.id) {
                return;
            }

            self.heartbeats.vote(msg.source);
            trace!("follower heartbeat from {}", msg.source);

            if self.heartbeats.is_majority() {
                // Majority confirmed: open a fresh confirmation window.
                self.timers.leadership.start();
                self.heartbeats.reset();
                self.heartbeats.vote(self.id);
            }
            return;
        }

        // Accept leadership claims first-hand only: the sender must itself
        // be the leader it announces.
        let Some(claimed) = msg.leader else { return };
        if claimed != msg.source {
            return;
        }

        if self.state == NodeState::Following && self.leader == Some(msg.source) {
            self.timers.leadership_aware.start();
            return;
        }

        info!(leader = %msg.source, term = msg.term, "detected leader");
        self.record(format!("detected leader {}", msg.source));
        self.transition(NodeState::Following);
        self.leader = Some(msg.source);
    }

    fn handle_vote_request(&mut self, msg: Message) {
        // A node that is following a live leader (or leading) ignores
        // campaigns outright, term bump included. This suppresses churn
        // from isolated candidates: a cut-off peer can escalate its term
        // forever without destabilizing a healthy leader's cluster.
        if !matches!(self.state, NodeState::Idle | NodeState::Election) {
            return;
        }

        if msg.term > self.current_term {
            self.adopt_term(msg.term);
        }

        if self.voted_for.is_some() {
            return;
        }

        if !self.cluster.contains(msg.source) {
            trace!("ignoring vote request from non-member {}", msg.source);
            return;
        }

        self.voted_for = Some(msg.source);
        self.record(format!("granted vote to {}", msg.source));
        self.send(msg.source, MessageKind::Vote);
    }

    fn handle_vote(&mut self, msg: Message) {
        if self.state != NodeState::Election {
            return;
        }

        self.votes.vote(msg.source);
        trace!("vote from {}, tally {:?}", msg.source, self.votes.granted());

        if self.votes.is_majority() {
            info!(term = self.current_term, "won election");
            self.record(format!("became leader for term {}", self.current_term));
            self.transition(NodeState::Leading);
        }
    }

    /// Election window elapsed without hearing a leader (or without winning
    /// the vote): start a new election in a fresh term.
    pub fn on_election_timeout(&mut self) {
        if !matches!(self.state, NodeState::Idle | NodeState::Election) {
            return;
        }

        self.transition(NodeState::Election);
        self.current_term = self.current_term.wrapping_add(1);
        self.voted_for = Some(self.id);
        self.votes.vote(self.id);
        info!(term = self.current_term, "starting election");
        self.record("starting election");
        self.broadcast(MessageKind::VoteRequest);
        self.publish();
    }

    /// No heartbeat from the leader within one network interval.
    pub fn on_leadership_aware_timeout(&mut self) {
        if self.state != NodeState::Following {
            return;
        }

        info!("lost sight of leader");
        self.record("lost sight of leader");
        self.transition(NodeState::Idle);
        self.publish();
    }

    /// Periodic heartbeat: followers confirm membership to their leader,
    /// leaders assert liveness to everyone.
    pub fn on_heartbeat_interval(&mut self) {
        match self.state {
            NodeState::Following => {
                if let Some(leader) = self.leader {
                    self.send(leader, MessageKind::Heartbeat);
                }
            }
            NodeState::Leading => self.broadcast(MessageKind::Heartbeat),
            _ => {}
        }
    }

    /// Leadership has survived one full network interval; the gated process
    /// may now run here.
    pub fn on_leadership_grace_timeout(&mut self) {
        if self.state != NodeState::Leading {
            return;
        }

        info!("leadership grace elapsed, releasing the process gate");
        self.record("process gate opened");
        self.can_run_process = true;
        self.publish();
    }

    /// A majority of followers failed to ack within the confirmation
    /// window: step down.
    pub fn on_leadership_timeout(&mut self) {
        if self.state != NodeState::Leading {
            return;
        }

        info!("leadership not confirmed by majority, stepping down");
        self.record("lost leadership");
        self.transition(NodeState::Idle);
        self.publish();
    }

    /// Diagnostic fault injection: cut a peer in both directions.
    pub fn blacklist_add(&mut self, id: NodeId) {
        self.adapter.blacklist_add(id);
        self.record(format!("blacklisted {id}"));
        self.publish();
    }

    pub fn blacklist_remove(&mut self, id: NodeId) {
        self.adapter.blacklist_remove(id);
        self.record(format!("whitelisted {id}"));
        self.publish();
    }

    /// The transition procedure: stop every timer, clear the per-state
    /// bookkeeping, then arm exactly the timers the target state runs.
    fn transition(&mut self, target: NodeState) {
        self.timers.stop_all();

        self.leader = None;
        self.votes.reset();
        self.heartbeats.reset();
        self.can_run_process = false;

        debug!(from = %self.state, to = %target, "transition");
        self.state = target;

        match target {
            NodeState::Created => {}
            NodeState::Idle => {
                self.timers.election.start();
            }
            NodeState::Following => {
                self.timers.leadership_aware.start();
                self.timers.heartbeat.start();
            }
            NodeState::Election => {
                self.timers.election.start();
            }
            NodeState::Leading => {
                self.leader = Some(self.id);
                self.heartbeats.vote(self.id);
                self.timers.leadership_grace.start();
                self.timers.heartbeat.start();
                self.timers.leadership.start();
            }
        }
    }

    fn compose(&self, kind: MessageKind) -> Message {
        Message {
            source: self.id,
            term: self.current_term,
            kind,
            leader: self.leader,
        }
    }

    fn send(&self, target: NodeId, kind: MessageKind) {
        self.adapter.send(target, self.compose(kind));
    }

    fn broadcast(&self, kind: MessageKind) {
        let msg = self.compose(kind);
        for member in self.cluster.members() {
            if member.id != self.id {
                self.adapter.send(member.id, msg);
            }
        }
    }

    fn record(&mut self, name: impl Into<String>) {
        self.events.record(name, self.current_term);
    }

    fn publish(&self) {
        self.status.send_replace(self.snapshot());
    }

    fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            id: self.id,
            state: self.state,
            leader: self.leader,
            voted_for: self.voted_for,
            current_term: self.current_term,
            can_run_process: self.can_run_process,
            events: self.events.to_vec(),
        }
    }
}
