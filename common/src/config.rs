use crate::error::{Result, WatchdogError};
use crate::types::NodeId;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// The gated child process: only the elected leader may run it.
#[derive(Debug, Clone, Deserialize)]
pub struct CommandConfig {
    pub name: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// Node-local configuration, loaded from a YAML document.
///
/// All timer fields are in milliseconds. `heartbeat_interval` should be
/// substantially below `network_interval` so that a majority of heartbeats
/// lands within one leadership window.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchdogConfig {
    min_election_timeout: u64,
    max_election_timeout: u64,
    network_interval: u64,
    heartbeat_interval: u64,
    listen_on: String,
    command: CommandConfig,
}

impl WatchdogConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            WatchdogError::ConfigInvalid(format!(
                "cannot read config file {}: {e}",
                path.as_ref().display()
            ))
        })?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let config: WatchdogConfig = serde_yaml::from_str(raw)
            .map_err(|e| WatchdogError::ConfigInvalid(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        // The randomized election window is half-open, so it must span at
        // least one millisecond.
        if self.min_election_timeout >= self.max_election_timeout {
            return Err(WatchdogError::ConfigInvalid(format!(
                "minElectionTimeout ({}) must be less than maxElectionTimeout ({})",
                self.min_election_timeout, self.max_election_timeout
            )));
        }

        if self.network_interval == 0 {
            return Err(WatchdogError::ConfigInvalid(
                "networkInterval must be positive".into(),
            ));
        }

        if self.heartbeat_interval == 0 {
            return Err(WatchdogError::ConfigInvalid(
                "heartbeatInterval must be positive".into(),
            ));
        }

        if self.listen_on.is_empty() {
            return Err(WatchdogError::ConfigInvalid(
                "listenOn must not be empty".into(),
            ));
        }

        if self.command.name.is_empty() {
            return Err(WatchdogError::ConfigInvalid(
                "command.name must not be empty".into(),
            ));
        }

        if self.heartbeat_interval * 2 > self.network_interval {
            warn!(
                heartbeat_interval = self.heartbeat_interval,
                network_interval = self.network_interval,
                "heartbeatInterval should be at most half of networkInterval \
                 so a majority of heartbeats arrives within one leadership window"
            );
        }

        Ok(())
    }

    pub fn min_election_timeout(&self) -> Duration {
        Duration::from_millis(self.min_election_timeout)
    }

    pub fn max_election_timeout(&self) -> Duration {
        Duration::from_millis(self.max_election_timeout)
    }

    pub fn network_interval(&self) -> Duration {
        Duration::from_millis(self.network_interval)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval)
    }

    pub fn listen_on(&self) -> &str {
        &self.listen_on
    }

    pub fn command(&self) -> &CommandConfig {
        &self.command
    }
}

/// One statically configured peer.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterMember {
    pub id: NodeId,
    pub udp_addr: String,
    pub http_addr: String,
}

/// The static cluster membership, loaded once at startup from a YAML list
/// of `{id, udpAddr, httpAddr}` entries.
#[derive(Debug, Clone)]
pub struct Cluster {
    members: Vec<ClusterMember>,
}

impl Cluster {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            WatchdogError::ConfigInvalid(format!(
                "cannot read cluster file {}: {e}",
                path.as_ref().display()
            ))
        })?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let members: Vec<ClusterMember> = serde_yaml::from_str(raw)
            .map_err(|e| WatchdogError::ConfigInvalid(e.to_string()))?;
        Self::new(members)
    }

    pub fn new(members: Vec<ClusterMember>) -> Result<Self> {
        if members.is_empty() {
            return Err(WatchdogError::ConfigInvalid(
                "cluster must have at least one member".into(),
            ));
        }

        for member in &members {
            if member.id.get() == NodeId::NULL_WIRE {
                return Err(WatchdogError::ConfigInvalid(
                    "cluster member id 0 is reserved".into(),
                ));
            }
            if member.udp_addr.is_empty() || member.http_addr.is_empty() {
                return Err(WatchdogError::ConfigInvalid(format!(
                    "cluster member {} must have both udpAddr and httpAddr",
                    member.id
                )));
            }
        }

        let mut ids: Vec<NodeId> = members.iter().map(|m| m.id).collect();
        ids.sort_unstable();
        ids.dedup();
        if ids.len() != members.len() {
            return Err(WatchdogError::ConfigInvalid(
                "cluster member ids must be unique".into(),
            ));
        }

        Ok(Self { members })
    }

    pub fn members(&self) -> &[ClusterMember] {
        &self.members
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.members.iter().map(|m| m.id)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.member(id).is_some()
    }

    pub fn member(&self, id: NodeId) -> Option<&ClusterMember> {
        self.members.iter().find(|m| m.id == id)
    }

    /// Like [`member`](Self::member), but an absent id is a configuration
    /// error (the local node must always appear in the cluster file).
    pub fn require_member(&self, id: NodeId) -> Result<&ClusterMember> {
        self.member(id).ok_or_else(|| {
            WatchdogError::ConfigInvalid(format!("node {id} is not part of the cluster"))
        })
    }
}
