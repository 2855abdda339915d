use std::collections::BTreeMap;
use watchdog_common::NodeId;

/// A domain-complete map from cluster member to a granted/not-granted flag.
///
/// The domain is fixed to the cluster member set at construction and is
/// preserved by every operation; abstentions count against a majority.
#[derive(Debug, Clone)]
pub struct Ballot {
    entries: BTreeMap<NodeId, bool>,
}

impl Ballot {
    pub fn new(members: impl IntoIterator<Item = NodeId>) -> Self {
        Self {
            entries: members.into_iter().map(|id| (id, false)).collect(),
        }
    }

    /// Clear every grant, keeping the domain intact.
    pub fn reset(&mut self) {
        for granted in self.entries.values_mut() {
            *granted = false;
        }
    }

    /// Record a grant from `id`. Ids outside the cluster are ignored.
    pub fn vote(&mut self, id: NodeId) {
        if let Some(granted) = self.entries.get_mut(&id) {
            *granted = true;
        }
    }

    /// Strict majority: yes must outnumber no across the whole domain.
    pub fn is_majority(&self) -> bool {
        let yes = self.entries.values().filter(|granted| **granted).count();
        let no = self.entries.len() - yes;

        yes > no
    }

    /// The members that have granted, in id order.
    pub fn granted(&self) -> Vec<NodeId> {
        self.entries
            .iter()
            .filter_map(|(id, granted)| granted.then_some(*id))
            .collect()
    }

    pub fn domain(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.entries.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
