use crate::tree::NodeId;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Engine lifecycle notifications, in the order the engine emits them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum TreeEvent {
    TreeStarted,
    TreeStopped,
    /// The search descended into this node.
    NodeVisited(NodeId),
    /// The node bubbled off the executing path.
    NodeBubbled(NodeId),
    /// A decorator rejected its node during the search.
    DecoratorFailed(NodeId),
    AuxBecameRelevant(NodeId),
    AuxCeasedRelevant(NodeId),
    /// A task leaf was activated.
    TaskActivated(NodeId),
    /// A full search pass bubbled back past the root.
    SearchFinished,
}

/// Receives [`TreeEvent`]s from one tree instance.
pub trait TreeObserver {
    fn on_event(&mut self, event: TreeEvent);
}
