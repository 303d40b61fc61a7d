use std::any::Any;

use canopy_core::{Blackboard, NodeId, SplitMix64, TaskExit, TaskStatus, TickContext};

/// Everything a behavior may touch while its node runs.
pub struct NodeContext<'a> {
    pub tick: &'a TickContext,
    pub blackboard: &'a mut Blackboard,
    /// The owning instance's deterministic stream.
    pub rng: &'a mut SplitMix64,
    /// Pre-order id of the node the behavior is attached to.
    pub node: NodeId,
}

/// How far a message travels through an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageScope {
    /// Every node and auxiliary, once each, in no useful order.
    Broadcast,
    /// The executing path from the root down, auxiliaries included.
    TrickleDown,
    /// Only the deepest executing entry and its auxiliaries.
    ActivatedTask,
}

/// A named payload delivered to behaviors.
pub struct Message<'a> {
    pub name: &'a str,
    pub payload: &'a dyn Any,
}

impl Message<'_> {
    pub fn payload_as<T: 'static>(&self) -> Option<&T> {
        self.payload.downcast_ref()
    }
}

/// A task leaf. Activated when the search lands on its node, then ticked
/// until it reports something other than [`TaskStatus::Running`].
pub trait TaskBehavior: 'static {
    /// Runs once when the search activates the node. Returning a finished
    /// status completes the task without it ever ticking.
    fn on_activation(&mut self, _ctx: &mut NodeContext<'_>) -> TaskStatus {
        TaskStatus::Running
    }

    fn tick(&mut self, ctx: &mut NodeContext<'_>) -> TaskStatus;

    /// Runs exactly once per activation, with the reason the task ended.
    fn on_deactivation(&mut self, _ctx: &mut NodeContext<'_>, _exit: TaskExit) {}

    fn on_message(&mut self, _message: &Message<'_>) {}

    /// Final teardown when the instance stops.
    fn dispose(&mut self, _ctx: &mut NodeContext<'_>) {}
}

/// A decorator condition.
///
/// `raw_check` must be side-effect free apart from refreshing internal
/// caches: the abort probe replays it against nodes that are not relevant.
pub trait ConditionBehavior: 'static {
    fn raw_check(&mut self, ctx: &mut NodeContext<'_>) -> bool;

    /// Cheap value consulted by the abort scan every tick. Defaults to the
    /// raw check; caching conditions override it.
    fn cached_check(&mut self, ctx: &mut NodeContext<'_>) -> bool {
        self.raw_check(ctx)
    }

    fn on_become_relevant(&mut self, _ctx: &mut NodeContext<'_>) {}

    fn on_cease_relevant(&mut self, _ctx: &mut NodeContext<'_>) {}

    fn on_message(&mut self, _message: &Message<'_>) {}

    fn dispose(&mut self, _ctx: &mut NodeContext<'_>) {}
}

/// A service: periodic work attached to a node, run only while that node is
/// on the executing path.
pub trait ServiceBehavior: 'static {
    /// Invoked whenever the service countdown expires.
    fn fire(&mut self, ctx: &mut NodeContext<'_>);

    fn on_become_relevant(&mut self, _ctx: &mut NodeContext<'_>) {}

    fn on_cease_relevant(&mut self, _ctx: &mut NodeContext<'_>) {}

    fn on_message(&mut self, _message: &Message<'_>) {}

    fn dispose(&mut self, _ctx: &mut NodeContext<'_>) {}
}
