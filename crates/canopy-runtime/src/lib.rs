//! Behavior tree execution runtime built on `canopy-core`.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![forbid(unsafe_code)]

pub mod behavior;
pub mod instance;
mod node;
pub mod nodes;
pub mod registry;

pub use behavior::{
    ConditionBehavior, Message, MessageScope, NodeContext, ServiceBehavior, TaskBehavior,
};
pub use instance::{PathEntry, TreeInstance};
pub use nodes::{BlackboardCompare, RunSubTreeTask, WaitTask};
pub use registry::BehaviorRegistry;
