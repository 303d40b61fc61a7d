//! Deterministic, engine-agnostic behavior tree primitives.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![forbid(unsafe_code)]

pub mod blackboard;
pub mod error;
pub mod event;
pub mod rng;
pub mod status;
pub mod tick;
pub mod tree;
pub mod value;

pub use blackboard::{Blackboard, BlackboardDef, Field, FieldDef, FieldId, Listen, ListenerId};
pub use error::{Result, TreeError};
pub use event::{TreeEvent, TreeObserver};
pub use rng::{derive_seed, mix64, DeterministicRng, SplitMix64};
pub use status::{AbortMode, SearchResult, TaskExit, TaskStatus};
pub use tick::TickContext;
pub use tree::{
    AuxDef, BehaviorKey, ConditionSpec, DecoratorDef, NodeDef, NodeId, NodeKind, NodeSpec, Params,
    ServiceDef, TaskSpec, TreeDef,
};
pub use value::{CompareOp, EntityId, FromValue, Value, ValueKind};
