use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::status::AbortMode;
use crate::value::{CompareOp, FromValue, Value};

/// Stable identity of a node instance: its depth-first pre-order position in
/// the built tree. The root is 0 and every auxiliary is numbered before its
/// node's children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Key a custom behavior is registered under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BehaviorKey(pub &'static str);

impl fmt::Display for BehaviorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Configuration bag handed to behavior constructors.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params(BTreeMap<Cow<'static, str>, Value>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<Cow<'static, str>>, value: impl Into<Value>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Lenient typed read: missing entries and kind mismatches both fall
    /// back, configuration is advisory.
    pub fn get_or<T: FromValue>(&self, name: &str, fallback: T) -> T {
        self.get(name).and_then(T::from_value).unwrap_or(fallback)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Runtime category of a built node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum NodeKind {
    Root,
    Sequence,
    Selector,
    WeightedSelector,
    Parallel,
    Task,
    Decorator,
    Service,
}

/// Condition evaluated by a decorator.
#[derive(Debug, Clone)]
pub enum ConditionSpec {
    /// Compare one blackboard field against a constant.
    Blackboard {
        field: Cow<'static, str>,
        op: CompareOp,
        operand: Value,
    },
    /// A registered [`crate::tree::BehaviorKey`] condition.
    Behavior { key: BehaviorKey, params: Params },
}

/// A decorator attached to a node: gates the search and can request aborts.
#[derive(Debug, Clone)]
pub struct DecoratorDef {
    pub condition: ConditionSpec,
    pub abort_mode: AbortMode,
    pub reversed: bool,
}

impl DecoratorDef {
    pub fn blackboard(
        field: impl Into<Cow<'static, str>>,
        op: CompareOp,
        operand: impl Into<Value>,
    ) -> Self {
        Self {
            condition: ConditionSpec::Blackboard {
                field: field.into(),
                op,
                operand: operand.into(),
            },
            abort_mode: AbortMode::None,
            reversed: false,
        }
    }

    pub fn behavior(key: BehaviorKey, params: Params) -> Self {
        Self {
            condition: ConditionSpec::Behavior { key, params },
            abort_mode: AbortMode::None,
            reversed: false,
        }
    }

    pub fn with_abort(mut self, mode: AbortMode) -> Self {
        self.abort_mode = mode;
        self
    }

    /// Inverts the condition for both search checks and abort re-checks.
    pub fn reversed(mut self) -> Self {
        self.reversed = true;
        self
    }
}

/// A service attached to a node: fires on a countdown while the node is on
/// the executing path.
#[derive(Debug, Clone)]
pub struct ServiceDef {
    pub key: BehaviorKey,
    pub params: Params,
    pub interval_seconds: f32,
    pub random_deviation_seconds: f32,
}

impl ServiceDef {
    pub fn new(key: BehaviorKey, interval_seconds: f32) -> Self {
        Self {
            key,
            params: Params::new(),
            interval_seconds,
            random_deviation_seconds: 0.0,
        }
    }

    pub fn with_deviation(mut self, seconds: f32) -> Self {
        self.random_deviation_seconds = seconds;
        self
    }

    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }
}

/// An auxiliary attached to a node.
#[derive(Debug, Clone)]
pub enum AuxDef {
    Decorator(DecoratorDef),
    Service(ServiceDef),
}

/// Task leaf payload.
#[derive(Debug, Clone)]
pub enum TaskSpec {
    /// Waits a duration drawn uniformly from `[min, max]` at activation.
    Wait { min_seconds: f32, max_seconds: f32 },
    /// Runs another tree to completion of one search pass.
    RunSubTree { tree: Option<Arc<TreeDef>> },
    /// A registered custom task.
    Behavior { key: BehaviorKey, params: Params },
}

/// What a node is.
#[derive(Debug, Clone)]
pub enum NodeSpec {
    Root,
    Sequence,
    Selector,
    /// Picks one child per descent from cumulative percent weights.
    WeightedSelector { weights: Vec<u32> },
    /// Runs its child while ticking an embedded tree beside it.
    Parallel { tree: Option<Arc<TreeDef>> },
    Task(TaskSpec),
}

/// One node of a tree definition, with its auxiliaries and children.
#[derive(Debug, Clone)]
pub struct NodeDef {
    pub spec: NodeSpec,
    pub auxiliaries: Vec<AuxDef>,
    pub children: Vec<NodeDef>,
}

impl NodeDef {
    pub fn new(spec: NodeSpec) -> Self {
        Self {
            spec,
            auxiliaries: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn root(children: Vec<NodeDef>) -> Self {
        Self {
            children,
            ..Self::new(NodeSpec::Root)
        }
    }

    pub fn sequence(children: Vec<NodeDef>) -> Self {
        Self {
            children,
            ..Self::new(NodeSpec::Sequence)
        }
    }

    pub fn selector(children: Vec<NodeDef>) -> Self {
        Self {
            children,
            ..Self::new(NodeSpec::Selector)
        }
    }

    pub fn weighted_selector(weights: Vec<u32>, children: Vec<NodeDef>) -> Self {
        Self {
            children,
            ..Self::new(NodeSpec::WeightedSelector { weights })
        }
    }

    pub fn parallel(tree: Arc<TreeDef>, child: NodeDef) -> Self {
        Self {
            children: vec![child],
            ..Self::new(NodeSpec::Parallel { tree: Some(tree) })
        }
    }

    pub fn task(key: BehaviorKey, params: Params) -> Self {
        Self::new(NodeSpec::Task(TaskSpec::Behavior { key, params }))
    }

    pub fn wait(min_seconds: f32, max_seconds: f32) -> Self {
        Self::new(NodeSpec::Task(TaskSpec::Wait {
            min_seconds,
            max_seconds,
        }))
    }

    pub fn run_subtree(tree: Arc<TreeDef>) -> Self {
        Self::new(NodeSpec::Task(TaskSpec::RunSubTree { tree: Some(tree) }))
    }

    pub fn with_decorator(mut self, decorator: DecoratorDef) -> Self {
        self.auxiliaries.push(AuxDef::Decorator(decorator));
        self
    }

    pub fn with_service(mut self, service: ServiceDef) -> Self {
        self.auxiliaries.push(AuxDef::Service(service));
        self
    }

    pub fn kind(&self) -> NodeKind {
        match &self.spec {
            NodeSpec::Root => NodeKind::Root,
            NodeSpec::Sequence => NodeKind::Sequence,
            NodeSpec::Selector => NodeKind::Selector,
            NodeSpec::WeightedSelector { .. } => NodeKind::WeightedSelector,
            NodeSpec::Parallel { .. } => NodeKind::Parallel,
            NodeSpec::Task(_) => NodeKind::Task,
        }
    }
}

/// A whole tree definition. Immutable once built; instances borrow it
/// through an `Arc`.
#[derive(Debug, Clone)]
pub struct TreeDef {
    pub name: Cow<'static, str>,
    pub nodes: Vec<NodeDef>,
}

impl TreeDef {
    pub fn new(name: impl Into<Cow<'static, str>>, nodes: Vec<NodeDef>) -> Self {
        Self {
            name: name.into(),
            nodes,
        }
    }

    /// The effective root: the first top-level node with children, falling
    /// back to the first node at all.
    pub fn root(&self) -> Option<&NodeDef> {
        self.nodes
            .iter()
            .find(|node| !node.children.is_empty())
            .or_else(|| self.nodes.first())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_prefers_first_node_with_children() {
        let def = TreeDef::new(
            "t",
            vec![
                NodeDef::wait(0.0, 0.0),
                NodeDef::root(vec![NodeDef::wait(1.0, 1.0)]),
            ],
        );
        assert_eq!(def.root().map(NodeDef::kind), Some(NodeKind::Root));
    }

    #[test]
    fn root_falls_back_to_first_node() {
        let def = TreeDef::new("t", vec![NodeDef::wait(0.0, 0.0)]);
        assert_eq!(def.root().map(NodeDef::kind), Some(NodeKind::Task));
        assert!(TreeDef::new("empty", vec![]).root().is_none());
    }

    #[test]
    fn params_reads_are_lenient() {
        let params = Params::new().with("speed", 2.5f32).with("count", 3i64);
        assert_eq!(params.get_or("speed", 1.0f32), 2.5);
        assert_eq!(params.get_or("missing", 7i64), 7);
        assert_eq!(params.get_or("speed", 9i64), 9);
    }
}
