use std::sync::Arc;

use canopy_core::{
    AbortMode, AuxDef, ConditionSpec, NodeDef, NodeId, NodeKind, NodeSpec, Result, TaskSpec,
    TreeDef,
};

use crate::behavior::{ConditionBehavior, ServiceBehavior, TaskBehavior};
use crate::instance::TreeInstance;
use crate::nodes::{BlackboardCompare, RunSubTreeTask, WaitTask};
use crate::registry::BehaviorRegistry;

/// A built node. Auxiliaries are arena entries of their own, numbered right
/// after their owner and before the owner's children.
pub(crate) struct NodeInst {
    pub(crate) kind: NodeKind,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) auxiliaries: Vec<NodeId>,
    pub(crate) role: Role,
}

pub(crate) enum Role {
    Composite(Composite),
    Decorator(DecoratorState),
    Service(ServiceState),
    Task(TaskState),
}

pub(crate) enum Composite {
    Plain,
    Weighted {
        cumulative: Vec<u32>,
    },
    Parallel {
        tree: Option<Arc<TreeDef>>,
        /// Built on first activation of the first child, reused afterwards.
        embedded: Option<Box<TreeInstance>>,
    },
}

pub(crate) struct DecoratorState {
    pub(crate) condition: Box<dyn ConditionBehavior>,
    pub(crate) abort_mode: AbortMode,
    pub(crate) reversed: bool,
    pub(crate) relevant: bool,
}

pub(crate) struct ServiceState {
    pub(crate) behavior: Box<dyn ServiceBehavior>,
    pub(crate) interval_seconds: f32,
    pub(crate) random_deviation_seconds: f32,
    pub(crate) countdown: f32,
    pub(crate) relevant: bool,
}

pub(crate) struct TaskState {
    pub(crate) behavior: Box<dyn TaskBehavior>,
}

/// Appends `def` and everything under it to the arena, depth first.
pub(crate) fn build(
    def: &NodeDef,
    parent: Option<NodeId>,
    registry: &Arc<BehaviorRegistry>,
    arena: &mut Vec<NodeInst>,
) -> Result<NodeId> {
    let role = match &def.spec {
        NodeSpec::Root | NodeSpec::Sequence | NodeSpec::Selector => Role::Composite(Composite::Plain),
        NodeSpec::WeightedSelector { weights } => Role::Composite(Composite::Weighted {
            cumulative: cumulative(weights),
        }),
        NodeSpec::Parallel { tree } => Role::Composite(Composite::Parallel {
            tree: tree.clone(),
            embedded: None,
        }),
        NodeSpec::Task(task) => Role::Task(TaskState {
            behavior: make_task(task, registry)?,
        }),
    };
    let id = NodeId(arena.len() as u32);
    arena.push(NodeInst {
        kind: def.kind(),
        parent,
        children: Vec::new(),
        auxiliaries: Vec::new(),
        role,
    });

    let mut auxiliaries = Vec::with_capacity(def.auxiliaries.len());
    for aux in &def.auxiliaries {
        let (kind, role) = match aux {
            AuxDef::Decorator(decorator) => (
                NodeKind::Decorator,
                Role::Decorator(DecoratorState {
                    condition: make_condition(&decorator.condition, registry)?,
                    abort_mode: decorator.abort_mode,
                    reversed: decorator.reversed,
                    relevant: false,
                }),
            ),
            AuxDef::Service(service) => (
                NodeKind::Service,
                Role::Service(ServiceState {
                    behavior: registry.build_service(service.key, &service.params)?,
                    interval_seconds: service.interval_seconds,
                    random_deviation_seconds: service.random_deviation_seconds,
                    countdown: 0.0,
                    relevant: false,
                }),
            ),
        };
        auxiliaries.push(NodeId(arena.len() as u32));
        arena.push(NodeInst {
            kind,
            parent: Some(id),
            children: Vec::new(),
            auxiliaries: Vec::new(),
            role,
        });
    }

    let mut children = Vec::with_capacity(def.children.len());
    for child in &def.children {
        children.push(build(child, Some(id), registry, arena)?);
    }

    let inst = &mut arena[id.index()];
    inst.auxiliaries = auxiliaries;
    inst.children = children;
    Ok(id)
}

fn make_task(spec: &TaskSpec, registry: &Arc<BehaviorRegistry>) -> Result<Box<dyn TaskBehavior>> {
    Ok(match spec {
        TaskSpec::Wait {
            min_seconds,
            max_seconds,
        } => Box::new(WaitTask::new(*min_seconds, *max_seconds)),
        TaskSpec::RunSubTree { tree } => {
            Box::new(RunSubTreeTask::new(tree.clone(), Arc::clone(registry)))
        }
        TaskSpec::Behavior { key, params } => registry.build_task(*key, params)?,
    })
}

fn make_condition(
    spec: &ConditionSpec,
    registry: &Arc<BehaviorRegistry>,
) -> Result<Box<dyn ConditionBehavior>> {
    Ok(match spec {
        ConditionSpec::Blackboard { field, op, operand } => {
            Box::new(BlackboardCompare::new(field.clone(), *op, operand.clone()))
        }
        ConditionSpec::Behavior { key, params } => registry.build_condition(*key, params)?,
    })
}

fn cumulative(weights: &[u32]) -> Vec<u32> {
    let mut total = 0u32;
    weights
        .iter()
        .map(|weight| {
            total = total.saturating_add(*weight);
            total
        })
        .collect()
}
