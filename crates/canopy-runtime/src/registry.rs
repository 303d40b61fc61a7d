use std::collections::BTreeMap;

use canopy_core::{
    AuxDef, BehaviorKey, ConditionSpec, NodeDef, NodeSpec, Params, Result, TaskSpec, TreeDef,
    TreeError,
};

use crate::behavior::{ConditionBehavior, ServiceBehavior, TaskBehavior};

type TaskCtor = Box<dyn Fn(&Params) -> Box<dyn TaskBehavior>>;
type ConditionCtor = Box<dyn Fn(&Params) -> Box<dyn ConditionBehavior>>;
type ServiceCtor = Box<dyn Fn(&Params) -> Box<dyn ServiceBehavior>>;

/// Maps [`BehaviorKey`]s to behavior constructors.
///
/// Built-in nodes (waits, sub-trees, blackboard conditions) never consult the
/// registry, so an empty registry is enough for trees that only use them.
#[derive(Default)]
pub struct BehaviorRegistry {
    tasks: BTreeMap<BehaviorKey, TaskCtor>,
    conditions: BTreeMap<BehaviorKey, ConditionCtor>,
    services: BTreeMap<BehaviorKey, ServiceCtor>,
}

impl BehaviorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_task(
        &mut self,
        key: BehaviorKey,
        ctor: impl Fn(&Params) -> Box<dyn TaskBehavior> + 'static,
    ) {
        self.tasks.insert(key, Box::new(ctor));
    }

    pub fn register_condition(
        &mut self,
        key: BehaviorKey,
        ctor: impl Fn(&Params) -> Box<dyn ConditionBehavior> + 'static,
    ) {
        self.conditions.insert(key, Box::new(ctor));
    }

    pub fn register_service(
        &mut self,
        key: BehaviorKey,
        ctor: impl Fn(&Params) -> Box<dyn ServiceBehavior> + 'static,
    ) {
        self.services.insert(key, Box::new(ctor));
    }

    pub(crate) fn build_task(&self, key: BehaviorKey, params: &Params) -> Result<Box<dyn TaskBehavior>> {
        match self.tasks.get(&key) {
            Some(ctor) => Ok(ctor(params)),
            None => Err(TreeError::UnmappedTask(key)),
        }
    }

    pub(crate) fn build_condition(
        &self,
        key: BehaviorKey,
        params: &Params,
    ) -> Result<Box<dyn ConditionBehavior>> {
        match self.conditions.get(&key) {
            Some(ctor) => Ok(ctor(params)),
            None => Err(TreeError::UnmappedCondition(key)),
        }
    }

    pub(crate) fn build_service(
        &self,
        key: BehaviorKey,
        params: &Params,
    ) -> Result<Box<dyn ServiceBehavior>> {
        match self.services.get(&key) {
            Some(ctor) => Ok(ctor(params)),
            None => Err(TreeError::UnmappedService(key)),
        }
    }

    /// Checks that every key the tree names, embedded trees included, is
    /// registered. Shared sub-trees are visited once.
    pub fn validate(&self, tree: &TreeDef) -> Result<()> {
        let mut seen = vec![tree as *const TreeDef as usize];
        self.validate_tree(tree, &mut seen)
    }

    fn validate_tree(&self, tree: &TreeDef, seen: &mut Vec<usize>) -> Result<()> {
        for node in &tree.nodes {
            self.validate_node(node, seen)?;
        }
        Ok(())
    }

    fn validate_node(&self, node: &NodeDef, seen: &mut Vec<usize>) -> Result<()> {
        let embedded = match &node.spec {
            NodeSpec::Task(TaskSpec::Behavior { key, .. }) => {
                if !self.tasks.contains_key(key) {
                    return Err(TreeError::UnmappedTask(*key));
                }
                None
            }
            NodeSpec::Task(TaskSpec::RunSubTree { tree }) => tree.as_ref(),
            NodeSpec::Parallel { tree } => tree.as_ref(),
            _ => None,
        };
        if let Some(tree) = embedded {
            let ptr = std::sync::Arc::as_ptr(tree) as usize;
            if !seen.contains(&ptr) {
                seen.push(ptr);
                self.validate_tree(tree, seen)?;
            }
        }
        for aux in &node.auxiliaries {
            match aux {
                AuxDef::Decorator(decorator) => {
                    if let ConditionSpec::Behavior { key, .. } = &decorator.condition {
                        if !self.conditions.contains_key(key) {
                            return Err(TreeError::UnmappedCondition(*key));
                        }
                    }
                }
                AuxDef::Service(service) => {
                    if !self.services.contains_key(&service.key) {
                        return Err(TreeError::UnmappedService(service.key));
                    }
                }
            }
        }
        for child in &node.children {
            self.validate_node(child, seen)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn validation_reaches_embedded_trees() {
        let registry = BehaviorRegistry::new();
        let inner = Arc::new(TreeDef::new(
            "inner",
            vec![NodeDef::root(vec![NodeDef::task(
                BehaviorKey("patrol"),
                Params::new(),
            )])],
        ));
        let outer = TreeDef::new(
            "outer",
            vec![NodeDef::root(vec![NodeDef::run_subtree(inner)])],
        );
        assert_eq!(
            registry.validate(&outer),
            Err(TreeError::UnmappedTask(BehaviorKey("patrol")))
        );
    }

    #[test]
    fn builtin_only_trees_need_no_registrations() {
        let registry = BehaviorRegistry::new();
        let tree = TreeDef::new("t", vec![NodeDef::root(vec![NodeDef::wait(1.0, 2.0)])]);
        assert!(registry.validate(&tree).is_ok());
    }
}
