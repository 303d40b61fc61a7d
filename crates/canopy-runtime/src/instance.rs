//! Tree execution.
//!
//! An instance keeps two parallel path stacks: the executing path (nodes
//! currently alive, root first) and the search path (every node the running
//! pass visited, failed branches included). The search path is what abort
//! decorators are re-checked against; the executing path is what gets ticked.

use std::any::Any;
use std::sync::Arc;

use canopy_core::{
    AbortMode, Blackboard, DeterministicRng, NodeId, NodeKind, Result, SearchResult, SplitMix64,
    TaskExit, TaskStatus, TickContext, TreeDef, TreeError, TreeEvent, TreeObserver,
};

use crate::behavior::{Message, MessageScope, NodeContext};
use crate::node::{self, Composite, NodeInst, Role};
use crate::registry::BehaviorRegistry;

/// One node on a path and the search result it has reported so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathEntry {
    pub node: NodeId,
    /// Position of this node among its parent's children.
    pub index_in_parent: usize,
    pub result: SearchResult,
}

/// What the search loop does next. Replaces the mutual recursion between
/// descending, child selection and bubbling with an explicit state.
enum Step {
    /// Descend into the node on top of the executing path.
    Enter,
    /// Ask `parent` for the child after `prev`, given how the previous one
    /// ended. `trickle` distinguishes descent from bubbling.
    Select {
        parent: NodeId,
        prev: Option<usize>,
        result: SearchResult,
        trickle: bool,
    },
    /// Pop the top of the executing path and hand `result` upward.
    Bubble(SearchResult),
}

/// A running (or stoppable) tree built from a [`TreeDef`].
///
/// The instance owns its node arena and RNG stream; the blackboard stays
/// outside and is threaded through every call, so one board can back a whole
/// hierarchy of embedded trees.
pub struct TreeInstance {
    def: Arc<TreeDef>,
    registry: Arc<BehaviorRegistry>,
    nodes: Vec<NodeInst>,
    executing: Vec<PathEntry>,
    search: Vec<PathEntry>,
    active_task: Option<NodeId>,
    /// A searched composite had no children; the tree parks on it until an
    /// abort or a restart.
    active_empty: bool,
    running: bool,
    finished_passes: u64,
    rng: SplitMix64,
    stream: u64,
    observer: Option<Box<dyn TreeObserver>>,
}

impl TreeInstance {
    pub fn new(def: Arc<TreeDef>, registry: Arc<BehaviorRegistry>) -> Self {
        Self {
            def,
            registry,
            nodes: Vec::new(),
            executing: Vec::new(),
            search: Vec::new(),
            active_task: None,
            active_empty: false,
            running: false,
            finished_passes: 0,
            rng: SplitMix64::new(0),
            stream: 0,
            observer: None,
        }
    }

    /// Selects the RNG stream this instance draws from. Embedded trees get
    /// streams split off their owner's, so replays stay stable.
    pub fn with_stream(mut self, stream: u64) -> Self {
        self.stream = stream;
        self
    }

    pub fn set_observer(&mut self, observer: Box<dyn TreeObserver>) {
        self.observer = Some(observer);
    }

    pub fn tree_name(&self) -> &str {
        &self.def.name
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Full search passes completed since the last start.
    pub fn finished_passes(&self) -> u64 {
        self.finished_passes
    }

    pub fn active_task(&self) -> Option<NodeId> {
        self.active_task
    }

    /// The executing path, root first.
    pub fn executing_path(&self) -> &[PathEntry] {
        &self.executing
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn node_kind(&self, node: NodeId) -> Option<NodeKind> {
        self.nodes.get(node.index()).map(|inst| inst.kind)
    }

    pub fn parent_of(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.get(node.index()).and_then(|inst| inst.parent)
    }

    /// Ids of every auxiliary currently relevant, in arena order.
    pub fn relevant_auxiliaries(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, inst)| match &inst.role {
                Role::Decorator(state) => state.relevant,
                Role::Service(state) => state.relevant,
                _ => false,
            })
            .map(|(index, _)| NodeId(index as u32))
            .collect()
    }

    /// Builds the node arena and runs the first search pass.
    ///
    /// Fails without side effects when the definition has no usable root or
    /// names an unregistered behavior anywhere, embedded trees included.
    pub fn start(&mut self, ctx: &TickContext, blackboard: &mut Blackboard) -> Result<()> {
        if self.running {
            return Err(TreeError::AlreadyRunning);
        }
        let root = self
            .def
            .root()
            .ok_or_else(|| TreeError::MissingRoot(self.def.name.to_string()))?;
        self.registry.validate(&self.def)?;

        let mut arena = Vec::new();
        node::build(root, None, &self.registry, &mut arena)?;
        self.nodes = arena;
        self.rng = ctx.rng_for_stream(self.stream);
        self.active_task = None;
        self.finished_passes = 0;
        self.running = true;
        self.emit(TreeEvent::TreeStarted);
        self.start_search(ctx, blackboard);
        Ok(())
    }

    /// Deactivates the live task, disposes every node and tears the arena
    /// down. Safe to call on a stopped instance.
    pub fn stop(&mut self, ctx: &TickContext, blackboard: &mut Blackboard) {
        if !self.running {
            return;
        }
        self.running = false;
        if let Some(task) = self.active_task.take() {
            self.deactivate_task(task, TaskExit::Abort, ctx, blackboard);
        }
        for index in 0..self.nodes.len() {
            self.dispose_node(NodeId(index as u32), ctx, blackboard);
        }
        self.nodes.clear();
        self.executing.clear();
        self.search.clear();
        self.active_empty = false;
        self.emit(TreeEvent::TreeStopped);
    }

    /// Advances the instance by one tick.
    ///
    /// In order: restart the search when the previous pass ended, bubble a
    /// task that finished last tick, otherwise tick the executing path and
    /// run the abort scan.
    pub fn tick(&mut self, ctx: &TickContext, blackboard: &mut Blackboard) {
        if !self.running {
            return;
        }
        if self.executing.is_empty() {
            self.start_search(ctx, blackboard);
            return;
        }
        if self.active_task.is_none() && !self.active_empty {
            let Some(top) = self.executing.last() else {
                return;
            };
            let result = top.result;
            self.run_search(Step::Bubble(result), ctx, blackboard);
            return;
        }
        self.tick_path(ctx, blackboard);
        if let Some((node, self_abort)) = self.check_abort(ctx, blackboard) {
            if self_abort || self.probe_check(node, ctx, blackboard) {
                self.commit_abort(node, ctx, blackboard);
            }
        }
    }

    /// Delivers a named payload to behaviors in `scope`. Composites never
    /// receive messages; their auxiliaries do.
    pub fn send_message(&mut self, name: &str, payload: &dyn Any, scope: MessageScope) {
        if !self.running {
            return;
        }
        let message = Message { name, payload };
        match scope {
            MessageScope::Broadcast => {
                for index in 0..self.nodes.len() {
                    self.deliver(NodeId(index as u32), &message);
                }
            }
            MessageScope::TrickleDown => {
                for i in 0..self.executing.len() {
                    let node = self.executing[i].node;
                    self.deliver_with_auxiliaries(node, &message);
                }
            }
            MessageScope::ActivatedTask => {
                // The deepest executing entry, which is the activated task
                // except while the tree parks on an empty composite.
                if let Some(top) = self.executing.last() {
                    let node = top.node;
                    self.deliver_with_auxiliaries(node, &message);
                }
            }
        }
    }

    fn emit(&mut self, event: TreeEvent) {
        if let Some(observer) = &mut self.observer {
            observer.on_event(event);
        }
    }

    fn start_search(&mut self, ctx: &TickContext, blackboard: &mut Blackboard) {
        self.active_empty = false;
        self.executing.clear();
        self.search.clear();
        let root = PathEntry {
            node: NodeId(0),
            index_in_parent: 0,
            result: SearchResult::Normal,
        };
        self.executing.push(root);
        self.search.push(root);
        self.run_search(Step::Enter, ctx, blackboard);
    }

    fn run_search(&mut self, initial: Step, ctx: &TickContext, blackboard: &mut Blackboard) {
        let mut step = initial;
        loop {
            match step {
                Step::Enter => {
                    let Some(entry) = self.executing.last().copied() else {
                        return;
                    };
                    self.emit(TreeEvent::NodeVisited(entry.node));
                    if !self.check_all_decorators(entry.node, ctx, blackboard) {
                        step = Step::Bubble(SearchResult::CheckFail);
                        continue;
                    }
                    match &self.nodes[entry.node.index()].role {
                        Role::Task(_) => {
                            self.activate_task(entry.node, ctx, blackboard);
                            return;
                        }
                        Role::Composite(_) => {
                            if self.nodes[entry.node.index()].children.is_empty() {
                                self.active_empty = true;
                                return;
                            }
                            step = Step::Select {
                                parent: entry.node,
                                prev: None,
                                result: SearchResult::Normal,
                                trickle: true,
                            };
                        }
                        Role::Decorator(_) | Role::Service(_) => return,
                    }
                }
                Step::Select {
                    parent,
                    prev,
                    result,
                    trickle,
                } => {
                    let child_count = self.nodes[parent.index()].children.len();
                    match self.select_child(parent, prev, result, trickle) {
                        Some(index) if index < child_count => {
                            let child = self.nodes[parent.index()].children[index];
                            let entry = PathEntry {
                                node: child,
                                index_in_parent: index,
                                result: SearchResult::Normal,
                            };
                            self.executing.push(entry);
                            self.search.push(entry);
                            step = Step::Enter;
                        }
                        _ => step = Step::Bubble(result),
                    }
                }
                Step::Bubble(result) => {
                    let Some(entry) = self.executing.last().copied() else {
                        return;
                    };
                    if result == SearchResult::ExecuteFail {
                        // Failed branches leave no history: the abort scan
                        // must not re-check their decorators.
                        if let Some(popped) = self.search.pop() {
                            self.cease_decorators(popped.node, ctx, blackboard);
                        }
                    } else if let Some(record) = self
                        .search
                        .iter_mut()
                        .rev()
                        .find(|record| record.node == entry.node)
                    {
                        record.result = result;
                    }
                    self.bubble(ctx, blackboard);
                    match self.executing.last().copied() {
                        Some(parent) => {
                            step = Step::Select {
                                parent: parent.node,
                                prev: Some(entry.index_in_parent),
                                result,
                                trickle: false,
                            };
                        }
                        None => {
                            self.finished_passes += 1;
                            self.emit(TreeEvent::SearchFinished);
                            return;
                        }
                    }
                }
            }
        }
    }

    /// Pops the executing top: leave hook, then its services cease.
    fn bubble(&mut self, ctx: &TickContext, blackboard: &mut Blackboard) {
        let Some(entry) = self.executing.pop() else {
            return;
        };
        self.emit(TreeEvent::NodeBubbled(entry.node));
        self.leave_node(entry.node, ctx, blackboard);
        self.cease_services(entry.node, ctx, blackboard);
    }

    fn leave_node(&mut self, node: NodeId, ctx: &TickContext, blackboard: &mut Blackboard) {
        if let Role::Composite(Composite::Parallel {
            embedded: Some(sub),
            ..
        }) = &mut self.nodes[node.index()].role
        {
            sub.stop(ctx, blackboard);
        }
    }

    /// Picks the next child of `parent`. `None` or an out-of-range index
    /// both mean "return to parent".
    fn select_child(
        &mut self,
        parent: NodeId,
        prev: Option<usize>,
        result: SearchResult,
        trickle: bool,
    ) -> Option<usize> {
        let next = prev.map_or(0, |p| p + 1);
        let Self { nodes, rng, .. } = self;
        let inst = &nodes[parent.index()];
        match &inst.role {
            Role::Composite(Composite::Plain) => match inst.kind {
                NodeKind::Sequence if !trickle && result != SearchResult::Normal => None,
                NodeKind::Selector if !trickle && result == SearchResult::Normal => None,
                _ => Some(next),
            },
            Role::Composite(Composite::Weighted { cumulative }) => {
                if !trickle || cumulative.is_empty() {
                    return None;
                }
                let roll = rng.next_u32_bounded(100);
                cumulative.iter().position(|&bound| roll < bound)
            }
            Role::Composite(Composite::Parallel { .. }) => {
                if trickle {
                    Some(next)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// Runs every decorator of `node`, making its auxiliaries relevant along
    /// the way. False as soon as one decorator rejects.
    fn check_all_decorators(
        &mut self,
        node: NodeId,
        ctx: &TickContext,
        blackboard: &mut Blackboard,
    ) -> bool {
        for j in 0..self.nodes[node.index()].auxiliaries.len() {
            let aux = self.nodes[node.index()].auxiliaries[j];
            self.become_relevant(aux, ctx, blackboard);
            if matches!(self.nodes[aux.index()].role, Role::Decorator(_))
                && !self.raw_check(aux, ctx, blackboard)
            {
                self.emit(TreeEvent::DecoratorFailed(aux));
                return false;
            }
        }
        true
    }

    fn raw_check(&mut self, aux: NodeId, ctx: &TickContext, blackboard: &mut Blackboard) -> bool {
        let Self { nodes, rng, .. } = self;
        match &mut nodes[aux.index()].role {
            Role::Decorator(state) => {
                let pass = state.condition.raw_check(&mut NodeContext {
                    tick: ctx,
                    blackboard,
                    rng,
                    node: aux,
                });
                pass != state.reversed
            }
            _ => true,
        }
    }

    fn cached_check(&mut self, aux: NodeId, ctx: &TickContext, blackboard: &mut Blackboard) -> bool {
        let Self { nodes, rng, .. } = self;
        match &mut nodes[aux.index()].role {
            Role::Decorator(state) => {
                let pass = state.condition.cached_check(&mut NodeContext {
                    tick: ctx,
                    blackboard,
                    rng,
                    node: aux,
                });
                pass != state.reversed
            }
            _ => true,
        }
    }

    fn become_relevant(&mut self, aux: NodeId, ctx: &TickContext, blackboard: &mut Blackboard) {
        let newly = {
            let Self { nodes, rng, .. } = self;
            match &mut nodes[aux.index()].role {
                Role::Decorator(state) if !state.relevant => {
                    state.relevant = true;
                    state.condition.on_become_relevant(&mut NodeContext {
                        tick: ctx,
                        blackboard,
                        rng,
                        node: aux,
                    });
                    true
                }
                Role::Service(state) if !state.relevant => {
                    state.relevant = true;
                    state.behavior.on_become_relevant(&mut NodeContext {
                        tick: ctx,
                        blackboard,
                        rng,
                        node: aux,
                    });
                    true
                }
                _ => false,
            }
        };
        if newly {
            self.emit(TreeEvent::AuxBecameRelevant(aux));
        }
    }

    fn cease_relevant(&mut self, aux: NodeId, ctx: &TickContext, blackboard: &mut Blackboard) {
        let ceased = {
            let Self { nodes, rng, .. } = self;
            match &mut nodes[aux.index()].role {
                Role::Decorator(state) if state.relevant => {
                    state.relevant = false;
                    state.condition.on_cease_relevant(&mut NodeContext {
                        tick: ctx,
                        blackboard,
                        rng,
                        node: aux,
                    });
                    true
                }
                Role::Service(state) if state.relevant => {
                    state.relevant = false;
                    state.behavior.on_cease_relevant(&mut NodeContext {
                        tick: ctx,
                        blackboard,
                        rng,
                        node: aux,
                    });
                    true
                }
                _ => false,
            }
        };
        if ceased {
            self.emit(TreeEvent::AuxCeasedRelevant(aux));
        }
    }

    fn cease_decorators(&mut self, node: NodeId, ctx: &TickContext, blackboard: &mut Blackboard) {
        for j in 0..self.nodes[node.index()].auxiliaries.len() {
            let aux = self.nodes[node.index()].auxiliaries[j];
            if matches!(self.nodes[aux.index()].role, Role::Decorator(_)) {
                self.cease_relevant(aux, ctx, blackboard);
            }
        }
    }

    fn cease_services(&mut self, node: NodeId, ctx: &TickContext, blackboard: &mut Blackboard) {
        for j in 0..self.nodes[node.index()].auxiliaries.len() {
            let aux = self.nodes[node.index()].auxiliaries[j];
            if matches!(self.nodes[aux.index()].role, Role::Service(_)) {
                self.cease_relevant(aux, ctx, blackboard);
            }
        }
    }

    fn activate_task(&mut self, node: NodeId, ctx: &TickContext, blackboard: &mut Blackboard) {
        self.active_task = Some(node);
        let status = {
            let Self { nodes, rng, .. } = self;
            match &mut nodes[node.index()].role {
                Role::Task(state) => state.behavior.on_activation(&mut NodeContext {
                    tick: ctx,
                    blackboard,
                    rng,
                    node,
                }),
                _ => return,
            }
        };
        self.emit(TreeEvent::TaskActivated(node));
        self.start_parallel_for(node, ctx, blackboard);
        match status {
            TaskStatus::Running => {}
            TaskStatus::Success => {
                self.finish_active_task(node, TaskExit::Success, ctx, blackboard)
            }
            TaskStatus::Failure => self.finish_active_task(node, TaskExit::Cancel, ctx, blackboard),
        }
    }

    /// Deactivates the active task. Anything but a success marks the
    /// executing top `ExecuteFail` for the bubble that follows.
    fn finish_active_task(
        &mut self,
        node: NodeId,
        exit: TaskExit,
        ctx: &TickContext,
        blackboard: &mut Blackboard,
    ) {
        if self.active_task != Some(node) {
            return;
        }
        self.active_task = None;
        if exit != TaskExit::Success {
            if let Some(top) = self.executing.last_mut() {
                top.result = SearchResult::ExecuteFail;
            }
        }
        self.deactivate_task(node, exit, ctx, blackboard);
    }

    fn deactivate_task(
        &mut self,
        node: NodeId,
        exit: TaskExit,
        ctx: &TickContext,
        blackboard: &mut Blackboard,
    ) {
        let Self { nodes, rng, .. } = self;
        if let Role::Task(state) = &mut nodes[node.index()].role {
            state.behavior.on_deactivation(
                &mut NodeContext {
                    tick: ctx,
                    blackboard,
                    rng,
                    node,
                },
                exit,
            );
        }
    }

    /// Starts the embedded tree of a parallel composite when its first child
    /// activates. Restarts apply on every activation.
    fn start_parallel_for(&mut self, task: NodeId, ctx: &TickContext, blackboard: &mut Blackboard) {
        let Some(parent) = self.nodes[task.index()].parent else {
            return;
        };
        let Self {
            nodes,
            rng,
            registry,
            ..
        } = self;
        let parent_inst = &mut nodes[parent.index()];
        if parent_inst.children.first() != Some(&task) {
            return;
        }
        let Role::Composite(Composite::Parallel { tree, embedded }) = &mut parent_inst.role else {
            return;
        };
        let Some(tree) = tree.as_ref() else {
            return;
        };
        let sub = embedded.get_or_insert_with(|| {
            Box::new(
                TreeInstance::new(Arc::clone(tree), Arc::clone(registry))
                    .with_stream(rng.next_u64()),
            )
        });
        sub.stop(ctx, blackboard);
        // A side tree that fails to start (no root) simply never runs.
        let _ = sub.start(ctx, blackboard);
    }

    fn tick_path(&mut self, ctx: &TickContext, blackboard: &mut Blackboard) {
        for i in 0..self.executing.len() {
            let node = self.executing[i].node;
            self.tick_node(node, ctx, blackboard);
            for j in 0..self.nodes[node.index()].auxiliaries.len() {
                let aux = self.nodes[node.index()].auxiliaries[j];
                self.tick_aux(aux, ctx, blackboard);
            }
        }
    }

    fn tick_node(&mut self, node: NodeId, ctx: &TickContext, blackboard: &mut Blackboard) {
        let status = {
            let Self {
                nodes,
                rng,
                active_task,
                ..
            } = self;
            match &mut nodes[node.index()].role {
                Role::Task(state) if *active_task == Some(node) => {
                    Some(state.behavior.tick(&mut NodeContext {
                        tick: ctx,
                        blackboard,
                        rng,
                        node,
                    }))
                }
                Role::Composite(Composite::Parallel {
                    embedded: Some(sub),
                    ..
                }) => {
                    sub.tick(ctx, blackboard);
                    None
                }
                _ => None,
            }
        };
        match status {
            None | Some(TaskStatus::Running) => {}
            Some(TaskStatus::Success) => {
                self.finish_active_task(node, TaskExit::Success, ctx, blackboard)
            }
            Some(TaskStatus::Failure) => {
                self.finish_active_task(node, TaskExit::Cancel, ctx, blackboard)
            }
        }
    }

    fn tick_aux(&mut self, aux: NodeId, ctx: &TickContext, blackboard: &mut Blackboard) {
        let due = match &mut self.nodes[aux.index()].role {
            Role::Service(state) => {
                if state.countdown <= 0.0 {
                    true
                } else {
                    state.countdown -= ctx.dt_seconds;
                    false
                }
            }
            _ => false,
        };
        if due {
            let Self { nodes, rng, .. } = self;
            if let Role::Service(state) = &mut nodes[aux.index()].role {
                state.behavior.fire(&mut NodeContext {
                    tick: ctx,
                    blackboard,
                    rng: &mut *rng,
                    node: aux,
                });
                let deviation = state.random_deviation_seconds;
                state.countdown =
                    (state.interval_seconds + rng.next_f32_range(-deviation, deviation)).max(0.0);
            }
        }
    }

    /// Re-checks every abort decorator along the search path. Returns the
    /// node to abort to and whether the hit was on the executing path.
    fn check_abort(
        &mut self,
        ctx: &TickContext,
        blackboard: &mut Blackboard,
    ) -> Option<(NodeId, bool)> {
        for i in 0..self.search.len() {
            let entry = self.search[i];
            if entry.result == SearchResult::ExecuteFail {
                continue;
            }
            let mut on_path: Option<bool> = None;
            let mut cross: Option<Option<NodeId>> = None;
            let mut lower_candidate = false;
            for j in 0..self.nodes[entry.node.index()].auxiliaries.len() {
                let aux = self.nodes[entry.node.index()].auxiliaries[j];
                let mode = match &self.nodes[aux.index()].role {
                    Role::Decorator(state) => state.abort_mode,
                    _ => continue,
                };
                if mode == AbortMode::None {
                    continue;
                }
                let on_exec = *on_path.get_or_insert_with(|| self.on_executing_path(entry.node));
                let pass = self.cached_check(aux, ctx, blackboard);
                match (pass, on_exec) {
                    (true, true) => {}
                    (true, false) => {
                        if mode.aborts_lower_priority() {
                            let cross_node =
                                *cross.get_or_insert_with(|| self.find_cross_node(entry.node));
                            match cross_node {
                                Some(node) if self.allows_lower_priority_abort(node) => {
                                    lower_candidate = true;
                                }
                                Some(_) => {
                                    // A sequence never lets a sibling branch
                                    // steal its running child.
                                    lower_candidate = false;
                                    break;
                                }
                                None => {}
                            }
                        }
                    }
                    (false, true) => {
                        if mode.aborts_self() {
                            return Some((entry.node, true));
                        }
                    }
                    (false, false) => {
                        if mode.aborts_lower_priority() {
                            lower_candidate = false;
                            break;
                        }
                    }
                }
            }
            if lower_candidate {
                if let Some(Some(node)) = cross {
                    return Some((node, false));
                }
            }
        }
        None
    }

    fn on_executing_path(&self, node: NodeId) -> bool {
        self.executing.iter().any(|entry| entry.node == node)
    }

    /// Nearest ancestor of `node` that lies on the executing path.
    fn find_cross_node(&self, node: NodeId) -> Option<NodeId> {
        let mut current = self.nodes[node.index()].parent;
        while let Some(parent) = current {
            if self.on_executing_path(parent) {
                return Some(parent);
            }
            current = self.nodes[parent.index()].parent;
        }
        None
    }

    fn allows_lower_priority_abort(&self, node: NodeId) -> bool {
        self.nodes[node.index()].kind != NodeKind::Sequence
    }

    /// Dry-runs the search that an abort would trigger under `node`, raw
    /// decorator checks only, to see whether it can reach anything new.
    fn probe_check(&mut self, node: NodeId, ctx: &TickContext, blackboard: &mut Blackboard) -> bool {
        for j in 0..self.nodes[node.index()].auxiliaries.len() {
            let aux = self.nodes[node.index()].auxiliaries[j];
            if matches!(self.nodes[aux.index()].role, Role::Decorator(_))
                && !self.raw_check(aux, ctx, blackboard)
            {
                return false;
            }
        }
        if matches!(self.nodes[node.index()].role, Role::Task(_))
            || self.nodes[node.index()].children.is_empty()
        {
            // Tasks and childless composites both count as landing spots,
            // unless the spot is the one currently held.
            return self.executing.last().map(|top| top.node) != Some(node);
        }
        let count = self.nodes[node.index()].children.len();
        for i in 0..count {
            let prev = if i == 0 { None } else { Some(i - 1) };
            let Some(index) = self.select_child(node, prev, SearchResult::Normal, true) else {
                return false;
            };
            if index >= count {
                return false;
            }
            let child = self.nodes[node.index()].children[index];
            if self.probe_check(child, ctx, blackboard) {
                return true;
            }
        }
        false
    }

    /// Tears the paths back to `abort` and resumes bubbling from there, as
    /// if its branch had just come back `Normal`.
    fn commit_abort(&mut self, abort: NodeId, ctx: &TickContext, blackboard: &mut Blackboard) {
        if let Some(task) = self.active_task {
            self.finish_active_task(task, TaskExit::Abort, ctx, blackboard);
        }
        self.active_empty = false;
        while self
            .search
            .last()
            .is_some_and(|entry| entry.node.0 > abort.0)
        {
            if let Some(entry) = self.search.pop() {
                self.cease_decorators(entry.node, ctx, blackboard);
            }
        }
        while self
            .executing
            .last()
            .is_some_and(|entry| entry.node != abort)
        {
            self.bubble(ctx, blackboard);
        }
        self.run_search(Step::Bubble(SearchResult::Normal), ctx, blackboard);
    }

    fn deliver(&mut self, node: NodeId, message: &Message<'_>) {
        match &mut self.nodes[node.index()].role {
            Role::Task(state) => state.behavior.on_message(message),
            Role::Decorator(state) => state.condition.on_message(message),
            Role::Service(state) => state.behavior.on_message(message),
            Role::Composite(_) => {}
        }
    }

    fn deliver_with_auxiliaries(&mut self, node: NodeId, message: &Message<'_>) {
        self.deliver(node, message);
        for j in 0..self.nodes[node.index()].auxiliaries.len() {
            let aux = self.nodes[node.index()].auxiliaries[j];
            self.deliver(aux, message);
        }
    }

    fn dispose_node(&mut self, node: NodeId, ctx: &TickContext, blackboard: &mut Blackboard) {
        let Self { nodes, rng, .. } = self;
        match &mut nodes[node.index()].role {
            Role::Task(state) => state.behavior.dispose(&mut NodeContext {
                tick: ctx,
                blackboard,
                rng,
                node,
            }),
            Role::Decorator(state) => state.condition.dispose(&mut NodeContext {
                tick: ctx,
                blackboard,
                rng,
                node,
            }),
            Role::Service(state) => state.behavior.dispose(&mut NodeContext {
                tick: ctx,
                blackboard,
                rng,
                node,
            }),
            Role::Composite(Composite::Parallel {
                embedded: Some(sub),
                ..
            }) => sub.stop(ctx, blackboard),
            Role::Composite(_) => {}
        }
    }
}
