use std::borrow::Cow;
use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;

use canopy_core::{
    Blackboard, CompareOp, DeterministicRng, Listen, ListenerId, TaskExit, TaskStatus, TreeDef,
    Value,
};

use crate::behavior::{ConditionBehavior, NodeContext, TaskBehavior};
use crate::instance::TreeInstance;
use crate::registry::BehaviorRegistry;

/// Waits a duration drawn uniformly from `[min, max]` at activation.
///
/// The countdown is checked before it is decremented, so a zero-length
/// draw succeeds on the first tick after activation.
pub struct WaitTask {
    min_seconds: f32,
    max_seconds: f32,
    countdown: f32,
}

impl WaitTask {
    pub fn new(min_seconds: f32, max_seconds: f32) -> Self {
        Self {
            min_seconds,
            max_seconds,
            countdown: 0.0,
        }
    }
}

impl TaskBehavior for WaitTask {
    fn on_activation(&mut self, ctx: &mut NodeContext<'_>) -> TaskStatus {
        self.countdown = ctx.rng.next_f32_range(self.min_seconds, self.max_seconds);
        TaskStatus::Running
    }

    fn tick(&mut self, ctx: &mut NodeContext<'_>) -> TaskStatus {
        if self.countdown <= 0.0 {
            return TaskStatus::Success;
        }
        self.countdown -= ctx.tick.dt_seconds;
        TaskStatus::Running
    }
}

/// Runs another tree against the caller's blackboard, succeeding once that
/// tree finishes a full search pass.
///
/// The embedded instance is built lazily on first activation and restarted
/// on every later one. Its random stream is split off the owner's, so owner
/// and sub-tree stay deterministic together.
pub struct RunSubTreeTask {
    tree: Option<Arc<TreeDef>>,
    registry: Arc<BehaviorRegistry>,
    embedded: Option<Box<TreeInstance>>,
}

impl RunSubTreeTask {
    pub fn new(tree: Option<Arc<TreeDef>>, registry: Arc<BehaviorRegistry>) -> Self {
        Self {
            tree,
            registry,
            embedded: None,
        }
    }

    fn stop_embedded(&mut self, ctx: &mut NodeContext<'_>) {
        if let Some(sub) = self.embedded.as_deref_mut() {
            sub.stop(ctx.tick, ctx.blackboard);
        }
    }
}

impl TaskBehavior for RunSubTreeTask {
    fn on_activation(&mut self, ctx: &mut NodeContext<'_>) -> TaskStatus {
        let Some(tree) = &self.tree else {
            return TaskStatus::Failure;
        };
        if self.embedded.is_none() {
            let instance = TreeInstance::new(Arc::clone(tree), Arc::clone(&self.registry))
                .with_stream(ctx.rng.next_u64());
            self.embedded = Some(Box::new(instance));
        }
        let Some(sub) = self.embedded.as_deref_mut() else {
            return TaskStatus::Failure;
        };
        sub.stop(ctx.tick, ctx.blackboard);
        if sub.start(ctx.tick, ctx.blackboard).is_err() {
            return TaskStatus::Failure;
        }
        // The starting search can already run the whole tree to its end.
        if sub.finished_passes() > 0 {
            TaskStatus::Success
        } else {
            TaskStatus::Running
        }
    }

    fn tick(&mut self, ctx: &mut NodeContext<'_>) -> TaskStatus {
        let Some(sub) = self.embedded.as_deref_mut() else {
            return TaskStatus::Failure;
        };
        sub.tick(ctx.tick, ctx.blackboard);
        if sub.finished_passes() > 0 {
            TaskStatus::Success
        } else {
            TaskStatus::Running
        }
    }

    fn on_deactivation(&mut self, ctx: &mut NodeContext<'_>, _exit: TaskExit) {
        self.stop_embedded(ctx);
    }

    fn dispose(&mut self, ctx: &mut NodeContext<'_>) {
        self.stop_embedded(ctx);
    }
}

/// Compares one blackboard field against a constant.
///
/// While relevant it mirrors the field through a change listener, so abort
/// re-checks read a cached flag instead of re-running the comparison.
/// Unknown fields never pass.
pub struct BlackboardCompare {
    field: Cow<'static, str>,
    op: CompareOp,
    operand: Value,
    cached: Rc<Cell<bool>>,
    listener: Option<ListenerId>,
}

impl BlackboardCompare {
    pub fn new(
        field: impl Into<Cow<'static, str>>,
        op: CompareOp,
        operand: impl Into<Value>,
    ) -> Self {
        Self {
            field: field.into(),
            op,
            operand: operand.into(),
            cached: Rc::new(Cell::new(false)),
            listener: None,
        }
    }

    fn cleanup(&mut self, blackboard: &mut Blackboard) {
        if let Some(listener) = self.listener.take() {
            blackboard.unsubscribe(listener);
        }
        self.cached.set(false);
    }
}

fn evaluate(blackboard: &Blackboard, field: &str, op: CompareOp, operand: &Value) -> bool {
    match blackboard.field(field) {
        Some(id) => op.test(blackboard.is_set(id), blackboard.value(id), operand),
        None => false,
    }
}

impl ConditionBehavior for BlackboardCompare {
    fn raw_check(&mut self, ctx: &mut NodeContext<'_>) -> bool {
        let pass = evaluate(ctx.blackboard, &self.field, self.op, &self.operand);
        self.cached.set(pass);
        pass
    }

    fn cached_check(&mut self, _ctx: &mut NodeContext<'_>) -> bool {
        self.cached.get()
    }

    fn on_become_relevant(&mut self, ctx: &mut NodeContext<'_>) {
        if self.listener.is_some() {
            return;
        }
        let Some(field) = ctx.blackboard.field(&self.field) else {
            return;
        };
        let cached = Rc::clone(&self.cached);
        let op = self.op;
        let operand = self.operand.clone();
        self.listener = Some(ctx.blackboard.subscribe(field, move |view| {
            cached.set(op.test(view.is_set(), view.value(), &operand));
            Listen::Keep
        }));
    }

    fn on_cease_relevant(&mut self, ctx: &mut NodeContext<'_>) {
        self.cleanup(ctx.blackboard);
    }

    fn dispose(&mut self, ctx: &mut NodeContext<'_>) {
        self.cleanup(ctx.blackboard);
    }
}
