use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use canopy_core::{
    AbortMode, BehaviorKey, Blackboard, BlackboardDef, CompareOp, DecoratorDef, FieldDef, NodeDef,
    NodeId, Params, ServiceDef, TaskExit, TaskStatus, TickContext, TreeDef, TreeError, TreeEvent,
};
use canopy_runtime::{
    BehaviorRegistry, ConditionBehavior, Message, MessageScope, NodeContext, ServiceBehavior,
    TaskBehavior, TreeInstance,
};
use canopy_tools::RecordingObserver;

#[derive(Clone, Default)]
struct Recorder {
    inner: Rc<RefCell<Trace>>,
}

#[derive(Debug, Default)]
struct Trace {
    activated: Vec<&'static str>,
    exited: Vec<(&'static str, TaskExit)>,
    disposed: Vec<&'static str>,
    fired: Vec<&'static str>,
    ceased: Vec<&'static str>,
    messages: Vec<(&'static str, i32)>,
}

impl Recorder {
    fn activated(&self) -> Vec<&'static str> {
        self.inner.borrow().activated.clone()
    }

    fn exited(&self) -> Vec<(&'static str, TaskExit)> {
        self.inner.borrow().exited.clone()
    }

    fn disposed(&self) -> Vec<&'static str> {
        self.inner.borrow().disposed.clone()
    }

    fn fired(&self) -> Vec<&'static str> {
        self.inner.borrow().fired.clone()
    }

    fn ceased(&self) -> Vec<&'static str> {
        self.inner.borrow().ceased.clone()
    }

    fn take_messages(&self) -> Vec<(&'static str, i32)> {
        std::mem::take(&mut self.inner.borrow_mut().messages)
    }

    fn record_message(&self, name: &'static str, message: &Message<'_>) {
        let payload = message.payload_as::<i32>().copied().unwrap_or(-1);
        self.inner.borrow_mut().messages.push((name, payload));
    }
}

struct RecTask {
    name: &'static str,
    ticks: u32,
    remaining: u32,
    outcome: TaskStatus,
    recorder: Recorder,
}

impl TaskBehavior for RecTask {
    fn on_activation(&mut self, _ctx: &mut NodeContext<'_>) -> TaskStatus {
        self.recorder.inner.borrow_mut().activated.push(self.name);
        self.remaining = self.ticks;
        if self.remaining == 0 {
            self.outcome
        } else {
            TaskStatus::Running
        }
    }

    fn tick(&mut self, _ctx: &mut NodeContext<'_>) -> TaskStatus {
        if self.remaining <= 1 {
            self.outcome
        } else {
            self.remaining -= 1;
            TaskStatus::Running
        }
    }

    fn on_deactivation(&mut self, _ctx: &mut NodeContext<'_>, exit: TaskExit) {
        self.recorder.inner.borrow_mut().exited.push((self.name, exit));
    }

    fn on_message(&mut self, message: &Message<'_>) {
        self.recorder.record_message(self.name, message);
    }

    fn dispose(&mut self, _ctx: &mut NodeContext<'_>) {
        self.recorder.inner.borrow_mut().disposed.push(self.name);
    }
}

struct RecCondition {
    name: &'static str,
    pass: bool,
    recorder: Recorder,
}

impl ConditionBehavior for RecCondition {
    fn raw_check(&mut self, _ctx: &mut NodeContext<'_>) -> bool {
        self.pass
    }

    fn on_message(&mut self, message: &Message<'_>) {
        self.recorder.record_message(self.name, message);
    }
}

struct RecService {
    name: &'static str,
    recorder: Recorder,
}

impl ServiceBehavior for RecService {
    fn fire(&mut self, _ctx: &mut NodeContext<'_>) {
        self.recorder.inner.borrow_mut().fired.push(self.name);
    }

    fn on_cease_relevant(&mut self, _ctx: &mut NodeContext<'_>) {
        self.recorder.inner.borrow_mut().ceased.push(self.name);
    }

    fn on_message(&mut self, message: &Message<'_>) {
        self.recorder.record_message(self.name, message);
    }

    fn dispose(&mut self, _ctx: &mut NodeContext<'_>) {
        self.recorder.inner.borrow_mut().disposed.push(self.name);
    }
}

fn register_task(
    registry: &mut BehaviorRegistry,
    recorder: &Recorder,
    name: &'static str,
    ticks: u32,
    outcome: TaskStatus,
) {
    let recorder = recorder.clone();
    registry.register_task(BehaviorKey(name), move |_params| {
        Box::new(RecTask {
            name,
            ticks,
            remaining: 0,
            outcome,
            recorder: recorder.clone(),
        })
    });
}

fn register_condition(
    registry: &mut BehaviorRegistry,
    recorder: &Recorder,
    name: &'static str,
    pass: bool,
) {
    let recorder = recorder.clone();
    registry.register_condition(BehaviorKey(name), move |_params| {
        Box::new(RecCondition {
            name,
            pass,
            recorder: recorder.clone(),
        })
    });
}

fn register_service(registry: &mut BehaviorRegistry, recorder: &Recorder, name: &'static str) {
    let recorder = recorder.clone();
    registry.register_service(BehaviorKey(name), move |_params| {
        Box::new(RecService {
            name,
            recorder: recorder.clone(),
        })
    });
}

fn board(fields: Vec<FieldDef>) -> Blackboard {
    let mut def = BlackboardDef::new();
    for field in fields {
        def.push(field).expect("unique field name");
    }
    Blackboard::new(Arc::new(def))
}

fn ctx(tick: u64) -> TickContext {
    TickContext {
        tick,
        dt_seconds: 0.1,
        seed: 5,
    }
}

#[test]
fn start_fails_without_a_usable_root() {
    let def = TreeDef::new("empty", vec![]);
    let mut blackboard = board(vec![]);
    let mut instance = TreeInstance::new(Arc::new(def), Arc::new(BehaviorRegistry::new()));

    let err = instance.start(&ctx(0), &mut blackboard).unwrap_err();
    assert!(matches!(err, TreeError::MissingRoot(ref name) if name == "empty"));
    assert!(!instance.is_running());
}

#[test]
fn start_picks_the_first_node_with_children() {
    // A stray leaf before the real root is skipped by the root rule.
    let def = TreeDef::new(
        "roots",
        vec![
            NodeDef::wait(1.0, 1.0),
            NodeDef::root(vec![NodeDef::wait(1.0, 1.0)]),
        ],
    );
    let mut blackboard = board(vec![]);
    let mut instance = TreeInstance::new(Arc::new(def), Arc::new(BehaviorRegistry::new()));
    instance.start(&ctx(0), &mut blackboard).expect("start");

    assert_eq!(instance.node_count(), 2);
    assert_eq!(instance.active_task(), Some(NodeId(1)));
}

#[test]
fn start_twice_is_an_error() {
    let def = TreeDef::new("once", vec![NodeDef::root(vec![NodeDef::wait(1.0, 1.0)])]);
    let mut blackboard = board(vec![]);
    let mut instance = TreeInstance::new(Arc::new(def), Arc::new(BehaviorRegistry::new()));
    instance.start(&ctx(0), &mut blackboard).expect("start");

    let err = instance.start(&ctx(1), &mut blackboard).unwrap_err();
    assert!(matches!(err, TreeError::AlreadyRunning));
    // The running instance is untouched.
    assert!(instance.is_running());
    assert_eq!(instance.active_task(), Some(NodeId(1)));
}

#[test]
fn start_rejects_unregistered_behaviors_without_side_effects() {
    // The ghost task hides inside an embedded tree; validation still finds it.
    let inner = Arc::new(TreeDef::new(
        "inner",
        vec![NodeDef::root(vec![NodeDef::task(
            BehaviorKey("ghost"),
            Params::new(),
        )])],
    ));
    let def = TreeDef::new("outer", vec![NodeDef::root(vec![NodeDef::run_subtree(inner)])]);

    let mut blackboard = board(vec![]);
    let mut instance = TreeInstance::new(Arc::new(def), Arc::new(BehaviorRegistry::new()));
    let events = RecordingObserver::new();
    instance.set_observer(Box::new(events.clone()));

    let err = instance.start(&ctx(0), &mut blackboard).unwrap_err();
    assert!(matches!(err, TreeError::UnmappedTask(BehaviorKey("ghost"))));
    assert!(!instance.is_running());
    assert!(events.is_empty());
}

#[test]
fn stop_aborts_the_task_and_disposes_each_node_once() {
    let recorder = Recorder::default();
    let mut registry = BehaviorRegistry::new();
    register_task(&mut registry, &recorder, "a", u32::MAX, TaskStatus::Success);
    register_task(&mut registry, &recorder, "b", u32::MAX, TaskStatus::Success);
    register_service(&mut registry, &recorder, "pulse");

    // root(0) -> selector(1)[service(2)] -> a(3)[guard(4)], b(5)
    let def = TreeDef::new(
        "teardown",
        vec![NodeDef::root(vec![NodeDef::selector(vec![
            NodeDef::task(BehaviorKey("a"), Params::new())
                .with_decorator(DecoratorDef::blackboard("calm", CompareOp::Eq, true)),
            NodeDef::task(BehaviorKey("b"), Params::new()),
        ])
        .with_service(ServiceDef::new(BehaviorKey("pulse"), 1.0))])],
    );

    let mut blackboard = board(vec![FieldDef::new("calm", true)]);
    let mut instance = TreeInstance::new(Arc::new(def), Arc::new(registry));
    instance.start(&ctx(0), &mut blackboard).expect("start");
    instance.tick(&ctx(1), &mut blackboard);
    assert_eq!(recorder.activated(), vec!["a"]);
    assert_eq!(recorder.fired(), vec!["pulse"]);

    instance.stop(&ctx(2), &mut blackboard);
    assert!(!instance.is_running());
    assert!(instance.executing_path().is_empty());
    assert_eq!(instance.active_task(), None);
    assert_eq!(instance.node_count(), 0);
    assert_eq!(recorder.exited(), vec![("a", TaskExit::Abort)]);
    // Arena order, one dispose per behavior.
    assert_eq!(recorder.disposed(), vec!["pulse", "a", "b"]);

    // Stopping again is a no-op.
    instance.stop(&ctx(3), &mut blackboard);
    assert_eq!(recorder.disposed(), vec!["pulse", "a", "b"]);

    // A stopped instance can start over from scratch.
    instance.start(&ctx(4), &mut blackboard).expect("restart");
    assert!(instance.is_running());
    assert_eq!(recorder.activated(), vec!["a", "a"]);
}

#[test]
fn events_follow_the_search_order() {
    let recorder = Recorder::default();
    let mut registry = BehaviorRegistry::new();
    register_task(&mut registry, &recorder, "a", u32::MAX, TaskStatus::Success);
    register_task(&mut registry, &recorder, "b", 0, TaskStatus::Success);

    // root(0) -> selector(1) -> a(2)[guard(3)], b(4)
    let def = TreeDef::new(
        "events",
        vec![NodeDef::root(vec![NodeDef::selector(vec![
            NodeDef::task(BehaviorKey("a"), Params::new())
                .with_decorator(DecoratorDef::blackboard("go", CompareOp::IsSet, true)),
            NodeDef::task(BehaviorKey("b"), Params::new()),
        ])])],
    );

    let mut blackboard = board(vec![FieldDef::new("go", false)]);
    let mut instance = TreeInstance::new(Arc::new(def), Arc::new(registry));
    let events = RecordingObserver::new();
    instance.set_observer(Box::new(events.clone()));

    instance.start(&ctx(0), &mut blackboard).expect("start");
    assert_eq!(
        events.take(),
        vec![
            TreeEvent::TreeStarted,
            TreeEvent::NodeVisited(NodeId(0)),
            TreeEvent::NodeVisited(NodeId(1)),
            TreeEvent::NodeVisited(NodeId(2)),
            TreeEvent::AuxBecameRelevant(NodeId(3)),
            TreeEvent::DecoratorFailed(NodeId(3)),
            TreeEvent::NodeBubbled(NodeId(2)),
            TreeEvent::NodeVisited(NodeId(4)),
            TreeEvent::TaskActivated(NodeId(4)),
        ]
    );

    // b finished at activation; the next tick bubbles the pass out.
    instance.tick(&ctx(1), &mut blackboard);
    assert_eq!(
        events.take(),
        vec![
            TreeEvent::NodeBubbled(NodeId(4)),
            TreeEvent::NodeBubbled(NodeId(1)),
            TreeEvent::NodeBubbled(NodeId(0)),
            TreeEvent::SearchFinished,
        ]
    );
    assert_eq!(instance.finished_passes(), 1);

    instance.stop(&ctx(2), &mut blackboard);
    let stopped = events.take();
    assert_eq!(stopped.last(), Some(&TreeEvent::TreeStopped));
}

#[test]
fn messages_reach_their_scope() {
    let recorder = Recorder::default();
    let mut registry = BehaviorRegistry::new();
    register_task(&mut registry, &recorder, "a", u32::MAX, TaskStatus::Success);
    register_task(&mut registry, &recorder, "b", u32::MAX, TaskStatus::Success);
    register_condition(&mut registry, &recorder, "dec_a", false);
    register_service(&mut registry, &recorder, "svc_sel");
    register_service(&mut registry, &recorder, "svc_b");

    // root(0) -> selector(1)[svc_sel(2)] -> a(3)[dec_a(4)], b(5)[svc_b(6)]
    let def = TreeDef::new(
        "messages",
        vec![NodeDef::root(vec![NodeDef::selector(vec![
            NodeDef::task(BehaviorKey("a"), Params::new())
                .with_decorator(DecoratorDef::behavior(BehaviorKey("dec_a"), Params::new())),
            NodeDef::task(BehaviorKey("b"), Params::new())
                .with_service(ServiceDef::new(BehaviorKey("svc_b"), 1.0)),
        ])
        .with_service(ServiceDef::new(BehaviorKey("svc_sel"), 1.0))])],
    );

    let mut blackboard = board(vec![]);
    let mut instance = TreeInstance::new(Arc::new(def), Arc::new(registry));
    instance.start(&ctx(0), &mut blackboard).expect("start");
    assert_eq!(recorder.activated(), vec!["b"]);

    // Broadcast hits every behavior in arena order, composites excluded.
    instance.send_message("ping", &1i32, MessageScope::Broadcast);
    assert_eq!(
        recorder.take_messages(),
        vec![
            ("svc_sel", 1),
            ("a", 1),
            ("dec_a", 1),
            ("b", 1),
            ("svc_b", 1),
        ]
    );

    // Trickle-down only walks the executing path and its auxiliaries.
    instance.send_message("ping", &2i32, MessageScope::TrickleDown);
    assert_eq!(
        recorder.take_messages(),
        vec![("svc_sel", 2), ("b", 2), ("svc_b", 2)]
    );

    // The activated-task scope is the deepest entry only.
    instance.send_message("ping", &3i32, MessageScope::ActivatedTask);
    assert_eq!(recorder.take_messages(), vec![("b", 3), ("svc_b", 3)]);

    // A stopped instance drops messages.
    instance.stop(&ctx(1), &mut blackboard);
    instance.send_message("ping", &4i32, MessageScope::Broadcast);
    assert!(recorder.take_messages().is_empty());
}

#[test]
fn services_fire_on_their_countdown_and_cease_off_path() {
    let recorder = Recorder::default();
    let mut registry = BehaviorRegistry::new();
    register_task(&mut registry, &recorder, "high", u32::MAX, TaskStatus::Success);
    register_task(&mut registry, &recorder, "low", u32::MAX, TaskStatus::Success);
    register_service(&mut registry, &recorder, "svc");

    // root(0) -> selector(1) -> high(2)[guard(3)],
    //                           sequence(4)[svc(5)] -> low(6)
    let def = TreeDef::new(
        "cadence",
        vec![NodeDef::root(vec![NodeDef::selector(vec![
            NodeDef::task(BehaviorKey("high"), Params::new()).with_decorator(
                DecoratorDef::blackboard("armed", CompareOp::Eq, true)
                    .with_abort(AbortMode::LowerPriority),
            ),
            NodeDef::sequence(vec![NodeDef::task(BehaviorKey("low"), Params::new())])
                .with_service(ServiceDef::new(BehaviorKey("svc"), 0.25)),
        ])])],
    );

    let mut blackboard = board(vec![FieldDef::new("armed", false)]);
    let mut instance = TreeInstance::new(Arc::new(def), Arc::new(registry));
    instance.start(&ctx(0), &mut blackboard).expect("start");
    assert_eq!(recorder.activated(), vec!["low"]);

    // dt 0.1 against a 0.25 interval: due on the first tick, then every 4th.
    instance.tick(&ctx(1), &mut blackboard);
    assert_eq!(recorder.fired(), vec!["svc"]);
    for t in 2..=4u64 {
        instance.tick(&ctx(t), &mut blackboard);
    }
    assert_eq!(recorder.fired().len(), 1);
    instance.tick(&ctx(5), &mut blackboard);
    assert_eq!(recorder.fired().len(), 2);
    for t in 6..=9u64 {
        instance.tick(&ctx(t), &mut blackboard);
    }
    assert_eq!(recorder.fired().len(), 3);

    // The abort tears the branch down; the service ceases and stays quiet.
    blackboard.set("armed", true);
    instance.tick(&ctx(10), &mut blackboard);
    assert_eq!(recorder.ceased(), vec!["svc"]);
    for t in 11..=20u64 {
        instance.tick(&ctx(t), &mut blackboard);
    }
    assert_eq!(recorder.fired().len(), 3);
    assert_eq!(recorder.activated(), vec!["low", "high"]);
}

#[test]
fn search_parks_on_a_childless_composite() {
    let recorder = Recorder::default();
    let mut registry = BehaviorRegistry::new();
    register_service(&mut registry, &recorder, "svc");

    // root(0) -> sequence(1)[svc(2)] with no children
    let def = TreeDef::new(
        "parked",
        vec![NodeDef::root(vec![NodeDef::sequence(vec![])
            .with_service(ServiceDef::new(BehaviorKey("svc"), 0.25))])],
    );

    let mut blackboard = board(vec![]);
    let mut instance = TreeInstance::new(Arc::new(def), Arc::new(registry));
    instance.start(&ctx(0), &mut blackboard).expect("start");

    // No task activates, but the pass does not finish either: the empty
    // composite holds the leaf spot.
    assert_eq!(instance.active_task(), None);
    assert_eq!(
        instance.executing_path().last().map(|entry| entry.node),
        Some(NodeId(1))
    );
    assert_eq!(instance.relevant_auxiliaries(), vec![NodeId(2)]);

    // The parked path still ticks, so the service keeps its cadence.
    for t in 1..=5u64 {
        instance.tick(&ctx(t), &mut blackboard);
    }
    assert!(instance.is_running());
    assert_eq!(instance.finished_passes(), 0);
    assert_eq!(recorder.fired(), vec!["svc", "svc"]);
    assert_eq!(
        instance.executing_path().last().map(|entry| entry.node),
        Some(NodeId(1))
    );

    // The activated-task scope falls back to the parked node's auxiliaries.
    instance.send_message("ping", &9i32, MessageScope::ActivatedTask);
    assert_eq!(recorder.take_messages(), vec![("svc", 9)]);

    instance.stop(&ctx(6), &mut blackboard);
    assert!(!instance.is_running());
    assert_eq!(recorder.disposed(), vec!["svc"]);
}

#[test]
fn wait_task_runs_out_its_drawn_duration() {
    let def = TreeDef::new(
        "wait",
        vec![NodeDef::root(vec![NodeDef::wait(0.25, 0.25)])],
    );
    let mut blackboard = board(vec![]);
    let mut instance = TreeInstance::new(Arc::new(def), Arc::new(BehaviorRegistry::new()));
    instance.start(&ctx(0), &mut blackboard).expect("start");
    assert_eq!(instance.active_task(), Some(NodeId(1)));

    // 0.25 seconds at dt 0.1: still waiting after three ticks, done on the
    // fourth, pass finished on the fifth.
    for t in 1..=3u64 {
        instance.tick(&ctx(t), &mut blackboard);
        assert_eq!(instance.active_task(), Some(NodeId(1)));
    }
    instance.tick(&ctx(4), &mut blackboard);
    assert_eq!(instance.active_task(), None);
    instance.tick(&ctx(5), &mut blackboard);
    assert_eq!(instance.finished_passes(), 1);
}

#[test]
fn zero_duration_wait_succeeds_on_its_first_tick() {
    let def = TreeDef::new("wait", vec![NodeDef::root(vec![NodeDef::wait(0.0, 0.0)])]);
    let mut blackboard = board(vec![]);
    let mut instance = TreeInstance::new(Arc::new(def), Arc::new(BehaviorRegistry::new()));
    instance.start(&ctx(0), &mut blackboard).expect("start");

    instance.tick(&ctx(1), &mut blackboard);
    assert_eq!(instance.active_task(), None);
    instance.tick(&ctx(2), &mut blackboard);
    assert_eq!(instance.finished_passes(), 1);
}
