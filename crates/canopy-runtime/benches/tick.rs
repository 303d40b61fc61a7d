use std::sync::Arc;

use canopy_core::{
    AbortMode, BehaviorKey, Blackboard, BlackboardDef, CompareOp, DecoratorDef, FieldDef, NodeDef,
    Params, ServiceDef, TaskStatus, TickContext, TreeDef,
};
use canopy_runtime::{BehaviorRegistry, NodeContext, ServiceBehavior, TaskBehavior, TreeInstance};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

struct IdleTask;

impl TaskBehavior for IdleTask {
    fn tick(&mut self, _ctx: &mut NodeContext<'_>) -> TaskStatus {
        TaskStatus::Running
    }
}

struct InstantTask;

impl TaskBehavior for InstantTask {
    fn on_activation(&mut self, _ctx: &mut NodeContext<'_>) -> TaskStatus {
        TaskStatus::Success
    }

    fn tick(&mut self, _ctx: &mut NodeContext<'_>) -> TaskStatus {
        TaskStatus::Success
    }
}

struct NullService;

impl ServiceBehavior for NullService {
    fn fire(&mut self, _ctx: &mut NodeContext<'_>) {}
}

fn registry() -> Arc<BehaviorRegistry> {
    let mut registry = BehaviorRegistry::new();
    registry.register_task(BehaviorKey("idle"), |_params| Box::new(IdleTask));
    registry.register_task(BehaviorKey("instant"), |_params| Box::new(InstantTask));
    registry.register_service(BehaviorKey("svc"), |_params| Box::new(NullService));
    Arc::new(registry)
}

fn board(fields: Vec<FieldDef>) -> Blackboard {
    let mut def = BlackboardDef::new();
    for field in fields {
        def.push(field).expect("unique field name");
    }
    Blackboard::new(Arc::new(def))
}

fn bench_parked_tick(c: &mut Criterion) {
    let svc = || ServiceDef::new(BehaviorKey("svc"), 0.5);
    let def = TreeDef::new(
        "parked",
        vec![NodeDef::root(vec![NodeDef::selector(vec![NodeDef::sequence(
            vec![NodeDef::task(BehaviorKey("idle"), Params::new())
                .with_service(svc())
                .with_service(svc())],
        )
        .with_service(svc())])
        .with_service(svc())])],
    );

    let mut blackboard = board(vec![]);
    let mut instance = TreeInstance::new(Arc::new(def), registry());
    instance
        .start(
            &TickContext {
                tick: 0,
                dt_seconds: 0.1,
                seed: 0,
            },
            &mut blackboard,
        )
        .expect("start");

    let mut tick: u64 = 1;
    c.bench_function("canopy/tick(parked, services=4)", |b| {
        b.iter(|| {
            let ctx = TickContext {
                tick,
                dt_seconds: 0.1,
                seed: 0,
            };
            instance.tick(&ctx, &mut blackboard);
            black_box(instance.active_task());
            tick = tick.wrapping_add(1);
        })
    });
}

fn bench_weighted_passes(c: &mut Criterion) {
    let def = TreeDef::new(
        "weighted",
        vec![NodeDef::root(vec![NodeDef::weighted_selector(
            vec![30, 70],
            vec![
                NodeDef::task(BehaviorKey("instant"), Params::new()),
                NodeDef::task(BehaviorKey("instant"), Params::new()),
            ],
        )])],
    );

    let mut blackboard = board(vec![]);
    let mut instance = TreeInstance::new(Arc::new(def), registry());
    instance
        .start(
            &TickContext {
                tick: 0,
                dt_seconds: 0.1,
                seed: 0,
            },
            &mut blackboard,
        )
        .expect("start");

    let mut tick: u64 = 1;
    c.bench_function("canopy/tick(weighted pass)", |b| {
        b.iter(|| {
            let ctx = TickContext {
                tick,
                dt_seconds: 0.1,
                seed: 0,
            };
            instance.tick(&ctx, &mut blackboard);
            black_box(instance.finished_passes());
            tick = tick.wrapping_add(1);
        })
    });
}

fn bench_armed_guards(c: &mut Criterion) {
    // Sixteen rejected branches keep their abort guards relevant, so every
    // tick re-scans all of them before the parked task runs.
    let mut children: Vec<NodeDef> = (0..16)
        .map(|_| {
            NodeDef::task(BehaviorKey("idle"), Params::new()).with_decorator(
                DecoratorDef::blackboard("alert", CompareOp::Eq, true)
                    .with_abort(AbortMode::LowerPriority),
            )
        })
        .collect();
    children.push(NodeDef::task(BehaviorKey("idle"), Params::new()));
    let def = TreeDef::new(
        "guards",
        vec![NodeDef::root(vec![NodeDef::selector(children)])],
    );

    let mut blackboard = board(vec![FieldDef::new("alert", false)]);
    let mut instance = TreeInstance::new(Arc::new(def), registry());
    instance
        .start(
            &TickContext {
                tick: 0,
                dt_seconds: 0.1,
                seed: 0,
            },
            &mut blackboard,
        )
        .expect("start");

    let mut tick: u64 = 1;
    c.bench_function("canopy/tick(guards=16)", |b| {
        b.iter(|| {
            let ctx = TickContext {
                tick,
                dt_seconds: 0.1,
                seed: 0,
            };
            instance.tick(&ctx, &mut blackboard);
            black_box(instance.relevant_auxiliaries().len());
            tick = tick.wrapping_add(1);
        })
    });
}

criterion_group!(
    benches,
    bench_parked_tick,
    bench_weighted_passes,
    bench_armed_guards
);
criterion_main!(benches);
