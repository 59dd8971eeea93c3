use criterion::{black_box, criterion_group, criterion_main, Criterion};
use statecraft_core::prelude::*;

fn ping_pong_chart() -> std::sync::Arc<statecraft_core::chart::Chart> {
    std::sync::Arc::new(
        ChartBuilder::new(
            "root",
            NodeSpec::compound("root", "a")
                .child(NodeSpec::atomic("a").on("toggle", TransitionSpec::new().target("b")))
                .child(NodeSpec::atomic("b").on("toggle", TransitionSpec::new().target("a"))),
        )
        .build()
        .unwrap(),
    )
}

fn start_stop_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("start and stop a two-state machine", |b| {
        b.to_async(&runtime).iter(|| async {
            let machine = Machine::new(ping_pong_chart(), std::sync::Arc::new(Registry::new()), MachineOptions::default());
            machine.start().await.unwrap();
            black_box(machine.active_leaves().await);
            machine.stop().await.unwrap();
        });
    });
}

fn send_event_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let machine = runtime.block_on(async {
        let machine = Machine::new(ping_pong_chart(), std::sync::Arc::new(Registry::new()), MachineOptions::default());
        machine.start().await.unwrap();
        machine
    });

    c.bench_function("send a single event through one microstep", |b| {
        b.to_async(&runtime).iter(|| async {
            machine.send(black_box("toggle")).await.unwrap();
        });
    });

    runtime.block_on(async {
        machine.stop().await.unwrap();
    });
}

criterion_group!(benches, start_stop_benchmark, send_event_benchmark);
criterion_main!(benches);
