//! Benchmarks for event push throughput and projection catch-up rate:
//! criterion groups per concern, `BenchmarkId`/`Throughput` for the
//! size-scaling ones, exercised over this crate's `org` aggregate.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use iam_core::aggregates::org::{OrgEvent, OrgWriteModel};
use iam_core::id::Creator;
use iam_core::{AggregateId, Command, InstanceId};
use iam_events::ProjectionRunner;
use iam_infra::event_log::{EventLog, InMemoryEventLog};
use iam_infra::projections::generic::WriteModelProjection;
use iam_infra::read_model::InMemoryInstanceStore;

fn add_org(instance_id: InstanceId, org_id: AggregateId, name: &str) -> Command {
    Command::from_event(instance_id, org_id, org_id, Creator::System, &OrgEvent::Added { name: name.to_string() })
        .unwrap()
}

fn change_org(instance_id: InstanceId, org_id: AggregateId, name: &str) -> Command {
    Command::from_event(
        instance_id,
        org_id,
        org_id,
        Creator::System,
        &OrgEvent::Changed { name: Some(name.to_string()) },
    )
    .unwrap()
}

fn bench_push_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("event_log_push_latency");
    group.sample_size(1000);

    group.bench_function("push_fresh_aggregate", |b| {
        let log = InMemoryEventLog::new();
        let instance_id = InstanceId::new();
        b.iter(|| {
            let org_id = AggregateId::new();
            log.push(vec![black_box(add_org(instance_id, org_id, "acme"))]).unwrap();
        });
    });

    group.bench_function("push_against_existing_history", |b| {
        let log = InMemoryEventLog::new();
        let instance_id = InstanceId::new();
        let org_id = AggregateId::new();
        log.push(vec![add_org(instance_id, org_id, "acme")]).unwrap();

        b.iter(|| {
            log.push(vec![black_box(change_org(instance_id, org_id, "acme-renamed"))]).unwrap();
        });
    });

    group.finish();
}

fn bench_push_batch_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("event_log_push_batch_throughput");

    for batch_size in [1, 10, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*batch_size as u64));
        group.bench_with_input(BenchmarkId::new("batch_push", batch_size), batch_size, |b, &size| {
            let log = InMemoryEventLog::new();
            let instance_id = InstanceId::new();
            let org_id = AggregateId::new();
            log.push(vec![add_org(instance_id, org_id, "acme")]).unwrap();

            b.iter(|| {
                let commands: Vec<Command> =
                    (0..size).map(|i| change_org(instance_id, org_id, &format!("acme-{i}"))).collect();
                black_box(log.push(commands).unwrap());
            });
        });
    }

    group.finish();
}

fn bench_projection_rebuild_speed(c: &mut Criterion) {
    let mut group = c.benchmark_group("projection_rebuild_speed");

    for event_count in [10, 100, 1000, 10_000].iter() {
        group.bench_with_input(
            BenchmarkId::new("rebuild_from_events", event_count),
            event_count,
            |b, &count| {
                let log = InMemoryEventLog::new();
                let instance_id = InstanceId::new();
                let org_id = AggregateId::new();
                log.push(vec![add_org(instance_id, org_id, "acme")]).unwrap();
                for i in 0..(count - 1) {
                    log.push(vec![change_org(instance_id, org_id, &format!("acme-{i}"))]).unwrap();
                }
                let events = log.load_stream(instance_id, "org", org_id).unwrap();

                b.iter(|| {
                    let store: InMemoryInstanceStore<AggregateId, OrgWriteModel> = InMemoryInstanceStore::new();
                    let projection = WriteModelProjection::new("org", instance_id, store);
                    let mut runner = ProjectionRunner::new(projection);
                    runner.run(black_box(&events)).unwrap();
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_push_latency, bench_push_batch_throughput, bench_projection_rebuild_speed);
criterion_main!(benches);
