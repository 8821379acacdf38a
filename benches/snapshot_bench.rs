use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rewind_ecs::{RewindConfig, World, WorldSnapshot};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Position {
    x: f32,
    y: f32,
}
rewind_ecs::plain_component!(Position, "pos");

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Health {
    hp: f32,
    max_hp: f32,
}
rewind_ecs::plain_component!(Health, "health");

fn create_test_world(entity_count: usize) -> World {
    let mut world = World::new();
    world.register_component::<Position>().unwrap();
    world.register_component::<Health>().unwrap();
    for i in 0..entity_count {
        world
            .entity(|b| {
                b.with::<Position>(|p| {
                    p.x = i as f32;
                    p.y = (i * 2) as f32;
                })?;
                b.with::<Health>(|h| {
                    h.hp = 100.0;
                    h.max_hp = 100.0;
                })?;
                Ok(())
            })
            .unwrap();
    }
    world
}

fn bench_capture_1000_entities(c: &mut Criterion) {
    let world = create_test_world(1000);
    c.bench_function("capture_1000_entities", |b| {
        b.iter(|| black_box(world.capture_snapshot().unwrap()))
    });
}

fn bench_restore_1000_entities(c: &mut Criterion) {
    let mut world = create_test_world(1000);
    let snapshot = world.capture_snapshot().unwrap();
    c.bench_function("restore_1000_entities", |b| {
        b.iter(|| black_box(world.restore_snapshot(&snapshot).unwrap()))
    });
}

fn bench_json_round_trip_100_entities(c: &mut Criterion) {
    let snapshot = create_test_world(100).capture_snapshot().unwrap();
    c.bench_function("json_round_trip_100_entities", |b| {
        b.iter(|| {
            let json = snapshot.to_json().unwrap();
            black_box(WorldSnapshot::from_json(&json).unwrap())
        })
    });
}

fn bench_tick_with_rewind_capture(c: &mut Criterion) {
    let mut world = create_test_world(250);
    world.enable_rewind(RewindConfig::default().with_capacity(60));
    c.bench_function("tick_capture_250_entities", |b| {
        b.iter(|| world.update(black_box(1.0 / 60.0)).unwrap())
    });
}

criterion_group!(
    benches,
    bench_capture_1000_entities,
    bench_restore_1000_entities,
    bench_json_round_trip_100_entities,
    bench_tick_with_rewind_capture
);
criterion_main!(benches);
