//! Drives a small world forward, scrubs it back, resumes, and prints pool usage.
//!
//! Run with `--features profiling` to see the tracing output.

use std::time::Instant;

use glam::Vec2;
use rewind_ecs::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Body {
    position: Vec2,
    velocity: Vec2,
}
rewind_ecs::plain_component!(Body, "body");

impl Animatable for Body {
    fn read_field(&self, field: &str) -> Option<TweenValue> {
        match field {
            "position" => Some(TweenValue::Vec2(self.position)),
            "velocity" => Some(TweenValue::Vec2(self.velocity)),
            _ => None,
        }
    }

    fn write_field(&mut self, field: &str, value: TweenValue) -> bool {
        match (field, value) {
            ("position", TweenValue::Vec2(v)) => self.position = v,
            ("velocity", TweenValue::Vec2(v)) => self.velocity = v,
            _ => return false,
        }
        true
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Chase {
    target: Entity,
}
rewind_ecs::plain_component!(Chase, "chase", entities: [target]);

const DT: f32 = 1.0 / 60.0;

fn integrate(world: &mut World, dt: f32) -> Result<()> {
    for e in world.entities_with::<Body>() {
        if let Some(body) = world.get_mut::<Body>(e) {
            body.position += body.velocity * dt;
        }
    }
    Ok(())
}

fn print_pools(label: &str, world: &World) {
    println!("{label}: {} entities, tick {}", world.entity_count(), world.tick());
    for stats in world.pool_stats() {
        println!(
            "  {:<40} generated {:>4}  in use {:>4}  free {:>4}",
            stats.type_name, stats.total_generated, stats.in_use, stats.free_count
        );
    }
}

fn main() -> Result<()> {
    #[cfg(feature = "profiling")]
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let mut world = World::new();
    world.register_animatable::<Body>()?;
    world.register_component::<Chase>()?;
    world.pools_mut().preallocate::<Body>(64);
    world.add_system(FnSystem::new("integrate", integrate));
    world.enable_rewind(RewindConfig::default().with_capacity(120));

    let leader = world.entity(|b| {
        b.with::<Body>(|body| body.velocity = Vec2::new(1.0, 0.0))?;
        Ok(())
    })?;
    for i in 0..16 {
        world.entity(|b| {
            b.with::<Body>(|body| body.position = Vec2::new(0.0, i as f32))?;
            b.with::<Chase>(|chase| chase.target = leader)?;
            let script = TweenScript::builder(b.pools())
                .wait(0.25)
                .tween(
                    FieldTween::new("body", "velocity", TweenValue::Vec2(Vec2::new(0.5, -0.1))),
                    1.0,
                    Easing::CubicInOut,
                )
                .build();
            b.add(script)?;
            Ok(())
        })?;
    }

    let start = Instant::now();
    for _ in 0..180 {
        world.update(DT)?;
    }
    println!("simulated 180 ticks in {:?}", start.elapsed());
    print_pools("after forward play", &world);

    world.request_rewind();
    for _ in 0..90 {
        world.update(DT)?;
    }
    world.release_rewind();
    print_pools("after rewinding 90 ticks", &world);

    world.resume();
    for _ in 0..60 {
        world.update(DT)?;
    }
    print_pools("after resuming", &world);

    if let Some(rewind) = world.rewind() {
        println!(
            "history holds {} snapshots (ticks {:?}..={:?})",
            rewind.buffer().len(),
            rewind.buffer().ticks().first(),
            rewind.buffer().ticks().last()
        );
    }

    world.clear();
    print_pools("after clear", &world);
    Ok(())
}
