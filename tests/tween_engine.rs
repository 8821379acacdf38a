#[cfg(test)]
mod tests {
    use glam::{Vec2, Vec4};
    use rewind_ecs::prelude::*;
    use rewind_ecs::TweenStep;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct Transform {
        position: Vec2,
        scale: f32,
    }
    rewind_ecs::plain_component!(Transform, "transform");

    impl Animatable for Transform {
        fn read_field(&self, field: &str) -> Option<TweenValue> {
            match field {
                "position" => Some(TweenValue::Vec2(self.position)),
                "scale" => Some(TweenValue::Scalar(self.scale)),
                _ => None,
            }
        }

        fn write_field(&mut self, field: &str, value: TweenValue) -> bool {
            match (field, value) {
                ("position", TweenValue::Vec2(v)) => self.position = v,
                ("scale", TweenValue::Scalar(v)) => self.scale = v,
                _ => return false,
            }
            true
        }
    }

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct Tint {
        color: Vec4,
    }
    rewind_ecs::plain_component!(Tint, "tint");

    impl Animatable for Tint {
        fn read_field(&self, field: &str) -> Option<TweenValue> {
            (field == "color").then_some(TweenValue::Color(self.color))
        }

        fn write_field(&mut self, field: &str, value: TweenValue) -> bool {
            match (field, value) {
                ("color", TweenValue::Color(c)) => {
                    self.color = c;
                    true
                }
                _ => false,
            }
        }
    }

    fn world() -> World {
        let mut world = World::new();
        world.register_animatable::<Transform>().unwrap();
        world.register_animatable::<Tint>().unwrap();
        world
    }

    fn scale_of(world: &World, e: Entity) -> f32 {
        world.get::<Transform>(e).map(|t| t.scale).unwrap_or(f32::NAN)
    }

    #[test]
    fn test_overshoot_carries_over() -> Result<()> {
        let mut world = world();
        let e = world.entity(|b| {
            b.with::<Transform>(|_| {})?;
            Ok(())
        })?;
        let script = TweenScript::builder(world.pools_mut())
            .tween(FieldTween::new("transform", "scale", TweenValue::Scalar(10.0)), 1.0, Easing::Linear)
            .tween(FieldTween::new("transform", "scale", TweenValue::Scalar(20.0)), 1.0, Easing::Linear)
            .build();
        world.add(e, script)?;

        world.update(0.6)?;
        world.update(0.6)?;

        let script = world.get::<TweenScript>(e).unwrap();
        assert_eq!(script.index(), 1);
        assert!((script.time_progress() - 0.2).abs() < 1e-5);
        assert!((scale_of(&world, e) - 12.0).abs() < 1e-4);
        Ok(())
    }

    #[test]
    fn test_exact_values_at_step_boundaries() -> Result<()> {
        let mut world = world();
        let e = world.entity(|b| {
            b.with::<Transform>(|t| t.scale = 0.1)?;
            Ok(())
        })?;
        let script = TweenScript::builder(world.pools_mut())
            .tween_delayed(
                FieldTween::new("transform", "scale", TweenValue::Scalar(0.7)),
                0.25,
                0.5,
                Easing::ExponentialInOut,
            )
            .build();
        world.add(e, script)?;

        world.update(0.25)?;
        assert_eq!(scale_of(&world, e), 0.1);
        world.update(0.5)?;
        assert_eq!(scale_of(&world, e), 0.7);
        Ok(())
    }

    #[test]
    fn test_parallel_vec2_and_color() -> Result<()> {
        let mut world = world();
        let e = world.entity(|b| {
            b.with::<Transform>(|_| {})?.with::<Tint>(|t| t.color = Vec4::ONE)?;
            Ok(())
        })?;
        let script = TweenScript::builder(world.pools_mut())
            .parallel(0.0, |group| {
                group
                    .tween(
                        FieldTween::new("transform", "position", TweenValue::Vec2(Vec2::new(4.0, 8.0))),
                        1.0,
                        Easing::Linear,
                    )
                    .tween(
                        FieldTween::new("tint", "color", TweenValue::Color(Vec4::new(1.0, 0.0, 0.0, 1.0))),
                        2.0,
                        Easing::Linear,
                    );
            })
            .on_complete(ScriptCompletion::Remove)
            .build();
        world.add(e, script)?;

        world.update(0.5)?;
        assert_eq!(world.get::<Transform>(e).map(|t| t.position), Some(Vec2::new(2.0, 4.0)));
        world.update(1.0)?;
        assert_eq!(world.get::<Transform>(e).map(|t| t.position), Some(Vec2::new(4.0, 8.0)));
        assert!(world.has::<TweenScript>(e));

        world.update(0.5)?;
        assert_eq!(
            world.get::<Tint>(e).map(|t| t.color),
            Some(Vec4::new(1.0, 0.0, 0.0, 1.0))
        );
        assert!(!world.has::<TweenScript>(e));
        assert_eq!(world.pools().stats_of::<TweenStep>().in_use, 0);
        Ok(())
    }

    #[test]
    fn test_script_drives_other_entity() -> Result<()> {
        let mut world = world();
        let target = world.entity(|b| {
            b.with::<Transform>(|_| {})?;
            Ok(())
        })?;
        let director = world.spawn();
        let script = TweenScript::builder(world.pools_mut())
            .tween(
                FieldTween::new("transform", "scale", TweenValue::Scalar(3.0)).on(target),
                1.0,
                Easing::Linear,
            )
            .build();
        world.add(director, script)?;

        world.update(1.0)?;
        assert_eq!(scale_of(&world, target), 3.0);
        Ok(())
    }

    #[test]
    fn test_despawned_target_is_skipped() -> Result<()> {
        let mut world = world();
        let target = world.entity(|b| {
            b.with::<Transform>(|_| {})?;
            Ok(())
        })?;
        let director = world.spawn();
        let script = TweenScript::builder(world.pools_mut())
            .tween(
                FieldTween::new("transform", "scale", TweenValue::Scalar(3.0)).on(target),
                1.0,
                Easing::Linear,
            )
            .build();
        world.add(director, script)?;
        world.update(0.5)?;
        world.despawn(target)?;

        world.update(1.0)?;
        assert!(!world.get::<TweenScript>(director).unwrap().is_active());
        Ok(())
    }

    #[test]
    fn test_restart_loops_forever() -> Result<()> {
        let mut world = world();
        let e = world.entity(|b| {
            b.with::<Transform>(|_| {})?;
            Ok(())
        })?;
        let script = TweenScript::builder(world.pools_mut())
            .tween(
                FieldTween::new("transform", "scale", TweenValue::Scalar(1.0)).from(TweenValue::Scalar(0.0)),
                1.0,
                Easing::Linear,
            )
            .restart_from(0)
            .build();
        world.add(e, script)?;

        for _ in 0..10 {
            world.update(0.75)?;
        }
        // 7.5s into a 1s loop
        assert!((scale_of(&world, e) - 0.5).abs() < 1e-4);
        assert!(world.get::<TweenScript>(e).unwrap().is_active());
        Ok(())
    }

    #[test]
    fn test_removed_script_comes_back_on_rewind() -> Result<()> {
        let mut world = world();
        world.enable_rewind(RewindConfig::default());
        let e = world.entity(|b| {
            b.with::<Transform>(|_| {})?;
            Ok(())
        })?;
        let script = TweenScript::builder(world.pools_mut())
            .tween(FieldTween::new("transform", "scale", TweenValue::Scalar(2.0)), 0.5, Easing::Linear)
            .on_complete(ScriptCompletion::Remove)
            .build();
        world.add(e, script)?;

        world.update(0.25)?;
        world.update(0.25)?;
        assert!(!world.has::<TweenScript>(e));

        world.request_rewind();
        world.update(0.25)?;
        world.update(0.25)?;
        assert!(world.has::<TweenScript>(e));
        assert_eq!(scale_of(&world, e), 1.0);

        world.release_rewind();
        world.resume();
        world.update(0.25)?;
        assert_eq!(scale_of(&world, e), 2.0);
        assert!(!world.has::<TweenScript>(e));
        assert_eq!(world.pools().stats_of::<TweenScript>().in_use, 0);
        Ok(())
    }
}
