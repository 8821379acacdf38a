#[cfg(test)]
mod tests {
    use rewind_ecs::prelude::*;
    use rewind_ecs::decode_pooled;
    use serde::{Deserialize, Serialize};
    use serde_json::Value;

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct Point {
        x: f32,
        y: f32,
    }
    rewind_ecs::plain_data!(Point);

    /// Component holding nested pooled values
    #[derive(Debug, Default)]
    struct Trail {
        points: Vec<Pooled<Point>>,
    }

    impl Poolable for Trail {
        fn reset(&mut self, pools: &mut PoolRegistry) {
            pools.free_all(self.points.drain(..));
        }

        fn copy_into(&self, target: &mut Self, pools: &mut PoolRegistry) {
            pools.free_all(target.points.drain(..));
            target.points = self.points.iter().map(|p| p.clone_in(pools)).collect();
        }
    }

    impl SnapshotData for Trail {
        fn encode(&self) -> Result<Value> {
            let points = self
                .points
                .iter()
                .map(|p| p.encode())
                .collect::<Result<Vec<_>>>()?;
            Ok(Value::Array(points))
        }

        fn decode(&mut self, data: &Value, pools: &mut PoolRegistry) -> Result<()> {
            let items = data
                .as_array()
                .ok_or_else(|| EcsError::DeserializationError("trail is not an array".into()))?;
            for item in items {
                let point = decode_pooled::<Point>(item, pools)?;
                self.points.push(point);
            }
            Ok(())
        }
    }

    impl Component for Trail {
        const TAG: &'static str = "trail";
    }

    fn assert_balanced(pools: &PoolRegistry) {
        for stats in pools.stats() {
            assert_eq!(
                stats.total_generated,
                stats.free_count + stats.in_use,
                "{} out of balance",
                stats.type_name
            );
        }
    }

    #[test]
    fn test_alloc_free_scenario() {
        let mut pools = PoolRegistry::new();
        let a = pools.alloc::<Point>();
        let b = pools.alloc::<Point>();
        let c = pools.alloc::<Point>();
        let stats = pools.stats_of::<Point>();
        assert_eq!((stats.total_generated, stats.in_use, stats.free_count), (3, 3, 0));

        pools.free(a).unwrap();
        pools.free(b).unwrap();
        let stats = pools.stats_of::<Point>();
        assert_eq!((stats.in_use, stats.free_count), (1, 2));

        let d = pools.alloc::<Point>();
        let stats = pools.stats_of::<Point>();
        assert_eq!((stats.total_generated, stats.in_use, stats.free_count), (3, 2, 1));

        pools.free_all([c, d]);
    }

    #[test]
    fn test_balance_holds_through_churn() {
        let mut pools = PoolRegistry::new();
        let mut live = Vec::new();
        let mut seed: u32 = 0x9e37_79b9;

        for _ in 0..2_000 {
            seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            if seed % 3 != 0 || live.is_empty() {
                live.push(pools.alloc_with::<Point>(|p| p.x = seed as f32));
            } else {
                let index = (seed as usize / 3) % live.len();
                let item = live.swap_remove(index);
                pools.free(item).unwrap();
            }
            assert!(pools.stats_of::<Point>().is_balanced());
            assert_eq!(pools.stats_of::<Point>().in_use, live.len());
        }

        pools.free_all(live.drain(..));
        let stats = pools.stats_of::<Point>();
        assert_eq!(stats.in_use, 0);
        assert_eq!(stats.free_count, stats.total_generated);
    }

    #[test]
    fn test_foreign_instance_is_rejected() {
        let mut ours = PoolRegistry::new();
        let mut theirs = PoolRegistry::new();
        let _held = ours.alloc::<Point>();
        let stranger = theirs.alloc::<Point>();

        let err = ours.free(stranger).unwrap_err();
        assert!(matches!(err, EcsError::PoolUnderflow { .. }));
        let stats = ours.stats_of::<Point>();
        assert_eq!((stats.total_generated, stats.in_use, stats.free_count), (1, 1, 0));
    }

    #[test]
    fn test_teardown_returns_nested_values() -> Result<()> {
        let mut world = World::new();
        world.register_component::<Trail>()?;
        world.register_poolable::<Point>();

        for i in 0..10 {
            world.entity(|b| {
                let points: Vec<_> = (0..3)
                    .map(|j| b.pools().alloc_with::<Point>(|p| p.x = (i * j) as f32))
                    .collect();
                b.with::<Trail>(|trail| trail.points = points)?;
                Ok(())
            })?;
        }
        assert_eq!(world.pools().stats_of::<Point>().in_use, 30);

        world.clear();
        assert_eq!(world.entity_count(), 0);
        for stats in world.pool_stats() {
            assert_eq!(stats.in_use, 0, "{}", stats.type_name);
            assert_eq!(stats.free_count, stats.total_generated, "{}", stats.type_name);
        }
        Ok(())
    }

    #[test]
    fn test_repeated_restores_reuse_instances() -> Result<()> {
        let mut world = World::new();
        world.register_component::<Trail>()?;
        for _ in 0..4 {
            world.entity(|b| {
                let points = vec![b.pools().alloc::<Point>(), b.pools().alloc::<Point>()];
                b.with::<Trail>(|trail| trail.points = points)?;
                Ok(())
            })?;
        }
        let snapshot = world.capture_snapshot()?;

        world.restore_snapshot(&snapshot)?;
        let after_first = world.pools().stats_of::<Point>().total_generated;
        for _ in 0..5 {
            world.restore_snapshot(&snapshot)?;
            assert_balanced(world.pools());
        }
        assert_eq!(world.pools().stats_of::<Point>().total_generated, after_first);
        assert_eq!(world.pools().stats_of::<Point>().in_use, 8);
        Ok(())
    }

    #[test]
    fn test_failed_nested_decode_frees_partial_values() {
        let mut pools = PoolRegistry::new();
        let bad = serde_json::json!([{ "x": 1.0, "y": 2.0 }, { "x": "oops" }]);
        assert!(decode_pooled::<Trail>(&bad, &mut pools).is_err());
        assert_eq!(pools.stats_of::<Point>().in_use, 0);
        assert_eq!(pools.stats_of::<Trail>().in_use, 0);
        assert_balanced(&pools);
    }
}
