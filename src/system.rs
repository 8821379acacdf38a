//! System trait

use crate::error::Result;
use crate::World;

/// Gameplay logic run once per running tick.
///
/// Systems are not run while the world is rewinding or paused.
pub trait System: Send + Sync {
    /// Get system name
    fn name(&self) -> &'static str;

    fn run(&mut self, world: &mut World, dt: f32) -> Result<()>;
}

/// System backed by a closure
pub struct FnSystem<F> {
    name: &'static str,
    func: F,
}

impl<F> FnSystem<F>
where
    F: FnMut(&mut World, f32) -> Result<()> + Send + Sync,
{
    pub fn new(name: &'static str, func: F) -> Self {
        Self { name, func }
    }
}

impl<F> System for FnSystem<F>
where
    F: FnMut(&mut World, f32) -> Result<()> + Send + Sync,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn run(&mut self, world: &mut World, dt: f32) -> Result<()> {
        (self.func)(world, dt)
    }
}
