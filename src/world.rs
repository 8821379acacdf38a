// Copyright 2024 Saptak Santra
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! World: entities, their pooled components, and the per-tick driver.
//!
//! A world owns its own pools and component registry. Nothing here is a
//! process-wide global; two worlds never share pooled instances.
//!
//! Adding a component type an entity already carries is rejected with
//! [`EcsError::DuplicateComponent`] and the incoming instance is freed.
//! Use [`World::get_or_add`] for "reuse if present" semantics.

use crossbeam::channel::{self, Receiver, Sender};
use tracing::{debug, warn};

#[cfg(feature = "profiling")]
use tracing::info_span;

use crate::animation::{Animatable, FieldTarget, TweenValue};
use crate::component::Component;
use crate::entity::{Entity, EntityAllocator};
use crate::error::{EcsError, Result};
use crate::pool::{PoolRegistry, PoolStats, Poolable, Pooled};
use crate::registry::{ComponentRegistry, ComponentStore};
use crate::rewind::{RewindConfig, RewindController, RewindState};
use crate::system::System;
use crate::tween::{self, TweenScript, TweenStep};

/// Work produced off the tick path and applied at the next tick boundary
pub type DeferredJob = Box<dyn FnOnce(&mut World) -> Result<()> + Send>;

/// Central simulation state
pub struct World {
    pub(crate) entities: EntityAllocator,
    pub(crate) components: ComponentRegistry,
    pub(crate) pools: PoolRegistry,
    systems: Vec<Box<dyn System>>,
    rewind: Option<RewindController>,
    deferred_tx: Sender<DeferredJob>,
    deferred_rx: Receiver<DeferredJob>,
    pub(crate) tick: u64,
    pub(crate) time: f64,
}

impl World {
    /// Create an empty world with the built-in tween script component registered.
    pub fn new() -> Self {
        let (deferred_tx, deferred_rx) = channel::unbounded();
        let mut world = Self {
            entities: EntityAllocator::new(),
            components: ComponentRegistry::new(),
            pools: PoolRegistry::new(),
            systems: Vec::new(),
            rewind: None,
            deferred_tx,
            deferred_rx,
            tick: 0,
            time: 0.0,
        };
        // Fresh registry: the tween tag cannot collide yet.
        let _ = world.components.register::<TweenScript>();
        world.pools.register::<TweenScript>();
        world.pools.register::<TweenStep>();
        world
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Simulated seconds since creation (restored along with snapshots)
    pub fn time(&self) -> f64 {
        self.time
    }

    // ---------------------------------------------------------------------
    // Registration
    // ---------------------------------------------------------------------

    pub fn register_component<T: Component>(&mut self) -> Result<()> {
        self.components.register::<T>()?;
        self.pools.register::<T>();
        Ok(())
    }

    /// Register a component whose fields tween scripts may drive.
    pub fn register_animatable<T: Animatable>(&mut self) -> Result<()> {
        self.components.register_animatable::<T>()?;
        self.pools.register::<T>();
        Ok(())
    }

    /// Register a pool for a nested (non-component) poolable type.
    pub fn register_poolable<T: Poolable>(&mut self) {
        self.pools.register::<T>();
    }

    pub fn components(&self) -> &ComponentRegistry {
        &self.components
    }

    // ---------------------------------------------------------------------
    // Pools
    // ---------------------------------------------------------------------

    pub fn pools(&self) -> &PoolRegistry {
        &self.pools
    }

    pub fn pools_mut(&mut self) -> &mut PoolRegistry {
        &mut self.pools
    }

    #[must_use]
    pub fn alloc<T: Poolable>(&mut self) -> Pooled<T> {
        self.pools.alloc::<T>()
    }

    #[must_use]
    pub fn alloc_with<T: Poolable>(&mut self, configure: impl FnOnce(&mut T)) -> Pooled<T> {
        self.pools.alloc_with(configure)
    }

    /// Return an unattached instance to its pool.
    pub fn free<T: Poolable>(&mut self, item: Pooled<T>) -> Result<()> {
        self.pools.free(item)
    }

    pub fn pool_stats(&self) -> Vec<PoolStats> {
        self.pools.stats()
    }

    // ---------------------------------------------------------------------
    // Entities
    // ---------------------------------------------------------------------

    /// Spawn an entity with no components.
    pub fn spawn(&mut self) -> Entity {
        self.entities.allocate()
    }

    /// Spawn an entity and configure it through a builder.
    ///
    /// If the closure fails the half-built entity is despawned, so every
    /// component it attached goes back to its pool.
    pub fn entity<F>(&mut self, configure: F) -> Result<Entity>
    where
        F: FnOnce(&mut EntityBuilder<'_>) -> Result<()>,
    {
        let entity = self.spawn();
        let outcome = configure(&mut EntityBuilder {
            world: self,
            entity,
        });
        match outcome {
            Ok(()) => Ok(entity),
            Err(err) => {
                self.despawn(entity)?;
                Err(err)
            }
        }
    }

    pub fn is_alive(&self, entity: Entity) -> bool {
        self.entities.is_alive(entity)
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Live entities in ascending id order
    pub fn entities(&self) -> Vec<Entity> {
        self.entities.iter_alive().collect()
    }

    /// Remove the entity, freeing every attached component.
    pub fn despawn(&mut self, entity: Entity) -> Result<()> {
        if !self.entities.is_alive(entity) {
            return Err(EcsError::EntityNotFound(entity));
        }
        self.components.remove_all_of(entity, &mut self.pools);
        self.entities.free(entity);
        Ok(())
    }

    /// Despawn every entity. Afterwards every component pool has `in_use == 0`.
    pub fn clear(&mut self) {
        let live: Vec<Entity> = self.entities.iter_alive().collect();
        for entity in live {
            self.components.remove_all_of(entity, &mut self.pools);
            self.entities.free(entity);
        }
    }

    // ---------------------------------------------------------------------
    // Components
    // ---------------------------------------------------------------------

    /// Attach `component` to `entity`.
    ///
    /// On any error the component is freed back to its pool.
    pub fn add<T: Component>(&mut self, entity: Entity, component: Pooled<T>) -> Result<()> {
        if let Err(err) = self.check_attachable(entity) {
            let _ = self.pools.free(component);
            return Err(err);
        }
        let Some(store) = self.components.store_mut::<T>() else {
            let _ = self.pools.free(component);
            return Err(EcsError::UnregisteredComponent(std::any::type_name::<T>()));
        };
        match store.attach(entity, component) {
            Ok(()) => Ok(()),
            Err(rejected) => {
                let _ = self.pools.free(rejected);
                Err(EcsError::DuplicateComponent {
                    entity,
                    tag: T::TAG,
                })
            }
        }
    }

    /// Allocate, configure and attach in one step.
    pub fn add_with<T: Component>(
        &mut self,
        entity: Entity,
        configure: impl FnOnce(&mut T),
    ) -> Result<()> {
        let component = self.pools.alloc_with(configure);
        self.add(entity, component)
    }

    /// Detach and free a component, running remove hooks first.
    pub fn remove<T: Component>(&mut self, entity: Entity) -> Result<()> {
        if !self.entities.is_alive(entity) {
            return Err(EcsError::EntityNotFound(entity));
        }
        let store = self.store_mut::<T>()?;
        match store.detach(entity) {
            Some(item) => self.pools.free(item),
            None => Err(EcsError::MissingComponent {
                entity,
                tag: T::TAG,
            }),
        }
    }

    pub fn get<T: Component>(&self, entity: Entity) -> Option<&T> {
        self.components.store::<T>()?.get(entity)
    }

    pub fn get_mut<T: Component>(&mut self, entity: Entity) -> Option<&mut T> {
        self.components.store_mut::<T>()?.get_mut(entity)
    }

    /// Like [`get`](Self::get) but reports why nothing was found.
    pub fn try_get<T: Component>(&self, entity: Entity) -> Result<&T> {
        if !self.entities.is_alive(entity) {
            return Err(EcsError::EntityNotFound(entity));
        }
        self.components
            .store::<T>()
            .ok_or(EcsError::UnregisteredComponent(std::any::type_name::<T>()))?
            .get(entity)
            .ok_or(EcsError::MissingComponent {
                entity,
                tag: T::TAG,
            })
    }

    pub fn has<T: Component>(&self, entity: Entity) -> bool {
        self.components
            .store::<T>()
            .is_some_and(|store| store.contains(entity))
    }

    /// Existing component, or a freshly pooled default attached now.
    pub fn get_or_add<T: Component>(&mut self, entity: Entity) -> Result<&mut T> {
        self.check_attachable(entity)?;
        if !self.store_mut::<T>()?.contains(entity) {
            let fresh = self.pools.alloc::<T>();
            let store = self.store_mut::<T>()?;
            if let Err(rejected) = store.attach(entity, fresh) {
                let _ = self.pools.free(rejected);
            }
        }
        self.store_mut::<T>()?
            .get_mut(entity)
            .ok_or(EcsError::MissingComponent {
                entity,
                tag: T::TAG,
            })
    }

    /// Entities carrying `T`, ascending
    pub fn entities_with<T: Component>(&self) -> Vec<Entity> {
        self.components
            .store::<T>()
            .map(ComponentStore::entities)
            .unwrap_or_default()
    }

    /// Register a hook run right after a `T` is attached.
    ///
    /// Hooks see the component read-only and have no access to the pools.
    pub fn on_add<T: Component>(
        &mut self,
        hook: impl FnMut(Entity, &T) + Send + Sync + 'static,
    ) -> Result<()> {
        self.store_mut::<T>()?.push_on_add(Box::new(hook));
        Ok(())
    }

    /// Register a hook run right before a `T` is detached and freed.
    pub fn on_remove<T: Component>(
        &mut self,
        hook: impl FnMut(Entity, &T) + Send + Sync + 'static,
    ) -> Result<()> {
        self.store_mut::<T>()?.push_on_remove(Box::new(hook));
        Ok(())
    }

    pub(crate) fn store_mut<T: Component>(&mut self) -> Result<&mut ComponentStore<T>> {
        self.components
            .store_mut::<T>()
            .ok_or(EcsError::UnregisteredComponent(std::any::type_name::<T>()))
    }

    fn check_attachable(&self, entity: Entity) -> Result<()> {
        if entity.is_null() {
            return Err(EcsError::NullEntity);
        }
        if !self.entities.is_alive(entity) {
            return Err(EcsError::EntityNotFound(entity));
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Systems, deferred work, rewind
    // ---------------------------------------------------------------------

    /// Systems run in insertion order on every running tick.
    pub fn add_system(&mut self, system: impl System + 'static) -> &mut Self {
        self.systems.push(Box::new(system));
        self
    }

    /// Sender for work finished off the tick thread (asset loads and the like).
    /// Jobs are applied at the start of the next [`update`](Self::update) that
    /// is not rewinding; while a rewind is held they stay queued. A failing
    /// job does not stop the others.
    pub fn deferred_sender(&self) -> Sender<DeferredJob> {
        self.deferred_tx.clone()
    }

    pub fn defer(&self, job: impl FnOnce(&mut World) -> Result<()> + Send + 'static) {
        // Both channel ends live in `self`, so the send cannot fail.
        let _ = self.deferred_tx.send(Box::new(job));
    }

    /// Attach a rewind controller. Replaces any existing one and its history.
    pub fn enable_rewind(&mut self, config: RewindConfig) {
        self.rewind = Some(RewindController::new(config));
    }

    pub fn disable_rewind(&mut self) -> Option<RewindController> {
        self.rewind.take()
    }

    pub fn rewind(&self) -> Option<&RewindController> {
        self.rewind.as_ref()
    }

    pub fn rewind_mut(&mut self) -> Option<&mut RewindController> {
        self.rewind.as_mut()
    }

    pub fn request_rewind(&mut self) {
        match self.rewind.as_mut() {
            Some(rewind) => rewind.request_rewind(),
            None => warn!("rewind requested but no rewind controller is enabled"),
        }
    }

    pub fn release_rewind(&mut self) {
        if let Some(rewind) = self.rewind.as_mut() {
            rewind.release_rewind();
        }
    }

    pub fn trigger_pause(&mut self) {
        if let Some(rewind) = self.rewind.as_mut() {
            rewind.trigger_pause();
        }
    }

    pub fn resume(&mut self) {
        if let Some(rewind) = self.rewind.as_mut() {
            rewind.resume();
        }
    }

    /// Capture the current state into the rewind buffer right away.
    pub fn capture_rewind_point(&mut self) -> Result<()> {
        let Some(mut rewind) = self.rewind.take() else {
            return Ok(());
        };
        let outcome = rewind.capture(self);
        self.rewind = Some(rewind);
        outcome
    }

    /// Advance one tick.
    ///
    /// Order: deferred jobs (held while rewinding), then either the rewind
    /// controller's step (which simulates only while running) or a plain
    /// simulation step.
    pub fn update(&mut self, dt: f32) -> Result<()> {
        #[cfg(feature = "profiling")]
        let span = info_span!("world.update", tick = self.tick, entities = self.entity_count());
        #[cfg(feature = "profiling")]
        let _guard = span.enter();

        let rewinding = self
            .rewind
            .as_ref()
            .is_some_and(|rewind| rewind.state() == RewindState::Rewinding);
        if !rewinding {
            self.drain_deferred()?;
        }

        match self.rewind.take() {
            Some(mut rewind) => {
                let outcome = rewind.step(self, dt);
                self.rewind = Some(rewind);
                outcome
            }
            None => self.simulate(dt),
        }
    }

    /// One forward simulation step: systems, tweens, clock.
    pub(crate) fn simulate(&mut self, dt: f32) -> Result<()> {
        let mut systems = std::mem::take(&mut self.systems);
        let mut outcome = Ok(());
        for system in systems.iter_mut() {
            if let Err(err) = system.run(self, dt) {
                warn!(system = system.name(), error = %err, "system failed");
                outcome = Err(err);
                break;
            }
        }
        // Keep systems registered while running.
        systems.append(&mut self.systems);
        self.systems = systems;
        outcome?;

        tween::advance_scripts(self, dt);

        self.tick += 1;
        self.time += f64::from(dt);
        Ok(())
    }

    fn drain_deferred(&mut self) -> Result<()> {
        let jobs: Vec<DeferredJob> = self.deferred_rx.try_iter().collect();
        if !jobs.is_empty() {
            debug!(count = jobs.len(), "applying deferred jobs");
        }
        // Every drained job runs; the first failure is reported after the rest.
        let mut first_err = None;
        for job in jobs {
            if let Err(err) = job(self) {
                warn!(error = %err, "deferred job failed");
                first_err.get_or_insert(err);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl FieldTarget for World {
    fn read(&self, entity: Entity, component: &str, field: &str) -> Option<TweenValue> {
        self.components.read_field(entity, component, field)
    }

    fn write(&mut self, entity: Entity, component: &str, field: &str, value: TweenValue) -> bool {
        self.components.write_field(entity, component, field, value)
    }
}

/// Handed to [`World::entity`] configuration closures.
pub struct EntityBuilder<'w> {
    world: &'w mut World,
    entity: Entity,
}

impl EntityBuilder<'_> {
    pub fn entity(&self) -> Entity {
        self.entity
    }

    pub fn add<T: Component>(&mut self, component: Pooled<T>) -> Result<&mut Self> {
        self.world.add(self.entity, component)?;
        Ok(self)
    }

    /// Allocate a `T`, configure it, and attach it.
    pub fn with<T: Component>(&mut self, configure: impl FnOnce(&mut T)) -> Result<&mut Self> {
        self.world.add_with(self.entity, configure)?;
        Ok(self)
    }

    pub fn get_or_add<T: Component>(&mut self) -> Result<&mut T> {
        self.world.get_or_add::<T>(self.entity)
    }

    /// Pools for building nested values such as tween scripts.
    pub fn pools(&mut self) -> &mut PoolRegistry {
        &mut self.world.pools
    }
}
