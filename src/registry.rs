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

//! Component registry: per-type stores of attached instances plus lifecycle hooks.
//!
//! Stores are kept in registration order. Every walk over them (despawn,
//! capture, restore) follows that order, so hook invocation is deterministic.

use std::any::{Any, TypeId};

use ahash::AHashMap;
use serde_json::Value;
use tracing::warn;

use crate::animation::{Animatable, TweenValue};
use crate::component::{decode_pooled, Component};
use crate::entity::Entity;
use crate::error::{EcsError, Result};
use crate::pool::{PoolRegistry, Pooled};

/// Lifecycle hook. Receives the entity and a read-only view of the component.
pub type Hook<T> = Box<dyn FnMut(Entity, &T) + Send + Sync>;

/// Decoded component waiting to be attached during a restore
pub(crate) type Staged = Box<dyn Any + Send + Sync>;

struct FieldAccess<T> {
    read: fn(&T, &str) -> Option<TweenValue>,
    write: fn(&mut T, &str, TweenValue) -> bool,
}

/// Instances of one component type, keyed by owning entity.
pub struct ComponentStore<T: Component> {
    instances: AHashMap<Entity, Pooled<T>>,
    on_add: Vec<Hook<T>>,
    on_remove: Vec<Hook<T>>,
    fields: Option<FieldAccess<T>>,
}

impl<T: Component> ComponentStore<T> {
    fn new() -> Self {
        Self {
            instances: AHashMap::new(),
            on_add: Vec::new(),
            on_remove: Vec::new(),
            fields: None,
        }
    }

    pub fn get(&self, entity: Entity) -> Option<&T> {
        self.instances.get(&entity).map(|item| &**item)
    }

    pub fn get_mut(&mut self, entity: Entity) -> Option<&mut T> {
        self.instances.get_mut(&entity).map(|item| &mut **item)
    }

    pub fn contains(&self, entity: Entity) -> bool {
        self.instances.contains_key(&entity)
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Owning entities in ascending order
    pub fn entities(&self) -> Vec<Entity> {
        let mut entities: Vec<_> = self.instances.keys().copied().collect();
        entities.sort_unstable();
        entities
    }

    /// Attach and run add hooks. Hands the item back if the slot is taken.
    pub(crate) fn attach(
        &mut self,
        entity: Entity,
        item: Pooled<T>,
    ) -> std::result::Result<(), Pooled<T>> {
        if self.instances.contains_key(&entity) {
            return Err(item);
        }
        self.instances.insert(entity, item);
        if let Some(attached) = self.instances.get(&entity) {
            for hook in &mut self.on_add {
                hook(entity, attached);
            }
        }
        Ok(())
    }

    /// Run remove hooks, then detach. The caller frees the returned item.
    pub(crate) fn detach(&mut self, entity: Entity) -> Option<Pooled<T>> {
        let attached = self.instances.get(&entity)?;
        for hook in &mut self.on_remove {
            hook(entity, attached);
        }
        self.instances.remove(&entity)
    }

    /// Detach without hooks, for temporary checkout by the tween engine.
    pub(crate) fn take_raw(&mut self, entity: Entity) -> Option<Pooled<T>> {
        self.instances.remove(&entity)
    }

    /// Counterpart to [`take_raw`](Self::take_raw).
    pub(crate) fn put_raw(&mut self, entity: Entity, item: Pooled<T>) {
        self.instances.insert(entity, item);
    }

    pub(crate) fn push_on_add(&mut self, hook: Hook<T>) {
        self.on_add.push(hook);
    }

    pub(crate) fn push_on_remove(&mut self, hook: Hook<T>) {
        self.on_remove.push(hook);
    }
}

impl<T: Animatable> ComponentStore<T> {
    fn enable_fields(&mut self) {
        self.fields = Some(FieldAccess {
            read: T::read_field,
            write: T::write_field,
        });
    }
}

/// Type-erased view of a [`ComponentStore`].
pub(crate) trait ErasedStore: Send + Sync {
    fn tag(&self) -> &'static str;
    fn type_name(&self) -> &'static str;
    fn contains(&self, entity: Entity) -> bool;
    fn len(&self) -> usize;

    /// Detach with hooks and free. Returns false when nothing was attached.
    fn remove(&mut self, entity: Entity, pools: &mut PoolRegistry) -> bool;

    fn encode(&self, entity: Entity) -> Option<Result<Value>>;
    fn decode_staged(&self, data: &Value, pools: &mut PoolRegistry) -> Result<Staged>;
    fn visit_staged(&self, staged: &mut Staged, visitor: &mut dyn FnMut(&mut Entity));
    fn attach_staged(&mut self, entity: Entity, staged: Staged, pools: &mut PoolRegistry);
    fn discard_staged(&self, staged: Staged, pools: &mut PoolRegistry);

    fn read_field(&self, entity: Entity, field: &str) -> Option<TweenValue>;
    fn write_field(&mut self, entity: Entity, field: &str, value: TweenValue) -> bool;

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Component> ErasedStore for ComponentStore<T> {
    fn tag(&self) -> &'static str {
        T::TAG
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn contains(&self, entity: Entity) -> bool {
        self.instances.contains_key(&entity)
    }

    fn len(&self) -> usize {
        self.instances.len()
    }

    fn remove(&mut self, entity: Entity, pools: &mut PoolRegistry) -> bool {
        match self.detach(entity) {
            Some(item) => {
                let _ = pools.free(item);
                true
            }
            None => false,
        }
    }

    fn encode(&self, entity: Entity) -> Option<Result<Value>> {
        self.instances.get(&entity).map(|item| item.encode())
    }

    fn decode_staged(&self, data: &Value, pools: &mut PoolRegistry) -> Result<Staged> {
        let item = decode_pooled::<T>(data, pools)?;
        Ok(Box::new(item))
    }

    fn visit_staged(&self, staged: &mut Staged, visitor: &mut dyn FnMut(&mut Entity)) {
        if let Some(item) = staged.downcast_mut::<Pooled<T>>() {
            item.visit_entities(visitor);
        }
    }

    fn attach_staged(&mut self, entity: Entity, staged: Staged, pools: &mut PoolRegistry) {
        match staged.downcast::<Pooled<T>>() {
            Ok(item) => {
                if let Err(item) = self.attach(entity, *item) {
                    warn!(tag = T::TAG, %entity, "restored component collides; freeing it");
                    let _ = pools.free(item);
                }
            }
            Err(_) => warn!(tag = T::TAG, %entity, "staged value has the wrong type"),
        }
    }

    fn discard_staged(&self, staged: Staged, pools: &mut PoolRegistry) {
        if let Ok(item) = staged.downcast::<Pooled<T>>() {
            let _ = pools.free(*item);
        }
    }

    fn read_field(&self, entity: Entity, field: &str) -> Option<TweenValue> {
        let access = self.fields.as_ref()?;
        (access.read)(self.instances.get(&entity)?, field)
    }

    fn write_field(&mut self, entity: Entity, field: &str, value: TweenValue) -> bool {
        let Some(access) = self.fields.as_ref() else {
            return false;
        };
        match self.instances.get_mut(&entity) {
            Some(item) => (access.write)(item, field, value),
            None => false,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Maps component types and tags to their stores.
#[derive(Default)]
pub struct ComponentRegistry {
    stores: Vec<Box<dyn ErasedStore>>,
    by_type: AHashMap<TypeId, usize>,
    by_tag: AHashMap<&'static str, usize>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T`. Registering the same type twice is a no-op; a different
    /// type reusing an existing tag is rejected.
    pub fn register<T: Component>(&mut self) -> Result<()> {
        if self.by_type.contains_key(&TypeId::of::<T>()) {
            return Ok(());
        }
        if self.by_tag.contains_key(T::TAG) {
            return Err(EcsError::TagConflict(T::TAG));
        }
        let index = self.stores.len();
        self.stores.push(Box::new(ComponentStore::<T>::new()));
        self.by_type.insert(TypeId::of::<T>(), index);
        self.by_tag.insert(T::TAG, index);
        Ok(())
    }

    pub fn register_animatable<T: Animatable>(&mut self) -> Result<()> {
        self.register::<T>()?;
        self.store_mut::<T>()
            .ok_or(EcsError::UnregisteredComponent(std::any::type_name::<T>()))?
            .enable_fields();
        Ok(())
    }

    pub fn is_registered<T: Component>(&self) -> bool {
        self.by_type.contains_key(&TypeId::of::<T>())
    }

    pub fn store<T: Component>(&self) -> Option<&ComponentStore<T>> {
        let index = *self.by_type.get(&TypeId::of::<T>())?;
        self.stores[index].as_any().downcast_ref()
    }

    pub fn store_mut<T: Component>(&mut self) -> Option<&mut ComponentStore<T>> {
        let index = *self.by_type.get(&TypeId::of::<T>())?;
        self.stores[index].as_any_mut().downcast_mut()
    }

    /// Registered tags in registration order
    pub fn tags(&self) -> Vec<&'static str> {
        self.stores.iter().map(|store| store.tag()).collect()
    }

    /// Number of components attached to `entity` across all stores
    pub fn count_on(&self, entity: Entity) -> usize {
        self.stores.iter().filter(|s| s.contains(entity)).count()
    }

    /// Total attached instances across all stores
    pub fn attached_count(&self) -> usize {
        self.stores.iter().map(|s| s.len()).sum()
    }

    pub(crate) fn index_of_tag(&self, tag: &str) -> Option<usize> {
        self.by_tag.get(tag).copied()
    }

    pub(crate) fn store_at(&self, index: usize) -> &dyn ErasedStore {
        &*self.stores[index]
    }

    pub(crate) fn store_at_mut(&mut self, index: usize) -> &mut dyn ErasedStore {
        &mut *self.stores[index]
    }

    pub(crate) fn stores(&self) -> impl Iterator<Item = &dyn ErasedStore> {
        self.stores.iter().map(|s| &**s)
    }

    /// Remove every component of `entity`, hooks before free, in registration order.
    pub(crate) fn remove_all_of(&mut self, entity: Entity, pools: &mut PoolRegistry) -> usize {
        self.stores
            .iter_mut()
            .map(|store| store.remove(entity, pools))
            .filter(|removed| *removed)
            .count()
    }

    pub(crate) fn read_field(&self, entity: Entity, tag: &str, field: &str) -> Option<TweenValue> {
        let index = self.index_of_tag(tag)?;
        self.stores[index].read_field(entity, field)
    }

    pub(crate) fn write_field(
        &mut self,
        entity: Entity,
        tag: &str,
        field: &str,
        value: TweenValue,
    ) -> bool {
        match self.index_of_tag(tag) {
            Some(index) => self.stores[index].write_field(entity, field, value),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct Health {
        hp: f32,
    }
    crate::plain_component!(Health, "health");

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct Armor {
        hp: f32,
    }
    crate::plain_component!(Armor, "health");

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct Shield {
        charge: f32,
    }
    crate::plain_component!(Shield, "shield");

    #[test]
    fn test_register_is_idempotent() {
        let mut registry = ComponentRegistry::new();
        registry.register::<Health>().unwrap();
        registry.register::<Health>().unwrap();
        assert_eq!(registry.tags(), vec!["health"]);
    }

    #[test]
    fn test_tag_conflict_rejected() {
        let mut registry = ComponentRegistry::new();
        registry.register::<Health>().unwrap();
        assert_eq!(
            registry.register::<Armor>(),
            Err(EcsError::TagConflict("health"))
        );
    }

    #[test]
    fn test_hooks_fire_after_attach_and_before_free() {
        let mut registry = ComponentRegistry::new();
        let mut pools = PoolRegistry::new();
        registry.register::<Health>().unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));

        let store = registry.store_mut::<Health>().unwrap();
        let added = Arc::clone(&log);
        store.push_on_add(Box::new(move |e, h: &Health| {
            added.lock().unwrap().push(format!("add {} {}", e.id, h.hp));
        }));
        let removed = Arc::clone(&log);
        store.push_on_remove(Box::new(move |e, h: &Health| {
            removed.lock().unwrap().push(format!("remove {} {}", e.id, h.hp));
        }));

        let entity = Entity::new(1, 1);
        let hp = pools.alloc_with::<Health>(|h| h.hp = 5.0);
        assert!(registry.store_mut::<Health>().unwrap().attach(entity, hp).is_ok());
        assert_eq!(registry.remove_all_of(entity, &mut pools), 1);

        assert_eq!(*log.lock().unwrap(), vec!["add 1 5", "remove 1 5"]);
        assert_eq!(pools.stats_of::<Health>().in_use, 0);
    }

    #[test]
    fn test_attach_twice_hands_item_back() {
        let mut registry = ComponentRegistry::new();
        let mut pools = PoolRegistry::new();
        registry.register::<Health>().unwrap();
        let entity = Entity::new(1, 1);

        let store = registry.store_mut::<Health>().unwrap();
        assert!(store.attach(entity, pools.alloc::<Health>()).is_ok());
        let rejected = store.attach(entity, pools.alloc::<Health>()).unwrap_err();
        pools.free(rejected).unwrap();

        registry.remove_all_of(entity, &mut pools);
        assert!(pools.all_balanced());
        assert_eq!(pools.stats_of::<Health>().in_use, 0);
    }

    #[test]
    fn test_remove_all_of_visits_every_store() {
        let mut registry = ComponentRegistry::new();
        let mut pools = PoolRegistry::new();
        registry.register::<Health>().unwrap();
        registry.register::<Shield>().unwrap();
        let entity = Entity::new(1, 1);
        let other = Entity::new(2, 1);

        for e in [entity, other] {
            let hp = pools.alloc::<Health>();
            assert!(registry.store_mut::<Health>().unwrap().attach(e, hp).is_ok());
        }
        let shield = pools.alloc::<Shield>();
        assert!(registry.store_mut::<Shield>().unwrap().attach(entity, shield).is_ok());

        assert_eq!(registry.remove_all_of(entity, &mut pools), 2);
        assert_eq!(registry.count_on(entity), 0);
        assert_eq!(registry.count_on(other), 1);
        assert_eq!(pools.stats_of::<Health>().in_use, 1);
        assert_eq!(pools.stats_of::<Shield>().in_use, 0);
        assert!(pools.all_balanced());
    }
}
