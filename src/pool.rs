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

//! Object pools for component values.
//!
//! Every pooled value lives in exactly one place: a pool's free list, or a
//! [`Pooled`] handle owned by whoever allocated it. Handles are only minted
//! by pools, carry the identity of the pool slot they came from, and go back
//! through [`PoolRegistry::free`], which resets them (recursively freeing any
//! nested pooled fields) before they re-enter the free list.
//!
//! # Example
//!
//! ```
//! use rewind_ecs::pool::PoolRegistry;
//!
//! #[derive(Clone, Default, serde::Serialize, serde::Deserialize)]
//! struct Health { hp: f32 }
//! rewind_ecs::plain_data!(Health);
//!
//! let mut pools = PoolRegistry::new();
//! let mut hp = pools.alloc::<Health>();
//! hp.hp = 10.0;
//! pools.free(hp).unwrap();
//!
//! let stats = pools.stats_of::<Health>();
//! assert_eq!((stats.total_generated, stats.in_use, stats.free_count), (1, 0, 1));
//! ```

use std::any::{Any, TypeId};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU32, Ordering};

use ahash::AHashMap;
use tracing::{debug, warn};

use crate::error::{EcsError, Result};

/// Source of pool identities, so a handle from one registry is never
/// mistaken for an in-use slot of another.
static NEXT_POOL_ID: AtomicU32 = AtomicU32::new(1);

/// Lifecycle contract for pooled values.
///
/// Types with nested [`Pooled`] fields must free each one in `reset` and
/// clone each one through the pool in `copy_into`.
pub trait Poolable: Default + Send + Sync + 'static {
    /// Restore every field to its default, handing nested pooled values back.
    fn reset(&mut self, pools: &mut PoolRegistry);

    /// Deep-copy `self` into `target`, a freshly allocated instance.
    fn copy_into(&self, target: &mut Self, pools: &mut PoolRegistry);
}

/// Owning handle to a value checked out of a pool.
///
/// Dropping a handle instead of freeing it leaves its slot checked out.
#[must_use = "pooled values must be attached or freed back to their pool"]
pub struct Pooled<T> {
    value: T,
    pool_id: u32,
    slot: u32,
}

impl<T> Pooled<T> {
    /// Slot number inside the owning pool. Stable across reuse.
    pub fn slot(&self) -> u32 {
        self.slot
    }
}

impl<T: Poolable> Pooled<T> {
    /// Allocate a new instance from the pool and deep-copy this one into it.
    #[must_use]
    pub fn clone_in(&self, pools: &mut PoolRegistry) -> Pooled<T> {
        let mut fresh = pools.alloc::<T>();
        self.value.copy_into(&mut fresh.value, pools);
        fresh
    }

    /// Give the instance back to its pool.
    pub fn free(self, pools: &mut PoolRegistry) -> Result<()> {
        pools.free(self)
    }
}

impl<T> Deref for Pooled<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T> DerefMut for Pooled<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.value
    }
}

impl<T: fmt::Debug> fmt::Debug for Pooled<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pooled")
            .field("slot", &self.slot)
            .field("value", &self.value)
            .finish()
    }
}

/// Compares values only; two handles never share a slot.
impl<T: PartialEq> PartialEq for Pooled<T> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

/// Pool counters for invariant checks and diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub type_name: &'static str,
    pub total_generated: usize,
    pub in_use: usize,
    pub free_count: usize,
}

impl PoolStats {
    fn empty(type_name: &'static str) -> Self {
        Self {
            type_name,
            total_generated: 0,
            in_use: 0,
            free_count: 0,
        }
    }

    /// `total_generated == free_count + in_use`
    pub fn is_balanced(&self) -> bool {
        self.total_generated == self.free_count + self.in_use
    }
}

/// Free-list pool for a single type.
///
/// The free list is a stack: the most recently freed instance is reused first.
pub struct Pool<T> {
    id: u32,
    free: Vec<Pooled<T>>,
    /// Checked-out flag per slot
    checked_out: Vec<bool>,
    in_use: usize,
}

impl<T: Poolable> Pool<T> {
    pub fn new() -> Self {
        Self {
            id: NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed),
            free: Vec::new(),
            checked_out: Vec::new(),
            in_use: 0,
        }
    }

    /// Eagerly construct `count` instances into the free list.
    pub fn preallocate(&mut self, count: usize) {
        self.free.reserve(count);
        for _ in 0..count {
            let item = self.generate();
            self.free.push(item);
        }
    }

    #[must_use]
    pub fn alloc(&mut self) -> Pooled<T> {
        let item = match self.free.pop() {
            Some(item) => item,
            None => self.generate(),
        };
        self.checked_out[item.slot as usize] = true;
        self.in_use += 1;
        item
    }

    /// Whether `item` is a checked-out instance of this pool.
    pub fn tracks(&self, item: &Pooled<T>) -> bool {
        item.pool_id == self.id
            && self
                .checked_out
                .get(item.slot as usize)
                .copied()
                .unwrap_or(false)
    }

    pub fn in_use(&self) -> usize {
        self.in_use
    }

    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    pub fn total_generated(&self) -> usize {
        self.checked_out.len()
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            type_name: std::any::type_name::<T>(),
            total_generated: self.total_generated(),
            in_use: self.in_use,
            free_count: self.free.len(),
        }
    }

    /// Push an already reset instance back onto the free list.
    fn reclaim(&mut self, item: Pooled<T>) -> Result<()> {
        if !self.tracks(&item) {
            return Err(EcsError::PoolUnderflow {
                type_name: std::any::type_name::<T>(),
            });
        }
        self.checked_out[item.slot as usize] = false;
        self.in_use -= 1;
        self.free.push(item);
        Ok(())
    }

    fn generate(&mut self) -> Pooled<T> {
        let slot = self.checked_out.len() as u32;
        self.checked_out.push(false);
        Pooled {
            value: T::default(),
            pool_id: self.id,
            slot,
        }
    }
}

impl<T: Poolable> Default for Pool<T> {
    fn default() -> Self {
        Self::new()
    }
}

trait ErasedPool: Send + Sync {
    fn stats(&self) -> PoolStats;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Poolable> ErasedPool for Pool<T> {
    fn stats(&self) -> PoolStats {
        Pool::stats(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// All pools of one world, keyed by value type.
#[derive(Default)]
pub struct PoolRegistry {
    pools: AHashMap<TypeId, Box<dyn ErasedPool>>,
}

impl PoolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the pool for `T` if it does not exist yet.
    pub fn register<T: Poolable>(&mut self) {
        self.pool_mut::<T>();
    }

    pub fn preallocate<T: Poolable>(&mut self, count: usize) {
        self.pool_mut::<T>().preallocate(count);
    }

    #[must_use]
    pub fn alloc<T: Poolable>(&mut self) -> Pooled<T> {
        self.pool_mut::<T>().alloc()
    }

    /// Allocate and run a configuration closure on the fresh instance.
    #[must_use]
    pub fn alloc_with<T: Poolable>(&mut self, configure: impl FnOnce(&mut T)) -> Pooled<T> {
        let mut item = self.alloc::<T>();
        configure(&mut item);
        item
    }

    /// Reset `item` and return it to its pool.
    ///
    /// Freeing an instance the pool does not track reports
    /// [`EcsError::PoolUnderflow`] and discards it; its nested pooled fields
    /// are still released so the other pools stay balanced.
    pub fn free<T: Poolable>(&mut self, mut item: Pooled<T>) -> Result<()> {
        let tracked = self.pool::<T>().is_some_and(|pool| pool.tracks(&item));
        item.value.reset(self);
        if !tracked {
            warn!(
                type_name = std::any::type_name::<T>(),
                slot = item.slot,
                "freed an instance that is not in use; discarding it"
            );
            return Err(EcsError::PoolUnderflow {
                type_name: std::any::type_name::<T>(),
            });
        }
        self.pool_mut::<T>().reclaim(item)
    }

    /// Free every item, logging failures instead of stopping at the first.
    pub fn free_all<T: Poolable>(&mut self, items: impl IntoIterator<Item = Pooled<T>>) {
        for item in items {
            // Underflow is already logged by `free`.
            let _ = self.free(item);
        }
    }

    pub fn pool<T: Poolable>(&self) -> Option<&Pool<T>> {
        self.pools
            .get(&TypeId::of::<T>())
            .and_then(|pool| pool.as_any().downcast_ref::<Pool<T>>())
    }

    pub fn stats_of<T: Poolable>(&self) -> PoolStats {
        self.pool::<T>()
            .map(Pool::stats)
            .unwrap_or_else(|| PoolStats::empty(std::any::type_name::<T>()))
    }

    /// Counters of every pool, sorted by type name
    pub fn stats(&self) -> Vec<PoolStats> {
        let mut stats: Vec<_> = self.pools.values().map(|pool| pool.stats()).collect();
        stats.sort_by_key(|s| s.type_name);
        stats
    }

    pub fn all_balanced(&self) -> bool {
        self.pools.values().all(|pool| pool.stats().is_balanced())
    }

    fn pool_mut<T: Poolable>(&mut self) -> &mut Pool<T> {
        self.pools
            .entry(TypeId::of::<T>())
            .or_insert_with(|| {
                debug!(type_name = std::any::type_name::<T>(), "creating pool");
                Box::new(Pool::<T>::new())
            })
            .as_any_mut()
            .downcast_mut::<Pool<T>>()
            .unwrap_or_else(|| unreachable!("pool stored under a foreign TypeId"))
    }
}
