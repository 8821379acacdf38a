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

//! Entity identifiers and the generational allocator behind them.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{EcsError, Result};

/// Opaque entity handle: slot id plus the version the slot had when handed out.
///
/// Id 0 is reserved for [`Entity::NULL`], which means "no reference".
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Entity {
    pub id: u32,
    pub version: u32,
}

impl Entity {
    /// The "no reference" entity. Never alive, never carries components.
    pub const NULL: Entity = Entity { id: 0, version: 0 };

    pub const fn new(id: u32, version: u32) -> Self {
        Self { id, version }
    }

    pub const fn is_null(&self) -> bool {
        self.id == 0
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "Entity(null)")
        } else {
            write!(f, "Entity({}v{})", self.id, self.version)
        }
    }
}

/// Serializable allocator state captured alongside every snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocatorState {
    /// Current version per id (index 0 is the null slot)
    pub versions: Vec<u32>,
    /// Alive flag per id
    pub alive: Vec<bool>,
    /// Dead ids in reuse order (last entry is reused first)
    pub free_ids: Vec<u32>,
}

/// Generational entity allocator.
///
/// Freed ids are reused most-recent-first with a bumped version, so handles
/// held across a despawn stop resolving.
#[derive(Debug, Clone)]
pub struct EntityAllocator {
    versions: Vec<u32>,
    alive: Vec<bool>,
    free_ids: Vec<u32>,
    live: usize,
}

impl EntityAllocator {
    pub fn new() -> Self {
        Self {
            versions: vec![0],
            alive: vec![false],
            free_ids: Vec::new(),
            live: 0,
        }
    }

    pub fn allocate(&mut self) -> Entity {
        self.live += 1;
        if let Some(id) = self.free_ids.pop() {
            self.alive[id as usize] = true;
            return Entity::new(id, self.versions[id as usize]);
        }

        let id = self.versions.len() as u32;
        self.versions.push(1);
        self.alive.push(true);
        Entity::new(id, 1)
    }

    /// Release an entity. Returns false for dead, stale or null handles.
    pub fn free(&mut self, entity: Entity) -> bool {
        if !self.is_alive(entity) {
            return false;
        }
        let slot = entity.id as usize;
        self.alive[slot] = false;
        // Version 0 is never handed out for a live id.
        self.versions[slot] = match self.versions[slot].wrapping_add(1) {
            0 => 1,
            v => v,
        };
        self.free_ids.push(entity.id);
        self.live -= 1;
        true
    }

    pub fn is_alive(&self, entity: Entity) -> bool {
        if entity.is_null() {
            return false;
        }
        let slot = entity.id as usize;
        slot < self.alive.len() && self.alive[slot] && self.versions[slot] == entity.version
    }

    /// Number of live entities
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Live entities in ascending id order
    pub fn iter_alive(&self) -> impl Iterator<Item = Entity> + '_ {
        self.alive
            .iter()
            .enumerate()
            .filter(|(_, alive)| **alive)
            .map(|(id, _)| Entity::new(id as u32, self.versions[id]))
    }

    pub fn state(&self) -> AllocatorState {
        AllocatorState {
            versions: self.versions.clone(),
            alive: self.alive.clone(),
            free_ids: self.free_ids.clone(),
        }
    }

    /// Rebuild an allocator from captured state, rejecting inconsistent data.
    pub fn from_state(state: &AllocatorState) -> Result<Self> {
        let malformed = |msg: String| Err(EcsError::MalformedSnapshot(msg));

        if state.versions.is_empty() {
            return malformed("allocator has no null slot".to_owned());
        }
        if state.versions.len() != state.alive.len() {
            return malformed(format!(
                "allocator inconsistent: {} versions vs {} alive flags",
                state.versions.len(),
                state.alive.len()
            ));
        }
        if state.alive[0] {
            return malformed("null entity marked alive".to_owned());
        }

        let mut seen = vec![false; state.versions.len()];
        for &id in &state.free_ids {
            let slot = id as usize;
            if id == 0 || slot >= state.versions.len() {
                return malformed(format!("free id {id} out of range"));
            }
            if state.alive[slot] {
                return malformed(format!("free id {id} is marked alive"));
            }
            if seen[slot] {
                return malformed(format!("free id {id} listed twice"));
            }
            seen[slot] = true;
        }

        let mut live = 0;
        for slot in 1..state.versions.len() {
            if state.alive[slot] {
                if state.versions[slot] == 0 {
                    return malformed(format!("live id {slot} has version 0"));
                }
                live += 1;
            } else if !seen[slot] {
                return malformed(format!("dead id {slot} missing from free list"));
            }
        }

        Ok(Self {
            versions: state.versions.clone(),
            alive: state.alive.clone(),
            free_ids: state.free_ids.clone(),
            live,
        })
    }
}

impl Default for EntityAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_skips_null_id() {
        let mut alloc = EntityAllocator::new();
        let e = alloc.allocate();
        assert_eq!(e, Entity::new(1, 1));
        assert!(!alloc.is_alive(Entity::NULL));
    }

    #[test]
    fn test_reuse_bumps_version() {
        let mut alloc = EntityAllocator::new();
        let a = alloc.allocate();
        assert!(alloc.free(a));
        let b = alloc.allocate();
        assert_eq!(b.id, a.id);
        assert_eq!(b.version, a.version + 1);
        assert!(!alloc.is_alive(a));
        assert!(alloc.is_alive(b));
    }

    #[test]
    fn test_double_free_rejected() {
        let mut alloc = EntityAllocator::new();
        let a = alloc.allocate();
        assert!(alloc.free(a));
        assert!(!alloc.free(a));
        assert_eq!(alloc.len(), 0);
    }

    #[test]
    fn test_state_round_trip_keeps_reuse_order() {
        let mut alloc = EntityAllocator::new();
        let a = alloc.allocate();
        let b = alloc.allocate();
        let _c = alloc.allocate();
        alloc.free(a);
        alloc.free(b);

        let mut restored = EntityAllocator::from_state(&alloc.state()).unwrap();
        assert_eq!(restored.len(), 1);
        assert_eq!(restored.allocate(), alloc.allocate());
    }

    #[test]
    fn test_from_state_rejects_dangling_free_id() {
        let state = AllocatorState {
            versions: vec![0, 1],
            alive: vec![false, true],
            free_ids: vec![1],
        };
        assert!(matches!(
            EntityAllocator::from_state(&state),
            Err(EcsError::MalformedSnapshot(_))
        ));
    }
}
