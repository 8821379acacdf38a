//! World snapshots: capture, persisted JSON form, and all-or-nothing restore.
//!
//! A [`WorldSnapshot`] records the entity allocator state and every live
//! entity with a `tag -> encoded value` map of its components. Nested pooled
//! values are encoded inline; entity references are plain `(id, version)`
//! pairs.
//!
//! Restore decodes everything into a staging area first. Only when every
//! record decoded does the world swap over: old components are removed
//! (remove hooks, then free), staged ones attached (add hooks). A failure
//! frees all staged instances and leaves the world untouched.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use smallvec::SmallVec;
use tracing::{debug, warn};

#[cfg(feature = "profiling")]
use tracing::info_span;

use crate::entity::{AllocatorState, Entity, EntityAllocator};
use crate::error::{EcsError, Result};
use crate::registry::Staged;
use crate::world::World;

/// Bumped whenever the document layout changes incompatibly.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// One entity and its encoded components.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub entity: Entity,
    /// Keyed by component tag. `BTreeMap` keeps output deterministic.
    pub components: BTreeMap<String, Value>,
}

/// Point-in-time capture of a whole world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub format_version: u32,
    pub tick: u64,
    pub time: f64,
    pub allocator: AllocatorState,
    /// Ascending entity id order
    pub entities: Vec<EntityRecord>,
}

impl WorldSnapshot {
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn component_count(&self) -> usize {
        self.entities.iter().map(|e| e.components.len()).sum()
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| EcsError::SerializationError(e.to_string()))
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| EcsError::SerializationError(e.to_string()))
    }

    /// Parse the persisted form. Structural problems surface as
    /// [`EcsError::MalformedSnapshot`].
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| EcsError::MalformedSnapshot(e.to_string()))
    }
}

/// What a restore did besides the obvious.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RestoreReport {
    pub entities: usize,
    pub components: usize,
    /// Components skipped because no registered type uses their tag
    pub skipped: Vec<(Entity, String)>,
    /// Entity references reset to [`Entity::NULL`] because their target is gone
    pub stale_references: usize,
}

struct StagedEntity {
    entity: Entity,
    components: SmallVec<[(usize, Staged); 8]>,
}

impl World {
    /// Capture every live entity and its components.
    pub fn capture_snapshot(&self) -> Result<WorldSnapshot> {
        #[cfg(feature = "profiling")]
        let span = info_span!("world.capture", entities = self.entity_count());
        #[cfg(feature = "profiling")]
        let _guard = span.enter();

        let mut entities = Vec::with_capacity(self.entities.len());
        for entity in self.entities.iter_alive() {
            let mut components = BTreeMap::new();
            for store in self.components.stores() {
                if let Some(encoded) = store.encode(entity) {
                    components.insert(store.tag().to_owned(), encoded?);
                }
            }
            entities.push(EntityRecord { entity, components });
        }

        Ok(WorldSnapshot {
            format_version: SNAPSHOT_FORMAT_VERSION,
            tick: self.tick,
            time: self.time,
            allocator: self.entities.state(),
            entities,
        })
    }

    /// Replace the world's entities and components with the snapshot's.
    ///
    /// Unknown tags are skipped with a warning. Malformed data aborts the
    /// restore with [`EcsError::MalformedSnapshot`] and the world keeps its
    /// previous state; pool counts stay balanced either way.
    pub fn restore_snapshot(&mut self, snapshot: &WorldSnapshot) -> Result<RestoreReport> {
        #[cfg(feature = "profiling")]
        let span = info_span!("world.restore", tick = snapshot.tick);
        #[cfg(feature = "profiling")]
        let _guard = span.enter();

        if snapshot.format_version != SNAPSHOT_FORMAT_VERSION {
            return Err(EcsError::MalformedSnapshot(format!(
                "format version {} (expected {SNAPSHOT_FORMAT_VERSION})",
                snapshot.format_version
            )));
        }
        let allocator = EntityAllocator::from_state(&snapshot.allocator)?;
        validate_records(snapshot, &allocator)?;

        let mut report = RestoreReport::default();
        let mut staged = self.stage(snapshot, &mut report)?;

        // Rewrite references to entities that do not exist in the restored world.
        for entry in &mut staged {
            let owner = entry.entity;
            for (index, value) in &mut entry.components {
                self.components.store_at(*index).visit_staged(value, &mut |target| {
                    if !target.is_null() && !allocator.is_alive(*target) {
                        warn!(
                            %owner,
                            target = %target,
                            "{}",
                            EcsError::StaleEntityReference(*target)
                        );
                        *target = Entity::NULL;
                        report.stale_references += 1;
                    }
                });
            }
        }

        // Commit: nothing below can fail.
        self.clear();
        self.entities = allocator;
        self.tick = snapshot.tick;
        self.time = snapshot.time;
        for entry in staged {
            report.entities += 1;
            for (index, value) in entry.components {
                report.components += 1;
                self.components
                    .store_at_mut(index)
                    .attach_staged(entry.entity, value, &mut self.pools);
            }
        }

        debug!(
            tick = snapshot.tick,
            entities = report.entities,
            components = report.components,
            skipped = report.skipped.len(),
            "restored snapshot"
        );
        Ok(report)
    }

    /// Decode every known component. On error, frees what was staged so far.
    fn stage(
        &mut self,
        snapshot: &WorldSnapshot,
        report: &mut RestoreReport,
    ) -> Result<Vec<StagedEntity>> {
        let mut staged: Vec<StagedEntity> = Vec::with_capacity(snapshot.entities.len());

        for record in &snapshot.entities {
            let mut entry = StagedEntity {
                entity: record.entity,
                components: SmallVec::new(),
            };
            for (tag, data) in &record.components {
                let Some(index) = self.components.index_of_tag(tag) else {
                    warn!(
                        entity = %record.entity,
                        "{}; skipping it",
                        EcsError::UnknownComponentType(tag.clone())
                    );
                    report.skipped.push((record.entity, tag.clone()));
                    continue;
                };
                match self.components.store_at(index).decode_staged(data, &mut self.pools) {
                    Ok(value) => entry.components.push((index, value)),
                    Err(err) => {
                        staged.push(entry);
                        self.discard(staged);
                        return Err(EcsError::MalformedSnapshot(format!(
                            "component '{tag}' on {}: {err}",
                            record.entity
                        )));
                    }
                }
            }
            staged.push(entry);
        }
        Ok(staged)
    }

    fn discard(&mut self, staged: Vec<StagedEntity>) {
        for entry in staged {
            for (index, value) in entry.components {
                self.components.store_at(index).discard_staged(value, &mut self.pools);
            }
        }
    }
}

/// Records must match the allocator's live set exactly, once each.
fn validate_records(snapshot: &WorldSnapshot, allocator: &EntityAllocator) -> Result<()> {
    let mut previous: Option<Entity> = None;
    for record in &snapshot.entities {
        if !allocator.is_alive(record.entity) {
            return Err(EcsError::MalformedSnapshot(format!(
                "record for {} which the allocator does not list as alive",
                record.entity
            )));
        }
        if previous.is_some_and(|p| p.id >= record.entity.id) {
            return Err(EcsError::MalformedSnapshot(format!(
                "records out of order or duplicated at {}",
                record.entity
            )));
        }
        previous = Some(record.entity);
    }
    if snapshot.entities.len() != allocator.len() {
        return Err(EcsError::MalformedSnapshot(format!(
            "{} records for {} live entities",
            snapshot.entities.len(),
            allocator.len()
        )));
    }
    Ok(())
}
