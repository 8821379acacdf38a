//! Time rewind: a ring buffer of world snapshots plus the state machine that
//! scrubs through it.
//!
//! ```text
//!            request_rewind             release (Pause)
//!  RUNNING ----------------> REWINDING ----------------> PAUSED
//!     ^                         |                           |
//!     |       release (Resume)  |                           |
//!     +-------------------------+---------------------------+
//!                 resume: future entries dropped at next capture
//! ```
//!
//! Captures only happen while running, after the tick's simulation step.
//! Restores only happen while rewinding. Both run inside [`World::update`],
//! so they never overlap.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::snapshot::WorldSnapshot;
use crate::world::World;

/// Controller state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RewindState {
    Running,
    Rewinding,
    Paused,
}

/// When running ticks capture a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum CaptureCadence {
    EveryTick,
    /// Once per `seconds` of simulated time. Leftover time carries over.
    Interval { seconds: f32 },
}

/// What releasing the rewind request does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseBehavior {
    /// Freeze at the scrubbed point until [`RewindController::resume`].
    Pause,
    /// Resume simulation from the scrubbed point right away.
    Resume,
}

/// Rewind configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewindConfig {
    /// Snapshots kept; the oldest is evicted beyond this
    pub capacity: usize,
    pub cadence: CaptureCadence,
    pub on_release: ReleaseBehavior,
}

impl Default for RewindConfig {
    fn default() -> Self {
        Self {
            capacity: 300,
            cadence: CaptureCadence::EveryTick,
            on_release: ReleaseBehavior::Pause,
        }
    }
}

impl RewindConfig {
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_cadence(mut self, cadence: CaptureCadence) -> Self {
        self.cadence = cadence;
        self
    }

    pub fn with_release(mut self, on_release: ReleaseBehavior) -> Self {
        self.on_release = on_release;
        self
    }
}

/// Bounded, ordered snapshot history. Index 0 is the oldest entry.
#[derive(Debug, Clone)]
pub struct RewindBuffer {
    entries: VecDeque<WorldSnapshot>,
    capacity: usize,
}

impl RewindBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append, evicting the oldest entry when full.
    pub fn push(&mut self, snapshot: WorldSnapshot) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(snapshot);
    }

    /// Drop every entry newer than `index`.
    pub fn truncate_after(&mut self, index: usize) {
        self.entries.truncate(index + 1);
    }

    pub fn get(&self, index: usize) -> Option<&WorldSnapshot> {
        self.entries.get(index)
    }

    pub fn newest_index(&self) -> Option<usize> {
        self.entries.len().checked_sub(1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Ticks of the buffered snapshots, oldest first
    pub fn ticks(&self) -> Vec<u64> {
        self.entries.iter().map(|s| s.tick).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &WorldSnapshot> {
        self.entries.iter()
    }
}

/// Drives capture and restore for one world.
#[derive(Debug, Clone)]
pub struct RewindController {
    config: RewindConfig,
    buffer: RewindBuffer,
    state: RewindState,
    /// Buffer index being scrubbed while rewinding or paused after a rewind
    cursor: Option<usize>,
    /// Buffer index the world currently reflects, if restored from one
    restored: Option<usize>,
    /// Entries after this index are dropped at the next capture
    pending_truncate: Option<usize>,
    since_capture: f32,
}

impl RewindController {
    pub fn new(config: RewindConfig) -> Self {
        Self {
            buffer: RewindBuffer::new(config.capacity),
            config,
            state: RewindState::Running,
            cursor: None,
            restored: None,
            pending_truncate: None,
            since_capture: 0.0,
        }
    }

    pub fn state(&self) -> RewindState {
        self.state
    }

    pub fn config(&self) -> &RewindConfig {
        &self.config
    }

    pub fn buffer(&self) -> &RewindBuffer {
        &self.buffer
    }

    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    /// Snapshot under the cursor, if scrubbing
    pub fn current(&self) -> Option<&WorldSnapshot> {
        self.buffer.get(self.cursor?)
    }

    /// Start (or continue) scrubbing backwards.
    pub fn request_rewind(&mut self) {
        if self.buffer.is_empty() {
            warn!("rewind requested with an empty history; ignoring");
            return;
        }
        if self.state == RewindState::Rewinding {
            return;
        }
        if self.cursor.is_none() {
            self.cursor = self.buffer.newest_index();
        }
        debug!(from = ?self.state, cursor = ?self.cursor, "rewinding");
        self.state = RewindState::Rewinding;
    }

    /// Stop scrubbing. Pauses or resumes per [`RewindConfig::on_release`].
    pub fn release_rewind(&mut self) {
        if self.state != RewindState::Rewinding {
            return;
        }
        match self.config.on_release {
            ReleaseBehavior::Pause => {
                debug!(cursor = ?self.cursor, "rewind released; paused");
                self.state = RewindState::Paused;
            }
            ReleaseBehavior::Resume => self.resume(),
        }
    }

    pub fn trigger_pause(&mut self) {
        if self.state != RewindState::Paused {
            debug!(from = ?self.state, "paused");
            self.state = RewindState::Paused;
        }
    }

    /// Resume forward play from wherever the world currently is.
    pub fn resume(&mut self) {
        if self.state == RewindState::Running {
            return;
        }
        if let (Some(restored), Some(newest)) = (self.restored, self.buffer.newest_index()) {
            if restored < newest {
                info!(
                    at = restored,
                    dropped = newest - restored,
                    "resuming from the past; future history drops at next capture"
                );
                self.pending_truncate = Some(restored);
            } else {
                self.pending_truncate = None;
            }
        }
        self.state = RewindState::Running;
        self.cursor = None;
        self.restored = None;
        self.since_capture = 0.0;
    }

    /// Per-tick work, called by [`World::update`].
    pub fn step(&mut self, world: &mut World, dt: f32) -> Result<()> {
        match self.state {
            RewindState::Running => {
                world.simulate(dt)?;
                if self.capture_due(dt) {
                    self.capture(world)?;
                }
                Ok(())
            }
            RewindState::Rewinding => self.scrub(world),
            RewindState::Paused => Ok(()),
        }
    }

    /// Capture the world now. Ignored unless running.
    pub fn capture(&mut self, world: &World) -> Result<()> {
        if self.state != RewindState::Running {
            debug!(state = ?self.state, "capture skipped outside running state");
            return Ok(());
        }
        let snapshot = world.capture_snapshot()?;
        if let Some(index) = self.pending_truncate.take() {
            let before = self.buffer.len();
            self.buffer.truncate_after(index);
            debug!(dropped = before - self.buffer.len(), "truncated abandoned future");
        }
        self.buffer.push(snapshot);
        Ok(())
    }

    fn capture_due(&mut self, dt: f32) -> bool {
        match self.config.cadence {
            CaptureCadence::EveryTick => true,
            CaptureCadence::Interval { seconds } => {
                self.since_capture += dt;
                if self.since_capture >= seconds {
                    self.since_capture -= seconds.max(0.0);
                    // A long tick never queues up a burst of captures.
                    if self.since_capture >= seconds {
                        self.since_capture = 0.0;
                    }
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Move one entry back per tick, stopping at the oldest.
    ///
    /// The first rewinding tick lands on the entry under the cursor only if
    /// the world has ticked past it since it was captured; otherwise that
    /// entry is the current state and the step goes one further back.
    fn scrub(&mut self, world: &mut World) -> Result<()> {
        let Some(cursor) = self.cursor.or(self.buffer.newest_index()) else {
            return Ok(());
        };
        let target = match self.restored {
            None if self.buffer.get(cursor).is_some_and(|s| s.tick != world.tick()) => cursor,
            _ => cursor.saturating_sub(1),
        };
        self.cursor = Some(target);
        if self.restored == Some(target) {
            return Ok(());
        }
        if let Some(snapshot) = self.buffer.get(target) {
            world.restore_snapshot(snapshot)?;
            self.restored = Some(target);
        }
        Ok(())
    }
}
