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

//! Tween scripts: ordered steps that drive component fields over time.
//!
//! A [`TweenScript`] is an ordinary component (tag `"tween"`), so scripts are
//! pooled, captured in snapshots and rewound along with everything else.
//! Steps are pooled too; a script frees its steps when it is freed.
//!
//! Per tick an active script adds `dt` to its step-local time. When that
//! reaches the current step's `delay + duration` the step is finalized at
//! its exact end value, the overshoot carries into the next step, and the
//! next step begins.
//!
//! ```
//! use rewind_ecs::prelude::*;
//!
//! let mut world = World::new();
//! let e = world.spawn();
//! let script = TweenScript::builder(world.pools_mut())
//!     .wait(0.5)
//!     .tween(FieldTween::new("sprite", "alpha", TweenValue::Scalar(0.0)), 1.0, Easing::QuadOut)
//!     .on_complete(ScriptCompletion::Remove)
//!     .build();
//! world.add(e, script).unwrap();
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::animation::{FieldTarget, TweenValue};
use crate::component::{decode_pooled, Component, SnapshotData};
use crate::easing::Easing;
use crate::entity::Entity;
use crate::error::{EcsError, Result};
use crate::pool::{PoolRegistry, Poolable, Pooled};
use crate::world::World;

/// Upper bound on step transitions one script makes in a single tick.
///
/// Zero-length steps behind a `restart_from` would otherwise spin forever.
pub const MAX_STEP_TRANSITIONS_PER_TICK: usize = 256;

/// Drive one component field towards `to`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldTween {
    /// Entity whose field is driven. `None` means the script's owner.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<Entity>,
    /// Component tag
    pub component: String,
    pub field: String,
    /// Explicit start value. When absent the field's value at step start is used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<TweenValue>,
    pub to: TweenValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    start: Option<TweenValue>,
}

impl FieldTween {
    pub fn new(component: impl Into<String>, field: impl Into<String>, to: TweenValue) -> Self {
        Self {
            target: None,
            component: component.into(),
            field: field.into(),
            from: None,
            to,
            start: None,
        }
    }

    /// Drive a field on `entity` instead of the owner.
    pub fn on(mut self, entity: Entity) -> Self {
        self.target = Some(entity);
        self
    }

    pub fn from(mut self, value: TweenValue) -> Self {
        self.from = Some(value);
        self
    }

    fn resolve(&self, owner: Entity) -> Entity {
        self.target.unwrap_or(owner)
    }

    fn begin(&mut self, owner: Entity, target: &dyn FieldTarget) {
        self.start = self
            .from
            .or_else(|| target.read(self.resolve(owner), &self.component, &self.field));
        if self.start.is_none() {
            debug!(
                entity = %self.resolve(owner),
                component = %self.component,
                field = %self.field,
                "tween target not readable at step start"
            );
        }
    }

    fn write(&mut self, factor: f32, owner: Entity, target: &mut dyn FieldTarget) {
        let entity = self.resolve(owner);
        let start = match self.start {
            Some(start) => start,
            None => match target.read(entity, &self.component, &self.field) {
                Some(value) => *self.start.insert(value),
                None => return,
            },
        };
        let Some(value) = start.lerp(self.to, factor) else {
            warn!(
                component = %self.component,
                field = %self.field,
                "tween start and end values differ in kind; skipping"
            );
            return;
        };
        if !target.write(entity, &self.component, &self.field, value) {
            debug!(%entity, component = %self.component, field = %self.field, "tween write rejected");
        }
    }
}

/// What a step does while its time runs.
#[derive(Debug, Default)]
pub enum StepAction {
    /// Only lets time pass
    #[default]
    Wait,
    Field(FieldTween),
    /// Children run concurrently on the group's clock, offset by the group delay
    Parallel(Vec<Pooled<TweenStep>>),
    /// Jump back to step `index` of the owning script
    Restart { index: usize },
}

/// One timed step of a [`TweenScript`].
#[derive(Debug, Default)]
pub struct TweenStep {
    pub delay: f32,
    pub duration: f32,
    pub easing: Easing,
    pub action: StepAction,
    started: bool,
}

impl TweenStep {
    /// Time from step start until the step is complete
    pub fn total_duration(&self) -> f32 {
        match &self.action {
            StepAction::Parallel(children) => {
                self.delay
                    + children
                        .iter()
                        .map(|child| child.total_duration())
                        .fold(0.0, f32::max)
            }
            StepAction::Restart { .. } => self.delay,
            StepAction::Wait | StepAction::Field(_) => self.delay + self.duration,
        }
    }

    /// Interpolation factor at step-local time `t`.
    ///
    /// Exactly 0 up to and including `delay`, exactly 1 from `delay + duration` on.
    pub fn factor(&self, t: f32) -> f32 {
        if t <= self.delay {
            0.0
        } else if self.duration <= 0.0 || t >= self.delay + self.duration {
            1.0
        } else {
            self.easing.apply((t - self.delay) / self.duration)
        }
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    fn begin(&mut self, owner: Entity, target: &dyn FieldTarget) {
        self.started = true;
        match &mut self.action {
            StepAction::Field(tween) => tween.begin(owner, target),
            StepAction::Parallel(children) => {
                for child in children.iter_mut() {
                    child.begin(owner, target);
                }
            }
            StepAction::Wait | StepAction::Restart { .. } => {}
        }
    }

    fn apply(&mut self, t: f32, owner: Entity, target: &mut dyn FieldTarget) {
        let factor = self.factor(t);
        match &mut self.action {
            StepAction::Field(tween) => tween.write(factor, owner, target),
            StepAction::Parallel(children) => {
                let local = t - self.delay;
                for child in children.iter_mut() {
                    child.apply(local, owner, target);
                }
            }
            StepAction::Wait | StepAction::Restart { .. } => {}
        }
    }

    /// Land every field on its exact end value.
    fn finish(&mut self, owner: Entity, target: &mut dyn FieldTarget) {
        match &mut self.action {
            StepAction::Field(tween) => tween.write(1.0, owner, target),
            StepAction::Parallel(children) => {
                for child in children.iter_mut() {
                    child.finish(owner, target);
                }
            }
            StepAction::Wait | StepAction::Restart { .. } => {}
        }
    }

    /// Forget captured start values so the step can run again.
    fn rewind(&mut self) {
        self.started = false;
        match &mut self.action {
            StepAction::Field(tween) => tween.start = None,
            StepAction::Parallel(children) => children.iter_mut().for_each(|c| c.rewind()),
            StepAction::Wait | StepAction::Restart { .. } => {}
        }
    }

    fn visit(&mut self, visitor: &mut dyn FnMut(&mut Entity)) {
        match &mut self.action {
            StepAction::Field(tween) => {
                if let Some(entity) = tween.target.as_mut() {
                    visitor(entity);
                }
            }
            StepAction::Parallel(children) => {
                for child in children.iter_mut() {
                    child.visit(visitor);
                }
            }
            StepAction::Wait | StepAction::Restart { .. } => {}
        }
    }
}

impl Poolable for TweenStep {
    fn reset(&mut self, pools: &mut PoolRegistry) {
        if let StepAction::Parallel(children) = &mut self.action {
            pools.free_all(children.drain(..));
        }
        *self = TweenStep::default();
    }

    fn copy_into(&self, target: &mut Self, pools: &mut PoolRegistry) {
        target.reset(pools);
        target.delay = self.delay;
        target.duration = self.duration;
        target.easing = self.easing;
        target.started = self.started;
        target.action = match &self.action {
            StepAction::Wait => StepAction::Wait,
            StepAction::Field(tween) => StepAction::Field(tween.clone()),
            StepAction::Parallel(children) => {
                StepAction::Parallel(children.iter().map(|c| c.clone_in(pools)).collect())
            }
            StepAction::Restart { index } => StepAction::Restart { index: *index },
        };
    }
}

#[derive(Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ActionRecord {
    Wait,
    Field(FieldTween),
    Parallel { children: Vec<Value> },
    Restart { index: usize },
}

#[derive(Serialize, Deserialize)]
struct StepRecord {
    #[serde(default)]
    delay: f32,
    #[serde(default)]
    duration: f32,
    #[serde(default)]
    easing: Easing,
    #[serde(default)]
    started: bool,
    action: ActionRecord,
}

/// Decode each value into a pooled step. Steps decoded so far are freed on failure.
fn decode_steps(values: &[Value], pools: &mut PoolRegistry) -> Result<Vec<Pooled<TweenStep>>> {
    let mut steps = Vec::with_capacity(values.len());
    for value in values {
        match decode_pooled::<TweenStep>(value, pools) {
            Ok(step) => steps.push(step),
            Err(err) => {
                pools.free_all(steps);
                return Err(err);
            }
        }
    }
    Ok(steps)
}

fn encode_steps(steps: &[Pooled<TweenStep>]) -> Result<Vec<Value>> {
    steps.iter().map(|step| step.encode()).collect()
}

impl SnapshotData for TweenStep {
    fn encode(&self) -> Result<Value> {
        let action = match &self.action {
            StepAction::Wait => ActionRecord::Wait,
            StepAction::Field(tween) => ActionRecord::Field(tween.clone()),
            StepAction::Parallel(children) => ActionRecord::Parallel {
                children: encode_steps(children)?,
            },
            StepAction::Restart { index } => ActionRecord::Restart { index: *index },
        };
        let record = StepRecord {
            delay: self.delay,
            duration: self.duration,
            easing: self.easing,
            started: self.started,
            action,
        };
        Ok(serde_json::to_value(record)?)
    }

    fn decode(&mut self, data: &Value, pools: &mut PoolRegistry) -> Result<()> {
        let record = StepRecord::deserialize(data)?;
        self.action = match record.action {
            ActionRecord::Wait => StepAction::Wait,
            ActionRecord::Field(tween) => StepAction::Field(tween),
            ActionRecord::Parallel { children } => {
                StepAction::Parallel(decode_steps(&children, pools)?)
            }
            ActionRecord::Restart { index } => StepAction::Restart { index },
        };
        self.delay = record.delay;
        self.duration = record.duration;
        self.easing = record.easing;
        self.started = record.started;
        Ok(())
    }

    fn visit_entities(&mut self, visitor: &mut dyn FnMut(&mut Entity)) {
        self.visit(visitor);
    }
}

/// What happens to a script once its last step finishes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptCompletion {
    /// Stay attached, inactive, for inspection
    #[default]
    Keep,
    /// Detach and free the script
    Remove,
}

/// Ordered list of steps plus the cursor advancing through them.
#[derive(Debug, Default)]
pub struct TweenScript {
    steps: Vec<Pooled<TweenStep>>,
    index: usize,
    time_progress: f32,
    active: bool,
    pub on_complete: ScriptCompletion,
}

impl TweenScript {
    pub fn builder(pools: &mut PoolRegistry) -> TweenScriptBuilder<'_> {
        TweenScriptBuilder {
            pools,
            steps: Vec::new(),
            on_complete: ScriptCompletion::Keep,
        }
    }

    pub fn steps(&self) -> &[Pooled<TweenStep>] {
        &self.steps
    }

    /// Index of the running step. Equals `steps().len()` once complete.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Time elapsed inside the running step
    pub fn time_progress(&self) -> f32 {
        self.time_progress
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_complete(&self) -> bool {
        self.index >= self.steps.len()
    }

    /// Deactivate. Fields keep whatever value they reached.
    pub fn stop(&mut self) {
        self.active = false;
    }

    /// Continue a stopped script from where it stopped.
    pub fn play(&mut self) {
        self.active = !self.is_complete();
    }

    /// Start over from the first step.
    pub fn restart(&mut self) {
        self.jump_to(0);
        self.active = !self.steps.is_empty();
    }

    fn jump_to(&mut self, index: usize) {
        for step in self.steps.iter_mut().skip(index) {
            step.rewind();
        }
        self.index = index;
        self.time_progress = 0.0;
    }

    /// Advance by `dt`, writing fields through `target`.
    ///
    /// Returns true on the tick the script completes.
    pub fn advance(&mut self, dt: f32, owner: Entity, target: &mut dyn FieldTarget) -> bool {
        if !self.active {
            return false;
        }
        self.time_progress += dt;

        let mut transitions = 0;
        while let Some(step) = self.steps.get_mut(self.index) {
            if !step.started {
                step.begin(owner, target);
            }
            let total = step.total_duration();
            if self.time_progress < total {
                step.apply(self.time_progress, owner, target);
                return false;
            }

            step.finish(owner, target);
            self.time_progress -= total;
            let restart = match step.action {
                StepAction::Restart { index } => Some(index),
                _ => None,
            };
            match restart {
                Some(index) if index < self.steps.len() => {
                    let carried = self.time_progress;
                    self.jump_to(index);
                    self.time_progress = carried;
                }
                _ => self.index += 1,
            }

            transitions += 1;
            if transitions >= MAX_STEP_TRANSITIONS_PER_TICK {
                warn!(
                    %owner,
                    index = self.index,
                    "tween script hit the per-tick transition limit; continuing next tick"
                );
                self.time_progress = 0.0;
                return false;
            }
        }

        self.active = false;
        self.time_progress = 0.0;
        true
    }
}

impl Poolable for TweenScript {
    fn reset(&mut self, pools: &mut PoolRegistry) {
        pools.free_all(self.steps.drain(..));
        *self = TweenScript::default();
    }

    fn copy_into(&self, target: &mut Self, pools: &mut PoolRegistry) {
        target.reset(pools);
        target.steps = self.steps.iter().map(|step| step.clone_in(pools)).collect();
        target.index = self.index;
        target.time_progress = self.time_progress;
        target.active = self.active;
        target.on_complete = self.on_complete;
    }
}

#[derive(Serialize, Deserialize)]
struct ScriptRecord {
    steps: Vec<Value>,
    #[serde(default)]
    index: usize,
    #[serde(default)]
    time_progress: f32,
    #[serde(default)]
    active: bool,
    #[serde(default)]
    on_complete: ScriptCompletion,
}

impl SnapshotData for TweenScript {
    fn encode(&self) -> Result<Value> {
        let record = ScriptRecord {
            steps: encode_steps(&self.steps)?,
            index: self.index,
            time_progress: self.time_progress,
            active: self.active,
            on_complete: self.on_complete,
        };
        Ok(serde_json::to_value(record)?)
    }

    fn decode(&mut self, data: &Value, pools: &mut PoolRegistry) -> Result<()> {
        let record = ScriptRecord::deserialize(data)?;
        if record.index > record.steps.len() {
            return Err(EcsError::MalformedSnapshot(format!(
                "tween index {} past {} steps",
                record.index,
                record.steps.len()
            )));
        }
        self.steps = decode_steps(&record.steps, pools)?;
        self.index = record.index;
        self.time_progress = record.time_progress;
        self.active = record.active;
        self.on_complete = record.on_complete;
        Ok(())
    }

    fn visit_entities(&mut self, visitor: &mut dyn FnMut(&mut Entity)) {
        for step in self.steps.iter_mut() {
            step.visit(visitor);
        }
    }
}

impl Component for TweenScript {
    const TAG: &'static str = "tween";
}

/// Assembles a [`TweenScript`] from pooled steps.
///
/// Steps not yet handed to a script are freed when the builder drops.
pub struct TweenScriptBuilder<'p> {
    pools: &'p mut PoolRegistry,
    steps: Vec<Pooled<TweenStep>>,
    on_complete: ScriptCompletion,
}

impl TweenScriptBuilder<'_> {
    fn push(&mut self, delay: f32, duration: f32, easing: Easing, action: StepAction) -> &mut Self {
        let step = self.pools.alloc_with::<TweenStep>(|step| {
            step.delay = delay.max(0.0);
            step.duration = duration.max(0.0);
            step.easing = easing;
            step.action = action;
        });
        self.steps.push(step);
        self
    }

    pub fn tween(&mut self, tween: FieldTween, duration: f32, easing: Easing) -> &mut Self {
        self.push(0.0, duration, easing, StepAction::Field(tween))
    }

    /// Like [`tween`](Self::tween), holding the start value for `delay` first.
    pub fn tween_delayed(
        &mut self,
        tween: FieldTween,
        delay: f32,
        duration: f32,
        easing: Easing,
    ) -> &mut Self {
        self.push(delay, duration, easing, StepAction::Field(tween))
    }

    pub fn wait(&mut self, duration: f32) -> &mut Self {
        self.push(0.0, duration, Easing::Linear, StepAction::Wait)
    }

    /// Group steps that run concurrently, starting `delay` after the group.
    pub fn parallel(
        &mut self,
        delay: f32,
        children: impl FnOnce(&mut TweenScriptBuilder<'_>),
    ) -> &mut Self {
        let mut group = TweenScriptBuilder {
            pools: &mut *self.pools,
            steps: Vec::new(),
            on_complete: ScriptCompletion::Keep,
        };
        children(&mut group);
        let steps = std::mem::take(&mut group.steps);
        drop(group);
        self.push(delay, 0.0, Easing::Linear, StepAction::Parallel(steps))
    }

    /// Loop back to step `index` once this point is reached.
    pub fn restart_from(&mut self, index: usize) -> &mut Self {
        self.push(0.0, 0.0, Easing::Linear, StepAction::Restart { index })
    }

    pub fn on_complete(&mut self, policy: ScriptCompletion) -> &mut Self {
        self.on_complete = policy;
        self
    }

    pub fn build(&mut self) -> Pooled<TweenScript> {
        let steps = std::mem::take(&mut self.steps);
        let on_complete = self.on_complete;
        self.pools.alloc_with::<TweenScript>(|script| {
            script.active = !steps.is_empty();
            script.steps = steps;
            script.on_complete = on_complete;
        })
    }
}

impl Drop for TweenScriptBuilder<'_> {
    fn drop(&mut self) {
        self.pools.free_all(self.steps.drain(..));
    }
}

/// Advance every active script on the world by `dt`.
///
/// Scripts are checked out of their store while they run so they can write
/// fields of any other component, including ones on their own entity.
pub(crate) fn advance_scripts(world: &mut World, dt: f32) {
    let mut completed = Vec::new();
    for owner in world.entities_with::<TweenScript>() {
        let Some(mut script) = world
            .components
            .store_mut::<TweenScript>()
            .and_then(|store| store.take_raw(owner))
        else {
            continue;
        };

        if script.advance(dt, owner, &mut *world) && script.on_complete == ScriptCompletion::Remove {
            completed.push(owner);
        }

        match world.components.store_mut::<TweenScript>() {
            Some(store) => store.put_raw(owner, script),
            None => {
                let _ = world.pools.free(script);
            }
        }
    }

    for owner in completed {
        if let Err(err) = world.remove::<TweenScript>(owner) {
            warn!(%owner, error = %err, "failed to remove finished tween script");
        }
    }
}
