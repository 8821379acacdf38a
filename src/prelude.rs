//! Convenient re-exports of commonly used types.
//!
//! The prelude can be imported with:
//! ```
//! use rewind_ecs::prelude::*;
//! ```

pub use crate::animation::{Animatable, TweenValue};
pub use crate::component::{Component, SnapshotData};
pub use crate::easing::Easing;
pub use crate::entity::Entity;
pub use crate::error::{EcsError, Result};
pub use crate::pool::{PoolRegistry, PoolStats, Poolable, Pooled};
pub use crate::rewind::{CaptureCadence, ReleaseBehavior, RewindConfig, RewindState};
pub use crate::snapshot::{RestoreReport, WorldSnapshot};
pub use crate::system::{FnSystem, System};
pub use crate::tween::{FieldTween, ScriptCompletion, TweenScript};
pub use crate::world::World;
pub use crate::{plain_component, plain_data};
