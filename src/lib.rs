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

//! Rewind ECS - pooled entity components with snapshot rewind and tweens
//!
//! Components live in per-type object pools, the whole world can be captured
//! to a snapshot and restored, a rewind controller scrubs through a ring of
//! those snapshots, and tween scripts animate component fields over time.

pub mod animation;
pub mod component;
pub mod easing;
pub mod entity;
pub mod error;
pub mod pool;
pub mod prelude;
pub mod registry;
pub mod rewind;
pub mod snapshot;
pub mod system;
pub mod tween;
pub mod world;


pub use animation::*;
pub use component::*;
pub use easing::*;
pub use entity::*;
pub use error::*;
pub use pool::*;
pub use registry::*;
pub use rewind::*;
pub use snapshot::*;
pub use system::*;
pub use tween::*;
pub use world::*;

#[doc(hidden)]
pub mod __private {
    pub use serde;
    pub use serde_json;
}
