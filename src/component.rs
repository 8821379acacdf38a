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

//! Component and snapshot data traits
//!
//! Components are pooled values attached to entities. Each component type
//! carries a short, stable tag that keys it in the registry and in snapshot
//! documents.

use serde_json::Value;

use crate::entity::Entity;
use crate::error::Result;
use crate::pool::{Poolable, PoolRegistry, Pooled};

/// Pooled data that can be captured into a snapshot and rebuilt from one.
///
/// Nested pooled fields are encoded inline and decoded by allocating from
/// `pools` (see [`decode_pooled`]). Entity references are encoded as plain
/// `(id, version)` pairs.
pub trait SnapshotData: Poolable {
    fn encode(&self) -> Result<Value>;

    /// Populate a freshly allocated instance from encoded data.
    fn decode(&mut self, data: &Value, pools: &mut PoolRegistry) -> Result<()>;

    /// Visit every entity reference held by this value, nested values included.
    fn visit_entities(&mut self, _visitor: &mut dyn FnMut(&mut Entity)) {}
}

/// A pooled value that can be attached to an entity.
pub trait Component: SnapshotData {
    /// Stable tag. Old snapshots keep loading only while tags never change.
    const TAG: &'static str;
}

/// Allocate an instance from `pools` and decode `data` into it.
///
/// On failure the instance goes back to its pool before the error returns.
pub fn decode_pooled<T: SnapshotData>(data: &Value, pools: &mut PoolRegistry) -> Result<Pooled<T>> {
    let mut item = pools.alloc::<T>();
    match item.decode(data, pools) {
        Ok(()) => Ok(item),
        Err(err) => {
            let _ = pools.free(item);
            Err(err)
        }
    }
}

/// Implement [`Poolable`] and [`SnapshotData`] for a flat
/// `Clone + Default + Serialize + Deserialize` type.
///
/// Entity-typed fields can be listed after `entities:` so stale references
/// get cleared on restore.
#[macro_export]
macro_rules! plain_data {
    ($ty:ty) => {
        $crate::plain_data!($ty, entities: []);
    };
    ($ty:ty, entities: [$($field:ident),* $(,)?]) => {
        impl $crate::pool::Poolable for $ty {
            fn reset(&mut self, _pools: &mut $crate::pool::PoolRegistry) {
                *self = <$ty as ::core::default::Default>::default();
            }

            fn copy_into(&self, target: &mut Self, _pools: &mut $crate::pool::PoolRegistry) {
                target.clone_from(self);
            }
        }

        impl $crate::component::SnapshotData for $ty {
            fn encode(&self) -> $crate::error::Result<$crate::__private::serde_json::Value> {
                Ok($crate::__private::serde_json::to_value(self)?)
            }

            fn decode(
                &mut self,
                data: &$crate::__private::serde_json::Value,
                _pools: &mut $crate::pool::PoolRegistry,
            ) -> $crate::error::Result<()> {
                *self = <$ty as $crate::__private::serde::Deserialize>::deserialize(data)?;
                Ok(())
            }

            #[allow(unused_variables)]
            fn visit_entities(&mut self, visitor: &mut dyn FnMut(&mut $crate::entity::Entity)) {
                $(visitor(&mut self.$field);)*
            }
        }
    };
}

/// [`plain_data!`] plus a [`Component`] tag.
///
/// ```
/// use rewind_ecs::prelude::*;
///
/// #[derive(Clone, Default, serde::Serialize, serde::Deserialize)]
/// struct Follow { leader: Entity, distance: f32 }
/// rewind_ecs::plain_component!(Follow, "follow", entities: [leader]);
///
/// assert_eq!(<Follow as Component>::TAG, "follow");
/// ```
#[macro_export]
macro_rules! plain_component {
    ($ty:ty, $tag:expr) => {
        $crate::plain_component!($ty, $tag, entities: []);
    };
    ($ty:ty, $tag:expr, entities: [$($field:ident),* $(,)?]) => {
        $crate::plain_data!($ty, entities: [$($field),*]);

        impl $crate::component::Component for $ty {
            const TAG: &'static str = $tag;
        }
    };
}
