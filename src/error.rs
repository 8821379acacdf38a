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

//! Error types

use std::fmt;

use crate::entity::Entity;

/// ECS error type
#[derive(Debug, Clone, PartialEq)]
pub enum EcsError {
    /// Freed an instance the pool does not track as in use.
    /// The instance is discarded instead of entering the free list.
    PoolUnderflow { type_name: &'static str },

    /// Component type is not attached to the entity
    MissingComponent { entity: Entity, tag: &'static str },

    /// Entity already carries a component of this type
    DuplicateComponent { entity: Entity, tag: &'static str },

    /// Entity is not alive (never allocated, despawned, or stale version)
    EntityNotFound(Entity),

    /// The null entity cannot carry components
    NullEntity,

    /// Component type was never registered with the world
    UnregisteredComponent(&'static str),

    /// Two component types tried to register the same tag
    TagConflict(&'static str),

    /// Snapshot references a tag no registered component uses
    UnknownComponentType(String),

    /// Entity reference points at an entity that is no longer alive
    StaleEntityReference(Entity),

    /// Snapshot data is structurally invalid
    MalformedSnapshot(String),

    /// Serialization error
    SerializationError(String),

    /// Deserialization error
    DeserializationError(String),

    /// IO error (file operations, etc.)
    IoError(String),
}

impl fmt::Display for EcsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EcsError::PoolUnderflow { type_name } => {
                write!(f, "Pool underflow: freed {type_name} instance is not in use")
            }
            EcsError::MissingComponent { entity, tag } => {
                write!(f, "Component '{tag}' not present on {entity}")
            }
            EcsError::DuplicateComponent { entity, tag } => {
                write!(f, "Component '{tag}' already attached to {entity}")
            }
            EcsError::EntityNotFound(entity) => write!(f, "Entity not found: {entity}"),
            EcsError::NullEntity => write!(f, "The null entity cannot carry components"),
            EcsError::UnregisteredComponent(name) => {
                write!(f, "Component type not registered: {name}")
            }
            EcsError::TagConflict(tag) => write!(f, "Component tag already in use: '{tag}'"),
            EcsError::UnknownComponentType(tag) => write!(f, "Unknown component type: '{tag}'"),
            EcsError::StaleEntityReference(entity) => {
                write!(f, "Stale entity reference: {entity}")
            }
            EcsError::MalformedSnapshot(msg) => write!(f, "Malformed snapshot: {msg}"),
            EcsError::SerializationError(msg) => write!(f, "Serialization error: {msg}"),
            EcsError::DeserializationError(msg) => write!(f, "Deserialization error: {msg}"),
            EcsError::IoError(msg) => write!(f, "IO error: {msg}"),
        }
    }
}

impl std::error::Error for EcsError {}

impl From<std::io::Error> for EcsError {
    fn from(err: std::io::Error) -> Self {
        EcsError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for EcsError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() || err.is_syntax() || err.is_eof() {
            EcsError::DeserializationError(err.to_string())
        } else {
            EcsError::SerializationError(err.to_string())
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, EcsError>;
