//! Animatable field values.
//!
//! Tween steps address a field by component tag plus field name. Component
//! types opt in by implementing [`Animatable`] and registering through
//! [`World::register_animatable`](crate::World::register_animatable).

use glam::{Vec2, Vec4};
use serde::{Deserialize, Serialize};

use crate::component::Component;
use crate::entity::Entity;

/// A value a tween can interpolate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum TweenValue {
    Scalar(f32),
    Vec2(Vec2),
    /// RGBA, each channel in `[0, 1]`
    Color(Vec4),
}

impl Default for TweenValue {
    fn default() -> Self {
        TweenValue::Scalar(0.0)
    }
}

impl TweenValue {
    /// Interpolate towards `end` by `factor`.
    ///
    /// `factor <= 0` yields `self` and `factor >= 1` yields `end`, bit for bit.
    /// Mismatched kinds return `None`.
    pub fn lerp(self, end: TweenValue, factor: f32) -> Option<TweenValue> {
        if factor >= 1.0 {
            return self.same_kind(&end).then_some(end);
        }
        if factor <= 0.0 {
            return self.same_kind(&end).then_some(self);
        }
        match (self, end) {
            (TweenValue::Scalar(a), TweenValue::Scalar(b)) => {
                Some(TweenValue::Scalar(a + (b - a) * factor))
            }
            (TweenValue::Vec2(a), TweenValue::Vec2(b)) => Some(TweenValue::Vec2(a.lerp(b, factor))),
            (TweenValue::Color(a), TweenValue::Color(b)) => {
                Some(TweenValue::Color(a.lerp(b, factor)))
            }
            _ => None,
        }
    }

    pub fn same_kind(&self, other: &TweenValue) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }

    pub fn as_scalar(&self) -> Option<f32> {
        match self {
            TweenValue::Scalar(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_vec2(&self) -> Option<Vec2> {
        match self {
            TweenValue::Vec2(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_color(&self) -> Option<Vec4> {
        match self {
            TweenValue::Color(v) => Some(*v),
            _ => None,
        }
    }
}

/// Component whose fields can be read and written by name.
pub trait Animatable: Component {
    fn read_field(&self, field: &str) -> Option<TweenValue>;

    /// Returns false when the field is unknown or the value kind does not fit.
    fn write_field(&mut self, field: &str, value: TweenValue) -> bool;
}

/// Reads and writes animatable fields on behalf of a running tween script.
pub trait FieldTarget {
    fn read(&self, entity: Entity, component: &str, field: &str) -> Option<TweenValue>;
    fn write(&mut self, entity: Entity, component: &str, field: &str, value: TweenValue) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lerp_endpoints_exact() {
        let a = TweenValue::Scalar(0.1);
        let b = TweenValue::Scalar(0.7);
        assert_eq!(a.lerp(b, 0.0), Some(a));
        assert_eq!(a.lerp(b, 1.0), Some(b));
    }

    #[test]
    fn test_lerp_midpoint() {
        let a = TweenValue::Vec2(Vec2::new(0.0, 10.0));
        let b = TweenValue::Vec2(Vec2::new(10.0, 20.0));
        assert_eq!(a.lerp(b, 0.5), Some(TweenValue::Vec2(Vec2::new(5.0, 15.0))));
    }

    #[test]
    fn test_lerp_kind_mismatch() {
        let a = TweenValue::Scalar(1.0);
        let b = TweenValue::Color(Vec4::ONE);
        assert_eq!(a.lerp(b, 0.5), None);
        assert_eq!(a.lerp(b, 1.0), None);
    }

    #[test]
    fn test_json_shape() {
        let json = serde_json::to_value(TweenValue::Scalar(2.0)).unwrap();
        assert_eq!(json, serde_json::json!({ "kind": "scalar", "value": 2.0 }));
    }
}
