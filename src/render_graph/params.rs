//! Named, typed parameters bound to a pass

use crate::render_graph::resource::ResourceId;
use glam::{Mat3, Mat4, Vec2, Vec3, Vec4};
use std::collections::BTreeMap;
use thiserror::Error;

/// Parameter lookup error
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParameterError {
    #[error("Missing parameter '{0}'")]
    Missing(String),
    #[error("Parameter '{name}' is {found}, expected {expected}")]
    TypeMismatch {
        name: String,
        expected: &'static str,
        found: &'static str,
    },
}

/// A single parameter value
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterValue {
    Float(f32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat3(Mat3),
    Mat4(Mat4),
    Texture(ResourceId),
    Vec2Array(Vec<Vec2>),
}

macro_rules! typed_getter {
    ($fn_name:ident, $variant:ident, $ty:ty, $label:literal) => {
        pub fn $fn_name(&self, name: &str) -> Result<$ty, ParameterError> {
            match self {
                ParameterValue::$variant(value) => Ok(value.clone()),
                other => Err(ParameterError::TypeMismatch {
                    name: name.to_string(),
                    expected: $label,
                    found: other.type_name(),
                }),
            }
        }
    };
}

impl ParameterValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            ParameterValue::Float(_) => "float",
            ParameterValue::Vec2(_) => "vec2",
            ParameterValue::Vec3(_) => "vec3",
            ParameterValue::Vec4(_) => "vec4",
            ParameterValue::Mat3(_) => "mat3",
            ParameterValue::Mat4(_) => "mat4",
            ParameterValue::Texture(_) => "texture",
            ParameterValue::Vec2Array(_) => "vec2[]",
        }
    }

    typed_getter!(as_float, Float, f32, "float");
    typed_getter!(as_vec2, Vec2, Vec2, "vec2");
    typed_getter!(as_vec3, Vec3, Vec3, "vec3");
    typed_getter!(as_vec4, Vec4, Vec4, "vec4");
    typed_getter!(as_mat3, Mat3, Mat3, "mat3");
    typed_getter!(as_mat4, Mat4, Mat4, "mat4");
    typed_getter!(as_texture, Texture, ResourceId, "texture");

    pub fn as_vec2_array(&self, name: &str) -> Result<&[Vec2], ParameterError> {
        match self {
            ParameterValue::Vec2Array(values) => Ok(values),
            other => Err(ParameterError::TypeMismatch {
                name: name.to_string(),
                expected: "vec2[]",
                found: other.type_name(),
            }),
        }
    }
}

impl From<f32> for ParameterValue {
    fn from(value: f32) -> Self {
        ParameterValue::Float(value)
    }
}

impl From<Vec2> for ParameterValue {
    fn from(value: Vec2) -> Self {
        ParameterValue::Vec2(value)
    }
}

impl From<Vec3> for ParameterValue {
    fn from(value: Vec3) -> Self {
        ParameterValue::Vec3(value)
    }
}

impl From<Vec4> for ParameterValue {
    fn from(value: Vec4) -> Self {
        ParameterValue::Vec4(value)
    }
}

impl From<Mat3> for ParameterValue {
    fn from(value: Mat3) -> Self {
        ParameterValue::Mat3(value)
    }
}

impl From<Mat4> for ParameterValue {
    fn from(value: Mat4) -> Self {
        ParameterValue::Mat4(value)
    }
}

impl From<ResourceId> for ParameterValue {
    fn from(value: ResourceId) -> Self {
        ParameterValue::Texture(value)
    }
}

impl From<Vec<Vec2>> for ParameterValue {
    fn from(value: Vec<Vec2>) -> Self {
        ParameterValue::Vec2Array(value)
    }
}

/// Ordered mapping from parameter name to value
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterBlock {
    values: BTreeMap<String, ParameterValue>,
}

impl ParameterBlock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: &str, value: impl Into<ParameterValue>) {
        self.values.insert(name.to_string(), value.into());
    }

    pub fn with(mut self, name: &str, value: impl Into<ParameterValue>) -> Self {
        self.set(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Result<&ParameterValue, ParameterError> {
        self.values
            .get(name)
            .ok_or_else(|| ParameterError::Missing(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParameterValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Copy every value of `other` into this block, replacing existing names
    pub fn extend_from(&mut self, other: &ParameterBlock) {
        for (name, value) in &other.values {
            self.values.insert(name.clone(), value.clone());
        }
    }

    pub fn float(&self, name: &str) -> Result<f32, ParameterError> {
        self.get(name)?.as_float(name)
    }

    pub fn vec2(&self, name: &str) -> Result<Vec2, ParameterError> {
        self.get(name)?.as_vec2(name)
    }

    pub fn vec3(&self, name: &str) -> Result<Vec3, ParameterError> {
        self.get(name)?.as_vec3(name)
    }

    pub fn vec4(&self, name: &str) -> Result<Vec4, ParameterError> {
        self.get(name)?.as_vec4(name)
    }

    pub fn mat3(&self, name: &str) -> Result<Mat3, ParameterError> {
        self.get(name)?.as_mat3(name)
    }

    pub fn mat4(&self, name: &str) -> Result<Mat4, ParameterError> {
        self.get(name)?.as_mat4(name)
    }

    pub fn texture(&self, name: &str) -> Result<ResourceId, ParameterError> {
        self.get(name)?.as_texture(name)
    }

    pub fn vec2_array(&self, name: &str) -> Result<&[Vec2], ParameterError> {
        self.get(name)?.as_vec2_array(name)
    }
}
