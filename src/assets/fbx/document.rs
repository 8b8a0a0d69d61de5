//! Format-neutral FBX node tree
//!
//! Both the binary and the ASCII reader produce the same [`FbxDocument`]:
//! a list of named nodes, each with typed properties and child nodes.

use crate::error::LoadError;

/// Oldest FBX version the loader understands
pub const MIN_VERSION: u32 = 7000;

/// One typed node property
#[derive(Debug, Clone, PartialEq)]
pub enum Property {
    Bool(bool),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    String(String),
    Raw(Vec<u8>),
    BoolArray(Vec<bool>),
    I32Array(Vec<i32>),
    I64Array(Vec<i64>),
    F32Array(Vec<f32>),
    F64Array(Vec<f64>),
}

impl Property {
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Property::Bool(v) => Some(v as i64),
            Property::I16(v) => Some(v as i64),
            Property::I32(v) => Some(v as i64),
            Property::I64(v) => Some(v),
            Property::F32(v) => Some(v as i64),
            Property::F64(v) => Some(v as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Property::I16(v) => Some(v as f64),
            Property::I32(v) => Some(v as f64),
            Property::I64(v) => Some(v as f64),
            Property::F32(v) => Some(v as f64),
            Property::F64(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Property::String(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric array (or scalar) widened to `f64`
    pub fn to_f64_vec(&self) -> Option<Vec<f64>> {
        match self {
            Property::F64Array(v) => Some(v.clone()),
            Property::F32Array(v) => Some(v.iter().map(|&x| x as f64).collect()),
            Property::I32Array(v) => Some(v.iter().map(|&x| x as f64).collect()),
            Property::I64Array(v) => Some(v.iter().map(|&x| x as f64).collect()),
            other => other.as_f64().map(|x| vec![x]),
        }
    }

    /// Integer array (or scalar) narrowed to `i32`
    pub fn to_i32_vec(&self) -> Option<Vec<i32>> {
        match self {
            Property::I32Array(v) => Some(v.clone()),
            Property::I64Array(v) => Some(v.iter().map(|&x| x as i32).collect()),
            Property::BoolArray(v) => Some(v.iter().map(|&x| x as i32).collect()),
            other => other.as_i64().map(|x| vec![x as i32]),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FbxNode {
    pub name: String,
    pub properties: Vec<Property>,
    pub children: Vec<FbxNode>,
}

impl FbxNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_property(mut self, property: Property) -> Self {
        self.properties.push(property);
        self
    }

    pub fn with_child(mut self, child: FbxNode) -> Self {
        self.children.push(child);
        self
    }

    /// First child with the given name
    pub fn child(&self, name: &str) -> Option<&FbxNode> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a FbxNode> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    pub fn property(&self, index: usize) -> Option<&Property> {
        self.properties.get(index)
    }

    /// First property of the named child as a string
    pub fn child_str(&self, name: &str) -> Option<&str> {
        self.child(name)?.property(0)?.as_str()
    }

    /// First property of the named child as a float array
    pub fn child_f64_vec(&self, name: &str) -> Option<Vec<f64>> {
        self.child(name)?.property(0)?.to_f64_vec()
    }

    /// First property of the named child as an int array
    pub fn child_i32_vec(&self, name: &str) -> Option<Vec<i32>> {
        self.child(name)?.property(0)?.to_i32_vec()
    }

    /// Looks up an entry of the `Properties70` block, returning its values
    ///
    /// Entries are `P: name, type, label, flags, values...`.
    pub fn property70(&self, name: &str) -> Option<&[Property]> {
        self.child("Properties70")?
            .children_named("P")
            .find(|p| p.property(0).and_then(Property::as_str) == Some(name))
            .map(|p| p.properties.get(4..).unwrap_or(&[]))
    }

    pub fn property70_vec3(&self, name: &str) -> Option<[f64; 3]> {
        let values = self.property70(name)?;
        Some([
            values.first()?.as_f64()?,
            values.get(1)?.as_f64()?,
            values.get(2)?.as_f64()?,
        ])
    }

    pub fn property70_f64(&self, name: &str) -> Option<f64> {
        self.property70(name)?.first()?.as_f64()
    }
}

/// Parsed FBX file
#[derive(Debug, Clone, PartialEq)]
pub struct FbxDocument {
    pub version: u32,
    pub roots: Vec<FbxNode>,
}

impl FbxDocument {
    /// Parses binary or ASCII FBX, rejecting versions older than 7.0
    pub fn parse(bytes: &[u8]) -> Result<Self, LoadError> {
        let document = if super::binary::is_binary(bytes) {
            super::binary::parse(bytes)?
        } else {
            super::ascii::parse(bytes)?
        };
        if document.version < MIN_VERSION {
            return Err(LoadError::UnsupportedFeature(format!(
                "FBX version {} (7000 or newer required)",
                document.version
            )));
        }
        Ok(document)
    }

    pub fn root(&self, name: &str) -> Option<&FbxNode> {
        self.roots.iter().find(|n| n.name == name)
    }
}

/// Strips the class part of an object name
///
/// ASCII files write `Model::Cube`, binary files `Cube\0\x01Model`.
pub fn object_name(raw: &str) -> &str {
    if let Some((name, _class)) = raw.split_once("\u{0}\u{1}") {
        return name;
    }
    match raw.split_once("::") {
        Some((_class, name)) => name,
        None => raw,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_name_forms() {
        assert_eq!(object_name("Model::Cube"), "Cube");
        assert_eq!(object_name("Cube\u{0}\u{1}Model"), "Cube");
        assert_eq!(object_name("Plain"), "Plain");
    }

    #[test]
    fn test_property70_lookup() {
        let model = FbxNode::new("Model").with_child(
            FbxNode::new("Properties70").with_child(
                FbxNode::new("P")
                    .with_property(Property::String("Lcl Translation".into()))
                    .with_property(Property::String("Lcl Translation".into()))
                    .with_property(Property::String("".into()))
                    .with_property(Property::String("A".into()))
                    .with_property(Property::F64(1.0))
                    .with_property(Property::F64(2.0))
                    .with_property(Property::I64(3)),
            ),
        );
        assert_eq!(model.property70_vec3("Lcl Translation"), Some([1.0, 2.0, 3.0]));
        assert_eq!(model.property70_vec3("Lcl Rotation"), None);
    }
}
