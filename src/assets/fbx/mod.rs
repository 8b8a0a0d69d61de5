//! # FBX
//!
//! Binary and ASCII FBX (7.0 and newer) into a [`LoadedObject`].
//!
//! - [`document`] - Format-neutral node tree
//! - [`binary`] - Binary record reader with zlib array inflation
//! - [`ascii`] - Text reader
//! - [`convert`] - Meshes, materials and transforms out of the node tree

pub mod ascii;
pub mod binary;
pub mod convert;
pub mod document;

pub use document::{FbxDocument, FbxNode, Property};

use crate::{error::LoadError, gfx::scene::node::LoadedObject};

/// Parses FBX bytes into a scene graph named `name`
pub fn parse(bytes: &[u8], name: &str) -> Result<LoadedObject, LoadError> {
    let document = FbxDocument::parse(bytes)?;
    convert::to_object(&document, name)
}

/// Fixture used by loader and session tests
#[cfg(test)]
pub(crate) mod fixtures {
    /// 2×2×2 cube translated to (5, 5, 5), one red material, UVs but no normals
    pub const ASCII_CUBE: &str = r#"; FBX 7.4.0 project file
FBXHeaderExtension:  {
    FBXHeaderVersion: 1003
    FBXVersion: 7400
}
Objects:  {
    Geometry: 1000, "Geometry::Cube", "Mesh" {
        Vertices: *24 {
            a: -1,-1,-1,1,-1,-1,1,1,-1,-1,1,-1,
            -1,-1,1,1,-1,1,1,1,1,-1,1,1
        }
        PolygonVertexIndex: *24 {
            a: 4,5,6,-8,1,0,3,-3,0,4,7,-4,5,1,2,-7,7,6,2,-4,0,1,5,-5
        }
        GeometryVersion: 124
        LayerElementUV: 0 {
            Version: 101
            Name: "UVMap"
            MappingInformationType: "ByPolygonVertex"
            ReferenceInformationType: "IndexToDirect"
            UV: *8 {
                a: 0,0,1,0,1,1,0,1
            }
            UVIndex: *24 {
                a: 0,1,2,3,0,1,2,3,0,1,2,3,0,1,2,3,0,1,2,3,0,1,2,3
            }
        }
        LayerElementMaterial: 0 {
            Version: 101
            Name: ""
            MappingInformationType: "AllSame"
            ReferenceInformationType: "IndexToDirect"
            Materials: *1 {
                a: 0
            }
        }
    }
    Model: 2000, "Model::Cube", "Mesh" {
        Version: 232
        Properties70:  {
            P: "Lcl Translation", "Lcl Translation", "", "A",5,5,5
            P: "Lcl Scaling", "Lcl Scaling", "", "A",1,1,1
        }
        Shading: T
        Culling: "CullingOff"
    }
    Material: 3000, "Material::Red", "" {
        Version: 102
        ShadingModel: "phong"
        Properties70:  {
            P: "DiffuseColor", "Color", "", "A",1,0,0
            P: "Shininess", "double", "Number", "",20
        }
    }
    Material: 3001, "Material::Blue", "" {
        Version: 102
        Properties70:  {
            P: "DiffuseColor", "Color", "", "A",0,0,1
        }
    }
}
Connections:  {
    C: "OO",2000,0
    C: "OO",1000,2000
    C: "OO",3000,2000
    C: "OO",3001,2000
}
"#;
}
