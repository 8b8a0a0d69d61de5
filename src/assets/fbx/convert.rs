//! FBX document to scene graph
//!
//! Walks `Objects` and `Connections`: every mesh geometry is instanced once
//! per model it is connected to, with the model's global transform baked into
//! positions and normals. Polygons are fan-triangulated and split into one
//! mesh node per material slot.

use std::{collections::HashMap, sync::Arc};

use cgmath::{Deg, InnerSpace, Matrix, Matrix3, Matrix4, SquareMatrix, Vector3, Vector4};

use super::document::{object_name, FbxDocument, FbxNode, Property};
use crate::{
    error::LoadError,
    gfx::{
        geometry::Geometry,
        resources::material::Material,
        scene::node::{GroupNode, LoadedObject, MeshNode, SceneNode},
    },
};

/// Parent chains longer than this are treated as cyclic
const MAX_HIERARCHY_DEPTH: usize = 32;

#[derive(Debug, Default)]
struct Connections {
    parents: HashMap<i64, Vec<i64>>,
    children: HashMap<i64, Vec<i64>>,
}

impl Connections {
    fn from_document(document: &FbxDocument) -> Self {
        let mut connections = Connections::default();
        let Some(node) = document.root("Connections") else {
            return connections;
        };
        for c in node.children_named("C") {
            if c.property(0).and_then(Property::as_str) != Some("OO") {
                continue;
            }
            let (Some(child), Some(parent)) = (
                c.property(1).and_then(Property::as_i64),
                c.property(2).and_then(Property::as_i64),
            ) else {
                continue;
            };
            connections.parents.entry(child).or_default().push(parent);
            connections.children.entry(parent).or_default().push(child);
        }
        connections
    }

    fn parents_of(&self, id: i64) -> &[i64] {
        self.parents.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    fn children_of(&self, id: i64) -> &[i64] {
        self.children.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }
}

fn node_id(node: &FbxNode) -> Option<i64> {
    node.property(0).and_then(Property::as_i64)
}

fn node_class(node: &FbxNode) -> &str {
    node.property(2).and_then(Property::as_str).unwrap_or("")
}

fn node_display_name(node: &FbxNode) -> &str {
    node.property(1)
        .and_then(Property::as_str)
        .map(object_name)
        .unwrap_or("")
}

fn euler_xyz(degrees: [f64; 3]) -> Matrix4<f32> {
    Matrix4::from_angle_z(Deg(degrees[2] as f32))
        * Matrix4::from_angle_y(Deg(degrees[1] as f32))
        * Matrix4::from_angle_x(Deg(degrees[0] as f32))
}

/// `T * PreRotation * R * S` of one model
fn local_transform(model: &FbxNode) -> Matrix4<f32> {
    let t = model.property70_vec3("Lcl Translation").unwrap_or([0.0; 3]);
    let pre = model.property70_vec3("PreRotation").unwrap_or([0.0; 3]);
    let r = model.property70_vec3("Lcl Rotation").unwrap_or([0.0; 3]);
    let s = model.property70_vec3("Lcl Scaling").unwrap_or([1.0; 3]);
    Matrix4::from_translation(Vector3::new(t[0] as f32, t[1] as f32, t[2] as f32))
        * euler_xyz(pre)
        * euler_xyz(r)
        * Matrix4::from_nonuniform_scale(s[0] as f32, s[1] as f32, s[2] as f32)
}

fn global_transform(
    id: i64,
    models: &HashMap<i64, &FbxNode>,
    connections: &Connections,
    depth: usize,
) -> Result<Matrix4<f32>, LoadError> {
    if depth > MAX_HIERARCHY_DEPTH {
        return Err(LoadError::Parse("model hierarchy is cyclic".to_string()));
    }
    let Some(model) = models.get(&id) else {
        return Ok(Matrix4::identity());
    };
    let parent = connections
        .parents_of(id)
        .iter()
        .copied()
        .find(|p| models.contains_key(p));
    let local = local_transform(model);
    match parent {
        Some(parent) => Ok(global_transform(parent, models, connections, depth + 1)? * local),
        None => Ok(local),
    }
}

fn convert_material(node: &FbxNode) -> Material {
    let name = node_display_name(node);
    let diffuse = node
        .property70_vec3("DiffuseColor")
        .or_else(|| node.property70_vec3("Diffuse"))
        .unwrap_or([0.8; 3]);
    let factor = node.property70_f64("DiffuseFactor").unwrap_or(1.0);
    let opacity = node.property70_f64("Opacity").unwrap_or(1.0);
    let shininess = node
        .property70_f64("Shininess")
        .or_else(|| node.property70_f64("ShininessExponent"))
        .unwrap_or(20.0)
        .max(0.0);
    let emissive = node.property70_vec3("EmissiveColor").unwrap_or([0.0; 3]);
    let emissive_factor = node.property70_f64("EmissiveFactor").unwrap_or(1.0);

    // Blinn-Phong exponent to perceptual roughness
    let roughness = (2.0 / (shininess + 2.0)).sqrt() as f32;
    Material::new(
        name,
        [
            (diffuse[0] * factor) as f32,
            (diffuse[1] * factor) as f32,
            (diffuse[2] * factor) as f32,
            opacity as f32,
        ],
        0.0,
        roughness,
    )
    .with_emission(
        (emissive[0] * emissive_factor) as f32,
        (emissive[1] * emissive_factor) as f32,
        (emissive[2] * emissive_factor) as f32,
    )
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Mapping {
    PolygonVertex,
    ControlPoint,
    Polygon,
    AllSame,
}

/// One `LayerElement*` block resolved to flat values
struct LayerElement {
    values: Vec<f64>,
    indices: Option<Vec<i32>>,
    mapping: Mapping,
    width: usize,
}

impl LayerElement {
    fn read(
        node: &FbxNode,
        data_name: &str,
        index_name: &str,
        width: usize,
        indexed: bool,
    ) -> Result<Self, LoadError> {
        let mapping = match node.child_str("MappingInformationType").unwrap_or("ByPolygonVertex") {
            "ByPolygonVertex" => Mapping::PolygonVertex,
            "ByVertex" | "ByVertice" | "ByControlPoint" => Mapping::ControlPoint,
            "ByPolygon" => Mapping::Polygon,
            "AllSame" => Mapping::AllSame,
            other => {
                return Err(LoadError::UnsupportedFeature(format!(
                    "{} mapping '{}'",
                    node.name, other
                )))
            }
        };
        let indices = if indexed {
            match node.child_str("ReferenceInformationType").unwrap_or("Direct") {
                "Direct" => None,
                "IndexToDirect" | "Index" => Some(node.child_i32_vec(index_name).ok_or_else(|| {
                    LoadError::Parse(format!("{} is missing {}", node.name, index_name))
                })?),
                other => {
                    return Err(LoadError::UnsupportedFeature(format!(
                        "{} reference '{}'",
                        node.name, other
                    )))
                }
            }
        } else {
            None
        };
        let values = node
            .child_f64_vec(data_name)
            .ok_or_else(|| LoadError::Parse(format!("{} is missing {}", node.name, data_name)))?;
        Ok(Self {
            values,
            indices,
            mapping,
            width,
        })
    }

    fn get(&self, polygon_vertex: usize, control_point: usize, polygon: usize) -> Result<&[f64], LoadError> {
        let slot = match self.mapping {
            Mapping::PolygonVertex => polygon_vertex,
            Mapping::ControlPoint => control_point,
            Mapping::Polygon => polygon,
            Mapping::AllSame => 0,
        };
        let index = match &self.indices {
            Some(indices) => {
                let raw = indices
                    .get(slot)
                    .copied()
                    .ok_or_else(|| LoadError::Parse("layer index array is too short".to_string()))?;
                usize::try_from(raw)
                    .map_err(|_| LoadError::Parse(format!("negative layer index {raw}")))?
            }
            None => slot,
        };
        let start = index * self.width;
        self.values
            .get(start..start + self.width)
            .ok_or_else(|| LoadError::Parse(format!("layer value {index} out of range")))
    }
}

#[derive(Debug, Default)]
struct Bucket {
    positions: Vec<[f32; 3]>,
    normals: Vec<[f32; 3]>,
    uvs: Vec<[f32; 2]>,
    uv2: Vec<[f32; 2]>,
    indices: Vec<u32>,
}

/// Geometry pieces of one mesh, keyed by material slot
type Buckets = Vec<(usize, Bucket)>;

fn bucket_for(buckets: &mut Buckets, slot: usize) -> &mut Bucket {
    let position = match buckets.iter().position(|(s, _)| *s == slot) {
        Some(position) => position,
        None => {
            buckets.push((slot, Bucket::default()));
            buckets.len() - 1
        }
    };
    &mut buckets[position].1
}

fn normal_matrix(transform: &Matrix4<f32>) -> Matrix3<f32> {
    let linear = Matrix3::from_cols(
        transform.x.truncate(),
        transform.y.truncate(),
        transform.z.truncate(),
    );
    linear.invert().map(|m| m.transpose()).unwrap_or(linear)
}

fn extract_mesh(geometry: &FbxNode, transform: &Matrix4<f32>) -> Result<(Buckets, bool, usize), LoadError> {
    let vertices = geometry
        .child_f64_vec("Vertices")
        .ok_or_else(|| LoadError::Parse("mesh geometry has no Vertices".to_string()))?;
    if vertices.len() % 3 != 0 {
        return Err(LoadError::Parse(format!(
            "Vertices holds {} values, not a multiple of 3",
            vertices.len()
        )));
    }
    let control_points: Vec<[f32; 3]> = vertices
        .chunks_exact(3)
        .map(|c| {
            let p = transform * Vector4::new(c[0] as f32, c[1] as f32, c[2] as f32, 1.0);
            [p.x, p.y, p.z]
        })
        .collect();

    let raw_indices = geometry.child_i32_vec("PolygonVertexIndex").unwrap_or_default();

    // (first polygon vertex, vertex count) per polygon
    let mut polygons: Vec<(usize, usize)> = Vec::new();
    let mut corners: Vec<usize> = Vec::with_capacity(raw_indices.len());
    let mut start = 0;
    for (i, &raw) in raw_indices.iter().enumerate() {
        let closes = raw < 0;
        let control_point = (if closes { !raw } else { raw }) as usize;
        if control_point >= control_points.len() {
            return Err(LoadError::Parse(format!(
                "polygon vertex {} references control point {} of {}",
                i,
                control_point,
                control_points.len()
            )));
        }
        corners.push(control_point);
        if closes {
            polygons.push((start, i + 1 - start));
            start = i + 1;
        }
    }
    if start < corners.len() {
        log::warn!("Last polygon of '{}' is not closed", node_display_name(geometry));
        polygons.push((start, corners.len() - start));
    }

    let normals = geometry
        .children_named("LayerElementNormal")
        .next()
        .map(|n| LayerElement::read(n, "Normals", "NormalsIndex", 3, true))
        .transpose()?;
    let mut uv_sets = geometry.children_named("LayerElementUV");
    let uvs = uv_sets
        .next()
        .map(|n| LayerElement::read(n, "UV", "UVIndex", 2, true))
        .transpose()?;
    let uv2 = uv_sets
        .next()
        .map(|n| LayerElement::read(n, "UV", "UVIndex", 2, true))
        .transpose()?;
    // Material layers hold slot numbers directly whatever their reference type says
    let materials = geometry
        .children_named("LayerElementMaterial")
        .next()
        .map(|n| LayerElement::read(n, "Materials", "", 1, false))
        .transpose()?;

    let normal_matrix = normal_matrix(transform);
    let mut buckets: Buckets = Vec::new();
    let mut skipped = 0;

    for (polygon, &(first, count)) in polygons.iter().enumerate() {
        if count < 3 {
            skipped += 1;
            continue;
        }
        let slot = match &materials {
            Some(layer) => layer.get(first, corners[first], polygon)?[0].max(0.0) as usize,
            None => 0,
        };
        let bucket = bucket_for(&mut buckets, slot);
        let base = bucket.positions.len() as u32;

        for pv in first..first + count {
            let cp = corners[pv];
            bucket.positions.push(control_points[cp]);
            if let Some(layer) = &normals {
                let n = layer.get(pv, cp, polygon)?;
                let n = normal_matrix * Vector3::new(n[0] as f32, n[1] as f32, n[2] as f32);
                let n = if n.magnitude2() > 0.0 { n.normalize() } else { n };
                bucket.normals.push([n.x, n.y, n.z]);
            }
            if let Some(layer) = &uvs {
                let uv = layer.get(pv, cp, polygon)?;
                bucket.uvs.push([uv[0] as f32, 1.0 - uv[1] as f32]);
            }
            if let Some(layer) = &uv2 {
                let uv = layer.get(pv, cp, polygon)?;
                bucket.uv2.push([uv[0] as f32, 1.0 - uv[1] as f32]);
            }
        }
        for k in 1..count as u32 - 1 {
            bucket.indices.extend_from_slice(&[base, base + k, base + k + 1]);
        }
    }

    if skipped > 0 {
        log::debug!("Skipped {} points/lines in '{}'", skipped, node_display_name(geometry));
    }
    Ok((buckets, normals.is_some(), usize::from(uvs.is_some()) + usize::from(uv2.is_some())))
}

fn bucket_geometry(bucket: Bucket, has_normals: bool, uv_sets: usize) -> Geometry {
    let normals = if has_normals {
        bucket.normals
    } else {
        Geometry::calculate_normals(&bucket.positions, &bucket.indices)
    };
    let mut geometry = Geometry::new(bucket.positions, normals, bucket.indices);
    if uv_sets >= 1 {
        geometry.uvs = Some(bucket.uvs);
    }
    if uv_sets >= 2 {
        geometry.uv2 = Some(bucket.uv2);
    }
    geometry
}

/// Builds the scene graph of an FBX document
pub fn to_object(document: &FbxDocument, name: &str) -> Result<LoadedObject, LoadError> {
    let objects = document
        .root("Objects")
        .ok_or_else(|| LoadError::Parse("FBX has no Objects section".to_string()))?;
    let connections = Connections::from_document(document);

    let models: HashMap<i64, &FbxNode> = objects
        .children_named("Model")
        .filter_map(|m| node_id(m).map(|id| (id, m)))
        .collect();
    let material_nodes: HashMap<i64, &FbxNode> = objects
        .children_named("Material")
        .filter_map(|m| node_id(m).map(|id| (id, m)))
        .collect();

    let geometries: Vec<&FbxNode> = objects.children_named("Geometry").collect();
    let meshes: Vec<&FbxNode> = geometries
        .iter()
        .copied()
        .filter(|g| node_class(g) == "Mesh")
        .collect();
    if meshes.is_empty() {
        if geometries.iter().any(|g| node_class(g).starts_with("Nurbs")) {
            return Err(LoadError::UnsupportedFeature(
                "NURBS geometry without polygon meshes".to_string(),
            ));
        }
        return Err(LoadError::Parse("FBX contains no mesh geometry".to_string()));
    }

    let default_material = Arc::new(Material::default());
    let mut material_cache: HashMap<i64, Arc<Material>> = HashMap::new();
    let mut root = GroupNode::new(name);

    for geometry in meshes {
        let geometry_id = node_id(geometry).unwrap_or_default();
        let owners: Vec<i64> = connections
            .parents_of(geometry_id)
            .iter()
            .copied()
            .filter(|p| models.contains_key(p))
            .collect();

        // Unconnected geometry is shown untransformed
        let instances: Vec<Option<i64>> = if owners.is_empty() {
            vec![None]
        } else {
            owners.into_iter().map(Some).collect()
        };

        for owner in instances {
            let (transform, model_name, slots) = match owner {
                Some(model_id) => {
                    let transform = global_transform(model_id, &models, &connections, 0)?;
                    let model_name = node_display_name(models[&model_id]).to_string();
                    let slots: Vec<Arc<Material>> = connections
                        .children_of(model_id)
                        .iter()
                        .filter_map(|id| {
                            let node = material_nodes.get(id)?;
                            Some(Arc::clone(
                                material_cache
                                    .entry(*id)
                                    .or_insert_with(|| Arc::new(convert_material(node))),
                            ))
                        })
                        .collect();
                    (transform, model_name, slots)
                }
                None => (
                    Matrix4::identity(),
                    node_display_name(geometry).to_string(),
                    Vec::new(),
                ),
            };

            let (buckets, has_normals, uv_sets) = extract_mesh(geometry, &transform)?;
            let material_for = |slot: usize| {
                slots
                    .get(slot)
                    .cloned()
                    .unwrap_or_else(|| Arc::clone(&default_material))
            };

            match buckets.len() {
                0 => {}
                1 => {
                    let (slot, bucket) = buckets.into_iter().next().unwrap_or_default();
                    root.children.push(SceneNode::Mesh(MeshNode::new(
                        model_name,
                        bucket_geometry(bucket, has_normals, uv_sets),
                        material_for(slot),
                    )));
                }
                _ => {
                    let mut group = GroupNode::new(model_name.clone());
                    for (slot, bucket) in buckets {
                        let material = material_for(slot);
                        group.children.push(SceneNode::Mesh(MeshNode::new(
                            format!("{}_{}", model_name, material.name),
                            bucket_geometry(bucket, has_normals, uv_sets),
                            material,
                        )));
                    }
                    root.children.push(SceneNode::Group(group));
                }
            }
        }
    }

    let object = LoadedObject::new(name, SceneNode::Group(root));
    log::info!(
        "FBX '{}': {} meshes, {} vertices",
        name,
        object.mesh_count(),
        object.vertex_count()
    );
    Ok(object)
}
