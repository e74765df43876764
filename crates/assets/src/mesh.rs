use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use std::collections::HashMap;
use std::path::Path;
use worldstream_common::Transform;

use crate::AssetError;
use crate::source::AssetSource;

/// Interleaved mesh vertex, laid out for direct GPU upload.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct MeshVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

/// CPU-side decoded triangle mesh.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<MeshVertex>,
    pub indices: Vec<u32>,
}

impl MeshData {
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn positions(&self) -> impl Iterator<Item = Vec3> + '_ {
        self.vertices.iter().map(|v| Vec3::from(v.position))
    }
}

/// Triangle soup handed to the physics collaborator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollisionMesh {
    pub positions: Vec<Vec3>,
    pub indices: Vec<u32>,
}

impl CollisionMesh {
    /// Collision geometry of `mesh` placed with `transform`.
    pub fn from_mesh(mesh: &MeshData, transform: &Transform) -> Self {
        Self {
            positions: mesh
                .positions()
                .map(|p| transform.transform_point(p))
                .collect(),
            indices: mesh.indices.clone(),
        }
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

/// Read and decode a Wavefront OBJ mesh through `source`.
pub fn load_mesh(source: &dyn AssetSource, path: &Path) -> Result<MeshData, AssetError> {
    let text = source.read_text(path)?;
    parse_obj(&text).map_err(|reason| AssetError::Mesh {
        path: path.to_path_buf(),
        reason,
    })
}

/// Parse the geometry subset of Wavefront OBJ: `v`, `vt`, `vn` and `f`.
///
/// Polygons are fan-triangulated. Vertices are shared per unique
/// position/uv/normal triple. If the file carries no normals, smooth normals
/// are generated from the faces.
pub fn parse_obj(text: &str) -> Result<MeshData, String> {
    let mut positions: Vec<[f32; 3]> = Vec::new();
    let mut uvs: Vec<[f32; 2]> = Vec::new();
    let mut normals: Vec<[f32; 3]> = Vec::new();
    let mut mesh = MeshData::default();
    let mut lookup: HashMap<(usize, Option<usize>, Option<usize>), u32> = HashMap::new();

    for (line_no, raw) in text.lines().enumerate() {
        let line = raw.split('#').next().unwrap_or("").trim();
        let mut tokens = line.split_whitespace();
        let Some(tag) = tokens.next() else {
            continue;
        };
        let err = |msg: &str| format!("line {}: {msg}", line_no + 1);
        match tag {
            "v" => positions.push(parse_floats::<3>(tokens).ok_or_else(|| err("bad vertex"))?),
            "vt" => {
                let uv: Vec<f32> = tokens
                    .map(str::parse)
                    .collect::<Result<_, _>>()
                    .map_err(|_| err("bad uv"))?;
                if uv.len() < 2 {
                    return Err(err("bad uv"));
                }
                uvs.push([uv[0], uv[1]]);
            }
            "vn" => normals.push(parse_floats::<3>(tokens).ok_or_else(|| err("bad normal"))?),
            "f" => {
                let mut corners = Vec::new();
                for token in tokens {
                    let key = parse_corner(token, positions.len(), uvs.len(), normals.len())
                        .ok_or_else(|| err("bad face index"))?;
                    let index = match lookup.get(&key) {
                        Some(i) => *i,
                        None => {
                            let (p, t, n) = key;
                            let i = mesh.vertices.len() as u32;
                            mesh.vertices.push(MeshVertex {
                                position: positions[p],
                                normal: n.map(|n| normals[n]).unwrap_or([0.0; 3]),
                                uv: t.map(|t| uvs[t]).unwrap_or([0.0; 2]),
                            });
                            lookup.insert(key, i);
                            i
                        }
                    };
                    corners.push(index);
                }
                if corners.len() < 3 {
                    return Err(err("face needs at least three corners"));
                }
                for k in 1..corners.len() - 1 {
                    mesh.indices
                        .extend_from_slice(&[corners[0], corners[k], corners[k + 1]]);
                }
            }
            // groups, objects, materials and smoothing are not geometry
            _ => {}
        }
    }

    if mesh.indices.is_empty() {
        return Err("mesh has no faces".into());
    }
    if normals.is_empty() {
        generate_normals(&mut mesh);
    }
    Ok(mesh)
}

fn parse_floats<'a, const N: usize>(tokens: impl Iterator<Item = &'a str>) -> Option<[f32; N]> {
    let mut out = [0.0f32; N];
    let mut count = 0;
    for token in tokens.take(N) {
        out[count] = token.parse().ok()?;
        count += 1;
    }
    (count == N).then_some(out)
}

/// Resolve one `v[/vt][/vn]` face corner to zero-based indices.
fn parse_corner(
    token: &str,
    n_pos: usize,
    n_uv: usize,
    n_norm: usize,
) -> Option<(usize, Option<usize>, Option<usize>)> {
    let mut parts = token.split('/');
    let p = resolve_index(parts.next()?, n_pos)?;
    let t = match parts.next() {
        Some("") | None => None,
        Some(s) => Some(resolve_index(s, n_uv)?),
    };
    let n = match parts.next() {
        Some("") | None => None,
        Some(s) => Some(resolve_index(s, n_norm)?),
    };
    Some((p, t, n))
}

fn resolve_index(s: &str, len: usize) -> Option<usize> {
    let i: i64 = s.parse().ok()?;
    let idx = if i > 0 {
        i - 1
    } else if i < 0 {
        len as i64 + i
    } else {
        return None;
    };
    (0..len as i64).contains(&idx).then_some(idx as usize)
}

fn generate_normals(mesh: &mut MeshData) {
    let mut acc = vec![Vec3::ZERO; mesh.vertices.len()];
    for tri in mesh.indices.chunks_exact(3) {
        let [a, b, c] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
        let pa = Vec3::from(mesh.vertices[a].position);
        let pb = Vec3::from(mesh.vertices[b].position);
        let pc = Vec3::from(mesh.vertices[c].position);
        let n = (pb - pa).cross(pc - pa);
        acc[a] += n;
        acc[b] += n;
        acc[c] += n;
    }
    for (v, n) in mesh.vertices.iter_mut().zip(acc) {
        v.normal = n.normalize_or_zero().to_array();
    }
}
