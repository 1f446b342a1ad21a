//! Model assets: parsing glTF/GLB into plain data and fetching it off the
//! render thread.

pub mod loader;

use glam::{Quat, Vec3};
use thiserror::Error;

use crate::{animation::AnimationClip, model::Mesh};

pub use loader::{AssetLoader, AssetLocation, LoadEvent, LoadEventKind, LoadTask};

#[derive(Error, Debug)]
pub enum AssetError {
    #[error("Invalid model URL {url}: {message}")]
    InvalidUrl { url: String, message: String },

    #[error("Failed to fetch {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse model: {0}")]
    Parse(#[from] gltf::Error),

    #[error("Invalid node hierarchy: {0}")]
    Hierarchy(String),

    #[error("Model loading task failed: {0}")]
    Task(String),
}

/// A node of the loaded asset's hierarchy. Children and meshes are indices into
/// the owning [`LoadedAsset`].
#[derive(Debug, Clone)]
pub struct AssetNode {
    pub name: String,
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
    pub mesh: Option<usize>,
    pub children: Vec<usize>,
}

impl Default for AssetNode {
    fn default() -> Self {
        Self {
            name: String::new(),
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
            mesh: None,
            children: Vec::new(),
        }
    }
}

/// Everything the viewer needs from a model file, detached from the `gltf`
/// document so it can cross threads.
#[derive(Debug, Clone, Default)]
pub struct LoadedAsset {
    pub name: String,
    pub nodes: Vec<AssetNode>,
    pub roots: Vec<usize>,
    pub meshes: Vec<Mesh>,
    pub animations: Vec<AnimationClip>,
}

impl LoadedAsset {
    /// Parses a binary `.glb` or a self contained `.gltf` document.
    pub fn from_slice(name: impl Into<String>, bytes: &[u8]) -> Result<Self, AssetError> {
        let name = name.into();
        let (document, buffers, _images) = gltf::import_slice(bytes)?;

        let mut meshes = Vec::new();
        let mut mesh_slots = Vec::new();

        for mesh in document.meshes() {
            let mesh_name = mesh
                .name()
                .map(String::from)
                .unwrap_or_else(|| format!("{} (Mesh {})", name, mesh.index()));

            match Mesh::from_gltf(mesh_name.clone(), mesh, &buffers) {
                Ok(mesh) => {
                    mesh_slots.push(Some(meshes.len()));
                    meshes.push(mesh);
                }
                Err(e) => {
                    log::warn!("Skipping mesh {}: {}", mesh_name, e);
                    mesh_slots.push(None);
                }
            }
        }

        let nodes: Vec<AssetNode> = document
            .nodes()
            .map(|node| {
                let (translation, rotation, scale) = node.transform().decomposed();

                AssetNode {
                    name: node
                        .name()
                        .map(String::from)
                        .unwrap_or_else(|| format!("Node {}", node.index())),
                    translation: Vec3::from(translation),
                    rotation: Quat::from_array(rotation),
                    scale: Vec3::from(scale),
                    mesh: node
                        .mesh()
                        .and_then(|mesh| mesh_slots.get(mesh.index()).copied().flatten()),
                    children: node.children().map(|child| child.index()).collect(),
                }
            })
            .collect();

        let roots: Vec<usize> = match document.default_scene().or_else(|| document.scenes().next()) {
            Some(scene) => scene.nodes().map(|node| node.index()).collect(),
            None => {
                // No scene: every node nobody claims as a child is a root
                let mut is_child = vec![false; nodes.len()];
                for &child in nodes.iter().flat_map(|node| &node.children) {
                    if let Some(flag) = is_child.get_mut(child) {
                        *flag = true;
                    }
                }
                (0..nodes.len()).filter(|&index| !is_child[index]).collect()
            }
        };

        validate_hierarchy(&nodes, &roots)?;

        let animations = document
            .animations()
            .filter_map(|animation| {
                let index = animation.index();
                AnimationClip::from_gltf(animation, &buffers)
                    .inspect_err(|e| log::warn!("Skipping animation {}: {}", index, e))
                    .ok()
            })
            .collect();

        Ok(Self {
            name,
            nodes,
            roots,
            meshes,
            animations,
        })
    }
}

/// Scene objects are spawned recursively, so the nodes must form a forest:
/// one parent at most, no cycles, and roots that nobody claims as a child.
fn validate_hierarchy(nodes: &[AssetNode], roots: &[usize]) -> Result<(), AssetError> {
    let mut parents: Vec<Option<usize>> = vec![None; nodes.len()];

    for (index, node) in nodes.iter().enumerate() {
        for &child in &node.children {
            let Some(parent) = parents.get_mut(child) else {
                return Err(AssetError::Hierarchy(format!(
                    "node {} has unknown child {}",
                    index, child
                )));
            };

            if let Some(existing) = parent.replace(index) {
                return Err(AssetError::Hierarchy(format!(
                    "node {} has two parents ({} and {})",
                    child, existing, index
                )));
            }
        }
    }

    for &root in roots {
        match parents.get(root) {
            None => {
                return Err(AssetError::Hierarchy(format!("unknown root node {}", root)));
            }
            Some(Some(parent)) => {
                return Err(AssetError::Hierarchy(format!(
                    "root node {} is a child of node {}",
                    root, parent
                )));
            }
            Some(None) => {}
        }
    }

    // With single parents, a chain longer than the node count must loop
    for start in 0..nodes.len() {
        let mut current = start;
        let mut steps = 0;

        while let Some(parent) = parents[current] {
            steps += 1;
            if parent == start || steps > nodes.len() {
                return Err(AssetError::Hierarchy(format!(
                    "node {} is its own ancestor",
                    start
                )));
            }
            current = parent;
        }
    }

    Ok(())
}


#[cfg(test)]
mod tests {
    use super::test_data::{glb_from_json, nodes_gltf, triangle_gltf};
    use super::*;
    use crate::animation::ChannelValues;

    #[test]
    fn parses_nodes_meshes_and_animations() {
        let asset = LoadedAsset::from_slice("triangle", &triangle_gltf()).unwrap();

        assert_eq!(asset.name, "triangle");
        assert_eq!(asset.roots, vec![0]);
        assert_eq!(asset.nodes.len(), 1);
        assert_eq!(asset.nodes[0].name, "tri");
        assert_eq!(asset.nodes[0].translation, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(asset.nodes[0].mesh, Some(0));

        let primitive = &asset.meshes[0].primitives[0];
        assert_eq!(primitive.indices, vec![0, 1, 2]);
        assert_eq!(primitive.vertices[1].position, Vec3::new(2.0, 0.0, 0.0));
        assert!(primitive.vertices[0].normal.abs_diff_eq(Vec3::Z, 1e-6));
        assert_eq!(primitive.vertices[0].color, [1.0, 1.0, 1.0, 1.0]);

        assert_eq!(asset.animations.len(), 1);
        let clip = &asset.animations[0];
        assert_eq!(clip.name, "bob");
        assert_eq!(clip.duration, 1.0);
        assert_eq!(clip.channels[0].node, 0);
        assert!(matches!(
            &clip.channels[0].values,
            ChannelValues::Translation(values) if values[1] == Vec3::new(1.0, 4.0, 3.0)
        ));
    }

    #[test]
    fn parses_binary_container() {
        let glb = glb_from_json(triangle_gltf());

        let asset = LoadedAsset::from_slice("triangle", &glb).unwrap();

        assert_eq!(asset.meshes.len(), 1);
        assert_eq!(asset.animations.len(), 1);
    }

    #[test]
    fn self_parented_node_is_rejected() {
        let gltf = nodes_gltf(serde_json::json!([{ "name": "loop", "children": [0] }]));

        let result = LoadedAsset::from_slice("loop", &gltf);

        assert!(matches!(result, Err(AssetError::Hierarchy(_))));
    }

    #[test]
    fn two_node_cycle_is_rejected() {
        let gltf = nodes_gltf(serde_json::json!([
            { "name": "a", "children": [1] },
            { "name": "b", "children": [0] }
        ]));

        let result = LoadedAsset::from_slice("cycle", &gltf);

        assert!(matches!(result, Err(AssetError::Hierarchy(message)) if message.contains("ancestor")));
    }

    #[test]
    fn shared_child_is_rejected() {
        let gltf = nodes_gltf(serde_json::json!([
            { "name": "a", "children": [2] },
            { "name": "b", "children": [2] },
            { "name": "c" }
        ]));

        let result = LoadedAsset::from_slice("shared", &gltf);

        assert!(matches!(result, Err(AssetError::Hierarchy(message)) if message.contains("two parents")));
    }

    #[test]
    fn nested_nodes_without_a_scene_are_accepted() {
        let gltf = nodes_gltf(serde_json::json!([
            { "name": "root", "children": [1] },
            { "name": "leaf" }
        ]));

        let asset = LoadedAsset::from_slice("tree", &gltf).unwrap();

        assert_eq!(asset.roots, vec![0]);
        assert_eq!(asset.nodes[0].children, vec![1]);
    }

    #[test]
    fn garbage_is_a_parse_error() {
        let result = LoadedAsset::from_slice("garbage", b"definitely not a model");

        assert!(matches!(result, Err(AssetError::Parse(_))));
    }
}
