use glam::{Mat4, Quat, Vec3};
use id_arena::{Arena, Id};

use crate::asset::LoadedAsset;
use crate::math::bounds::AABB;
use crate::model::Mesh;
use crate::scene_graph::object3d::{Object3D, ObjectId};
use crate::scene_graph::transform::Transform;

pub type MeshId = Id<Mesh>;

/// Objects created for one loaded asset. `nodes[i]` is the object spawned for
/// the asset's node `i`.
#[derive(Debug, Clone)]
pub struct SpawnedAsset {
    pub root: ObjectId,
    pub nodes: Vec<ObjectId>,
}

pub struct Scene {
    pub background: Vec3,
    pub objects: Arena<Object3D>,
    pub meshes: Arena<Mesh>,
}

impl Scene {
    pub fn new(background: Vec3) -> Self {
        Self {
            background,
            objects: Arena::new(),
            meshes: Arena::new(),
        }
    }

    pub fn add_object(&mut self, object: Object3D) -> ObjectId {
        self.objects.alloc(object)
    }

    pub fn add_mesh(&mut self, mesh: Mesh) -> MeshId {
        self.meshes.alloc(mesh)
    }

    #[allow(dead_code)]
    pub fn get_object(&self, id: ObjectId) -> Option<&Object3D> {
        self.objects.get(id)
    }

    #[allow(dead_code)]
    pub fn get_object_by_name(&self, name: &str) -> Option<ObjectId> {
        self.objects
            .iter()
            .find(|(_, object)| object.name == name)
            .map(|(id, _)| id)
    }

    /// Adds the asset's node hierarchy below a new group object and returns the
    /// objects created for it.
    pub fn spawn_asset(&mut self, asset: &LoadedAsset) -> SpawnedAsset {
        let root = self.add_object(Object3D::named(asset.name.clone()));

        let mesh_ids: Vec<MeshId> = asset
            .meshes
            .iter()
            .map(|mesh| self.add_mesh(mesh.clone()))
            .collect();

        let nodes: Vec<ObjectId> = asset
            .nodes
            .iter()
            .map(|node| {
                let mut object = Object3D::named(node.name.clone());
                object.transform = Transform::from_trs(node.translation, node.rotation, node.scale);
                object.mesh_id = node.mesh.and_then(|index| mesh_ids.get(index).copied());
                self.add_object(object)
            })
            .collect();

        for (node, &object_id) in asset.nodes.iter().zip(&nodes) {
            for &child in &node.children {
                if let Some(&child_id) = nodes.get(child) {
                    self.set_object_parent(child_id, Some(object_id));
                }
            }
        }

        for &root_node in &asset.roots {
            if let Some(&object_id) = nodes.get(root_node) {
                self.set_object_parent(object_id, Some(root));
            }
        }

        SpawnedAsset { root, nodes }
    }

    /// Updates all object transforms in hierarchical order
    pub fn update_transforms(&self) {
        let root_objects = self
            .objects
            .iter()
            .filter(|(_, object)| object.parent_id.is_none())
            .map(|(id, _)| id);

        for root_id in root_objects {
            self.update_object_transform_recursive(root_id, Mat4::IDENTITY, false);
        }
    }

    fn update_object_transform_recursive(
        &self,
        object_id: ObjectId,
        parent_world_matrix: Mat4,
        parent_changed: bool,
    ) {
        if let Some(object) = self.objects.get(object_id) {
            let local_matrix = *object.transform.get_local_matrix();
            let changed = parent_changed || object.transform.is_world_dirty();

            if changed {
                object
                    .transform
                    .set_world_matrix(parent_world_matrix * local_matrix);
            }

            let world_matrix = *object.transform.get_world_matrix();
            for &child_id in &object.child_ids {
                self.update_object_transform_recursive(child_id, world_matrix, changed);
            }
        }
    }

    /// Invalidates world transforms for an object and all its descendants
    pub fn invalidate_object_hierarchy(&self, object_id: ObjectId) {
        if let Some(object) = self.objects.get(object_id) {
            object.transform.invalidate_world();

            for &child_id in &object.child_ids {
                self.invalidate_object_hierarchy(child_id);
            }
        }
    }

    /// Sets the parent of an object and updates child relationships
    pub fn set_object_parent(&mut self, child_id: ObjectId, new_parent_id: Option<ObjectId>) {
        if let Some(old_parent_id) = self.objects.get(child_id).and_then(|child| child.parent_id) {
            if let Some(old_parent) = self.objects.get_mut(old_parent_id) {
                old_parent.child_ids.retain(|&id| id != child_id);
            }
        }

        if let Some(child) = self.objects.get_mut(child_id) {
            child.parent_id = new_parent_id;
        }

        if let Some(new_parent) = new_parent_id.and_then(|id| self.objects.get_mut(id)) {
            new_parent.child_ids.push(child_id);
        }

        self.invalidate_object_hierarchy(child_id);
    }

    pub fn set_object_translation(&mut self, object_id: ObjectId, translation: Vec3) {
        if let Some(object) = self.objects.get_mut(object_id) {
            object.transform.set_translation(translation);
        }
    }

    pub fn set_object_rotation(&mut self, object_id: ObjectId, rotation: Quat) {
        if let Some(object) = self.objects.get_mut(object_id) {
            object.transform.set_rotation(rotation);
        }
    }

    pub fn set_object_scale(&mut self, object_id: ObjectId, scale: Vec3) {
        if let Some(object) = self.objects.get_mut(object_id) {
            object.transform.set_scale(scale);
        }
    }

    pub fn rotate_object(&mut self, object_id: ObjectId, rotation: Quat) {
        if let Some(object) = self.objects.get_mut(object_id) {
            object.transform.rotate(rotation);
        }
    }

    /// World space bounds of everything with a mesh at or below `object_id`.
    /// Requires up to date world transforms.
    pub fn world_bounds(&self, object_id: ObjectId) -> AABB {
        let Some(object) = self.objects.get(object_id) else {
            return AABB::EMPTY;
        };

        let own = object
            .mesh_id
            .and_then(|mesh_id| self.meshes.get(mesh_id))
            .map(|mesh| mesh.bounds().transformed(&object.transform.get_world_matrix()))
            .unwrap_or(AABB::EMPTY);

        object
            .child_ids
            .iter()
            .fold(own, |bounds, &child_id| bounds.union(&self.world_bounds(child_id)))
    }

    /// Objects that carry a mesh, with their world matrices.
    pub fn mesh_instances(&self) -> impl Iterator<Item = (MeshId, Mat4)> + '_ {
        self.objects.iter().filter_map(|(_, object)| {
            object
                .mesh_id
                .map(|mesh_id| (mesh_id, *object.transform.get_world_matrix()))
        })
    }
}
