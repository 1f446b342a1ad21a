pub mod object3d;
pub mod scene;
pub mod transform;

pub use object3d::{Object3D, ObjectId};
pub use scene::{MeshId, Scene};
