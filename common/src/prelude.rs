pub use crate::bounds::BoundingBox;
pub use crate::vertex::{MeshVertex, Vertex};
