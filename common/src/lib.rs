pub mod bounds;
pub mod prelude;
pub mod vertex;
