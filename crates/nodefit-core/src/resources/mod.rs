pub mod names;
pub mod quantities;
pub mod vector;

pub use names::{is_extended_resource_name, is_scalar_resource_name};
pub use vector::{ResourceList, ResourceVector};
