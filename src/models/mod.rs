pub mod gallery;
pub mod row_model;
pub mod sort;

pub use gallery::*;
pub use row_model::*;
pub use sort::*;
