pub mod justified;
pub mod preload;
pub mod source;

pub use justified::{JustifiedLayout, RowBuilder};
pub use preload::PreloadAdvisor;
pub use source::{AlbumNodes, NodeSource};
