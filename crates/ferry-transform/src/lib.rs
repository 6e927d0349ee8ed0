//! Transformation pipeline for Ferry: the per-unit [`TransformWork`]
//! context, tree snapshots, and the built-in transformations.

pub mod map_author;
pub mod move_files;
pub mod replace;
pub mod sequence;
pub mod transformation;
pub mod treestate;
pub mod work;

pub use map_author::MapAuthor;
pub use move_files::Move;
pub use replace::Replace;
pub use sequence::Sequence;
pub use transformation::Transformation;
pub use treestate::TreeState;
pub use work::{Metadata, RunOutcome, Runnable, TransformWork};
