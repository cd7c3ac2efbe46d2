//! Root filesystem assembly
//!
//! A run allocates a [`RootWorkspace`], unpacks every image layer into it with the
//! [`LayerMaterializer`], then makes sure the requested binary exists inside it
//! with [`stage_binary`].

pub mod binary;
pub mod layer;
pub mod path;
pub mod workspace;

pub use binary::{StageOutcome, stage_binary};
pub use layer::{LayerMaterializer, LayerStats, unpack_layer};
pub use workspace::RootWorkspace;
