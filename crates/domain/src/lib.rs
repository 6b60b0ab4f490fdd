pub mod aggregation;
pub mod entities;
pub mod invariants;
pub mod repositories;
pub mod value_objects;

pub use aggregation::*;
pub use entities::*;
pub use invariants::*;
pub use repositories::*;
pub use tasktree_errors::{TreeError, TreeResult};
pub use value_objects::*;
