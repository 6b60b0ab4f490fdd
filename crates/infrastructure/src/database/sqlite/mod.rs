pub mod sqlite_tree_store;

pub use sqlite_tree_store::{SqliteTreeStore, SqliteTreeTransaction};
