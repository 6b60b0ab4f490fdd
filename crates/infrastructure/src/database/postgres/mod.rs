pub mod postgres_tree_store;

pub use postgres_tree_store::{PostgresTreeStore, PostgresTreeTransaction};
