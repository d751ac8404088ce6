pub mod db;
pub mod identity;
pub mod reachability;

pub use db::PgDocumentStore;
pub use identity::PgIdentity;
pub use reachability::spawn_probe;
