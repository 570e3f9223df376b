// SQLite-backed workspace log
// One database file per workspace keeps search campaigns apart

pub mod error;
pub mod models;
pub mod registry;
pub mod store;

pub use error::{Result, StoreError};
pub use models::{DiscoveredItem, Workspace};
pub use registry::WorkspaceRegistry;
pub use store::WorkspaceStore;
