pub mod capture;
pub mod cli;
pub mod config;
pub mod database;
pub mod gateway;
pub mod logging;
pub mod media;
pub mod models;
pub mod session;
pub mod store;
pub mod sync;
pub mod utils;

#[cfg(test)]
pub mod testing;

pub use config::Config;
pub use database::SqliteBackend;
pub use gateway::RemoteStoreGateway;
pub use media::FilesystemBackend;
pub use models::{Identity, Note, NoteFields, NoteId, NotePatch};
pub use session::SessionGate;
pub use store::LocalNoteStore;
pub use sync::{SyncEngine, SyncError};
pub use utils::Profile;
