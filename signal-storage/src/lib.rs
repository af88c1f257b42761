// Signal Storage (Layer 1)
// Persists signals and logs, windows them by IST day and processes exits

pub mod error;
pub mod memory;
pub mod migrate;
pub mod postgres;
pub mod service;
pub mod store;

pub use error::{Result, StorageError};
pub use memory::InMemorySignalStore;
pub use migrate::{run_migrations, MigrationFile, MigrationOutcome, MigrationReport};
pub use postgres::PgSignalStore;
pub use service::SignalService;
pub use store::{ExitFilter, SignalStore, MAX_AVAILABLE_DATES};
