pub mod checksum;
pub mod discovery;
pub mod error;
pub mod model;

pub use checksum::sha256_hex;
pub use discovery::{discover_migrations, MIGRATION_SUFFIX};
pub use error::{DiscoveryError, ScriptReadError};
pub use model::{MigrationScript, ScriptContent};
