pub mod postgres;

pub use postgres::{PgHandle, PgSource};
pub use tidemark_contracts::DbError;
