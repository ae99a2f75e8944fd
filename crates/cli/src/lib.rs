pub mod args;
pub mod config;
pub mod error;
pub mod error_view;
pub mod migrate;
pub mod output;
pub mod status;
pub mod style;
pub mod telemetry;
pub mod ui;

pub use args::{Cli, Command, MigrateArgs, StatusArgs};
pub use error::{CliError, ExitCode};
