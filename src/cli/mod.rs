//! CLI command implementations

pub mod error;
pub mod fetch;
pub mod status;
pub mod top;

pub use error::CliError;
pub use fetch::{Cli, Commands, FetchArgs, OutputFormat};
pub use status::{collect_status, PairStatus, StatusCommand};
pub use top::TopCommand;
