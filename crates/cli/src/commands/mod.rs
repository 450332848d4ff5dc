//! Command handlers for the Verity CLI.

pub mod index;
pub mod ingest;
pub mod reset;
pub mod stats;
pub mod verify;

pub use ingest::IngestCommand;
pub use reset::ResetCommand;
pub use stats::StatsCommand;
pub use verify::VerifyCommand;
