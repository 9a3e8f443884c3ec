//! CLI command implementations for procrate-exporter.
//!
//! - `check`: System validation
//! - `config`: Configuration file generation
//! - `test`: Foreground sampling run
//! - `roles`: Role listing
//! - `generate`: Test data generation

pub mod check;
pub mod config;
pub mod generate;
pub mod roles;
pub mod test;

// Re-export command functions
pub use check::command_check;
pub use config::command_config;
pub use generate::command_generate_testdata;
pub use roles::command_roles;
pub use test::command_test;
