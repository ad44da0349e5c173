// ABOUTME: Command implementations for each CLI subcommand
// ABOUTME: Exports migrate, validate, schema, and verify commands

pub mod migrate;
pub mod schema;
pub mod validate;
pub mod verify;

pub use migrate::migrate;
pub use schema::schema;
pub use validate::validate;
pub use verify::verify;
