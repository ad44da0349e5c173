// ABOUTME: MySQL utilities module
// ABOUTME: Exports connection management and dynamic row value handling

pub mod connection;
pub mod value;

pub use connection::connect;
pub use value::{bind_value, decode_row, SqlValue, ValueKind};
