//! Shared model types for dblooper.
//!
//! Kept free of database and engine dependencies so the session crate,
//! the engine, and the CLI can all exchange rows without circular imports.

pub mod options;
pub mod record;
pub mod result_set;
pub mod row;
pub mod schema;
pub mod value;

pub use options::LoopOptions;
pub use record::ErrorRecord;
pub use result_set::ResultSet;
pub use row::Row;
pub use schema::{ColumnSpec, DataType, Schema};
pub use value::Value;
