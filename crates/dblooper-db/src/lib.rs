//! Database sessions for the dblooper execution loop.
//!
//! Provides the [`DbSession`] / [`SessionFactory`] traits plus
//! [`SqliteSessionFactory`] and [`PostgresSessionFactory`] implementations.

#![warn(clippy::pedantic)]

pub mod backend;
pub mod error;
mod pg_types;
pub mod postgres;
pub mod session;
pub mod sqlite;

pub use backend::{factory_for, Backend, ConnectOptions};
pub use error::DbError;
pub use crate::postgres::PostgresSessionFactory;
pub use session::{DbSession, ParamStyle, SessionFactory};
pub use sqlite::SqliteSessionFactory;
