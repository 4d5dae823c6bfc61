pub mod connection;

pub use connection::{ConnectionError, DbConnection, Initialize};
