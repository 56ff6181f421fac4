pub mod db;
mod flags;
mod tables;

pub use db::{Database, DatabaseError};
pub use flags::SessionFlag;
pub use tables::*;
