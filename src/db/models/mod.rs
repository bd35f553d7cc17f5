//! Database models and the queries that belong to them.

pub mod conversation;
pub mod user;

pub use conversation::*;
pub use user::*;
