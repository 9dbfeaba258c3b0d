//! Request handlers.

pub mod cdn;
pub mod health;

pub use cdn::serve;
pub use health::{health, ready};
