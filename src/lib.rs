pub mod api;
pub mod config;
pub mod errors;
pub mod guard;
pub mod logging;
pub mod security;
pub mod server;
pub mod tools;

pub use errors::{AppError, AppResult};
pub use guard::{GuardPolicy, PathGuard};
