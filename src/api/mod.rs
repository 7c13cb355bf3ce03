pub mod routes;
mod server;
pub use server::{LOG_FILTER, app, serve};
pub mod public;
mod state;
pub use state::{AppState, Sessions, SharedChat};
