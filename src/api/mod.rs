pub mod handler;
pub mod identity;
pub mod models;

pub use handler::AppState;
