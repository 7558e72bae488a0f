pub mod error;
pub mod models;
pub mod retry;
pub mod state;
