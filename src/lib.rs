pub mod audit;
pub mod booking;
pub mod config;
pub mod meet;
pub mod shared;
pub mod webhooks;
