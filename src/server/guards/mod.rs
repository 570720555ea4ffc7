pub mod auth;
pub mod license;
