pub mod auth;
pub mod origin;
