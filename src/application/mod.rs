pub mod config;
pub mod sessions;
pub mod startup;
pub mod state;
