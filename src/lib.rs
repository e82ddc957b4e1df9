pub mod application;
pub mod domain;
pub mod interfaces;
pub mod peer;
pub mod protocol;
pub mod rpc;
pub mod security;
