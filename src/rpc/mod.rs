pub mod catalog;
pub mod dispatcher;
pub mod jsonrpc;
