pub mod http;
pub mod router;
pub mod runtime;
pub mod server;
