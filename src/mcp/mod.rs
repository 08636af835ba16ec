//! Model Context Protocol surface: the application operations exposed as
//! stdio tools.
pub mod server;
pub mod tools;

pub use server::McpServer;
