//! IPC subsystem — s-expression protocol over a Unix socket.

pub mod dispatch;
pub mod plist;
pub mod server;

pub use server::IpcServer;
