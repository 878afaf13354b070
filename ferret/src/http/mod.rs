/*!
# Ferret: HTTP Front-End & Dispatcher (C6)
*/

pub mod request;
pub mod response;
pub mod result_router;
pub mod router;
pub mod server;
pub mod sse;
pub mod static_files;

pub use server::serve_forever;
