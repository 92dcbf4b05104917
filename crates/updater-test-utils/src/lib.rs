//! Shared test utilities for the launcher updater workspace.
//!
//! Dev-dependency only, never published.
//!
//! # Modules
//!
//! - [`tree`]: [`TestTree`] builder and assertions for local trees
//! - [`archive`]: in-memory zip archives
//! - [`server`]: a minimal HTTP server with a settable response
//! - [`logging`]: tracing output for test runs

pub mod archive;
pub mod logging;
pub mod server;
pub mod tree;

pub use archive::ZipBuilder;
pub use server::TestServer;
pub use tree::TestTree;
