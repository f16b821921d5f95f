//! pdocs: API documentation generator for Python packages.
//!
//! pdocs finds documentable packages and modules under a set of roots,
//! renders them to HTML or Markdown, and either writes a static file tree
//! (with an optional client-side search index) or serves the documentation
//! live over HTTP, rebuilding every page from source on each request.
//!
//! # Architecture
//!
//! The pipeline consists of:
//!
//! 1. **Discovery** ([`discover`]): Depth-bounded scan of the input roots
//! 2. **Reflection** ([`pdocs_reflect`]): Turn a path into documentation objects
//! 3. **Render** ([`render`]): Produce HTML or Markdown for a module
//! 4. **Write** ([`write`]): Materialize a module tree on disk
//! 5. **Search** ([`search`]): Build the `index.js` search index
//! 6. **Serve** ([`serve`]): Live documentation server
//!
//! [`build`] wires these together for each output mode; [`config`] holds the
//! single configuration value every component receives.
//!
//! # Usage
//!
//! ```ignore
//! use pdocs::{build, config::Options};
//!
//! let options = Options {
//!     modules: vec!["./src".into()],
//!     html: true,
//!     ..Options::default()
//! }
//! .finalize()?;
//! build::run(options)?;
//! ```

#![warn(missing_docs)]

pub mod build;
pub mod config;
pub mod discover;
pub mod render;
pub mod search;
pub mod serve;
pub mod url;
pub mod write;

/// Re-export commonly used types.
pub use config::Options;
pub use discover::{DiscoveryError, DiscoveryResult, PackageGroup};
pub use write::{OutputWriter, WriteError};
