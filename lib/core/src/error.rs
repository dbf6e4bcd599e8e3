//! Shared `Result` alias for nodeflow crates.
//!
//! Domain error enums live next to the code that raises them (graph,
//! activity, store, engine). They travel inside a rootcause [`Report`] so a
//! caller can wrap a lower-layer failure with its own context without
//! losing the original cause.

use rootcause::Report;

/// `Result` carrying a rootcause report whose current context is `C`.
pub type Result<T, C = ()> = std::result::Result<T, Report<C>>;
