//! Shared `Result` alias.
//!
//! Error enums live next to the code that raises them: `GraphError` in the
//! workflow crate, `GatewayError` in the gateway crate, `EditorError` and
//! `DebugError` in the editor crate. A layer that calls into a lower one
//! wraps the lower report with `.context()` so the cause stays attached.

use rootcause::Report;

/// Result whose error is a [`Report`] carrying context `C`.
pub type Result<T, C = ()> = std::result::Result<T, Report<C>>;
