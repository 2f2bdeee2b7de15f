//! relsync common library
//!
//! Shared types and ambient plumbing used by every relsync workspace member.
//!
//! - **Logging**: tracing subscriber setup driven by [`logging::LogConfig`]
//! - **Types**: the project scope a sync runs under and the persisted
//!   [`types::Watermark`] record
//!
//! # Example
//!
//! ```no_run
//! use relsync_common::logging::{init_logging, LogConfig};
//! use relsync_common::types::ProjectScope;
//!
//! fn main() -> anyhow::Result<()> {
//!     let _guard = init_logging(&LogConfig::from_env()?)?;
//!     let scope = ProjectScope::new("contoso", "3f2a6c1e-0000-0000-0000-000000000000");
//!     tracing::info!(org = %scope.organization_name, "scope ready");
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod logging;
pub mod types;

pub use types::{ProjectScope, Watermark};
