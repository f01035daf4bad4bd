//! Post-extraction URL filtering
//!
//! Resolved URLs pass through [`sanitize`] (self links, schemes, site
//! quirks, file-type rules and caps) and then [`is_trap`] before the
//! seen-check admits them.

mod sanitize;
mod trap_detection;

pub use sanitize::{sanitize, LinkKind};
pub use trap_detection::{has_path_loop, is_trap};
