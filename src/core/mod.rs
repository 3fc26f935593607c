//! # Core Buffer Components
//!
//! Low-level buffer handling and big-endian wire layout.
//!
//! This module provides the foundation the framing layer builds on: an owned
//! byte buffer with bounds-tracked sub-views ("portions"), so that nested
//! message formats can be composed in place without copies.
//!
//! ## Components
//! - **Mailbox**: owned byte storage with portion bookkeeping
//! - **Portion**: a non-owning, bounds-checked window into a mailbox
//!
//! ## Wire Format
//! All multi-byte scalars are big-endian; strings travel as UTF-16BE,
//! two bytes per character.
//!
//! ## Security
//! - Every access is validated against the window bounds
//! - A buffer with live portions can be neither released nor re-targeted

pub mod mailbox;

pub use mailbox::{Mailbox, Portion};
