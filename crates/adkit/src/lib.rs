//! `adkit`: data loader assembly and result tiling for anomaly detection
//! experiments.
//!
//! The binary wraps the two library crates; this crate holds the pieces of
//! each subcommand that are worth testing without a terminal.

pub mod backend;
pub mod loaders;
pub mod tiling;

#[doc(inline)]
pub use adkit_data as data;
#[doc(inline)]
pub use adkit_vis as vis;
