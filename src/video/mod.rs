//! Edition video assembly.
//!
//! - [`layout`]: clip geometry and caption fitting
//! - [`ffmpeg`]: command construction and execution
//! - [`assembler`]: the per-edition driver

pub mod assembler;
pub mod ffmpeg;
pub mod layout;

pub use assembler::Assembler;
