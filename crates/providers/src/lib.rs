//! Model client implementations for sandpiper.
//!
//! All providers implement the `sandpiper_core::Provider` trait.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatProvider;
