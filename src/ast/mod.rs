//! Abstract Syntax Tree (AST) Types for Bash++
//!
//! This module defines the complete AST structure for Bash++ sources.
//! The design follows the Bash++ grammar while being Rust-idiomatic.
//!
//! Architecture:
//!   Input → Lexer → Parser → AST → Emitter → compiled Bash

pub mod types;

pub use types::*;
