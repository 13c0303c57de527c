//! # dinja-compiler
//!
//! A compiler that translates JSX-like component source files into Markdown
//! documents for an LLM agent host, plus an optional companion runtime
//! script bundle for the components that need host-side execution.
//!
//! ## Architecture Overview
//!
//! The library is organized as a pipeline, leaves first:
//!
//! - **`ast_view`**: a read-only façade over one parsed source file
//! - **`extractor`**: scans declarations (variables, runtime functions,
//!   local components, source helpers) and detects dialect
//! - **`context`**: the mutable [`TransformContext`](context::TransformContext)
//!   threaded through transformation
//! - **`condition`**: condition-expression parsing and prose emission
//!   (runtime dialect)
//! - **`transformer`**: routes JSX elements to their IR transformer
//! - **`document`**: resolves a file's document kind and header
//! - **`ir`**: the closed node-variant set between transformer and emitters
//! - **`emit`**: renders an IR document to Markdown
//! - **`bundler`**: collects runtime contributions and synthesizes the
//!   companion script bundle
//! - **`orchestrator`**: ties the pipeline together across a whole build
//! - **`config`**: build configuration (CLI flags, JSON config file)
//! - **`error`**: domain-specific error types
//!
//! ### Compilation pipeline
//!
//! ```text
//! Source file
//!     |
//!     +-> Parse into an AST View (oxc)
//!     |
//!     +-> Extract declarations, detect dialect
//!     |
//!     +-> Transform JSX into IR (dispatcher + subtransformers)
//!     |
//!     +-> Emit Markdown from IR
//!             |
//!             +-> Write output file; collect runtime contributions
//! ```
//!
//! After all files are compiled, the orchestrator runs the bundler once to
//! synthesize the companion runtime script bundle for runtime-dialect
//! inputs.
//!
//! ## Thread safety
//!
//! The oxc `Allocator` used to parse one file is not `Send`, so per-file
//! compilation state is never shared across threads. When the orchestrator
//! parallelizes a build, each worker parses and transforms its own files
//! independently — see [`orchestrator::run_build_parallel`].

#![deny(missing_docs)]

pub mod ast_view;
pub mod bundler;
pub mod condition;
pub mod config;
pub mod context;
pub mod document;
pub mod emit;
pub mod error;
pub mod extractor;
pub mod ir;
pub mod orchestrator;
pub mod transformer;
