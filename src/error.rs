//! Error types for the compilation pipeline
//!
//! This module defines domain-specific error types for every stage of the
//! pipeline, mirroring the category table in the specification's error
//! handling design. All errors use `thiserror` for automatic
//! `std::error::Error` implementation.
//!
//! ## Error Hierarchy
//!
//! - **Domain Errors**: `CompileError`, one variant per category (parse,
//!   transform, resolution, validation, config, bundling).
//! - **Orchestrator boundary**: `CompileError` is converted to
//!   `anyhow::Error` when it crosses into the CLI/orchestrator layer, the
//!   same way the teacher converts `MdxError` to `anyhow::Error` at its
//!   HTTP handler boundary.

use thiserror::Error;

/// A location in a source file, attached to most error variants so
/// diagnostics always carry file + line per the specification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    /// Path to the offending source file.
    pub file: std::path::PathBuf,
    /// 1-indexed line number.
    pub line: u32,
}

impl std::fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.file.display(), self.line)
    }
}

/// Domain-specific compilation error, one variant per category from the
/// specification's error handling design table.
#[derive(Error, Debug)]
pub enum CompileError {
    /// Malformed source at the AST layer; surfaced verbatim from the parser.
    #[error("parse error at {location}: {message}")]
    Parse {
        /// Where the error occurred.
        location: SourceLocation,
        /// Verbatim message from the underlying parser.
        message: String,
    },

    /// Invalid structure recognized during transformation (orphan `Else`,
    /// invalid XML name, non-literal `Loop` bound, and similar).
    #[error("transform error at {location} in <{element}>: {message}")]
    Transform {
        /// Where the error occurred.
        location: SourceLocation,
        /// The element name involved, so diagnostics can name the offender.
        element: String,
        /// Human-readable description of the violation.
        message: String,
    },

    /// Unknown identifier, unknown local component, a component-expansion
    /// cycle, or a duplicate declaration.
    #[error("resolution error at {location}: unknown or conflicting name '{name}': {message}")]
    Resolution {
        /// Where the error occurred.
        location: SourceLocation,
        /// The offending identifier or component name.
        name: String,
        /// Human-readable description.
        message: String,
    },

    /// An attribute value failed validation (e.g. an `XmlBlock` name, or a
    /// `Return` status outside the allowed set).
    #[error("validation error at {location}: {message}")]
    Validation {
        /// Where the error occurred.
        location: SourceLocation,
        /// Human-readable description.
        message: String,
    },

    /// Malformed config file or CLI argument combination.
    #[error("configuration error: {0}")]
    Config(String),

    /// Delegated from the external JavaScript bundler.
    #[error("bundling error in namespace(s) [{namespaces}]: {message}")]
    Bundling {
        /// Namespaces involved in the failed bundle step.
        namespaces: String,
        /// Output captured from the external bundler.
        message: String,
    },
}

impl CompileError {
    /// Builds a [`CompileError::Transform`] naming the offending element and,
    /// when one exists, the supported alternative — per the specification's
    /// "negative assertions ... suggest the supported alternative" rule.
    pub fn transform(
        location: SourceLocation,
        element: impl Into<String>,
        message: impl Into<String>,
        suggestion: Option<&str>,
    ) -> Self {
        let mut message = message.into();
        if let Some(suggestion) = suggestion {
            message.push_str(". Did you mean: ");
            message.push_str(suggestion);
        }
        CompileError::Transform {
            location,
            element: element.into(),
            message,
        }
    }
}

/// Error constructor carried on the [`crate::context::TransformContext`], so
/// every subtransformer attaches file + line without re-deriving the current
/// source path at each call site.
#[derive(Debug, Clone)]
pub struct ErrorFactory {
    file: std::path::PathBuf,
}

impl ErrorFactory {
    /// Creates a new factory scoped to one source file.
    pub fn new(file: std::path::PathBuf) -> Self {
        Self { file }
    }

    fn location(&self, line: u32) -> SourceLocation {
        SourceLocation {
            file: self.file.clone(),
            line,
        }
    }

    /// Builds a [`CompileError::Transform`] at the given line.
    pub fn transform(&self, line: u32, element: impl Into<String>, message: impl Into<String>) -> CompileError {
        CompileError::transform(self.location(line), element, message, None)
    }

    /// Builds a [`CompileError::Transform`] at the given line, with a
    /// suggested alternative.
    pub fn transform_with_suggestion(
        &self,
        line: u32,
        element: impl Into<String>,
        message: impl Into<String>,
        suggestion: &str,
    ) -> CompileError {
        CompileError::transform(self.location(line), element, message, Some(suggestion))
    }

    /// Builds a [`CompileError::Resolution`] at the given line.
    pub fn resolution(&self, line: u32, name: impl Into<String>, message: impl Into<String>) -> CompileError {
        CompileError::Resolution {
            location: self.location(line),
            name: name.into(),
            message: message.into(),
        }
    }

    /// Builds a [`CompileError::Validation`] at the given line.
    pub fn validation(&self, line: u32, message: impl Into<String>) -> CompileError {
        CompileError::Validation {
            location: self.location(line),
            message: message.into(),
        }
    }

    /// Builds a [`CompileError::Parse`] at the given line.
    pub fn parse(&self, line: u32, message: impl Into<String>) -> CompileError {
        CompileError::Parse {
            location: self.location(line),
            message: message.into(),
        }
    }
}
