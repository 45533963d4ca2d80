//! Parse and validation errors for the fundamental types.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypesError {
    #[error("invalid address for {via}: {value}")]
    InvalidAddress { via: String, value: String },

    #[error("invalid identifier: {0}")]
    InvalidId(String),

    #[error("unknown channel kind: {0}")]
    UnknownVia(String),
}
