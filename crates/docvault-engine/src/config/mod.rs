//! Job file configuration: types, YAML parsing, semantic validation.

pub mod parser;
pub mod types;
pub mod validator;
