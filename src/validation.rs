// Validation Layer
// Runtime checks for identifiers flowing in from the chat layer and query strings

use anyhow::{bail, Result};
use std::collections::HashMap;

/// Validation errors with detailed context
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Precondition failed: {condition} ({context})")]
    PreconditionFailed { condition: String, context: String },

    #[error("Invalid input: {field} - {reason}")]
    InvalidInput { field: String, reason: String },
}

/// Validation context for better error messages
#[derive(Clone)]
pub struct ValidationContext {
    operation: String,
    attributes: HashMap<String, String>,
}

impl ValidationContext {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            attributes: HashMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn validate(self, condition: bool, message: &str) -> Result<()> {
        if !condition {
            let context = format!(
                "Operation: {}, Attributes: {:?}",
                self.operation, self.attributes
            );
            bail!(ValidationError::PreconditionFailed {
                condition: message.to_string(),
                context,
            });
        }
        Ok(())
    }
}

/// Identifier validation (room ids, event ids, server names)
pub mod identifier {
    use super::*;

    /// Maximum identifier length in bytes
    pub const MAX_IDENTIFIER_LENGTH: usize = 255;

    /// Validate an opaque identifier
    pub fn validate_identifier(field: &str, value: &str) -> Result<()> {
        let ctx = ValidationContext::new("validate_identifier").with_attribute("field", field);

        ctx.clone()
            .validate(!value.trim().is_empty(), "Identifier cannot be empty")?;

        ctx.clone().validate(
            value.len() <= MAX_IDENTIFIER_LENGTH,
            &format!("Identifier exceeds maximum length of {MAX_IDENTIFIER_LENGTH}"),
        )?;

        if value.contains('\0') {
            bail!(ValidationError::InvalidInput {
                field: field.to_string(),
                reason: "Identifier contains null bytes".to_string(),
            });
        }

        Ok(())
    }

    /// Validate a server name (the domain part of a user id)
    pub fn validate_server_name(value: &str) -> Result<()> {
        validate_identifier("server_name", value)?;

        if value.chars().any(char::is_whitespace) {
            bail!(ValidationError::InvalidInput {
                field: "server_name".to_string(),
                reason: "Server name contains whitespace".to_string(),
            });
        }

        Ok(())
    }
}
