//! Validation of user-supplied decision requests.

use crate::error::ValidationError;

const MAX_USER_ID_LEN: usize = 100;

/// A trimmed, validated decision request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserInput {
    pub user_id: String,
    pub input: String,
}

impl UserInput {
    /// Trim both fields and check them.
    ///
    /// The user id must be non-blank and at most 100 characters; the input
    /// must be non-blank.
    pub fn new(user_id: &str, input: &str) -> Result<Self, ValidationError> {
        let user_id = user_id.trim();
        let input = input.trim();

        if user_id.is_empty() {
            return Err(ValidationError::field("user_id", "user_id cannot be empty"));
        }
        if user_id.chars().count() > MAX_USER_ID_LEN {
            return Err(ValidationError::field(
                "user_id",
                format!("must be at most {MAX_USER_ID_LEN} characters"),
            ));
        }
        if input.is_empty() {
            return Err(ValidationError::field("input_data", "input_data cannot be empty"));
        }

        Ok(Self {
            user_id: user_id.to_string(),
            input: input.to_string(),
        })
    }
}
