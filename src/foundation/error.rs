pub type AnnotrackResult<T> = Result<T, AnnotrackError>;

#[derive(thiserror::Error, Debug)]
pub enum AnnotrackError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("schema error: {0}")]
    Schema(String),

    #[error("serialization error: {0}")]
    Serde(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AnnotrackError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn schema(msg: impl Into<String>) -> Self {
        Self::Schema(msg.into())
    }

    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_are_stable() {
        assert!(
            AnnotrackError::validation("x")
                .to_string()
                .contains("validation error:")
        );
        assert!(
            AnnotrackError::schema("x")
                .to_string()
                .contains("schema error:")
        );
        assert!(
            AnnotrackError::serde("x")
                .to_string()
                .contains("serialization error:")
        );
    }

    #[test]
    fn other_preserves_source() {
        let base = std::io::Error::other("boom");
        let err = AnnotrackError::Other(anyhow::Error::new(base));
        assert!(err.to_string().contains("boom"));
    }
}
