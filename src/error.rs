use thiserror::Error;

#[derive(Debug, Error)]
pub enum RemembotError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("database error: {0}")]
    Database(String),
    #[error("http error: {0}")]
    Http(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("runtime error: {0}")]
    Runtime(String),
}

impl From<diesel::result::Error> for RemembotError {
    fn from(err: diesel::result::Error) -> Self {
        RemembotError::Database(err.to_string())
    }
}

pub use crate::Result;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_the_variant_prefix() {
        let err = RemembotError::Config("missing token".to_string());
        assert!(format!("{err}").contains("configuration error"));

        let err: RemembotError = diesel::result::Error::NotFound.into();
        assert!(format!("{err}").contains("database error"));
    }
}
