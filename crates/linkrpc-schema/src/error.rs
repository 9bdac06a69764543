#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("cannot load schemas: {0}")]
    LoadFailed(String),

    #[error("schema for {method} does not compile: {message}")]
    CompileFailed { method: String, message: String },

    /// Arguments do not match the method's descriptor.
    #[error("{method}: {message}")]
    ValidationFailed { method: String, message: String },

    #[error("schema is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("no schema for {0}")]
    NoSchema(String),
}

pub type Result<T> = std::result::Result<T, SchemaError>;
