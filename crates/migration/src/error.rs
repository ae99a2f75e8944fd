#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DiscoveryError {
    #[error("migrations directory not found: {dir}")]
    NotFound { dir: String },
    #[error("migrations directory is not readable: {dir}: {message}")]
    NotReadable { dir: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot read migration '{path}': {message}")]
pub struct ScriptReadError {
    pub path: String,
    pub message: String,
}
