use thiserror::Error;

/// Top-level error type for the entire application
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Input error: {0}")]
    Input(#[from] InputError),

    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Reconciliation failed: {0}")]
    Reconcile(#[from] ReconcileError),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl AppError {
    pub fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        AppError::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }
}

/// Transfer list parsing errors
#[derive(Error, Debug)]
pub enum InputError {
    #[error("Failed to read {path}: {message}")]
    Read { path: String, message: String },

    #[error("Line {line}: {reason}")]
    BadLine { line: u64, reason: String },

    #[error("Amount '{amount}' for {address} is not a whole number of mutez")]
    BadAmount { address: String, amount: String },
}

/// Chain client errors
#[derive(Error, Debug)]
pub enum ChainError {
    #[error("RPC request to {endpoint} failed: {message}")]
    Rpc { endpoint: String, message: String },

    #[error("RPC {endpoint} returned status {status}: {body}")]
    RpcStatus {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("Unexpected RPC response from {endpoint}: {message}")]
    Decode { endpoint: String, message: String },

    #[error("Contract {address} has no '{entrypoint}' entrypoint")]
    MissingEntrypoint { address: String, entrypoint: String },

    #[error("No signer configured for submission")]
    MissingSigner,

    #[error("Invalid secret key: {0}")]
    InvalidKey(String),

    #[error("Operation {operation_hash} not confirmed after {waited_secs}s")]
    ConfirmationTimeout {
        operation_hash: String,
        waited_secs: u64,
    },
}

/// Indexer / data provider errors
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("{provider}: request to {url} failed: {message}")]
    Http {
        provider: &'static str,
        url: String,
        message: String,
    },

    #[error("{provider}: {url} returned status {status}")]
    Status {
        provider: &'static str,
        url: String,
        status: u16,
    },

    #[error("{provider}: response from {url} does not match schema: {message}")]
    Schema {
        provider: &'static str,
        url: String,
        message: String,
    },
}

/// Cross-source consistency errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ReconcileError {
    #[error("Inconsistent results: provider A returned {provider_a} voters, provider B returned {provider_b}")]
    InconsistentResults { provider_a: usize, provider_b: usize },

    #[error("Bad match at index {index}: provider A has {provider_a}, provider B has {provider_b}")]
    Mismatch {
        index: usize,
        provider_a: String,
        provider_b: String,
    },
}

impl From<config::ConfigError> for AppError {
    fn from(error: config::ConfigError) -> Self {
        AppError::Config(error.to_string())
    }
}

/// Result type alias for the application
pub type AppResult<T> = Result<T, AppError>;
