//! Error taxonomy for the catalog client, the local store and user input.

/// Failures talking to the remote catalog.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
  #[error("Invalid API key. Please check your key and try again.")]
  InvalidKey,

  #[error("Unauthorized. Please check your API key.")]
  Unauthorized,

  #[error("Set not found. Please check the set number.")]
  NotFound,

  #[error("Too many requests. Please wait a moment and try again.")]
  RateLimited,

  #[error("Server error ({status}). Please try again later.")]
  Server { status: u16 },

  #[error("Network error. Please check your connection. ({0})")]
  Network(String),

  #[error("{detail}")]
  Api { status: u16, detail: String },
}

/// Failures of the local key-value store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
  #[error("Storage quota exceeded: writing {key} needs {required} bytes, quota is {quota}")]
  QuotaExceeded {
    key: String,
    required: usize,
    quota: usize,
  },

  #[error("Failed to read {key}: {reason}")]
  Read { key: String, reason: String },

  #[error("Failed to write {key}: {reason}")]
  Write { key: String, reason: String },

  #[error("Failed to serialize {key}: {reason}")]
  Serialize { key: String, reason: String },
}

/// Rejected user input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
  #[error("Please enter a {0}")]
  EmptyInput(&'static str),

  #[error("Part {0} is not part of this audit")]
  UnknownPart(String),
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
  #[error(transparent)]
  Catalog(#[from] CatalogError),

  #[error(transparent)]
  Store(#[from] StoreError),

  #[error(transparent)]
  Validation(#[from] ValidationError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
