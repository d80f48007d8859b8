//! Error types for the reactivation bot.

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Messaging gateway errors.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("HTTP error talking to {name}: {reason}")]
    Http { name: String, reason: String },

    #[error("{name} rejected the message with status {status}: {body}")]
    Rejected {
        name: String,
        status: u16,
        body: String,
    },

    #[error("Invalid phone number: {0}")]
    InvalidPhone(String),

    #[error("Gateway {name} is not configured: {reason}")]
    NotConfigured { name: String, reason: String },
}

/// Master-data sync errors.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Request to {endpoint} failed: {reason}")]
    Request { endpoint: String, reason: String },

    #[error("{endpoint} answered with status {status}")]
    Status { endpoint: String, status: u16 },

    #[error("Could not decode {endpoint}: {reason}")]
    Decode { endpoint: String, reason: String },

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Job registry and scheduler errors.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Unknown job: {0}")]
    Unknown(String),

    #[error("Job {0} is already running")]
    AlreadyRunning(String),

    #[error("Invalid schedule for job {job}: {reason}")]
    InvalidSchedule { job: String, reason: String },
}
