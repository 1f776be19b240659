use std::fmt;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Entity {
    Application,
    Authorization,
    Token,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Entity::Application => "application",
            Entity::Authorization => "authorization",
            Entity::Token => "token",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0} not found")]
    NotFound(Entity),
    #[error("{entity} with {field} {value} already exists")]
    Conflict {
        entity: Entity,
        field: &'static str,
        value: String,
    },
    #[error("{0} was modified concurrently, reload it and retry")]
    ConcurrencyConflict(Entity),
    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },
    #[error("missing or empty argument {0}")]
    InvalidArgument(&'static str),
    #[error("database error: {0}")]
    Db(#[from] diesel::result::Error),
    #[error("connection pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("migration error: {0}")]
    Migration(#[from] diesel_migrations::RunMigrationsError),
    #[error("hashing error: {0}")]
    Hash(#[from] argon2::Error),
}

impl Error {
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
            reason: reason.into(),
        }
    }

    pub fn conflict(entity: Entity, field: &'static str, value: impl fmt::Display) -> Self {
        Self::Conflict {
            entity,
            field,
            value: value.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

/// Lift a missing row into a typed [`Error::NotFound`].
pub trait OptionExt<T> {
    fn or_not_found(self, entity: Entity) -> Result<T, Error>;
}

impl<T> OptionExt<T> for Option<T> {
    fn or_not_found(self, entity: Entity) -> Result<T, Error> {
        self.ok_or(Error::NotFound(entity))
    }
}
