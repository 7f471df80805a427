use mixbridge_host::HostError;

/// Errors raised by entity objects.
#[derive(Debug, thiserror::Error)]
pub enum EntityError {
    #[error("a {kind} needs a non-empty id and name")]
    MissingIdOrName { kind: &'static str },

    #[error("a {kind} name cannot be blank")]
    BlankName { kind: &'static str },

    #[error(transparent)]
    Host(#[from] HostError),
}

pub type Result<T> = std::result::Result<T, EntityError>;
