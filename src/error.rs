pub type Result<T> = std::result::Result<T, Error>;

/// An error with OBD-II communication
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// An error occurred in the underlying [Transport](crate::device::Transport)
    #[error("Device error: `{0:?}`")]
    Device(DeviceError),

    /// A response did not finish with the adapter's prompt before the deadline
    #[error("Timeout while {context} (partial response `{partial}`)")]
    Timeout {
        context: &'static str,
        partial: String,
    },

    /// No candidate endpoint answered the identification probe like an OBD-II adapter
    #[error("No OBD-II adapter found")]
    NoAdapterFound,

    /// A response arrived but did not have the expected positive-response shape
    #[error("Unexpected response: `{0}`")]
    UnexpectedResponse(String),

    /// Every command of several consecutive rounds failed to reach the adapter
    #[error("Link to the adapter was lost after {0} failed rounds")]
    LinkLost(u32),

    /// The configuration file could not be read or parsed
    #[error("Configuration error: `{0}`")]
    Config(String),

    #[error("IO error: `{0}`")]
    Io(#[from] std::io::Error),

    /// Another error occurred
    #[error("Other OBD2 error: `{0}`")]
    Other(String),
}

#[derive(Debug)]
pub struct DeviceError(pub crate::device::Error);

impl From<super::device::Error> for Error {
    fn from(e: super::device::Error) -> Self {
        Error::Device(DeviceError(e))
    }
}

impl From<std::num::ParseIntError> for Error {
    fn from(e: std::num::ParseIntError) -> Self {
        Error::Other(format!("invalid data received: {:?}", e))
    }
}
