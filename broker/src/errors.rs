//! Typed errors and their mapping onto the wire error-code taxonomy.

use derive_more::{Display, Error, From};

use crate::jsonrpc::ErrorDescription;

pub type BrokerResult<T> = Result<T, BrokerError>;

/// Wire error codes from the JSON-RPC error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i64)]
pub enum ErrorCode {
    InternalProblem = 1,
    CommandFormatWrong = 2,
    ParamsFormatWrong = 3,
    AuthFailed = 4,
    AccessDenied = 5,
    UnexpectedValue = 6,
    RemoteMethodNotExists = 7,
    AllServerBusy = 8,
}

#[derive(Debug, Display, Error, From)]
pub enum BrokerError {
    #[display(fmt = "malformed connection id: {}", _0)]
    #[error(ignore)]
    #[from(ignore)]
    CidParse(String),

    #[display(fmt = "malformed command: {}", _0)]
    #[error(ignore)]
    #[from(ignore)]
    CommandFormat(String),

    #[display(fmt = "malformed params: {}", _0)]
    #[error(ignore)]
    #[from(ignore)]
    ParamsFormat(String),

    #[display(fmt = "authentication failed: {}", _0)]
    #[error(ignore)]
    #[from(ignore)]
    AuthFailed(String),

    #[display(fmt = "access denied: {}", _0)]
    #[error(ignore)]
    #[from(ignore)]
    AccessDenied(String),

    #[display(fmt = "unexpected value: {}", _0)]
    #[error(ignore)]
    #[from(ignore)]
    UnexpectedValue(String),

    #[display(fmt = "no server exports method: {}", _0)]
    #[error(ignore)]
    #[from(ignore)]
    RemoteMethodNotExists(String),

    #[display(fmt = "all servers for method {} are busy", _0)]
    #[error(ignore)]
    #[from(ignore)]
    AllServerBusy(String),

    #[display(fmt = "internal problem: {}", _0)]
    #[error(ignore)]
    #[from(ignore)]
    Internal(String),

    Io(std::io::Error),

    SerdeJson(serde_json::Error),

    #[display(fmt = "config error: {}", _0)]
    #[error(ignore)]
    #[from(ignore)]
    Config(String),

    #[display(fmt = "key load error: {}", _0)]
    #[error(ignore)]
    #[from(ignore)]
    KeyLoad(String),
}

impl BrokerError {
    pub fn code(&self) -> ErrorCode {
        match self {
            BrokerError::CommandFormat(_) | BrokerError::SerdeJson(_) => {
                ErrorCode::CommandFormatWrong
            }
            BrokerError::ParamsFormat(_) => ErrorCode::ParamsFormatWrong,
            BrokerError::AuthFailed(_) | BrokerError::KeyLoad(_) => ErrorCode::AuthFailed,
            BrokerError::AccessDenied(_) => ErrorCode::AccessDenied,
            BrokerError::UnexpectedValue(_) => ErrorCode::UnexpectedValue,
            BrokerError::RemoteMethodNotExists(_) => ErrorCode::RemoteMethodNotExists,
            BrokerError::AllServerBusy(_) => ErrorCode::AllServerBusy,
            BrokerError::CidParse(_)
            | BrokerError::Internal(_)
            | BrokerError::Io(_)
            | BrokerError::Config(_) => ErrorCode::InternalProblem,
        }
    }

    /// Render this error as the `error` object of a JSON-RPC Answer.
    pub fn to_error_description(&self) -> ErrorDescription {
        ErrorDescription {
            code: self.code() as i64,
            message: self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_match_taxonomy() {
        assert_eq!(BrokerError::Internal("x".into()).code() as i64, 1);
        assert_eq!(BrokerError::CommandFormat("x".into()).code() as i64, 2);
        assert_eq!(BrokerError::ParamsFormat("x".into()).code() as i64, 3);
        assert_eq!(BrokerError::AuthFailed("x".into()).code() as i64, 4);
        assert_eq!(BrokerError::AccessDenied("x".into()).code() as i64, 5);
        assert_eq!(BrokerError::UnexpectedValue("x".into()).code() as i64, 6);
        assert_eq!(
            BrokerError::RemoteMethodNotExists("x".into()).code() as i64,
            7
        );
        assert_eq!(BrokerError::AllServerBusy("x".into()).code() as i64, 8);
    }
}
