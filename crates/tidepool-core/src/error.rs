//! Error types for the Tidepool protocol.
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HashError {
    #[error("invalid hex: {0}")] InvalidHex(String),
    #[error("hex too long: {0} > 64 chars")] TooLong(usize),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransactionError {
    #[error("serialization: {0}")] Serialization(String),
    #[error("creation output index out of bounds: {index} >= {len}")] CreationIndexOutOfBounds { index: usize, len: usize },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CertificateError {
    #[error("serialization: {0}")] Serialization(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MempoolError {
    #[error("entry already in pool: {0}")] AlreadyExists(String),
    #[error(transparent)] Transaction(#[from] TransactionError),
    #[error(transparent)] Certificate(#[from] CertificateError),
    #[error("internal: {0}")] Internal(String),
}

#[derive(Error, Debug)]
pub enum TidepoolError {
    #[error(transparent)] Hash(#[from] HashError),
    #[error(transparent)] Transaction(#[from] TransactionError),
    #[error(transparent)] Certificate(#[from] CertificateError),
    #[error(transparent)] Mempool(#[from] MempoolError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_variants_display() {
        let errors: Vec<TidepoolError> = vec![
            HashError::InvalidHex("zz".into()).into(),
            TransactionError::Serialization("oops".into()).into(),
            CertificateError::Serialization("oops".into()).into(),
            MempoolError::AlreadyExists("abc".into()).into(),
        ];
        for e in &errors {
            assert!(!format!("{e}").is_empty());
        }
    }

    #[test]
    fn already_exists_display() {
        let e = MempoolError::AlreadyExists("abc".into());
        assert_eq!(e.to_string(), "entry already in pool: abc");
    }
}
