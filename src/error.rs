use thiserror::Error;

#[derive(Error, Debug)]
pub enum BillError {
    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid {field}: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    #[error("Unknown household: {0}")]
    UnknownHousehold(String),

    #[error("Unknown bill: {0}")]
    UnknownBill(i64),

    #[error("Unknown bill payment: {0}")]
    UnknownPayment(i64),

    #[error("Unknown transaction: {0}")]
    UnknownTransaction(i64),

    #[error("Unknown merchant: {0}")]
    UnknownMerchant(i64),

    #[error("Bill payment {0} is skipped; unmatch it before linking transactions")]
    PaymentSkipped(i64),

    #[error("Invalid date: {0}")]
    InvalidDate(String),

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("{0}")]
    Other(String),
}

impl BillError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        BillError::Validation {
            field,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, BillError>;
