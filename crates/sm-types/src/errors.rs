use thiserror::Error;

/// Main error type for the Smolder engine.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("data error: {0}")]
    Data(#[from] DataError),

    #[error("portfolio error: {0}")]
    Portfolio(#[from] PortfolioError),

    #[error("invalid timeframe string: {0}")]
    InvalidTimeframe(String),

    #[error("no last price recorded for {symbol}")]
    MissingPrice { symbol: String },

    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Whether this error must abort the run.
    ///
    /// The bus swallows subscriber errors so a bad callback cannot stall the
    /// replay, but accounting-invariant violations have to escape that policy.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EngineError::Portfolio(PortfolioError::NegativeBalance { .. })
        )
    }
}

/// Data loading and generation errors.
#[derive(Error, Debug)]
pub enum DataError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("decode error: {message}")]
    Decode { message: String },

    #[error("invalid data: {message}")]
    Invalid { message: String },
}

/// Portfolio accounting errors.
#[derive(Error, Debug)]
pub enum PortfolioError {
    /// Cash went below zero after a fill. Fatal invariant violation.
    #[error("balance cannot be negative (got {balance})")]
    NegativeBalance { balance: f64 },
}

/// Result alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
