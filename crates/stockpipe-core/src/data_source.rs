//! Market data source contract and fetch errors.
//!
//! A source turns one [`HistoryRequest`] into one [`SymbolFrame`]. Sources keep
//! no state between calls beyond transport configuration.
//!
//! # Example
//!
//! ```rust,ignore
//! use stockpipe_core::{DateWindow, HistoryRequest, MarketDataSource, Symbol, YahooSource};
//!
//! async fn fetch(source: &YahooSource, window: DateWindow) -> Result<(), FetchError> {
//!     let request = HistoryRequest::new(Symbol::parse("AAPL")?, window);
//!     let frame = source.fetch_history(request).await?;
//!     println!("{} rows for {}", frame.len(), frame.symbol());
//!     Ok(())
//! }
//! ```

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

use crate::{DateWindow, Symbol, SymbolFrame};

/// Boxed future returned by [`MarketDataSource::fetch_history`].
pub type SourceFuture<'a> = Pin<Box<dyn Future<Output = Result<SymbolFrame, FetchError>> + Send + 'a>>;

/// Why a symbol could not be fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    /// Transport failure or provider-side error.
    Unavailable,
    RateLimited,
    /// The provider rejected the request (unknown symbol, bad window).
    InvalidRequest,
    /// The provider answered without any rows for the window.
    NoData,
    /// The response body could not be decoded.
    Parse,
    Internal,
}

impl FetchErrorKind {
    /// Stable dotted code used in logs and load summaries.
    pub const fn code(self) -> &'static str {
        match self {
            Self::Unavailable => "fetch.unavailable",
            Self::RateLimited => "fetch.rate_limited",
            Self::InvalidRequest => "fetch.invalid_request",
            Self::NoData => "fetch.no_data",
            Self::Parse => "fetch.parse",
            Self::Internal => "fetch.internal",
        }
    }

    /// Whether the same request could succeed later.
    pub const fn is_transient(self) -> bool {
        matches!(self, Self::Unavailable | Self::RateLimited)
    }
}

/// Per-symbol fetch failure. Extraction logs it and skips the symbol.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} ({})", .kind.code())]
pub struct FetchError {
    kind: FetchErrorKind,
    message: String,
}

impl FetchError {
    fn of(kind: FetchErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::of(FetchErrorKind::Unavailable, message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::of(FetchErrorKind::RateLimited, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::of(FetchErrorKind::InvalidRequest, message)
    }

    pub fn no_data(symbol: &Symbol, window: DateWindow) -> Self {
        Self::of(
            FetchErrorKind::NoData,
            format!("no price data for '{symbol}' in {window}"),
        )
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::of(FetchErrorKind::Parse, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::of(FetchErrorKind::Internal, message)
    }

    pub const fn kind(&self) -> FetchErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn retryable(&self) -> bool {
        self.kind.is_transient()
    }

    pub const fn code(&self) -> &'static str {
        self.kind.code()
    }
}

/// Request payload for a daily history fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRequest {
    pub symbol: Symbol,
    pub window: DateWindow,
}

impl HistoryRequest {
    pub fn new(symbol: Symbol, window: DateWindow) -> Self {
        Self { symbol, window }
    }
}

/// Source adapter contract.
///
/// Implementations must be `Send + Sync`; extraction shares one source across
/// concurrent per-symbol fetches.
pub trait MarketDataSource: Send + Sync {
    /// Short provider name used in logs.
    fn id(&self) -> &'static str;

    /// Fetch daily history for `req.symbol` within `req.window`.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] if the provider is unreachable, rejects the
    /// request, or answers with something that cannot be decoded. An empty
    /// frame is returned as-is; callers decide whether that is an error.
    fn fetch_history<'a>(&'a self, req: HistoryRequest) -> SourceFuture<'a>;
}
