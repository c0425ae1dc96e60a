use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::Deserialize;
use time::{OffsetDateTime, Time};

use crate::data_source::{FetchError, HistoryRequest, MarketDataSource};
use crate::http_client::{HttpAuth, HttpClient, HttpError, HttpRequest, HttpResponse, ReqwestHttpClient};
use crate::retry::RetryConfig;
use crate::{DateWindow, PriceRecord, Symbol, SymbolFrame};

const DEFAULT_BASE_URL: &str = "https://query2.finance.yahoo.com";

/// Daily history from Yahoo Finance's chart endpoint.
///
/// Requests `interval=1d` bars with adjusted closes for the window's unix
/// bounds. Bar dates are exchange-local, derived from the response's
/// `gmtoffset`.
#[derive(Clone)]
pub struct YahooSource {
    http_client: Arc<dyn HttpClient>,
    auth: HttpAuth,
    retry: RetryConfig,
    base_url: String,
}

impl Default for YahooSource {
    fn default() -> Self {
        Self::with_http_client(Arc::new(ReqwestHttpClient::default()), HttpAuth::None)
    }
}

impl YahooSource {
    pub fn with_http_client(http_client: Arc<dyn HttpClient>, auth: HttpAuth) -> Self {
        Self {
            http_client,
            auth,
            retry: RetryConfig::default(),
            base_url: String::from(DEFAULT_BASE_URL),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_owned();
        self
    }

    fn chart_url(&self, symbol: &Symbol, window: DateWindow) -> String {
        format!(
            "{}/v8/finance/chart/{}?period1={}&period2={}&interval=1d&includeAdjustedClose=true&events=div%2Csplit",
            self.base_url,
            urlencoding::encode(symbol.as_str()),
            window.start().with_time(Time::MIDNIGHT).assume_utc().unix_timestamp(),
            window.end().with_time(Time::MIDNIGHT).assume_utc().unix_timestamp(),
        )
    }

    /// Execute with retries on throttling, server errors and flaky transport.
    async fn execute_with_retry(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        let mut attempt = 0;
        loop {
            let outcome = self.http_client.execute(request.clone()).await;
            let Some(wait) = self.retry.next_wait(attempt, &outcome) else {
                return outcome;
            };

            tracing::debug!(
                url = %request.url,
                attempt = attempt + 1,
                wait_ms = wait.as_millis() as u64,
                "retrying yahoo request"
            );
            tokio::time::sleep(wait).await;
            attempt += 1;
        }
    }

    async fn fetch_chart(&self, req: HistoryRequest) -> Result<SymbolFrame, FetchError> {
        let request = HttpRequest::get(self.chart_url(&req.symbol, req.window))
            .with_header("referer", "https://finance.yahoo.com/")
            .with_header("accept", "application/json")
            .with_auth(&self.auth);

        let response = self.execute_with_retry(request).await.map_err(|error| {
            FetchError::unavailable(format!(
                "yahoo transport error for '{}': {}",
                req.symbol,
                error.message()
            ))
        })?;

        if !response.is_success() {
            return Err(status_error(&req.symbol, &response));
        }

        parse_chart(&req.symbol, req.window, &response.body)
    }
}

impl MarketDataSource for YahooSource {
    fn id(&self) -> &'static str {
        "yahoo"
    }

    fn fetch_history<'a>(
        &'a self,
        req: HistoryRequest,
    ) -> Pin<Box<dyn Future<Output = Result<SymbolFrame, FetchError>> + Send + 'a>> {
        Box::pin(self.fetch_chart(req))
    }
}

fn status_error(symbol: &Symbol, response: &HttpResponse) -> FetchError {
    let description = serde_json::from_str::<YahooChartResponse>(&response.body)
        .ok()
        .and_then(|chart| chart.chart.error)
        .map(|error| error.description)
        .unwrap_or_default();
    let message = format!(
        "yahoo returned status {} for '{symbol}' {description}",
        response.status
    );
    let message = message.trim_end().to_owned();

    match response.status {
        429 => FetchError::rate_limited(message),
        400 | 404 | 422 => FetchError::invalid_request(message),
        _ => FetchError::unavailable(message),
    }
}

/// Decode a chart response into a frame, keeping only dates inside `window`.
///
/// Days where every price is missing are dropped; partially missing days are
/// kept with nulls.
fn parse_chart(symbol: &Symbol, window: DateWindow, body: &str) -> Result<SymbolFrame, FetchError> {
    let chart: YahooChartResponse = serde_json::from_str(body).map_err(|error| {
        FetchError::parse(format!("failed to parse yahoo chart for '{symbol}': {error}"))
    })?;

    if let Some(error) = chart.chart.error {
        return Err(FetchError::invalid_request(format!(
            "yahoo chart error for '{symbol}': {} ({})",
            error.description, error.code
        )));
    }

    let Some(result) = chart.chart.result.and_then(|results| results.into_iter().next()) else {
        return Err(FetchError::parse(format!(
            "yahoo chart for '{symbol}' has no result"
        )));
    };

    let timestamps = result.timestamp.unwrap_or_default();
    let quote = result.indicators.quote.into_iter().next().unwrap_or_default();
    let adjclose = result
        .indicators
        .adjclose
        .into_iter()
        .next()
        .map(|series| series.adjclose)
        .unwrap_or_default();
    let gmtoffset = result.meta.gmtoffset.unwrap_or_default();

    let mut records = Vec::with_capacity(timestamps.len());
    for (index, timestamp) in timestamps.into_iter().enumerate() {
        let local = OffsetDateTime::from_unix_timestamp(timestamp + gmtoffset).map_err(|error| {
            FetchError::parse(format!(
                "invalid timestamp {timestamp} in yahoo chart for '{symbol}': {error}"
            ))
        })?;
        let date = local.date();
        if !window.contains(date) {
            continue;
        }

        let at = |series: &[Option<f64>]| series.get(index).copied().flatten();
        let record = PriceRecord {
            date,
            open: at(&quote.open),
            high: at(&quote.high),
            low: at(&quote.low),
            close: at(&quote.close),
            adj_close: at(&adjclose),
            volume: quote.volume.get(index).copied().flatten(),
        };

        let all_missing = [record.open, record.high, record.low, record.close]
            .iter()
            .all(Option::is_none);
        if !all_missing {
            records.push(record);
        }
    }

    Ok(SymbolFrame::new(symbol.clone(), records))
}

#[derive(Debug, Deserialize)]
struct YahooChartResponse {
    chart: YahooChartData,
}

#[derive(Debug, Deserialize)]
struct YahooChartData {
    #[serde(default)]
    result: Option<Vec<YahooChartResult>>,
    #[serde(default)]
    error: Option<YahooChartError>,
}

#[derive(Debug, Deserialize)]
struct YahooChartError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct YahooChartResult {
    #[serde(default)]
    meta: YahooChartMeta,
    #[serde(default)]
    timestamp: Option<Vec<i64>>,
    #[serde(default)]
    indicators: YahooChartIndicators,
}

#[derive(Debug, Default, Deserialize)]
struct YahooChartMeta {
    #[serde(default)]
    gmtoffset: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct YahooChartIndicators {
    #[serde(default)]
    quote: Vec<YahooChartQuote>,
    #[serde(default)]
    adjclose: Vec<YahooAdjClose>,
}

#[derive(Debug, Default, Deserialize)]
struct YahooChartQuote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<i64>>,
}

#[derive(Debug, Default, Deserialize)]
struct YahooAdjClose {
    #[serde(default)]
    adjclose: Vec<Option<f64>>,
}
