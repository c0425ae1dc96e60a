//! Behavior-driven tests for market data sources
//!
//! These tests verify HOW the Yahoo adapter reacts to provider responses
//! (throttling, errors, flaky transport) and that the synthetic source is
//! deterministic.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use stockpipe_core::{
    extract_and_validate, DateWindow, ExtractOptions, FetchErrorKind, HistoryRequest, HttpAuth,
    HttpClient, HttpError, HttpErrorKind, HttpRequest, HttpResponse, MarketDataSource,
    RetryConfig, Symbol, SyntheticSource, YahooSource,
};
use time::macros::{date, datetime};
use time::Weekday;

/// Two trading days (2026-03-02 and 2026-03-03) for a New York listed symbol.
const TWO_DAY_CHART: &str = r#"{"chart":{"result":[{
    "meta":{"gmtoffset":-18000},
    "timestamp":[1772461800,1772548200],
    "indicators":{
        "quote":[{"open":[100.0,101.0],"high":[102.0,103.0],"low":[99.0,100.5],
                  "close":[101.5,102.5],"volume":[1000000,1200000]}],
        "adjclose":[{"adjclose":[101.4,102.4]}]
    }}],"error":null}}"#;

const NOT_FOUND_CHART: &str = r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#;

type Scripted = Result<HttpResponse, HttpError>;

/// Transport that replays scripted responses in order and records requests.
struct ScriptedHttpClient {
    responses: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedHttpClient {
    fn new(responses: Vec<Scripted>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().expect("requests lock").clone()
    }
}

impl HttpClient for ScriptedHttpClient {
    fn execute<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
        self.requests.lock().expect("requests lock").push(request);
        let next = self
            .responses
            .lock()
            .expect("responses lock")
            .pop_front()
            .unwrap_or_else(|| Err(HttpError::new(HttpErrorKind::Other, "script exhausted")));
        Box::pin(async move { next })
    }
}

/// Transport that answers per symbol: listed symbols get the two-day chart.
struct ListedSymbolsClient {
    listed: Vec<&'static str>,
}

impl HttpClient for ListedSymbolsClient {
    fn execute<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
        let listed = self
            .listed
            .iter()
            .any(|symbol| request.url.contains(&format!("/chart/{symbol}?")));
        let response = if listed {
            HttpResponse::ok_json(TWO_DAY_CHART)
        } else {
            HttpResponse::with_status(404, NOT_FOUND_CHART)
        };
        Box::pin(async move { Ok(response) })
    }
}

fn yahoo(client: Arc<dyn HttpClient>) -> YahooSource {
    YahooSource::with_http_client(client, HttpAuth::Cookie(String::from("A3=session")))
        .with_retry(RetryConfig::fixed(Duration::from_millis(1), 2))
}

fn request(symbol: &str) -> HistoryRequest {
    HistoryRequest::new(
        Symbol::parse(symbol).expect("symbol"),
        DateWindow::new(date!(2026 - 03 - 02), date!(2026 - 03 - 09)).expect("window"),
    )
}

// =============================================================================
// Yahoo: Throttling and Retries
// =============================================================================

#[tokio::test]
async fn when_yahoo_throttles_once_the_adapter_retries_and_succeeds() {
    // Given: A 429 followed by a valid chart
    let client = ScriptedHttpClient::new(vec![
        Ok(HttpResponse::with_status(429, "")),
        Ok(HttpResponse::ok_json(TWO_DAY_CHART)),
    ]);
    let source = yahoo(client.clone());

    // When: History is requested
    let frame = source
        .fetch_history(request("AAPL"))
        .await
        .expect("retry should recover");

    // Then: The second attempt's data is returned
    assert_eq!(frame.len(), 2);
    assert_eq!(frame.records()[0].date, date!(2026 - 03 - 02));
    assert_eq!(frame.records()[1].close, Some(102.5));
    assert_eq!(frame.records()[1].adj_close, Some(102.4));

    // And: Both attempts carried the session cookie
    let requests = client.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests
        .iter()
        .all(|request| request.headers.get("cookie").map(String::as_str) == Some("A3=session")));
}

#[tokio::test]
async fn when_yahoo_keeps_failing_the_symbol_is_reported_unavailable() {
    // Given: Every attempt returns 503
    let client = ScriptedHttpClient::new(vec![
        Ok(HttpResponse::with_status(503, "")),
        Ok(HttpResponse::with_status(503, "")),
        Ok(HttpResponse::with_status(503, "")),
    ]);
    let source = yahoo(client.clone());

    // When: History is requested
    let error = source
        .fetch_history(request("AAPL"))
        .await
        .expect_err("should give up");

    // Then: The retry budget is spent and the failure is retryable
    assert_eq!(client.requests().len(), 3);
    assert_eq!(error.kind(), FetchErrorKind::Unavailable);
    assert!(error.retryable());
    assert!(error.message().contains("503"));
}

#[tokio::test]
async fn when_the_transport_times_out_the_request_is_retried() {
    let client = ScriptedHttpClient::new(vec![
        Err(HttpError::new(HttpErrorKind::Timeout, "timed out")),
        Ok(HttpResponse::ok_json(TWO_DAY_CHART)),
    ]);
    let source = yahoo(client.clone());

    let frame = source
        .fetch_history(request("MSFT"))
        .await
        .expect("timeout should be retried");

    assert_eq!(frame.len(), 2);
    assert_eq!(client.requests().len(), 2);
}

// =============================================================================
// Yahoo: Provider Errors
// =============================================================================

#[tokio::test]
async fn when_yahoo_does_not_know_the_symbol_the_error_is_not_retried() {
    // Given: A 404 with Yahoo's error payload
    let client = ScriptedHttpClient::new(vec![Ok(HttpResponse::with_status(
        404,
        NOT_FOUND_CHART,
    ))]);
    let source = yahoo(client.clone());

    // When: History is requested
    let error = source
        .fetch_history(request("ZZZZ"))
        .await
        .expect_err("unknown symbol");

    // Then: One attempt, classified as an invalid request naming the symbol
    assert_eq!(client.requests().len(), 1);
    assert_eq!(error.code(), "fetch.invalid_request");
    assert!(error.message().contains("ZZZZ"));
    assert!(error.message().contains("delisted"));
}

#[tokio::test]
async fn when_yahoo_returns_malformed_json_the_error_is_a_parse_failure() {
    let client = ScriptedHttpClient::new(vec![Ok(HttpResponse::ok_json("<html>"))]);
    let source = yahoo(client);

    let error = source
        .fetch_history(request("AAPL"))
        .await
        .expect_err("malformed body");

    assert_eq!(error.kind(), FetchErrorKind::Parse);
}

#[tokio::test]
async fn extraction_skips_symbols_yahoo_rejects() {
    // Given: Yahoo knows AAPL but not ZZZZ
    let source: Arc<dyn MarketDataSource> = Arc::new(
        YahooSource::with_http_client(
            Arc::new(ListedSymbolsClient {
                listed: vec!["AAPL"],
            }),
            HttpAuth::None,
        )
        .with_retry(RetryConfig::no_retry()),
    );
    let symbols = Symbol::parse_list("AAPL,ZZZZ").expect("symbols");

    // When: Extraction runs with two fetches in flight
    let extraction = extract_and_validate(
        source,
        &symbols,
        7,
        datetime!(2026-03-09 12:00 UTC),
        ExtractOptions {
            concurrency: 2,
            ..ExtractOptions::default()
        },
    )
    .await
    .expect("one symbol succeeds");

    // Then: AAPL is loaded and ZZZZ is reported
    assert_eq!(extraction.dataset.len(), 2);
    assert_eq!(extraction.failures.len(), 1);
    assert_eq!(extraction.failures[0].symbol, "ZZZZ");
    assert_eq!(extraction.failures[0].code, "fetch.invalid_request");
}

// =============================================================================
// Synthetic Source
// =============================================================================

#[tokio::test]
async fn synthetic_source_emits_one_bar_per_weekday() {
    let source = SyntheticSource::new();

    let frame = source
        .fetch_history(request("AAPL"))
        .await
        .expect("synthetic data");

    // 2026-03-02 (Mon) up to but excluding 2026-03-09 (Mon)
    assert_eq!(frame.len(), 5);
    assert!(frame
        .records()
        .iter()
        .all(|record| !matches!(record.date.weekday(), Weekday::Saturday | Weekday::Sunday)));
    for record in frame.records() {
        let (open, high, low, close) = (
            record.open.expect("open"),
            record.high.expect("high"),
            record.low.expect("low"),
            record.close.expect("close"),
        );
        assert!(high >= open.max(close));
        assert!(low <= open.min(close));
        assert!(low > 0.0);
    }
}

#[tokio::test]
async fn synthetic_source_is_deterministic_across_windows() {
    let source = SyntheticSource::new();

    let first = source.fetch_history(request("MSFT")).await.expect("first");
    let second = source.fetch_history(request("MSFT")).await.expect("second");
    assert_eq!(first, second);

    // A shorter window agrees on the days it shares.
    let narrow = HistoryRequest::new(
        Symbol::parse("MSFT").expect("symbol"),
        DateWindow::new(date!(2026 - 03 - 04), date!(2026 - 03 - 06)).expect("window"),
    );
    let narrow = source.fetch_history(narrow).await.expect("narrow");
    assert_eq!(narrow.records(), &first.records()[2..4]);

    // Different symbols get different series.
    let other = source.fetch_history(request("AAPL")).await.expect("other");
    assert_ne!(first.records()[0].close, other.records()[0].close);
}

#[tokio::test]
async fn synthetic_source_can_simulate_an_outage() {
    let symbol = Symbol::parse("MSFT").expect("symbol");
    let source = SyntheticSource::new().with_unavailable(symbol);

    let error = source
        .fetch_history(request("MSFT"))
        .await
        .expect_err("outage");
    assert_eq!(error.kind(), FetchErrorKind::Unavailable);
    assert!(source.fetch_history(request("AAPL")).await.is_ok());
}
