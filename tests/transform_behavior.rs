//! Behavior-driven tests for the transformation models and data tests
//!
//! These tests load a known raw table and check the values each model
//! derives from it.

use serde_json::Value;
use stockpipe_warehouse::{
    default_suite, DataTest, Identifier, LoadPolicy, Model, QueryGuardrails, RawPriceRow,
    TableRef, TransformError, Warehouse, WarehouseConfig,
};
use tempfile::{tempdir, TempDir};

fn open_warehouse() -> (TempDir, Warehouse) {
    let temp = tempdir().expect("tempdir");
    let project = Identifier::parse("models").expect("project");
    let warehouse =
        Warehouse::open(WarehouseConfig::for_project(temp.path().to_path_buf(), &project))
            .expect("warehouse open");
    (temp, warehouse)
}

fn raw_table() -> TableRef {
    TableRef::parse("market_data", "raw_stock_prices").expect("table")
}

fn row(date: &str, symbol: &str, open: f64, high: f64, low: f64, close: f64, volume: i64) -> RawPriceRow {
    RawPriceRow {
        date: date.to_owned(),
        symbol: symbol.to_owned(),
        open: Some(open),
        high: Some(high),
        low: Some(low),
        close: Some(close),
        adj_close: Some(close),
        volume: Some(volume),
        load_timestamp: String::from("2026-03-10 06:00:00.000000"),
        load_date: String::from("2026-03-10"),
    }
}

/// Monday 2026-03-02 through Monday 2026-03-09 for symbol X.
fn six_trading_days() -> Vec<RawPriceRow> {
    vec![
        row("2026-03-02", "X", 10.0, 10.5, 9.5, 10.0, 100),
        row("2026-03-03", "X", 10.0, 11.5, 9.8, 11.0, 200),
        row("2026-03-04", "X", 11.0, 11.2, 8.8, 9.0, 300),
        row("2026-03-05", "X", 9.0, 12.4, 9.0, 12.0, 400),
        row("2026-03-06", "X", 12.0, 13.5, 11.9, 13.0, 500),
        row("2026-03-09", "X", 13.0, 14.2, 12.8, 14.0, 600),
    ]
}

fn load_and_transform(warehouse: &Warehouse, rows: &[RawPriceRow]) {
    warehouse
        .load_raw_prices(&raw_table(), rows, LoadPolicy::Replace)
        .expect("load");
    warehouse.run_models(&raw_table()).expect("models");
}

fn query(warehouse: &Warehouse, sql: &str) -> Vec<Vec<Value>> {
    warehouse
        .execute_query(sql, QueryGuardrails::default(), false)
        .expect("query")
        .rows
}

fn assert_close(actual: &Value, expected: f64) {
    let actual = actual.as_f64().expect("numeric value");
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {expected}, got {actual}"
    );
}

// =============================================================================
// Daily Metrics
// =============================================================================

#[test]
fn when_closes_are_10_11_9_daily_return_is_null_then_10_then_minus_18_18() {
    // Given: Three consecutive days of closes
    let (_temp, warehouse) = open_warehouse();
    let rows = six_trading_days();
    load_and_transform(&warehouse, &rows[..3]);

    // When: Daily returns are read back in date order
    let returns = query(
        &warehouse,
        "SELECT daily_return FROM market_data.daily_stock_metrics \
         WHERE symbol = 'X' ORDER BY date",
    );

    // Then: The first day has no return and the rest are rounded percentages
    assert_eq!(returns.len(), 3);
    assert_eq!(returns[0][0], Value::Null);
    assert_close(&returns[1][0], 10.0);
    assert_close(&returns[2][0], -18.18);
}

#[test]
fn moving_average_covers_up_to_five_rows_per_symbol() {
    // Given: Six trading days
    let (_temp, warehouse) = open_warehouse();
    load_and_transform(&warehouse, &six_trading_days());

    // When: The moving averages are read back
    let averages = query(
        &warehouse,
        "SELECT moving_avg_5d FROM market_data.daily_stock_metrics \
         WHERE symbol = 'X' ORDER BY date",
    );

    // Then: Early rows average what exists; later rows use the last five closes
    assert_close(&averages[0][0], 10.0);
    assert_close(&averages[1][0], 10.5);
    assert_close(&averages[4][0], 11.0);
    assert_close(&averages[5][0], 11.8);
}

#[test]
fn day_direction_and_day_of_week_follow_each_row() {
    let (_temp, warehouse) = open_warehouse();
    load_and_transform(&warehouse, &six_trading_days());

    let rows = query(
        &warehouse,
        "SELECT day_direction, day_of_week, daily_volatility FROM market_data.daily_stock_metrics \
         WHERE symbol = 'X' ORDER BY date",
    );

    let directions: Vec<&str> = rows.iter().filter_map(|row| row[0].as_str()).collect();
    assert_eq!(directions, vec!["Flat", "Up", "Down", "Up", "Up", "Up"]);

    let weekdays: Vec<i64> = rows.iter().filter_map(|row| row[1].as_i64()).collect();
    assert_eq!(weekdays, vec![1, 2, 3, 4, 5, 1]);

    // (10.5 - 9.5) / 10 * 100
    assert_close(&rows[0][2], 10.0);
}

#[test]
fn returns_never_cross_symbol_boundaries() {
    // Given: Two symbols sharing dates
    let (_temp, warehouse) = open_warehouse();
    let rows = vec![
        row("2026-03-02", "A", 10.0, 10.0, 10.0, 10.0, 1),
        row("2026-03-02", "B", 50.0, 50.0, 50.0, 50.0, 1),
        row("2026-03-03", "A", 10.0, 11.0, 10.0, 11.0, 1),
        row("2026-03-03", "B", 50.0, 55.0, 50.0, 55.0, 1),
    ];
    load_and_transform(&warehouse, &rows);

    // When: Returns are read per symbol
    let returns = query(
        &warehouse,
        "SELECT symbol, daily_return FROM market_data.daily_stock_metrics ORDER BY symbol, date",
    );

    // Then: Each symbol's first day has no previous close
    assert_eq!(returns[0][1], Value::Null);
    assert_close(&returns[1][1], 10.0);
    assert_eq!(returns[2][1], Value::Null);
    assert_close(&returns[3][1], 10.0);
}

#[test]
fn zero_or_missing_denominators_yield_null_not_errors() {
    // Given: A week for Z that opens at zero and has one missing close
    let (_temp, warehouse) = open_warehouse();
    let mut missing_close = row("2026-03-04", "Z", 5.0, 5.0, 5.0, 0.0, 300);
    missing_close.close = None;
    missing_close.adj_close = None;
    let rows = vec![
        row("2026-03-02", "Z", 0.0, 1.0, 0.0, 0.0, 100),
        row("2026-03-03", "Z", 1.0, 5.0, 1.0, 5.0, 200),
        missing_close,
        row("2026-03-05", "Z", 4.0, 4.0, 4.0, 4.0, 400),
        row("2026-03-06", "Z", 4.0, 8.0, 4.0, 8.0, 500),
    ];
    load_and_transform(&warehouse, &rows);

    // When: Daily returns and volatility are read back
    let daily = query(
        &warehouse,
        "SELECT daily_return, daily_volatility FROM market_data.daily_stock_metrics \
         WHERE symbol = 'Z' ORDER BY date",
    );

    // Then: A return is null exactly when the previous close is null or zero
    let returns: Vec<&Value> = daily.iter().map(|row| &row[0]).collect();
    assert_eq!(returns[0], &Value::Null); // first day
    assert_eq!(returns[1], &Value::Null); // previous close 0
    assert_eq!(returns[2], &Value::Null); // own close missing
    assert_eq!(returns[3], &Value::Null); // previous close missing
    assert_close(returns[4], 100.0);

    // And: Volatility is null when the open is zero
    assert_eq!(daily[0][1], Value::Null);
    assert_close(&daily[1][1], 400.0);

    // And: A week opening at zero has no weekly return
    let weeks = query(
        &warehouse,
        "SELECT week_open, week_close, weekly_return, trading_days \
         FROM market_data.weekly_stock_summary WHERE symbol = 'Z'",
    );
    assert_eq!(weeks.len(), 1);
    assert_close(&weeks[0][0], 0.0);
    assert_close(&weeks[0][1], 8.0);
    assert_eq!(weeks[0][2], Value::Null);
    assert_eq!(weeks[0][3].as_i64(), Some(5));
}

// =============================================================================
// Weekly Summary
// =============================================================================

#[test]
fn weekly_summary_groups_by_monday_starting_week() {
    // Given: A full week plus the following Monday
    let (_temp, warehouse) = open_warehouse();
    load_and_transform(&warehouse, &six_trading_days());

    // When: The weekly summary is read
    let weeks = query(
        &warehouse,
        "SELECT CAST(week_starting AS VARCHAR), trading_days, weekly_high, weekly_low, \
                weekly_volume, week_open, week_close, weekly_return \
         FROM market_data.weekly_stock_summary ORDER BY week_starting DESC",
    );

    // Then: Newest week first, one row per symbol and week
    assert_eq!(weeks.len(), 2);
    assert_eq!(weeks[0][0], Value::from("2026-03-09"));
    assert_eq!(weeks[0][1].as_i64(), Some(1));
    assert_close(&weeks[0][7], 7.69);

    assert_eq!(weeks[1][0], Value::from("2026-03-02"));
    assert_eq!(weeks[1][1].as_i64(), Some(5));
    assert_close(&weeks[1][2], 13.5);
    assert_close(&weeks[1][3], 8.8);
    assert_eq!(weeks[1][4].as_i64(), Some(1_500));
    assert_close(&weeks[1][5], 10.0);
    assert_close(&weeks[1][6], 13.0);
    assert_close(&weeks[1][7], 30.0);
}

#[test]
fn models_are_rebuilt_from_the_latest_raw_table() {
    // Given: Models built from six days
    let (_temp, warehouse) = open_warehouse();
    load_and_transform(&warehouse, &six_trading_days());

    // When: The raw table is replaced with two days and models are rebuilt
    let rows = six_trading_days();
    load_and_transform(&warehouse, &rows[..2]);

    // Then: Every model reflects only the new raw contents
    let counts = query(
        &warehouse,
        "SELECT \
            (SELECT COUNT(*) FROM market_data.stg_stock_prices), \
            (SELECT COUNT(*) FROM market_data.daily_stock_metrics), \
            (SELECT COUNT(*) FROM market_data.weekly_stock_summary)",
    );
    assert_eq!(counts[0][0].as_i64(), Some(2));
    assert_eq!(counts[0][1].as_i64(), Some(2));
    assert_eq!(counts[0][2].as_i64(), Some(1));
}

#[test]
fn models_refuse_a_raw_table_named_like_a_model() {
    // Given: Raw rows loaded under a model's name
    let (_temp, warehouse) = open_warehouse();
    let shadowing = TableRef::parse("market_data", "daily_stock_metrics").expect("table");
    warehouse
        .load_raw_prices(&shadowing, &six_trading_days(), LoadPolicy::Replace)
        .expect("load");

    // When: Models are built from it
    let error = warehouse.run_models(&shadowing).expect_err("name collision");

    // Then: Nothing is built and the raw columns survive
    assert!(matches!(
        error,
        TransformError::RawTableIsModel { model: "daily_stock_metrics", .. }
    ));
    let columns = query(
        &warehouse,
        "SELECT COUNT(*) FROM information_schema.columns \
         WHERE table_name = 'daily_stock_metrics' AND column_name = 'load_timestamp'",
    );
    assert_eq!(columns[0][0].as_i64(), Some(1));
}

// =============================================================================
// Data Tests
// =============================================================================

#[test]
fn default_data_tests_pass_on_well_formed_data() {
    let (_temp, warehouse) = open_warehouse();
    load_and_transform(&warehouse, &six_trading_days());

    let report = warehouse
        .test_models(&raw_table(), &default_suite())
        .expect("tests run");

    assert_eq!(report.outcomes.len(), default_suite().len());
    assert!(report.passed());
    assert!(report.ensure_passed().is_ok());
}

#[test]
fn duplicate_symbol_dates_fail_the_uniqueness_test() {
    // Given: The raw table holds the same day twice
    let (_temp, warehouse) = open_warehouse();
    let mut rows = six_trading_days();
    rows.push(row("2026-03-02", "X", 10.0, 10.5, 9.5, 10.0, 100));
    load_and_transform(&warehouse, &rows);

    // When: The uniqueness test runs
    let unique = DataTest::Unique {
        model: Model::DailyMetrics,
        columns: &["symbol", "date"],
    };
    let report = warehouse
        .test_models(&raw_table(), &[unique])
        .expect("tests run");

    // Then: The test fails naming itself and the failing row count
    assert!(!report.passed());
    match report.ensure_passed() {
        Err(TransformError::TestFailed { test, failures }) => {
            assert_eq!(test, "unique_daily_stock_metrics_symbol_date");
            assert_eq!(failures, 1);
        }
        other => panic!("expected a failing data test, got {other:?}"),
    }
}
