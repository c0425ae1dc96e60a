mod extract;
mod run;
mod sql;
mod summary;
mod transform;

use std::sync::Arc;

use serde_json::Value;
use stockpipe_core::{
    MarketDataSource, PipelineConfig, ReqwestHttpClient, SyntheticSource, Warehouse, YahooSource,
};

use crate::cli::{Cli, Command};
use crate::error::CliError;

pub async fn run(cli: &Cli) -> Result<Value, CliError> {
    let config = cli.settings.pipeline_config()?;

    match &cli.command {
        Command::Run => run::run(&config, market_source(cli.mock, &config)).await,
        Command::Extract(args) => extract::run(args, &config, market_source(cli.mock, &config)).await,
        Command::Transform => transform::run(&config),
        Command::Test => test::run(&config),
        Command::Summary(args) => summary::run(args, &config),
        Command::Sql(args) => sql::run(args, &config),
    }
}

fn market_source(mock: bool, config: &PipelineConfig) -> Arc<dyn MarketDataSource> {
    if mock {
        tracing::info!("using synthetic market data");
        return Arc::new(SyntheticSource::new());
    }
    Arc::new(YahooSource::with_http_client(
        Arc::new(ReqwestHttpClient::default()),
        config.yahoo_auth(),
    ))
}

fn open_warehouse(config: &PipelineConfig) -> Result<Warehouse, CliError> {
    let warehouse = Warehouse::open(config.warehouse_config())?;
    tracing::debug!(path = %warehouse.db_path().display(), "opened warehouse");
    Ok(warehouse)
}
