use anyhow::{anyhow, Context};
use clap::{Arg, ArgAction, Command};
use serde::Serialize;

use rustex::{
    core::{
        config::{ExchangeConfig, ExchangeKind},
        exchange::Exchange,
        types::{CandleQuery, Interval},
    },
    exchanges::create_exchange_from_config,
};

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 加载环境变量
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // 解析命令行参数
    let matches = Command::new("rustex")
        .version(env!("CARGO_PKG_VERSION"))
        .about("统一的加密货币交易所 REST 客户端")
        .arg(
            Arg::new("exchange")
                .short('e')
                .long("exchange")
                .value_name("EXCHANGE")
                .help("交易所: binance, bybit, kucoin, bitfinex"),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("YAML配置文件路径，与 --exchange 二选一"),
        )
        .arg(
            Arg::new("futures")
                .long("futures")
                .action(ArgAction::SetTrue)
                .help("使用期货市场"),
        )
        .arg(
            Arg::new("limit")
                .short('l')
                .long("limit")
                .value_name("N")
                .value_parser(clap::value_parser!(u32))
                .help("K线条数"),
        )
        .arg(
            Arg::new("command")
                .value_name("COMMAND")
                .required(true)
                .value_parser([
                    "info",
                    "symbols",
                    "tickers",
                    "ticker",
                    "balances",
                    "candles",
                    "time",
                    "capabilities",
                ])
                .help("要执行的查询"),
        )
        .arg(Arg::new("symbol").value_name("SYMBOL").help("交易对，例如 BTC/USDT"))
        .arg(Arg::new("interval").value_name("INTERVAL").help("K线周期，例如 1h"))
        .get_matches();

    let mut config = match (
        matches.get_one::<String>("config"),
        matches.get_one::<String>("exchange"),
    ) {
        (Some(path), _) => ExchangeConfig::from_file(path)?,
        (None, Some(name)) => ExchangeConfig::new(name.parse::<ExchangeKind>()?, false),
        (None, None) => return Err(anyhow!("必须指定 --exchange 或 --config")),
    };
    if matches.get_flag("futures") {
        config.futures = true;
    }

    let exchange = create_exchange_from_config(&config)?;
    log::info!(
        "🚀 {} {:?} 已就绪",
        exchange.name(),
        exchange.market_type()
    );

    let command = matches
        .get_one::<String>("command")
        .map(String::as_str)
        .unwrap_or_default();
    let symbol = || {
        matches
            .get_one::<String>("symbol")
            .cloned()
            .context("该命令需要 SYMBOL 参数")
    };

    match command {
        "info" => print_json(&exchange.get_exchange_info().await?)?,
        "symbols" => print_json(&exchange.get_symbols(false).await?)?,
        "tickers" => print_json(&exchange.get_tickers().await?)?,
        "ticker" => print_json(&exchange.get_ticker(&symbol()?).await?)?,
        "balances" => print_json(&exchange.get_balances().await?)?,
        "candles" => {
            let interval = matches
                .get_one::<String>("interval")
                .map(String::as_str)
                .unwrap_or("1h");
            let query = CandleQuery {
                limit: matches.get_one::<u32>("limit").copied(),
                ..Default::default()
            };
            let candles = exchange
                .get_candles(&symbol()?, Interval::from_string(interval)?, &query)
                .await?;
            print_json(&candles)?
        }
        "time" => print_json(&exchange.get_server_time().await?)?,
        "capabilities" => print_json(&exchange.capabilities().operations())?,
        other => return Err(anyhow!("未知命令: {}", other)),
    }

    Ok(())
}
