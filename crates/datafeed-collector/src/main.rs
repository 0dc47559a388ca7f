//! datafeed CLI.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use datafeed_collector::modules::LoadRequest;
use datafeed_collector::{
    CollectorConfig, DataLoader, FetcherRegistry, Scheduler, SyncEngine, SyncRunReport,
    TargetOutcome,
};
use datafeed_core::logging::{init_logging, LogConfig};
use datafeed_core::{Granularity, SyncTarget, Venue};
use datafeed_data::{MarketDataStore, SeriesFilter};

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

#[derive(Parser)]
#[command(name = "datafeed")]
#[command(about = "Incremental OHLCV market data feed", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// 로그 레벨 (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// 저장소 통계 출력
    Stats,

    /// 설정된 대상을 한 번 동기화
    Fetch {
        /// 특정 심볼만 (예: "BTC/USDT")
        #[arg(long)]
        symbol: Option<String>,
        /// 특정 거래소/제공처만 (okx, binance, yahoo, tushare)
        #[arg(long)]
        exchange: Option<Venue>,
        /// 특정 타임프레임만 (1m … 1w)
        #[arg(long)]
        timeframe: Option<Granularity>,
        /// 최근 N일을 다시 수집 (저장된 바도 덮어씀)
        #[arg(long)]
        days: Option<u32>,
    },

    /// 저장된 데이터 삭제 (조건이 없으면 전체)
    Clear {
        #[arg(long)]
        symbol: Option<String>,
        #[arg(long)]
        exchange: Option<Venue>,
        #[arg(long)]
        timeframe: Option<Granularity>,
    },

    /// 데몬 모드: 주기적으로 동기화
    Start,

    /// 시계열을 CSV로 내보내기
    Export {
        #[arg(long)]
        symbol: String,
        #[arg(long)]
        exchange: Venue,
        #[arg(long)]
        timeframe: Granularity,
        /// 최근 N일
        #[arg(long, default_value_t = 30)]
        days: u32,
        /// 출력 파일 (없으면 표준 출력)
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // 로깅 초기화
    init_logging(LogConfig::new(format!("datafeed={}", cli.log_level)).format_from_env())
        .map_err(|e| anyhow::anyhow!(e))?;

    tracing::info!("datafeed 시작");

    // 설정 로드
    let config = CollectorConfig::from_env()?;
    tracing::debug!(database_path = %config.database_path.display(), "설정 로드 완료");

    let store = MarketDataStore::connect(&config.database_path)
        .await
        .with_context(|| format!("데이터베이스 연결 실패: {}", config.database_path.display()))?;
    tracing::info!("데이터베이스 연결 성공");

    match cli.command {
        Commands::Stats => print_stats(&store).await?,
        Commands::Clear {
            symbol,
            exchange,
            timeframe,
        } => {
            let mut filter = SeriesFilter::all();
            if let Some(symbol) = symbol {
                filter = filter.symbol(symbol);
            }
            if let Some(venue) = exchange {
                filter = filter.venue(venue.as_str());
            }
            if let Some(granularity) = timeframe {
                filter = filter.granularity(granularity);
            }
            let removed = store.clear(&filter).await?;
            println!("삭제된 행: {}", removed);
        }
        Commands::Fetch {
            symbol,
            exchange,
            timeframe,
            days,
        } => {
            let engine = build_engine(&config, &store)?;
            let targets = select_targets(&config, symbol.as_deref(), exchange, timeframe);
            run_fetch(&engine, &targets, days).await;
        }
        Commands::Start => {
            let engine = build_engine(&config, &store)?;
            run_daemon(&engine, &config).await;
        }
        Commands::Export {
            symbol,
            exchange,
            timeframe,
            days,
            output,
        } => {
            let engine = build_engine(&config, &store)?;
            let request = LoadRequest::lookback(
                symbol,
                exchange.as_str(),
                timeframe,
                days,
                Utc::now().timestamp_millis(),
            );
            run_export(&engine, &request, output).await?;
        }
    }

    store.close().await;
    tracing::info!("datafeed 종료");

    Ok(())
}

fn build_engine(config: &CollectorConfig, store: &MarketDataStore) -> anyhow::Result<SyncEngine> {
    let registry = FetcherRegistry::from_config(config)?;
    Ok(SyncEngine::new(store.clone(), registry).with_target_delay(config.sync.target_delay()))
}

async fn run_fetch(engine: &SyncEngine, targets: &[SyncTarget], days: Option<u32>) {
    if targets.is_empty() {
        tracing::warn!("동기화할 대상이 없습니다");
        return;
    }

    let report = match days {
        None => engine.run_once(targets).await,
        Some(days) => refetch(engine, targets, days).await,
    };
    report.stats.log_summary("동기화");
    for failure in report.failures() {
        if let TargetOutcome::Failed { error, .. } = &failure.outcome {
            eprintln!("실패 {}: {}", failure.key, error);
        }
    }
}

async fn run_daemon(engine: &SyncEngine, config: &CollectorConfig) {
    let targets = config.sync.targets();
    tracing::info!(
        targets = targets.len(),
        "=== 데몬 모드 시작 (주기: {}분) ===",
        config.daemon.interval_minutes
    );

    let scheduler = Scheduler::new(config.daemon.interval());
    let targets = &targets;
    scheduler
        .run(
            || async move {
                engine.run_once(targets).await.stats.log_summary("동기화");
            },
            async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!("종료 신호 대기 실패: {}", e);
                }
            },
        )
        .await;
}

async fn run_export(
    engine: &SyncEngine,
    request: &LoadRequest,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let series = DataLoader::new(engine).load(request).await?;

    match output {
        Some(path) => {
            let file =
                File::create(&path).with_context(|| format!("파일 생성 실패: {}", path.display()))?;
            series.write_csv(BufWriter::new(file))?;
            println!("{}건을 {}에 저장했습니다", series.len(), path.display());
        }
        None => {
            let stdout = io::stdout();
            let mut out = stdout.lock();
            series.write_csv(&mut out)?;
            out.flush()?;
        }
    }
    Ok(())
}

/// 설정된 대상 중 조건에 맞는 것. 심볼과 거래소를 모두 지정했는데 설정에
/// 없으면 해당 대상을 새로 만듭니다.
fn select_targets(
    config: &CollectorConfig,
    symbol: Option<&str>,
    venue: Option<Venue>,
    granularity: Option<Granularity>,
) -> Vec<SyncTarget> {
    let targets: Vec<SyncTarget> = config
        .sync
        .targets()
        .into_iter()
        .filter(|t| symbol.map_or(true, |s| t.symbol == s))
        .filter(|t| venue.map_or(true, |v| t.venue == v.as_str()))
        .filter(|t| granularity.map_or(true, |g| t.granularity == g))
        .collect();

    match (targets.is_empty(), symbol, venue) {
        (true, Some(symbol), Some(venue)) => {
            let granularity = granularity.unwrap_or(Granularity::D1);
            vec![SyncTarget::new(
                symbol,
                venue.as_str(),
                granularity,
                config.sync.lookback_days(venue.kind()),
            )]
        }
        _ => targets,
    }
}

/// 최근 `days`일을 대상별로 다시 받아 덮어씁니다.
async fn refetch(engine: &SyncEngine, targets: &[SyncTarget], days: u32) -> SyncRunReport {
    let started = std::time::Instant::now();
    let now = Utc::now().timestamp_millis();
    let start = now - i64::from(days) * DAY_MS;

    let mut run = SyncRunReport::default();
    for target in targets {
        let report = engine
            .sync_range(&target.symbol, &target.venue, target.granularity, start, now)
            .await;
        run.record(report);
    }
    run.stats.elapsed = started.elapsed();
    run
}

async fn print_stats(store: &MarketDataStore) -> anyhow::Result<()> {
    let stats = store.stats().await?;

    let path = stats
        .path
        .as_ref()
        .map_or_else(|| "(memory)".to_string(), |p| p.display().to_string());
    println!("데이터베이스: {}", path);
    println!("크기: {:.2} MB", stats.size_mb());
    println!("총 레코드: {}", stats.total_records);

    println!("\n거래소별:");
    for (venue, count) in &stats.by_venue {
        println!("  {:<10} {:>10}", venue, count);
    }
    println!("\n타임프레임별:");
    for (granularity, count) in &stats.by_granularity {
        println!("  {:<10} {:>10}", granularity, count);
    }
    println!("\n상위 심볼:");
    for (symbol, count) in stats.top_symbols(10) {
        println!("  {:<12} {:>10}", symbol, count);
    }
    Ok(())
}
