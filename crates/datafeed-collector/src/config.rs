//! 환경변수 기반 설정 모듈.

use crate::error::CollectorError;
use crate::Result;
use datafeed_core::{Granularity, ProviderKind, SyncTarget, Venue};
use datafeed_exchange::{BinanceConfig, HttpConfig, OkxConfig, RetryConfig, TushareConfig};
use secrecy::SecretString;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Collector 전체 설정
#[derive(Debug, Clone, Default)]
pub struct CollectorConfig {
    /// SQLite 데이터베이스 파일 경로
    pub database_path: PathBuf,
    /// 동기화 대상/간격 설정
    pub sync: SyncConfig,
    /// 요청 한도 초과 재시도 설정
    pub retry: RetryConfig,
    /// 제공처 연결 설정
    pub providers: ProviderConfig,
    /// 데몬 모드 설정
    pub daemon: DaemonConfig,
}

/// 동기화 대상 설정
#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    /// 암호화폐 심볼 (예: "BTC/USDT")
    pub crypto_symbols: Vec<String>,
    /// 암호화폐 거래소
    pub crypto_venues: Vec<Venue>,
    /// 암호화폐 타임프레임
    pub crypto_timeframes: Vec<Granularity>,
    /// 미국 주식 심볼 (Yahoo)
    pub us_stocks: Vec<String>,
    /// A주 심볼 (Tushare, 예: "000001.SZ")
    pub a_stocks: Vec<String>,
    /// 미국 주식 타임프레임
    pub stock_timeframes: Vec<Granularity>,
    /// 첫 수집 시 거슬러 올라갈 일수
    pub crypto_lookback_days: u32,
    pub us_lookback_days: u32,
    pub a_share_lookback_days: u32,
    /// 대상 간 딜레이 (밀리초)
    pub target_delay_ms: u64,
    /// 페이지 요청 간 딜레이 (밀리초)
    pub page_delay_ms: u64,
}

/// 제공처 연결 설정
#[derive(Debug, Clone, Default)]
pub struct ProviderConfig {
    pub okx: OkxConfig,
    pub binance: BinanceConfig,
    pub tushare: TushareConfig,
}

/// 데몬 모드 설정
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// 동기화 실행 주기 (분 단위)
    pub interval_minutes: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            crypto_symbols: vec!["BTC/USDT".to_string(), "ETH/USDT".to_string()],
            crypto_venues: vec![Venue::Okx, Venue::Binance],
            crypto_timeframes: vec![
                Granularity::M1,
                Granularity::M5,
                Granularity::M15,
                Granularity::M30,
                Granularity::H1,
                Granularity::H2,
                Granularity::D1,
            ],
            us_stocks: vec!["AAPL".to_string(), "TSLA".to_string(), "GOOGL".to_string()],
            a_stocks: vec!["000001.SZ".to_string(), "600000.SH".to_string()],
            stock_timeframes: vec![Granularity::D1],
            crypto_lookback_days: 7,
            us_lookback_days: 30,
            a_share_lookback_days: 365,
            target_delay_ms: 500,
            page_delay_ms: 0,
        }
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self { interval_minutes: 60 }
    }
}

impl CollectorConfig {
    /// 환경변수에서 설정 로드
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = SyncConfig::default();
        let sync = SyncConfig {
            crypto_symbols: env_var_list("SYNC_CRYPTO_SYMBOLS", defaults.crypto_symbols),
            crypto_venues: env_var_parse_list("SYNC_CRYPTO_VENUES", defaults.crypto_venues)?,
            crypto_timeframes: env_var_parse_list(
                "SYNC_CRYPTO_TIMEFRAMES",
                defaults.crypto_timeframes,
            )?,
            us_stocks: env_var_list("SYNC_US_STOCKS", defaults.us_stocks),
            a_stocks: env_var_list("SYNC_A_STOCKS", defaults.a_stocks),
            stock_timeframes: env_var_parse_list(
                "SYNC_STOCK_TIMEFRAMES",
                defaults.stock_timeframes,
            )?,
            crypto_lookback_days: env_var_parse(
                "SYNC_CRYPTO_LOOKBACK_DAYS",
                defaults.crypto_lookback_days,
            ),
            us_lookback_days: env_var_parse("SYNC_US_LOOKBACK_DAYS", defaults.us_lookback_days),
            a_share_lookback_days: env_var_parse(
                "SYNC_A_SHARE_LOOKBACK_DAYS",
                defaults.a_share_lookback_days,
            ),
            target_delay_ms: env_var_parse("SYNC_TARGET_DELAY_MS", defaults.target_delay_ms),
            page_delay_ms: env_var_parse("SYNC_PAGE_DELAY_MS", defaults.page_delay_ms),
        };

        let retry_defaults = RetryConfig::default();
        let retry = RetryConfig {
            max_retries: env_var_parse("RETRY_MAX_RETRIES", retry_defaults.max_retries),
            base_delay: Duration::from_millis(env_var_parse(
                "RETRY_BASE_DELAY_MS",
                retry_defaults.base_delay.as_millis() as u64,
            )),
            max_delay: Duration::from_millis(env_var_parse(
                "RETRY_MAX_DELAY_MS",
                retry_defaults.max_delay.as_millis() as u64,
            )),
            ..retry_defaults
        };

        let http = HttpConfig {
            timeout: Duration::from_secs(env_var_parse("HTTP_TIMEOUT_SECS", 30)),
            proxy: env_var_opt("HTTP_PROXY_URL"),
        };

        let providers = ProviderConfig::from_env(http);

        Ok(Self {
            database_path: env_var_opt("DATAFEED_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("market_data.db")),
            sync,
            retry,
            providers,
            daemon: DaemonConfig {
                interval_minutes: env_var_parse("DAEMON_INTERVAL_MINUTES", 60),
            },
        })
    }
}

impl ProviderConfig {
    /// 제공처별 설정을 읽습니다. 모든 커넥터가 같은 HTTP 설정을 사용합니다.
    fn from_env(http: HttpConfig) -> Self {
        let okx_defaults = OkxConfig::default();
        let binance_defaults = BinanceConfig::default();
        let tushare_defaults = TushareConfig::default();
        Self {
            okx: OkxConfig {
                base_url: env_var_opt("OKX_BASE_URL").unwrap_or(okx_defaults.base_url),
                sandbox: env_var_bool("OKX_SANDBOX", false),
                http: http.clone(),
            },
            binance: BinanceConfig {
                base_url: env_var_opt("BINANCE_BASE_URL").unwrap_or(binance_defaults.base_url),
                http: http.clone(),
            },
            tushare: TushareConfig {
                base_url: env_var_opt("TUSHARE_BASE_URL").unwrap_or(tushare_defaults.base_url),
                token: env_var_opt("TUSHARE_TOKEN").map(SecretString::from),
                http,
            },
        }
    }
}

impl SyncConfig {
    /// 설정을 동기화 대상 목록으로 전개합니다.
    ///
    /// - 암호화폐: 심볼 × 거래소 × 타임프레임
    /// - 미국 주식: 심볼 × 주식 타임프레임 (Yahoo)
    /// - A주: 심볼 × 1d (Tushare)
    pub fn targets(&self) -> Vec<SyncTarget> {
        let mut targets = Vec::new();

        for venue in &self.crypto_venues {
            for symbol in &self.crypto_symbols {
                for granularity in &self.crypto_timeframes {
                    targets.push(SyncTarget::new(
                        symbol,
                        venue.as_str(),
                        *granularity,
                        self.lookback_days(venue.kind()),
                    ));
                }
            }
        }

        for symbol in &self.us_stocks {
            for granularity in &self.stock_timeframes {
                targets.push(SyncTarget::new(
                    symbol,
                    Venue::Yahoo.as_str(),
                    *granularity,
                    self.us_lookback_days,
                ));
            }
        }

        for symbol in &self.a_stocks {
            targets.push(SyncTarget::new(
                symbol,
                Venue::Tushare.as_str(),
                Granularity::D1,
                self.a_share_lookback_days,
            ));
        }

        targets
    }

    /// 제공처 종류별 첫 수집 일수
    pub fn lookback_days(&self, kind: ProviderKind) -> u32 {
        match kind {
            ProviderKind::CryptoExchange => self.crypto_lookback_days,
            ProviderKind::UsEquity => self.us_lookback_days,
            ProviderKind::AShare => self.a_share_lookback_days,
        }
    }

    /// 대상 간 딜레이를 Duration으로 반환
    pub fn target_delay(&self) -> Duration {
        Duration::from_millis(self.target_delay_ms)
    }

    /// 페이지 요청 간 딜레이를 Duration으로 반환
    pub fn page_delay(&self) -> Duration {
        Duration::from_millis(self.page_delay_ms)
    }
}

impl DaemonConfig {
    /// 실행 주기를 Duration으로 반환
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes * 60)
    }
}

/// 환경변수에서 값을 파싱 (실패 시 기본값 사용)
fn env_var_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// 환경변수에서 bool 값 파싱
fn env_var_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| v == "true" || v == "1")
        .unwrap_or(default)
}

/// 비어 있지 않은 환경변수 값
fn env_var_opt(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// 쉼표로 구분된 목록. 변수가 없으면 기본값, 빈 문자열이면 빈 목록.
fn env_var_list(key: &str, default: Vec<String>) -> Vec<String> {
    match std::env::var(key) {
        Ok(value) => split_list(&value),
        Err(_) => default,
    }
}

/// 쉼표로 구분된 목록을 파싱합니다. 알 수 없는 값은 설정 에러.
fn env_var_parse_list<T>(key: &str, default: Vec<T>) -> Result<Vec<T>>
where
    T: FromStr<Err = String>,
{
    match std::env::var(key) {
        Ok(value) => parse_list(&value)
            .map_err(|e| CollectorError::Config(format!("{}: {}", key, e))),
        Err(_) => Ok(default),
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn parse_list<T: FromStr<Err = String>>(value: &str) -> std::result::Result<Vec<T>, String> {
    split_list(value).iter().map(|s| s.parse()).collect()
}
