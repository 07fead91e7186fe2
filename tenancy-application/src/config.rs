//! 供给配置（ProvisioningConfig）
//!
//! 全部来自 `TENANT_PROVISIONING_` 前缀的环境变量；策略在启动时确定，运行期不可切换。
//!
use anyhow::{Context, Result, bail};
use std::str::FromStr;
use std::time::Duration;
use tenancy_domain::eventing::{ExchangeNames, RetryPolicy, ServiceName};
use tenancy_domain::strategy::StrategyKind;

pub const ENV_PREFIX: &str = "TENANT_PROVISIONING_";

const DEFAULT_BROKER_URL: &str = "amqp://localhost:5672/%2f";
const DEFAULT_WORKERS: usize = 4;

#[derive(Debug, Clone)]
pub struct ProvisioningConfig {
    pub service_name: ServiceName,
    /// 交给中间件适配器的连接串
    pub broker_url: String,
    /// 整个子系统的开关
    pub enabled: bool,
    pub strategy: StrategyKind,
    pub retry: RetryPolicy,
    pub workers: usize,
    pub exchanges: ExchangeNames,
}

impl ProvisioningConfig {
    /// 以缺省值为某个服务构造配置
    pub fn for_service(service_name: ServiceName) -> Self {
        Self {
            service_name,
            broker_url: DEFAULT_BROKER_URL.to_string(),
            enabled: true,
            strategy: StrategyKind::default(),
            retry: RetryPolicy::default(),
            workers: DEFAULT_WORKERS,
            exchanges: ExchangeNames::default(),
        }
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 设置了 `SERVICE_NAME` 时按环境变量读取，否则改用 `fallback`
    ///
    /// 只有缺少服务名才会回退；其余取值错误照常返回。
    pub fn from_env_or_else<F>(fallback: F) -> Result<Self>
    where
        F: FnOnce() -> Result<Self>,
    {
        Self::from_lookup_or_else(|key| std::env::var(key).ok(), fallback)
    }

    pub fn from_lookup_or_else<L, F>(lookup: L, fallback: F) -> Result<Self>
    where
        L: Fn(&str) -> Option<String>,
        F: FnOnce() -> Result<Self>,
    {
        let configured = lookup(&format!("{ENV_PREFIX}SERVICE_NAME"))
            .is_some_and(|v| !v.trim().is_empty());
        if configured {
            Self::from_lookup(lookup)
        } else {
            fallback()
        }
    }

    /// 以任意查找函数读取配置（测试中用 map 代替环境变量）
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(&format!("{ENV_PREFIX}{name}"))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let service_name = var("SERVICE_NAME")
            .with_context(|| format!("{ENV_PREFIX}SERVICE_NAME is required"))?;
        let service_name = ServiceName::parse(service_name)
            .with_context(|| format!("parse {ENV_PREFIX}SERVICE_NAME"))?;

        let defaults = Self::for_service(service_name);

        let migrations_enabled = parse_or(&var, "MIGRATIONS_ENABLED", false)?;
        // 显式的 STRATEGY 优先于 MIGRATIONS_ENABLED 开关
        let strategy = match var("STRATEGY") {
            Some(value) => StrategyKind::from_str(&value)
                .with_context(|| format!("parse {ENV_PREFIX}STRATEGY"))?,
            None => StrategyKind::from_migrations_enabled(migrations_enabled),
        };

        let retry = RetryPolicy {
            max_retries: parse_or(&var, "MAX_RETRY_COUNT", defaults.retry.max_retries)?,
            initial_interval: Duration::from_millis(parse_or(
                &var,
                "RETRY_BACKOFF_MS",
                defaults.retry.initial_interval.as_millis() as u64,
            )?),
            multiplier: parse_or(&var, "RETRY_BACKOFF_MULTIPLIER", defaults.retry.multiplier)?,
            max_interval: Duration::from_millis(parse_or(
                &var,
                "RETRY_MAX_BACKOFF_MS",
                defaults.retry.max_interval.as_millis() as u64,
            )?),
        };

        let config = Self {
            broker_url: var("BROKER_URL").unwrap_or(defaults.broker_url.clone()),
            enabled: parse_or(&var, "ENABLED", defaults.enabled)?,
            strategy,
            retry,
            workers: parse_or(&var, "WORKERS", defaults.workers)?,
            exchanges: ExchangeNames {
                events: var("EVENTS_EXCHANGE").unwrap_or(defaults.exchanges.events.clone()),
                dead_letter: var("DEAD_LETTER_EXCHANGE")
                    .unwrap_or(defaults.exchanges.dead_letter.clone()),
            },
            ..defaults
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            bail!("{ENV_PREFIX}WORKERS must be at least 1");
        }
        if !self.retry.multiplier.is_finite() || self.retry.multiplier < 1.0 {
            bail!(
                "{ENV_PREFIX}RETRY_BACKOFF_MULTIPLIER must be >= 1.0, got {}",
                self.retry.multiplier
            );
        }
        if self.retry.max_interval < self.retry.initial_interval {
            bail!("{ENV_PREFIX}RETRY_MAX_BACKOFF_MS must not be below RETRY_BACKOFF_MS");
        }
        if self.exchanges.events == self.exchanges.dead_letter {
            bail!("events and dead-letter exchanges must differ");
        }
        Ok(())
    }
}

fn parse_or<V, T>(var: &V, name: &str, default: T) -> Result<T>
where
    V: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(name) {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("parse {ENV_PREFIX}{name}: {raw}")),
        None => Ok(default),
    }
}
