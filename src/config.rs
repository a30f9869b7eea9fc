use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::models::command::RetryBudget;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub orchestration: OrchestrationConfig,
    pub ingest: IngestConfig,
}

/// What to do when the trading fleet exhausts its power-cycle budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExhaustionPolicy {
    /// Fail the whole run. Strictest of the legacy entry points; default.
    Abort,
    /// Dispatch to the healthy remainder; fail only if nobody is left.
    Degrade,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationConfig {
    pub environment: String,              // e.g. "qa"
    pub ingest_name_template: String,     // "{env}" substituted
    pub fleet_pattern_template: String,   // "{env}" substituted, "*" glob
    pub max_retry_cycles: u32,            // power cycles per recovery pass
    pub probe_timeout_secs: u64,          // per probing attempt
    pub probe_interval_secs: u64,
    pub command_timeout_secs: u64,        // remote batch timeout
    pub settle_delay_secs: u64,           // submit → first result poll
    pub result_poll_secs: u64,
    pub result_deadline_secs: u64,        // per-target terminal-status wait
    pub lease_ttl_secs: u64,
    pub exhaustion_policy: ExhaustionPolicy,
    pub address_env_var: String,          // injected as line 0 of the batch
    pub ingest_commands: Vec<String>,     // bootstrap batch for the ingest node
    pub server_commands: Vec<String>,     // bootstrap batch for trading servers
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    pub ws_url: String,
    pub api_key: String,
    pub api_secret: String,
    pub symbols: Vec<String>,
    pub subject: String,
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            environment: "qa".into(),
            ingest_name_template: "alpaca-websocket-ingest-{env}".into(),
            fleet_pattern_template: "trading-server-{env}-*".into(),
            max_retry_cycles: 1,
            probe_timeout_secs: 300,
            probe_interval_secs: 10,
            command_timeout_secs: 120,
            settle_delay_secs: 2,
            result_poll_secs: 3,
            result_deadline_secs: 120,
            lease_ttl_secs: 900,
            exhaustion_policy: ExhaustionPolicy::Abort,
            address_env_var: "NATS_PUBLIC_IP".into(),
            ingest_commands: vec![],
            server_commands: vec![],
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            ws_url: "wss://stream.data.alpaca.markets/v2/test".into(),
            api_key: String::new(),
            api_secret: String::new(),
            symbols: vec!["AAPL".into()],
            subject: "alpaca.market.data".into(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            orchestration: OrchestrationConfig::default(),
            ingest: IngestConfig::default(),
        }
    }
}

impl OrchestrationConfig {
    pub fn ingest_instance_name(&self) -> String {
        self.ingest_name_template.replace("{env}", &self.environment)
    }

    pub fn fleet_pattern(&self) -> String {
        self.fleet_pattern_template.replace("{env}", &self.environment)
    }

    pub fn retry_budget(&self) -> RetryBudget {
        RetryBudget {
            max_cycles: self.max_retry_cycles,
            per_attempt_timeout: Duration::from_secs(self.probe_timeout_secs),
            poll_interval: Duration::from_secs(self.probe_interval_secs),
        }
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.settle_delay_secs)
    }

    pub fn result_poll_interval(&self) -> Duration {
        Duration::from_secs(self.result_poll_secs)
    }

    pub fn result_deadline(&self) -> Duration {
        Duration::from_secs(self.result_deadline_secs)
    }

    pub fn lease_ttl(&self) -> Duration {
        Duration::from_secs(self.lease_ttl_secs)
    }
}

impl Config {
    /// Load configuration from environment variables (.env file) with
    /// defaults.
    ///
    /// Optional env vars:
    ///   ENVIRONMENT — deployment tag substituted into name templates (default: qa)
    ///   INGEST_NAME_TEMPLATE, FLEET_PATTERN — instance naming overrides
    ///   MAX_RETRY_CYCLES — power cycles per recovery pass (default: 1)
    ///   EXHAUSTION_POLICY — "abort" or "degrade" (default: abort)
    ///   SERVER_COMMANDS, INGEST_COMMANDS — newline-separated batch lines
    ///   ALPACA_WS_URL, ALPACA_API_KEY, ALPACA_SECRET_KEY — ingest feed
    ///   INGEST_SYMBOLS — comma-separated (default: AAPL)
    ///   NATS_SUBJECT — publish subject (default: alpaca.market.data)
    pub fn load_or_default() -> Self {
        // Load .env file if present
        let _ = dotenv::dotenv();

        let mut config = Self::default();

        if let Ok(env) = std::env::var("ENVIRONMENT") {
            if !env.is_empty() {
                config.orchestration.environment = env;
            }
        }
        if let Ok(template) = std::env::var("INGEST_NAME_TEMPLATE") {
            if !template.is_empty() {
                config.orchestration.ingest_name_template = template;
            }
        }
        if let Ok(pattern) = std::env::var("FLEET_PATTERN") {
            if !pattern.is_empty() {
                config.orchestration.fleet_pattern_template = pattern;
            }
        }
        if let Ok(cycles) = std::env::var("MAX_RETRY_CYCLES") {
            config.orchestration.max_retry_cycles =
                cycles.parse().unwrap_or(config.orchestration.max_retry_cycles);
        }
        if let Ok(policy) = std::env::var("EXHAUSTION_POLICY") {
            match policy.to_lowercase().as_str() {
                "degrade" => config.orchestration.exhaustion_policy = ExhaustionPolicy::Degrade,
                "abort" => config.orchestration.exhaustion_policy = ExhaustionPolicy::Abort,
                other => {
                    tracing::warn!("unknown EXHAUSTION_POLICY {other:?} — keeping abort");
                }
            }
        }
        if let Ok(commands) = std::env::var("SERVER_COMMANDS") {
            config.orchestration.server_commands =
                commands.lines().map(str::to_string).collect();
        }
        if let Ok(commands) = std::env::var("INGEST_COMMANDS") {
            config.orchestration.ingest_commands =
                commands.lines().map(str::to_string).collect();
        }

        if let Ok(url) = std::env::var("ALPACA_WS_URL") {
            if !url.is_empty() {
                config.ingest.ws_url = url;
            }
        }
        if let Ok(key) = std::env::var("ALPACA_API_KEY") {
            config.ingest.api_key = key;
        }
        if let Ok(secret) = std::env::var("ALPACA_SECRET_KEY") {
            config.ingest.api_secret = secret;
        }
        if let Ok(symbols) = std::env::var("INGEST_SYMBOLS") {
            let parsed: Vec<String> = symbols
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            if !parsed.is_empty() {
                config.ingest.symbols = parsed;
            }
        }
        if let Ok(subject) = std::env::var("NATS_SUBJECT") {
            if !subject.is_empty() {
                config.ingest.subject = subject;
            }
        }

        config
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let orch = &self.orchestration;
        anyhow::ensure!(
            !orch.environment.is_empty(),
            "ENVIRONMENT must not be empty"
        );
        anyhow::ensure!(
            orch.ingest_name_template.contains("{env}")
                || orch.ingest_name_template == orch.ingest_instance_name(),
            "INGEST_NAME_TEMPLATE must be a literal name or contain {{env}}"
        );
        anyhow::ensure!(
            orch.max_retry_cycles <= 10,
            "MAX_RETRY_CYCLES {} is past any sensible outage budget",
            orch.max_retry_cycles
        );
        anyhow::ensure!(
            orch.probe_interval_secs > 0,
            "probe interval must be positive — zero would hammer the status API"
        );
        anyhow::ensure!(
            orch.probe_timeout_secs >= orch.probe_interval_secs,
            "probe timeout shorter than its poll interval can never pass"
        );
        anyhow::ensure!(
            orch.result_poll_secs > 0,
            "result poll interval must be positive"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_substitution() {
        let mut orch = OrchestrationConfig::default();
        orch.environment = "prod".into();
        assert_eq!(orch.ingest_instance_name(), "alpaca-websocket-ingest-prod");
        assert_eq!(orch.fleet_pattern(), "trading-server-prod-*");
    }

    #[test]
    fn test_default_policy_is_abort() {
        let config = Config::default();
        assert_eq!(config.orchestration.exhaustion_policy, ExhaustionPolicy::Abort);
    }

    #[test]
    fn test_validate_rejects_zero_probe_interval() {
        let mut config = Config::default();
        config.orchestration.probe_interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_inverted_probe_bounds() {
        let mut config = Config::default();
        config.orchestration.probe_timeout_secs = 5;
        config.orchestration.probe_interval_secs = 10;
        assert!(config.validate().is_err());
    }
}
