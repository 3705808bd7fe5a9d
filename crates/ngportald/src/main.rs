// # ngportald - NGPortal DDNS Daemon
//
// This is a THIN integration layer:
// - DO NOT add DNS logic, comparison logic or retry logic here
// - All DDNS logic lives in ngportal-core
//
// The ngportald daemon is responsible for:
// 1. Reading configuration from environment variables (and an optional
//    settings file written by the control panel)
// 2. Initializing logging and the runtime
// 3. Registering providers and state stores
// 4. Starting the DDNS engine and stopping it on SIGTERM/SIGINT
//
// ## Configuration
//
// ### Record
// - `DDNS_DOMAIN`: Domain label to keep updated (e.g. myhouse)
// - `DDNS_TOKEN`: Provider token
// - `DDNS_PROVIDER`: Provider type (duckdns)
// - `DDNS_PROVIDER_URL`: Base URL override for the provider (optional)
// - `DDNS_INTERVAL_MINUTES`: Update interval: 5, 10, 15 or 30 (default 5)
//
// ### IP Resolution
// - `DDNS_RESOLVER_URLS`: Comma-separated IP-echo URLs in priority order
// - `DDNS_RESOLVER_TIMEOUT_SECS`: Timeout per endpoint, 1-60 (default 5)
//
// ### State Store
// - `DDNS_STATE_STORE_TYPE`: Type of state store (file, memory)
// - `DDNS_STATE_STORE_PATH`: Path to state file (for file store)
//
// ### Other
// - `DDNS_SETTINGS_PATH`: Settings JSON saved by the control panel; values
//   set in the environment take precedence
// - `DDNS_LOG_LEVEL`: trace, debug, info, warn, error (default info)
//
// ## Example
//
// ```bash
// export DDNS_DOMAIN=myhouse
// export DDNS_TOKEN=your-duckdns-token
// export DDNS_INTERVAL_MINUTES=10
// export DDNS_STATE_STORE_TYPE=file
// export DDNS_STATE_STORE_PATH=/var/lib/ngportal/ddns-state.json
//
// ngportald
// ```

use anyhow::{Context, Result};
use ngportal_core::config::DEFAULT_IP_ECHO_ENDPOINTS;
use ngportal_core::settings::ALLOWED_INTERVAL_MINUTES;
use ngportal_core::{
    AuthToken, DdnsConfig, DdnsEngine, DdnsSettings, EngineConfig, EngineEvent, ProviderKind,
    ProviderRegistry, ResolverConfig, StateStoreConfig,
};
use std::env;
use std::process::ExitCode;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DaemonExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<DaemonExitCode> for ExitCode {
    fn from(code: DaemonExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Application configuration
///
/// Record fields are optional until the settings file has been merged in.
#[derive(Debug, Clone, PartialEq)]
struct Config {
    domain: Option<String>,
    token: Option<String>,
    provider: Option<String>,
    provider_url: Option<String>,
    interval_minutes: Option<u64>,
    resolver_urls: Vec<String>,
    resolver_timeout_secs: u64,
    state_store_type: String,
    state_store_path: Option<String>,
    settings_path: Option<String>,
    enabled: bool,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup` (environment in production)
    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let interval_minutes = non_empty("DDNS_INTERVAL_MINUTES")
            .map(|s| s.parse::<u64>())
            .transpose()
            .context("DDNS_INTERVAL_MINUTES must be a number of minutes")?;

        let resolver_timeout_secs = non_empty("DDNS_RESOLVER_TIMEOUT_SECS")
            .map(|s| s.parse::<u64>())
            .transpose()
            .context("DDNS_RESOLVER_TIMEOUT_SECS must be a number of seconds")?
            .unwrap_or(EngineConfig::default().resolve_timeout_secs);

        let resolver_urls = match non_empty("DDNS_RESOLVER_URLS") {
            Some(list) => list
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            None => DEFAULT_IP_ECHO_ENDPOINTS.iter().map(|s| s.to_string()).collect(),
        };

        Ok(Self {
            domain: non_empty("DDNS_DOMAIN"),
            // Tokens are used verbatim
            token: lookup("DDNS_TOKEN").filter(|t| !t.trim().is_empty()),
            provider: non_empty("DDNS_PROVIDER"),
            provider_url: non_empty("DDNS_PROVIDER_URL"),
            interval_minutes,
            resolver_urls,
            resolver_timeout_secs,
            state_store_type: non_empty("DDNS_STATE_STORE_TYPE")
                .unwrap_or_else(|| "file".to_string())
                .to_lowercase(),
            state_store_path: non_empty("DDNS_STATE_STORE_PATH"),
            settings_path: non_empty("DDNS_SETTINGS_PATH"),
            enabled: true,
            log_level: non_empty("DDNS_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Fill fields the environment left unset from saved settings
    fn apply_settings(&mut self, settings: DdnsSettings) {
        if self.domain.is_none() {
            self.domain = Some(settings.domain);
        }
        if self.token.is_none() {
            self.token = Some(settings.token.expose().to_string());
        }
        if self.provider.is_none() {
            self.provider = Some(settings.provider.type_name().to_string());
        }
        if self.interval_minutes.is_none() {
            self.interval_minutes = Some(settings.interval_minutes);
        }
        self.enabled = settings.enabled;
    }

    fn interval_minutes(&self) -> u64 {
        self.interval_minutes.unwrap_or(ALLOWED_INTERVAL_MINUTES[0])
    }

    fn provider(&self) -> &str {
        self.provider.as_deref().unwrap_or("duckdns")
    }

    /// Validate the configuration
    ///
    /// This performs validation including:
    /// - Required field presence
    /// - Domain label format
    /// - Numeric range validation
    /// - Type enumeration validation
    /// - URL schemes
    fn validate(&self) -> Result<()> {
        // Validate token presence
        let token = self.token.as_deref().unwrap_or_default();
        if token.trim().is_empty() {
            anyhow::bail!(
                "DDNS_TOKEN is required. \
                Set it via: export DDNS_TOKEN=your_token"
            );
        }

        // Check for obvious placeholder tokens (common mistake)
        let token_lower = token.to_lowercase();
        if token_lower.contains("your_token")
            || token_lower.contains("your-duckdns-token")
            || token_lower.contains("replace_me")
            || token_lower == "token"
        {
            anyhow::bail!(
                "DDNS_TOKEN appears to be a placeholder. \
                Use the token shown on your provider's account page."
            );
        }

        match self.domain.as_deref() {
            Some(domain) => Self::validate_domain_name(domain)?,
            None => anyhow::bail!(
                "DDNS_DOMAIN is required. \
                Set it via: export DDNS_DOMAIN=myhouse"
            ),
        }

        // Validate provider type
        match ProviderKind::from_name(self.provider()) {
            ProviderKind::DuckDns => {}
            ProviderKind::Custom(name) => anyhow::bail!(
                "DDNS_PROVIDER '{}' is not supported. \
                Supported providers: duckdns",
                name
            ),
        }

        if let Some(url) = &self.provider_url {
            Self::validate_url("DDNS_PROVIDER_URL", url)?;
        }

        if !ALLOWED_INTERVAL_MINUTES.contains(&self.interval_minutes()) {
            anyhow::bail!(
                "DDNS_INTERVAL_MINUTES must be one of {:?}. Got: {}",
                ALLOWED_INTERVAL_MINUTES,
                self.interval_minutes()
            );
        }

        if self.resolver_urls.is_empty() {
            anyhow::bail!("DDNS_RESOLVER_URLS must contain at least one URL");
        }
        for url in &self.resolver_urls {
            Self::validate_url("DDNS_RESOLVER_URLS", url)?;
        }

        if !(1..=60).contains(&self.resolver_timeout_secs) {
            anyhow::bail!(
                "DDNS_RESOLVER_TIMEOUT_SECS must be between 1 and 60 seconds. Got: {}",
                self.resolver_timeout_secs
            );
        }

        // Validate state store type
        match self.state_store_type.as_str() {
            "file" | "memory" => {}
            _ => anyhow::bail!(
                "DDNS_STATE_STORE_TYPE '{}' is not supported. \
                Supported types: file, memory",
                self.state_store_type
            ),
        }

        if self.state_store_type == "file" && self.state_store_path.is_none() {
            anyhow::bail!(
                "DDNS_STATE_STORE_PATH is required when DDNS_STATE_STORE_TYPE=file. \
                Set it via: export DDNS_STATE_STORE_PATH=/var/lib/ngportal/ddns-state.json"
            );
        }

        Self::validate_log_level(&self.log_level)?;

        Ok(())
    }

    fn validate_log_level(level: &str) -> Result<Level> {
        match level.to_lowercase().as_str() {
            "trace" => Ok(Level::TRACE),
            "debug" => Ok(Level::DEBUG),
            "info" => Ok(Level::INFO),
            "warn" => Ok(Level::WARN),
            "error" => Ok(Level::ERROR),
            _ => anyhow::bail!(
                "DDNS_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                level
            ),
        }
    }

    fn validate_url(var: &str, url: &str) -> Result<()> {
        if !url.starts_with("https://") && !url.starts_with("http://") {
            anyhow::bail!("{} must use HTTP or HTTPS scheme. Got: {}", var, url);
        }
        if url.starts_with("http://") {
            warn!("{} uses HTTP (not HTTPS): {}", var, url);
        }
        Ok(())
    }

    /// Validate a domain label or full hostname
    ///
    /// This implements basic DNS name validation per RFC 1035.
    /// It's not comprehensive but catches common errors.
    fn validate_domain_name(domain: &str) -> Result<()> {
        if domain.is_empty() {
            anyhow::bail!("Domain name cannot be empty");
        }

        // Total length limit (RFC 1035: 253 chars max)
        if domain.len() > 253 {
            anyhow::bail!(
                "Domain name too long: {} chars (max 253). Got: {}",
                domain.len(),
                domain
            );
        }

        for label in domain.split('.') {
            if label.is_empty() {
                anyhow::bail!("Domain name has empty label: '{}'", domain);
            }

            if label.len() > 63 {
                anyhow::bail!(
                    "Domain label too long: {} chars (max 63). Label: '{}'",
                    label.len(),
                    label
                );
            }

            if !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
                anyhow::bail!(
                    "Domain label contains invalid characters. Label: '{}'. \
                    Valid: alphanumeric and hyphen only.",
                    label
                );
            }

            if label.starts_with('-') || label.ends_with('-') {
                anyhow::bail!(
                    "Domain label cannot start or end with hyphen. Label: '{}'",
                    label
                );
            }
        }

        Ok(())
    }

    /// Build the engine configuration (call after `validate()`)
    fn to_ddns_config(&self) -> DdnsConfig {
        let state_store = match self.state_store_type.as_str() {
            "file" => StateStoreConfig::File {
                path: self.state_store_path.clone().unwrap_or_default(),
            },
            _ => StateStoreConfig::Memory,
        };

        DdnsConfig {
            domain: self.domain.clone().unwrap_or_default(),
            provider: ProviderKind::from_name(self.provider()),
            token: AuthToken::new(self.token.clone().unwrap_or_default()),
            interval_secs: self.interval_minutes() * 60,
            enabled: self.enabled,
            resolver: ResolverConfig {
                endpoints: self.resolver_urls.clone(),
            },
            state_store,
            engine: EngineConfig {
                resolve_timeout_secs: self.resolver_timeout_secs,
                ..EngineConfig::default()
            },
        }
    }
}

fn main() -> ExitCode {
    // Load configuration from environment
    let mut config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return DaemonExitCode::ConfigError.into();
        }
    };

    // Initialize tracing
    let log_level = match Config::validate_log_level(&config.log_level) {
        Ok(level) => level,
        Err(e) => {
            eprintln!("Configuration validation error: {}", e);
            return DaemonExitCode::ConfigError.into();
        }
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return DaemonExitCode::ConfigError.into();
    }

    info!("Starting ngportald daemon");

    // Enter tokio runtime
    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return DaemonExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        if let Some(path) = config.settings_path.clone() {
            match DdnsSettings::load(&path).await {
                Ok(Some(settings)) => {
                    info!("Loaded settings from {}", path);
                    config.apply_settings(settings);
                }
                Ok(None) => info!("No settings file at {}, using environment only", path),
                Err(e) => {
                    error!("Failed to load settings: {}", e);
                    return DaemonExitCode::ConfigError;
                }
            }
        }

        if let Err(e) = config.validate() {
            error!("Configuration validation error: {}", e);
            return DaemonExitCode::ConfigError;
        }

        match run_daemon(config).await {
            Ok(()) => DaemonExitCode::CleanShutdown,
            Err(e) => {
                error!("Daemon error: {:#}", e);
                exit_code_for(&e)
            }
        }
    });

    result.into()
}

/// Configuration errors surfacing from the engine still exit with 1
fn exit_code_for(err: &anyhow::Error) -> DaemonExitCode {
    match err.downcast_ref::<ngportal_core::Error>() {
        Some(e) if e.is_configuration() => DaemonExitCode::ConfigError,
        _ => DaemonExitCode::RuntimeError,
    }
}

/// Run the daemon
async fn run_daemon(config: Config) -> Result<()> {
    let ddns_config = config.to_ddns_config();

    // Create provider registry
    let registry = ProviderRegistry::with_builtin_state_stores();

    #[cfg(feature = "duckdns")]
    {
        info!("Registering DuckDNS provider");
        ngportal_provider_duckdns::register(&registry);
    }

    let provider = registry.create_provider(&ddns_config.provider, config.provider_url.as_deref())?;
    let resolver = ngportal_ip_http::resolver_for(&ddns_config.resolver)?;
    let state_store = registry.create_state_store(&ddns_config.state_store).await?;

    info!("Provider: {}", provider.provider_name());
    info!("State store type: {}", ddns_config.state_store.type_name());
    info!("IP-echo endpoints: {}", ddns_config.resolver.endpoints.join(", "));

    let (engine, events) = DdnsEngine::new(
        Box::new(resolver),
        provider,
        state_store,
        ddns_config.engine.clone(),
    )?;
    let event_logger = tokio::spawn(log_events(events));

    let status = engine.start_with_config(&ddns_config).await?;
    if !status.is_running {
        info!("DDNS updater is disabled in settings, exiting");
        return Ok(());
    }

    info!(
        "Keeping {} updated every {} minute(s)",
        ddns_config.domain,
        config.interval_minutes()
    );

    let signal = wait_for_shutdown().await?;
    info!("Received shutdown signal: {}", signal);
    info!("Shutting down daemon");

    let status = engine.stop().await;
    info!(
        "Last status: {} (IP: {})",
        status.last_status_text,
        status
            .last_known_ip
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| "unknown".to_string())
    );

    // Dropping the engine closes the event channel
    drop(engine);
    if let Err(e) = event_logger.await {
        warn!("Event logger ended abnormally: {}", e);
    }

    Ok(())
}

/// Forward engine events to the log
async fn log_events(events: mpsc::Receiver<EngineEvent>) {
    let mut events = ReceiverStream::new(events);
    while let Some(event) = events.next().await {
        match event {
            EngineEvent::TickCompleted { outcome } => info!("DDNS status: {}", outcome),
            EngineEvent::PersistenceFailed { error } => {
                warn!("DDNS state is no longer persisted this run: {}", error)
            }
            other => debug!("Engine event: {:?}", other),
        }
    }
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
///
/// # Returns
///
/// Returns the name of the signal received.
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    let signal = tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    };
    Ok(signal)
}

/// Wait for shutdown signals (SIGINT only)
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}
