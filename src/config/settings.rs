use crate::target::LookupStrategy;
use std::path::PathBuf;
use std::time::Duration;

/// Default field holding the production account number in the sandbox database.
pub const SANDBOX_ACCOUNT_FIELD: &str = "Live eTap Account Number";

/// Which target database the run talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    Sandbox,
    #[default]
    Production,
}

/// Reconciliation run configuration
///
/// Built with chained setters, e.g.
///
/// ```
/// use donorsync::SyncConfig;
///
/// let config = SyncConfig::new("output")
///     .sandbox()
///     .import_enabled(false)
///     .window_days(14);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Directory holding `runs.json` and one directory per run
    pub output_dir: PathBuf,

    pub environment: Environment,

    /// Execute discovered candidates right after discovery
    pub import_enabled: bool,

    /// Base URL of the source platform's REST API
    pub source_base_url: String,

    /// Page size used when listing source donations
    pub source_page_size: u32,

    /// Extra wait added to the server-reported rate-limit wait
    pub rate_limit_margin: Duration,

    /// Consecutive rate-limited responses tolerated for one request
    pub max_rate_limit_retries: u32,

    /// Page size used when listing target journal entries
    pub target_page_size: u32,

    /// Defined field used to find accounts in the sandbox
    pub sandbox_account_field: String,

    /// Length of the incremental reconciliation window
    pub window_days: u32,
}

impl SyncConfig {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            environment: Environment::Production,
            import_enabled: true,
            source_base_url: "https://api.raisedonors.com/v1/".to_string(),
            source_page_size: 200,
            rate_limit_margin: Duration::from_secs(5),
            max_rate_limit_retries: 20,
            target_page_size: 100,
            sandbox_account_field: SANDBOX_ACCOUNT_FIELD.to_string(),
            window_days: 7,
        }
    }

    pub fn sandbox(mut self) -> Self {
        self.environment = Environment::Sandbox;
        self
    }

    pub fn environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    pub fn import_enabled(mut self, enabled: bool) -> Self {
        self.import_enabled = enabled;
        self
    }

    pub fn source_base_url(mut self, url: &str) -> Self {
        self.source_base_url = url.to_string();
        self
    }

    pub fn source_page_size(mut self, size: u32) -> Self {
        self.source_page_size = size;
        self
    }

    pub fn rate_limit_margin(mut self, margin: Duration) -> Self {
        self.rate_limit_margin = margin;
        self
    }

    pub fn max_rate_limit_retries(mut self, retries: u32) -> Self {
        self.max_rate_limit_retries = retries;
        self
    }

    pub fn target_page_size(mut self, size: u32) -> Self {
        self.target_page_size = size;
        self
    }

    pub fn window_days(mut self, days: u32) -> Self {
        self.window_days = days;
        self
    }

    /// Account lookup matching the environment: by id in production,
    /// by the mirrored account-number field in the sandbox.
    pub fn lookup_strategy(&self) -> LookupStrategy {
        match self.environment {
            Environment::Production => LookupStrategy::ById,
            Environment::Sandbox => LookupStrategy::UniqueField(self.sandbox_account_field.clone()),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.output_dir.as_os_str().is_empty() {
            return Err("output_dir cannot be empty".to_string());
        }

        if self.source_page_size == 0 {
            return Err("source_page_size must be > 0".to_string());
        }

        if self.target_page_size == 0 {
            return Err("target_page_size must be > 0".to_string());
        }

        if self.window_days == 0 {
            return Err("window_days must be > 0".to_string());
        }

        if !self.source_base_url.ends_with('/') {
            return Err("source_base_url must end with '/'".to_string());
        }

        Ok(())
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new("output")
    }
}
