use serde::{Deserialize, Serialize};

/// Name of the branch every deployment starts with. A freshly initialized
/// registry always contains a branch with this name and `is_default = true`.
pub const DEFAULT_BRANCH_NAME: &str = "main";

/// Reserved branch name for branch-agnostic data. Edges tagged with this
/// name are in scope for every branch and the name itself is exempt from
/// the regular branch-name character rules.
pub const GLOBAL_BRANCH_NAME: &str = "-global-";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub branch: BranchConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchConfig {
    /// Name used when creating the default branch at registry init
    pub default_branch_name: String,
    /// Whether newly created branches are isolated from their origin by default
    pub default_isolated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            branch: BranchConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for BranchConfig {
    fn default() -> Self {
        Self {
            default_branch_name: DEFAULT_BRANCH_NAME.to_string(),
            default_isolated: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables and config file
    pub fn load() -> anyhow::Result<Self> {
        // Load environment variables from .env file if it exists
        dotenvy::dotenv().ok();

        let mut config = config::Config::builder();

        // Add default configuration
        config = config.add_source(config::Config::try_from(&AppConfig::default())?);

        // Add config file if it exists
        config = config.add_source(config::File::with_name("config").required(false));

        // Add environment variables with prefix "ARBOR_"
        config = config.add_source(
            config::Environment::with_prefix("ARBOR")
                .separator("_")
                .prefix_separator("_"),
        );

        let config = config.build()?;
        let app_config: AppConfig = config.try_deserialize()?;

        Ok(app_config)
    }
}

/// Initialize logging for binaries and tests. Safe to call more than once.
pub fn init_logging(config: &AppConfig) {
    let _ = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.logging.level.as_str()),
    )
    .try_init();
}
