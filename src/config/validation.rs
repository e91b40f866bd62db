use anyhow::Result;
use clap::Args;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use garde::Validate;

use super::AuthorizerConfig;

/// Options shared by every subcommand that shape configuration loading
#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    /// Path to an additional configuration file
    #[arg(long, env = "AUTHORIZER_CONFIG", global = true)]
    pub config: Option<std::path::PathBuf>,

    /// Environment name, selects config/{environment}.toml
    #[arg(long, env = "ENVIRONMENT", default_value = "production", global = true)]
    pub environment: String,

    /// Override the configured log level
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Shorthand for --log-level debug
    #[arg(long, global = true)]
    pub debug: bool,
}

/// Layer the configuration sources, lowest priority first:
/// embedded defaults, config/default.toml, config/{env}.toml,
/// an explicit --config file, AUTHORIZER_* variables, CLI flags.
pub fn build_figment(args: &ConfigArgs) -> Figment {
    let mut figment = Figment::new()
        .merge(Serialized::defaults(AuthorizerConfig::default()))
        .merge(Toml::file("config/default.toml"))
        .merge(Toml::file(format!("config/{}.toml", args.environment)));

    if let Some(path) = &args.config {
        figment = figment.merge(Toml::file(path));
    }

    figment = figment.merge(Env::prefixed("AUTHORIZER_").split("__"));

    if args.debug {
        figment = figment.merge(Serialized::default("logging.level", "debug"));
    }
    if let Some(level) = &args.log_level {
        figment = figment.merge(Serialized::default("logging.level", level));
    }

    figment
}

/// Extract and validate the configuration from a prepared figment
pub fn extract_config(figment: Figment) -> Result<AuthorizerConfig> {
    let config: AuthorizerConfig = figment.extract()?;
    config.validate()?;
    Ok(config)
}

pub fn load_config(args: &ConfigArgs) -> Result<AuthorizerConfig> {
    extract_config(build_figment(args))
}
