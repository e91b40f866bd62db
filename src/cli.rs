//! Command-line front end for the manager

use std::collections::HashMap;
use std::panic;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{error, info};

use crate::config::{ConfigArgs, load_config};
use crate::logging::setup_tracing;
use crate::manager::{
    BackendAuth, BackendParams, BackendRequest, BackendTransaction, Manager, SystemRequest,
};
use crate::observability::{MetricsReporter, NoopReporter, PrometheusReporter, init_metrics};
use crate::services::backend::{PROVIDER_KEY, SERVICE_TOKEN};

#[derive(Parser, Debug)]
#[command(name = "apigw-authorizer", version, about = "API gateway authorizer client")]
pub struct Cli {
    #[command(flatten)]
    pub config: ConfigArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print a service's latest proxy configuration as JSON
    FetchConfig(FetchConfigArgs),
    /// Authorize one request and report its usage
    AuthRep(AuthRepArgs),
}

#[derive(Args, Debug)]
pub struct FetchConfigArgs {
    /// Control-plane admin portal URL
    #[arg(long)]
    pub location: String,

    #[arg(long)]
    pub service_id: String,

    /// Configuration environment to fetch (production, staging)
    #[arg(long, default_value = "production")]
    pub environment_name: String,

    #[arg(long, env = "AUTHORIZER_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: String,
}

#[derive(Args, Debug)]
pub struct AuthRepArgs {
    /// Backend base URL
    #[arg(long)]
    pub destination: String,

    /// Service id the usage belongs to
    #[arg(long)]
    pub service: String,

    #[arg(
        long,
        env = "AUTHORIZER_SERVICE_TOKEN",
        hide_env_values = true,
        conflicts_with = "provider_key",
        required_unless_present = "provider_key"
    )]
    pub service_token: Option<String>,

    #[arg(long, env = "AUTHORIZER_PROVIDER_KEY", hide_env_values = true)]
    pub provider_key: Option<String>,

    #[arg(long, default_value = "")]
    pub app_id: String,

    #[arg(long, default_value = "")]
    pub app_key: String,

    #[arg(long, default_value = "")]
    pub user_id: String,

    #[arg(long, default_value = "")]
    pub user_key: String,

    /// Usage as metric=delta, repeatable
    #[arg(long = "metric", value_parser = parse_metric, default_value = "hits=1")]
    pub metrics: Vec<(String, i64)>,
}

fn parse_metric(raw: &str) -> Result<(String, i64), String> {
    let (name, delta) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected metric=delta, got {raw:?}"))?;
    if name.is_empty() {
        return Err("metric name must not be empty".to_string());
    }
    let delta = delta
        .parse::<i64>()
        .map_err(|e| format!("invalid delta for {name}: {e}"))?;
    Ok((name.to_string(), delta))
}

impl AuthRepArgs {
    pub fn to_request(&self) -> BackendRequest {
        let auth = match (&self.service_token, &self.provider_key) {
            (Some(token), _) => BackendAuth {
                auth_type: SERVICE_TOKEN.to_string(),
                value: token.clone(),
            },
            (None, Some(key)) => BackendAuth {
                auth_type: PROVIDER_KEY.to_string(),
                value: key.clone(),
            },
            (None, None) => BackendAuth::default(),
        };

        let mut metrics = HashMap::new();
        for (name, delta) in &self.metrics {
            *metrics.entry(name.clone()).or_insert(0) += delta;
        }

        BackendRequest {
            auth,
            service: self.service.clone(),
            transactions: vec![BackendTransaction {
                metrics,
                params: BackendParams {
                    app_id: self.app_id.clone(),
                    app_key: self.app_key.clone(),
                    user_id: self.user_id.clone(),
                    user_key: self.user_key.clone(),
                },
            }],
        }
    }
}

/// Load configuration, run one command, then shut the manager down.
///
/// Exits with status 2 when the backend answered but did not authorize.
pub async fn run(cli: Cli) -> Result<ExitCode> {
    let config = load_config(&cli.config).context("Failed to load configuration")?;

    setup_tracing(&config.logging).context("Failed to initialize logging")?;

    panic::set_hook(Box::new(|panic_info| {
        error!(?panic_info, "FATAL: Panic occurred");
        std::process::exit(1);
    }));

    let reporter: Arc<dyn MetricsReporter> = match init_metrics(&config.metrics)? {
        Some(_) => Arc::new(PrometheusReporter),
        None => Arc::new(NoopReporter),
    };

    info!(environment = %cli.config.environment, "Authorizer starting");
    let manager = Manager::from_config(&config, Some(reporter))?;

    let outcome = execute(&manager, cli.command).await;
    manager.shutdown().await;
    outcome
}

async fn execute(manager: &Manager, command: Command) -> Result<ExitCode> {
    match command {
        Command::FetchConfig(args) => {
            let request =
                SystemRequest::new(args.access_token, args.service_id, args.environment_name);
            let config = manager
                .get_system_configuration(&args.location, request)
                .await?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::AuthRep(args) => {
            let response = manager
                .auth_rep(&args.destination, args.to_request())
                .await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(if response.authorized {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(2)
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_metric() {
        assert_eq!(parse_metric("hits=1"), Ok(("hits".to_string(), 1)));
        assert_eq!(parse_metric("bytes=-5"), Ok(("bytes".to_string(), -5)));
        assert!(parse_metric("hits").is_err());
        assert!(parse_metric("=1").is_err());
        assert!(parse_metric("hits=many").is_err());
    }

    #[test]
    fn test_auth_rep_args_build_request() {
        let cli = Cli::try_parse_from([
            "apigw-authorizer",
            "auth-rep",
            "--destination",
            "https://su1.3scale.net",
            "--service",
            "42",
            "--service-token",
            "tok",
            "--user-key",
            "uk",
            "--metric",
            "hits=1",
            "--metric",
            "hits=2",
            "--metric",
            "bytes=10",
        ])
        .expect("arguments parse");

        let Command::AuthRep(args) = cli.command else {
            panic!("expected auth-rep");
        };
        let request = args.to_request();
        assert_eq!(request.auth.auth_type, SERVICE_TOKEN);
        assert_eq!(request.service, "42");
        let tx = &request.transactions[0];
        assert_eq!(tx.params.user_key, "uk");
        assert_eq!(tx.metrics["hits"], 3);
        assert_eq!(tx.metrics["bytes"], 10);
    }

    #[test]
    fn test_provider_key_and_service_token_conflict() {
        let result = Cli::try_parse_from([
            "apigw-authorizer",
            "auth-rep",
            "--destination",
            "https://su1.3scale.net",
            "--service",
            "42",
            "--service-token",
            "tok",
            "--provider-key",
            "pk",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_global_options_after_subcommand() {
        let cli = Cli::try_parse_from([
            "apigw-authorizer",
            "fetch-config",
            "--location",
            "https://cp.example.com",
            "--service-id",
            "42",
            "--access-token",
            "tok",
            "--environment",
            "staging",
            "--log-level",
            "debug",
        ])
        .expect("arguments parse");

        assert_eq!(cli.config.environment, "staging");
        assert_eq!(cli.config.log_level.as_deref(), Some("debug"));
        let Command::FetchConfig(args) = cli.command else {
            panic!("expected fetch-config");
        };
        assert_eq!(args.environment_name, "production");
    }
}
