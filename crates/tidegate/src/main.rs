mod commands;

use clap::{Args, Parser, Subcommand};
use std::time::Duration;
use tidegate_cloud::Scope;
use tidegate_core::ConvergeConfig;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tide")]
#[command(about = "Converge a cloud scope to an HTTPS gateway topology", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Converge the scope: certificate, access and HTTPS listener
    Up {
        #[command(flatten)]
        target: TargetArgs,
        /// Rotate the certificate even if the current one is still valid
        #[arg(long, env = "TIDEGATE_FORCE_ROTATE")]
        force_rotate: bool,
        /// Answer yes to renewal prompts (non-interactive)
        #[arg(short, long)]
        yes: bool,
        /// Print the run summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the gateway's current listener configuration
    Status {
        /// Resource group scope
        #[arg(short, long, env = "TIDEGATE_SCOPE")]
        scope: String,
        /// Gateway name (auto-detected when the scope has exactly one)
        #[arg(short, long, env = "TIDEGATE_GATEWAY")]
        gateway: Option<String>,
    },
    /// Validate configuration and provider authentication
    Validate {
        #[command(flatten)]
        target: TargetArgs,
    },
}

#[derive(Args)]
struct TargetArgs {
    /// Resource group scope
    #[arg(short, long, env = "TIDEGATE_SCOPE")]
    scope: String,

    /// Gateway name (auto-detected when the scope has exactly one)
    #[arg(short, long, env = "TIDEGATE_GATEWAY")]
    gateway: Option<String>,

    /// Secret store name (auto-detected, created when the scope has none)
    #[arg(long, env = "TIDEGATE_VAULT")]
    vault: Option<String>,

    /// External domain served by the listener
    #[arg(short, long, env = "TIDEGATE_DOMAIN")]
    domain: String,

    /// Secret name the certificate is stored under
    #[arg(long, env = "TIDEGATE_CERT_NAME", default_value = "gateway-tls")]
    cert_name: String,

    /// Frontend port for the HTTPS listener
    #[arg(short = 'p', long, env = "TIDEGATE_PORT", default_value_t = 443)]
    port: u16,

    /// Remaining validity (days) below which a renewal prompt is shown
    #[arg(long, env = "TIDEGATE_RENEW_WITHIN_DAYS", default_value_t = 30)]
    renew_within_days: i64,

    /// Wait (seconds) after granting access, for authorization propagation
    #[arg(long, env = "TIDEGATE_PROPAGATION_DELAY", default_value_t = 60)]
    propagation_delay: u64,
}

impl TargetArgs {
    fn to_config(&self, force_rotate: bool) -> ConvergeConfig {
        let mut config = ConvergeConfig::new(Scope::new(&self.scope), &self.domain);
        config.gateway_name = self.gateway.clone();
        config.secret_store_name = self.vault.clone();
        config.certificate_name = self.cert_name.clone();
        config.frontend_port = self.port;
        config.force_rotate = force_rotate;
        config.renew_within_days = self.renew_within_days;
        config.propagation_delay = Duration::from_secs(self.propagation_delay);
        config
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Up {
            target,
            force_rotate,
            yes,
            json,
        } => commands::up::handle(target.to_config(force_rotate), yes, json).await,
        Commands::Status { scope, gateway } => commands::status::handle(&scope, gateway).await,
        Commands::Validate { target } => commands::validate::handle(target.to_config(false)).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_falls_back_to_environment() {
        temp_env::with_var("TIDEGATE_SCOPE", Some("env-rg"), || {
            let cli =
                Cli::try_parse_from(["tide", "up", "--domain", "shop.example.com"]).unwrap();
            match cli.command {
                Commands::Up { target, .. } => assert_eq!(target.scope, "env-rg"),
                _ => panic!("expected up"),
            }
        });
    }

    #[test]
    fn test_missing_scope_is_an_error() {
        temp_env::with_var("TIDEGATE_SCOPE", None::<&str>, || {
            let result = Cli::try_parse_from(["tide", "up", "--domain", "shop.example.com"]);
            assert!(result.is_err());
        });
    }

    #[test]
    fn test_flag_overrides_environment() {
        temp_env::with_var("TIDEGATE_SCOPE", Some("env-rg"), || {
            let cli = Cli::try_parse_from([
                "tide",
                "up",
                "--scope",
                "flag-rg",
                "--domain",
                "shop.example.com",
            ])
            .unwrap();
            match cli.command {
                Commands::Up { target, .. } => assert_eq!(target.scope, "flag-rg"),
                _ => panic!("expected up"),
            }
        });
    }
}
