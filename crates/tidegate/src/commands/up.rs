use chrono::{DateTime, Utc};
use colored::Colorize;
use std::io::Write as _;
use std::sync::Arc;
use tidegate_cloud::SystemClock;
use tidegate_cloud_azure::AzureProvider;
use tidegate_core::{ConvergeConfig, Orchestrator, Outcome, RenewalPrompt, StaticPrompt, Summary};

pub async fn handle(config: ConvergeConfig, yes: bool, json: bool) -> anyhow::Result<()> {
    println!(
        "{}",
        format!(
            "Converging scope '{}' to HTTPS on port {}...",
            config.scope, config.frontend_port
        )
        .blue()
        .bold()
    );

    let provider = Arc::new(AzureProvider::new());
    let clock = Arc::new(SystemClock);
    let prompt: Arc<dyn RenewalPrompt> = if yes {
        Arc::new(StaticPrompt(true))
    } else {
        Arc::new(StdinPrompt)
    };

    let orchestrator = Orchestrator::new(provider, clock, prompt);
    match orchestrator.run(&config).await {
        Ok(summary) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print_summary(&summary);
            }
            Ok(())
        }
        Err(err) => {
            eprintln!();
            eprintln!("{} {}", "Convergence failed:".red().bold(), err);
            eprintln!(
                "{}",
                "State was left as-is; re-run after fixing the cause to resume.".yellow()
            );
            Err(err.into())
        }
    }
}

fn print_summary(summary: &Summary) {
    println!();
    for report in &summary.reports {
        let glyph = match report.outcome {
            Outcome::Unchanged => "-".normal(),
            Outcome::Created | Outcome::Updated | Outcome::Rotated => "✓".green(),
        };
        println!(
            "  {} {} {} ({})",
            glyph,
            report.phase.to_string().cyan(),
            report.detail,
            report.outcome
        );
    }
    println!();
    if summary.changed {
        println!(
            "{}",
            format!(
                "Converged: {} now serves https listener {} via {}",
                summary.gateway, summary.listener, summary.secret_ref
            )
            .green()
            .bold()
        );
    } else {
        println!(
            "{}",
            format!("Already converged: {} is up to date", summary.gateway).green()
        );
    }
}

/// Interactive renewal confirmation on stdin.
struct StdinPrompt;

impl RenewalPrompt for StdinPrompt {
    fn confirm_renewal(&self, secret_name: &str, expires_at: DateTime<Utc>) -> bool {
        print!(
            "{}",
            format!(
                "Certificate '{}' expires {}. Renew now? [y/N] ",
                secret_name,
                expires_at.format("%Y-%m-%d")
            )
            .yellow()
        );
        let _ = std::io::stdout().flush();
        let mut answer = String::new();
        if std::io::stdin().read_line(&mut answer).is_err() {
            return false;
        }
        matches!(answer.trim(), "y" | "Y" | "yes")
    }
}
