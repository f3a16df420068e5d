use colored::Colorize;
use tidegate_cloud::CloudProvider;
use tidegate_cloud_azure::AzureProvider;
use tidegate_core::ConvergeConfig;

/// Check configuration and provider authentication without touching any
/// resource.
pub async fn handle(config: ConvergeConfig) -> anyhow::Result<()> {
    match config.validate() {
        Ok(()) => println!("  {} configuration valid", "✓".green()),
        Err(e) => {
            println!("  {} {}", "✗".red(), e);
            anyhow::bail!("configuration is invalid");
        }
    }

    let provider = AzureProvider::new();
    let auth = provider.check_auth().await?;
    if auth.authenticated {
        println!(
            "  {} authenticated as {}",
            "✓".green(),
            auth.account_info.unwrap_or_else(|| "unknown".to_string())
        );
    } else {
        println!(
            "  {} not authenticated: {}",
            "✗".red(),
            auth.error.unwrap_or_else(|| "unknown".to_string())
        );
        anyhow::bail!("provider authentication failed");
    }

    println!();
    println!(
        "{}",
        format!(
            "Ready to converge scope '{}' (domain {})",
            config.scope, config.domain
        )
        .green()
    );
    Ok(())
}
