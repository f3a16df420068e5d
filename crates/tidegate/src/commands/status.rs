use colored::Colorize;
use tidegate_cloud::{
    CloudProvider, Protocol, ResourceKind, RetryPolicy, Scope, SystemClock,
};
use tidegate_cloud_azure::AzureProvider;
use tidegate_core::locate;

/// Read-only report of the gateway's listener configuration.
pub async fn handle(scope: &str, gateway_name: Option<String>) -> anyhow::Result<()> {
    let provider = AzureProvider::new();
    let clock = SystemClock;
    let scope = Scope::new(scope);

    let gateway = locate(
        &provider,
        &clock,
        &RetryPolicy::default(),
        &scope,
        ResourceKind::Gateway,
        gateway_name.as_deref(),
    )
    .await?;
    let state = provider.describe_gateway(&gateway).await?;

    println!("{}", format!("Gateway: {}", gateway.name).bold());
    println!();

    if state.listeners.is_empty() {
        println!("  (no listeners configured)");
    }
    for listener in &state.listeners {
        let scheme = match listener.protocol {
            Protocol::Https => "https".green(),
            Protocol::Http => "http".yellow(),
        };
        let certificate = listener
            .certificate
            .as_ref()
            .map(|c| format!(" cert={c}"))
            .unwrap_or_default();
        let host = listener
            .host_name
            .as_deref()
            .map(|h| format!(" host={h}"))
            .unwrap_or_default();
        let routed = if state.rule_for_listener(&listener.name).is_some() {
            "routed"
        } else {
            "unrouted"
        };
        println!(
            "  • {} :{} {}{}{} [{}]",
            listener.name.cyan(),
            listener.frontend_port,
            scheme,
            certificate,
            host,
            routed
        );
    }

    println!();
    println!(
        "  backend: {} ({}{})",
        state.backend.name,
        state.backend.protocol,
        state
            .backend
            .host_header
            .as_deref()
            .map(|h| format!(", host {h}"))
            .unwrap_or_default()
    );

    Ok(())
}
