use mcp_biprws::client::{AuthType, BiClient, Credentials};
use mcp_biprws::server::BiMcpServer;
use rmcp::transport::sse_server::{SseServer, SseServerConfig};
use std::env;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".to_string().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Get configuration from environment variables
    let base_url =
        env::var("BIPRWS_BASE_URL").unwrap_or_else(|_| "http://localhost:6405".to_string());

    let username = env::var("BIPRWS_USERNAME").unwrap_or_else(|_| "Administrator".to_string());

    let password = env::var("BIPRWS_PASSWORD").unwrap_or_default();

    let auth_type: AuthType = match env::var("BIPRWS_AUTH_TYPE") {
        Ok(value) => value.parse()?,
        Err(_) => AuthType::default(),
    };

    let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:3001".to_string());

    // Log on once to validate the credentials before accepting connections
    tracing::info!("Validating BI platform credentials...");
    let server = BiMcpServer::new(
        BiClient::new(base_url.clone()),
        Credentials::new(username.clone(), password, auth_type),
    );

    if let Err(e) = server.log_on().await {
        tracing::error!("Log-on failed: {}", e);
        tracing::error!("Please verify:");
        tracing::error!("  - BIPRWS_BASE_URL is correct: {}", base_url);
        tracing::error!("  - BIPRWS_USERNAME is correct: {}", username);
        tracing::error!("  - BIPRWS_PASSWORD is correct");
        tracing::error!("  - BIPRWS_AUTH_TYPE matches the account: {}", auth_type);
        tracing::error!("  - The RESTful web services are running and accessible");
        std::process::exit(1);
    }

    tracing::info!("Successfully logged on to {}", base_url);

    // Create server configuration and start SSE server
    let config = SseServerConfig {
        bind: bind_addr.parse()?,
        sse_path: "/sse".to_string(),
        post_path: "/message".to_string(),
        ct: tokio_util::sync::CancellationToken::new(),
        sse_keep_alive: None,
    };

    tracing::info!("BI platform MCP Server listening on {}", config.bind);

    let sse_server = SseServer::serve_with_config(config).await?;

    // Every connection shares the one session
    let service = server.clone();
    let ct = sse_server.with_service(move || service.clone());

    tracing::info!("BI platform MCP Server started successfully");

    // Wait for Ctrl+C
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down...");
    ct.cancel();

    if let Err(e) = server.log_off().await {
        tracing::warn!("Log-off failed: {}", e);
    }

    Ok(())
}
