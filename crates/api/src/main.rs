use std::sync::Arc;

use anyhow::Context;
use natours_api::app::{build_app, services};
use natours_api::config::AppConfig;
use natours_infra::LogMailer;
use natours_observability::LogFormat;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let format = match std::env::var("NATOURS_ENV").as_deref() {
        Ok("production") => LogFormat::Json,
        _ => LogFormat::Pretty,
    };
    natours_observability::init(format);

    let config = AppConfig::from_env().context("invalid configuration")?;
    tracing::info!(?config, "starting natours-api");

    let services = Arc::new(
        services::build_services(config.clone(), Arc::new(LogMailer))
            .await
            .context("failed to initialise document store")?,
    );

    if let Some(admin) = &config.admin {
        services::bootstrap_admin(&services, admin)
            .await
            .context("failed to bootstrap administrator")?;
    }

    let app = build_app(services);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("failed to bind 0.0.0.0:{}", config.port))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
