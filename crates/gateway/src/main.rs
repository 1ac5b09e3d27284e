use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use agentrt_domain::config::ConfigSeverity;
use agentrt_gateway::cli::{Cli, Command, ConfigCommand};
use agentrt_gateway::config::GatewayConfig;
use agentrt_gateway::{api, state};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        // Default to serve when no subcommand is given.
        None | Some(Command::Serve) => {
            let (config, _config_path) = agentrt_gateway::cli::load_config()?;
            init_tracing(config.core.observability.otlp_endpoint.as_deref());
            run_server(Arc::new(config)).await
        }
        Some(Command::Doctor) => {
            let (config, config_path) = agentrt_gateway::cli::load_config()?;
            let passed = agentrt_gateway::cli::doctor::run(&config, &config_path).await?;
            if !passed {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Validate)) => {
            let (config, config_path) = agentrt_gateway::cli::load_config()?;
            let valid = agentrt_gateway::cli::config::validate(&config, &config_path);
            if !valid {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Show)) => {
            let (config, _config_path) = agentrt_gateway::cli::load_config()?;
            agentrt_gateway::cli::config::show(&config);
            Ok(())
        }
        Some(Command::Version) => {
            println!("agentrt {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Initialize the JSON subscriber and, when compiled with the `otlp`
/// feature and `otlp_endpoint` is configured, layer in an OTLP exporter
/// alongside it. Without the feature or the endpoint, tracing stays on the
/// plain JSON formatter.
fn init_tracing(otlp_endpoint: Option<&str>) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,agentrt_gateway=debug"));

    #[cfg(feature = "otlp")]
    {
        use tracing_subscriber::layer::SubscriberExt;
        use tracing_subscriber::util::SubscriberInitExt;

        if let Some(endpoint) = otlp_endpoint {
            match build_otlp_layer(endpoint) {
                Ok(otel_layer) => {
                    tracing_subscriber::registry()
                        .with(env_filter)
                        .with(tracing_subscriber::fmt::layer().json())
                        .with(otel_layer)
                        .init();
                    return;
                }
                Err(e) => {
                    eprintln!("failed to initialize OTLP exporter, falling back to plain logging: {e}");
                }
            }
        }
    }

    let _ = otlp_endpoint;
    tracing_subscriber::fmt().with_env_filter(env_filter).json().init();
}

#[cfg(feature = "otlp")]
fn build_otlp_layer(
    endpoint: &str,
) -> anyhow::Result<tracing_opentelemetry::OpenTelemetryLayer<tracing_subscriber::Registry, opentelemetry_sdk::trace::Tracer>>
{
    use opentelemetry::trace::TracerProvider;
    use opentelemetry_otlp::WithExportConfig;

    let exporter = opentelemetry_otlp::new_exporter().tonic().with_endpoint(endpoint);
    let provider = opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(exporter)
        .with_trace_config(opentelemetry_sdk::trace::config().with_resource(opentelemetry_sdk::Resource::new(
            vec![opentelemetry::KeyValue::new("service.name", "agentrt-gateway")],
        )))
        .install_batch(opentelemetry_sdk::runtime::Tokio)
        .context("installing OTLP batch exporter")?;

    let tracer = provider.tracer("agentrt-gateway");
    Ok(tracing_opentelemetry::layer().with_tracer(tracer))
}

/// Start the gateway server with the given configuration.
async fn run_server(config: Arc<GatewayConfig>) -> anyhow::Result<()> {
    tracing::info!("agentrt starting");

    // ── Config validation ────────────────────────────────────────────
    let issues = config.core.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues.iter().filter(|i| i.severity == ConfigSeverity::Error).count()
        );
    }

    // ── Application state (collaborators, stores, LLM router) ────────
    let app_state = state::build_app_state(config.clone())
        .await
        .context("building application state")?;

    // ── Router ───────────────────────────────────────────────────────
    let app = api::router(app_state).layer(TraceLayer::new_for_http());

    // ── Bind ─────────────────────────────────────────────────────────
    let addr = format!("{}:{}", config.http.host, config.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;

    tracing::info!(addr = %addr, "agentrt listening");

    axum::serve(listener, app).await.context("axum server error")?;

    Ok(())
}
