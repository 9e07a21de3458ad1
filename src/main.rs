use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use approvals::client::{self, connection, http::ApiClient, views, LocalDecision};
use approvals::models::notification::{Audience, ADMINS_GROUP};
use approvals::models::request::{Decision, Request};
use approvals::notification::{local::LocalRelay, webpubsub::WebPubSubRelay, Relay};
use approvals::store::{memory::MemoryStore, postgres::PgStore, RequestStore};
use approvals::{api, config, AppState};

mod cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing()?;

    let args = cli::Cli::parse();

    let result = match args.command {
        Some(cli::Commands::Serve { port }) => {
            let cfg = config::load()?;
            let port = port.unwrap_or(cfg.port);
            run_server(cfg, port).await
        }
        Some(cli::Commands::Migrate) => {
            let cfg = config::load()?;
            let url = cfg
                .database_url
                .as_deref()
                .context("DATABASE_URL must be set to run migrations")?;
            let db = PgStore::connect(url).await?;
            db.migrate().await?;
            println!("Migrations applied.");
            Ok(())
        }
        Some(cli::Commands::Request { server, command }) => {
            handle_request_command(&ApiClient::new(&server), command).await
        }
        Some(cli::Commands::Watch { server, command }) => {
            handle_watch_command(&ApiClient::new(&server), command).await
        }
        None => {
            let cfg = config::load()?;
            let port = cfg.port;
            run_server(cfg, port).await
        }
    };

    if let Err(ref e) = result {
        eprintln!("Error: {:?}", e);
    }
    result
}

fn init_tracing() -> anyhow::Result<()> {
    use opentelemetry::KeyValue;
    use opentelemetry_sdk::{trace as sdktrace, Resource};

    // OTLP export only when an endpoint is configured
    let telemetry_layer = if std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok() {
        let tracer = opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(opentelemetry_otlp::new_exporter().tonic())
            .with_trace_config(sdktrace::config().with_resource(Resource::new(vec![
                KeyValue::new("service.name", "approvals"),
            ])))
            .install_batch(opentelemetry_sdk::runtime::Tokio)
            .context("failed to install OpenTelemetry tracer")?;
        Some(tracing_opentelemetry::layer().with_tracer(tracer))
    } else {
        None
    };

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let (json_layer, text_layer) = if json {
        (Some(tracing_subscriber::fmt::layer().json()), None)
    } else {
        (None, Some(tracing_subscriber::fmt::layer()))
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "approvals=debug,tower_http=debug".into()),
        ))
        .with(json_layer)
        .with(text_layer)
        .with(telemetry_layer)
        .init();
    Ok(())
}

async fn run_server(cfg: config::Config, port: u16) -> anyhow::Result<()> {
    let store: Arc<dyn RequestStore> = match cfg.database_url.as_deref() {
        Some(url) => {
            tracing::info!("Connecting to database...");
            let db = PgStore::connect(url).await?;
            tracing::info!("Running migrations...");
            db.migrate().await?;
            Arc::new(db)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory store (data is lost on restart)");
            Arc::new(MemoryStore::new())
        }
    };

    let relay: Arc<dyn Relay> = match cfg.relay_connection_string.as_deref() {
        Some(conn) => {
            let relay = WebPubSubRelay::new(conn, &cfg.relay_hub, cfg.relay_token_ttl())?;
            tracing::info!(hub = relay.hub(), "Using managed relay");
            Arc::new(relay)
        }
        None => {
            tracing::warn!(
                "RELAY_CONNECTION_STRING not set, using in-process relay (negotiate is unavailable)"
            );
            Arc::new(LocalRelay::new())
        }
    };

    let state = AppState::new(store, relay, cfg);
    tracing::info!(policy = ?state.service.policy(), "Status transition policy");
    let app = api::app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Approvals server listening on {}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}

fn print_request_row(r: &Request) {
    let name = if r.name.chars().count() > 20 {
        format!("{}...", r.name.chars().take(17).collect::<String>())
    } else {
        r.name.clone()
    };
    println!(
        "{:<38} {:<10} {:<22} {}",
        r.id,
        r.status,
        name,
        r.created_at.format("%Y-%m-%d %H:%M:%S")
    );
}

async fn handle_request_command(api: &ApiClient, cmd: cli::RequestCommands) -> anyhow::Result<()> {
    match cmd {
        cli::RequestCommands::Create { name, message } => {
            let r = api.create(&name, &message).await?;
            println!("Request created.");
            println!("ID:     {}", r.id);
            println!("Status: {}", r.status);
        }
        cli::RequestCommands::List => {
            let requests = api.list().await?;
            if requests.is_empty() {
                println!("No requests.");
                return Ok(());
            }
            println!("{:<38} {:<10} {:<22} CREATED", "ID", "STATUS", "NAME");
            for r in &requests {
                print_request_row(r);
            }
        }
        cli::RequestCommands::Get { id } => match api.get(id).await? {
            Some(r) => {
                println!("ID:      {}", r.id);
                println!("Name:    {}", r.name);
                println!("Message: {}", r.message);
                println!("Status:  {}", r.status);
                println!("Created: {}", r.created_at.to_rfc3339());
                println!("Updated: {}", r.updated_at.to_rfc3339());
            }
            None => println!("Request {} not found.", id),
        },
        cli::RequestCommands::Approve { id } => {
            let r = api.decide(id, Decision::Approved).await?;
            println!("Request {} {}.", r.id, r.status);
        }
        cli::RequestCommands::Reject { id } => {
            let r = api.decide(id, Decision::Rejected).await?;
            println!("Request {} {}.", r.id, r.status);
        }
    }
    Ok(())
}

fn redraw(screen: &str) {
    // clear and home the cursor
    print!("\x1B[2J\x1B[H{}", screen);
}

/// Read `a <id>` / `r <id>` lines from stdin and send each decision's
/// outcome to the dashboard.
async fn read_decisions(api: ApiClient, tx: mpsc::Sender<LocalDecision>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!("failed to read dashboard input: {}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        let outcome = match views::parse_decision(&line) {
            Ok((id, decision)) => api
                .decide(id, decision)
                .await
                .map_err(|e| format!("{:?} {} failed: {:#}", decision, id, e)),
            Err(msg) => Err(msg),
        };
        if tx.send(outcome).await.is_err() {
            break;
        }
    }
}

async fn handle_watch_command(api: &ApiClient, cmd: cli::WatchCommands) -> anyhow::Result<()> {
    match cmd {
        cli::WatchCommands::Dashboard => {
            let mut view = views::Dashboard::new();
            redraw(&view.render());
            view.loaded(api.list().await?);

            let endpoint = api.negotiate("admin").await?;
            let subscription = connection::connect(&endpoint.url, vec![ADMINS_GROUP.to_string()])
                .await
                .context("failed to connect to relay")?;

            let (decision_tx, decision_rx) = mpsc::channel(8);
            let input = tokio::spawn(read_decisions(api.clone(), decision_tx));

            tokio::select! {
                _ = client::follow_with_decisions(
                    &mut view,
                    subscription,
                    Some(decision_rx),
                    |v| redraw(&v.render()),
                ) => {}
                _ = tokio::signal::ctrl_c() => {}
            }
            input.abort();
        }
        cli::WatchCommands::Status { id } => {
            let mut view = views::StatusPage::new(id);
            redraw(&view.render());
            view.loaded(api.get(id).await?);

            let endpoint = api.negotiate(&format!("user-{}", id)).await?;
            let group = Audience::Requester(id).group();
            let subscription = connection::connect(&endpoint.url, vec![group])
                .await
                .context("failed to connect to relay")?;

            tokio::select! {
                _ = client::follow(&mut view, subscription, |v| redraw(&v.render())) => {}
                _ = tokio::signal::ctrl_c() => {}
            }
        }
    }
    println!();
    Ok(())
}
