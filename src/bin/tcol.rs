//! Interactive TCOL shell.
//!
//! A small REPL over the engine facade with a demo registry, useful for
//! exploring the command language without live backends.

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tokio_util::sync::CancellationToken;

use promptgate::logging::{Logger, LoggerConfig};
use promptgate::registry::{MethodDefinition, ObjectDefinition, Registry};
use promptgate::testing::RecordingBackend;
use promptgate::{Engine, Level, LogFormat};
use service_fabric::{ServiceClient, ServiceClientConfig, StaticDiscovery};

#[derive(Parser)]
#[command(name = "tcol", about = "Interactive TCOL shell")]
struct Options {
    /// Log level (trace|debug|info|warn|error|fatal|audit)
    #[arg(long, default_value = "warn")]
    log_level: Level,

    /// Audit log format (json|text|console|logfmt)
    #[arg(long, default_value = "console")]
    log_format: LogFormat,

    /// User id for permission checks and audit records
    #[arg(long)]
    user: Option<String>,
}

fn demo_registry() -> Arc<Registry> {
    let registry = Arc::new(Registry::new());
    for (object, service, methods) in [
        ("CUSTOMER", "customer-service", vec!["LIST", "CREATE", "SEARCH"]),
        ("ORDER", "order-service", vec!["LIST", "CREATE"]),
        ("EXPORT", "export-service", vec!["CSV", "JSON"]),
    ] {
        let mut definition = ObjectDefinition::new(object, service);
        for method in methods {
            definition = definition.with_method(MethodDefinition::new(method));
        }
        registry
            .register_object(definition)
            .expect("demo objects register");
    }
    registry
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let options = Options::parse();

    let registry = demo_registry();
    let client = Arc::new(ServiceClient::new(
        ServiceClientConfig::default(),
        Arc::new(StaticDiscovery::new()),
        Arc::new(RecordingBackend::new()),
    ));
    let audit = Logger::with_writer(
        LoggerConfig {
            min_level: options.log_level,
            format: options.log_format,
            ..LoggerConfig::default()
        },
        Box::new(std::io::stderr()),
    );
    let engine = Engine::new(registry, client).with_audit_logger(audit);

    println!("{}", "tcol shell — try HELP.LIST, exit with ctrl-d".dimmed());
    let mut editor = DefaultEditor::new()?;
    let cancel = CancellationToken::new();

    loop {
        match editor.readline("tcol> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(line);
                match engine.execute(&cancel, options.user.as_deref(), line).await {
                    Ok(result) => {
                        println!(
                            "{} {}",
                            "ok".green().bold(),
                            format!("({} ms)", result.duration.as_millis()).dimmed()
                        );
                        println!("{}", serde_json::to_string_pretty(&result.data)?);
                        if let Some(chain_error) = result.metadata.get("chain_error") {
                            println!("{} {chain_error}", "chain error:".yellow());
                        }
                    }
                    Err(err) => {
                        println!("{} [{}] {err}", "error".red().bold(), err.code());
                        if let Some(suggestion) = err.suggestion() {
                            println!("did you mean {}?", suggestion.cyan());
                        }
                    }
                }
            }
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                eprintln!("readline error: {err}");
                break;
            }
        }
    }
    Ok(())
}
