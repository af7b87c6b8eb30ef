mod archive;
mod auth;
mod config;
mod error;
mod graph;
mod models;
mod pipeline;

use crate::archive::SqliteArchive;
use crate::auth::TokenProvider;
use crate::config::{GraphSecrets, Settings};
use crate::graph::GraphClient;
use crate::pipeline::Pipeline;
use anyhow::Context;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let debug_logging = args.iter().any(|arg| arg == "--debug");
    let filter = if debug_logging {
        EnvFilter::new("mailsweep=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let settings = Settings::load(settings_path(&args))?;
    info!(accounts = settings.accounts.len(), "configuration loaded");

    // Credential problems are fatal; nothing gets processed without them.
    let secrets = GraphSecrets::load(&settings.graph.secrets_file)?;

    let https = hyper_rustls::HttpsConnectorBuilder::new()
        .with_native_roots()
        .context("failed to load native TLS roots")?
        .https_only()
        .enable_http1()
        .build();
    let http = hyper::Client::builder().build(https);

    let auth = Arc::new(TokenProvider::new(
        http.clone(),
        &settings.graph.login_endpoint,
        secrets,
    ));
    let client = GraphClient::new(http, auth, &settings.graph.endpoint);

    let archive = SqliteArchive::new(&settings.archive.database_url).await?;
    archive.run_migrations().await?;

    let pipeline = Pipeline::new(
        &client,
        &archive,
        settings.archive.on_failure,
        settings.graph.page_size,
    );

    let run_started = Instant::now();
    let mut total_deleted = 0usize;
    for account in &settings.accounts {
        info!(account = %account.email, "starting account");
        let summary = pipeline.run_account(account).await;
        total_deleted += summary.total();
    }

    info!(
        accounts = settings.accounts.len(),
        total_deleted,
        elapsed_ms = run_started.elapsed().as_millis() as u64,
        "run complete"
    );

    Ok(())
}

fn settings_path(args: &[String]) -> String {
    args.iter()
        .position(|arg| arg == "--config")
        .and_then(|i| args.get(i + 1))
        .cloned()
        .unwrap_or_else(|| "mailsweep.toml".to_string())
}

#[cfg(test)]
mod tests {
    use super::settings_path;

    #[test]
    fn settings_path_defaults_and_overrides() {
        let default_args = vec!["mailsweep".to_string()];
        assert_eq!(settings_path(&default_args), "mailsweep.toml");

        let custom: Vec<String> = ["mailsweep", "--debug", "--config", "/etc/sweep.toml"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(settings_path(&custom), "/etc/sweep.toml");
    }
}
