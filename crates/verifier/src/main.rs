//! # Sybil Verifier
//!
//! ツイートに埋め込まれたEIP-712署名を検証し、Ethereumアドレスと
//! Twitterハンドルの対応をGitHubホストのレジストリに記録するサービス。
//!
//! ## 起動
//!
//! ```bash
//! TWITTER_BEARER=... GITHUB_TOKEN=... REGISTRY_OWNER=... cargo run
//! ```

use std::sync::Arc;
use std::time::Duration;

use crate::config::{AppState, VerifierConfig};
use crate::registry::GitHubRegistry;
use crate::twitter::TwitterApi;

mod config;
mod endpoints;
mod error;
mod parser;
mod registry;
mod twitter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = VerifierConfig::from_env()?;

    // 外部呼び出し共通のHTTPクライアント。タイムアウトはここで一括設定する
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .build()?;

    let state = Arc::new(AppState {
        post_source: Arc::new(TwitterApi::new(
            client.clone(),
            config.twitter_endpoint.clone(),
            config.twitter_bearer.clone(),
        )),
        registry: Arc::new(GitHubRegistry::new(client, &config)),
    });

    let app = axum::Router::new()
        .route(
            "/api/verify",
            axum::routing::get(endpoints::handle_verify).options(endpoints::handle_preflight),
        )
        .layer(axum::middleware::from_fn(endpoints::apply_cors))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(
        addr = %config.bind_addr,
        registry = %format!("{}/{}/{}", config.registry_owner, config.registry_repo, config.registry_path),
        "Sybil Verifierを起動します"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
