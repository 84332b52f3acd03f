//! # Verifier設定・共有状態
//!
//! 環境変数からの設定読み込みとサーバーの共有状態の定義。
//!
//! 設定は起動時に一度だけ読み込み、明示的な構造体としてコラボレータの
//! 構築に渡す。構築後にプロセス全体の暗黙状態（環境変数等）を読むことはない。

use crate::registry::RegistryStore;
use crate::twitter::PostSource;

/// Twitter API v2 のデフォルトエンドポイント。
pub const DEFAULT_TWITTER_ENDPOINT: &str = "https://api.twitter.com";
/// GitHub API のデフォルトエンドポイント。
pub const DEFAULT_GITHUB_ENDPOINT: &str = "https://api.github.com";

/// Verifierの設定。起動時に環境変数から一度だけ構築される。
#[derive(Debug, Clone)]
pub struct VerifierConfig {
    /// 待ち受けアドレス
    pub bind_addr: String,
    /// Twitter APIエンドポイント（テスト時に差し替え可能）
    pub twitter_endpoint: String,
    /// Twitter API Bearerトークン（必須）
    pub twitter_bearer: String,
    /// GitHub APIエンドポイント（テスト時に差し替え可能）
    pub github_endpoint: String,
    /// レジストリリポジトリのオーナー（必須）
    pub registry_owner: String,
    /// レジストリリポジトリ名
    pub registry_repo: String,
    /// レジストリファイルのパス
    pub registry_path: String,
    /// GitHubアクセストークン（必須）
    pub github_token: String,
    /// GitHub APIに送るUser-Agent
    pub user_agent: String,
    /// 外部呼び出し1回あたりのタイムアウト（秒）
    pub request_timeout_secs: u64,
}

impl VerifierConfig {
    /// 環境変数から構築する。秘密情報は必須、それ以外はデフォルト値を持つ。
    pub fn from_env() -> anyhow::Result<Self> {
        let twitter_bearer = std::env::var("TWITTER_BEARER")
            .map_err(|_| anyhow::anyhow!("TWITTER_BEARERが未設定です"))?;
        let github_token = std::env::var("GITHUB_TOKEN")
            .map_err(|_| anyhow::anyhow!("GITHUB_TOKENが未設定です"))?;
        let registry_owner = std::env::var("REGISTRY_OWNER")
            .map_err(|_| anyhow::anyhow!("REGISTRY_OWNERが未設定です"))?;

        Ok(Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            twitter_endpoint: std::env::var("TWITTER_ENDPOINT")
                .unwrap_or_else(|_| DEFAULT_TWITTER_ENDPOINT.to_string()),
            twitter_bearer,
            github_endpoint: std::env::var("GITHUB_ENDPOINT")
                .unwrap_or_else(|_| DEFAULT_GITHUB_ENDPOINT.to_string()),
            registry_owner,
            registry_repo: std::env::var("REGISTRY_REPO")
                .unwrap_or_else(|_| "sybil-list".to_string()),
            registry_path: std::env::var("REGISTRY_PATH")
                .unwrap_or_else(|_| "verified.json".to_string()),
            github_token,
            user_agent: std::env::var("USER_AGENT")
                .unwrap_or_else(|_| "Sybil Verifier".to_string()),
            request_timeout_secs: std::env::var("REQUEST_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
        })
    }
}

/// サーバーの共有状態。
///
/// リクエスト間で共有される可変状態は持たない。唯一の共有可変リソースは
/// 外部ホストされたレジストリドキュメントであり、`RegistryStore` の
/// 条件付き書き込みだけで並行制御する。
pub struct AppState {
    /// ツイート取得元（トレイトで抽象化）
    pub post_source: std::sync::Arc<dyn PostSource>,
    /// レジストリストア（トレイトで抽象化）
    pub registry: std::sync::Arc<dyn RegistryStore>,
}
