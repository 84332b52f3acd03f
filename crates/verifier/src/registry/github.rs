//! # GitHubレジストリ実装
//!
//! レジストリドキュメントをGitHubリポジトリ内の1ファイルとして読み書きする。
//! contents APIのブロブSHAがバージョントークンであり、PUT時に古いSHAを
//! 渡すとホスト側で拒否される。これが唯一の並行制御機構で、
//! 分散ロックは存在しない。

use async_trait::async_trait;
use base64::Engine;
use reqwest::StatusCode;
use serde::Deserialize;

use sybil_types::RegistryDocument;

use crate::config::VerifierConfig;
use crate::error::VerifierError;

use super::{RegistryStore, VersionToken};

/// Base64エンジン（Standard）
fn b64() -> base64::engine::GeneralPurpose {
    base64::engine::general_purpose::STANDARD
}

/// `GET /repos/{owner}/{repo}/contents/{path}` のレスポンス。
#[derive(Debug, Deserialize)]
struct ContentsResponse {
    /// Base64エンコードされたファイル内容（GitHubは改行を挟んで返す）
    content: String,
    /// ブロブSHA。バージョントークンとして使う
    sha: String,
}

/// GitHub contents APIによるレジストリストア実装。
pub struct GitHubRegistry {
    /// APIエンドポイント（`https://api.github.com`。テストでは差し替え）
    endpoint: String,
    /// リポジトリオーナー
    owner: String,
    /// リポジトリ名
    repo: String,
    /// レジストリファイルのパス
    path: String,
    /// アクセストークン
    token: String,
    /// User-Agent（GitHub APIでは必須ヘッダ）
    user_agent: String,
    /// HTTPクライアント（タイムアウトはクライアント構築時に設定済み）
    client: reqwest::Client,
}

impl GitHubRegistry {
    /// 設定からレジストリストアを構築する。
    pub fn new(client: reqwest::Client, config: &VerifierConfig) -> Self {
        Self {
            endpoint: config.github_endpoint.clone(),
            owner: config.registry_owner.clone(),
            repo: config.registry_repo.clone(),
            path: config.registry_path.clone(),
            token: config.github_token.clone(),
            user_agent: config.user_agent.clone(),
            client,
        }
    }

    fn contents_url(&self) -> String {
        format!(
            "{}/repos/{}/{}/contents/{}",
            self.endpoint, self.owner, self.repo, self.path
        )
    }
}

#[async_trait]
impl RegistryStore for GitHubRegistry {
    async fn load(&self) -> Result<(RegistryDocument, VersionToken), VerifierError> {
        let response = self
            .client
            .get(self.contents_url())
            .header(reqwest::header::AUTHORIZATION, format!("token {}", self.token))
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .send()
            .await
            .map_err(|e| {
                VerifierError::RegistryUnavailable(format!("レジストリの読み取りに失敗: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(VerifierError::RegistryUnavailable(format!(
                "レジストリホストがエラーを返しました: HTTP {status}"
            )));
        }

        let file: ContentsResponse = response.json().await.map_err(|e| {
            VerifierError::RegistryUnavailable(format!("レスポンスのパースに失敗: {e}"))
        })?;

        // GitHubはbase64本文を改行区切りで返すため、空白類を除いてからデコードする
        let compact: String = file.content.split_whitespace().collect();
        let bytes = b64()
            .decode(compact)
            .map_err(|e| VerifierError::CorruptRegistry(format!("Base64デコード失敗: {e}")))?;

        let document: RegistryDocument = serde_json::from_slice(&bytes)
            .map_err(|e| VerifierError::CorruptRegistry(format!("JSONデコード失敗: {e}")))?;

        Ok((document, VersionToken(file.sha)))
    }

    async fn save(
        &self,
        document: &RegistryDocument,
        expected: &VersionToken,
        message: &str,
    ) -> Result<(), VerifierError> {
        let encoded = serde_json::to_vec(document)
            .map_err(|e| VerifierError::Internal(format!("ドキュメントのシリアライズに失敗: {e}")))?;

        let body = serde_json::json!({
            "message": message,
            "content": b64().encode(&encoded),
            "sha": expected.0,
        });

        let response = self
            .client
            .put(self.contents_url())
            .header(reqwest::header::AUTHORIZATION, format!("token {}", self.token))
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                VerifierError::RegistryUnavailable(format!("レジストリの書き込みに失敗: {e}"))
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        // SHAの失効（並行更新）は409または422で通知される
        if status == StatusCode::CONFLICT || status == StatusCode::UNPROCESSABLE_ENTITY {
            return Err(VerifierError::VersionConflict);
        }

        Err(VerifierError::RegistryUnavailable(format!(
            "レジストリホストが書き込みを拒否しました: HTTP {status}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::Mutex;
    use std::time::Duration;

    use axum::http::HeaderMap;
    use axum::Json;

    const CONTENTS_PATH: &str = "/repos/test-owner/sybil-list/contents/verified.json";
    const CURRENT_SHA: &str = "95b966ae1c166bd92f8ae7d1c313e738c731dfc3";

    /// モックGitHubサーバーの共有状態（PUTされた内容を記録する）
    #[derive(Default)]
    struct MockGitHub {
        put_content: Mutex<Option<String>>,
    }

    /// モックGitHubサーバーを起動してポートを返す。
    /// GETは `raw_content` をbase64（改行区切り）で返し、PUTはSHA一致時のみ受理する。
    async fn start_mock_github(raw_content: &'static str) -> (u16, Arc<MockGitHub>) {
        let mock = Arc::new(MockGitHub::default());

        // GitHub同様、base64本文を60桁ごとの改行区切りで返す
        let encoded = b64().encode(raw_content.as_bytes());
        let wrapped: String = encoded
            .as_bytes()
            .chunks(60)
            .map(|chunk| format!("{}\n", std::str::from_utf8(chunk).unwrap()))
            .collect();

        let app = axum::Router::new()
            .route(
                CONTENTS_PATH,
                axum::routing::get(move |headers: HeaderMap| {
                    let wrapped = wrapped.clone();
                    async move {
                        // 認証とUser-Agentが付いていること
                        assert!(headers
                            .get("authorization")
                            .unwrap()
                            .to_str()
                            .unwrap()
                            .starts_with("token "));
                        assert!(headers.get("user-agent").is_some());

                        Json(serde_json::json!({
                            "content": wrapped,
                            "sha": CURRENT_SHA,
                            "encoding": "base64"
                        }))
                    }
                })
                .put({
                    let mock = mock.clone();
                    move |Json(body): Json<serde_json::Value>| {
                        let mock = mock.clone();
                        async move {
                            if body["sha"].as_str() != Some(CURRENT_SHA) {
                                return (
                                    axum::http::StatusCode::CONFLICT,
                                    Json(serde_json::json!({"message": "sha does not match"})),
                                );
                            }
                            assert!(body["message"].as_str().unwrap().starts_with("Linking "));
                            *mock.put_content.lock().unwrap() =
                                Some(body["content"].as_str().unwrap().to_string());
                            (
                                axum::http::StatusCode::OK,
                                Json(serde_json::json!({"commit": {"sha": "new"}})),
                            )
                        }
                    }
                }),
            );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        (port, mock)
    }

    fn registry(port: u16) -> GitHubRegistry {
        let config = VerifierConfig {
            bind_addr: "127.0.0.1:0".to_string(),
            twitter_endpoint: "http://unused".to_string(),
            twitter_bearer: "unused".to_string(),
            github_endpoint: format!("http://127.0.0.1:{port}"),
            registry_owner: "test-owner".to_string(),
            registry_repo: "sybil-list".to_string(),
            registry_path: "verified.json".to_string(),
            github_token: "test-token".to_string(),
            user_agent: "Sybil Verifier".to_string(),
            request_timeout_secs: 5,
        };
        GitHubRegistry::new(reqwest::Client::new(), &config)
    }

    /// 改行区切りbase64の読み取りとSHAトークンの取得を確認
    #[tokio::test]
    async fn test_load_decodes_wrapped_base64() {
        let (port, _mock) = start_mock_github(
            r#"{"0x0000000000000000000000000000000000000001":
                {"twitter": {"timestamp": 1, "tweetID": "t1", "handle": "a"}}}"#,
        )
        .await;

        let (document, token) = registry(port).load().await.unwrap();
        assert_eq!(document.len(), 1);
        assert_eq!(token.0, CURRENT_SHA);
    }

    /// 読み取ったSHAを条件とした書き込みが受理されることを確認
    #[tokio::test]
    async fn test_save_with_current_token() {
        let (port, mock) = start_mock_github("{}").await;
        let store = registry(port);

        let (mut document, token) = store.load().await.unwrap();
        let identity = sybil_types::VerifiedIdentity {
            address: "0x0000000000000000000000000000000000000001".to_string(),
            handle: "a".to_string(),
            tweet_id: "t1".to_string(),
            timestamp: 1,
        };
        document.insert_identity(&identity).unwrap();

        store
            .save(&document, &token, "Linking 0x... to handle: a")
            .await
            .unwrap();

        // PUTされた内容をデコードして書き込み結果を確認
        let put = mock.put_content.lock().unwrap().clone().unwrap();
        let bytes = b64().decode(put).unwrap();
        let written: RegistryDocument = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(written.len(), 1);
    }

    /// 失効したSHAによる書き込みがVersionConflictになることを確認
    #[tokio::test]
    async fn test_save_with_stale_token() {
        let (port, mock) = start_mock_github("{}").await;
        let store = registry(port);

        let (document, _token) = store.load().await.unwrap();
        let stale = VersionToken("0000000000000000000000000000000000000000".to_string());

        let result = store.save(&document, &stale, "Linking x to handle: y").await;
        assert!(matches!(result, Err(VerifierError::VersionConflict)));
        // 書き込みは行われていない
        assert!(mock.put_content.lock().unwrap().is_none());
    }

    /// JSONとしてデコードできない内容がCorruptRegistryになることを確認
    #[tokio::test]
    async fn test_load_corrupt_content() {
        let (port, _mock) = start_mock_github("definitely not json").await;

        let result = registry(port).load().await;
        assert!(matches!(result, Err(VerifierError::CorruptRegistry(_))));
    }

    /// ホスト障害がRegistryUnavailableになることを確認
    #[tokio::test]
    async fn test_load_host_error() {
        let app = axum::Router::new().route(
            CONTENTS_PATH,
            axum::routing::get(|| async {
                (axum::http::StatusCode::INTERNAL_SERVER_ERROR, "oops")
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        tokio::time::sleep(Duration::from_millis(50)).await;

        let result = registry(port).load().await;
        assert!(matches!(result, Err(VerifierError::RegistryUnavailable(_))));
    }
}
