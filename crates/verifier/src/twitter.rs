//! # ツイート取得
//!
//! ツイート取得元の抽象インターフェースとTwitter API v2実装。
//!
//! ハンドルは必ず `expansions=author_id` で展開された認証済みの投稿者
//! フィールドから取る。本文から取ってはならない。

use async_trait::async_trait;

use sybil_types::{SocialPost, TweetLookupResponse};

use crate::error::VerifierError;

/// ツイート取得元の抽象インターフェース。
///
/// テストではネットワークなしのモック実装に差し替える。
#[async_trait]
pub trait PostSource: Send + Sync {
    /// IDでツイートを取得する。
    ///
    /// - 存在しない場合は `PostNotFound`
    /// - 投稿者情報が欠落している場合（削除・凍結アカウント等）は `MissingAuthor`
    /// - 接続失敗・タイムアウトは `UpstreamUnavailable`
    async fn fetch_post(&self, tweet_id: &str) -> Result<SocialPost, VerifierError>;
}

/// Twitter API v2によるツイート取得実装。
pub struct TwitterApi {
    /// APIエンドポイント（`https://api.twitter.com`。テストでは差し替え）
    endpoint: String,
    /// Bearerトークン
    bearer_token: String,
    /// HTTPクライアント（タイムアウトはクライアント構築時に設定済み）
    client: reqwest::Client,
}

impl TwitterApi {
    /// Twitter API実装を構築する。
    pub fn new(client: reqwest::Client, endpoint: String, bearer_token: String) -> Self {
        Self {
            endpoint,
            bearer_token,
            client,
        }
    }
}

#[async_trait]
impl PostSource for TwitterApi {
    async fn fetch_post(&self, tweet_id: &str) -> Result<SocialPost, VerifierError> {
        let url = format!(
            "{}/2/tweets?ids={}&expansions=author_id&user.fields=username",
            self.endpoint, tweet_id
        );

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.bearer_token)
            .send()
            .await
            .map_err(|e| {
                VerifierError::UpstreamUnavailable(format!("Twitter APIへの接続に失敗: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(VerifierError::UpstreamUnavailable(format!(
                "Twitter APIがエラーを返しました: HTTP {status}"
            )));
        }

        let lookup: TweetLookupResponse = response.json().await.map_err(|e| {
            VerifierError::UpstreamUnavailable(format!("レスポンスのパースに失敗: {e}"))
        })?;

        // 存在しないIDではHTTP 200のままdataごと欠落する
        let tweet = lookup
            .data
            .and_then(|tweets| tweets.into_iter().next())
            .ok_or_else(|| VerifierError::PostNotFound(tweet_id.to_string()))?;

        let author = lookup
            .includes
            .and_then(|includes| includes.users.into_iter().next())
            .ok_or(VerifierError::MissingAuthor)?;

        Ok(SocialPost {
            id: tweet.id,
            author_handle: author.username,
            body_text: tweet.text,
        })
    }
}
