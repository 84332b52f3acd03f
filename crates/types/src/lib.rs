//! # Sybil Verifier 共有型定義
//!
//! 検証パイプラインとレジストリの間で共有されるデータ構造をRust構造体として提供する。
//!
//! ## エンコーディング規則
//! - アドレス: EIP-55チェックサム形式の文字列（`0x` + 40桁の16進数、大文字小文字混在）
//! - 署名: `0x` + 130桁の16進数（r ‖ s ‖ v の65バイト）
//! - タイムスタンプ: UNIXエポックからのミリ秒

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ツイート（外部所有の読み取り専用レコード）
// ---------------------------------------------------------------------------

/// 取得済みツイート。外部サービスが所有する読み取り専用レコード。
///
/// `author_handle` は認証済みの投稿者フィールドから取る。本文中の文字列は
/// 投稿者が自由に偽装できるため、ハンドルの出典として使ってはならない。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocialPost {
    /// ツイートID
    pub id: String,
    /// 投稿者のハンドル（@なし）
    pub author_handle: String,
    /// ツイート本文（任意のUTF-8。署名トークンを0個または1個含む）
    pub body_text: String,
}

// ---------------------------------------------------------------------------
// Twitter API v2 レスポンス形状
// ---------------------------------------------------------------------------

/// `GET /2/tweets?ids=...&expansions=author_id&user.fields=username` のレスポンス。
///
/// ツイートが存在しない場合、`data` ごと欠落する（エラーHTTPステータスではない）。
#[derive(Debug, Clone, Deserialize)]
pub struct TweetLookupResponse {
    /// ツイート本体の配列（見つからない場合は欠落）
    #[serde(default)]
    pub data: Option<Vec<TweetObject>>,
    /// expansionsで展開された関連オブジェクト（投稿者情報）
    #[serde(default)]
    pub includes: Option<TweetIncludes>,
}

/// ツイート本体。
#[derive(Debug, Clone, Deserialize)]
pub struct TweetObject {
    /// ツイートID
    pub id: String,
    /// ツイート本文
    pub text: String,
    /// 投稿者のユーザーID
    #[serde(default)]
    pub author_id: Option<String>,
}

/// `expansions=author_id` で展開される関連オブジェクト。
#[derive(Debug, Clone, Deserialize)]
pub struct TweetIncludes {
    /// 投稿者ユーザーの配列
    #[serde(default)]
    pub users: Vec<TwitterUser>,
}

/// Twitterユーザー。
#[derive(Debug, Clone, Deserialize)]
pub struct TwitterUser {
    /// ユーザーID
    pub id: String,
    /// ハンドル（@なし）
    pub username: String,
}

// ---------------------------------------------------------------------------
// 検証結果
// ---------------------------------------------------------------------------

/// 検証済みアイデンティティ。署名の復元とアドレス照合を通過した結果。
///
/// `address` は常に署名から復元されたアドレス（EIP-55チェックサム形式）であり、
/// クライアントが主張したアドレスではない。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifiedIdentity {
    /// 復元された署名者アドレス（EIP-55チェックサム形式）
    pub address: String,
    /// 検証されたTwitterハンドル
    pub handle: String,
    /// 根拠となったツイートのID
    pub tweet_id: String,
    /// 検証時刻（UNIXエポックからのミリ秒）
    pub timestamp: u64,
}

// ---------------------------------------------------------------------------
// レジストリドキュメント
// ---------------------------------------------------------------------------

/// レジストリドキュメント全体。アドレス → エントリのJSONオブジェクト。
///
/// 値を `serde_json::Value` のまま保持するのは意図的な設計:
/// このドキュメントは外部所有の共有ファイルであり、本システムが知らない形状の
/// エントリが含まれうる。read-modify-writeの際、書き換え対象以外のエントリを
/// そのまま保存し直すため、値のデコードは行わない。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegistryDocument(pub BTreeMap<String, serde_json::Value>);

impl RegistryDocument {
    /// 検証済みアイデンティティをエントリとして挿入する。
    /// 同一アドレスの既存エントリは上書きされる（last-write-wins）。
    pub fn insert_identity(
        &mut self,
        identity: &VerifiedIdentity,
    ) -> Result<(), serde_json::Error> {
        let entry = RegistryEntry {
            twitter: TwitterAttestation {
                timestamp: identity.timestamp,
                tweet_id: identity.tweet_id.clone(),
                handle: identity.handle.clone(),
            },
        };
        self.0
            .insert(identity.address.clone(), serde_json::to_value(entry)?);
        Ok(())
    }

    /// アドレスのエントリを取得する。
    pub fn get(&self, address: &str) -> Option<&serde_json::Value> {
        self.0.get(address)
    }

    /// エントリ数。
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// エントリが空かどうか。
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// レジストリの1エントリ。プラットフォームごとの検証記録を持つ。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryEntry {
    /// Twitter検証記録
    pub twitter: TwitterAttestation,
}

/// Twitter検証記録。同一アドレスへの再検証で上書きされる（履歴は保持しない）。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwitterAttestation {
    /// 検証時刻（UNIXエポックからのミリ秒）
    pub timestamp: u64,
    /// 根拠となったツイートのID
    #[serde(rename = "tweetID")]
    pub tweet_id: String,
    /// 検証されたハンドル
    pub handle: String,
}

// ---------------------------------------------------------------------------
// リクエストパラメータ
// ---------------------------------------------------------------------------

/// `GET /api/verify` のクエリパラメータ。
#[derive(Debug, Clone, Deserialize)]
pub struct VerifyParams {
    /// ツイートID
    pub id: String,
    /// クライアントが主張する署名者アドレス。
    /// 照合の診断表示にのみ使用され、レジストリには書き込まれない。
    pub account: String,
}
