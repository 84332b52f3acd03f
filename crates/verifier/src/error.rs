//! # Verifier エラー型
//!
//! 全エンドポイントで共通のエラー型。
//!
//! ## ステータス分類
//! - クライアント起因（不正なツイート、署名者不一致） → 400
//! - 上流サービスの障害（Twitter / レジストリホスト） → 502。リクエスト全体の再試行可。
//! - 楽観的並行制御の競合 → 409。想定内の回復可能な結果であり、再試行はクライアントが判断する。
//! - レジストリ内容の破損 → 500。書き込まずに中断する（破損の上書きを防ぐ）。

use axum::http::StatusCode;

use sybil_crypto::CryptoError;

/// Verifierエラー型。
#[derive(Debug, thiserror::Error)]
pub enum VerifierError {
    /// 指定IDのツイートが存在しない
    #[error("ツイートが見つかりません: {0}")]
    PostNotFound(String),
    /// ツイートに投稿者情報がない（削除・凍結アカウント等）
    #[error("ツイートに投稿者情報がありません")]
    MissingAuthor,
    /// 本文にマーカートークンがない
    #[error("ツイート本文に署名が含まれていません")]
    NoSignatureFound,
    /// マーカー以降の本文が署名長に満たない
    #[error("ツイート本文の署名が途中で切れています")]
    TruncatedSignature,
    /// 署名の形式不正
    #[error("署名の形式が不正です: {0}")]
    MalformedSignature(String),
    /// 主張されたアドレスの形式不正
    #[error("アドレスの形式が不正です: {0}")]
    InvalidAddress(String),
    /// 復元された署名者が主張されたアドレスと一致しない。
    /// 主張されたアドレスは診断表示のためにのみエコーバックする。
    #[error("署名者が一致しません（主張されたアドレス: {claimed}）")]
    SignerMismatch {
        /// クライアントが主張したアドレス
        claimed: String,
    },
    /// Twitter APIへの接続失敗・タイムアウト
    #[error("ツイートの取得に失敗しました: {0}")]
    UpstreamUnavailable(String),
    /// レジストリホストへの接続失敗・タイムアウト
    #[error("レジストリへのアクセスに失敗しました: {0}")]
    RegistryUnavailable(String),
    /// レジストリ内容がデコードできない。書き込まずに中断する
    #[error("レジストリの内容が破損しています: {0}")]
    CorruptRegistry(String),
    /// 条件付き書き込みがバージョントークンの失効により拒否された
    #[error("レジストリが並行して更新されました。リクエスト全体を再試行してください")]
    VersionConflict,
    /// 内部エラー（シリアライズ失敗等）
    #[error("内部エラー: {0}")]
    Internal(String),
}

impl axum::response::IntoResponse for VerifierError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            VerifierError::PostNotFound(_)
            | VerifierError::MissingAuthor
            | VerifierError::NoSignatureFound
            | VerifierError::TruncatedSignature
            | VerifierError::MalformedSignature(_)
            | VerifierError::InvalidAddress(_)
            | VerifierError::SignerMismatch { .. } => StatusCode::BAD_REQUEST,
            VerifierError::UpstreamUnavailable(_) | VerifierError::RegistryUnavailable(_) => {
                StatusCode::BAD_GATEWAY
            }
            VerifierError::VersionConflict => StatusCode::CONFLICT,
            VerifierError::CorruptRegistry(_) | VerifierError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, self.to_string()).into_response()
    }
}

impl From<CryptoError> for VerifierError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::MalformedSignature(msg) => VerifierError::MalformedSignature(msg),
            CryptoError::RecoveryFailed => {
                VerifierError::MalformedSignature("署名者を復元できません".to_string())
            }
            CryptoError::InvalidAddress(msg) => VerifierError::InvalidAddress(msg),
        }
    }
}
