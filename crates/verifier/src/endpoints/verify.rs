//! # GET /api/verify
//!
//! 検証オーケストレータ。
//!
//! ## 処理フロー
//! 1. ツイートIDでツイートを取得
//! 2. 本文から署名を取り出す
//! 3. 投稿者ハンドルからEIP-712ペイロードを構築し署名者を復元
//! 4. 復元アドレスと主張アドレスをチェックサム正規化のうえ照合
//! 5. 一致すればレジストリにreconcile、検証されたハンドルを返す
//!
//! どのステップも自動リトライしない。一時的な障害は区別可能なエラー
//! （`UpstreamUnavailable` 等）として面に出し、リクエスト全体の再試行は
//! クライアントが判断する。

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::{Query, State};

use sybil_types::{VerifiedIdentity, VerifyParams};

use crate::config::AppState;
use crate::error::VerifierError;
use crate::parser;
use crate::registry;
use crate::twitter::PostSource;

/// GET /api/verify — ツイート検証とレジストリ更新。
///
/// 成功時は検証されたハンドルを本文として返す。
pub async fn handle_verify(
    State(state): State<Arc<AppState>>,
    Query(params): Query<VerifyParams>,
) -> Result<String, VerifierError> {
    let identity = verify_tweet(state.post_source.as_ref(), &params.id, &params.account).await?;

    // 検証が通ってからレジストリに触れる。検証で弾かれたリクエストは
    // ドキュメントストアへのネットワーク呼び出しを一切起こさない
    let handle = registry::reconcile(state.registry.as_ref(), &identity).await?;

    tracing::info!(
        address = %identity.address,
        handle = %handle,
        tweet_id = %identity.tweet_id,
        "検証が完了しました"
    );

    Ok(handle)
}

/// ツイートを検証し、検証済みアイデンティティを返す。
///
/// レジストリに書き込まれる値は常に復元されたアドレス。主張された
/// アドレスは照合と診断表示にのみ使い、信頼しない。
pub(crate) async fn verify_tweet(
    source: &dyn PostSource,
    tweet_id: &str,
    claimed_address: &str,
) -> Result<VerifiedIdentity, VerifierError> {
    // Step 1: ツイート取得
    let post = source.fetch_post(tweet_id).await?;

    // Step 2: 本文から署名を取り出す
    let sig_hex = parser::extract_signature(&post.body_text)?;

    // Step 3: 投稿者ハンドルに対する署名者を復元する。ハンドルは認証済みの
    // 投稿者フィールド由来であり、ペイロードはハンドルごとに異なるため、
    // 他人のハンドルへの署名再利用はここで弾かれる
    let signature = sybil_crypto::decode_signature(sig_hex)?;
    let recovered = sybil_crypto::recover_signer(&post.author_handle, &signature)?;

    // Step 4: チェックサム正規化後の等値比較（大文字小文字の違いに安全）
    let claimed = sybil_crypto::normalize_address(claimed_address)?;
    if recovered != claimed {
        tracing::warn!(
            recovered = %recovered,
            claimed = %claimed,
            tweet_id = %tweet_id,
            "署名者が一致しません"
        );
        return Err(VerifierError::SignerMismatch {
            claimed: claimed_address.to_string(),
        });
    }

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| VerifierError::Internal(format!("時刻取得失敗: {e}")))?
        .as_millis() as u64;

    Ok(VerifiedIdentity {
        address: recovered,
        handle: post.author_handle,
        tweet_id: post.id,
        timestamp,
    })
}
