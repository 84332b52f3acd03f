//! # レジストリ
//!
//! 共有レジストリドキュメントの抽象インターフェースと、検証結果を
//! 楽観的並行制御で反映するreconcile操作。GitHub contents API実装は
//! `github` サブモジュールを参照。

pub mod github;

pub use github::GitHubRegistry;

use async_trait::async_trait;

use sybil_types::{RegistryDocument, VerifiedIdentity};

use crate::error::VerifierError;

/// バージョントークン。ドキュメントの特定の状態を識別する不透明な値。
///
/// ホストが読み取り時に供給し、書き込み時に必須となる。読み取りと書き込みの
/// 間に別の書き手が更新していれば、このトークンの失効として検出される。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionToken(pub String);

/// レジストリストアの抽象インターフェース。
///
/// ドキュメント全体の読み取りと、バージョントークンを条件とする
/// 全体書き込みのみを提供する。部分書き込みはない（all-or-nothing）。
#[async_trait]
pub trait RegistryStore: Send + Sync {
    /// 現在のドキュメントとバージョントークンを読み取る。
    ///
    /// - 内容がデコードできない場合は `CorruptRegistry`（書き込み前に中断する）
    /// - 接続失敗・タイムアウトは `RegistryUnavailable`
    async fn load(&self) -> Result<(RegistryDocument, VersionToken), VerifierError>;

    /// ドキュメント全体を条件付きで書き込む。
    ///
    /// `expected` が読み取り時のトークンと一致しない場合（並行更新があった場合）、
    /// `VersionConflict` で失敗し、ドキュメントは変更されない。
    async fn save(
        &self,
        document: &RegistryDocument,
        expected: &VersionToken,
        message: &str,
    ) -> Result<(), VerifierError>;
}

/// 検証済みアイデンティティをレジストリに反映する。
///
/// read-modify-conditional-write を1回だけ試行する。`VersionConflict` の
/// 内部リトライは意図的に持たない（リクエスト遅延を抑え、再試行の判断を
/// 呼び出し側に委ねる）。成功時は検証されたハンドルを返す。
pub async fn reconcile(
    store: &dyn RegistryStore,
    identity: &VerifiedIdentity,
) -> Result<String, VerifierError> {
    // 読み取り → 変更 → 条件付き書き込みの厳密な順序。変更はこのリクエストの
    // スタック上のコピーに対して行い、最後の書き込みまで共有状態には触れない
    let (mut document, token) = store.load().await?;

    document
        .insert_identity(identity)
        .map_err(|e| VerifierError::Internal(format!("エントリのシリアライズに失敗: {e}")))?;

    let message = format!(
        "Linking {} to handle: {}",
        identity.address, identity.handle
    );
    store.save(&document, &token, &message).await?;

    tracing::info!(
        address = %identity.address,
        handle = %identity.handle,
        tweet_id = %identity.tweet_id,
        "レジストリを更新しました"
    );

    Ok(identity.handle.clone())
}


#[cfg(test)]
mod tests {
    use super::testing::InMemoryRegistry;
    use super::*;
    use std::sync::atomic::Ordering;

    fn identity(address: &str, handle: &str) -> VerifiedIdentity {
        VerifiedIdentity {
            address: address.to_string(),
            handle: handle.to_string(),
            tweet_id: "1298715677652320257".to_string(),
            timestamp: 1598472521342,
        }
    }

    /// reconcileが既存エントリを保存したまま新しいエントリを追加することを確認
    #[tokio::test]
    async fn test_reconcile_adds_entry() {
        let store = InMemoryRegistry::new(
            r#"{"0x0000000000000000000000000000000000000001":
                {"twitter": {"timestamp": 1, "tweetID": "t1", "handle": "a"}}}"#,
        );

        let handle = reconcile(
            &store,
            &identity("0x0000000000000000000000000000000000000002", "b"),
        )
        .await
        .unwrap();

        assert_eq!(handle, "b");
        let doc = store.current();
        assert_eq!(doc.len(), 2);
        assert_eq!(
            doc.get("0x0000000000000000000000000000000000000002").unwrap()["twitter"]["handle"],
            "b"
        );
        // 既存エントリが残っている
        assert_eq!(
            doc.get("0x0000000000000000000000000000000000000001").unwrap()["twitter"]["handle"],
            "a"
        );
    }

    /// 破損したレジストリ内容で書き込まずに中断することを確認
    #[tokio::test]
    async fn test_reconcile_corrupt_registry() {
        let store = InMemoryRegistry::new("this is not json");

        let result = reconcile(
            &store,
            &identity("0x0000000000000000000000000000000000000001", "a"),
        )
        .await;

        assert!(matches!(result, Err(VerifierError::CorruptRegistry(_))));
        // 破損した内容はそのまま（上書きされていない）
        assert_eq!(store.content_raw(), "this is not json");
    }

    /// 同一バージョンを読んだ2つの書き手のうち、1つだけが勝つことを確認。
    /// 敗者はVersionConflictを受け取り、ドキュメントは勝者の更新と正確に一致する。
    #[tokio::test]
    async fn test_optimistic_concurrency_single_winner() {
        let store = InMemoryRegistry::new("{}");

        // 両者が同じバージョンV0を読む
        let (mut doc_a, token_a) = store.load().await.unwrap();
        let (mut doc_b, token_b) = store.load().await.unwrap();
        assert_eq!(token_a, token_b);

        let id_a = identity("0x0000000000000000000000000000000000000001", "a");
        let id_b = identity("0x0000000000000000000000000000000000000002", "b");
        doc_a.insert_identity(&id_a).unwrap();
        doc_b.insert_identity(&id_b).unwrap();

        // 先に着いた書き込みが勝つ
        store.save(&doc_a, &token_a, "first").await.unwrap();
        let loser = store.save(&doc_b, &token_b, "second").await;
        assert!(matches!(loser, Err(VerifierError::VersionConflict)));

        // 最終状態は勝者の更新そのもの（部分的なマージは起きない）
        let doc = store.current();
        assert_eq!(doc.len(), 1);
        assert!(doc.get(&id_a.address).is_some());
        assert!(doc.get(&id_b.address).is_none());
    }

    /// 並行更新が挟まったreconcileがVersionConflictを面に出し、
    /// ドキュメントが壊れないことを確認
    #[tokio::test]
    async fn test_reconcile_version_conflict() {
        let store = InMemoryRegistry::new(
            r#"{"0x0000000000000000000000000000000000000001":
                {"twitter": {"timestamp": 1, "tweetID": "t1", "handle": "a"}}}"#,
        );
        store.conflict_once.store(true, Ordering::SeqCst);

        let result = reconcile(
            &store,
            &identity("0x0000000000000000000000000000000000000002", "b"),
        )
        .await;

        assert!(matches!(result, Err(VerifierError::VersionConflict)));
        // 既存エントリは無傷
        let doc = store.current();
        assert_eq!(doc.len(), 1);
        assert_eq!(
            doc.get("0x0000000000000000000000000000000000000001").unwrap()["twitter"]["handle"],
            "a"
        );
    }

    /// 同一アドレスへの再検証で上書きされることを確認（last-write-wins）
    #[tokio::test]
    async fn test_reconcile_overwrites_same_address() {
        let store = InMemoryRegistry::new("{}");
        let addr = "0x0000000000000000000000000000000000000001";

        reconcile(&store, &identity(addr, "old_handle")).await.unwrap();
        reconcile(&store, &identity(addr, "new_handle")).await.unwrap();

        let doc = store.current();
        assert_eq!(doc.len(), 1);
        assert_eq!(doc.get(addr).unwrap()["twitter"]["handle"], "new_handle");
    }
}
