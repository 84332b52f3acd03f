//! # Sybil Verifier 暗号処理
//!
//! EIP-712型付きデータの署名者復元を実装する。純粋関数のみで、I/Oも非同期も持たない。
//!
//! ## 暗号アルゴリズム
//! | 用途 | アルゴリズム |
//! |------|------------|
//! | ハッシュ | Keccak-256 |
//! | 署名復元 | secp256k1 ECDSA（リカバリID付き） |
//! | ペイロード符号化 | EIP-712（ドメインセパレータ + 構造体ハッシュ） |
//! | アドレス正規化 | EIP-55チェックサム |
//!
//! ## ドメイン
//! 署名対象はドメイン `{name: "Sybil Verifier", version: "1"}` の
//! `Permit(string username)`。ドメインセパレータを混ぜることで、署名が
//! このアプリケーション・このハンドル文字列に束縛され、別の文脈や別の
//! ハンドルへの再利用ができなくなる。

use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};
use sha3::{Digest, Keccak256};

/// EIP-712ドメイン名（固定定数）
pub const DOMAIN_NAME: &str = "Sybil Verifier";
/// EIP-712ドメインバージョン（固定定数）
pub const DOMAIN_VERSION: &str = "1";

/// リカバリ可能署名のバイト長（r: 32 ‖ s: 32 ‖ v: 1）
pub const SIGNATURE_LEN: usize = 65;
/// 署名の16進文字列長（`0x` + 130桁）
pub const SIGNATURE_HEX_LEN: usize = 2 + SIGNATURE_LEN * 2;

/// 暗号処理のエラー型。
///
/// 復元は純粋で決定的なため、失敗はその入力に対して恒久的。リトライしない。
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// 署名の形式不正（長さ不一致、16進デコード失敗、不正なリカバリID）
    #[error("署名の形式が不正です: {0}")]
    MalformedSignature(String),
    /// 署名者の復元に失敗
    #[error("署名者の復元に失敗しました")]
    RecoveryFailed,
    /// アドレスの形式不正
    #[error("アドレスの形式が不正です: {0}")]
    InvalidAddress(String),
}

// ---------------------------------------------------------------------------
// Keccak-256
// ---------------------------------------------------------------------------

/// Keccak-256ハッシュを計算する。
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

// ---------------------------------------------------------------------------
// EIP-712 符号化
// ---------------------------------------------------------------------------

/// ドメインセパレータ `hashStruct(EIP712Domain{name, version})` を計算する。
fn domain_separator() -> [u8; 32] {
    let type_hash = keccak256(b"EIP712Domain(string name,string version)");

    let mut buf = Vec::with_capacity(96);
    buf.extend_from_slice(&type_hash);
    buf.extend_from_slice(&keccak256(DOMAIN_NAME.as_bytes()));
    buf.extend_from_slice(&keccak256(DOMAIN_VERSION.as_bytes()));
    keccak256(&buf)
}

/// `hashStruct(Permit{username})` を計算する。
fn permit_struct_hash(username: &str) -> [u8; 32] {
    let type_hash = keccak256(b"Permit(string username)");

    let mut buf = Vec::with_capacity(64);
    buf.extend_from_slice(&type_hash);
    buf.extend_from_slice(&keccak256(username.as_bytes()));
    keccak256(&buf)
}

/// EIP-712署名ダイジェスト `keccak256(0x19 0x01 ‖ domainSeparator ‖ structHash)`
/// を計算する。
///
/// 同一のハンドルは常に同一のダイジェストになる（決定的・単射な符号化）。
pub fn permit_digest(username: &str) -> [u8; 32] {
    let mut buf = Vec::with_capacity(66);
    buf.extend_from_slice(&[0x19, 0x01]);
    buf.extend_from_slice(&domain_separator());
    buf.extend_from_slice(&permit_struct_hash(username));
    keccak256(&buf)
}

// ---------------------------------------------------------------------------
// 署名デコード
// ---------------------------------------------------------------------------

/// デコード済みのリカバリ可能署名。
#[derive(Debug, Clone)]
pub struct RecoverableSignature {
    /// ECDSA署名本体（r ‖ s）
    pub signature: Signature,
    /// リカバリID
    pub recovery_id: RecoveryId,
}

/// `0x` + 130桁の16進文字列を65バイトのリカバリ可能署名にデコードする。
///
/// vは0/1（生のリカバリID）と27/28（Ethereum慣習）の両方を受け付ける。
/// それ以外の長さ・非16進・不正なvは `MalformedSignature`。
pub fn decode_signature(sig_hex: &str) -> Result<RecoverableSignature, CryptoError> {
    let stripped = sig_hex
        .strip_prefix("0x")
        .or_else(|| sig_hex.strip_prefix("0X"))
        .unwrap_or(sig_hex);

    let bytes = hex::decode(stripped)
        .map_err(|e| CryptoError::MalformedSignature(format!("16進デコード失敗: {e}")))?;

    if bytes.len() != SIGNATURE_LEN {
        return Err(CryptoError::MalformedSignature(format!(
            "長さが{}バイトではありません: {}バイト",
            SIGNATURE_LEN,
            bytes.len()
        )));
    }

    let signature = Signature::from_slice(&bytes[..64])
        .map_err(|_| CryptoError::MalformedSignature("r/s成分が不正です".to_string()))?;

    let v = match bytes[64] {
        v @ 0..=1 => v,
        v @ 27..=28 => v - 27,
        v => {
            return Err(CryptoError::MalformedSignature(format!(
                "リカバリIDが不正です: {v}"
            )))
        }
    };
    let recovery_id = RecoveryId::try_from(v)
        .map_err(|_| CryptoError::MalformedSignature(format!("リカバリIDが不正です: {v}")))?;

    Ok(RecoverableSignature {
        signature,
        recovery_id,
    })
}

// ---------------------------------------------------------------------------
// 署名者復元
// ---------------------------------------------------------------------------

/// ハンドルに対するEIP-712署名から署名者のEthereumアドレスを復元する。
///
/// 返り値はEIP-55チェックサム形式。決定的であり、同一の
/// `(username, signature)` は常に同一のアドレスを返す。
pub fn recover_signer(
    username: &str,
    sig: &RecoverableSignature,
) -> Result<String, CryptoError> {
    let digest = permit_digest(username);

    let recovered_key =
        VerifyingKey::recover_from_prehash(&digest, &sig.signature, sig.recovery_id)
            .map_err(|_| CryptoError::RecoveryFailed)?;

    // 非圧縮公開鍵（0x04 ‖ x ‖ y）の0x04を除いた64バイトをKeccak-256し、
    // 末尾20バイトをアドレスとする
    let point = recovered_key.to_encoded_point(false);
    let hash = keccak256(&point.as_bytes()[1..]);

    let mut address = [0u8; 20];
    address.copy_from_slice(&hash[12..]);

    Ok(to_checksum_address(&address))
}

// ---------------------------------------------------------------------------
// EIP-55 チェックサムアドレス
// ---------------------------------------------------------------------------

/// 20バイトのアドレスをEIP-55チェックサム形式の文字列にする。
pub fn to_checksum_address(address: &[u8; 20]) -> String {
    let lower = hex::encode(address);
    let hash = keccak256(lower.as_bytes());

    let mut out = String::with_capacity(42);
    out.push_str("0x");
    for (i, c) in lower.chars().enumerate() {
        // 対応するハッシュのニブルが8以上なら大文字
        let nibble = (hash[i / 2] >> (4 * (1 - i % 2))) & 0x0f;
        if nibble >= 8 {
            out.push(c.to_ascii_uppercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// アドレス文字列をEIP-55チェックサム形式に正規化する。
///
/// 大文字小文字のみが異なる表記は同一の正規形になるため、
/// 正規化後の文字列比較は大文字小文字の違いに対して安全。
/// すでにチェックサム形式の入力に対しては恒等写像。
pub fn normalize_address(address: &str) -> Result<String, CryptoError> {
    let stripped = address
        .strip_prefix("0x")
        .or_else(|| address.strip_prefix("0X"))
        .ok_or_else(|| CryptoError::InvalidAddress("0xプレフィックスがありません".to_string()))?;

    let bytes = hex::decode(stripped)
        .map_err(|e| CryptoError::InvalidAddress(format!("16進デコード失敗: {e}")))?;

    let arr: [u8; 20] = bytes.try_into().map_err(|_| {
        CryptoError::InvalidAddress("長さが20バイトではありません".to_string())
    })?;

    Ok(to_checksum_address(&arr))
}

// ---------------------------------------------------------------------------
// テスト
// ---------------------------------------------------------------------------
