//! # ツイート本文パーサ
//!
//! 本文中のマーカートークン `sig:` 直後に埋め込まれた署名を取り出す純粋関数。
//! 契約は「マーカー + 固定長の署名16進文字列」のみで、これがパーサの全体。
//!
//! 投稿者情報の欠落（`MissingAuthor`）は取得段階（`twitter`モジュール）で
//! 検出されるため、ここでは本文だけを扱う。

use crate::error::VerifierError;
use sybil_crypto::SIGNATURE_HEX_LEN;

/// 本文中で署名の開始位置を示すマーカートークン。
pub const SIGNATURE_MARKER: &str = "sig:";

/// 本文から署名の16進文字列を取り出す。
///
/// - マーカーが複数ある場合は最初の出現を採用する。
/// - マーカー以降は署名長（`0x` + 130桁 = 132文字）ちょうどに切り詰める。
///   残りが署名長に満たなければ `TruncatedSignature`。
/// - マーカーがなければ `NoSignatureFound`。
///
/// 有効な署名はASCIIのみなので、切り詰め位置がUTF-8文字境界に当たらない
/// 本文は署名として成立しえず、`TruncatedSignature` として扱う。
pub fn extract_signature(body_text: &str) -> Result<&str, VerifierError> {
    let start = body_text
        .find(SIGNATURE_MARKER)
        .ok_or(VerifierError::NoSignatureFound)?
        + SIGNATURE_MARKER.len();

    body_text[start..]
        .get(..SIGNATURE_HEX_LEN)
        .ok_or(VerifierError::TruncatedSignature)
}
