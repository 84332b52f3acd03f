//! # エンドポイント
//!
//! axumハンドラとレスポンス整形（CORS）。

pub mod verify;

pub use verify::handle_verify;

use axum::extract::Request;
use axum::http::{header, HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;

/// すべてのレスポンス（エラー含む）に許可的CORSヘッダを付与するミドルウェア。
pub async fn apply_cors(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;

    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET,HEAD,POST,OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_MAX_AGE,
        HeaderValue::from_static("86400"),
    );
    headers.append(header::VARY, HeaderValue::from_static("Origin"));

    response
}

/// OPTIONSプリフライトへの応答。
///
/// クライアントが要求したヘッダをそのまま許可して返す。プリフライトでない
/// OPTIONSには受け付けるメソッドの一覧だけを返す。
pub async fn handle_preflight(headers: HeaderMap) -> Response {
    let mut response = Response::new(axum::body::Body::empty());

    if let Some(requested) = headers.get(header::ACCESS_CONTROL_REQUEST_HEADERS) {
        response
            .headers_mut()
            .insert(header::ACCESS_CONTROL_ALLOW_HEADERS, requested.clone());
    } else {
        response
            .headers_mut()
            .insert(header::ALLOW, HeaderValue::from_static("GET, HEAD, OPTIONS"));
    }

    response
}
