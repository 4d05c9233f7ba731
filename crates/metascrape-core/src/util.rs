use encoding_rs::EUC_JP;
use url::Url;

/// Decode a legacy EUC-JP page into UTF-8.
///
/// Malformed sequences become U+FFFD and the rest of the page is kept. A page
/// that is not EUC-JP at all but is valid UTF-8 is returned as served.
/// Never fails.
pub fn euc_jp_to_utf8(bytes: &[u8]) -> String {
    let (text, _, had_errors) = EUC_JP.decode(bytes);
    if had_errors {
        if let Ok(utf8) = std::str::from_utf8(bytes) {
            tracing::debug!(bytes = bytes.len(), "Page is not EUC-JP, keeping UTF-8 text");
            return utf8.to_owned();
        }
        tracing::debug!(bytes = bytes.len(), "Malformed EUC-JP bytes replaced");
    }
    text.into_owned()
}

/// Resolve `relative` against `base` using standard URL-resolution rules.
///
/// Returns an empty string when either input is malformed.
pub fn resolve_url(base: &str, relative: &str) -> String {
    Url::parse(base)
        .and_then(|base| base.join(relative))
        .map(String::from)
        .unwrap_or_default()
}
