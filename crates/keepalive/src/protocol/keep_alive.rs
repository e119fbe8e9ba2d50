use http::{HeaderMap, Version, header};

/// Whether a message with this version and headers ends its connection.
///
/// HTTP/1.1 persists unless `Connection: close` is present; HTTP/1.0 closes unless
/// `Connection: keep-alive` is present. `close` wins when both tokens appear.
pub(crate) fn wants_close(version: Version, headers: &HeaderMap) -> bool {
    let mut close = false;
    let mut keep_alive = false;

    for value in headers.get_all(header::CONNECTION) {
        for token in value.as_bytes().split(|b| *b == b',') {
            let token = token.trim_ascii();
            if token.eq_ignore_ascii_case(b"close") {
                close = true;
            } else if token.eq_ignore_ascii_case(b"keep-alive") {
                keep_alive = true;
            }
        }
    }

    match version {
        Version::HTTP_11 => close,
        Version::HTTP_10 => close || !keep_alive,
        _ => true,
    }
}
