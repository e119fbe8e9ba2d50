//! Small helpers shared across the crate.

/// Returns early with `$error` when `$predicate` does not hold.
///
/// Reads like `assert!`, but propagates an error instead of panicking:
///
/// ```ignore
/// ensure!(headers.len() < MAX_HEADERS, ParseError::too_many_headers(MAX_HEADERS));
/// ```
macro_rules! ensure {
    ($predicate:expr, $error:expr) => {
        if !$predicate {
            return Err($error);
        }
    };
}

pub(crate) use ensure;
