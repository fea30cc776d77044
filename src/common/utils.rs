//! Utility functions for replikv

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Percent-encoding set for URL path segments (includes /, %, and control chars)
const SEGMENT_ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b'/')
    .add(b'%')
    .add(b' ')
    .add(b'?')
    .add(b'#')
    .add(b'&');

/// Encode a class or shard name for use as a URL path segment
pub fn encode_segment(segment: &str) -> String {
    utf8_percent_encode(segment, SEGMENT_ENCODE_SET).to_string()
}

/// Parse duration string (e.g., "500ms", "30s", "5m", "1h")
pub fn parse_duration(s: &str) -> crate::Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return Err(crate::Error::InvalidConfig("empty duration".into()));
    }

    let (num_str, unit) = if let Some(num) = s.strip_suffix("ms") {
        (num, "ms")
    } else {
        s.split_at(s.len() - s.chars().last().map_or(0, char::len_utf8))
    };

    let num: u64 = num_str
        .parse()
        .map_err(|_| crate::Error::InvalidConfig(format!("invalid duration: {}", s)))?;

    let too_long = || crate::Error::InvalidConfig(format!("duration out of range: {}", s));
    let duration = match unit {
        "ms" => Duration::from_millis(num),
        "s" => Duration::from_secs(num),
        "m" => Duration::from_secs(num.checked_mul(60).ok_or_else(too_long)?),
        "h" => Duration::from_secs(num.checked_mul(3600).ok_or_else(too_long)?),
        _ => {
            return Err(crate::Error::InvalidConfig(format!(
                "unknown duration unit: {}",
                unit
            )))
        }
    };

    Ok(duration)
}

/// Run `fut` until it completes, `token` is cancelled or `timeout` elapses.
///
/// Dropping the inner future on cancellation aborts the outstanding request.
pub async fn with_deadline<T, F>(
    token: &CancellationToken,
    timeout: Duration,
    what: &str,
    fut: F,
) -> crate::Result<T>
where
    F: Future<Output = crate::Result<T>>,
{
    tokio::select! {
        _ = token.cancelled() => Err(crate::Error::Cancelled),
        res = tokio::time::timeout(timeout, fut) => match res {
            Ok(res) => res,
            Err(_) => Err(crate::Error::Timeout(format!("{} after {:?}", what, timeout))),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_segment() {
        assert_eq!(encode_segment("shard/1"), "shard%2F1");
        assert_eq!(encode_segment("Article"), "Article");
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
    }

    #[test]
    fn test_parse_duration_invalid() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("abc").is_err());
        assert!(parse_duration("10x").is_err());
    }

    #[test]
    fn test_parse_duration_overflow() {
        let err = parse_duration("99999999999999999h").unwrap_err();
        assert!(matches!(err, crate::Error::InvalidConfig(_)));
        assert!(parse_duration("999999999999999999m").is_err());
        assert_eq!(
            parse_duration("99999999999999999s").unwrap(),
            Duration::from_secs(99_999_999_999_999_999)
        );
    }

    #[tokio::test]
    async fn test_with_deadline() {
        let token = CancellationToken::new();
        let ok = with_deadline(&token, Duration::from_secs(1), "fast", async {
            Ok::<_, crate::Error>(7)
        })
        .await;
        assert_eq!(ok.unwrap(), 7);

        let slow = with_deadline(&token, Duration::from_millis(10), "slow", async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, crate::Error>(())
        })
        .await;
        assert!(matches!(slow, Err(crate::Error::Timeout(_))));

        token.cancel();
        let cancelled = with_deadline(&token, Duration::from_secs(5), "cancelled", async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, crate::Error>(())
        })
        .await;
        assert!(matches!(cancelled, Err(crate::Error::Cancelled)));
    }
}
