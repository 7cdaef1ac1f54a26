use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Parse a GitHub DateTime such as `2026-01-05T12:34:56Z` (fractional seconds allowed).
pub fn parse_github_datetime(s: &str) -> Option<OffsetDateTime> {
    OffsetDateTime::parse(s.trim(), &Rfc3339).ok()
}

/// RFC 3339 rendering for operator output; falls back to unix seconds.
pub fn format_datetime(t: OffsetDateTime) -> String {
    t.format(&Rfc3339)
        .unwrap_or_else(|_| t.unix_timestamp().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn parses_plain_and_fractional() {
        assert_eq!(
            parse_github_datetime("2026-01-05T12:34:56Z"),
            Some(datetime!(2026-01-05 12:34:56 UTC))
        );
        assert_eq!(
            parse_github_datetime(" 2026-01-05T12:34:56.250Z ").map(|t| t.unix_timestamp()),
            Some(datetime!(2026-01-05 12:34:56 UTC).unix_timestamp())
        );
        assert_eq!(parse_github_datetime("yesterday"), None);
        assert_eq!(parse_github_datetime(""), None);
    }

    #[test]
    fn formats_rfc3339() {
        assert_eq!(
            format_datetime(datetime!(2026-01-05 12:34:56 UTC)),
            "2026-01-05T12:34:56Z"
        );
    }
}
