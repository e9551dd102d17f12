use time::{OffsetDateTime, format_description::well_known::Rfc3339};

/// Current UTC time formatted as RFC 3339.
pub(crate) fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_is_rfc3339_utc() {
        let pattern = regex::Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(\.\d+)?Z$")
            .expect("pattern");
        let ts = now_rfc3339();
        assert!(pattern.is_match(&ts), "unexpected timestamp {ts}");
    }
}
