use crate::error::StoreError;

/// Get a required column value from a row, returning CorruptRow on failure.
pub fn get<T: rusqlite::types::FromSql>(
    row: &rusqlite::Row<'_>,
    idx: usize,
    table: &'static str,
    column: &'static str,
) -> Result<T, StoreError> {
    row.get(idx).map_err(|e| StoreError::CorruptRow {
        table,
        column,
        detail: e.to_string(),
    })
}

/// Get an optional column value.
pub fn get_opt<T: rusqlite::types::FromSql>(
    row: &rusqlite::Row<'_>,
    idx: usize,
    table: &'static str,
    column: &'static str,
) -> Result<Option<T>, StoreError> {
    row.get(idx).map_err(|e| StoreError::CorruptRow {
        table,
        column,
        detail: e.to_string(),
    })
}

/// Parse a string into an enum, returning CorruptRow on failure.
pub fn parse_enum<T: std::str::FromStr>(
    raw: &str,
    table: &'static str,
    column: &'static str,
) -> Result<T, StoreError> {
    raw.parse().map_err(|_| StoreError::CorruptRow {
        table,
        column,
        detail: format!("unknown variant: {raw}"),
    })
}

/// Deserialize a JSON column into a typed value, returning CorruptRow on failure.
pub fn parse_typed_json<T: serde::de::DeserializeOwned>(
    raw: &str,
    table: &'static str,
    column: &'static str,
) -> Result<T, StoreError> {
    serde_json::from_str(raw).map_err(|e| StoreError::CorruptRow {
        table,
        column,
        detail: format!("invalid JSON: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use verbatim_core::job::JobStatus;

    #[test]
    fn parse_enum_success() {
        let result: Result<JobStatus, _> = parse_enum("processing", "jobs", "status");
        assert_eq!(result.unwrap(), JobStatus::Processing);
    }

    #[test]
    fn parse_enum_failure() {
        let result: Result<JobStatus, _> = parse_enum("INVALID", "jobs", "status");
        assert!(matches!(
            result,
            Err(StoreError::CorruptRow { table: "jobs", column: "status", .. })
        ));
    }

    #[test]
    fn parse_typed_json_success() {
        let params: verbatim_core::params::JobParams =
            parse_typed_json(r#"{"model_family":"groq"}"#, "jobs", "parameters").unwrap();
        assert_eq!(params.model_family, "groq");
    }

    #[test]
    fn parse_typed_json_failure() {
        let result: Result<verbatim_core::params::JobParams, _> =
            parse_typed_json("not json", "jobs", "parameters");
        assert!(matches!(
            result,
            Err(StoreError::CorruptRow { table: "jobs", column: "parameters", .. })
        ));
    }
}
