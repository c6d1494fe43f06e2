use crate::error::ParseError;
use crate::model::ResultSet;
use serde_json::Value;

/// Parse a complete collaborator output as one JSON array of records.
pub(crate) fn parse_result_set(output: &[u8]) -> Result<ResultSet, ParseError> {
    if output.iter().all(u8::is_ascii_whitespace) {
        return Err(ParseError::Empty);
    }
    let value: Value = serde_json::from_slice(output)?;
    let items = match value {
        Value::Array(items) => items,
        other => {
            return Err(ParseError::NotAnArray {
                found: kind(&other),
            })
        }
    };
    let records = items
        .into_iter()
        .enumerate()
        .map(|(index, item)| match item {
            Value::Object(record) => Ok(record),
            other => Err(ParseError::NotARecord {
                index,
                found: kind(&other),
            }),
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ResultSet::new(records))
}

fn kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn parses_records_in_order() {
        let rs = parse_result_set(
            br#"[{"name":"Org A","amount":1000},{"name":"Org B","amount":2000}]"#,
        )
        .expect("parse");
        assert_eq!(rs.len(), 2);
        assert_eq!(rs.records()[1]["name"], "Org B");
    }

    #[test]
    fn empty_array_is_an_empty_result() {
        let rs = parse_result_set(b"[]\n").expect("parse");
        assert!(rs.is_empty());
    }

    #[test]
    fn surrounding_whitespace_is_fine() {
        let rs = parse_result_set(b"\n  [{\"a\":1}]  \n").expect("parse");
        assert_eq!(rs.len(), 1);
    }

    #[test]
    fn blank_output_is_empty_error() {
        assert_matches!(parse_result_set(b""), Err(ParseError::Empty));
        assert_matches!(parse_result_set(b" \n\t"), Err(ParseError::Empty));
    }

    #[test]
    fn garbage_is_json_error() {
        assert_matches!(parse_result_set(b"not json"), Err(ParseError::Json(_)));
    }

    #[test]
    fn trailing_progress_text_is_json_error() {
        assert_matches!(
            parse_result_set(b"[]\nFetched 4999 records from offset 4999..."),
            Err(ParseError::Json(_))
        );
    }

    #[test]
    fn top_level_object_is_rejected() {
        assert_matches!(
            parse_result_set(br#"{"name":"Org A"}"#),
            Err(ParseError::NotAnArray { found: "object" })
        );
    }

    #[test]
    fn non_record_element_is_rejected_with_index() {
        assert_matches!(
            parse_result_set(br#"[{"a":1}, 2]"#),
            Err(ParseError::NotARecord {
                index: 1,
                found: "number"
            })
        );
    }
}
