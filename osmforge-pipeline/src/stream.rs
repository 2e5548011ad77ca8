//! JSON-lines readers for element and change streams.
//!
//! One record per line; blank lines are skipped. Any unreadable or
//! undecodable line surfaces as an error, which the drivers treat as
//! fatal for the whole batch.

use std::io::BufRead;

use serde::de::DeserializeOwned;

use osmforge_core::Element;

use crate::update::Change;
use crate::PipelineError;

/// Iterate elements from a JSON-lines reader.
pub fn read_elements<R: BufRead>(
    reader: R,
) -> impl Iterator<Item = Result<Element, PipelineError>> {
    read_records(reader)
}

/// Iterate change records from a JSON-lines reader.
pub fn read_changes<R: BufRead>(
    reader: R,
) -> impl Iterator<Item = Result<Change, PipelineError>> {
    read_records(reader)
}

fn read_records<R: BufRead, T: DeserializeOwned>(
    reader: R,
) -> impl Iterator<Item = Result<T, PipelineError>> {
    reader
        .lines()
        .enumerate()
        .filter_map(|(index, line)| match line {
            Err(source) => Some(Err(PipelineError::ReadLine {
                line: index + 1,
                source,
            })),
            Ok(text) if text.trim().is_empty() => None,
            Ok(text) => Some(serde_json::from_str(&text).map_err(|source| {
                PipelineError::MalformedRecord {
                    line: index + 1,
                    source,
                }
            })),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use osmforge_core::{Element, ElementKind};
    use rstest::rstest;

    #[rstest]
    fn elements_parse_in_stream_order() {
        let text = "\
{\"node\": {\"id\": 1, \"lon\": 1.0, \"lat\": 2.0, \"tags\": {\"place\": \"town\"}}}\n\
\n\
{\"way\": {\"id\": 2, \"refs\": [1, 3], \"tags\": {}}}\n";
        let elements: Vec<Element> = read_elements(text.as_bytes())
            .collect::<Result<_, _>>()
            .expect("valid stream");
        assert_eq!(elements.len(), 2, "expected the blank line skipped");
        assert_eq!(elements[0].kind(), ElementKind::Node);
        assert_eq!(elements[1].kind(), ElementKind::Way);
    }

    #[rstest]
    fn malformed_line_reports_its_number() {
        let text = "{\"node\": {\"id\": 1, \"lon\": 0.0, \"lat\": 0.0}}\nnot json\n";
        let error = read_elements(text.as_bytes())
            .collect::<Result<Vec<_>, _>>()
            .expect_err("second line is garbage");
        assert!(
            matches!(error, PipelineError::MalformedRecord { line: 2, .. }),
            "expected line 2 reported, got {error:?}"
        );
    }
}
