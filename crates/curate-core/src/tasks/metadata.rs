use std::sync::LazyLock;

use async_trait::async_trait;
use curate_state::{ContentObject, ObjectType};
use regex::Regex;

use crate::error::Result;
use crate::status::Status;
use crate::task::{CurationTask, TaskContext};

const DEFAULT_REQUIRED_FIELDS: &str = "dc.title,dc.date.issued";

/// Fails items missing any of the fields named by the `fields` property.
#[derive(Debug, Default)]
pub struct RequiredMetadataTask;

#[async_trait]
impl CurationTask for RequiredMetadataTask {
    async fn perform(&mut self, cx: &mut TaskContext<'_>, dso: &ContentObject) -> Result<Status> {
        if dso.object_type != ObjectType::Item {
            return Ok(Status::Skip);
        }
        let fields = cx
            .property("fields")
            .unwrap_or_else(|| DEFAULT_REQUIRED_FIELDS.to_string());
        let missing: Vec<&str> = fields
            .split(',')
            .map(str::trim)
            .filter(|field| !field.is_empty() && !dso.has_metadata(field))
            .collect();

        if missing.is_empty() {
            cx.set_result(format!("{} has all required metadata", dso.label()));
            Ok(Status::Success)
        } else {
            let message = format!("{} is missing {}", dso.label(), missing.join(", "));
            cx.report(&message)?;
            cx.set_result(message);
            Ok(Status::Fail)
        }
    }
}

static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));

fn normalize(value: &str) -> String {
    WHITESPACE_RUN.replace_all(value.trim(), " ").into_owned()
}

/// Trims metadata values and collapses internal whitespace runs, then
/// stores the cleaned record.
#[derive(Debug, Default)]
pub struct MetadataWhitespaceTask;

#[async_trait]
impl CurationTask for MetadataWhitespaceTask {
    async fn perform(&mut self, cx: &mut TaskContext<'_>, dso: &ContentObject) -> Result<Status> {
        if dso.object_type != ObjectType::Item {
            return Ok(Status::Skip);
        }
        let mut metadata = dso.metadata.clone();
        let mut changed = 0usize;
        for value in &mut metadata {
            let cleaned = normalize(&value.value);
            if cleaned != value.value {
                value.value = cleaned;
                changed += 1;
            }
        }

        if changed > 0 {
            cx.context().store().update_metadata(&dso.id, metadata).await?;
            cx.context_mut().uncache(&dso.id);
            cx.report(&format!("{}: cleaned {changed} value(s)", dso.label()))?;
        }
        cx.set_result(format!("{changed} value(s) changed"));
        Ok(Status::Success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_trims_and_collapses() {
        assert_eq!(normalize("  A   title\twith\n gaps "), "A title with gaps");
        assert_eq!(normalize("clean"), "clean");
    }

    #[test]
    fn normalize_empties_blank_values() {
        assert_eq!(normalize(" \t\n "), "");
    }
}
