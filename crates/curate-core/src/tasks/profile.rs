use std::collections::BTreeMap;

use async_trait::async_trait;
use curate_state::{ContentObject, ObjectType};

use crate::error::Result;
use crate::status::Status;
use crate::task::{CurationTask, TaskContext};

/// Tallies bitstream formats below an object. Distributive: it walks the
/// subtree itself and runs once per target.
#[derive(Debug, Default)]
pub struct FormatProfileTask;

#[async_trait]
impl CurationTask for FormatProfileTask {
    async fn perform(&mut self, cx: &mut TaskContext<'_>, dso: &ContentObject) -> Result<Status> {
        let store = cx.context().store().clone();
        let mut formats: BTreeMap<String, usize> = BTreeMap::new();
        let mut pending = vec![dso.clone()];

        while let Some(object) = pending.pop() {
            match object.object_type {
                ObjectType::Site => pending.extend(store.top_communities().await?),
                ObjectType::Community => {
                    pending.extend(store.sub_communities(&object.id).await?);
                    pending.extend(store.collections(&object.id).await?);
                }
                ObjectType::Collection => pending.extend(store.items(&object.id).await?),
                ObjectType::Item => pending.extend(store.bundles(&object.id).await?),
                ObjectType::Bundle => {
                    for bitstream in store.bitstreams(&object.id).await? {
                        *formats.entry(bitstream.format).or_default() += 1;
                    }
                }
                _ => {}
            }
        }

        if formats.is_empty() {
            cx.set_result(format!("no bitstreams below {}", dso.label()));
            return Ok(Status::Skip);
        }

        cx.report(&format!("format profile for {}", dso.label()))?;
        for (format, count) in &formats {
            cx.report(&format!("  {format}: {count}"))?;
        }
        let total: usize = formats.values().sum();
        cx.set_result(format!(
            "{total} bitstream(s) in {} format(s)",
            formats.len()
        ));
        Ok(Status::Success)
    }
}
