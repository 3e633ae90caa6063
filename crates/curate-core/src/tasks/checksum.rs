use async_trait::async_trait;
use curate_state::{ContentObject, ObjectType};
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::status::Status;
use crate::task::{CurationTask, TaskContext};

/// Recomputes the SHA-256 of every bitstream of an item and compares it
/// with the checksum recorded at ingest.
#[derive(Debug, Default)]
pub struct ChecksumTask;

#[async_trait]
impl CurationTask for ChecksumTask {
    async fn perform(&mut self, cx: &mut TaskContext<'_>, dso: &ContentObject) -> Result<Status> {
        if dso.object_type != ObjectType::Item {
            cx.set_result(format!("{} is not an item", dso.label()));
            return Ok(Status::Skip);
        }

        let store = cx.context().store().clone();
        let mut checked = 0usize;
        let mut mismatched = Vec::new();
        for bundle in store.bundles(&dso.id).await? {
            for bitstream in store.bitstreams(&bundle.id).await? {
                if !bitstream.checksum_algorithm.eq_ignore_ascii_case("SHA-256") {
                    cx.set_result(format!(
                        "unsupported checksum algorithm {} on {}",
                        bitstream.checksum_algorithm, bitstream.name
                    ));
                    return Ok(Status::Skip);
                }
                let data = store.retrieve(&bitstream.id).await?;
                let actual = hex::encode(Sha256::digest(&data));
                if !actual.eq_ignore_ascii_case(&bitstream.checksum) {
                    mismatched.push(bitstream.name.clone());
                }
                checked += 1;
            }
        }

        if mismatched.is_empty() {
            cx.set_result(format!("{checked} bitstream(s) verified"));
            Ok(Status::Success)
        } else {
            let message = format!(
                "{}: checksum mismatch in {}",
                dso.label(),
                mismatched.join(", ")
            );
            cx.report(&message)?;
            cx.set_result(message);
            Ok(Status::Fail)
        }
    }
}
