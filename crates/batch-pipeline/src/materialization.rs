//! [`RemoteMaterializationStage`]: resolves every `UploadTask` and replaces
//! the matching `FilePlaceholder`s with `FileRefPart`s. Mutates
//! references only; the command shape stays `PlannedCommand`.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use futures::future::join_all;

use batch_core::api::APIPart;
use batch_core::commands::{Outcome, PlannedCommand};
use batch_core::error::{ApiError, FileError};
use batch_core::source::Source;
use batch_providers::ProviderAdapter;
use batch_registries::{fingerprint_bytes, fingerprint_identifier, FileRegistry, FileRegistryEntry};

use crate::invariants;

pub struct RemoteMaterializationStage<'a> {
  registry: &'a FileRegistry,
  adapter: &'a dyn ProviderAdapter,
}

impl<'a> RemoteMaterializationStage<'a> {
  pub fn new(registry: &'a FileRegistry, adapter: &'a dyn ProviderAdapter) -> Self {
    Self { registry, adapter }
  }

  pub async fn materialize(&self, mut planned: PlannedCommand) -> Outcome<PlannedCommand> {
    let tasks = planned.execution_plan.upload_tasks.clone();
    if tasks.is_empty() {
      return Outcome::success(planned);
    }

    let Some(uploads) = self.adapter.as_uploads() else {
      return Outcome::failure(
        "RemoteMaterializationStage",
        FileError::new(format!(
          "provider {} has no upload capability but {} file(s) exceed the inline threshold",
          self.adapter.provider_name(),
          tasks.len()
        )),
      );
    };

    let resolutions = join_all(tasks.iter().map(|task| async move {
      let fingerprint = fingerprint_for(&task.source);
      let mime = task.placeholder_mime.clone();
      let result = self
        .registry
        .get_or_upload(&fingerprint, async {
          let bytes = task.source.load().map_err(|e| {
            ApiError::new(format!("failed to read {} for upload: {e}", task.identifier))
          })?;
          let uri = uploads.upload(bytes, mime.clone()).await?;
          Ok::<_, ApiError>(FileRegistryEntry::with_default_ttl(uri))
        })
        .await;
      (task.identifier.clone(), result)
    }))
    .await;

    let mut resolved: BTreeMap<String, String> = BTreeMap::new();
    for (identifier, result) in resolutions {
      match result {
        Ok(entry) => {
          resolved.insert(identifier, entry.remote_uri);
        }
        Err(err) => {
          return Outcome::failure(
            "RemoteMaterializationStage",
            FileError::new(format!("upload failed for {identifier}: {err}")),
          );
        }
      }
    }

    replace_placeholders(&mut planned.execution_plan.shared_parts, &resolved);
    for call in &mut planned.execution_plan.calls {
      replace_placeholders(&mut call.api_parts, &resolved);
    }
    planned.execution_plan.upload_tasks.clear();

    invariants::check(
      !planned.execution_plan.has_unresolved_placeholders(),
      "ExecutionPlan must carry no FilePlaceholder after materialization",
    );

    Outcome::success(planned)
  }
}

fn fingerprint_for(source: &Source) -> String {
  match source {
    Source::File { identifier, size_bytes, .. } => {
      let mtime = std::fs::metadata(identifier)
        .ok()
        .and_then(|m| m.modified().ok())
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
      fingerprint_identifier(identifier, *size_bytes, mtime)
    }
    other => fingerprint_bytes(&other.load().unwrap_or_default()),
  }
}

fn replace_placeholders(parts: &mut [APIPart], resolved: &BTreeMap<String, String>) {
  for part in parts.iter_mut() {
    if let APIPart::FilePlaceholder { identifier, mime } = part {
      if let Some(uri) = resolved.get(identifier) {
        *part = APIPart::FileRefPart { uri: uri.clone(), mime: mime.clone() };
      }
    }
  }
}
