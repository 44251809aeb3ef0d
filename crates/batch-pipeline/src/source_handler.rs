//! [`SourceHandler`]: `InitialCommand -> ResolvedCommand`.
//!
//! Every [`Source`] is already classified at construction time
//! ([`Source::from_file`]/[`Source::from_text`]/[`Source::from_uri`] are
//! the only constructors, and `from_file` is strict), so this stage's job
//! is to re-validate file sources haven't gone stale between construction
//! and execution (the file was deleted, permissions changed) rather than
//! to perform the classification itself.

use batch_core::commands::{InitialCommand, Outcome, ResolvedCommand};
use batch_core::error::SourceError;
use batch_core::source::Source;

use crate::invariants;

pub struct SourceHandler;

impl SourceHandler {
  pub fn resolve(initial: InitialCommand) -> Outcome<ResolvedCommand> {
    let mut resolved_sources = Vec::with_capacity(initial.sources.len());
    for source in &initial.sources {
      if let Source::File { path, .. } = source {
        if std::fs::metadata(path).is_err() {
          return Outcome::failure(
            "SourceHandler",
            SourceError::new(format!("source file no longer readable: {}", path.display())),
          );
        }
      }
      resolved_sources.push(source.clone());
    }

    invariants::check(
      resolved_sources.len() == initial.sources.len(),
      "ResolvedCommand must carry one resolved source per input source",
    );

    Outcome::success(ResolvedCommand { initial, resolved_sources })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use batch_core::config::FrozenConfig;

  #[test]
  fn text_and_remote_sources_pass_through() {
    let initial = InitialCommand::new(
      vec![Source::from_text("hello"), Source::from_uri("https://example.com/a.pdf", None, None)],
      vec!["prompt".to_string()],
      FrozenConfig::default(),
    );
    let resolved = SourceHandler::resolve(initial).into_result().unwrap();
    assert_eq!(resolved.resolved_sources.len(), 2);
  }

  #[test]
  fn stale_file_source_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("doc.txt");
    std::fs::write(&path, b"hi").unwrap();
    let source = Source::from_file(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    let initial = InitialCommand::new(vec![source], vec!["p".to_string()], FrozenConfig::default());
    let err = SourceHandler::resolve(initial).into_result().unwrap_err();
    assert_eq!(err.1, "SourceHandler");
  }
}
