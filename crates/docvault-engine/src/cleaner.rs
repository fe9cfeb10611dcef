//! Pluggable document transformation for the clean workflow.

use docvault_types::Document;
use serde_json::{Map, Value};

use crate::config::types::CleanConfig;

/// Caller-supplied transformation applied to source documents.
///
/// `should_clean` is the tester: documents it rejects are still backed up
/// but never verified or replaced. `clean` must not depend on I/O; the
/// pipeline restores `id` and the partition key on its output.
pub trait DocumentCleaner: Send + Sync {
    fn should_clean(&self, _doc: &Document) -> bool {
        true
    }

    fn clean(&self, doc: &Document) -> Document;
}

impl<F> DocumentCleaner for F
where
    F: Fn(&Document) -> Document + Send + Sync,
{
    fn clean(&self, doc: &Document) -> Document {
        self(doc)
    }
}

/// Field-level cleaner configured from a job file's `clean:` block.
#[derive(Debug, Clone, Default)]
pub struct FieldCleaner {
    remove_fields: Vec<String>,
    set_fields: Map<String, Value>,
    only_if_present: Vec<String>,
}

impl FieldCleaner {
    #[must_use]
    pub fn from_config(config: &CleanConfig) -> Self {
        Self {
            remove_fields: config.remove_fields.clone(),
            set_fields: config.set_fields.clone(),
            only_if_present: config.only_if_present.clone(),
        }
    }
}

impl DocumentCleaner for FieldCleaner {
    fn should_clean(&self, doc: &Document) -> bool {
        self.only_if_present.iter().all(|f| doc.contains_key(f))
    }

    fn clean(&self, doc: &Document) -> Document {
        let mut out = doc.clone();
        for field in &self.remove_fields {
            out.remove(field);
        }
        for (field, value) in &self.set_fields {
            out.insert(field.clone(), value.clone());
        }
        out
    }
}
