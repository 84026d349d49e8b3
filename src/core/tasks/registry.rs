use crate::core::tasks::builtin;
use crate::core::tasks::{PersistentTask, TaskRecord};
use crate::err::Result;
use crate::global_var::LOGGER;
use crate::task_error;
use std::collections::HashMap;
use std::sync::Arc;

/// Rebuilds a task from its stored payload.
pub type TaskDecoder = fn(&[u8]) -> Result<Arc<dyn PersistentTask>>;

/// Maps stored kind tags to decoders. Records of unregistered kinds cannot be
/// restored and are skipped at load time.
#[derive(Clone)]
pub struct TaskRegistry {
    decoders: HashMap<&'static str, TaskDecoder>,
}

impl Default for TaskRegistry {
    /// Every task kind shipped with the crate.
    fn default() -> Self {
        let mut registry = Self::empty();
        builtin::register_all(&mut registry);
        registry
    }
}

impl TaskRegistry {
    pub fn empty() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }

    pub fn register(&mut self, kind: &'static str, decoder: TaskDecoder) -> &mut Self {
        if self.decoders.insert(kind, decoder).is_some() {
            LOGGER.warn(format!("Task kind {} registered twice, keeping the last", kind));
        }
        self
    }

    pub fn knows(&self, kind: &str) -> bool {
        self.decoders.contains_key(kind)
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        let mut kinds: Vec<_> = self.decoders.keys().copied().collect();
        kinds.sort_unstable();
        kinds
    }

    pub fn decode(&self, record: &TaskRecord) -> Result<Arc<dyn PersistentTask>> {
        let decoder = self
            .decoders
            .get(record.kind.as_str())
            .ok_or_else(|| task_error!("unknown task kind {}", record.kind))?;
        decoder(&record.payload).map_err(|e| {
            task_error!("cannot decode {} payload: {}", record.kind, e).into()
        })
    }
}

impl std::fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}
