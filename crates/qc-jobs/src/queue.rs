//! Per-module FIFO queues with round-robin hand-out.
//!
//! Files are named `<anything>-<module><ext>`. A file joins the queue of its
//! module when it carries every queue tag, its extension is allowed, and the
//! module is one of the configured ones. Each queue is ordered by
//! modification time.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::LazyLock;

use qc_config::SchedulerConfig;
use qc_core::entities::ProjectFile;
use regex::Regex;

static MODULE_FILE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^.+-([a-z]+)(\..+)$").expect("valid regex"));

/// Split a file name into `(module, extension)`, both lowercase.
#[must_use]
pub fn module_of(file_name: &str) -> Option<(String, String)> {
    let lower = file_name.to_lowercase();
    let caps = MODULE_FILE.captures(&lower)?;
    Some((caps[1].to_string(), caps[2].to_string()))
}

#[derive(Debug)]
pub struct ModuleQueues {
    order: Vec<String>,
    queues: BTreeMap<String, VecDeque<ProjectFile>>,
    tags: BTreeSet<String>,
    extensions: BTreeSet<String>,
    index: Option<usize>,
}

impl ModuleQueues {
    #[must_use]
    pub fn new(config: &SchedulerConfig) -> Self {
        let order: Vec<String> = config
            .module_order
            .iter()
            .map(|m| m.to_lowercase())
            .collect();
        Self {
            queues: order.iter().map(|m| (m.clone(), VecDeque::new())).collect(),
            order,
            tags: config.queue_tags.iter().cloned().collect(),
            extensions: config
                .extensions
                .iter()
                .map(|e| e.to_lowercase())
                .collect(),
            index: None,
        }
    }

    /// Queue every eligible file and return how many were added.
    ///
    /// A file still waiting in a queue is not added again. A file that was
    /// handed out and has since been tagged again is queued anew.
    pub fn add_files(&mut self, files: impl IntoIterator<Item = ProjectFile>) -> usize {
        let mut added = 0;
        for file in files {
            if !file.has_tags(&self.tags) || self.is_waiting(&file.id) {
                continue;
            }
            let Some((module, extension)) = module_of(&file.name) else {
                tracing::debug!(file = %file.name, "file name has no module suffix");
                continue;
            };
            if !self.extensions.contains(&extension) {
                tracing::debug!(file = %file.name, %extension, "extension not accepted");
                continue;
            }
            let Some(queue) = self.queues.get_mut(&module) else {
                tracing::debug!(file = %file.name, %module, "module not scheduled");
                continue;
            };
            queue.push_back(file);
            added += 1;
        }
        for queue in self.queues.values_mut() {
            queue.make_contiguous().sort_by_key(|f| f.modified);
        }
        added
    }

    /// The next module's queue in round-robin order, whether or not it has
    /// files. `None` only when no modules are configured.
    pub fn next_queue(&mut self) -> Option<(&str, &mut VecDeque<ProjectFile>)> {
        if self.order.is_empty() {
            return None;
        }
        let next = self.index.map_or(0, |i| (i + 1) % self.order.len());
        self.index = Some(next);
        let module = self.order[next].as_str();
        let queue = self.queues.get_mut(module)?;
        Some((module, queue))
    }

    fn is_waiting(&self, file_id: &str) -> bool {
        self.queues
            .values()
            .any(|q| q.iter().any(|f| f.id == file_id))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queues.values().all(VecDeque::is_empty)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.queues.values().map(VecDeque::len).sum()
    }

    /// Files waiting per module.
    #[must_use]
    pub fn pending(&self) -> BTreeMap<&str, usize> {
        self.queues
            .iter()
            .map(|(m, q)| (m.as_str(), q.len()))
            .collect()
    }
}
