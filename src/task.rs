use std::collections::HashMap;

use crate::db::Database;
use crate::error::Result;
use crate::options::PipelineOptions;
use crate::resource::ManagedResource;

/// The environment a [Task] acts upon.
pub struct TaskRuntime<'a> {
    pub db: &'a Database,
    pub resources: &'a HashMap<String, ManagedResource>,
    pub options: &'a PipelineOptions,
}

/// The fundamental building block of a [Pipeline](crate::Pipeline),
/// responsible for actually working on the data.
///
/// Tasks run in a single thread, but may be executed multiple times with
/// different runtimes - any execute-related state should be reset on entry
/// to [Task::execute].
pub trait Task {
    /// Name of the task, used in logs.
    fn name(&self) -> &str;

    /// Processes the data in the runtime environment.
    fn execute(&mut self, runtime: &mut TaskRuntime<'_>) -> Result<()>;

    /// Tasks which open their own transactions return true here, opting
    /// out of the implicit per-task transaction of the executor.
    fn manages_own_transactions(&self) -> bool {
        false
    }
}
