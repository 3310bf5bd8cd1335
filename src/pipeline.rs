use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use crate::db::Database;
use crate::error::{Error, Result};
use crate::options::PipelineOptions;
use crate::resource::{prepare_resources, ManagedResource, Resource};
use crate::task::{Task, TaskRuntime};
use crate::tools::machine_load::LoadTracker;

/// A sequence of [Task]s over a shared database and resource set.
///
/// Opening a Pipeline creates a fresh database with the full schema:
/// in memory by default, or as a file in the workspace under
/// `save_db_in_workspace`. [Pipeline::run] materialises the resources
/// according to the options, then executes the tasks in order, each under
/// an implicit transaction.
pub struct Pipeline {
    pub name: String,
    pub options: PipelineOptions,
    pub db: Database,
    tasks: Vec<Box<dyn Task>>,
    resources: HashMap<String, Box<dyn Resource>>,
    pub(crate) managed_resources: Option<HashMap<String, ManagedResource>>,
    db_path: Option<PathBuf>,
    remove_db_on_failure: bool,
}

impl Pipeline {
    pub fn new(
        tasks: Vec<Box<dyn Task>>,
        resources: HashMap<String, Box<dyn Resource>>,
        options: PipelineOptions,
    ) -> Result<Self> {
        Self::create(tasks, resources, options, String::new(), None, false)
    }

    pub(crate) fn create(
        tasks: Vec<Box<dyn Task>>,
        resources: HashMap<String, Box<dyn Resource>>,
        options: PipelineOptions,
        name: String,
        db_path: Option<PathBuf>,
        remove_db_on_failure: bool,
    ) -> Result<Self> {
        fs::create_dir_all(&options.workspace_directory)?;

        let db_path = match db_path {
            Some(path) => Some(path),
            None if options.save_db_in_workspace => {
                Some(options.workspace_directory.join("impuls.db"))
            }
            None => None,
        };
        if let Some(path) = &db_path {
            if path.exists() {
                fs::remove_file(path)?;
            }
        }
        let db = Database::create_with_schema(db_path.as_deref())?;

        Ok(Self {
            name,
            options,
            db,
            tasks,
            resources,
            managed_resources: None,
            db_path,
            remove_db_on_failure,
        })
    }

    /// Runs every task in order.
    ///
    /// Without `force_run` or `from_cache`, propagates
    /// [Error::InputNotModified] when every resource is up to date,
    /// leaving the tasks unexecuted.
    pub fn run(&mut self) -> Result<()> {
        if self.managed_resources.is_none() {
            let (managed, proceed) = prepare_resources(
                &mut self.resources,
                &self.options.workspace_directory,
                self.options.from_cache,
            )?;
            if !proceed && !self.options.force_run {
                return Err(Error::InputNotModified);
            }
            self.managed_resources = Some(managed);
        }
        let resources = self.managed_resources.clone().unwrap_or_default();

        let result = self.run_tasks(&resources);
        if result.is_err() && self.remove_db_on_failure {
            if let Some(path) = &self.db_path {
                log::warn!("{}: removing half-written database", self.log_name());
                let _ = fs::remove_file(path);
            }
        }
        result
    }

    fn run_tasks(&mut self, resources: &HashMap<String, ManagedResource>) -> Result<()> {
        let log_name = if self.name.is_empty() {
            "Pipeline".to_string()
        } else {
            self.name.clone()
        };
        for task in &mut self.tasks {
            log::info!("{}: executing task {}", log_name, task.name());
            let tracker = LoadTracker::start();
            let mut runtime = TaskRuntime {
                db: &self.db,
                resources,
                options: &self.options,
            };
            if task.manages_own_transactions() {
                task.execute(&mut runtime)?;
            } else {
                self.db.transaction(|| task.execute(&mut runtime))?;
            }
            log::debug!("Task {} finished; {}", task.name(), tracker.finish());
        }
        Ok(())
    }

    fn log_name(&self) -> &str {
        if self.name.is_empty() {
            "Pipeline"
        } else {
            &self.name
        }
    }
}
