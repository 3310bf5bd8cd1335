use crate::error::Result;
use crate::model::Entity;
use crate::task::{Task, TaskRuntime};

/// Inserts a single pre-built entity into the database.
pub struct AddEntity<E: Entity> {
    entity: E,
    task_name: String,
}

impl<E: Entity> AddEntity<E> {
    pub fn new(entity: E) -> Self {
        Self {
            entity,
            task_name: "AddEntity".to_string(),
        }
    }

    pub fn with_name(entity: E, name: impl Into<String>) -> Self {
        Self {
            entity,
            task_name: name.into(),
        }
    }
}

impl<E: Entity> Task for AddEntity<E> {
    fn name(&self) -> &str {
        &self.task_name
    }

    fn execute(&mut self, runtime: &mut TaskRuntime<'_>) -> Result<()> {
        runtime.db.create(&self.entity)
    }
}
