use std::path::PathBuf;

/// Options controlling how a [Pipeline](crate::Pipeline) materialises its
/// resources and where it keeps its state.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// By default the pipeline propagates
    /// [InputNotModified](crate::Error::InputNotModified) when every
    /// resource is up to date. With this flag the pipeline falls back to
    /// the cached resources and always runs.
    pub force_run: bool,

    /// Never fetch anything; resources must already be cached, otherwise
    /// the run fails with a [ResourceNotCached](crate::DataError::ResourceNotCached)
    /// for every missing one. Forces the pipeline to run.
    pub from_cache: bool,

    /// Directory where input resources are cached and where tasks may
    /// store their workload to preserve it across runs. Created when
    /// missing.
    pub workspace_directory: PathBuf,

    /// Save the database as a file in the workspace directory instead of
    /// keeping it in memory.
    pub save_db_in_workspace: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            force_run: false,
            from_cache: false,
            workspace_directory: PathBuf::from("_impuls_workspace"),
            save_db_in_workspace: false,
        }
    }
}
