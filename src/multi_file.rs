//! Creates a single, continuous database when the source data comes in
//! multiple versioned files.
//!
//! A [MultiFile] asks an [IntermediateFeedProvider] which feed versions are
//! needed, caches their inputs under `workspace/intermediate_inputs/`,
//! materialises one database per version under
//! `workspace/intermediate_dbs/` and prepares a final pipeline whose first
//! task is [Merge], folding every intermediate database into one. Inputs
//! and intermediate databases are preserved across runs; when nothing
//! changed upstream, [MultiFile::prepare] fails with
//! [Error::InputNotModified] and no work is performed.
//!
//! Running multiple programs against the same workspace is not supported
//! and may corrupt the caches.

use std::collections::{HashMap, HashSet};
use std::ffi::OsStr;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::types::{format_sql_date, parse_sql_date};
use crate::options::PipelineOptions;
use crate::pipeline::Pipeline;
use crate::resource::{
    datetime_to_unix, download_resource, prepare_resources, unix_to_datetime, LocalResource,
    ManagedResource, Resource, DATETIME_MAX_UTC, DATETIME_MIN_UTC,
};
use crate::task::Task;
use crate::tasks::{DatabaseToMerge, Merge, TruncateCalendars};
use crate::tools::temporal::date_range;

/// Self-contained schedules for a set period of time - a single version
/// of the timetables.
pub struct IntermediateFeed<R> {
    /// Source of the feed data. The provider must fill in its
    /// `last_modified` before the first fetch.
    pub resource: R,

    /// Filename under which the input is cached. Must be deterministic
    /// per version.
    pub resource_name: String,

    /// Opaque string identifying this feed revision.
    pub version: String,

    /// First day for which this feed's schedules apply.
    pub start_date: NaiveDate,
}

impl<R: Resource> IntermediateFeed<R> {
    /// The same feed, with the resource replaced by a [LocalResource]
    /// stored at the given path. Resource metadata is carried over.
    fn as_local_resource(&self, stored_at: PathBuf) -> IntermediateFeed<LocalResource> {
        let mut resource = LocalResource::new(stored_at);
        resource.set_last_modified(self.resource.last_modified());
        resource.set_fetch_time(self.resource.fetch_time());
        IntermediateFeed {
            resource,
            resource_name: self.resource_name.clone(),
            version: self.version.clone(),
            start_date: self.start_date,
        }
    }
}

/// JSON object preserving [IntermediateFeed] data across runs, stored in
/// `workspace/intermediate_inputs/<resource_name>.metadata`.
#[derive(Debug, Serialize, Deserialize)]
struct CachedFeedMetadata {
    version: String,
    start_date: String,
    last_modified: f64,
    fetch_time: f64,
}

/// An abstraction over an external repository of versioned schedules,
/// responsible for figuring out which feeds are needed to create a
/// complete database.
pub trait IntermediateFeedProvider {
    type Res: Resource;

    fn needed(&mut self) -> Result<Vec<IntermediateFeed<Self::Res>>>;
}

/// Removes feeds which end before `today`: everything sorted before the
/// last feed starting on or before that date.
pub fn prune_outdated_feeds<R>(feeds: &mut Vec<IntermediateFeed<R>>, today: NaiveDate) {
    feeds.sort_by_key(|feed| feed.start_date);
    let cutoff = feeds
        .iter()
        .rposition(|feed| feed.start_date <= today)
        .unwrap_or(0);
    feeds.drain(..cutoff);
}

/// Factory for the tasks of a per-feed pipeline. Must return fresh Task
/// instances on every call.
pub type TaskFactory = Box<dyn Fn(&IntermediateFeed<LocalResource>) -> Vec<Box<dyn Task>>>;

/// Factory for the tasks of the final pipeline.
pub type MultiTaskFactory = Box<dyn Fn(&[IntermediateFeed<LocalResource>]) -> Vec<Box<dyn Task>>>;

pub fn empty_tasks_factory() -> TaskFactory {
    Box::new(|_| Vec::new())
}

pub fn empty_multi_tasks_factory() -> MultiTaskFactory {
    Box::new(|_| Vec::new())
}

/// The result of resolving a multi-file feed: the pipelines creating
/// missing intermediate databases, and the final pipeline merging them.
pub struct Pipelines {
    pub intermediates: Vec<Pipeline>,
    pub final_pipeline: Pipeline,
}

impl Pipelines {
    /// Runs all pipelines in order: every intermediate, then the final one.
    pub fn run(&mut self) -> Result<()> {
        for pipeline in &mut self.intermediates {
            pipeline.run()?;
        }
        self.final_pipeline.run()
    }
}

/// Prepares [Pipelines] for creating a single, merged database from
/// multiple disjoint inputs.
///
/// Two options change their meaning here: under `from_cache` the provider
/// is bypassed entirely and all cached inputs are used; under `force_run`
/// every cached intermediate database is ignored and re-created.
pub struct MultiFile<P: IntermediateFeedProvider> {
    pub options: PipelineOptions,
    pub intermediate_provider: P,
    pub intermediate_pipeline_tasks_factory: TaskFactory,
    /// Tasks applied to each intermediate database right before merging.
    /// A [TruncateCalendars] task is always prepended, bounded by the
    /// start date of the next feed.
    pub pre_merge_pipeline_tasks_factory: TaskFactory,
    pub final_pipeline_tasks_factory: MultiTaskFactory,
    /// Extra resources made available to every pipeline. Changes in them
    /// never trigger a run on their own.
    pub additional_resources: HashMap<String, Box<dyn Resource>>,
    pub merge_separator: String,
    pub feed_version_separator: String,
    pub distance_between_similar_stops_m: f64,
}

impl<P: IntermediateFeedProvider> MultiFile<P> {
    pub fn new(
        options: PipelineOptions,
        intermediate_provider: P,
        intermediate_pipeline_tasks_factory: TaskFactory,
    ) -> Self {
        Self {
            options,
            intermediate_provider,
            intermediate_pipeline_tasks_factory,
            pre_merge_pipeline_tasks_factory: empty_tasks_factory(),
            final_pipeline_tasks_factory: empty_multi_tasks_factory(),
            additional_resources: HashMap::new(),
            merge_separator: ":".to_string(),
            feed_version_separator: "/".to_string(),
            distance_between_similar_stops_m: 10.0,
        }
    }

    /// Resolves which pipelines need to run.
    ///
    /// Fails with [Error::InputNotModified] if no intermediate input has
    /// changed (barring `from_cache` and `force_run`).
    pub fn prepare(&mut self) -> Result<Pipelines> {
        fs::create_dir_all(&self.options.workspace_directory)?;
        let resources = self.prepare_additional_resources()?;

        let inputs_dir = self.intermediate_inputs_path()?;
        let mut cached: HashMap<String, IntermediateFeed<LocalResource>> =
            load_cached(&inputs_dir)?
                .into_iter()
                .map(|feed| (feed.version.clone(), feed))
                .collect();

        let (local, updated) = if self.options.from_cache {
            log::info!("Loading cached input files");
            let mut local: Vec<IntermediateFeed<LocalResource>> =
                cached.into_values().collect();
            local.sort_by_key(|feed| feed.start_date);
            (local, HashSet::new())
        } else {
            log::info!("Listing needed input files");
            let mut needed = self.intermediate_provider.needed()?;
            self.remove_unneeded_cached_inputs(&inputs_dir, &needed, &mut cached)?;
            set_metadata_on_needed_feeds(&mut needed, &cached)?;
            self.download_needed_inputs(&inputs_dir, needed, &cached)?
        };

        let dbs_dir = self.intermediate_dbs_path()?;
        let versions_up_to_date = self.prune_intermediate_dbs(&dbs_dir, &local, &updated)?;

        let intermediates =
            self.prepare_intermediate_pipelines(&dbs_dir, &local, &resources, &versions_up_to_date)?;
        if intermediates.is_empty() && !self.options.from_cache {
            return Err(Error::InputNotModified);
        }

        let final_pipeline = self.prepare_final_pipeline(&dbs_dir, &local, &resources)?;
        Ok(Pipelines {
            intermediates,
            final_pipeline,
        })
    }

    fn prepare_additional_resources(&mut self) -> Result<HashMap<String, ManagedResource>> {
        if self.additional_resources.is_empty() {
            return Ok(HashMap::new());
        }
        log::info!("Preparing additional resources");
        let (resources, _) = prepare_resources(
            &mut self.additional_resources,
            &self.options.workspace_directory,
            self.options.from_cache,
        )?;
        Ok(resources)
    }

    fn remove_unneeded_cached_inputs(
        &self,
        inputs_dir: &Path,
        needed: &[IntermediateFeed<P::Res>],
        cached: &mut HashMap<String, IntermediateFeed<LocalResource>>,
    ) -> Result<()> {
        let needed_versions: HashSet<&str> =
            needed.iter().map(|feed| feed.version.as_str()).collect();
        let unneeded: Vec<String> = cached
            .keys()
            .filter(|version| !needed_versions.contains(version.as_str()))
            .cloned()
            .collect();
        for version in unneeded {
            if let Some(feed) = cached.remove(&version) {
                log::info!("Removing {} (file no longer needed)", feed.resource_name);
                remove_from_cache(inputs_dir, &feed)?;
            }
        }
        Ok(())
    }

    fn download_needed_inputs(
        &self,
        inputs_dir: &Path,
        needed: Vec<IntermediateFeed<P::Res>>,
        cached: &HashMap<String, IntermediateFeed<LocalResource>>,
    ) -> Result<(Vec<IntermediateFeed<LocalResource>>, HashSet<String>)> {
        let mut local = Vec::with_capacity(needed.len());
        let mut changed = HashSet::new();

        for mut feed in needed {
            let conditional = cached.contains_key(&feed.version);
            if conditional {
                log::info!(
                    "Refreshing {} (downloading if it has changed)",
                    feed.resource_name
                );
            } else {
                log::info!("Downloading {}", feed.resource_name);
            }

            let target = inputs_dir.join(&feed.resource_name);
            let has_changed = download_resource(&mut feed.resource, &target, conditional)?;
            write_feed_metadata(inputs_dir, &feed)?;

            local.push(feed.as_local_resource(target));
            if has_changed {
                changed.insert(feed.version);
            }
        }

        local.sort_by_key(|feed| feed.start_date);
        Ok((local, changed))
    }

    /// Removes stale and unnecessary intermediate databases, returning the
    /// versions whose database survived.
    fn prune_intermediate_dbs(
        &self,
        dbs_dir: &Path,
        local: &[IntermediateFeed<LocalResource>],
        changed: &HashSet<String>,
    ) -> Result<HashSet<String>> {
        log::info!("Removing stale/unnecessary intermediate databases");
        let expected_mod_time: HashMap<&str, DateTime<Utc>> = local
            .iter()
            .map(|feed| (feed.version.as_str(), feed.resource.last_modified()))
            .collect();

        let mut versions_up_to_date = HashSet::new();
        for entry in fs::read_dir(dbs_dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(OsStr::to_str) != Some("db") {
                log::error!(
                    "Unrecognized file in intermediate databases path: {}",
                    path.display()
                );
                continue;
            }
            let version = match path.file_stem().and_then(OsStr::to_str) {
                Some(stem) => stem.to_string(),
                None => continue,
            };

            let db_mod_time: DateTime<Utc> = entry.metadata()?.modified()?.into();
            let expected = expected_mod_time
                .get(version.as_str())
                .copied()
                .unwrap_or(DATETIME_MAX_UTC);
            if self.options.force_run || changed.contains(&version) || db_mod_time < expected {
                fs::remove_file(&path)?;
            } else {
                versions_up_to_date.insert(version);
            }
        }

        if !self.options.force_run {
            log::info!(
                "{} cached intermediate database(s) are up to date",
                versions_up_to_date.len()
            );
        }
        Ok(versions_up_to_date)
    }

    fn prepare_intermediate_pipelines(
        &self,
        dbs_dir: &Path,
        local: &[IntermediateFeed<LocalResource>],
        resources: &HashMap<String, ManagedResource>,
        versions_up_to_date: &HashSet<String>,
    ) -> Result<Vec<Pipeline>> {
        let feeds_to_create: Vec<&IntermediateFeed<LocalResource>> = local
            .iter()
            .filter(|feed| {
                self.options.force_run || !versions_up_to_date.contains(&feed.version)
            })
            .collect();
        log::info!(
            "{} intermediate pipeline(s) need to be created",
            feeds_to_create.len()
        );

        let mut pipelines = Vec::with_capacity(feeds_to_create.len());
        for feed in feeds_to_create {
            let mut pipeline = Pipeline::create(
                (self.intermediate_pipeline_tasks_factory)(feed),
                HashMap::new(),
                self.options.clone(),
                feed.version.clone(),
                Some(dbs_dir.join(format!("{}.db", feed.version))),
                true,
            )?;

            let mut managed = resources.clone();
            managed.insert(
                feed.resource_name.clone(),
                ManagedResource::new(
                    feed.resource.path.clone(),
                    feed.resource.last_modified(),
                    feed.resource.fetch_time(),
                ),
            );
            pipeline.managed_resources = Some(managed);
            pipelines.push(pipeline);
        }
        Ok(pipelines)
    }

    fn prepare_final_pipeline(
        &self,
        dbs_dir: &Path,
        local: &[IntermediateFeed<LocalResource>],
        resources: &HashMap<String, ManagedResource>,
    ) -> Result<Pipeline> {
        log::info!("Preparing the final pipeline");
        let merge_task = Merge::new(self.prepare_databases_to_merge(local))
            .separator(&self.merge_separator)
            .feed_version_separator(&self.feed_version_separator)
            .distance_between_similar_stops_m(self.distance_between_similar_stops_m);

        let mut tasks: Vec<Box<dyn Task>> = vec![Box::new(merge_task)];
        tasks.extend((self.final_pipeline_tasks_factory)(local));

        let mut pipeline = Pipeline::create(
            tasks,
            HashMap::new(),
            self.options.clone(),
            "Final".to_string(),
            None,
            false,
        )?;

        let mut managed = resources.clone();
        for feed in local {
            let resource_name = format!("{}.db", feed.version);
            let resource_path = dbs_dir.join(&resource_name);
            let last_modified = fs::metadata(&resource_path)
                .ok()
                .and_then(|meta| meta.modified().ok())
                .map(Into::into)
                .unwrap_or(DATETIME_MIN_UTC);
            managed.insert(
                resource_name,
                ManagedResource::new(resource_path, last_modified, feed.resource.fetch_time()),
            );
        }
        pipeline.managed_resources = Some(managed);
        Ok(pipeline)
    }

    fn prepare_databases_to_merge(
        &self,
        local: &[IntermediateFeed<LocalResource>],
    ) -> Vec<DatabaseToMerge> {
        let mut to_merge = Vec::with_capacity(local.len());
        for (i, feed) in local.iter().enumerate() {
            let feed_end = local
                .get(i + 1)
                .and_then(|next| next.start_date.checked_sub_days(Days::new(1)));
            let mut pre_merge_tasks: Vec<Box<dyn Task>> = vec![Box::new(TruncateCalendars::new(
                date_range(feed.start_date, feed_end),
            ))];
            pre_merge_tasks.extend((self.pre_merge_pipeline_tasks_factory)(feed));

            to_merge.push(
                DatabaseToMerge::new(format!("{}.db", feed.version), feed.version.clone())
                    .with_pre_merge_tasks(pre_merge_tasks),
            );
        }
        to_merge
    }

    fn intermediate_dbs_path(&self) -> Result<PathBuf> {
        let path = self.options.workspace_directory.join("intermediate_dbs");
        fs::create_dir_all(&path)?;
        Ok(path)
    }

    fn intermediate_inputs_path(&self) -> Result<PathBuf> {
        let path = self.options.workspace_directory.join("intermediate_inputs");
        fs::create_dir_all(&path)?;
        Ok(path)
    }
}

/// Copies the cached timestamps onto the needed resources, so conditional
/// fetches can recognise unchanged inputs. Aborts when a cached feed's
/// resource name does not match the needed one - such a change would
/// corrupt the input cache.
fn set_metadata_on_needed_feeds<R: Resource>(
    needed: &mut [IntermediateFeed<R>],
    cached: &HashMap<String, IntermediateFeed<LocalResource>>,
) -> Result<()> {
    for feed in needed {
        if let Some(cached_feed) = cached.get(&feed.version) {
            if cached_feed.resource_name != feed.resource_name {
                return Err(Error::InvalidFeedCache(format!(
                    "the resource name for feed version {:?} has changed from {:?} to {:?}; \
                     remove the intermediate_inputs directory manually to force a fresh run",
                    feed.version, cached_feed.resource_name, feed.resource_name,
                )));
            }
            feed.resource
                .set_last_modified(cached_feed.resource.last_modified());
            feed.resource
                .set_fetch_time(cached_feed.resource.fetch_time());
        }
    }
    Ok(())
}

/// Loads all cached intermediate inputs from their metadata sidecars.
/// Unrecognized files are removed.
fn load_cached(inputs_dir: &Path) -> Result<Vec<IntermediateFeed<LocalResource>>> {
    let mut all_files = HashSet::new();
    for entry in fs::read_dir(inputs_dir)? {
        all_files.insert(entry?.path());
    }
    let metadata_files: Vec<PathBuf> = all_files
        .iter()
        .filter(|path| path.extension().and_then(OsStr::to_str) == Some("metadata"))
        .cloned()
        .collect();

    let mut recognized = HashSet::new();
    let mut feeds = Vec::new();
    for metadata_file in metadata_files {
        let content_file = metadata_file.with_extension("");
        if !all_files.contains(&content_file) {
            log::error!(
                "Intermediate inputs cache has {}, but no {} - assuming this feed is not cached",
                metadata_file.display(),
                content_file.display(),
            );
            continue;
        }

        let metadata: CachedFeedMetadata = serde_json::from_reader(File::open(&metadata_file)?)?;
        let resource_name = content_file
            .file_name()
            .and_then(OsStr::to_str)
            .unwrap_or_default()
            .to_string();

        let mut resource = LocalResource::new(content_file.clone());
        resource.set_last_modified(unix_to_datetime(metadata.last_modified));
        resource.set_fetch_time(unix_to_datetime(metadata.fetch_time));

        recognized.insert(metadata_file);
        recognized.insert(content_file);
        feeds.push(IntermediateFeed {
            resource,
            resource_name,
            version: metadata.version,
            start_date: parse_sql_date(&metadata.start_date)?,
        });
    }

    for unrecognized in all_files.difference(&recognized) {
        log::error!(
            "Removing unrecognized file in the intermediate inputs cache: {}",
            unrecognized.display()
        );
        let _ = fs::remove_file(unrecognized);
    }

    Ok(feeds)
}

fn write_feed_metadata<R: Resource>(inputs_dir: &Path, feed: &IntermediateFeed<R>) -> Result<()> {
    let path = inputs_dir.join(format!("{}.metadata", feed.resource_name));
    let metadata = CachedFeedMetadata {
        version: feed.version.clone(),
        start_date: format_sql_date(feed.start_date),
        last_modified: datetime_to_unix(feed.resource.last_modified()),
        fetch_time: datetime_to_unix(feed.resource.fetch_time()),
    };
    serde_json::to_writer(File::create(path)?, &metadata)?;
    Ok(())
}

fn remove_from_cache(inputs_dir: &Path, feed: &IntermediateFeed<LocalResource>) -> Result<()> {
    fs::remove_file(inputs_dir.join(&feed.resource_name))?;
    fs::remove_file(inputs_dir.join(format!("{}.metadata", feed.resource_name)))?;
    Ok(())
}
