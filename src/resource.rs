//! Sources of input bytes and the on-disk cache keeping them fresh.
//!
//! A [Resource] abstracts where input data comes from; [cache_resources]
//! materialises resources into a workspace directory, refreshing only what
//! changed upstream. Each cached file gets a `<name>.metadata` JSON sidecar
//! holding its timestamps.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{DataError, Error, MultipleDataErrors, Result};

/// The "never" timestamp: resources which were never fetched report it
/// for both `last_modified` and `fetch_time`.
pub const DATETIME_MIN_UTC: DateTime<Utc> = DateTime::<Utc>::MIN_UTC;

pub(crate) const DATETIME_MAX_UTC: DateTime<Utc> = DateTime::<Utc>::MAX_UTC;

/// An abstract source of bytes with freshness metadata.
///
/// `last_modified` reflects the upstream state and `fetch_time` the moment
/// of the last successful [Resource::fetch]; both start at
/// [DATETIME_MIN_UTC].
pub trait Resource {
    fn last_modified(&self) -> DateTime<Utc>;
    fn set_last_modified(&mut self, when: DateTime<Utc>);
    fn fetch_time(&self) -> DateTime<Utc>;
    fn set_fetch_time(&mut self, when: DateTime<Utc>);

    /// Starts streaming the resource content.
    ///
    /// With `conditional` set, fails with [Error::InputNotModified] if the
    /// resource has not changed since `fetch_time`. On success, updates
    /// `fetch_time` to now and `last_modified` to the upstream value.
    fn fetch(&mut self, conditional: bool) -> Result<Box<dyn Read>>;

    /// Implementation-specific metadata persisted in the sidecar
    /// (e.g. an HTTP ETag).
    fn extra_metadata(&self) -> Option<serde_json::Value> {
        None
    }

    fn restore_extra_metadata(&mut self, _extra: serde_json::Value) {}
}

/// A file on the local filesystem; `last_modified` is its mtime.
#[derive(Debug, Clone)]
pub struct LocalResource {
    pub path: PathBuf,
    last_modified: DateTime<Utc>,
    fetch_time: DateTime<Utc>,
}

impl LocalResource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            last_modified: DATETIME_MIN_UTC,
            fetch_time: DATETIME_MIN_UTC,
        }
    }
}

impl Resource for LocalResource {
    fn last_modified(&self) -> DateTime<Utc> {
        self.last_modified
    }

    fn set_last_modified(&mut self, when: DateTime<Utc>) {
        self.last_modified = when;
    }

    fn fetch_time(&self) -> DateTime<Utc> {
        self.fetch_time
    }

    fn set_fetch_time(&mut self, when: DateTime<Utc>) {
        self.fetch_time = when;
    }

    fn fetch(&mut self, conditional: bool) -> Result<Box<dyn Read>> {
        let mtime: DateTime<Utc> = fs::metadata(&self.path)?.modified()?.into();
        if conditional && mtime <= self.fetch_time {
            return Err(Error::InputNotModified);
        }
        let file = File::open(&self.path)?;
        self.last_modified = mtime;
        self.fetch_time = Utc::now();
        Ok(Box::new(file))
    }
}

/// A resource fetched over HTTP.
///
/// Conditional fetches carry `If-Modified-Since` and, when an ETag is
/// known, `If-None-Match` headers; a 304 response maps to
/// [Error::InputNotModified]. The ETag is persisted through the sidecar's
/// extra metadata.
#[cfg(feature = "read-url")]
#[derive(Debug, Clone)]
pub struct HttpResource {
    pub url: String,
    etag: Option<String>,
    last_modified: DateTime<Utc>,
    fetch_time: DateTime<Utc>,
}

#[cfg(feature = "read-url")]
impl HttpResource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            etag: None,
            last_modified: DATETIME_MIN_UTC,
            fetch_time: DATETIME_MIN_UTC,
        }
    }
}

#[cfg(feature = "read-url")]
impl Resource for HttpResource {
    fn last_modified(&self) -> DateTime<Utc> {
        self.last_modified
    }

    fn set_last_modified(&mut self, when: DateTime<Utc>) {
        self.last_modified = when;
    }

    fn fetch_time(&self) -> DateTime<Utc> {
        self.fetch_time
    }

    fn set_fetch_time(&mut self, when: DateTime<Utc>) {
        self.fetch_time = when;
    }

    fn fetch(&mut self, conditional: bool) -> Result<Box<dyn Read>> {
        let client = reqwest::blocking::Client::new();
        let mut request = client.get(&self.url);
        if conditional {
            if self.last_modified != DATETIME_MIN_UTC {
                request = request.header(
                    reqwest::header::IF_MODIFIED_SINCE,
                    self.last_modified
                        .format("%a, %d %b %Y %H:%M:%S GMT")
                        .to_string(),
                );
            }
            if let Some(etag) = &self.etag {
                request = request.header(reqwest::header::IF_NONE_MATCH, etag.clone());
            }
        }

        let response = request.send()?;
        if conditional && response.status() == reqwest::StatusCode::NOT_MODIFIED {
            return Err(Error::InputNotModified);
        }
        let response = response.error_for_status()?;

        self.last_modified = response
            .headers()
            .get(reqwest::header::LAST_MODIFIED)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| DateTime::parse_from_rfc2822(value).ok())
            .map(|value| value.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);
        self.etag = response
            .headers()
            .get(reqwest::header::ETAG)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        self.fetch_time = Utc::now();
        Ok(Box::new(response))
    }

    fn extra_metadata(&self) -> Option<serde_json::Value> {
        self.etag
            .as_ref()
            .map(|etag| serde_json::json!({ "etag": etag }))
    }

    fn restore_extra_metadata(&mut self, extra: serde_json::Value) {
        if let Some(etag) = extra.get("etag").and_then(|v| v.as_str()) {
            self.etag = Some(etag.to_string());
        }
    }
}

/// Wraps another resource and forces not-modified for conditional fetches
/// within the cooldown period after the last successful fetch,
/// regardless of upstream.
pub struct TimeLimitedResource<R: Resource> {
    inner: R,
    cooldown: chrono::Duration,
}

impl<R: Resource> TimeLimitedResource<R> {
    pub fn new(inner: R, cooldown: chrono::Duration) -> Self {
        Self { inner, cooldown }
    }
}

impl<R: Resource> Resource for TimeLimitedResource<R> {
    fn last_modified(&self) -> DateTime<Utc> {
        self.inner.last_modified()
    }

    fn set_last_modified(&mut self, when: DateTime<Utc>) {
        self.inner.set_last_modified(when);
    }

    fn fetch_time(&self) -> DateTime<Utc> {
        self.inner.fetch_time()
    }

    fn set_fetch_time(&mut self, when: DateTime<Utc>) {
        self.inner.set_fetch_time(when);
    }

    fn fetch(&mut self, conditional: bool) -> Result<Box<dyn Read>> {
        if conditional && Utc::now() - self.inner.fetch_time() < self.cooldown {
            return Err(Error::InputNotModified);
        }
        self.inner.fetch(conditional)
    }

    fn extra_metadata(&self) -> Option<serde_json::Value> {
        self.inner.extra_metadata()
    }

    fn restore_extra_metadata(&mut self, extra: serde_json::Value) {
        self.inner.restore_extra_metadata(extra);
    }
}

/// Wraps another resource holding a zip archive and exposes one of its
/// members.
pub struct ZipResource<R: Resource> {
    inner: R,
    member: String,
}

impl<R: Resource> ZipResource<R> {
    pub fn new(inner: R, member: impl Into<String>) -> Self {
        Self {
            inner,
            member: member.into(),
        }
    }
}

impl<R: Resource> Resource for ZipResource<R> {
    fn last_modified(&self) -> DateTime<Utc> {
        self.inner.last_modified()
    }

    fn set_last_modified(&mut self, when: DateTime<Utc>) {
        self.inner.set_last_modified(when);
    }

    fn fetch_time(&self) -> DateTime<Utc> {
        self.inner.fetch_time()
    }

    fn set_fetch_time(&mut self, when: DateTime<Utc>) {
        self.inner.set_fetch_time(when);
    }

    fn fetch(&mut self, conditional: bool) -> Result<Box<dyn Read>> {
        let mut archive_bytes = Vec::new();
        self.inner
            .fetch(conditional)?
            .read_to_end(&mut archive_bytes)?;
        let mut archive = zip::ZipArchive::new(io::Cursor::new(archive_bytes))?;
        let mut member = archive.by_name(&self.member)?;
        let mut content = Vec::with_capacity(member.size() as usize);
        member.read_to_end(&mut content)?;
        Ok(Box::new(io::Cursor::new(content)))
    }

    fn extra_metadata(&self) -> Option<serde_json::Value> {
        self.inner.extra_metadata()
    }

    fn restore_extra_metadata(&mut self, extra: serde_json::Value) {
        self.inner.restore_extra_metadata(extra);
    }
}

/// A cached resource on disk, handed to tasks.
///
/// Readers are pure - they never re-fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct ManagedResource {
    pub path: PathBuf,
    pub last_modified: DateTime<Utc>,
    pub fetch_time: DateTime<Utc>,
}

impl ManagedResource {
    pub fn new(path: PathBuf, last_modified: DateTime<Utc>, fetch_time: DateTime<Utc>) -> Self {
        Self {
            path,
            last_modified,
            fetch_time,
        }
    }

    pub fn bytes(&self) -> Result<Vec<u8>> {
        Ok(fs::read(&self.path)?)
    }

    pub fn text(&self) -> Result<String> {
        Ok(fs::read_to_string(&self.path)?)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_reader(self.open_binary()?)?)
    }

    pub fn yaml<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_yaml::from_reader(self.open_binary()?)?)
    }

    pub fn csv(&self) -> Result<csv::Reader<File>> {
        Ok(csv::Reader::from_reader(File::open(&self.path)?))
    }

    pub fn open_binary(&self) -> Result<File> {
        Ok(File::open(&self.path)?)
    }

    pub fn open_text(&self) -> Result<BufReader<File>> {
        Ok(BufReader::new(File::open(&self.path)?))
    }

    pub fn size(&self) -> Result<u64> {
        Ok(fs::metadata(&self.path)?.len())
    }
}

/// The JSON object stored in `<name>.metadata` sidecar files.
#[derive(Debug, Serialize, Deserialize)]
struct Sidecar {
    last_modified: f64,
    fetch_time: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    extra: Option<serde_json::Value>,
}

fn sidecar_path(workspace: &Path, name: &str) -> PathBuf {
    workspace.join(format!("{name}.metadata"))
}

fn load_sidecar(path: &Path) -> Result<Option<Sidecar>> {
    if !path.exists() {
        return Ok(None);
    }
    let file = File::open(path)?;
    Ok(Some(serde_json::from_reader(file)?))
}

fn write_sidecar(path: &Path, sidecar: &Sidecar) -> Result<()> {
    let file = File::create(path)?;
    serde_json::to_writer(file, sidecar)?;
    Ok(())
}

pub(crate) fn unix_to_datetime(seconds: f64) -> DateTime<Utc> {
    let whole = seconds.floor();
    let nanos = ((seconds - whole) * 1e9) as u32;
    DateTime::from_timestamp(whole as i64, nanos).unwrap_or(DATETIME_MIN_UTC)
}

pub(crate) fn datetime_to_unix(when: DateTime<Utc>) -> f64 {
    when.timestamp() as f64 + f64::from(when.timestamp_subsec_nanos()) / 1e9
}

/// Streams a resource into `target`, replacing the file atomically.
///
/// Returns false (leaving the file untouched) when a conditional fetch
/// reports not-modified.
pub(crate) fn download_resource(
    resource: &mut dyn Resource,
    target: &Path,
    conditional: bool,
) -> Result<bool> {
    let mut reader = match resource.fetch(conditional) {
        Err(Error::InputNotModified) => return Ok(false),
        other => other?,
    };
    let dir = target.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = tempfile::NamedTempFile::new_in(dir)?;
    io::copy(&mut reader, temp.as_file_mut())?;
    temp.persist(target).map_err(|e| Error::Io(e.error))?;
    Ok(true)
}

/// Conditionally fetches every resource into the workspace, updating the
/// content files and their sidecars.
///
/// Returns the cached resources and whether at least one of them changed.
/// Fails with [Error::InputNotModified] when there are resources and
/// every single one was not-modified.
pub fn cache_resources(
    resources: &mut HashMap<String, Box<dyn Resource>>,
    workspace: &Path,
) -> Result<(HashMap<String, ManagedResource>, bool)> {
    fs::create_dir_all(workspace)?;
    let mut managed = HashMap::new();
    let mut any_changed = false;

    for (name, resource) in resources.iter_mut().sorted_by(|a, b| a.0.cmp(b.0)) {
        let content_path = workspace.join(name);
        let sidecar = sidecar_path(workspace, name);

        let has_sidecar = match load_sidecar(&sidecar)? {
            Some(meta) => {
                resource.set_last_modified(unix_to_datetime(meta.last_modified));
                resource.set_fetch_time(unix_to_datetime(meta.fetch_time));
                if let Some(extra) = meta.extra {
                    resource.restore_extra_metadata(extra);
                }
                true
            }
            None => false,
        };

        let conditional = has_sidecar && content_path.exists();
        log::debug!("Caching resource {name}");
        if download_resource(resource.as_mut(), &content_path, conditional)? {
            write_sidecar(
                &sidecar,
                &Sidecar {
                    last_modified: datetime_to_unix(resource.last_modified()),
                    fetch_time: datetime_to_unix(resource.fetch_time()),
                    extra: resource.extra_metadata(),
                },
            )?;
            log::info!("Refreshed resource {name}");
            any_changed = true;
        }

        managed.insert(
            name.clone(),
            ManagedResource::new(content_path, resource.last_modified(), resource.fetch_time()),
        );
    }

    if !any_changed && !resources.is_empty() {
        return Err(Error::InputNotModified);
    }
    Ok((managed, any_changed))
}

/// Returns the cached resources without fetching anything.
///
/// Every resource missing its content file contributes a
/// [DataError::ResourceNotCached] to a single [MultipleDataErrors].
pub fn ensure_resources_cached(
    resources: &HashMap<String, Box<dyn Resource>>,
    workspace: &Path,
) -> Result<HashMap<String, ManagedResource>> {
    let entries = MultipleDataErrors::catch_all(
        "ensure_resources_cached",
        resources.keys().sorted().map(|name| {
            let content_path = workspace.join(name);
            if !content_path.exists() {
                return Err(DataError::ResourceNotCached(name.clone()));
            }
            let (last_modified, fetch_time) = match load_sidecar(&sidecar_path(workspace, name)) {
                Ok(Some(meta)) => (
                    unix_to_datetime(meta.last_modified),
                    unix_to_datetime(meta.fetch_time),
                ),
                _ => (DATETIME_MIN_UTC, DATETIME_MIN_UTC),
            };
            Ok((
                name.clone(),
                ManagedResource::new(content_path, last_modified, fetch_time),
            ))
        }),
    )?;
    Ok(entries.into_iter().collect())
}

/// Materialises resources per the caching policy.
///
/// Under `from_cache`, no fetching happens and every resource must already
/// be cached. Otherwise resources are conditionally fetched; the returned
/// flag is false when every resource was not-modified (the cached copies
/// are still returned).
pub fn prepare_resources(
    resources: &mut HashMap<String, Box<dyn Resource>>,
    workspace: &Path,
    from_cache: bool,
) -> Result<(HashMap<String, ManagedResource>, bool)> {
    if from_cache {
        Ok((ensure_resources_cached(resources, workspace)?, true))
    } else {
        match cache_resources(resources, workspace) {
            Ok((managed, _)) => Ok((managed, true)),
            Err(Error::InputNotModified) => {
                Ok((ensure_resources_cached(resources, workspace)?, false))
            }
            Err(error) => Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::MockResource;

    fn boxed(resource: MockResource) -> Box<dyn Resource> {
        Box::new(resource)
    }

    #[test]
    fn local_resource_fetches_file_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input.txt");
        fs::write(&path, b"hello").unwrap();

        let mut resource = LocalResource::new(&path);
        let mut content = String::new();
        resource
            .fetch(false)
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "hello");
        assert!(resource.last_modified() > DATETIME_MIN_UTC);
        assert!(resource.fetch_time() > DATETIME_MIN_UTC);
    }

    #[test]
    fn local_resource_conditional_skips_unchanged_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input.txt");
        fs::write(&path, b"hello").unwrap();

        let mut resource = LocalResource::new(&path);
        resource.fetch(true).unwrap();
        assert!(matches!(
            resource.fetch(true),
            Err(Error::InputNotModified)
        ));
    }

    #[test]
    fn time_limited_resource_enforces_cooldown() {
        let mut resource = TimeLimitedResource::new(
            MockResource::new(b"payload"),
            chrono::Duration::hours(1),
        );
        resource.fetch(true).unwrap();
        // Upstream did change, but the cooldown forces not-modified.
        assert!(matches!(
            resource.fetch(true),
            Err(Error::InputNotModified)
        ));
        // Unconditional fetches bypass the cooldown.
        assert!(resource.fetch(false).is_ok());
    }

    #[test]
    fn cache_resources_fetches_and_writes_sidecars() {
        let dir = tempfile::tempdir().unwrap();
        let mut resources: HashMap<String, Box<dyn Resource>> =
            HashMap::from([("r.txt".to_string(), boxed(MockResource::new(b"payload")))]);

        let (managed, changed) = cache_resources(&mut resources, dir.path()).unwrap();
        assert!(changed);
        assert_eq!(managed["r.txt"].bytes().unwrap(), b"payload");
        assert!(dir.path().join("r.txt.metadata").exists());
    }

    #[test]
    fn cache_resources_raises_when_nothing_changed() {
        let dir = tempfile::tempdir().unwrap();
        let mut resources: HashMap<String, Box<dyn Resource>> =
            HashMap::from([("r.txt".to_string(), boxed(MockResource::new(b"payload")))]);

        cache_resources(&mut resources, dir.path()).unwrap();
        assert!(matches!(
            cache_resources(&mut resources, dir.path()),
            Err(Error::InputNotModified)
        ));
    }

    #[test]
    fn cache_resources_refreshes_changed_upstream() {
        let dir = tempfile::tempdir().unwrap();
        let mut resources: HashMap<String, Box<dyn Resource>> =
            HashMap::from([("r.txt".to_string(), boxed(MockResource::new(b"old")))]);
        cache_resources(&mut resources, dir.path()).unwrap();

        let mut resources: HashMap<String, Box<dyn Resource>> = HashMap::from([(
            "r.txt".to_string(),
            boxed(MockResource::new(b"new").touched()),
        )]);
        let (managed, changed) = cache_resources(&mut resources, dir.path()).unwrap();
        assert!(changed);
        assert_eq!(managed["r.txt"].bytes().unwrap(), b"new");
    }

    #[test]
    fn ensure_resources_cached_reports_every_missing_resource() {
        let dir = tempfile::tempdir().unwrap();
        let resources: HashMap<String, Box<dyn Resource>> = HashMap::from([
            ("a.txt".to_string(), boxed(MockResource::new(b""))),
            ("b.txt".to_string(), boxed(MockResource::new(b""))),
        ]);

        let err = ensure_resources_cached(&resources, dir.path()).unwrap_err();
        match err {
            Error::MultipleData(multiple) => {
                assert_eq!(multiple.errors.len(), 2);
                assert!(multiple
                    .errors
                    .iter()
                    .all(|e| matches!(e, DataError::ResourceNotCached(_))));
            }
            other => panic!("expected MultipleData, got {other:?}"),
        }
    }

    #[test]
    fn prepare_resources_translates_not_modified_into_proceed_false() {
        let dir = tempfile::tempdir().unwrap();
        let mut resources: HashMap<String, Box<dyn Resource>> =
            HashMap::from([("r.txt".to_string(), boxed(MockResource::new(b"payload")))]);

        let (_, proceed) = prepare_resources(&mut resources, dir.path(), false).unwrap();
        assert!(proceed);

        let (managed, proceed) = prepare_resources(&mut resources, dir.path(), false).unwrap();
        assert!(!proceed);
        assert_eq!(managed["r.txt"].bytes().unwrap(), b"payload");
    }

    #[test]
    fn sidecar_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("r.metadata");
        let original = Sidecar {
            last_modified: 1588291200.5,
            fetch_time: 1588291300.0,
            extra: Some(serde_json::json!({"etag": "xyz"})),
        };
        write_sidecar(&path, &original).unwrap();
        let loaded = load_sidecar(&path).unwrap().unwrap();
        assert_eq!(loaded.last_modified, original.last_modified);
        assert_eq!(loaded.fetch_time, original.fetch_time);
        assert_eq!(loaded.extra, original.extra);
    }

    #[test]
    fn unix_datetime_round_trip() {
        let when = unix_to_datetime(1588291200.25);
        assert!((datetime_to_unix(when) - 1588291200.25).abs() < 1e-6);
    }
}
