//! Folds multiple databases into the runtime database, reconciling
//! identifiers along the way.

use std::collections::{HashMap, HashSet};
use std::fs;

use itertools::Itertools;
use rusqlite::params_from_iter;

use crate::db::Database;
use crate::error::{DataError, Result};
use crate::model::{Entity, FeedInfo, LocationType, Route, RouteType, Stop};
use crate::task::{Task, TaskRuntime};
use crate::tools::geo::earth_distance_m;

/// One database queued for merging.
///
/// `resource_name` points at a [ManagedResource](crate::ManagedResource)
/// holding the database file; `prefix` makes ids unique across feeds.
/// The pre-merge tasks run against a temporary copy of the database,
/// just before it is merged.
pub struct DatabaseToMerge {
    pub resource_name: String,
    pub prefix: String,
    pub pre_merge_tasks: Vec<Box<dyn Task>>,
}

impl DatabaseToMerge {
    pub fn new(resource_name: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            resource_name: resource_name.into(),
            prefix: prefix.into(),
            pre_merge_tasks: Vec::new(),
        }
    }

    pub fn with_pre_merge_tasks(mut self, tasks: Vec<Box<dyn Task>>) -> Self {
        self.pre_merge_tasks = tasks;
        self
    }
}

/// The attributes deciding whether two routes are the same route.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RouteHash {
    agency_id: String,
    short_name: String,
    type_: RouteType,
    color: String,
}

impl RouteHash {
    fn of(route: &Route) -> Self {
        Self {
            agency_id: route.agency_id.clone(),
            short_name: route.short_name.clone(),
            type_: route.type_,
            color: route.color.clone(),
        }
    }
}

/// The attributes deciding whether two stops may be the same stop;
/// candidates additionally must lie within the configured distance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct StopHash {
    name: String,
    code: String,
    zone_id: String,
    location_type: LocationType,
    parent_station: String,
    wheelchair_boarding: Option<bool>,
    platform_code: String,
}

impl StopHash {
    fn of(stop: &Stop) -> Self {
        Self {
            name: stop.name.clone(),
            code: stop.code.clone(),
            zone_id: stop.zone_id.clone(),
            location_type: stop.location_type,
            parent_station: stop.parent_station.clone(),
            wheelchair_boarding: stop.wheelchair_boarding,
            platform_code: stop.platform_code.clone(),
        }
    }
}

struct ConflictResolution {
    /// (new_id, old_id) pairs for the bulk UPDATE of the incoming schema.
    ids_to_change: Vec<(String, String)>,
    total: usize,
    merged: usize,
}

/// Merge inserts data from the provided databases into the runtime one.
///
/// Ids are reconciled per entity: agencies and attributions merge by id;
/// routes and stops merge when their comparison attributes match
/// (suffix-renamed otherwise); calendars, trips and their dependants are
/// always prefixed with `<prefix><separator>`. Stop zone_ids are left
/// untouched, merging zones across feeds. See the type-level policies in
/// the methods below for FeedInfo handling.
pub struct Merge {
    databases_to_merge: Vec<DatabaseToMerge>,
    separator: String,
    feed_version_separator: String,
    distance_between_similar_stops_m: f64,

    known_routes: HashMap<RouteHash, String>,
    used_route_ids: HashSet<String>,
    known_stops: HashMap<StopHash, Vec<Stop>>,
    used_stop_ids: HashSet<String>,
    /// None if the runtime database already had a FeedInfo; otherwise the
    /// FeedInfo (or its absence) of every merged database.
    feed_infos: Option<Vec<Option<FeedInfo>>>,
}

impl Merge {
    pub fn new(databases_to_merge: Vec<DatabaseToMerge>) -> Self {
        Self {
            databases_to_merge,
            separator: ":".to_string(),
            feed_version_separator: "/".to_string(),
            distance_between_similar_stops_m: 10.0,
            known_routes: HashMap::new(),
            used_route_ids: HashSet::new(),
            known_stops: HashMap::new(),
            used_stop_ids: HashSet::new(),
            feed_infos: None,
        }
    }

    pub fn separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    pub fn feed_version_separator(mut self, separator: impl Into<String>) -> Self {
        self.feed_version_separator = separator.into();
        self
    }

    pub fn distance_between_similar_stops_m(mut self, distance: f64) -> Self {
        self.distance_between_similar_stops_m = distance;
        self
    }

    fn initialize_known_objects(&mut self, db: &Database) -> Result<()> {
        self.known_routes.clear();
        self.used_route_ids.clear();
        for route in db.retrieve_all::<Route>()? {
            self.used_route_ids.insert(route.id.clone());
            self.known_routes.insert(RouteHash::of(&route), route.id);
        }

        self.known_stops.clear();
        self.used_stop_ids.clear();
        for stop in db.retrieve_all::<Stop>()? {
            self.used_stop_ids.insert(stop.id.clone());
            self.known_stops
                .entry(StopHash::of(&stop))
                .or_default()
                .push(stop);
        }

        self.feed_infos = if db.count::<FeedInfo>()? > 0 {
            None
        } else {
            Some(Vec::new())
        };
        Ok(())
    }

    fn merge_one(
        &mut self,
        runtime: &mut TaskRuntime<'_>,
        db_to_merge: &mut DatabaseToMerge,
    ) -> Result<()> {
        let incoming = runtime
            .resources
            .get(&db_to_merge.resource_name)
            .ok_or_else(|| DataError::ResourceNotCached(db_to_merge.resource_name.clone()))?;

        // The incoming schema is mutated while merging; operate on a
        // temporary copy so the cached database stays reusable.
        let temp = tempfile::Builder::new()
            .prefix("impuls-merge")
            .suffix(&format!("{}.db", db_to_merge.prefix))
            .tempfile()?;
        fs::copy(&incoming.path, temp.path())?;

        if !db_to_merge.pre_merge_tasks.is_empty() {
            let temp_db = Database::open_existing(temp.path())?;
            {
                let mut pre_merge_runtime = TaskRuntime {
                    db: &temp_db,
                    resources: runtime.resources,
                    options: runtime.options,
                };
                for task in &mut db_to_merge.pre_merge_tasks {
                    log::info!(
                        "{}.PreMerge: executing task {}",
                        db_to_merge.prefix,
                        task.name()
                    );
                    if task.manages_own_transactions() {
                        task.execute(&mut pre_merge_runtime)?;
                    } else {
                        temp_db.transaction(|| task.execute(&mut pre_merge_runtime))?;
                    }
                }
            }
            temp_db.close()?;
        }

        let db = runtime.db;
        let temp_path = temp.path().to_string_lossy().into_owned();
        db.raw_execute("ATTACH DATABASE ? AS incoming", [temp_path.as_str()])?;
        let merged = db.transaction(|| self.merge_with_attached(db, &db_to_merge.prefix));
        let detached = db.raw_execute("DETACH DATABASE incoming", []);
        merged?;
        detached?;
        Ok(())
    }

    fn merge_with_attached(&mut self, db: &Database, prefix: &str) -> Result<()> {
        self.merge_agencies(db)?;
        self.merge_attributions(db)?;
        self.merge_routes(db)?;
        self.merge_stops(db)?;
        self.merge_calendars(db, prefix)?;
        self.merge_calendar_exceptions(db)?;
        self.merge_trips(db, prefix)?;
        self.merge_stop_times(db)?;
        self.collect_incoming_feed_info(db)
    }

    fn merge_agencies(&self, db: &Database) -> Result<()> {
        log::debug!("Joining Agencies");
        db.raw_execute("INSERT OR IGNORE INTO agencies SELECT * FROM incoming.agencies", [])?;
        Ok(())
    }

    fn merge_attributions(&self, db: &Database) -> Result<()> {
        log::debug!("Joining Attributions");
        db.raw_execute(
            "INSERT OR IGNORE INTO attributions SELECT * FROM incoming.attributions",
            [],
        )?;
        Ok(())
    }

    fn merge_routes(&mut self, db: &Database) -> Result<()> {
        log::debug!("Resolving Routes to merge");
        let resolution = self.resolve_route_conflicts(db)?;
        log::info!(
            "Merged {} out of {} Routes",
            resolution.merged,
            resolution.total
        );

        log::debug!("Joining Routes");
        db.raw_execute_many(
            "UPDATE incoming.routes SET route_id = ? WHERE route_id = ?",
            resolution
                .ids_to_change
                .iter()
                .map(|(new_id, old_id)| [new_id.as_str(), old_id.as_str()]),
        )?;
        // Only to-be-merged routes still collide - safe to ignore conflicts.
        db.raw_execute("INSERT OR IGNORE INTO routes SELECT * FROM incoming.routes", [])?;
        Ok(())
    }

    fn resolve_route_conflicts(&mut self, db: &Database) -> Result<ConflictResolution> {
        let mut ids_to_change = Vec::new();
        let mut total = 0;
        let mut merged = 0;

        for route in db.typed_query::<Route>("SELECT * FROM incoming.routes", [])? {
            total += 1;
            let hash = RouteHash::of(&route);
            let new_id = match self.known_routes.get(&hash) {
                Some(known_id) => {
                    merged += 1;
                    known_id.clone()
                }
                None => {
                    let id =
                        find_non_conflicting_id(&self.used_route_ids, &route.id, &self.separator);
                    self.used_route_ids.insert(id.clone());
                    self.known_routes.insert(hash, id.clone());
                    id
                }
            };
            if route.id != new_id {
                ids_to_change.push((new_id, route.id));
            }
        }

        Ok(ConflictResolution {
            ids_to_change,
            total,
            merged,
        })
    }

    fn merge_stops(&mut self, db: &Database) -> Result<()> {
        log::debug!("Resolving Stops to merge");
        let resolution = self.resolve_stop_conflicts(db)?;
        log::info!(
            "Merged {} out of {} Stops",
            resolution.merged,
            resolution.total
        );

        log::debug!("Joining Stops");
        db.raw_execute_many(
            "UPDATE incoming.stops SET stop_id = ? WHERE stop_id = ?",
            resolution
                .ids_to_change
                .iter()
                .map(|(new_id, old_id)| [new_id.as_str(), old_id.as_str()]),
        )?;
        db.raw_execute("INSERT OR IGNORE INTO stops SELECT * FROM incoming.stops", [])?;
        Ok(())
    }

    fn resolve_stop_conflicts(&mut self, db: &Database) -> Result<ConflictResolution> {
        let mut ids_to_change = Vec::new();
        let mut total = 0;
        let mut merged = 0;

        for stop in db.typed_query::<Stop>("SELECT * FROM incoming.stops", [])? {
            total += 1;
            let hash = StopHash::of(&stop);
            let candidates = self.known_stops.get(&hash).map_or(&[][..], Vec::as_slice);
            let similar = pick_closest_stop(
                &stop,
                candidates,
                self.distance_between_similar_stops_m,
            );

            let new_id = match similar {
                Some(similar) => {
                    merged += 1;
                    similar.id
                }
                None => {
                    let id =
                        find_non_conflicting_id(&self.used_stop_ids, &stop.id, &self.separator);
                    self.used_stop_ids.insert(id.clone());
                    // Remember the stop under its final id, so later feeds
                    // merge against the id actually present in the database.
                    let mut remembered = stop.clone();
                    remembered.id = id.clone();
                    self.known_stops.entry(hash).or_default().push(remembered);
                    id
                }
            };
            if stop.id != new_id {
                ids_to_change.push((new_id, stop.id));
            }
        }

        Ok(ConflictResolution {
            ids_to_change,
            total,
            merged,
        })
    }

    fn merge_calendars(&self, db: &Database, prefix: &str) -> Result<()> {
        log::debug!("Joining Calendars");
        // Prefixes must be globally unique - abort on any collision.
        db.raw_execute(
            "UPDATE incoming.calendars SET calendar_id = ? || ? || calendar_id",
            [prefix, self.separator.as_str()],
        )?;
        db.raw_execute("INSERT OR ABORT INTO calendars SELECT * FROM incoming.calendars", [])?;
        Ok(())
    }

    fn merge_calendar_exceptions(&self, db: &Database) -> Result<()> {
        log::debug!("Joining CalendarExceptions");
        // merge_calendars has already rewritten calendar_id.
        db.raw_execute(
            "INSERT OR ABORT INTO calendar_exceptions SELECT * FROM incoming.calendar_exceptions",
            [],
        )?;
        Ok(())
    }

    fn merge_trips(&self, db: &Database, prefix: &str) -> Result<()> {
        log::debug!("Joining Trips");
        // route_id and calendar_id were rewritten by the earlier steps.
        db.raw_execute(
            "UPDATE incoming.trips SET trip_id = ? || ? || trip_id",
            [prefix, self.separator.as_str()],
        )?;
        db.raw_execute(
            "UPDATE incoming.trips SET block_id = ? || ? || block_id WHERE block_id IS NOT NULL",
            [prefix, self.separator.as_str()],
        )?;
        db.raw_execute(
            "UPDATE incoming.trips SET shape_id = ? || ? || shape_id WHERE shape_id IS NOT NULL",
            [prefix, self.separator.as_str()],
        )?;
        db.raw_execute("INSERT OR ABORT INTO trips SELECT * FROM incoming.trips", [])?;
        Ok(())
    }

    fn merge_stop_times(&self, db: &Database) -> Result<()> {
        log::debug!("Joining StopTimes");
        // stop_id and trip_id were rewritten by the earlier steps.
        db.raw_execute(
            "INSERT OR ABORT INTO stop_times SELECT * FROM incoming.stop_times",
            [],
        )?;
        Ok(())
    }

    fn collect_incoming_feed_info(&mut self, db: &Database) -> Result<()> {
        if let Some(feed_infos) = &mut self.feed_infos {
            log::debug!("Collecting FeedInfo");
            feed_infos.push(
                db.typed_query::<FeedInfo>("SELECT * FROM incoming.feed_info", [])?
                    .one(),
            );
        }
        Ok(())
    }

    fn insert_feed_info(&self, db: &Database) -> Result<()> {
        // None: the runtime database had a FeedInfo before merging - keep it.
        let feed_infos = match &self.feed_infos {
            None => return Ok(()),
            Some(feed_infos) => feed_infos,
        };
        if feed_infos.is_empty() {
            return Ok(());
        }

        // Only write a FeedInfo when every merged database had one.
        let all: Option<Vec<&FeedInfo>> = feed_infos.iter().map(Option::as_ref).collect();
        let all = match all {
            None => return Ok(()),
            Some(all) => all,
        };

        let mut new_feed_info = all[0].clone();
        new_feed_info.version = all
            .iter()
            .map(|fi| fi.version.as_str())
            .join(&self.feed_version_separator);
        db.raw_execute(
            &format!(
                "INSERT OR REPLACE INTO {} {} VALUES {}",
                FeedInfo::TABLE,
                FeedInfo::COLUMNS,
                FeedInfo::PLACEHOLDERS
            ),
            params_from_iter(new_feed_info.marshall()),
        )?;
        Ok(())
    }
}

impl Task for Merge {
    fn name(&self) -> &str {
        "Merge"
    }

    fn execute(&mut self, runtime: &mut TaskRuntime<'_>) -> Result<()> {
        log::info!("Collecting data about existing routes and stops");
        self.initialize_known_objects(runtime.db)?;

        let mut databases = std::mem::take(&mut self.databases_to_merge);
        let count = databases.len();
        let result = (|| {
            for (i, db_to_merge) in databases.iter_mut().enumerate() {
                log::info!("Merging {} ({}/{})", db_to_merge.prefix, i + 1, count);
                self.merge_one(runtime, db_to_merge)?;
            }
            log::info!("Resolving FeedInfo");
            self.insert_feed_info(runtime.db)
        })();
        self.databases_to_merge = databases;
        result
    }

    fn manages_own_transactions(&self) -> bool {
        true
    }
}

/// Picks the closest of the candidate stops, as long as it lies within
/// `max_distance_m` of the incoming stop.
fn pick_closest_stop(incoming: &Stop, candidates: &[Stop], max_distance_m: f64) -> Option<Stop> {
    candidates
        .iter()
        .map(|stop| {
            (
                stop,
                earth_distance_m(incoming.lat, incoming.lon, stop.lat, stop.lon),
            )
        })
        .filter(|(_, distance)| *distance <= max_distance_m)
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(stop, _)| stop.clone())
}

/// Finds the lowest numeric suffix (joined with the separator) making the
/// id distinct from every used one.
fn find_non_conflicting_id(used: &HashSet<String>, id: &str, separator: &str) -> String {
    if !used.contains(id) {
        return id.to_string();
    }
    let mut suffix = 1u64;
    loop {
        let candidate = format!("{id}{separator}{suffix}");
        if !used.contains(&candidate) {
            return candidate;
        }
        suffix += 1;
    }
}
