//! End-to-end scenarios exercising pipelines, the resource cache and the
//! multi-file orchestrator together.

use std::collections::HashMap;
use std::path::Path;

use chrono::NaiveDate;

use crate::db::Database;
use crate::error::{DataError, Error};
use crate::model::{
    Agency, Calendar, CalendarException, ExceptionType, FeedInfo, Route, RouteType, SqlValue,
    Stop, StopTime, TimePoint, Trip,
};
use crate::multi_file::{IntermediateFeed, IntermediateFeedProvider, MultiFile};
use crate::options::PipelineOptions;
use crate::pipeline::Pipeline;
use crate::resource::{LocalResource, Resource};
use crate::task::Task;
use crate::tasks::{AddEntity, TruncateCalendars};
use crate::tools::temporal::DateRange;
use crate::tools::testing::MockResource;

fn d(month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, month, day).unwrap()
}

fn options_in(workspace: &Path) -> PipelineOptions {
    PipelineOptions {
        workspace_directory: workspace.to_path_buf(),
        ..PipelineOptions::default()
    }
}

fn agency(id: &str, name: &str) -> Agency {
    Agency {
        id: id.to_string(),
        name: name.to_string(),
        url: "https://example.com".to_string(),
        timezone: "Europe/Warsaw".to_string(),
        ..Agency::default()
    }
}

fn weekday_calendar(id: &str, weekdays: [bool; 7]) -> Calendar {
    Calendar {
        id: id.to_string(),
        monday: weekdays[0],
        tuesday: weekdays[1],
        wednesday: weekdays[2],
        thursday: weekdays[3],
        friday: weekdays[4],
        saturday: weekdays[5],
        sunday: weekdays[6],
        start_date: d(4, 1),
        end_date: d(5, 31),
        desc: String::new(),
    }
}

fn string_column(db: &Database, sql: &str) -> Vec<String> {
    db.raw_execute(sql, [])
        .unwrap()
        .map(|row| match &row[0] {
            SqlValue::Text(x) => x.clone(),
            other => panic!("expected TEXT, got {other:?}"),
        })
        .collect()
}

#[test]
fn pipeline_with_a_single_add_entity_task() {
    let dir = tempfile::tempdir().unwrap();
    let tasks: Vec<Box<dyn Task>> = vec![
        Box::new(AddEntity::new(agency("0", "Existing Agency"))),
        Box::new(AddEntity::new(agency("1", "New Agency"))),
    ];
    let mut pipeline = Pipeline::new(tasks, HashMap::new(), options_in(dir.path())).unwrap();
    pipeline.run().unwrap();

    let agencies: Vec<Agency> = pipeline.db.retrieve_all().unwrap().all();
    assert_eq!(agencies.len(), 2);
    assert_eq!(agencies[0].id, "0");
    assert_eq!(agencies[1].id, "1");
    assert_eq!(agencies[1].name, "New Agency");
    assert_eq!(agencies[1].url, "https://example.com");
    assert_eq!(agencies[1].timezone, "Europe/Warsaw");
}

#[test]
fn truncate_calendars_converts_everything_to_exceptions() {
    let dir = tempfile::tempdir().unwrap();
    let target = DateRange::bounded(d(5, 1), d(5, 10));
    let tasks: Vec<Box<dyn Task>> = vec![Box::new(TruncateCalendars::new(target))];
    let mut pipeline = Pipeline::new(tasks, HashMap::new(), options_in(dir.path())).unwrap();

    // Mon-Thu, Fri, Sat and Sun services; 2020-05-01 (a Friday, public
    // holiday) runs the Sunday timetable instead of the Friday one.
    let db = &pipeline.db;
    let t = true;
    let f = false;
    db.create(&weekday_calendar("Mon-Thu", [t, t, t, t, f, f, f]))
        .unwrap();
    db.create(&weekday_calendar("Fri", [f, f, f, f, t, f, f])).unwrap();
    db.create(&weekday_calendar("Sat", [f, f, f, f, f, t, f])).unwrap();
    db.create(&weekday_calendar("Sun", [f, f, f, f, f, f, t])).unwrap();
    db.create(&CalendarException {
        calendar_id: "Fri".to_string(),
        date: d(5, 1),
        exception_type: ExceptionType::Removed,
    })
    .unwrap();
    db.create(&CalendarException {
        calendar_id: "Sun".to_string(),
        date: d(5, 1),
        exception_type: ExceptionType::Added,
    })
    .unwrap();

    pipeline.run().unwrap();
    let db = &pipeline.db;

    let mut by_calendar: HashMap<String, Vec<NaiveDate>> = HashMap::new();
    for exception in db.retrieve_all::<CalendarException>().unwrap() {
        assert_eq!(exception.exception_type, ExceptionType::Added);
        by_calendar
            .entry(exception.calendar_id)
            .or_default()
            .push(exception.date);
    }
    assert_eq!(
        by_calendar["Mon-Thu"],
        vec![d(5, 4), d(5, 5), d(5, 6), d(5, 7)]
    );
    assert_eq!(by_calendar["Fri"], vec![d(5, 8)]);
    assert_eq!(by_calendar["Sat"], vec![d(5, 2), d(5, 9)]);
    assert_eq!(by_calendar["Sun"], vec![d(5, 1), d(5, 3), d(5, 10)]);

    // Every calendar is now exception-based.
    for calendar in db.retrieve_all::<Calendar>().unwrap() {
        assert!(!calendar.monday && !calendar.sunday && !calendar.saturday);
        assert_eq!(calendar.start_date, crate::model::types::signals_exceptions());
        assert_eq!(calendar.end_date, crate::model::types::signals_exceptions());
    }
}

#[test]
fn cache_miss_under_from_cache() {
    let dir = tempfile::tempdir().unwrap();
    let resources: HashMap<String, Box<dyn Resource>> =
        HashMap::from([("r".to_string(), Box::new(MockResource::new(b"x")) as _)]);
    let options = PipelineOptions {
        from_cache: true,
        ..options_in(dir.path())
    };
    let mut pipeline = Pipeline::new(Vec::new(), resources, options).unwrap();

    match pipeline.run().unwrap_err() {
        Error::MultipleData(multiple) => {
            assert_eq!(multiple.errors.len(), 1);
            assert!(matches!(
                &multiple.errors[0],
                DataError::ResourceNotCached(name) if name == "r"
            ));
        }
        other => panic!("expected MultipleData, got {other:?}"),
    }
}

#[test]
fn pipeline_propagates_input_not_modified() {
    let dir = tempfile::tempdir().unwrap();
    let make_resources = || -> HashMap<String, Box<dyn Resource>> {
        HashMap::from([("r".to_string(), Box::new(MockResource::new(b"x")) as _)])
    };

    let mut pipeline =
        Pipeline::new(Vec::new(), make_resources(), options_in(dir.path())).unwrap();
    pipeline.run().unwrap();

    // Unchanged upstream: the task list must never execute.
    let tasks: Vec<Box<dyn Task>> = vec![Box::new(AddEntity::new(agency("0", "A")))];
    let mut pipeline = Pipeline::new(tasks, make_resources(), options_in(dir.path())).unwrap();
    assert!(matches!(pipeline.run(), Err(Error::InputNotModified)));
    assert_eq!(pipeline.db.count::<Agency>().unwrap(), 0);

    // force_run falls back to the cached resources and proceeds.
    let tasks: Vec<Box<dyn Task>> = vec![Box::new(AddEntity::new(agency("0", "A")))];
    let options = PipelineOptions {
        force_run: true,
        ..options_in(dir.path())
    };
    let mut pipeline = Pipeline::new(tasks, make_resources(), options).unwrap();
    pipeline.run().unwrap();
    assert_eq!(pipeline.db.count::<Agency>().unwrap(), 1);
}

#[test]
fn save_db_in_workspace_creates_a_file() {
    let dir = tempfile::tempdir().unwrap();
    let options = PipelineOptions {
        save_db_in_workspace: true,
        ..options_in(dir.path())
    };
    let mut pipeline = Pipeline::new(Vec::new(), HashMap::new(), options).unwrap();
    pipeline.run().unwrap();
    assert!(dir.path().join("impuls.db").exists());
}

// Orchestrator end to end: two versioned feeds, each loaded by AddEntity
// tasks, merged into one continuous database.

struct TwoVersionProvider;

impl IntermediateFeedProvider for TwoVersionProvider {
    type Res = MockResource;

    fn needed(&mut self) -> crate::Result<Vec<IntermediateFeed<MockResource>>> {
        Ok(vec![
            IntermediateFeed {
                resource: MockResource::new(b"1"),
                resource_name: "1.txt".to_string(),
                version: "1".to_string(),
                start_date: d(5, 1),
            },
            IntermediateFeed {
                resource: MockResource::new(b"2"),
                resource_name: "2.txt".to_string(),
                version: "2".to_string(),
                start_date: d(5, 11),
            },
        ])
    }
}

fn load_version_tasks(feed: &IntermediateFeed<LocalResource>) -> Vec<Box<dyn Task>> {
    vec![
        Box::new(AddEntity::new(agency("0", "Example Agency"))),
        Box::new(AddEntity::new(Route {
            id: "A1".to_string(),
            agency_id: "0".to_string(),
            short_name: "A1".to_string(),
            long_name: String::new(),
            type_: RouteType::Rail,
            color: "AA0000".to_string(),
            text_color: String::new(),
            sort_order: None,
        })),
        Box::new(AddEntity::new(Calendar {
            id: "C".to_string(),
            monday: true,
            tuesday: true,
            wednesday: true,
            thursday: true,
            friday: true,
            saturday: true,
            sunday: true,
            start_date: d(5, 1),
            end_date: d(5, 31),
            desc: String::new(),
        })),
        Box::new(AddEntity::new(Stop {
            id: "s1".to_string(),
            name: "Example Stop".to_string(),
            lat: 52.227687,
            lon: 21.000156,
            ..Stop::default()
        })),
        Box::new(AddEntity::new(Trip {
            id: "T".to_string(),
            route_id: "A1".to_string(),
            calendar_id: "C".to_string(),
            ..Trip::default()
        })),
        Box::new(AddEntity::new(StopTime {
            trip_id: "T".to_string(),
            stop_id: "s1".to_string(),
            stop_sequence: 0,
            arrival_time: TimePoint::from_hms(5, 0, 0),
            departure_time: TimePoint::from_hms(5, 0, 0),
            ..StopTime::default()
        })),
        Box::new(AddEntity::new(FeedInfo {
            publisher_name: "Example Publisher".to_string(),
            publisher_url: "https://example.com".to_string(),
            lang: "pl".to_string(),
            version: feed.version.clone(),
            ..FeedInfo::default()
        })),
    ]
}

#[test]
fn orchestrator_merges_two_versions_into_one_feed() {
    let dir = tempfile::tempdir().unwrap();
    let mut mf = MultiFile::new(
        options_in(dir.path()),
        TwoVersionProvider,
        Box::new(load_version_tasks),
    );
    let mut pipelines = mf.prepare().unwrap();
    assert_eq!(pipelines.intermediates.len(), 2);
    pipelines.run().unwrap();

    let db = &pipelines.final_pipeline.db;
    assert_eq!(db.count::<Agency>().unwrap(), 1);
    assert_eq!(
        string_column(db, "SELECT route_id FROM routes ORDER BY route_id"),
        vec!["A1"]
    );
    assert_eq!(
        string_column(db, "SELECT stop_id FROM stops ORDER BY stop_id"),
        vec!["s1"]
    );
    assert_eq!(
        string_column(db, "SELECT calendar_id FROM calendars ORDER BY calendar_id"),
        vec!["1:C", "2:C"]
    );
    assert_eq!(
        string_column(db, "SELECT trip_id FROM trips ORDER BY trip_id"),
        vec!["1:T", "2:T"]
    );
    assert_eq!(
        string_column(db, "SELECT trip_id FROM stop_times ORDER BY trip_id"),
        vec!["1:T", "2:T"]
    );
    assert_eq!(
        string_column(db, "SELECT version FROM feed_info"),
        vec!["1/2"]
    );

    // The first feed is truncated to end the day before the second
    // starts; the second keeps running to the end of its calendar.
    let may_first_half: Vec<String> = string_column(
        db,
        "SELECT date FROM calendar_exceptions WHERE calendar_id = '1:C' ORDER BY date",
    );
    assert_eq!(may_first_half.len(), 10);
    assert_eq!(may_first_half.first().map(String::as_str), Some("2020-05-01"));
    assert_eq!(may_first_half.last().map(String::as_str), Some("2020-05-10"));

    let may_second_half: Vec<String> = string_column(
        db,
        "SELECT date FROM calendar_exceptions WHERE calendar_id = '2:C' ORDER BY date",
    );
    assert_eq!(may_second_half.len(), 21);
    assert_eq!(may_second_half.first().map(String::as_str), Some("2020-05-11"));
    assert_eq!(may_second_half.last().map(String::as_str), Some("2020-05-31"));
}
