//! Mock objects for exercising pipelines and the resource cache in tests.

use std::io::{Cursor, Read};

use chrono::{DateTime, TimeZone, Utc};

use crate::error::{Error, Result};
use crate::resource::{Resource, DATETIME_MIN_UTC};

/// An in-memory [Resource] with a controllable upstream modification time.
///
/// A fresh mock reports one upstream change; call [MockResource::touch]
/// (or build with [MockResource::touched]) to simulate further changes.
pub struct MockResource {
    pub content: Vec<u8>,
    pub fetch_count: u32,
    upstream_modified: DateTime<Utc>,
    last_modified: DateTime<Utc>,
    fetch_time: DateTime<Utc>,
}

impl MockResource {
    pub fn new(content: &[u8]) -> Self {
        Self {
            content: content.to_vec(),
            fetch_count: 0,
            upstream_modified: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
            last_modified: DATETIME_MIN_UTC,
            fetch_time: DATETIME_MIN_UTC,
        }
    }

    /// Simulates an upstream change.
    pub fn touch(&mut self) {
        self.upstream_modified = Utc::now();
    }

    pub fn touched(mut self) -> Self {
        self.touch();
        self
    }
}

impl Resource for MockResource {
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
        if conditional && self.upstream_modified <= self.fetch_time {
            return Err(Error::InputNotModified);
        }
        self.fetch_count += 1;
        self.last_modified = self.upstream_modified;
        self.fetch_time = Utc::now();
        Ok(Box::new(Cursor::new(self.content.clone())))
    }
}
