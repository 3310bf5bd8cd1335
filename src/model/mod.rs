//! The transit data model: entity records with bidirectional SQL and GTFS
//! codecs, plus the auxiliary value types they use.

pub(crate) mod meta;
pub mod types;

mod agency;
mod attribution;
mod calendar;
mod calendar_exception;
mod extra_table_row;
mod fare_attribute;
mod fare_rule;
mod feed_info;
mod frequency;
mod route;
mod shape_point;
mod stop;
mod stop_time;
mod transfer;
mod translation;
mod trip;

pub use agency::Agency;
pub use attribution::Attribution;
pub use calendar::Calendar;
pub use calendar_exception::{CalendarException, ExceptionType};
pub use extra_table_row::ExtraTableRow;
pub use fare_attribute::{FareAttribute, PaymentMethod, TransferLimit};
pub use fare_rule::FareRule;
pub use feed_info::FeedInfo;
pub use frequency::Frequency;
pub use meta::{Entity, GtfsEntity, SqlValue};
pub use route::{Route, RouteType};
pub use shape_point::ShapePoint;
pub use stop::{LocationType, Stop};
pub use stop_time::{PassengerExchange, StopTime};
pub use transfer::{Transfer, TransferType};
pub use translation::Translation;
pub use trip::{Direction, Trip};
pub use types::TimePoint;

/// DDL of every table of the model, in an order satisfying foreign keys.
pub(crate) fn schema_statements() -> [&'static str; 16] {
    [
        Agency::CREATE_TABLE,
        Attribution::CREATE_TABLE,
        FeedInfo::CREATE_TABLE,
        Calendar::CREATE_TABLE,
        CalendarException::CREATE_TABLE,
        Route::CREATE_TABLE,
        Stop::CREATE_TABLE,
        ShapePoint::CREATE_TABLE,
        Trip::CREATE_TABLE,
        StopTime::CREATE_TABLE,
        Frequency::CREATE_TABLE,
        FareAttribute::CREATE_TABLE,
        FareRule::CREATE_TABLE,
        Transfer::CREATE_TABLE,
        Translation::CREATE_TABLE,
        ExtraTableRow::CREATE_TABLE,
    ]
}
