//! Log events pipeline: timestamp decoration, the `NextSong` filter, and the
//! `users` and `time` dimensions.

use arrow::datatypes::{DataType, TimeUnit};
use datafusion::dataframe::DataFrame;
use datafusion::error::DataFusionError;
use datafusion::functions::expr_fn::{date_part, to_char};
use datafusion::functions_window::expr_fn::row_number;
use datafusion::logical_expr::ExprFunctionExt;
use datafusion::prelude::{Expr, cast, ident, lit};

use super::conform;
use crate::config::LevelPolicy;
use crate::schema::{Column, DerivedField, LogField, NEXT_SONG_PAGE, TimeColumn, UsersColumn};

/// `datetime` rendering, UTC.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const MILLIS_PER_SECOND: i64 = 1000;

/// Window column ranking a user's events, newest first.
const RECENCY_RANK: &str = "__recency_rank";

fn seconds_timestamp() -> DataType {
    DataType::Timestamp(TimeUnit::Second, None)
}

/// `ts` in whole epoch seconds, truncated toward zero. A non-numeric `ts`
/// fails the cast when the plan executes.
fn epoch_seconds() -> Expr {
    cast(LogField::Ts.col(), DataType::Int64) / lit(MILLIS_PER_SECOND)
}

/// A calendar part of the `datetime` text as `Int32`.
pub(crate) fn datetime_part(part: &str) -> Expr {
    let datetime = cast(DerivedField::DateTime.col(), seconds_timestamp());
    cast(date_part(lit(part), datetime), DataType::Int32)
}

/// Append `timestamp` (epoch seconds as text) and `datetime`
/// (`YYYY-MM-DD HH:MM:SS`, UTC), both derived from `ts` in milliseconds.
pub fn decorate_timestamps(logs: DataFrame) -> Result<DataFrame, DataFusionError> {
    logs.with_column(
        DerivedField::Timestamp.name(),
        cast(epoch_seconds(), DataType::Utf8),
    )?
    .with_column(
        DerivedField::DateTime.name(),
        to_char(cast(epoch_seconds(), seconds_timestamp()), lit(DATETIME_FORMAT)),
    )
}

/// Song plays only. A null page never matches.
pub fn next_song_events(decorated: DataFrame) -> Result<DataFrame, DataFusionError> {
    decorated.filter(LogField::Page.col().eq(lit(NEXT_SONG_PAGE)))
}

/// Keep each user's most recent event. Equal `ts` values fall back to the
/// user's attributes so the pick does not depend on row order.
fn latest_per_user(events: DataFrame) -> Result<DataFrame, DataFusionError> {
    let rank = row_number()
        .partition_by(vec![LogField::UserId.col()])
        .order_by(vec![
            cast(LogField::Ts.col(), DataType::Int64).sort(false, false),
            LogField::Level.col().sort(true, true),
            LogField::FirstName.col().sort(true, true),
            LogField::LastName.col().sort(true, true),
            LogField::Gender.col().sort(true, true),
        ])
        .build()?;

    events
        .with_column(RECENCY_RANK, rank)?
        .filter(ident(RECENCY_RANK).eq(lit(1_u64)))
}

/// Users seen in song plays.
pub fn extract_users(events: DataFrame, policy: LevelPolicy) -> Result<DataFrame, DataFusionError> {
    let events = match policy {
        LevelPolicy::AllLevels => events,
        LevelPolicy::Latest => latest_per_user(events)?,
    };

    let users = events
        .select(vec![
            LogField::UserId.col().alias(UsersColumn::UserId.name()),
            LogField::FirstName.col().alias(UsersColumn::FirstName.name()),
            LogField::LastName.col().alias(UsersColumn::LastName.name()),
            LogField::Gender.col().alias(UsersColumn::Gender.name()),
            LogField::Level.col().alias(UsersColumn::Level.name()),
        ])?
        .distinct()?;
    conform::<UsersColumn>(users)
}

/// One row per distinct event time, broken into calendar parts. Weekday
/// counts Sunday as 1 and week is the ISO week.
pub fn extract_time(decorated: DataFrame) -> Result<DataFrame, DataFusionError> {
    let time = decorated
        .select(vec![
            DerivedField::DateTime.col().alias(TimeColumn::StartTime.name()),
            datetime_part("hour").alias(TimeColumn::Hour.name()),
            datetime_part("day").alias(TimeColumn::Day.name()),
            datetime_part("week").alias(TimeColumn::Week.name()),
            datetime_part("month").alias(TimeColumn::Month.name()),
            datetime_part("year").alias(TimeColumn::Year.name()),
            (datetime_part("dow") + lit(1_i32)).alias(TimeColumn::Weekday.name()),
        ])?
        .distinct()?;
    conform::<TimeColumn>(time)
}
