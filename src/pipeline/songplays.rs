//! The `songplays` fact table: song plays matched against the catalog.

use datafusion::dataframe::DataFrame;
use datafusion::error::DataFusionError;
use datafusion::functions_window::expr_fn::row_number;
use datafusion::logical_expr::{ExprFunctionExt, JoinType};
use datafusion::prelude::Expr;

use super::conform;
use super::logs::datetime_part;
use crate::config::MatchMode;
use crate::schema::{Column, DerivedField, LogField, SongField, SongplaysColumn};

/// Join keys between log events and catalog records.
fn join_keys(mode: MatchMode) -> Vec<(LogField, SongField)> {
    let mut keys = vec![(LogField::Artist, SongField::ArtistName)];
    if mode == MatchMode::ArtistTitleDuration {
        keys.push((LogField::Song, SongField::Title));
        keys.push((LogField::Length, SongField::Duration));
    }
    keys
}

/// Row number over the matched plays in event order. Unique within one run.
fn songplay_id() -> Result<Expr, DataFusionError> {
    row_number()
        .order_by(vec![
            DerivedField::DateTime.col().sort(true, true),
            LogField::UserId.col().sort(true, true),
            LogField::SessionId.col().sort(true, true),
            LogField::ItemInSession.col().sort(true, true),
            SongField::SongId.col().sort(true, true),
            SongField::ArtistId.col().sort(true, true),
        ])
        .build()
}

/// Inner-join decorated `NextSong` events with the raw catalog. Events
/// without a match are dropped, and null keys never match.
pub fn extract_songplays(
    events: DataFrame,
    catalog: DataFrame,
    mode: MatchMode,
) -> Result<DataFrame, DataFusionError> {
    let on: Vec<Expr> = join_keys(mode)
        .into_iter()
        .map(|(event, song)| event.col().eq(song.col()))
        .collect();

    let plays = events
        .alias("events")?
        .join_on(catalog.alias("catalog")?, JoinType::Inner, on)?
        .select(vec![
            songplay_id()?.alias(SongplaysColumn::SongplayId.name()),
            DerivedField::DateTime.col().alias(SongplaysColumn::StartTime.name()),
            LogField::UserId.col().alias(SongplaysColumn::UserId.name()),
            LogField::Level.col().alias(SongplaysColumn::Level.name()),
            SongField::SongId.col().alias(SongplaysColumn::SongId.name()),
            SongField::ArtistId.col().alias(SongplaysColumn::ArtistId.name()),
            LogField::SessionId.col().alias(SongplaysColumn::SessionId.name()),
            LogField::Location.col().alias(SongplaysColumn::Location.name()),
            LogField::UserAgent.col().alias(SongplaysColumn::UserAgent.name()),
            datetime_part("year").alias(SongplaysColumn::Year.name()),
            datetime_part("month").alias(SongplaysColumn::Month.name()),
        ])?;
    conform::<SongplaysColumn>(plays)
}
