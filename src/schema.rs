//! Fixed, enumerated schemas for every input and output table.
//!
//! Pipelines never reference columns by free-form strings: each table has a
//! column enum generated by [`columns!`], and plans turn those into
//! DataFusion column expressions.

use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use datafusion::prelude::{Expr, ident};
use std::fmt;
use std::sync::Arc;

/// Anything that names a column.
pub trait Column {
    fn name(&self) -> &'static str;

    /// Unqualified column reference. Names are taken verbatim, so camelCase
    /// source fields keep their case.
    fn col(&self) -> Expr {
        ident(self.name())
    }
}

/// A closed set of typed columns making up one table.
pub trait TableColumns: Column + Copy + Sized + 'static {
    /// All columns in table order.
    fn all() -> &'static [Self];

    /// Arrow type of this column.
    fn data_type(&self) -> DataType;

    /// Arrow schema of the table. All columns are nullable.
    fn schema() -> SchemaRef {
        let fields: Vec<Field> = Self::all()
            .iter()
            .map(|c| Field::new(c.name(), c.data_type(), true))
            .collect();
        Arc::new(Schema::new(fields))
    }
}

/// Declares a column enum together with its names and Arrow types.
macro_rules! columns {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $($variant:ident => ($column:literal, $data_type:expr)),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $name {
            $($variant),+
        }

        impl $crate::schema::Column for $name {
            fn name(&self) -> &'static str {
                match self {
                    $($name::$variant => $column),+
                }
            }
        }

        impl $crate::schema::TableColumns for $name {
            fn all() -> &'static [Self] {
                &[$($name::$variant),+]
            }

            fn data_type(&self) -> DataType {
                match self {
                    $($name::$variant => $data_type),+
                }
            }
        }
    };
}

// ============ Inputs ============

columns! {
    /// Song catalog record as read from `song_data`.
    pub enum SongField {
        NumSongs => ("num_songs", DataType::Int64),
        ArtistId => ("artist_id", DataType::Utf8),
        ArtistLatitude => ("artist_latitude", DataType::Float64),
        ArtistLongitude => ("artist_longitude", DataType::Float64),
        ArtistLocation => ("artist_location", DataType::Utf8),
        ArtistName => ("artist_name", DataType::Utf8),
        SongId => ("song_id", DataType::Utf8),
        Title => ("title", DataType::Utf8),
        Duration => ("duration", DataType::Float64),
        Year => ("year", DataType::Int32),
    }
}

columns! {
    /// Listening-session event as read from `log_data`.
    ///
    /// `ts` is kept as text until derivation so that a non-numeric value
    /// fails the timestamp derivation rather than the read.
    pub enum LogField {
        Artist => ("artist", DataType::Utf8),
        Auth => ("auth", DataType::Utf8),
        FirstName => ("firstName", DataType::Utf8),
        Gender => ("gender", DataType::Utf8),
        ItemInSession => ("itemInSession", DataType::Int64),
        LastName => ("lastName", DataType::Utf8),
        Length => ("length", DataType::Float64),
        Level => ("level", DataType::Utf8),
        Location => ("location", DataType::Utf8),
        Method => ("method", DataType::Utf8),
        Page => ("page", DataType::Utf8),
        Registration => ("registration", DataType::Float64),
        SessionId => ("sessionId", DataType::Int64),
        Song => ("song", DataType::Utf8),
        Status => ("status", DataType::Int64),
        Ts => ("ts", DataType::Utf8),
        UserAgent => ("userAgent", DataType::Utf8),
        UserId => ("userId", DataType::Utf8),
    }
}

columns! {
    /// Columns added to the log events by timestamp decoration.
    pub enum DerivedField {
        Timestamp => ("timestamp", DataType::Utf8),
        DateTime => ("datetime", DataType::Utf8),
    }
}

/// Page value marking a song play.
pub const NEXT_SONG_PAGE: &str = "NextSong";

// ============ Outputs ============

columns! {
    pub enum SongsColumn {
        SongId => ("song_id", DataType::Utf8),
        Title => ("title", DataType::Utf8),
        ArtistId => ("artist_id", DataType::Utf8),
        Year => ("year", DataType::Int32),
        Duration => ("duration", DataType::Float64),
    }
}

columns! {
    pub enum ArtistsColumn {
        ArtistId => ("artist_id", DataType::Utf8),
        Name => ("name", DataType::Utf8),
        Location => ("location", DataType::Utf8),
        Latitude => ("latitude", DataType::Float64),
        Longitude => ("longitude", DataType::Float64),
    }
}

columns! {
    pub enum UsersColumn {
        UserId => ("user_id", DataType::Utf8),
        FirstName => ("first_name", DataType::Utf8),
        LastName => ("last_name", DataType::Utf8),
        Gender => ("gender", DataType::Utf8),
        Level => ("level", DataType::Utf8),
    }
}

columns! {
    pub enum TimeColumn {
        StartTime => ("start_time", DataType::Utf8),
        Hour => ("hour", DataType::Int32),
        Day => ("day", DataType::Int32),
        Week => ("week", DataType::Int32),
        Month => ("month", DataType::Int32),
        Year => ("year", DataType::Int32),
        Weekday => ("weekday", DataType::Int32),
    }
}

columns! {
    pub enum SongplaysColumn {
        SongplayId => ("songplay_id", DataType::Int64),
        StartTime => ("start_time", DataType::Utf8),
        UserId => ("user_id", DataType::Utf8),
        Level => ("level", DataType::Utf8),
        SongId => ("song_id", DataType::Utf8),
        ArtistId => ("artist_id", DataType::Utf8),
        SessionId => ("session_id", DataType::Int64),
        Location => ("location", DataType::Utf8),
        UserAgent => ("user_agent", DataType::Utf8),
        Year => ("year", DataType::Int32),
        Month => ("month", DataType::Int32),
    }
}

/// The two extraction pipelines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineKind {
    SongCatalog,
    LogEvents,
}

impl PipelineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineKind::SongCatalog => "song catalog",
            PipelineKind::LogEvents => "log events",
        }
    }
}

impl fmt::Display for PipelineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The five tables of the star schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Table {
    Songs,
    Artists,
    Users,
    Time,
    Songplays,
}

impl Table {
    pub const ALL: [Table; 5] = [
        Table::Songs,
        Table::Artists,
        Table::Users,
        Table::Time,
        Table::Songplays,
    ];

    /// Directory name under the output root.
    pub fn name(&self) -> &'static str {
        match self {
            Table::Songs => "songs",
            Table::Artists => "artists",
            Table::Users => "users",
            Table::Time => "time",
            Table::Songplays => "songplays",
        }
    }

    /// Pipeline that produces this table.
    pub fn pipeline(&self) -> PipelineKind {
        match self {
            Table::Songs | Table::Artists => PipelineKind::SongCatalog,
            Table::Users | Table::Time | Table::Songplays => PipelineKind::LogEvents,
        }
    }

    /// Hive partition columns, outermost first.
    pub fn partition_columns(&self) -> Vec<&'static str> {
        match self {
            Table::Songs => vec![SongsColumn::Year.name(), SongsColumn::ArtistId.name()],
            Table::Artists => Vec::new(),
            Table::Users => vec![UsersColumn::UserId.name()],
            Table::Time => vec![TimeColumn::Year.name(), TimeColumn::Month.name()],
            Table::Songplays => vec![SongplaysColumn::Year.name(), SongplaysColumn::Month.name()],
        }
    }

    /// Full output schema, including partition columns.
    pub fn schema(&self) -> SchemaRef {
        match self {
            Table::Songs => SongsColumn::schema(),
            Table::Artists => ArtistsColumn::schema(),
            Table::Users => UsersColumn::schema(),
            Table::Time => TimeColumn::schema(),
            Table::Songplays => SongplaysColumn::schema(),
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_schema_keeps_ts_as_text() {
        let schema = LogField::schema();
        let ts = schema.field_with_name("ts").unwrap();
        assert_eq!(ts.data_type(), &DataType::Utf8);
        assert!(ts.is_nullable());
        assert_eq!(schema.fields().len(), LogField::all().len());
    }

    #[test]
    fn test_partition_columns_exist_in_table_schema() {
        for table in Table::ALL {
            let schema = table.schema();
            for column in table.partition_columns() {
                assert!(
                    schema.field_with_name(column).is_ok(),
                    "{column} missing from {table}"
                );
            }
        }
    }

    #[test]
    fn test_table_pipelines() {
        assert_eq!(Table::Songs.pipeline(), PipelineKind::SongCatalog);
        assert_eq!(Table::Artists.pipeline(), PipelineKind::SongCatalog);
        assert_eq!(Table::Songplays.pipeline(), PipelineKind::LogEvents);
        assert_eq!(Table::Time.to_string(), "time");
    }

    #[test]
    fn test_column_expressions_keep_case() {
        let expected = datafusion::common::Column::new_unqualified("firstName");
        assert_eq!(LogField::FirstName.col(), Expr::Column(expected));
    }

    #[test]
    fn test_songplays_column_order() {
        let names: Vec<_> = SongplaysColumn::all().iter().map(|c| c.name()).collect();
        assert_eq!(names.first(), Some(&"songplay_id"));
        assert_eq!(names.last(), Some(&"month"));
    }
}
