//! Song catalog pipeline: the `songs` and `artists` dimensions.

use datafusion::dataframe::DataFrame;
use datafusion::error::DataFusionError;

use super::conform;
use crate::schema::{ArtistsColumn, Column, SongField, SongsColumn};

/// One row per distinct (song_id, title, artist_id, year, duration).
pub fn extract_songs(catalog: DataFrame) -> Result<DataFrame, DataFusionError> {
    let songs = catalog
        .select(vec![
            SongField::SongId.col().alias(SongsColumn::SongId.name()),
            SongField::Title.col().alias(SongsColumn::Title.name()),
            SongField::ArtistId.col().alias(SongsColumn::ArtistId.name()),
            SongField::Year.col().alias(SongsColumn::Year.name()),
            SongField::Duration.col().alias(SongsColumn::Duration.name()),
        ])?
        .distinct()?;
    conform::<SongsColumn>(songs)
}

/// One row per distinct artist tuple, with the `artist_` prefix dropped.
pub fn extract_artists(catalog: DataFrame) -> Result<DataFrame, DataFusionError> {
    let artists = catalog
        .select(vec![
            SongField::ArtistId.col().alias(ArtistsColumn::ArtistId.name()),
            SongField::ArtistName.col().alias(ArtistsColumn::Name.name()),
            SongField::ArtistLocation.col().alias(ArtistsColumn::Location.name()),
            SongField::ArtistLatitude.col().alias(ArtistsColumn::Latitude.name()),
            SongField::ArtistLongitude.col().alias(ArtistsColumn::Longitude.name()),
        ])?
        .distinct()?;
    conform::<ArtistsColumn>(artists)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::fixtures::{derive, ints, num_rows, song, songs, strings};
    use crate::schema::{Table, TableColumns};

    #[tokio::test]
    async fn test_songs_projection_and_dedup() {
        let a = song("S1", "Yellow", "A1", "Coldplay", 2000);
        let b = song("S2", "Clocks", "A1", "Coldplay", 2002);
        let plan = extract_songs(songs(&[&b, &a, &b])).unwrap();

        let rows = derive(Table::Songs, plan).await;
        assert_eq!(rows[0].schema(), SongsColumn::schema());
        assert_eq!(num_rows(&rows), 2);
        assert_eq!(strings(&rows, "song_id"), vec![Some("S1".into()), Some("S2".into())]);
        assert_eq!(ints(&rows, "year"), vec![Some(2000), Some(2002)]);
    }

    #[tokio::test]
    async fn test_songs_dedup_is_idempotent_under_duplication() {
        let records: Vec<String> = (0..4)
            .map(|i| song(&format!("S{i}"), "t", "A1", "x", 2000 + i))
            .collect();
        let once: Vec<&str> = records.iter().map(String::as_str).collect();
        let twice: Vec<&str> = once.iter().chain(once.iter()).copied().collect();

        let single = derive(Table::Songs, extract_songs(songs(&once)).unwrap()).await;
        let doubled = derive(Table::Songs, extract_songs(songs(&twice)).unwrap()).await;
        assert_eq!(strings(&single, "song_id"), strings(&doubled, "song_id"));
        assert_eq!(ints(&single, "year"), ints(&doubled, "year"));
    }

    #[tokio::test]
    async fn test_differing_rows_are_kept() {
        let a = song("S1", "Yellow", "A1", "Coldplay", 2000);
        let b = song("S1", "Yellow (Live)", "A1", "Coldplay", 2000);
        let rows = derive(Table::Songs, extract_songs(songs(&[&a, &b])).unwrap()).await;
        assert_eq!(num_rows(&rows), 2);
    }

    #[tokio::test]
    async fn test_artists_rename_and_dedup() {
        let a = song("S1", "Yellow", "A1", "Coldplay", 2000);
        let b = song("S2", "Clocks", "A1", "Coldplay", 2002);
        let c = song("S3", "Uprising", "A2", "Muse", 2009);
        let plan = extract_artists(songs(&[&c, &a, &b])).unwrap();

        let rows = derive(Table::Artists, plan).await;
        assert_eq!(rows[0].schema(), ArtistsColumn::schema());
        // Null coordinates compare equal for deduplication.
        assert_eq!(
            strings(&rows, "name"),
            vec![Some("Coldplay".into()), Some("Muse".into())]
        );
    }

    #[test]
    fn test_unknown_column_fails_planning() {
        let titles = songs(&[]).select_columns(&["title"]).unwrap();
        let err = extract_songs(titles).unwrap_err();
        assert!(err.to_string().contains("song_id"), "{err}");
    }
}
