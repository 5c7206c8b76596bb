//! songlake benchmark suite.
//!
//! Benchmarks for key operations:
//! - JSON decoding throughput
//! - Deduplication and timestamp derivation plans
//! - The songplays join
//! - Parquet encoding throughput

use arrow::compute::concat_batches;
use bytes::Bytes;
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use tokio::runtime::Runtime;


use songlake::config::{CompressionFormat, LevelPolicy, MatchMode, ParquetCompression};
use songlake::pipeline::logs::{decorate_timestamps, extract_time, extract_users, next_song_events};
use songlake::pipeline::songplays::extract_songplays;
use songlake::pipeline::materialize;
use songlake::pipeline::songs::extract_songs;
use songlake::schema::{SongField, Table, TableColumns};
use songlake::sink::ParquetEncoder;
use songlake::source::{NdjsonReader, NdjsonReaderConfig};

fn json_decoding_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("json_decoding");

    for size in [1_000, 10_000] {
        let data = Bytes::from(bench_utils::generate_songs(size));
        let reader = NdjsonReader::new(
            SongField::schema(),
            NdjsonReaderConfig::new(8192, CompressionFormat::None),
        );

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("songs", size), &data, |b, data| {
            b.iter(|| reader.read(data.clone(), "bench.json").unwrap());
        });
    }

    group.finish();
}

fn runtime() -> Runtime {
    Runtime::new().unwrap()
}

fn dimension_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("dimensions");
    let rt = runtime();

    for size in [1_000, 10_000] {
        let catalog = bench_utils::songs_frame(size);
        let decorated = decorate_timestamps(bench_utils::events_frame(size)).unwrap();
        let events = next_song_events(decorated.clone()).unwrap();

        let plans = [
            ("songs_distinct", extract_songs(catalog).unwrap()),
            (
                "users_all_levels",
                extract_users(events.clone(), LevelPolicy::AllLevels).unwrap(),
            ),
            (
                "users_latest",
                extract_users(events, LevelPolicy::Latest).unwrap(),
            ),
            ("time", extract_time(decorated).unwrap()),
        ];

        group.throughput(Throughput::Elements(size as u64));
        for (name, plan) in plans {
            group.bench_function(BenchmarkId::new(name, size), |b| {
                b.iter(|| rt.block_on(plan.clone().collect()).unwrap());
            });
        }
    }

    group.finish();
}

fn join_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("songplays_join");
    let rt = runtime();

    for size in [1_000, 10_000] {
        let catalog = bench_utils::songs_frame(size);
        let events =
            next_song_events(decorate_timestamps(bench_utils::events_frame(size)).unwrap()).unwrap();

        group.throughput(Throughput::Elements(size as u64));
        for (name, mode) in [
            ("artist_name", MatchMode::ArtistName),
            ("artist_title_duration", MatchMode::ArtistTitleDuration),
        ] {
            let plan = extract_songplays(events.clone(), catalog.clone(), mode).unwrap();
            group.bench_function(BenchmarkId::new(name, size), |b| {
                b.iter(|| rt.block_on(plan.clone().collect()).unwrap());
            });
        }
    }

    group.finish();
}

fn parquet_encoding_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("parquet_encoding");

    let plan = extract_songs(bench_utils::songs_frame(10_000)).unwrap();
    let rows = runtime()
        .block_on(materialize(Table::Songs, plan))
        .unwrap();
    let songs = concat_batches(&Table::Songs.schema(), &rows).unwrap();
    group.throughput(Throughput::Elements(songs.num_rows() as u64));

    for compression in [
        ParquetCompression::Uncompressed,
        ParquetCompression::Snappy,
        ParquetCompression::Zstd,
    ] {
        let encoder = ParquetEncoder::new(compression);
        group.bench_with_input(
            BenchmarkId::new("songs", format!("{compression:?}")),
            &songs,
            |b, batch| {
                b.iter(|| encoder.encode(batch).unwrap());
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    json_decoding_benchmarks,
    dimension_benchmarks,
    join_benchmarks,
    parquet_encoding_benchmarks
);
criterion_main!(benches);
