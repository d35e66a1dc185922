//! Benchmarks for ML table pipelines

use std::io::Cursor;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ml_tables_core::{shape, Lazy, Record, Result};
use ml_tables_readers::Column;
use tracing::info;

shape! {
    /// Synthetic training row
    #[derive(Debug, Clone, PartialEq)]
    pub struct Row {
        pub id: i64,
        #[pattern = "feature*"]
        pub features: Vec<f32>,
        pub label: i64,
    }
}

shape! {
    /// Per-row summary computed by the benchmark pipeline
    #[derive(Debug, Clone, PartialEq)]
    pub struct Summary {
        pub total: f64,
        pub peak: f32,
    }
}

/// Benchmark configuration
#[derive(Debug, Clone)]
pub struct BenchConfig {
    /// Number of measured iterations
    pub iterations: usize,

    /// Warmup iterations
    pub warmup_iterations: usize,

    /// Rows per pipeline run
    pub rows: usize,

    /// Feature columns per row
    pub features: usize,

    /// Worker threads for parallel runs
    pub num_threads: usize,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            iterations: 10,
            warmup_iterations: 3,
            rows: 10_000,
            features: 16,
            num_threads: 4,
        }
    }
}

/// Benchmark result
#[derive(Debug, Clone)]
pub struct BenchResult {
    /// Name of the benchmark
    pub name: String,

    /// Total time taken
    pub total_time: Duration,

    /// Average time per iteration
    pub avg_time: Duration,

    /// Min time per iteration
    pub min_time: Duration,

    /// Max time per iteration
    pub max_time: Duration,

    /// Throughput (rows/second)
    pub throughput: f64,
}

/// Time `func` over the configured iterations
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
pub fn run_benchmark<F>(name: &str, config: &BenchConfig, func: F) -> Result<BenchResult>
where
    F: Fn() -> Result<usize>,
{
    for _ in 0..config.warmup_iterations {
        func()?;
    }

    let mut times = Vec::with_capacity(config.iterations);
    let mut rows = 0usize;
    let start_total = Instant::now();
    for _ in 0..config.iterations.max(1) {
        let start = Instant::now();
        rows += func()?;
        times.push(start.elapsed());
    }
    let total_time = start_total.elapsed();

    let avg_time = times.iter().sum::<Duration>() / times.len() as u32;
    let min_time = times.iter().min().copied().unwrap_or_default();
    let max_time = times.iter().max().copied().unwrap_or_default();
    let throughput = rows as f64 / total_time.as_secs_f64().max(f64::EPSILON);
    info!(name, rows, ?avg_time, throughput, "benchmark finished");

    Ok(BenchResult {
        name: name.to_string(),
        total_time,
        avg_time,
        min_time,
        max_time,
        throughput,
    })
}

/// Records with an id, a label and `features` columns `features1..N`
#[allow(clippy::cast_precision_loss, clippy::cast_possible_wrap)]
pub fn synthetic_rows(rows: usize, features: usize) -> Lazy<Record> {
    let rows = (0..rows)
        .map(|i| Row {
            id: i as i64,
            features: (0..features).map(|k| ((i * 31 + k * 7) % 97) as f32 / 97.0).collect(),
            label: (i % 3) as i64,
        })
        .collect();
    Lazy::from_shapes(rows).transform(|r| r.unpack_tensor("features").map(Some))
}

/// CSV columns of [`synthetic_rows`]
pub fn csv_columns(features: usize) -> Vec<Column> {
    let mut columns = vec![Column::int("id"), Column::int("label")];
    columns.extend((1..=features).map(|k| Column::float32(&format!("features{k}"))));
    columns
}

/// Render `source` as CSV text held in memory
pub fn csv_text(source: &Lazy<Record>, features: usize) -> Result<Arc<[u8]>> {
    let mut out = Vec::new();
    ml_tables_readers::write(source, &mut out, &csv_columns(features))?;
    Ok(out.into())
}

/// Parse in-memory CSV text back into records
pub fn csv_rows(text: &Arc<[u8]>, features: usize) -> Lazy<Record> {
    let text = Arc::clone(text);
    ml_tables_readers::read(move || Ok(Cursor::new(Arc::clone(&text))), &csv_columns(features))
}

/// The pipeline measured by the benchmarks
///
/// Drops a third of the rows, summarizes the features of the rest and flags
/// a random half, on `concurrency` workers.
pub fn pipeline(source: &Lazy<Record>, concurrency: usize) -> Lazy<Record> {
    source
        .filter(|r: &Row| r.label != 1)
        .update(|r: Row| Summary {
            total: r.features.iter().copied().map(f64::from).sum(),
            peak: r.features.iter().copied().fold(f32::MIN, f32::max),
        })
        .parallel(concurrency)
        .random_flag("train", 42, 0.5)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthetic_rows_unpacked() {
        let table = synthetic_rows(5, 3).collect().unwrap();
        assert_eq!(table.names(), &["id", "label", "features1", "features2", "features3"]);
        assert_eq!(table.len(), 5);
    }

    #[test]
    fn test_pipeline_same_under_workers() {
        let source = synthetic_rows(300, 4);
        let sequential = pipeline(&source, 1).collect().unwrap();
        assert_eq!(sequential, pipeline(&source, 4).collect().unwrap());
        assert_eq!(sequential.len(), 200);
    }

    #[test]
    fn test_csv_text_reads_back() {
        let source = synthetic_rows(20, 2);
        let text = csv_text(&source, 2).unwrap();
        let parsed = csv_rows(&text, 2).collect().unwrap();
        assert_eq!(parsed, source.collect().unwrap());
    }

    #[test]
    fn test_run_benchmark_counts_rows() {
        let config = BenchConfig {
            iterations: 2,
            warmup_iterations: 0,
            ..BenchConfig::default()
        };
        let result = run_benchmark("noop", &config, || Ok(10)).unwrap();
        assert_eq!(result.name, "noop");
        assert!(result.min_time <= result.max_time);
    }
}
