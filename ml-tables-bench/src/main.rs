//! Benchmark runner for ML table pipelines

use ml_tables_bench::{
    csv_rows, csv_text, pipeline, run_benchmark, synthetic_rows, BenchConfig, BenchResult,
};
use ml_tables_core::PipelineConfig;

fn report(result: &BenchResult) {
    println!("\nBenchmark: {}", result.name);
    println!("  Total time:   {:?}", result.total_time);
    println!("  Average time: {:?}", result.avg_time);
    println!("  Min time:     {:?}", result.min_time);
    println!("  Max time:     {:?}", result.max_time);
    println!("  Throughput:   {:.2} rows/sec", result.throughput);
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    println!("=== ML Table Pipeline Benchmarks ===");
    let config = BenchConfig::default();
    let source = synthetic_rows(config.rows, config.features);

    for concurrency in [1, config.num_threads] {
        let lazy = pipeline(&source, concurrency);
        let result = run_benchmark(&format!("pipeline x{concurrency}"), &config, || {
            Ok(lazy.collect()?.len())
        })?;
        report(&result);
    }

    println!("\n=== Batch sizes ===");
    for batch_size in [256, 1024, 4096] {
        let pipeline_config = PipelineConfig {
            batch_size,
            ..PipelineConfig::default()
        };
        let lazy = source.batch_with(&pipeline_config).flat();
        let result = run_benchmark(&format!("batch {batch_size}"), &config, || lazy.count())?;
        report(&result);
    }

    println!("\n=== CSV ===");
    let text = csv_text(&source, config.features)?;
    for concurrency in [1, config.num_threads] {
        let lazy = csv_rows(&text, config.features).parallel(concurrency);
        let result = run_benchmark(&format!("csv parse x{concurrency}"), &config, || lazy.count())?;
        report(&result);
    }

    Ok(())
}
