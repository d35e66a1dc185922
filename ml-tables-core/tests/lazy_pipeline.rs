use ml_tables_core::{shape, Error, Lazy, PipelineConfig, Pull, Record, Table, Value};
use proptest::prelude::*;

shape! {
    #[derive(Debug, Clone, PartialEq)]
    pub struct Sample {
        pub id: i64,
        pub x: f32,
    }
}

shape! {
    #[derive(Debug, Clone, PartialEq)]
    pub struct Scaled {
        pub id: i64,
        pub y: f64,
    }
}

fn samples(n: i64) -> Lazy<Record> {
    #[allow(clippy::cast_precision_loss)]
    Lazy::from_shapes((0..n).map(|id| Sample { id, x: id as f32 * 0.25 }).collect())
}

fn stateless(lazy: &Lazy<Record>) -> Lazy<Record> {
    lazy.filter(|s: &Sample| s.id % 3 != 1)
        .map(|s: Sample| Scaled {
            id: s.id,
            y: f64::from(s.x) * 2.0,
        })
}

fn ids(table: &Table) -> Vec<i64> {
    table.column("id").unwrap().ints().unwrap().to_vec()
}

#[test]
fn parallel_matches_sequential_for_stateless_pipeline() {
    let sequential = stateless(&samples(500)).parallel(1).collect().unwrap();
    let parallel = stateless(&samples(500)).parallel(8).collect().unwrap();
    assert_eq!(sequential, parallel);
    assert_eq!(sequential.len(), 333);
}

#[test]
fn parallel_upstream_keeps_ordered_state() {
    let sequential = samples(300)
        .random_flag("flag", 11, 0.4)
        .kfold(5, 4, 1, "fold")
        .collect()
        .unwrap();
    let parallel = samples(300)
        .parallel(8)
        .random_flag("flag", 11, 0.4)
        .kfold(5, 4, 1, "fold")
        .collect()
        .unwrap();
    assert_eq!(sequential, parallel);
}

#[test]
fn parallel_downstream_of_ordered_state() {
    let config = PipelineConfig {
        window_factor: 1,
        ..PipelineConfig::default()
    };
    let base = samples(200).rand(3, 0.5).random_flag("flag", 2, 0.5);
    let sequential = base.collect().unwrap();
    let parallel = base.parallel_with(6, &config).collect_with(&config).unwrap();
    assert_eq!(sequential, parallel);
}

#[test]
fn parallel_batches_flatten_in_order() {
    let lazy = samples(103)
        .parallel(4)
        .batch_transform(10, Ok)
        .parallel(3);
    let table = lazy.collect().unwrap();
    assert_eq!(ids(&table), (0..103).collect::<Vec<_>>());
}

#[test]
fn first_stops_parallel_stream() {
    let table = samples(10_000).parallel(4).first(7).collect().unwrap();
    assert_eq!(ids(&table), (0..7).collect::<Vec<_>>());
}

#[test]
fn collect_skips_filtered_placeholder() {
    let lazy = Lazy::from_fn(|index| {
        Ok(match index {
            0 | 2 => Pull::Row(Record::from_pairs([("a", Value::Int(1))])?),
            1 => Pull::Filtered,
            _ => Pull::End,
        })
    });
    assert_eq!(lazy.collect().unwrap().len(), 2);
}

#[test]
fn set_appends_new_column() {
    let r = Record::from_pairs([("a", Value::Int(1)), ("b", Value::Float64(2.5))])
        .unwrap()
        .set("c", 3i64);
    assert_eq!(r.names(), &["a", "b", "c"]);
    assert_eq!(r.values(), &[Value::Int(1), Value::Float64(2.5), Value::Int(3)]);
    assert!(!r.is_na("a").unwrap() && !r.is_na("b").unwrap() && !r.is_na("c").unwrap());
}

#[test]
fn chain_rejects_different_column_count() {
    let wider = samples(3).set_true("extra");
    let err = samples(3).chain(&wider).collect().unwrap_err();
    assert!(matches!(err, Error::SchemaMismatch(_)));
}

#[test]
fn chain_under_parallel() {
    let table = samples(40)
        .chain(&samples(25))
        .parallel(4)
        .collect()
        .unwrap();
    let expected: Vec<i64> = (0..40).chain(0..25).collect();
    assert_eq!(ids(&table), expected);
}

#[test]
fn errors_halt_the_pipeline() {
    let failing = samples(50).transform(|r| {
        if r.int("id")? == 20 {
            return Err(Error::Upstream(anyhow::anyhow!("bad row")));
        }
        Ok(Some(r))
    });
    let mut seen = 0;
    let err = failing.parallel(4).drain(|_| {
        seen += 1;
        Ok(())
    });
    assert!(matches!(err, Err(Error::Upstream(_))));
    assert_eq!(seen, 20);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn kfold_assigns_each_row_to_one_fold(kfold in 2usize..7, cycles in 1i64..6, seed in any::<u64>()) {
        let n = i64::try_from(kfold).unwrap() * cycles;
        let flags: Vec<Vec<bool>> = (0..kfold)
            .map(|k| {
                let t = samples(n).kfold(seed, kfold, k, "fold").collect().unwrap();
                t.column("fold").unwrap().flags().unwrap().to_vec()
            })
            .collect();
        for row in 0..usize::try_from(n).unwrap() {
            prop_assert_eq!(flags.iter().filter(|f| f[row]).count(), 1);
        }
        for fold in &flags {
            prop_assert_eq!(fold.iter().filter(|&&b| b).count(), usize::try_from(cycles).unwrap());
        }
    }

    #[test]
    fn with_is_right_biased(a in 0i64..100, b in 0i64..100, c in 0i64..100) {
        let left = Record::from_pairs([("x", Value::Int(a)), ("y", Value::Int(b))]).unwrap();
        let right = Record::from_pairs([("y", Value::Int(c)), ("z", Value::Int(a))]).unwrap();
        let merged = left.with(&right);
        prop_assert_eq!(merged.int("x").unwrap(), a);
        prop_assert_eq!(merged.int("y").unwrap(), c);
        prop_assert_eq!(merged.int("z").unwrap(), a);
    }
}
