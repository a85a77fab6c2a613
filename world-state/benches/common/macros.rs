//! Benchmark macros.

// Creates a benchmark whose input is prepared once, outside of the measurement
//
// # Usage
// ```no_run
// benchmark_with_setup_data! {
//     state_fork,
//     DEFAULT_MEASUREMENT_TIME,
//     DEFAULT_SAMPLE_SIZE,
//     "fork",
//     || open_state(),
//     |b: &mut criterion::Bencher, state: &WorldState<MemoryStorage>| {
//         b.iter(|| state.fork(None).unwrap())
//     },
// }
// ```
#[macro_export]
macro_rules! benchmark_with_setup_data {
    (
        $func_name:ident,
        $measurement_time:expr,
        $sample_size:expr,
        $group_name:literal,
        $setup:expr,
        $closure:expr
    ) => {
        fn $func_name(c: &mut Criterion) {
            let mut group = c.benchmark_group($group_name);
            group.measurement_time($measurement_time);
            group.sample_size($sample_size as usize);

            let setup_data = $setup();

            group.bench_function("benchmark", |b| $closure(b, &setup_data));

            group.finish();
        }
    };
    (
        $func_name:ident,
        $measurement_time:expr,
        $sample_size:expr,
        $group_name:literal,
        $setup:expr,
        $closure:expr,
    ) => {
        benchmark_with_setup_data!(
            $func_name,
            $measurement_time,
            $sample_size,
            $group_name,
            $setup,
            $closure
        );
    };
}

// Creates a benchmark parameterized by a batch size, reporting throughput in elements
//
// # Usage
// ```no_run
// benchmark_batch! {
//     forest_append,
//     BATCH_SIZES,
//     |b: &mut criterion::Bencher, size: usize| { ... },
// }
// ```
#[macro_export]
macro_rules! benchmark_batch {
    ($func_name:ident, $sizes:expr, $closure:expr $(,)?) => {
        fn $func_name(c: &mut Criterion) {
            let mut group = c.benchmark_group(concat!("batch-", stringify!($func_name)));
            group.measurement_time($crate::common::config::DEFAULT_MEASUREMENT_TIME);
            group.sample_size($crate::common::config::DEFAULT_SAMPLE_SIZE);

            for size_ref in $sizes {
                let size = *size_ref;
                group.throughput(criterion::Throughput::Elements(size as u64));
                group.bench_with_input(BenchmarkId::new("batch", size), &size, |b, &size| {
                    $closure(b, size)
                });
            }

            group.finish();
        }
    };
}
