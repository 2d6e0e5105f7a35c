//! Benchmarks for ref filtering and catalog ordering.
//!
//! These benchmarks measure the filter pipeline and semantic-version sorting
//! over repositories with many branches and tags.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use docs_multiversion::config::{self, SortPolicy};
use docs_multiversion::phases::filter::{filter, FilterPolicy};
use docs_multiversion::refs::{Ref, RefKind, SubmodulePointers};
use docs_multiversion::version;

const CONFIG: &str = r#"
refs:
  include: ["v*", "main", "release/*"]
  exclude: ["v0.*", "*-rc*"]
  remotes: ["origin"]
  prefer_remote: true
  require_config: true
submodules:
  affinity: all
"#;

/// `count` refs: tags, local and remote branches, some without config.
fn refs(count: usize) -> Vec<Ref> {
    (0..count)
        .map(|i| {
            let commit = format!("{:040x}", i);
            let reference = match i % 4 {
                0 => Ref::new(format!("v{}.{}.{}", i / 100, (i / 10) % 10, i % 10), RefKind::Tag, commit),
                1 => Ref::new(format!("release/{}", i), RefKind::Branch, commit),
                2 => Ref::new(format!("release/{}", i - 1), RefKind::Branch, commit).with_remote("origin"),
                _ => Ref::new(format!("feature-{}", i), RefKind::Branch, commit),
            };
            let reference = reference.with_submodule("theme", if i % 5 == 0 { "def456" } else { "abc123" });
            if i % 7 == 0 {
                reference
            } else {
                reference.with_config_path("docs/multiversion.yaml")
            }
        })
        .collect()
}

fn bench_filter(c: &mut Criterion) {
    let config = config::parse(CONFIG).unwrap();
    let policy = FilterPolicy::from_config(&config).unwrap();
    let current = SubmodulePointers::from([("theme".to_string(), "abc123".to_string())]);

    let mut group = c.benchmark_group("filter");
    for count in [10, 100, 1000] {
        let input = refs(count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &input, |b, input| {
            b.iter(|| filter(black_box(input), black_box(&policy), black_box(&current)))
        });
    }
    group.finish();
}

fn bench_sort(c: &mut Criterion) {
    let mut group = c.benchmark_group("sort");
    for policy in [SortPolicy::Date, SortPolicy::Name, SortPolicy::Semver] {
        let input = refs(1000);
        group.bench_with_input(
            BenchmarkId::new("policy", format!("{:?}", policy)),
            &input,
            |b, input| {
                b.iter(|| {
                    let mut sorted = input.clone();
                    version::sort_by_policy(&mut sorted, black_box(policy), |r| r);
                    sorted
                })
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_filter, bench_sort);
criterion_main!(benches);
