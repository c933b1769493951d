use rs_guard::{
    BuildError, ConfigStore, EngineFactory, EngineParts, Error, GuardName, GuardRegistry,
    GuardRegistryBuilder, PolicyModel,
};
use std::hint::black_box;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::time::{Duration, Instant};

const MODEL: &str = "\
[request_definition]
r = sub, obj, act
[policy_definition]
p = sub, obj, act
[policy_effect]
e = some(where (p.eft == allow))
[matchers]
m = r.sub == p.sub && r.obj == p.obj && r.act == p.act
";

const ROUNDS: usize = 5;

type Registry = GuardRegistry<SlowCountingFactory>;

struct Enforcer {
    guard: GuardName,
    _model: PolicyModel,
}

#[derive(Clone, Default)]
struct SlowCountingFactory {
    builds: Arc<AtomicUsize>,
}

impl EngineFactory for SlowCountingFactory {
    type Engine = Enforcer;

    fn build(&self, parts: EngineParts) -> Result<Enforcer, BuildError> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        // Widen the window in which a racing caller could slip in a second build.
        std::thread::sleep(Duration::from_millis(20));
        Ok(Enforcer {
            guard: parts.guard,
            _model: parts.model,
        })
    }
}

fn config(guards: &[&str]) -> ConfigStore {
    let store = ConfigStore::new();
    store.set("permission.default", guards[0]);
    for guard in guards {
        store.set(&format!("permission.{guard}.model.config_type"), "text");
        store.set(&format!("permission.{guard}.model.config_text"), MODEL);
    }
    store
}

fn registry(guards: &[&str]) -> (Arc<Registry>, Arc<AtomicUsize>) {
    let factory = SlowCountingFactory::default();
    let builds = Arc::clone(&factory.builds);
    let registry = GuardRegistryBuilder::new(config(guards), factory).build();
    (Arc::new(registry), builds)
}

fn request_concurrently(
    registry: &Arc<Registry>,
    names: Vec<&'static str>,
) -> Vec<Arc<Enforcer>> {
    let barrier = Arc::new(Barrier::new(names.len()));
    let joins: Vec<_> = names
        .into_iter()
        .map(|name| {
            let registry = Arc::clone(registry);
            let barrier = Arc::clone(&barrier);
            std::thread::spawn(move || {
                barrier.wait();
                registry.guard(name).expect("guard should build")
            })
        })
        .collect();
    joins
        .into_iter()
        .map(|join| join.join().expect("thread panicked"))
        .collect()
}

#[test]
fn concurrent_requests_for_one_guard_should_build_once() {
    let (registry, builds) = registry(&["api"]);

    let engines = request_concurrently(&registry, vec!["api"; 16]);

    assert_eq!(builds.load(Ordering::SeqCst), 1);
    assert!(engines.iter().all(|engine| Arc::ptr_eq(engine, &engines[0])));
}

#[test]
fn concurrent_default_and_named_requests_should_share_instance() {
    let (registry, builds) = registry(&["api"]);

    let engines = request_concurrently(&registry, vec!["", "api", "", "api", "", "api"]);

    assert_eq!(builds.load(Ordering::SeqCst), 1);
    assert!(engines.iter().all(|engine| Arc::ptr_eq(engine, &engines[0])));
    assert_eq!(engines[0].guard.as_str(), "api");
}

#[test]
fn concurrent_requests_for_different_guards_should_build_each_once() {
    let (registry, builds) = registry(&["api", "admin", "billing"]);
    let names = ["api", "admin", "billing"]
        .into_iter()
        .cycle()
        .take(12)
        .collect();

    let engines = request_concurrently(&registry, names);

    assert_eq!(builds.load(Ordering::SeqCst), 3);
    for engine in &engines {
        let same = registry.guard(engine.guard.as_str()).unwrap();
        assert!(Arc::ptr_eq(engine, &same));
    }
    assert_eq!(registry.built_guards().len(), 3);
}

#[test]
fn concurrent_requests_for_undefined_guard_should_all_fail() {
    let (registry, builds) = registry(&["api"]);
    let barrier = Arc::new(Barrier::new(8));

    let joins: Vec<_> = (0..8)
        .map(|_| {
            let registry = Arc::clone(&registry);
            let barrier = Arc::clone(&barrier);
            std::thread::spawn(move || {
                barrier.wait();
                registry.guard("billing").err()
            })
        })
        .collect();

    for join in joins {
        let err = join.join().expect("thread panicked");
        assert!(matches!(err, Some(Error::UndefinedGuard(name)) if name == "billing"));
    }
    assert_eq!(builds.load(Ordering::SeqCst), 0);
}

#[test]
fn concurrent_failed_builds_should_leave_guard_buildable() {
    let (registry, builds) = registry(&["api"]);
    let config = registry.resolver().store().clone();
    config.set("permission.api.model.config_text", "[matchers]\nm\n");
    let barrier = Arc::new(Barrier::new(8));

    let joins: Vec<_> = (0..8)
        .map(|_| {
            let registry = Arc::clone(&registry);
            let barrier = Arc::clone(&barrier);
            std::thread::spawn(move || {
                barrier.wait();
                registry.guard("api").err()
            })
        })
        .collect();
    for join in joins {
        let err = join.join().expect("thread panicked");
        assert!(matches!(err, Some(Error::ModelParse { .. })));
    }
    assert!(registry.built_guards().is_empty());

    config.set("permission.api.model.config_text", MODEL);
    let engines = request_concurrently(&registry, vec!["api"; 8]);

    assert_eq!(builds.load(Ordering::SeqCst), 1);
    assert!(engines.iter().all(|engine| Arc::ptr_eq(engine, &engines[0])));
}

/// Runs `lookup` from `threads` workers released together by a barrier and
/// reports the best of `ROUNDS` rounds, timed until the slowest worker ends.
fn time_parallel_lookups(
    label: &str,
    registry: &Arc<Registry>,
    threads: usize,
    lookups_per_thread: usize,
    lookup: fn(&Registry),
) {
    let mut best = Duration::MAX;
    for _ in 0..ROUNDS {
        let barrier = Arc::new(Barrier::new(threads));
        let workers: Vec<_> = (0..threads)
            .map(|_| {
                let registry = Arc::clone(registry);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    let started = Instant::now();
                    for _ in 0..lookups_per_thread {
                        lookup(&registry);
                    }
                    started.elapsed()
                })
            })
            .collect();
        let slowest = workers
            .into_iter()
            .map(|worker| worker.join().expect("thread panicked"))
            .max()
            .unwrap_or_default();
        best = best.min(slowest);
    }

    let lookups = threads * lookups_per_thread;
    let per_lookup_ns = best.as_nanos() as f64 / lookups as f64;
    println!(
        "{label}: best of {ROUNDS} = {best:?} for {lookups} lookups on {threads} threads ({per_lookup_ns:.1} ns/lookup)"
    );
}

#[test]
#[ignore = "manual performance test; run with --ignored --nocapture"]
fn perf_parallel_guard_lookup() {
    let threads = std::thread::available_parallelism()
        .map(|n| n.get().min(8))
        .unwrap_or(4);
    let lookups_per_thread = 100_000;

    let (registry, _) = registry(&["api", "admin"]);
    registry.guard("api").unwrap();
    registry.guard("admin").unwrap();

    time_parallel_lookups("named_guard_hit", &registry, threads, lookups_per_thread, |registry| {
        black_box(registry.guard("api").unwrap());
    });
    time_parallel_lookups("default_guard_hit", &registry, threads, lookups_per_thread, |registry| {
        black_box(registry.default_guard().unwrap());
    });
}
