mod common;

use common::init_tracing;
use meshestra_cdi::bean::{BeanBuilder, Scope};
use meshestra_cdi::intercept::{
    Interceptor, InterceptorBinding, InterceptorDeclaration, InvocationContext, InvocationResult,
    Next,
};
use meshestra_cdi::{CdiError, ContainerBuilder};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

struct Slow {
    serial: usize,
}

const THREADS: usize = 16;

#[test]
fn test_singleton_is_created_once_under_contention() {
    init_tracing();
    let constructed = Arc::new(AtomicUsize::new(0));
    let initialized = Arc::new(AtomicUsize::new(0));

    let slow = BeanBuilder::<Slow>::class("slow")
        .scope(Scope::Singleton)
        .constructor({
            let constructed = constructed.clone();
            move |_| {
                let serial = constructed.fetch_add(1, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(20));
                Ok(Slow { serial })
            }
        })
        .post_construct({
            let initialized = initialized.clone();
            move |_| {
                initialized.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .build();
    let container = ContainerBuilder::new().bean(slow).build().unwrap();

    let barrier = Arc::new(Barrier::new(THREADS));
    let workers: Vec<_> = (0..THREADS)
        .map(|_| {
            let container = container.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                container.get::<Slow>().map(|bean| bean.into_arc())
            })
        })
        .collect();

    let instances: Vec<Arc<Slow>> = workers
        .into_iter()
        .map(|worker| worker.join().unwrap().unwrap())
        .collect();

    assert_eq!(constructed.load(Ordering::SeqCst), 1);
    assert_eq!(initialized.load(Ordering::SeqCst), 1);
    assert!(instances.iter().all(|instance| Arc::ptr_eq(instance, &instances[0])));
    assert_eq!(instances[0].serial, 0);
}

#[test]
fn test_waiters_retry_after_a_failed_creation() {
    init_tracing();
    let attempts = Arc::new(AtomicUsize::new(0));
    let flaky = BeanBuilder::<Slow>::class("flaky")
        .scope(Scope::Application)
        .constructor({
            let attempts = attempts.clone();
            move |_| {
                let attempt = attempts.fetch_add(1, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(10));
                if attempt == 0 {
                    anyhow::bail!("cold start");
                }
                Ok(Slow { serial: attempt })
            }
        })
        .build();
    let container = ContainerBuilder::new().bean(flaky).build().unwrap();

    let barrier = Arc::new(Barrier::new(4));
    let workers: Vec<_> = (0..4)
        .map(|_| {
            let container = container.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                container.get::<Slow>().map(|bean| bean.serial).ok()
            })
        })
        .collect();
    let outcomes: Vec<Option<usize>> = workers.into_iter().map(|w| w.join().unwrap()).collect();

    // Exactly one caller sees the failure; everyone else gets the second attempt.
    assert_eq!(outcomes.iter().filter(|o| o.is_none()).count(), 1);
    assert!(outcomes.iter().flatten().all(|serial| *serial == 1));
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

struct Passthrough;

impl Interceptor for Passthrough {
    fn intercept(&self, ctx: &mut InvocationContext<'_>, mut next: Next<'_, '_>) -> InvocationResult {
        next.proceed(ctx)
    }
}

#[test]
fn test_panicking_interceptor_factory_releases_the_slot() {
    init_tracing();
    let attempts = Arc::new(AtomicUsize::new(0));
    let interceptor = InterceptorDeclaration::new("passthrough", {
        let attempts = attempts.clone();
        move || {
            if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("factory bug");
            }
            Ok(Passthrough)
        }
    })
    .binding(InterceptorBinding::new("Traced"))
    .priority(1);
    let traced = BeanBuilder::<Slow>::class("traced")
        .scope(Scope::Singleton)
        .interceptor_binding(InterceptorBinding::new("Traced"))
        .constructor(|_| Ok(Slow { serial: 7 }))
        .build();
    let container = ContainerBuilder::new()
        .binding("Traced", Vec::<String>::new())
        .interceptor(interceptor)
        .bean(traced)
        .build()
        .unwrap();

    let first = container.get::<Slow>().map(|bean| bean.serial);
    assert!(matches!(&first, Err(CdiError::Creation { cause, .. }) if cause.to_string().contains("factory bug")));

    let second = {
        let container = container.clone();
        thread::spawn(move || container.get::<Slow>().map(|bean| bean.serial))
            .join()
            .unwrap()
    };
    assert_eq!(second.unwrap(), 7);
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

#[test]
fn test_distinct_beans_are_created_in_parallel() {
    init_tracing();
    let mut builder = ContainerBuilder::new();
    for index in 0..4 {
        builder = builder.bean(
            BeanBuilder::<Slow>::class(format!("slow-{index}"))
                .scope(Scope::Singleton)
                .named(format!("slow-{index}"))
                .constructor(move |_| Ok(Slow { serial: index }))
                .build(),
        );
    }
    let container = builder.build().unwrap();

    thread::scope(|scope| {
        for index in 0..4 {
            let container = &container;
            scope.spawn(move || {
                let bean = container
                    .select::<Slow>([meshestra_cdi::Qualifier::named(format!("slow-{index}"))])
                    .get()
                    .unwrap();
                assert_eq!(bean.serial, index);
            });
        }
    });

    let report = container.shutdown_all();
    assert_eq!(report.destroyed().len(), 4);
}
