mod common;

use common::{Events, init_tracing};
use meshestra_cdi::bean::{BeanBuilder, InjectionPoint, Scope};
use meshestra_cdi::lifecycle::DestructionPhase;
use meshestra_cdi::{BeanType, CdiError, ClientProxy, ContainerBuilder};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

#[derive(Default)]
struct Counter {
    hits: AtomicUsize,
}

struct Service {
    counter: Arc<Counter>,
}

#[test]
fn test_singleton_counter_is_shared_and_destroyed_after_service() {
    init_tracing();
    let events = Events::default();
    let created = Arc::new(AtomicUsize::new(0));

    let counter = BeanBuilder::<Counter>::class("counter")
        .scope(Scope::Singleton)
        .constructor({
            let created = created.clone();
            move |_| {
                created.fetch_add(1, Ordering::SeqCst);
                Ok(Counter::default())
            }
        })
        .pre_destroy({
            let events = events.clone();
            move |_| {
                events.push("counter:pre-destroy");
                Ok(())
            }
        })
        .build();
    let service = BeanBuilder::<Service>::class("service")
        .scope(Scope::Singleton)
        .inject_param::<Counter>("counter")
        .constructor(|args| {
            Ok(Service {
                counter: args.arc("counter")?,
            })
        })
        .post_construct({
            let events = events.clone();
            move |service| {
                service.counter.hits.fetch_add(1, Ordering::SeqCst);
                events.push("service:post-construct");
                Ok(())
            }
        })
        .pre_destroy({
            let events = events.clone();
            move |_| {
                events.push("service:pre-destroy");
                Ok(())
            }
        })
        .build();

    let container = ContainerBuilder::new().bean(counter).bean(service).build().unwrap();

    let service = container.get::<Service>().unwrap();
    let counter = container.get::<Counter>().unwrap();
    assert!(Arc::ptr_eq(&service.counter, &counter.clone().into_arc()));
    assert_eq!(created.load(Ordering::SeqCst), 1);
    assert_eq!(counter.hits.load(Ordering::SeqCst), 1);

    let report = container.select::<Service>([]).get().unwrap().destroy();
    assert_eq!(report.destroyed(), ["service"]);
    let report = container.select::<Counter>([]).get().unwrap().destroy();
    assert_eq!(report.destroyed(), ["counter"]);

    assert_eq!(
        events.snapshot(),
        ["service:post-construct", "service:pre-destroy", "counter:pre-destroy"]
    );
    assert!(container.shutdown_all().destroyed().is_empty());
    assert_eq!(events.count("counter:pre-destroy"), 1);
}

#[test]
fn test_shutdown_destroys_singletons_newest_first() {
    init_tracing();
    let events = Events::default();
    let counter = BeanBuilder::<Counter>::class("counter")
        .scope(Scope::Singleton)
        .constructor(|_| Ok(Counter::default()))
        .pre_destroy({
            let events = events.clone();
            move |_| {
                events.push("counter");
                Ok(())
            }
        })
        .build();
    let service = BeanBuilder::<Service>::class("service")
        .scope(Scope::Singleton)
        .inject_param::<Counter>("counter")
        .constructor(|args| {
            Ok(Service {
                counter: args.arc("counter")?,
            })
        })
        .pre_destroy({
            let events = events.clone();
            move |_| {
                events.push("service");
                Ok(())
            }
        })
        .build();
    let container = ContainerBuilder::new().bean(counter).bean(service).build().unwrap();
    container.get::<Service>().unwrap();

    let report = container.shutdown_all();
    assert!(report.is_clean());
    assert_eq!(events.snapshot(), ["service", "counter"]);
    assert!(matches!(
        container.get::<Service>(),
        Err(CdiError::ContainerShutDown)
    ));
    assert!(container.shutdown_all().destroyed().is_empty());
}

static SERIAL: AtomicUsize = AtomicUsize::new(0);

struct Dependency {
    serial: usize,
    destroyed: AtomicBool,
}

struct BeanA {
    dependency: Arc<Dependency>,
}

struct BeanB {
    dependency: Arc<Dependency>,
}

fn dependency_bean(events: &Events) -> meshestra_cdi::BeanDeclaration {
    BeanBuilder::<Dependency>::class("dependency")
        .constructor(|_| {
            Ok(Dependency {
                serial: SERIAL.fetch_add(1, Ordering::SeqCst),
                destroyed: AtomicBool::new(false),
            })
        })
        .pre_destroy({
            let events = events.clone();
            move |dependency| {
                dependency.destroyed.store(true, Ordering::SeqCst);
                events.push(format!("dependency#{}", dependency.serial));
                Ok(())
            }
        })
        .build()
}

#[test]
fn test_dependent_instances_are_owned_by_each_singleton() {
    init_tracing();
    let events = Events::default();
    let bean_a = BeanBuilder::<BeanA>::class("bean-a")
        .scope(Scope::Singleton)
        .inject_field::<Dependency>("dependency")
        .constructor(|args| {
            Ok(BeanA {
                dependency: args.arc("dependency")?,
            })
        })
        .build();
    let bean_b = BeanBuilder::<BeanB>::class("bean-b")
        .scope(Scope::Singleton)
        .inject_field::<Dependency>("dependency")
        .constructor(|args| {
            Ok(BeanB {
                dependency: args.arc("dependency")?,
            })
        })
        .build();
    let container = ContainerBuilder::new()
        .bean(dependency_bean(&events))
        .bean(bean_a)
        .bean(bean_b)
        .build()
        .unwrap();

    let a = container.select::<BeanA>([]).get().unwrap();
    let b = container.get::<BeanB>().unwrap();
    assert!(!Arc::ptr_eq(&a.dependency, &b.dependency));
    assert_ne!(a.dependency.serial, b.dependency.serial);
    assert_eq!(a.get().contextual().dependents().len(), 1);

    let a_serial = a.dependency.serial;
    let report = a.destroy();
    assert_eq!(report.destroyed(), ["dependency", "bean-a"]);
    assert_eq!(events.snapshot(), [format!("dependency#{a_serial}")]);
    assert!(!b.dependency.destroyed.load(Ordering::SeqCst));

    container.shutdown_all();
    assert!(b.dependency.destroyed.load(Ordering::SeqCst));
}

#[test]
fn test_dependent_lookup_is_destroyed_with_its_handle() {
    init_tracing();
    let events = Events::default();
    let container = ContainerBuilder::new()
        .bean(dependency_bean(&events))
        .build()
        .unwrap();

    let first = container.select::<Dependency>([]).get().unwrap();
    let second = container.select::<Dependency>([]).get().unwrap();
    assert_ne!(first.serial, second.serial);

    let first_serial = first.serial;
    let report = container.destroy(first);
    assert_eq!(report.destroyed(), ["dependency"]);
    assert_eq!(events.snapshot(), [format!("dependency#{first_serial}")]);

    // The remaining lookup is still tracked and destroyed at shutdown.
    container.shutdown_all();
    assert!(second.destroyed.load(Ordering::SeqCst));
    assert_eq!(events.snapshot().len(), 2);
}

struct Tool {
    drops: Arc<AtomicUsize>,
}

impl Drop for Tool {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_plain_get_of_dependent_bean_is_not_retained() {
    init_tracing();
    let drops = Arc::new(AtomicUsize::new(0));
    let container = ContainerBuilder::new()
        .bean(
            BeanBuilder::<Tool>::class("tool")
                .constructor({
                    let drops = drops.clone();
                    move |_| Ok(Tool { drops: drops.clone() })
                })
                .build(),
        )
        .build()
        .unwrap();

    for _ in 0..1000 {
        container.get::<Tool>().unwrap();
    }
    assert_eq!(drops.load(Ordering::SeqCst), 1000);

    let kept = container.select::<Tool>([]).get().unwrap().into_ref();
    assert!(container.shutdown_all().destroyed().is_empty());
    drop(kept);
    assert_eq!(drops.load(Ordering::SeqCst), 1001);
}

struct Audit {
    events: Events,
}

struct Reporting {
    audit: ClientProxy<Audit>,
}

#[test]
fn test_pre_destroy_can_reach_beans_that_are_still_alive() {
    init_tracing();
    let events = Events::default();
    let audit = BeanBuilder::<Audit>::class("audit")
        .scope(Scope::Singleton)
        .constructor({
            let events = events.clone();
            move |_| Ok(Audit { events: events.clone() })
        })
        .build();
    let reporting = BeanBuilder::<Reporting>::class("reporting")
        .scope(Scope::Application)
        .inject(InjectionPoint::field("audit", BeanType::of::<Audit>()).proxied())
        .constructor(|args| {
            Ok(Reporting {
                audit: args.proxy("audit")?,
            })
        })
        .pre_destroy(|reporting| {
            reporting.audit.get()?.events.push("reporting closed");
            Ok(())
        })
        .build();
    let container = ContainerBuilder::new().bean(audit).bean(reporting).build().unwrap();
    let reporting = container.get::<Reporting>().unwrap();

    let report = container.shutdown_all();
    assert!(report.is_clean(), "{:?}", report.failures());
    assert_eq!(report.destroyed(), ["reporting", "audit"]);
    assert_eq!(events.snapshot(), ["reporting closed"]);
    assert!(matches!(reporting.audit.get(), Err(CdiError::ContainerShutDown)));
}

struct Noisy(&'static str);

fn noisy(id: &'static str, events: &Events, fail: bool) -> meshestra_cdi::BeanDeclaration {
    BeanBuilder::<Noisy>::class(id)
        .scope(Scope::Application)
        .named(id)
        .constructor(move |_| Ok(Noisy(id)))
        .pre_destroy({
            let events = events.clone();
            move |noisy| {
                events.push(noisy.0);
                if fail {
                    anyhow::bail!("{} refuses to close", noisy.0);
                }
                Ok(())
            }
        })
        .build()
}

#[test]
fn test_failing_pre_destroy_does_not_stop_the_batch() {
    init_tracing();
    let events = Events::default();
    let container = ContainerBuilder::new()
        .bean(noisy("x", &events, true))
        .bean(noisy("y", &events, false))
        .build()
        .unwrap();

    let x = container
        .select::<Noisy>([meshestra_cdi::Qualifier::named("x")])
        .get()
        .unwrap()
        .into_ref();
    container
        .select::<Noisy>([meshestra_cdi::Qualifier::named("y")])
        .get()
        .unwrap();

    let report = container.shutdown_all();
    assert_eq!(events.snapshot(), ["y", "x"]);
    assert_eq!(report.destroyed(), ["y", "x"]);
    assert_eq!(report.failures().len(), 1);
    assert_eq!(report.failures()[0].bean, "x");
    assert_eq!(report.failures()[0].phase, DestructionPhase::PreDestroy);
    assert!(x.contextual().is_destroyed());
}

#[test]
fn test_panicking_pre_destroy_is_contained() {
    init_tracing();
    let container = ContainerBuilder::new()
        .bean(
            BeanBuilder::<Counter>::class("counter")
                .scope(Scope::Singleton)
                .constructor(|_| Ok(Counter::default()))
                .pre_destroy(|_| panic!("counter exploded"))
                .build(),
        )
        .build()
        .unwrap();
    container.get::<Counter>().unwrap();

    let report = container.shutdown_all();
    assert_eq!(report.destroyed(), ["counter"]);
    assert_eq!(
        report.failures()[0].to_string(),
        "Destruction of counter failed during pre-destroy: panicked: counter exploded"
    );
}

#[test]
fn test_failed_post_construct_leaves_no_instance() {
    init_tracing();
    let attempts = Arc::new(AtomicUsize::new(0));
    let container = ContainerBuilder::new()
        .bean(
            BeanBuilder::<Counter>::class("counter")
                .scope(Scope::Singleton)
                .constructor(|_| Ok(Counter::default()))
                .post_construct({
                    let attempts = attempts.clone();
                    move |_| {
                        if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                            anyhow::bail!("not ready yet");
                        }
                        Ok(())
                    }
                })
                .build(),
        )
        .build()
        .unwrap();

    let error = container.get::<Counter>().unwrap_err();
    assert!(matches!(error, CdiError::Creation { ref bean, .. } if bean == "counter"));
    assert!(container.get::<Counter>().is_ok());
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

struct Connection {
    url: String,
}

struct Pool {
    prefix: &'static str,
    closed: Events,
}

#[test]
fn test_producer_disposer_receives_declaring_instance() {
    init_tracing();
    let events = Events::default();
    let pool = BeanBuilder::<Pool>::class("pool")
        .constructor({
            let events = events.clone();
            move |_| {
                events.push("pool:created");
                Ok(Pool {
                    prefix: "db://",
                    closed: events.clone(),
                })
            }
        })
        .pre_destroy(|pool| {
            pool.closed.push("pool:pre-destroy");
            Ok(())
        })
        .build();
    let connection = BeanBuilder::<Connection>::producer_method("connection", "pool")
        .scope(Scope::Singleton)
        .produces(|pool: &Pool, _| {
            Ok(Connection {
                url: format!("{}main", pool.prefix),
            })
        })
        .disposer(|connection: &Connection, pool: &Pool| {
            pool.closed.push(format!("disposed {}", connection.url));
            Ok(())
        })
        .build();
    let container = ContainerBuilder::new().bean(pool).bean(connection).build().unwrap();

    assert_eq!(container.get::<Connection>().unwrap().url, "db://main");
    assert_eq!(events.snapshot(), ["pool:created"]);

    let report = container.shutdown_all();
    assert!(report.is_clean());
    assert_eq!(
        events.snapshot(),
        ["pool:created", "disposed db://main", "pool:pre-destroy"]
    );
}

struct Wired {
    events: Events,
}

#[test]
fn test_initializer_runs_after_constructor_and_before_post_construct() {
    init_tracing();
    let events = Events::default();
    let container = ContainerBuilder::new()
        .bean(
            BeanBuilder::<Counter>::class("counter")
                .scope(Scope::Singleton)
                .constructor(|_| Ok(Counter::default()))
                .build(),
        )
        .bean(
            BeanBuilder::<Wired>::class("wired")
                .inject(InjectionPoint::initializer(
                    "set_counter",
                    0,
                    "counter",
                    BeanType::of::<Counter>(),
                ))
                .constructor({
                    let events = events.clone();
                    move |_| {
                        events.push("constructor");
                        Ok(Wired {
                            events: events.clone(),
                        })
                    }
                })
                .initializer(|wired, args| {
                    args.arc::<Counter>("counter")?;
                    wired.events.push("initializer");
                    Ok(())
                })
                .post_construct(|wired| {
                    wired.events.push("post-construct");
                    Ok(())
                })
                .build(),
        )
        .build()
        .unwrap();

    container.select::<Wired>([]).get().unwrap();
    assert_eq!(
        events.snapshot(),
        ["constructor", "initializer", "post-construct"]
    );
}
