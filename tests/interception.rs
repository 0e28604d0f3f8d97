mod common;

use common::{Events, init_tracing};
use meshestra_cdi::bean::{BeanBuilder, Scope};
use meshestra_cdi::intercept::{
    Decorator, DecoratorDeclaration, Interceptor, InterceptorBinding, InterceptorDeclaration,
    InvocationContext, InvocationResult, Next,
};
use meshestra_cdi::lifecycle::DestructionPhase;
use meshestra_cdi::{BeanType, CdiError, ContainerBuilder};
use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};

trait Greeter: Send + Sync {
    fn greet(&self, name: &str) -> String;
}

struct Friendly;

impl Greeter for Friendly {
    fn greet(&self, name: &str) -> String {
        format!("hello {name}")
    }
}

/// Records `<label>:before` and `<label>:after` around the rest of the chain.
struct Recording {
    label: &'static str,
    events: Events,
}

impl Interceptor for Recording {
    fn intercept(&self, ctx: &mut InvocationContext<'_>, mut next: Next<'_, '_>) -> InvocationResult {
        self.events.push(format!("{}:before", self.label));
        let result = next.proceed(ctx);
        self.events.push(format!("{}:after", self.label));
        result
    }

    fn pre_destroy(&self) -> anyhow::Result<()> {
        self.events.push(format!("{}:destroyed", self.label));
        Ok(())
    }
}

fn recording(id: &'static str, binding: &str, priority: i32, events: &Events) -> InterceptorDeclaration {
    let events = events.clone();
    InterceptorDeclaration::new(id, move || {
        Ok(Recording {
            label: id,
            events: events.clone(),
        })
    })
    .binding(InterceptorBinding::new(binding))
    .priority(priority)
}

fn friendly() -> BeanBuilder<Friendly> {
    BeanBuilder::<Friendly>::class("friendly")
        .scope(Scope::Singleton)
        .expose::<dyn Greeter, _>(|bean| bean)
        .constructor(|_| Ok(Friendly))
}

fn greet(greeter: &meshestra_cdi::BeanRef<dyn Greeter>, name: &'static str) -> meshestra_cdi::Result<String> {
    greeter.invoke("greet", vec![Box::new(name) as Box<dyn Any + Send>], |greeter, ctx| {
        let name = ctx.parameter::<&'static str>(0).copied().unwrap_or("nobody");
        Ok(greeter.greet(name))
    })
}

#[test]
fn test_interceptors_run_in_priority_order() {
    init_tracing();
    let events = Events::default();
    let container = ContainerBuilder::new()
        .binding("Logged", Vec::<String>::new())
        .interceptor(recording("20", "Logged", 20, &events))
        .interceptor(recording("10", "Logged", 10, &events))
        .bean(friendly().interceptor_binding(InterceptorBinding::new("Logged")).build())
        .build()
        .unwrap();

    let greeter = container.get::<dyn Greeter>().unwrap();
    let greeting = greeter
        .invoke("greet", vec![], |greeter, _| {
            events.push("body");
            Ok(greeter.greet("ada"))
        })
        .unwrap();

    assert_eq!(greeting, "hello ada");
    assert_eq!(
        events.snapshot(),
        vec!["10:before", "20:before", "body", "20:after", "10:after"]
    );
    let chain = container.interception("friendly").unwrap();
    assert_eq!(chain.class_chain().ids(), vec!["10", "20"]);
}

struct Retry {
    attempts: usize,
}

impl Interceptor for Retry {
    fn intercept(&self, ctx: &mut InvocationContext<'_>, mut next: Next<'_, '_>) -> InvocationResult {
        let mut last = None;
        for _ in 0..self.attempts {
            match next.proceed(ctx) {
                Ok(value) => return Ok(value),
                Err(e) => last = Some(e),
            }
        }
        Err(last.unwrap_or_else(|| anyhow::anyhow!("no attempt made")))
    }
}

#[test]
fn test_interceptor_may_proceed_more_than_once() {
    init_tracing();
    let container = ContainerBuilder::new()
        .binding("Retry", Vec::<String>::new())
        .interceptor(
            InterceptorDeclaration::new("retry", || Ok(Retry { attempts: 3 }))
                .binding(InterceptorBinding::new("Retry"))
                .priority(1),
        )
        .bean(friendly().interceptor_binding(InterceptorBinding::new("Retry")).build())
        .build()
        .unwrap();

    let greeter = container.get::<dyn Greeter>().unwrap();
    let calls = AtomicUsize::new(0);
    let greeting = greeter
        .invoke("greet", vec![], |greeter, _| {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                anyhow::bail!("flaky");
            }
            Ok(greeter.greet("bob"))
        })
        .unwrap();
    assert_eq!(greeting, "hello bob");
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    calls.store(0, Ordering::SeqCst);
    let failed = greeter.invoke("greet", vec![], |_, _| -> anyhow::Result<String> {
        calls.fetch_add(1, Ordering::SeqCst);
        anyhow::bail!("down")
    });
    assert!(matches!(failed, Err(CdiError::Invocation { ref method, .. }) if method == "greet"));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

struct Shouting;

impl Decorator for Shouting {
    fn decorate(&self, ctx: &mut InvocationContext<'_>, mut delegate: Next<'_, '_>) -> InvocationResult {
        let greeting = delegate
            .proceed(ctx)?
            .downcast::<String>()
            .map_err(|_| anyhow::anyhow!("greet returns a String"))?;
        Ok(Box::new(greeting.to_uppercase()))
    }
}

#[test]
fn test_decorator_wraps_beans_of_its_delegate_type() {
    init_tracing();
    let events = Events::default();
    let container = ContainerBuilder::new()
        .binding("Logged", Vec::<String>::new())
        .interceptor(recording("logged", "Logged", 1, &events))
        .decorator(
            DecoratorDeclaration::new("shouting", BeanType::of::<dyn Greeter>(), || Ok(Shouting))
                .priority(1),
        )
        .bean(friendly().interceptor_binding(InterceptorBinding::new("Logged")).build())
        .build()
        .unwrap();

    let greeter = container.get::<dyn Greeter>().unwrap();
    assert_eq!(greet(&greeter, "eve").unwrap(), "HELLO EVE");
    assert_eq!(events.snapshot(), vec!["logged:before", "logged:after"]);
    assert_eq!(
        container.interception("friendly").unwrap().class_chain().ids(),
        vec!["logged", "shouting"]
    );
}

#[test]
fn test_method_binding_only_intercepts_that_method() {
    init_tracing();
    let events = Events::default();
    let container = ContainerBuilder::new()
        .binding("Audited", Vec::<String>::new())
        .interceptor(recording("audit", "Audited", 5, &events))
        .bean(
            friendly()
                .method_binding("greet", InterceptorBinding::new("Audited"))
                .build(),
        )
        .build()
        .unwrap();

    let greeter = container.get::<dyn Greeter>().unwrap();
    greet(&greeter, "kim").unwrap();
    greeter
        .invoke("farewell", vec![], |_, _| Ok("bye".to_string()))
        .unwrap();
    assert_eq!(events.snapshot(), vec!["audit:before", "audit:after"]);
}

#[test]
fn test_exclusive_bindings_conflict() {
    init_tracing();
    let events = Events::default();
    let result = ContainerBuilder::new()
        .binding("Transactional", Vec::<String>::new())
        .binding("NonTransactional", Vec::<String>::new())
        .exclusive_bindings(["Transactional", "NonTransactional"])
        .interceptor(recording("tx", "Transactional", 1, &events))
        .bean(
            friendly()
                .interceptor_binding(InterceptorBinding::new("Transactional"))
                .method_binding("greet", InterceptorBinding::new("NonTransactional"))
                .build(),
        )
        .build();
    let errors = result.unwrap_err().into_errors();
    assert_eq!(errors.len(), 1);
    assert!(matches!(&errors[0], CdiError::Definition { message } if message.contains("conflicting interceptor bindings on friendly::greet")));
}

#[test]
fn test_interceptor_without_priority_is_rejected() {
    init_tracing();
    let events = Events::default();
    let errors = ContainerBuilder::new()
        .binding("Logged", Vec::<String>::new())
        .interceptor(
            InterceptorDeclaration::new("lazy", {
                let events = events.clone();
                move || {
                    Ok(Recording {
                        label: "lazy",
                        events: events.clone(),
                    })
                }
            })
            .binding(InterceptorBinding::new("Logged")),
        )
        .bean(friendly().build())
        .build()
        .unwrap_err()
        .into_errors();
    assert!(errors.iter().any(|e| matches!(
        e,
        CdiError::Definition { message } if message.contains("interceptor lazy is not enabled")
    )));
}

#[test]
fn test_undeclared_binding_is_a_definition_error() {
    init_tracing();
    let errors = ContainerBuilder::new()
        .bean(friendly().interceptor_binding(InterceptorBinding::new("Mystery")).build())
        .build()
        .unwrap_err()
        .into_errors();
    assert!(matches!(&errors[..], [CdiError::Definition { message }] if message.contains("Mystery")));
}

#[test]
fn test_interceptor_instances_are_destroyed_with_the_bean() {
    init_tracing();
    let events = Events::default();
    let container = ContainerBuilder::new()
        .binding("Logged", Vec::<String>::new())
        .interceptor(recording("logged", "Logged", 1, &events))
        .bean(
            friendly()
                .interceptor_binding(InterceptorBinding::new("Logged"))
                .pre_destroy({
                    let events = events.clone();
                    move |_| {
                        events.push("friendly:pre-destroy");
                        Ok(())
                    }
                })
                .build(),
        )
        .build()
        .unwrap();
    greet(&container.get::<dyn Greeter>().unwrap(), "lee").unwrap();

    let report = container.shutdown_all();
    assert!(report.is_clean());
    assert_eq!(
        events.snapshot(),
        vec![
            "logged:before",
            "logged:after",
            "friendly:pre-destroy",
            "logged:destroyed"
        ]
    );
}

struct Grumpy;

impl Interceptor for Grumpy {
    fn intercept(&self, ctx: &mut InvocationContext<'_>, mut next: Next<'_, '_>) -> InvocationResult {
        next.proceed(ctx)
    }

    fn pre_destroy(&self) -> anyhow::Result<()> {
        anyhow::bail!("will not go quietly")
    }
}

#[test]
fn test_failing_interceptor_teardown_is_reported() {
    init_tracing();
    let container = ContainerBuilder::new()
        .binding("Grumpy", Vec::<String>::new())
        .interceptor(
            InterceptorDeclaration::new("grumpy", || Ok(Grumpy))
                .binding(InterceptorBinding::new("Grumpy"))
                .priority(1),
        )
        .bean(friendly().interceptor_binding(InterceptorBinding::new("Grumpy")).build())
        .build()
        .unwrap();
    container.get::<dyn Greeter>().unwrap();

    let report = container.shutdown_all();
    assert_eq!(report.failures().len(), 1);
    assert_eq!(
        report.failures()[0].phase,
        DestructionPhase::Interceptor {
            interceptor: "grumpy".into()
        }
    );
    assert_eq!(report.destroyed(), ["friendly".to_string()]);
}

#[test]
fn test_producer_bindings_are_ignored() {
    init_tracing();
    let events = Events::default();
    struct Factory;
    let container = ContainerBuilder::new()
        .binding("Logged", Vec::<String>::new())
        .interceptor(recording("logged", "Logged", 1, &events))
        .bean(
            BeanBuilder::<Factory>::class("factory")
                .scope(Scope::Singleton)
                .constructor(|_| Ok(Factory))
                .build(),
        )
        .bean(
            BeanBuilder::<Friendly>::producer_method("produced", "factory")
                .expose::<dyn Greeter, _>(|bean| bean)
                .interceptor_binding(InterceptorBinding::new("Logged"))
                .produces(|_: &Factory, _| Ok(Friendly))
                .build(),
        )
        .build()
        .unwrap();
    assert!(container.interception("produced").is_none());
    greet(&container.get::<dyn Greeter>().unwrap(), "max").unwrap();
    assert!(events.snapshot().is_empty());
}

#[test]
fn test_invocation_data_is_shared_along_the_chain() {
    init_tracing();
    struct Tagging;
    impl Interceptor for Tagging {
        fn intercept(&self, ctx: &mut InvocationContext<'_>, mut next: Next<'_, '_>) -> InvocationResult {
            ctx.data_mut().insert("tag".into(), serde_json::json!("blue"));
            next.proceed(ctx)
        }
    }
    let container = ContainerBuilder::new()
        .binding("Tagged", Vec::<String>::new())
        .interceptor(
            InterceptorDeclaration::new("tagging", || Ok(Tagging))
                .binding(InterceptorBinding::new("Tagged"))
                .priority(1),
        )
        .bean(friendly().interceptor_binding(InterceptorBinding::new("Tagged")).build())
        .build()
        .unwrap();
    let greeter = container.get::<dyn Greeter>().unwrap();
    let tag = greeter
        .invoke("greet", vec![], |_, ctx| Ok(ctx.data()["tag"].clone()))
        .unwrap();
    assert_eq!(tag, serde_json::json!("blue"));
}
