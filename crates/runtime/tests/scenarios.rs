//! End-to-end scenarios exercising a full `Scheduler` tick loop, each
//! grounded on one literal walkthrough in `spec.md` §8.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use purc_config::RuntimeConfig;
use purc_dom::{vdom, DomSink, InMemoryDom, LoopbackRenderer};
use purc_runtime::{HandleOutcome, ObserverBuilder, ObserverSource, Scheduler};
use purc_variant::{intern, Atom, AtomBucketId, Variant};

fn atom(name: &str) -> Atom {
    intern(AtomBucketId::Msg, name)
}

fn scheduler() -> Scheduler {
    Scheduler::new(
        RuntimeConfig::default(),
        Arc::new(InMemoryDom::new()),
        Arc::new(LoopbackRenderer::new()),
    )
}

/// Registers an intrinsic observer on `id` that pushes every matching
/// message's event name into a shared log, in arrival order.
fn log_event(sched: &mut Scheduler, id: Atom, event_type: &str) -> Arc<Mutex<Vec<String>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    let recorded = log.clone();
    let co = sched.coroutine_mut(id).expect("coroutine just spawned");
    let observed = co.identity();
    co.intr_observers.register(ObserverBuilder::new(
        ObserverSource::Intrinsic,
        observed,
        atom(event_type),
        Box::new(move |msg| {
            recorded.lock().push(msg.event_name());
            HandleOutcome::Handled
        }),
    ));
    log
}

/// Scenario 1, `spec.md` §8: a program that only exits. Expect the
/// coroutine's page registration to complete (`rdrState:pageLoaded`)
/// before it reaches EXITED, and for the scheduler to reach
/// quiescence with the exit value recorded.
#[test]
fn simple_exit_posts_page_loaded_then_reaches_quiescence() {
    let mut sched = scheduler();
    let root = Arc::new(vdom::parse(r#"<exit with="42"/>"#).unwrap());
    let id = sched.spawn("main", root, None);
    let page_loaded = log_event(&mut sched, id, "rdrState");

    sched.run_to_completion(20).unwrap();

    assert!(sched.is_quiescent());
    assert_eq!(*page_loaded.lock(), vec!["rdrState:pageLoaded"]);
}

/// Scenario 2, `spec.md` §8: a parent with a curator-bound child.
/// Expect `callState:success` carrying the child's result, then
/// `corState:exited`, in that order, exactly once each.
#[test]
fn call_and_return_notifies_the_curator_in_order() {
    let mut sched = scheduler();

    let parent_root = Arc::new(vdom::parse(r#"<sleep for="1000000"/>"#).unwrap());
    let parent_id = sched.spawn("main", parent_root, None);

    let child_root = Arc::new(vdom::parse(r#"<exit with="7"/>"#).unwrap());
    let child_id = sched.spawn("main", child_root, Some(parent_id));
    let child_identity = Variant::make_string(child_id.to_string());

    let order = Arc::new(Mutex::new(Vec::new()));
    for event_type in ["callState", "corState"] {
        let order = order.clone();
        let co = sched.coroutine_mut(parent_id).unwrap();
        co.intr_observers.register(ObserverBuilder::new(
            ObserverSource::Intrinsic,
            child_identity.clone(),
            atom(event_type),
            Box::new(move |msg| {
                order.lock().push(msg.event_name());
                HandleOutcome::Handled
            }),
        ));
    }

    for _ in 0..5 {
        sched.tick().unwrap();
    }

    assert_eq!(*order.lock(), vec!["callState:success", "corState:exited"]);
    assert!(sched.coroutine(child_id).is_none(), "child should have been reaped");
    assert!(sched.coroutine(parent_id).is_some(), "parent is still asleep");
}

/// Scenario 3, `spec.md` §8: an element raises a named exception with
/// a matching `catch` sibling. Expect the catch's content appended to
/// the raising frame's DOM anchor, the exception cleared, and the
/// coroutine to proceed (no `callState:except`, since there is no
/// curator here to notify anyway).
#[test]
fn a_matching_catch_sibling_recovers_and_appends_its_content() {
    let dom = Arc::new(InMemoryDom::new());
    let mut sched = Scheduler::new(RuntimeConfig::default(), dom.clone(), Arc::new(LoopbackRenderer::new()));
    let root = Arc::new(
        vdom::parse(r#"<body><catch for="NotSupported">ok</catch><request on="https://example.test/x"/></body>"#)
            .unwrap(),
    );
    let id = sched.spawn("main", root, None);

    for _ in 0..3 {
        sched.tick().unwrap();
    }

    let co = sched.coroutine(id).expect("recovered, not terminated");
    assert!(!co.except_flag);
    assert!(!co.terminated);
    assert!(co.except.is_none());
    assert!(dom.serialize(dom.root()).unwrap().contains("ok"));
}

/// Scenario 4, `spec.md` §8: a coroutine observes `idle` on its own
/// identity. Expect the observer to fire at least once within ~150 ms
/// and not more than once per the configured broadcast interval
/// (100 ms by default) while nothing else is pending.
#[test]
fn an_idle_observer_fires_repeatedly_but_not_faster_than_the_broadcast_interval() {
    let mut sched = scheduler();
    let root = Arc::new(vdom::parse(r#"<sleep for="100000"/>"#).unwrap());
    let id = sched.spawn("main", root, None);

    let hits = Arc::new(AtomicUsize::new(0));
    {
        let hits = hits.clone();
        let co = sched.coroutine_mut(id).unwrap();
        let observed = co.identity();
        co.hvml_observers.register(ObserverBuilder::new(
            ObserverSource::Hvml,
            observed,
            atom("idle"),
            Box::new(move |_msg| {
                hits.fetch_add(1, Ordering::SeqCst);
                HandleOutcome::Handled
            }),
        ));
    }

    let deadline = Instant::now() + Duration::from_millis(260);
    while Instant::now() < deadline {
        sched.tick().unwrap();
        std::thread::sleep(Duration::from_millis(5));
    }

    let fired = hits.load(Ordering::SeqCst);
    assert!(fired >= 1, "idle observer never fired within 260ms");
    assert!(fired <= 4, "idle observer fired {fired} times in 260ms, faster than the 100ms interval allows");
}

/// Scenario 5, `spec.md` §8: the renderer connection drops while two
/// coroutines are bound to it. Expect both to receive
/// `rdrState:connLost`.
#[test]
fn connection_loss_broadcasts_to_every_bound_coroutine() {
    let renderer = Arc::new(LoopbackRenderer::new());
    let mut sched = Scheduler::new(RuntimeConfig::default(), Arc::new(InMemoryDom::new()), renderer.clone());

    let root_a = Arc::new(vdom::parse(r#"<sleep for="1000000"/>"#).unwrap());
    let a = sched.spawn("main", root_a, None);
    let root_b = Arc::new(vdom::parse(r#"<sleep for="1000000"/>"#).unwrap());
    let b = sched.spawn("main", root_b, None);

    let log_a = log_event(&mut sched, a, "rdrState");
    let log_b = log_event(&mut sched, b, "rdrState");

    // Let both registrations resolve (pageLoaded) before the drop.
    sched.tick().unwrap();
    sched.tick().unwrap();

    renderer.simulate_disconnect();
    sched.tick().unwrap();
    sched.tick().unwrap();

    assert!(log_a.lock().contains(&"rdrState:connLost".to_string()));
    assert!(log_b.lock().contains(&"rdrState:connLost".to_string()));
}

/// Scenario 5, `spec.md` §8, second connection variant: with two
/// active renderer connections bound to a coroutine, dropping one
/// reports `rdrState:lostDuplicate` (the other survives); dropping the
/// last one reports `rdrState:connLost`.
#[test]
fn losing_one_of_two_connections_reports_lost_duplicate_then_conn_lost() {
    let first = Arc::new(LoopbackRenderer::new());
    let second = Arc::new(LoopbackRenderer::new());
    let mut sched = Scheduler::new(RuntimeConfig::default(), Arc::new(InMemoryDom::new()), first.clone());
    sched.add_renderer_connection(second.clone());

    let root = Arc::new(vdom::parse(r#"<sleep for="1000000"/>"#).unwrap());
    let id = sched.spawn("main", root, None);
    let log = log_event(&mut sched, id, "rdrState");

    sched.tick().unwrap();

    first.simulate_disconnect();
    sched.tick().unwrap();
    assert!(log.lock().contains(&"rdrState:lostDuplicate".to_string()));
    assert!(!log.lock().contains(&"rdrState:connLost".to_string()));

    second.simulate_disconnect();
    sched.tick().unwrap();
    assert!(log.lock().contains(&"rdrState:connLost".to_string()));
}

/// Scenario 6, `spec.md` §8: a `sleep` with no other pending work.
/// Expect the coroutine to stay `Stopped` until its deadline elapses,
/// then resume and exit.
#[test]
fn sleep_wakes_only_once_its_deadline_has_elapsed() {
    let mut sched = scheduler();
    let root = Arc::new(vdom::parse(r#"<body><sleep for="50"/><exit with="1"/></body>"#).unwrap());
    let id = sched.spawn("main", root, None);

    let started = Instant::now();
    loop {
        sched.tick().unwrap();
        if sched.coroutine(id).is_none() {
            break;
        }
        assert!(started.elapsed() < Duration::from_secs(2), "scheduler never woke the sleeper");
        std::thread::sleep(Duration::from_millis(5));
    }

    assert!(
        started.elapsed() >= Duration::from_millis(50),
        "coroutine exited before its sleep deadline: {:?}",
        started.elapsed()
    );
    assert!(sched.is_quiescent());
}
