//! Integration tests for the `purc-node` host binary: each drives a
//! complete HVML source string through a fresh `Scheduler` the way
//! `main()` does, without going through the CLI process itself.

use std::io::Write;
use std::sync::Arc;

use purc_config::RuntimeConfig;
use purc_dom::{vdom, DomSink, InMemoryDom, LoopbackRenderer};
use purc_runtime::Scheduler;

fn run(source: &str) -> (Arc<InMemoryDom>, Scheduler) {
    let root = vdom::parse(source).unwrap();
    let dom = Arc::new(InMemoryDom::new());
    let transport = Arc::new(LoopbackRenderer::new());
    let mut scheduler = Scheduler::new(RuntimeConfig::default(), dom.clone(), transport);
    scheduler.spawn("main", Arc::new(root), None);
    scheduler.run_to_completion(1000).unwrap();
    (dom, scheduler)
}

#[test]
fn a_plain_document_quiesces_with_its_content_serialized() {
    let (dom, scheduler) = run(r#"<hvml><body><h1>hello</h1><p>world</p></body></hvml>"#);
    assert!(scheduler.is_quiescent());
    assert_eq!(
        dom.serialize(dom.root()).unwrap(),
        "<#document><body><h1>hello</h1><p>world</p></body></#document>"
    );
}

#[test]
fn a_caught_exception_still_reaches_quiescence_with_the_recovery_content() {
    let (dom, scheduler) = run(
        r#"<hvml><body><catch for="NotSupported">recovered</catch><request on="https://example.test/x"/></body></hvml>"#,
    );
    assert!(scheduler.is_quiescent());
    assert!(dom.serialize(dom.root()).unwrap().contains("recovered"));
}

#[test]
fn a_config_file_overrides_the_default_scheduler_tunables() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "[scheduler]\ntick_sleep_ms = 25\n").unwrap();

    let config = RuntimeConfig::load(file.path()).unwrap();
    assert_eq!(config.scheduler.tick_sleep_ms, 25);
    assert_eq!(config.scheduler.idle_event_timeout_ms, 100);
}

#[test]
fn running_the_same_source_twice_is_independent_between_instances() {
    let (dom_a, _) = run(r#"<exit with="1"/>"#);
    let (dom_b, _) = run(r#"<body><p>only here</p></body>"#);
    assert!(!dom_a.serialize(dom_a.root()).unwrap().contains("only here"));
    assert!(dom_b.serialize(dom_b.root()).unwrap().contains("only here"));
}
