use super::*;
use crate::engine::chain::{self, BuildOptions};
use crate::engine::events::RecordingPresenter;
use crate::engine::storage::MemoryStorage;
use crate::engine::store::RecordStore;
use crate::model::{CtaId, CtaRecord, Datatype, Direction, DocumentContext, Operator, OverflowPolicy, StorageCondition};
use chrono::TimeZone;

const ARTICLE: &str = r#"<html><body><div class="entry-content"><p>one</p><p>two</p><p>three</p><p>four</p><p>five</p></div></body></html>"#;

fn visits_over(n: u32) -> StorageCondition {
    StorageCondition::new("visits", Operator::Gt, n.to_string(), Datatype::Numeric)
}

fn chain_of(records: Vec<CtaRecord>) -> ChainDescriptor {
    let start = records[0].id;
    let store = RecordStore::from_records(records).unwrap();
    chain::build(start, &store, &DocumentContext::new("post"), &BuildOptions::default())
}

fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

fn config() -> EngineConfig {
    EngineConfig { start_delay_ms: 0, ..EngineConfig::default() }
}

fn body_texts(doc: &Document) -> Vec<String> {
    let container = doc.query(".entry-content").unwrap().unwrap();
    doc.element_children(container).into_iter().map(|id| doc.text_content(id)).collect()
}

#[test]
fn third_candidate_selected_and_fallback_reported() {
    let chain = chain_of(vec![
        CtaRecord::new(1, "<p>First</p>").with_condition(visits_over(5)).with_fallback(2),
        CtaRecord::new(2, "<p>Second</p>").with_condition(visits_over(3)).with_fallback(3),
        CtaRecord::new(3, "<p>Third</p>"),
    ]);
    let storage = MemoryStorage::new().with("visits", "2");
    let mut events = Vec::new();
    let mut doc = Document::parse(ARTICLE);

    let outcome = {
        let mut orchestrator =
            Orchestrator::new(chain, &storage, config()).with_now(fixed_now()).with_listener(|n: &Notification| events.push(*n));
        orchestrator.run(&mut doc)
    };

    let insertion = outcome.insertion().unwrap();
    assert_eq!(insertion.entry.cta_id, CtaId(3));
    assert_eq!(insertion.chain_index, 2);
    assert_eq!(insertion.chain_length, 3);
    assert!(!insertion.terminal_fallback);
    assert_eq!(
        events,
        vec![
            Notification::Shown { cta_id: CtaId(3), chain_index: 2, chain_length: 3 },
            Notification::FallbackUsed { cta_id: CtaId(3), chain_index: 2, chain_length: 3 },
        ]
    );
    assert!(doc.to_html().contains(
        r#"<div class="cta-auto-insert" data-cta-id="3" data-chain-index="2" data-chain-length="3"><p>Third</p></div>"#
    ));
}

#[test]
fn first_candidate_emits_only_shown() {
    let chain = chain_of(vec![CtaRecord::new(1, "<p>A</p>").with_condition(visits_over(1)).with_fallback(2), CtaRecord::new(2, "b")]);
    let storage = MemoryStorage::new().with("visits", "2");
    let mut events = Vec::new();
    let mut doc = Document::parse(ARTICLE);
    {
        let mut orchestrator = Orchestrator::new(chain, &storage, config()).with_listener(|n: &Notification| events.push(n.name()));
        assert!(orchestrator.run(&mut doc).is_inserted());
    }
    assert_eq!(events, vec!["shown"]);
}

#[test]
fn planning_is_repeatable() {
    let chain = chain_of(vec![
        CtaRecord::new(1, "<p>A</p>").with_condition(visits_over(9)).with_fallback(2),
        CtaRecord::new(2, "<p>B</p>").with_placement(Direction::Reverse, 2, OverflowPolicy::Skip),
    ]);
    let storage = MemoryStorage::new().with("visits", "4");
    let doc = Document::parse(ARTICLE);
    let orchestrator = Orchestrator::new(chain, &storage, config()).with_now(fixed_now());

    let first = orchestrator.plan(&doc).unwrap();
    let second = orchestrator.plan(&doc).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.selection.index, 1);
    assert_eq!(first.insertion_index(), Some(3));
    assert_eq!(orchestrator.state(), State::Idle);
}

#[test]
fn terminal_fallback_when_everything_fails() {
    let chain = chain_of(vec![
        CtaRecord::new(1, "<p>A</p>").with_condition(visits_over(5)).with_fallback(2),
        CtaRecord::new(2, "<p>B</p>").with_condition(visits_over(6)),
    ]);
    let storage = MemoryStorage::new();
    let mut doc = Document::parse(ARTICLE);
    let mut orchestrator = Orchestrator::new(chain, &storage, config());

    let (outcome, metrics) = orchestrator.run_with_metrics(&mut doc);
    let insertion = outcome.insertion().unwrap();
    assert_eq!(insertion.entry.cta_id, CtaId(2));
    assert!(insertion.terminal_fallback);
    assert_eq!(metrics.candidates.len(), 2);
    assert!(metrics.candidates.iter().all(|c| c.outcome == CandidateOutcome::Failed));
    assert_eq!(
        metrics.transitions,
        vec![State::Idle, State::ContainerResolved, State::ElementsParsed, State::CandidateSelected, State::Inserted]
    );
}

#[test]
fn corrupt_expression_fails_to_next_candidate() {
    let broken = ChainEntry { compiled_condition_expr: "numeric:gt(\"visits\"".to_string(), has_conditions: true, ..ChainEntry::from_record(&CtaRecord::new(1, "<p>broken</p>")) };
    let good = ChainEntry::from_record(&CtaRecord::new(2, "<p>good</p>"));
    let chain = ChainDescriptor::new(vec![broken, good], ".entry-content");
    let storage = MemoryStorage::new().with("visits", "100");
    let mut doc = Document::parse(ARTICLE);

    let (outcome, metrics) = Orchestrator::new(chain, &storage, config()).run_with_metrics(&mut doc);
    assert_eq!(outcome.insertion().map(|i| i.entry.cta_id), Some(CtaId(2)));
    assert!(matches!(metrics.candidates[0].outcome, CandidateOutcome::Fault(_)));
    assert_eq!(metrics.candidates[1].outcome, CandidateOutcome::Unconditional);
}

#[test]
fn runs_at_most_once() {
    let chain = chain_of(vec![CtaRecord::new(1, "<p>A</p>")]);
    let storage = MemoryStorage::new();
    let mut doc = Document::parse(ARTICLE);
    let mut orchestrator = Orchestrator::new(chain, &storage, config());

    assert!(orchestrator.run(&mut doc).is_inserted());
    let after_first = doc.to_html();
    assert_eq!(orchestrator.run(&mut doc), Outcome::Aborted(AbortReason::AlreadyRan));
    assert_eq!(orchestrator.run_deferred(&mut doc), Outcome::Aborted(AbortReason::AlreadyRan));
    assert_eq!(doc.to_html(), after_first);
    assert_eq!(orchestrator.state(), State::Inserted);
}

#[test]
fn aborted_run_is_terminal_too() {
    let chain = chain_of(vec![CtaRecord::new(1, "<p>A</p>")]);
    let storage = MemoryStorage::new();
    let mut orchestrator = Orchestrator::new(chain, &storage, config());

    let mut bare = Document::parse("<p>no container here</p>");
    assert_eq!(orchestrator.run(&mut bare), Outcome::Aborted(AbortReason::NoContainer));
    assert_eq!(orchestrator.state(), State::Aborted);

    let mut doc = Document::parse(ARTICLE);
    assert_eq!(orchestrator.run(&mut doc), Outcome::Aborted(AbortReason::AlreadyRan));
}

#[test]
fn placements_follow_the_selected_entry() {
    let cases = vec![
        (Direction::Forward, 3, OverflowPolicy::Skip, vec!["one", "two", "three", "CTA", "four", "five"]),
        (Direction::Forward, 1, OverflowPolicy::Skip, vec!["one", "CTA", "two", "three", "four", "five"]),
        (Direction::Reverse, 1, OverflowPolicy::Skip, vec!["one", "two", "three", "four", "CTA", "five"]),
        (Direction::Reverse, 9, OverflowPolicy::Skip, vec!["CTA", "one", "two", "three", "four", "five"]),
        (Direction::Forward, 5, OverflowPolicy::Skip, vec!["one", "two", "three", "four", "five", "CTA"]),
        (Direction::Forward, 40, OverflowPolicy::ClampToEnd, vec!["one", "two", "three", "four", "five", "CTA"]),
    ];
    for (direction, position, overflow, expected) in cases {
        let chain = chain_of(vec![CtaRecord::new(1, "<b>CTA</b>").with_placement(direction, position, overflow)]);
        let storage = MemoryStorage::new();
        let mut doc = Document::parse(ARTICLE);
        assert!(Orchestrator::new(chain, &storage, config()).run(&mut doc).is_inserted());
        assert_eq!(body_texts(&doc), expected, "{direction:?} {position} {overflow:?}");
    }
}

#[test]
fn overflow_with_skip_leaves_document_alone() {
    let chain = chain_of(vec![CtaRecord::new(1, "<p>A</p>").with_placement(Direction::Forward, 10, OverflowPolicy::Skip)]);
    let storage = MemoryStorage::new();
    let mut doc = Document::parse(ARTICLE);
    let before = doc.to_html();

    assert_eq!(Orchestrator::new(chain, &storage, config()).run(&mut doc), Outcome::Aborted(AbortReason::Skipped));
    assert_eq!(doc.to_html(), before);
}

#[test]
fn append_lands_after_last_block_not_after_trailing_scripts() {
    let chain = chain_of(vec![CtaRecord::new(1, "<p>CTA</p>").with_placement(Direction::Forward, 2, OverflowPolicy::Skip)]);
    let storage = MemoryStorage::new();
    let mut doc = Document::parse(r#"<div class="entry-content"><p>a</p><p> </p><p>b</p><script>track()</script></div>"#);

    assert!(Orchestrator::new(chain, &storage, config()).run(&mut doc).is_inserted());
    assert_eq!(
        doc.to_html(),
        r#"<div class="entry-content"><p>a</p><p> </p><p>b</p><div class="cta-auto-insert" data-cta-id="1" data-chain-index="0" data-chain-length="1"><p>CTA</p></div><script>track()</script></div>"#
    );
}

#[test]
fn container_falls_back_to_generic_selectors() {
    let chain = ChainDescriptor::new(vec![ChainEntry::from_record(&CtaRecord::new(1, "<p>A</p>"))], "#missing");
    let storage = MemoryStorage::new();
    let doc = Document::parse("<main><article><div class=\"content\"><p>x</p></div></article></main>");

    let plan = Orchestrator::new(chain, &storage, config()).plan(&doc).unwrap();
    assert_eq!(plan.container_selector, "article .content");
    assert_eq!(plan.elements.len(), 1);
}

#[test]
fn structural_absence_aborts_silently() {
    let storage = MemoryStorage::new();
    let one = || chain_of(vec![CtaRecord::new(1, "<p>A</p>")]);

    let empty_container = Document::parse(r#"<div class="entry-content"><p>&nbsp;</p><script>x()</script></div>"#);
    assert_eq!(Orchestrator::new(one(), &storage, config()).plan(&empty_container), Err(AbortReason::NoElements));

    let nothing = Document::parse("<div id=\"sidebar\"><p>x</p></div>");
    assert_eq!(Orchestrator::new(one(), &storage, config()).plan(&nothing), Err(AbortReason::NoContainer));

    let empty_chain = ChainDescriptor::new(Vec::new(), ".entry-content");
    let doc = Document::parse(ARTICLE);
    assert_eq!(Orchestrator::new(empty_chain, &storage, config()).plan(&doc), Err(AbortReason::EmptyChain));
}

#[test]
fn highlight_content_is_handed_to_presenter() {
    let chain = chain_of(vec![CtaRecord::new(1, r#"<section data-cta-highlight="1"><p>Look</p></section>"#)]);
    let storage = MemoryStorage::new();
    let mut presenter = RecordingPresenter::default();
    let mut doc = Document::parse(ARTICLE);

    let outcome = Orchestrator::new(chain, &storage, config()).with_presenter(&mut presenter).run(&mut doc);
    let insertion = outcome.insertion().unwrap();
    assert!(insertion.highlighted);
    assert_eq!(presenter.presented, vec![insertion.wrapper]);
    assert_eq!(doc.attr(insertion.wrapper, "data-cta-id"), Some("1"));
}

#[test]
fn plain_content_is_not_presented() {
    let chain = chain_of(vec![CtaRecord::new(1, "<p>Quiet</p>")]);
    let storage = MemoryStorage::new();
    let mut presenter = RecordingPresenter::default();
    let mut doc = Document::parse(ARTICLE);

    let outcome = Orchestrator::new(chain, &storage, config()).with_presenter(&mut presenter).run(&mut doc);
    assert!(!outcome.insertion().unwrap().highlighted);
    assert!(presenter.presented.is_empty());
}

#[test]
fn payload_position_zero_places_like_position_one() {
    let zero = ChainEntry { insertion_position: 0, ..ChainEntry::from_record(&CtaRecord::new(1, "<b>CTA</b>")) };
    let storage = MemoryStorage::new();
    let mut doc = Document::parse(ARTICLE);

    let chain = ChainDescriptor::new(vec![zero], ".entry-content");
    assert!(Orchestrator::new(chain, &storage, config()).run(&mut doc).is_inserted());
    assert_eq!(body_texts(&doc), vec!["one", "CTA", "two", "three", "four", "five"]);
}

#[test]
fn start_delay_applies_only_before_the_first_run() {
    let chain = chain_of(vec![CtaRecord::new(1, "<p>A</p>")]);
    let storage = MemoryStorage::new();
    let mut doc = Document::parse(ARTICLE);
    let delayed = EngineConfig { start_delay_ms: 20, ..EngineConfig::default() };
    let mut orchestrator = Orchestrator::new(chain, &storage, delayed);

    let started = Instant::now();
    let (outcome, metrics) = orchestrator.run_deferred_with_metrics(&mut doc);
    assert!(outcome.is_inserted());
    assert!(started.elapsed() >= Duration::from_millis(20));
    assert_eq!(metrics.delay, Duration::from_millis(20));

    let (again, metrics) = orchestrator.run_deferred_with_metrics(&mut doc);
    assert_eq!(again, Outcome::Aborted(AbortReason::AlreadyRan));
    assert_eq!(metrics.delay, Duration::ZERO);
}

#[test]
fn zero_delay_does_not_wait() {
    let chain = chain_of(vec![CtaRecord::new(1, "<p>A</p>")]);
    let storage = MemoryStorage::new();
    let mut doc = Document::parse(ARTICLE);

    let (outcome, metrics) = Orchestrator::new(chain, &storage, config()).run_deferred_with_metrics(&mut doc);
    assert!(outcome.is_inserted());
    assert_eq!(metrics.delay, Duration::ZERO);
}
