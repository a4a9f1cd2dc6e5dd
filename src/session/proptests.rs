//! Property-based tests for turn transitions, stream assembly and the store
//!
//! These tests verify key invariants hold across all possible inputs.

use super::assembler::{AssemblyUpdate, StreamAssembler};
use super::state::*;
use super::store::{ConversationStore, StoreError};
use super::transition::*;
use crate::search::{SearchResponse, StreamEvent, Summary};
use proptest::prelude::*;

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_resolution() -> impl Strategy<Value = TurnResolution> {
    (
        "[a-z0-9]{1,8}",
        "[a-zA-Z .]{0,40}",
        proptest::option::of("[a-z0-9-]{4,12}"),
        proptest::option::of(0.0f32..1.0),
    )
        .prop_map(|(turn_id, answer, conversation_id, factual_consistency)| {
            TurnResolution {
                turn_id,
                answer,
                results: vec![],
                conversation_id,
                factual_consistency,
            }
        })
}

fn arb_event() -> impl Strategy<Value = TurnEvent> {
    prop_oneof![
        Just(TurnEvent::StreamStarted),
        "[a-z ]{0,10}".prop_map(TurnEvent::Fragment),
        arb_resolution().prop_map(TurnEvent::Resolved),
        Just(TurnEvent::Failed),
        Just(TurnEvent::Retried),
    ]
}

fn arb_fragments() -> impl Strategy<Value = Vec<String>> {
    proptest::collection::vec("[a-zA-Z .,]{0,12}", 0..20)
}

/// Operations a caller can perform on the store
#[derive(Debug, Clone)]
enum StoreOp {
    Append(String),
    Retry,
    BeginStreaming,
    Fragment(String),
    Finalize(TurnResolution),
    Fail,
    Reset,
}

fn arb_store_op() -> impl Strategy<Value = StoreOp> {
    prop_oneof![
        "[a-z]{1,8}".prop_map(StoreOp::Append),
        Just(StoreOp::Retry),
        Just(StoreOp::BeginStreaming),
        "[a-z ]{1,6}".prop_map(StoreOp::Fragment),
        arb_resolution().prop_map(StoreOp::Finalize),
        Just(StoreOp::Fail),
        Just(StoreOp::Reset),
    ]
}

fn assemble_stream(fragments: &[String], turn_id: &str) -> TurnResolution {
    let mut assembler = StreamAssembler::new(vec![]);
    for fragment in fragments {
        assembler
            .push(StreamEvent::Fragment(fragment.clone()))
            .unwrap();
    }
    assembler
        .push(StreamEvent::Chat {
            conversation_id: Some("conv".into()),
            turn_id: Some(turn_id.into()),
        })
        .unwrap();
    match assembler.push(StreamEvent::End).unwrap() {
        Some(AssemblyUpdate::Complete(resolution)) => resolution,
        other => panic!("expected completion, got {other:?}"),
    }
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// Settled turns never change, except an errored turn being retried
    #[test]
    fn settled_turns_are_terminal(event in arb_event(), resolution in arb_resolution()) {
        let resolved = transition(&Turn::placeholder("q"), TurnEvent::Resolved(resolution)).unwrap();
        prop_assert!(transition(&resolved, event.clone()).is_err());

        let errored = transition(&Turn::placeholder("q"), TurnEvent::Failed).unwrap();
        let next = transition(&errored, event.clone());
        if event == TurnEvent::Retried {
            prop_assert_eq!(next.unwrap(), Turn::placeholder("q"));
        } else {
            prop_assert!(next.is_err());
        }
    }

    /// The question survives every transition
    #[test]
    fn question_is_preserved(events in proptest::collection::vec(arb_event(), 0..20)) {
        let mut turn = Turn::placeholder("What is RAG?");
        for event in events {
            if let Ok(next) = transition(&turn, event) {
                turn = next;
            }
            prop_assert_eq!(&turn.question, "What is RAG?");
        }
    }

    /// Transitions are deterministic
    #[test]
    fn transition_is_pure(events in proptest::collection::vec(arb_event(), 1..10)) {
        let mut a = Turn::placeholder("q");
        let mut b = Turn::placeholder("q");
        for event in events {
            let next_a = transition(&a, event.clone());
            let next_b = transition(&b, event);
            prop_assert_eq!(&next_a, &next_b);
            if let (Ok(x), Ok(y)) = (next_a, next_b) {
                a = x;
                b = y;
            }
        }
    }

    /// The streamed answer is the fragments concatenated in arrival order
    #[test]
    fn fragments_concatenate(fragments in arb_fragments()) {
        let resolution = assemble_stream(&fragments, "t1");
        prop_assert_eq!(resolution.answer, fragments.concat());
    }

    /// Streaming fragments through transitions matches the assembler
    #[test]
    fn streamed_turn_matches_assembler(fragments in arb_fragments()) {
        let mut turn = transition(&Turn::placeholder("q"), TurnEvent::StreamStarted).unwrap();
        for fragment in &fragments {
            turn = transition(&turn, TurnEvent::Fragment(fragment.clone())).unwrap();
        }
        prop_assert_eq!(&turn.answer, &fragments.concat());

        let resolution = assemble_stream(&fragments, "t1");
        let resolved = transition(&turn, TurnEvent::Resolved(resolution)).unwrap();
        prop_assert_eq!(resolved.answer, fragments.concat());
    }

    /// A batch response resolves exactly like its streamed equivalent
    #[test]
    fn batch_matches_stream(fragments in arb_fragments(), score in proptest::option::of(0.0f32..1.0)) {
        let mut streamed = assemble_stream(&fragments, "t1");
        streamed.factual_consistency = score;

        let response = SearchResponse {
            results: vec![],
            summary: Some(Summary {
                text: fragments.concat(),
                turn_id: Some("t1".into()),
                conversation_id: Some("conv".into()),
                factual_consistency: score,
            }),
        };
        let batched = StreamAssembler::from_response(response, vec![]).unwrap();
        prop_assert_eq!(batched, streamed);
    }

    /// Store flags stay consistent under any sequence of operations
    #[test]
    fn store_invariants_hold(ops in proptest::collection::vec(arb_store_op(), 0..40)) {
        let store = ConversationStore::new();
        let mut generation = store.generation();

        for op in ops {
            let result = match op {
                StoreOp::Append(question) => {
                    if let Some(g) = store.append_placeholder(&question) {
                        generation = g;
                    }
                    Ok(())
                }
                StoreOp::Retry => {
                    if let Some((g, _)) = store.begin_retry() {
                        generation = g;
                    }
                    Ok(())
                }
                StoreOp::BeginStreaming => store.begin_streaming(generation),
                StoreOp::Fragment(text) => store.apply_fragment(generation, &text),
                StoreOp::Finalize(resolution) => store.finalize_turn(generation, resolution),
                StoreOp::Fail => store.mark_error(generation, "failed"),
                StoreOp::Reset => {
                    store.reset();
                    generation = store.generation();
                    Ok(())
                }
            };
            prop_assert_ne!(result, Err(StoreError::Stale));

            let snapshot = store.snapshot();
            prop_assert_eq!(snapshot.active_turn.is_some(), snapshot.is_loading);
            prop_assert!(!snapshot.is_streaming || snapshot.is_loading);
            prop_assert!(snapshot.history.iter().all(|turn| turn.phase.is_settled()));
            if let Some(turn) = &snapshot.active_turn {
                prop_assert!(!turn.phase.is_settled());
            }
        }
    }
}
