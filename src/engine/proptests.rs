//! Property-based tests for the conversation engine
//!
//! These tests verify key invariants hold across arbitrary trees, states and
//! messages.

use super::*;
use crate::tree::proptests::arb_tree;
use crate::tree::{Node, Tree, START_NODE};
use proptest::prelude::*;
use proptest::sample::Index;
use std::collections::BTreeMap;

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_answers() -> impl Strategy<Value = BTreeMap<String, String>> {
    proptest::collection::btree_map("[a-z]{1,6}", "[a-zA-Z0-9 ]{0,12}", 0..4)
}

/// Pick a node key of `tree`
fn key_at(tree: &Tree, index: &Index) -> String {
    let keys: Vec<&String> = tree.nodes().keys().collect();
    keys[index.index(keys.len())].clone()
}

fn arb_message() -> impl Strategy<Value = InboundMessage> {
    prop_oneof![
        "[a-zA-Z ]{0,12}".prop_map(InboundMessage::text),
        "[a-z]{1,6}".prop_map(InboundMessage::button_reply),
        "[a-z]{1,6}".prop_map(InboundMessage::list_reply),
        Just(InboundMessage::Interactive {
            button_reply_id: None,
            list_reply_id: None,
        }),
        "(image|audio|location|reaction)".prop_map(|kind| InboundMessage::Other { kind }),
    ]
}

/// Messages from which no answer can be extracted
fn arb_silent_message() -> impl Strategy<Value = InboundMessage> {
    prop_oneof![
        "(image|audio|location|reaction)".prop_map(|kind| InboundMessage::Other { kind }),
        "[ \t\n]{0,4}".prop_map(InboundMessage::text),
        Just(InboundMessage::Interactive {
            button_reply_id: None,
            list_reply_id: None,
        }),
    ]
}

/// A tree with a state positioned on one of its nodes (or not started)
fn arb_tree_and_state() -> impl Strategy<Value = (Tree, ConversationState)> {
    (arb_tree(), any::<Index>(), any::<bool>(), arb_answers()).prop_map(
        |(tree, index, started, answers)| {
            let state = if started {
                ConversationState::at(key_at(&tree, &index), answers)
            } else {
                ConversationState {
                    current_node_key: None,
                    answers,
                }
            };
            (tree, state)
        },
    )
}

/// A tree with a state positioned on one of its end nodes
fn arb_tree_and_end_state() -> impl Strategy<Value = (Tree, ConversationState)> {
    (arb_tree(), any::<Index>(), arb_answers()).prop_filter_map(
        "tree without end nodes",
        |(tree, index, answers)| {
            let ends: Vec<&String> = tree
                .nodes()
                .iter()
                .filter(|(_, node)| node.is_end())
                .map(|(key, _)| key)
                .collect();
            if ends.is_empty() {
                return None;
            }
            let key = ends[index.index(ends.len())].clone();
            Some((tree, ConversationState::at(key, answers)))
        },
    )
}

/// A tree with a state whose current node still expects an answer
fn arb_tree_and_open_state() -> impl Strategy<Value = (Tree, ConversationState)> {
    arb_tree_and_state().prop_filter("current node is an end node", |(tree, state)| {
        !current_node(tree, state).is_end()
    })
}

fn current_node<'a>(tree: &'a Tree, state: &ConversationState) -> &'a Node {
    tree.resolve(state.current_or_start()).1
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    // Invariant 1: The engine never points a conversation at a missing node
    #[test]
    fn prop_next_node_always_exists(
        (tree, state) in arb_tree_and_state(),
        message in arb_message()
    ) {
        let output = process_inbound(&state, &message, &tree);
        prop_assert!(tree.contains(&output.next_node_key), "Dangling next: {:?}", output);
        prop_assert_eq!(
            &output.response,
            &ResponseAction::for_node(tree.get(&output.next_node_key).unwrap())
        );
    }

    // Invariant 2: Stale node keys behave exactly like a fresh conversation
    #[test]
    fn prop_stale_state_restarts(
        tree in arb_tree(),
        answers in arb_answers(),
        message in arb_message()
    ) {
        let stale = ConversationState::at("no-such-node", answers.clone());
        let fresh = ConversationState { current_node_key: None, answers };
        prop_assert_eq!(
            process_inbound(&stale, &message, &tree),
            process_inbound(&fresh, &message, &tree)
        );
    }

    // Invariant 3: No answer means no movement and no new answers
    #[test]
    fn prop_no_answer_reprompts(
        (tree, state) in arb_tree_and_open_state(),
        message in arb_silent_message()
    ) {
        let output = process_inbound(&state, &message, &tree);
        prop_assert_eq!(output.next_node_key.as_str(), state.current_or_start());
        prop_assert_eq!(&output.updated_answers, &state.answers);
        prop_assert!(!output.should_handoff);
    }

    // Invariant 4: Any message on a terminal node restarts without handoff
    #[test]
    fn prop_end_restarts(
        (tree, state) in arb_tree_and_end_state(),
        message in arb_message()
    ) {
        prop_assert!(current_node(&tree, &state).is_end());

        let output = process_inbound(&state, &message, &tree);
        prop_assert_eq!(output.next_node_key.as_str(), START_NODE);
        prop_assert_eq!(&output.updated_answers, &state.answers);
        prop_assert!(!output.should_handoff);
    }

    // Invariant 5: Handoff is signalled exactly when arriving at an end node
    #[test]
    fn prop_handoff_iff_arriving_at_end(
        (tree, state) in arb_tree_and_open_state(),
        message in arb_message()
    ) {
        let output = process_inbound(&state, &message, &tree);
        let arrived_at = tree.get(&output.next_node_key).unwrap();
        prop_assert_eq!(output.should_handoff, arrived_at.is_end());
    }

    // Invariant 6: Extracted answers are recorded under saveAs, matched or not
    #[test]
    fn prop_answer_recorded_under_save_as(
        (tree, state) in arb_tree_and_open_state(),
        message in arb_message()
    ) {
        let current = current_node(&tree, &state);
        let (Some(save_as), Some(answer)) = (current.save_as(), message.answer()) else {
            return Ok(());
        };

        let output = process_inbound(&state, &message, &tree);
        prop_assert_eq!(output.updated_answers.get(save_as), Some(&answer));
        for (key, value) in &state.answers {
            if key != save_as {
                prop_assert_eq!(output.updated_answers.get(key), Some(value));
            }
        }
    }

    // Invariant 7: Option ids match regardless of case and padding
    #[test]
    fn prop_option_match_ignores_case(
        (tree, state) in arb_tree_and_state(),
        pick in any::<Index>()
    ) {
        let (Node::List(choice) | Node::Buttons(choice)) = current_node(&tree, &state) else {
            return Ok(());
        };
        let id = &choice.options[pick.index(choice.options.len())].id;

        let exact = process_inbound(&state, &InboundMessage::button_reply(id.clone()), &tree);
        let shouted = process_inbound(
            &state,
            &InboundMessage::text(format!("  {}  ", id.to_uppercase())),
            &tree,
        );
        prop_assert_eq!(&exact.next_node_key, &shouted.next_node_key);
        prop_assert_eq!(exact.should_handoff, shouted.should_handoff);
    }

    // Invariant 8: Same inputs, same outputs
    #[test]
    fn prop_deterministic(
        (tree, state) in arb_tree_and_state(),
        message in arb_message()
    ) {
        prop_assert_eq!(
            process_inbound(&state, &message, &tree),
            process_inbound(&state, &message, &tree)
        );
    }
}
