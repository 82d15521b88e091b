// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic,
    clippy::string_slice
)]

//! Property-based tests for upgrade-test.
//!
//! Uses proptest to generate random inputs and verify invariants.

#[path = "../common/mod.rs"]
mod common;

use std::path::Path;

use proptest::prelude::*;

use upgrade_test::config::{
    DEFAULT_PREPARE_COMMAND, DEFAULT_UPGRADE_COMMAND, ImageReference, OperatorConfig,
};
use upgrade_test::controller::install_state_machine::{
    InstallEvent, InstallPhase, InstallStateMachine, InstallTransitionContext,
};
use upgrade_test::orchestrator::{resolve_test_command, resolve_workspace};
use upgrade_test::source::sanitize_path;

use common::fixtures::VersionBuilder;

/// Strategy for version names, including separators and punctuation.
fn version_name() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-z]{1,8}/v[0-9]{1,2}\\.[0-9]{1,2}[!@# ]?",
        "\\PC{0,24}",
        Just("..".to_string()),
        Just(String::new()),
    ]
}

/// Forward installation order.
const FORWARD: [InstallPhase; 7] = [
    InstallPhase::Requested,
    InstallPhase::Published,
    InstallPhase::CatalogVisible,
    InstallPhase::Subscribed,
    InstallPhase::PlanGenerated,
    InstallPhase::PlanApproved,
    InstallPhase::Installed,
];

fn any_phase() -> impl Strategy<Value = InstallPhase> {
    prop_oneof![
        Just(InstallPhase::Requested),
        Just(InstallPhase::Published),
        Just(InstallPhase::CatalogVisible),
        Just(InstallPhase::Subscribed),
        Just(InstallPhase::PlanGenerated),
        Just(InstallPhase::PlanApproved),
        Just(InstallPhase::Installed),
        Just(InstallPhase::Failed),
    ]
}

fn any_event() -> impl Strategy<Value = InstallEvent> {
    prop_oneof![
        Just(InstallEvent::BundlePresent),
        Just(InstallEvent::CatalogEntryFound),
        Just(InstallEvent::SubscriptionCreated),
        Just(InstallEvent::InstallPlanGenerated),
        Just(InstallEvent::InstallPlanApproved),
        Just(InstallEvent::CsvSucceeded),
        Just(InstallEvent::StepFailed),
    ]
}

proptest! {
    #[test]
    fn sanitized_names_use_allowed_characters(name in version_name()) {
        let sanitized = sanitize_path(&name);
        prop_assert!(!sanitized.is_empty());
        prop_assert!(
            sanitized
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        );
        prop_assert!(!sanitized.contains("__"));
    }

    #[test]
    fn sanitize_is_idempotent(name in version_name()) {
        let once = sanitize_path(&name);
        prop_assert_eq!(sanitize_path(&once), once);
    }

    #[test]
    fn sanitized_name_stays_one_component(name in version_name()) {
        let base = Path::new("/work/checkouts");
        let joined = base.join(sanitize_path(&name));
        prop_assert_eq!(joined.parent(), Some(base));
        prop_assert!(sanitize_path(&name) != "..");
    }

    #[test]
    fn first_version_prepares_others_upgrade(index in 0usize..64) {
        let op = OperatorConfig::default();
        let version = VersionBuilder::new("v1").build();
        let command = resolve_test_command(&version, index, &op);
        if index == 0 {
            prop_assert_eq!(command, DEFAULT_PREPARE_COMMAND);
        } else {
            prop_assert_eq!(command, DEFAULT_UPGRADE_COMMAND);
        }
    }

    #[test]
    fn explicit_command_always_wins(index in 0usize..64, command in "[a-z ]{1,20}") {
        prop_assume!(!command.trim().is_empty());
        let op = OperatorConfig::default();
        let version = VersionBuilder::new("v1").test_command(&command).build();
        prop_assert_eq!(resolve_test_command(&version, index, &op), command.trim());
    }

    #[test]
    fn workspace_without_sub_path_is_base(dir in "/[a-z]{1,8}(/[a-z]{1,8}){0,3}") {
        let version = VersionBuilder::new("v1").build();
        prop_assert_eq!(resolve_workspace(Path::new(&dir), &version), Path::new(&dir).to_path_buf());
    }

    #[test]
    fn image_tag_round_trips(
        registry in "[a-z]{1,10}(\\.[a-z]{2,5})?(:[0-9]{2,5})?",
        repository in "[a-z]{1,8}(/[a-z0-9-]{1,12}){0,2}",
        tag in "v[0-9]{1,2}\\.[0-9]{1,2}\\.[0-9]{1,2}",
    ) {
        let image: ImageReference = format!("{}/{}:{}", registry, repository, tag).parse().unwrap();
        prop_assert_eq!(image.registry, registry);
        prop_assert_eq!(image.repository, repository);
        prop_assert_eq!(image.reference, tag);
    }

    #[test]
    fn terminal_phases_have_no_successors(phase in any_phase()) {
        let sm = InstallStateMachine::new();
        if phase.is_terminal() {
            prop_assert!(sm.valid_transitions(phase).is_empty());
        }
    }

    #[test]
    fn can_transition_matches_valid_transitions(from in any_phase(), to in any_phase()) {
        let sm = InstallStateMachine::new();
        let expected = from == to || sm.valid_transitions(from).contains(&to);
        prop_assert_eq!(sm.can_transition(from, to), expected);
    }

    #[test]
    fn no_stage_is_skipped(phase in any_phase(), event in any_event()) {
        let sm = InstallStateMachine::new();
        let ctx = InstallTransitionContext {
            version_id: Some("demo.v1.0.0".into()),
            install_plan: Some("install-abc".into()),
        };
        if let Some(t) = sm.transition(phase, event, &ctx) {
            let next = FORWARD
                .iter()
                .position(|p| *p == phase)
                .and_then(|i| FORWARD.get(i + 1));
            prop_assert!(t.to == InstallPhase::Failed || Some(&t.to) == next);
        }
    }

    #[test]
    fn guarded_transitions_need_context(phase in any_phase(), event in any_event()) {
        let sm = InstallStateMachine::new();
        let ctx = InstallTransitionContext::default();
        if let Some(t) = sm.transition(phase, event, &ctx) {
            prop_assert!(t.to != InstallPhase::Published && t.to != InstallPhase::PlanGenerated);
        }
    }
}
