//! Property tests for the retry policy and the promotion workflow.
//!
//! All runs use the in-memory registry and a recording sleeper, so no
//! wall-clock time passes.

#![allow(clippy::unwrap_used, clippy::panic)]

use proptest::prelude::*;
use stagehand_core::retry::RecordingSleeper;
use stagehand_core::{
    InMemoryRegistry, ModelName, ModelRegistry, PromotionOutcome, RetryPolicy, Stage,
    StagePromoter,
};
use std::time::Duration;

// =============================================================================
// HELPERS
// =============================================================================

fn model() -> ModelName {
    ModelName::new("Best Model").unwrap()
}

const DELAY: Duration = Duration::from_secs(5);

fn production_count(registry: &InMemoryRegistry) -> usize {
    registry
        .versions(&model())
        .iter()
        .filter(|v| v.stage == Stage::Production)
        .count()
}

// =============================================================================
// RETRY POLICY
// =============================================================================

proptest! {
    #[test]
    fn retry_calls_and_sleeps_are_bounded(failures in 0u32..10, max_attempts in 1u32..6) {
        let sleeper = RecordingSleeper::new();
        let policy = RetryPolicy::fixed(max_attempts, DELAY);
        let mut calls = 0u32;

        let result = policy.run(&sleeper, "prop", |attempt| {
            calls += 1;
            if attempt <= failures { Err("fail") } else { Ok(attempt) }
        });

        prop_assert_eq!(calls, (failures + 1).min(max_attempts));
        prop_assert_eq!(sleeper.sleeps().len() as u32, failures.min(max_attempts - 1));
        prop_assert_eq!(result.is_ok(), failures < max_attempts);
    }
}

// =============================================================================
// PROMOTION WORKFLOW
// =============================================================================

proptest! {
    #[test]
    fn archive_failures_gate_the_promote_call(
        archive_failures in 0u32..6,
        max_attempts in 1u32..5,
    ) {
        let registry = InMemoryRegistry::new();
        let prod = registry.with_version(&model(), "prod", Stage::Production);
        let staged = registry.with_version(&model(), "staged", Stage::Staging);
        registry.fail_transitions_to(Stage::Archived, archive_failures);

        let sleeper = RecordingSleeper::new();
        let promoter = StagePromoter::with_sleeper(
            &registry,
            RetryPolicy::fixed(max_attempts, DELAY),
            &sleeper,
        );
        let outcome = promoter.promote(&model());

        let journal = registry.transitions();
        let promote_calls = journal.iter().filter(|t| t.to == Stage::Production).count();

        if archive_failures < max_attempts {
            prop_assert_eq!(outcome.kind(), "promoted");
            prop_assert_eq!(promote_calls, 1);
            prop_assert_eq!(sleeper.sleeps().len() as u32, archive_failures);
            prop_assert_eq!(registry.stage_of(&model(), prod.version), Some(Stage::Archived));
            prop_assert_eq!(registry.stage_of(&model(), staged.version), Some(Stage::Production));
        } else {
            prop_assert_eq!(outcome.kind(), "archive_failed");
            prop_assert_eq!(promote_calls, 0);
            prop_assert_eq!(sleeper.sleeps().len() as u32, max_attempts - 1);
            prop_assert_eq!(registry.stage_of(&model(), prod.version), Some(Stage::Production));
        }
    }

    #[test]
    fn archive_always_precedes_promote(staging_count in 1usize..5, production_versions in 0usize..4) {
        let registry = InMemoryRegistry::new();
        for i in 0..production_versions {
            registry.with_version(&model(), &format!("prod-{i}"), Stage::Production);
        }
        let with_production = production_versions > 0;
        for i in 0..staging_count {
            registry.with_version(&model(), &format!("staged-{i}"), Stage::Staging);
        }

        let sleeper = RecordingSleeper::new();
        let outcome = StagePromoter::with_sleeper(&registry, RetryPolicy::default(), &sleeper)
            .promote(&model());

        let journal = registry.transitions();
        if with_production {
            prop_assert_eq!(journal.len(), 2);
            prop_assert_eq!(journal[0].to, Stage::Archived);
            prop_assert_eq!(journal[1].to, Stage::Production);
        } else {
            prop_assert_eq!(journal.len(), 1);
            prop_assert_eq!(journal[0].to, Stage::Production);
        }

        // The newest Staging version wins and is the only one in Production,
        // however many versions held Production before.
        match outcome {
            PromotionOutcome::Promoted { version, .. } => {
                let newest = registry.versions(&model()).iter().map(|v| v.version).max();
                prop_assert_eq!(Some(version), newest);
            }
            other => prop_assert!(false, "unexpected outcome {other:?}"),
        }
        prop_assert_eq!(production_count(&registry), 1);
        prop_assert!(sleeper.sleeps().is_empty());
    }

    #[test]
    fn unregistered_names_have_no_candidate(raw in "[A-Za-z][A-Za-z0-9 _-]{0,20}") {
        let registry = InMemoryRegistry::new();
        registry.with_version(&model(), "other", Stage::Staging);
        let name = ModelName::new(format!("unknown {raw}")).unwrap();
        let sleeper = RecordingSleeper::new();

        let outcome = StagePromoter::with_sleeper(&registry, RetryPolicy::default(), &sleeper)
            .promote(&name);

        prop_assert_eq!(outcome, PromotionOutcome::NoStagingCandidate { model: name });
        prop_assert!(registry.transitions().is_empty());
        prop_assert!(sleeper.sleeps().is_empty());
    }

    #[test]
    fn repeated_promotion_is_a_no_op(runs in 2usize..5) {
        let registry = InMemoryRegistry::new();
        registry.with_version(&model(), "staged", Stage::Staging);
        let promoter = StagePromoter::with_sleeper(&registry, RetryPolicy::default(), RecordingSleeper::new());

        prop_assert_eq!(promoter.promote(&model()).kind(), "promoted");
        let after_first = registry.transitions().len();
        for _ in 1..runs {
            prop_assert_eq!(promoter.promote(&model()).kind(), "no_staging_candidate");
        }
        prop_assert_eq!(registry.transitions().len(), after_first);
    }
}

// =============================================================================
// PARTIAL FAILURE
// =============================================================================

#[test]
fn promote_exhaustion_after_archive_leaves_no_production() {
    let registry = InMemoryRegistry::new();
    registry.with_version(&model(), "prod", Stage::Production);
    registry.with_version(&model(), "staged", Stage::Staging);
    registry.fail_transitions_to(Stage::Production, 3);

    let outcome = StagePromoter::with_sleeper(&registry, RetryPolicy::default(), RecordingSleeper::new())
        .promote(&model());

    assert!(outcome.left_without_production());
    assert_eq!(production_count(&registry), 0);
    assert!(
        registry
            .latest_versions(&model(), Stage::Staging)
            .unwrap()
            .iter()
            .all(|v| v.run_id == "staged")
    );
}
