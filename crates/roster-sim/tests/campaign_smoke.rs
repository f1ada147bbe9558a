use proptest::prelude::*;
use roster_sim::faults::FaultConfig;
use roster_sim::{CampaignConfig, ScenarioConfig, replay_seed, run_campaign};

#[test]
fn faulty_campaign_holds_every_invariant() {
    let config = CampaignConfig {
        seed_range: 0..25,
        ..CampaignConfig::default()
    };
    let report = run_campaign(&config).expect("campaign should not error");
    assert_eq!(report.seeds_run, 25);
    assert!(
        report.all_passed(),
        "campaign failed: first at seed {:?}: {:?}",
        report.first_failure,
        report.failures.first(),
    );
    assert!(report.faulted_seeds > 0, "default faults should fire somewhere");
}

#[test]
fn heavy_mutation_failures_still_hold() {
    let config = CampaignConfig {
        seed_range: 100..115,
        faults: FaultConfig {
            mutation_failure_percent: 50,
            fetch_failure_percent: 20,
            ..FaultConfig::default()
        },
        ..CampaignConfig::default()
    };
    let report = run_campaign(&config).expect("campaign should not error");
    assert!(report.all_passed(), "failures: {:?}", report.failures);
    assert_eq!(report.seeds_passed, 15);
}

#[test]
fn zero_settle_delay_is_allowed() {
    let config = CampaignConfig {
        seed_range: 0..5,
        settle_delay_ms: 0,
        ..CampaignConfig::default()
    };
    let report = run_campaign(&config).expect("campaign should not error");
    assert!(report.all_passed(), "failures: {:?}", report.failures);
}

#[test]
fn quiet_replay_reports_a_full_success() {
    let config = CampaignConfig {
        seed_range: 0..1,
        faults: FaultConfig::quiet(),
        ..CampaignConfig::default()
    };
    let report = replay_seed(3, &config).expect("replay");
    assert!(report.oracle.passed, "{:?}", report.oracle.violations);
    assert_eq!(report.faults_injected, 0);
    assert!(!report.bulk_partial);
    assert!(
        !report.bulk_summary.contains("failed"),
        "quiet run should not fail: {}",
        report.bulk_summary
    );
}

#[test]
fn scenario_defaults_match_campaign_defaults() {
    let scenario = ScenarioConfig::default();
    let campaign = CampaignConfig::default().scenario_for_seed(0);
    assert_eq!(scenario, campaign);
}

proptest! {
    #![proptest_config(proptest::test_runner::Config::with_cases(16))]

    #[test]
    fn any_seed_with_any_latency_passes(
        seed in any::<u64>(),
        max_latency_ms in 5_u64..600,
    ) {
        let config = CampaignConfig {
            seed_range: seed..seed.saturating_add(1),
            faults: FaultConfig {
                min_latency_ms: 1,
                max_latency_ms,
                ..FaultConfig::default()
            },
            ..CampaignConfig::default()
        };
        let report = replay_seed(seed, &config).expect("replay");
        prop_assert!(report.oracle.passed, "seed {}: {:?}", seed, report.oracle.violations);
    }
}

#[test]
fn forced_first_step_failure_keeps_invariants() {
    let config = CampaignConfig {
        seed_range: 0..10,
        faults: FaultConfig {
            fail_mutation_at: Some(0),
            ..FaultConfig::quiet()
        },
        ..CampaignConfig::default()
    };
    let report = run_campaign(&config).expect("campaign should not error");
    assert!(report.all_passed(), "failures: {:?}", report.failures);
    assert_eq!(report.partial_bulk_seeds, 0);
}

#[test]
fn failure_after_a_committed_removal_counts_as_partial() {
    let config = CampaignConfig {
        seed_range: 0..10,
        faults: FaultConfig {
            fail_mutation_at: Some(1),
            ..FaultConfig::quiet()
        },
        ..CampaignConfig::default()
    };
    let report = run_campaign(&config).expect("campaign should not error");
    assert!(report.all_passed(), "failures: {:?}", report.failures);
    assert_eq!(report.partial_bulk_seeds, 10);

    let run = replay_seed(4, &config).expect("replay");
    assert!(run.bulk_partial, "expected a partial run: {}", run.bulk_summary);
}

#[test]
fn scenario_core_config_carries_page_size_and_settle_delay() {
    let scenario = ScenarioConfig {
        page_size: 15,
        settle_delay_ms: 120,
        ..ScenarioConfig::default()
    };
    let core = scenario.core_config().expect("valid");
    assert_eq!(core.fetch.default_page_size, 15);
    assert_eq!(core.bulk.settle_delay(), std::time::Duration::from_millis(120));

    let oversized = ScenarioConfig {
        page_size: 500,
        ..ScenarioConfig::default()
    };
    assert!(oversized.core_config().is_err());
}
