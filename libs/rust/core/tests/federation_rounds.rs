use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use chrono::{DateTime, Duration, TimeZone, Utc};
use medfed_core::{
    AggregationMethod, CompletionPolicy, InMemoryRegistry, InMemoryStore, LayerShape, ModelShape,
    ParticipantId, RoundCoordinator, RoundId, RoundOutcome, TrainingMetrics, WeightContribution,
};

fn shape() -> ModelShape {
    ModelShape {
        layers: vec![LayerShape { rows: 1, cols: 4 }],
        intercept_len: 1,
    }
}

fn contribution(
    id: ParticipantId,
    round: RoundId,
    value: f64,
    sample_count: u64,
) -> WeightContribution {
    WeightContribution {
        participant_id: id,
        round,
        coefficients: vec![vec![vec![value; 4]; 1]],
        intercept: vec![value],
        sample_count,
        submitted_at: Utc::now(),
        metrics: TrainingMetrics {
            accuracy: 0.85,
            loss: 0.35,
        },
    }
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap()
}

fn setup(
    participants: usize,
) -> (Arc<InMemoryStore>, Arc<RoundCoordinator>, Vec<ParticipantId>) {
    let registry = Arc::new(InMemoryRegistry::new());
    let ids: Vec<ParticipantId> = (0..participants)
        .map(|i| registry.register(&format!("hospital-{i}"), t0()))
        .collect();
    let store = Arc::new(InMemoryStore::new());
    let coordinator = Arc::new(
        RoundCoordinator::new(registry, store.clone(), AggregationMethod::FedAvg, shape())
            .unwrap(),
    );
    (store, coordinator, ids)
}

#[test]
fn concurrent_submissions_are_not_lost() {
    let (_, coordinator, ids) = setup(8);
    coordinator
        .start_round(CompletionPolicy::WaitForAll, t0())
        .unwrap();

    let mut handles = Vec::new();
    for (i, id) in ids.iter().copied().enumerate() {
        let coordinator = coordinator.clone();
        handles.push(thread::spawn(move || {
            coordinator
                .submit_contribution(contribution(id, 1, i as f64, 10))
                .unwrap();
        }));
    }
    // Racing close checks must never fire before the last submission
    // and must never observe a half-recorded one.
    let closer = {
        let coordinator = coordinator.clone();
        thread::spawn(move || {
            let mut resolved = false;
            for _ in 0..10_000 {
                if coordinator.try_close_round(t0()).unwrap() {
                    resolved = true;
                    break;
                }
                thread::yield_now();
            }
            resolved
        })
    };
    for h in handles {
        h.join().unwrap();
    }
    let resolved = closer.join().unwrap() || coordinator.try_close_round(t0()).unwrap();
    assert!(resolved);

    let model = coordinator.get_latest_model().unwrap();
    assert_eq!(model.contributor_count, 8);
    assert_eq!(model.total_samples, 80);
    // Equal sample counts: plain mean of 0..=7.
    assert!((model.intercept[0] - 3.5).abs() < 1e-12);
}

#[test]
fn racing_closers_keep_history_monotone() {
    // Two close checks race a steady submitter across many cycles; an
    // earlier round finishing its aggregation late must never land
    // after a newer round in the published history.
    let (_, coordinator, ids) = setup(1);
    coordinator
        .start_round(CompletionPolicy::WaitForAll, t0())
        .unwrap();

    let target = 20usize;
    let done = Arc::new(AtomicBool::new(false));

    let submitter = {
        let coordinator = coordinator.clone();
        let done = done.clone();
        let id = ids[0];
        thread::spawn(move || {
            while !done.load(Ordering::Relaxed) {
                if let Some(round) = coordinator.current_round() {
                    // The round can resolve between the read and the
                    // submit; those rejections are expected.
                    let _ = coordinator.submit_contribution(contribution(id, round, 0.5, 10));
                }
                thread::yield_now();
            }
        })
    };
    let closers: Vec<_> = (0..2)
        .map(|_| {
            let coordinator = coordinator.clone();
            let done = done.clone();
            thread::spawn(move || {
                while !done.load(Ordering::Relaxed) {
                    coordinator.try_close_round(t0()).unwrap();
                    if coordinator.published_history().len() >= target {
                        done.store(true, Ordering::Relaxed);
                    }
                    thread::yield_now();
                }
            })
        })
        .collect();

    submitter.join().unwrap();
    for closer in closers {
        closer.join().unwrap();
    }

    let history = coordinator.published_history();
    assert!(history.len() >= target);
    assert!(history.windows(2).all(|w| w[0].round < w[1].round));
    assert_eq!(
        coordinator.get_latest_model().unwrap().round,
        history.last().unwrap().round
    );
}

#[test]
fn quorum_round_resolves_and_next_cycle_continues() {
    let (store, coordinator, ids) = setup(4);
    let policy = CompletionPolicy::QuorumOrTimeout {
        quorum: 0.5,
        timeout: Duration::minutes(30),
    };
    coordinator.start_round(policy, t0()).unwrap();
    coordinator
        .submit_contribution(contribution(ids[0], 1, 0.0, 90))
        .unwrap();
    coordinator
        .submit_contribution(contribution(ids[1], 1, 1.0, 10))
        .unwrap();

    // Deadline not reached yet.
    assert!(!coordinator
        .try_close_round(t0() + Duration::minutes(29))
        .unwrap());
    // Deadline elapsed: quorum of 2/4 resolves the round.
    let close_at = t0() + Duration::minutes(31);
    assert!(coordinator.try_close_round(close_at).unwrap());

    let model = coordinator.get_latest_model().unwrap();
    assert_eq!(model.round, 1);
    assert_eq!(model.contributor_count, 2);
    assert!((model.intercept[0] - 0.10).abs() < 1e-12);

    // Round 2 opened at close time with the same policy; late and new
    // submissions land there.
    coordinator
        .submit_contribution(contribution(ids[2], 2, 0.5, 50))
        .unwrap();
    coordinator
        .submit_contribution(contribution(ids[3], 2, 0.5, 50))
        .unwrap();
    assert!(coordinator
        .try_close_round(close_at + Duration::minutes(31))
        .unwrap());
    assert_eq!(coordinator.published_history().len(), 2);
    assert_eq!(store.models().len(), 2);

    let archives = store.rounds();
    assert_eq!(archives.len(), 2);
    assert!(matches!(archives[0].outcome, RoundOutcome::Published(_)));
    assert_eq!(archives[1].round, 2);
}

#[test]
fn serialized_history_round_trips_exact_doubles() {
    let (store, coordinator, ids) = setup(2);
    coordinator
        .start_round(CompletionPolicy::WaitForAll, t0())
        .unwrap();
    // Values with no short decimal representation.
    coordinator
        .submit_contribution(contribution(ids[0], 1, 1.0 / 3.0, 7))
        .unwrap();
    coordinator
        .submit_contribution(contribution(ids[1], 1, 2.0 / 7.0, 11))
        .unwrap();
    assert!(coordinator.try_close_round(t0()).unwrap());

    let model = &store.models()[0];
    let json = serde_json::to_string(model).unwrap();
    let back: medfed_core::AggregatedModel = serde_json::from_str(&json).unwrap();
    assert_eq!(back.coefficients, model.coefficients);
    assert_eq!(back.intercept, model.intercept);
    assert_eq!(back.total_samples, model.total_samples);
}
