//! Many reporters and viewers sharing one service across tokio tasks

use crate::{ProximityEvent, SightingConfig, SightingId, SightingService};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeSet;

fn replay(events: &[ProximityEvent]) -> BTreeSet<SightingId> {
    let mut members = BTreeSet::new();
    for event in events {
        match event {
            ProximityEvent::Entered { id, .. } => {
                assert!(members.insert(*id), "{id} entered twice without leaving");
            }
            ProximityEvent::Left { id } => {
                assert!(members.remove(id), "{id} left without entering");
            }
        }
    }
    members
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_reporters_enter_exactly_once() {
    let service = SightingService::new();
    let view = service.subscribe(51.5, -0.12, 3_000.0).await.unwrap();

    let mut tasks = Vec::new();
    for worker in 0..8u32 {
        let service = service.clone();
        tasks.push(tokio::spawn(async move {
            let mut inside = Vec::new();
            for i in 0..50u32 {
                // alternate between inside the view and another city
                let (lat, lon) = if i % 2 == 0 { (51.5, -0.12) } else { (48.85, 2.35) };
                let id = service.report_sighting(worker * 100 + i, lat, lon).await.unwrap();
                if i % 2 == 0 {
                    inside.push(id);
                }
            }
            inside
        }));
    }

    let mut expected = BTreeSet::new();
    for task in tasks {
        expected.extend(task.await.unwrap());
    }

    let events = view.drain_events().await;
    assert_eq!(events.len(), expected.len());
    assert!(events.iter().all(|e| e.is_entered()));
    assert_eq!(replay(&events), expected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn view_opened_mid_stream_misses_and_doubles_nothing() {
    let service = SightingService::new();

    let writer = {
        let service = service.clone();
        tokio::spawn(async move {
            let mut ids = Vec::new();
            for i in 0..200u32 {
                ids.push(service.report_sighting(i % 151 + 1, 0.0, 0.0).await.unwrap());
                tokio::task::yield_now().await;
            }
            ids
        })
    };

    tokio::task::yield_now().await;
    let view = service.subscribe(0.0, 0.0, 1_000.0).await.unwrap();
    let all: BTreeSet<_> = writer.await.unwrap().into_iter().collect();

    let events = view.drain_events().await;
    assert_eq!(replay(&events), all);
    assert_eq!(view.members().await, all);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn slow_viewer_converges_under_random_churn() {
    let mut config = SightingConfig::default();
    config.subscription.queue_capacity = 16;
    let service = SightingService::from_config(&config).unwrap();
    let view = service.subscribe(0.0, 0.0, 20_000.0).await.unwrap();

    let mut rng = StdRng::seed_from_u64(151);
    let mut ids = Vec::new();
    for _ in 0..40 {
        let lat = rng.gen_range(-0.5..0.5);
        let lon = rng.gen_range(-0.5..0.5);
        ids.push(service.report_sighting(rng.gen_range(1..=151), lat, lon).await.unwrap());
    }
    for _ in 0..500 {
        let id = ids[rng.gen_range(0..ids.len())];
        let lat = rng.gen_range(-0.5..0.5);
        let lon = rng.gen_range(-0.5..0.5);
        service.update_sighting(id, lat, lon).await.unwrap();
    }

    let events = view.drain_events().await;
    assert!(view.stats().await.coalesced > 0);

    let truth: BTreeSet<_> = service
        .sightings_near(0.0, 0.0, 20_000.0, None)
        .await
        .unwrap()
        .into_iter()
        .map(|n| n.sighting.id)
        .collect();
    assert_eq!(replay(&events), truth);
}
