//! Aggregation behavior over realistic observation sequences: a plate
//! sitting in view for a while must yield exactly one event per cooldown
//! period, and uncorroborated plates must never confirm.

use std::time::{Duration, Instant};

use image::RgbImage;

use plate_sentinel::aggregate::{AggregatorConfig, EventAggregator};

fn aggregator() -> EventAggregator {
    EventAggregator::new(AggregatorConfig {
        confirm_threshold: 3,
        window: Duration::from_secs(5),
        cooldown: Duration::from_secs(30),
        idle_evict: Duration::from_secs(120),
    })
}

fn crop() -> RgbImage {
    RgbImage::from_pixel(24, 12, image::Rgb([180, 180, 180]))
}

#[test]
fn parked_car_yields_one_event_per_cooldown() {
    let mut agg = aggregator();
    let t0 = Instant::now();
    let crop = crop();

    // A parked car observed twice a second for a full minute.
    let mut events = Vec::new();
    for tick in 0..120u64 {
        let now = t0 + Duration::from_millis(tick * 500);
        if let Some(event) = agg
            .observe("ABC1234", tick, &crop, now)
            .expect("observe")
        {
            events.push((tick, event));
        }
    }

    // First confirmation on the third observation, then one more after the
    // 30s cooldown lapses and three fresh corroborations accumulate.
    assert_eq!(events.len(), 2, "events at ticks {:?}", events.iter().map(|(t, _)| t).collect::<Vec<_>>());
    assert_eq!(events[0].0, 2);
    assert!(events[1].0 >= 60 + 2);
    for (_, event) in &events {
        assert_eq!(event.plate_number, "ABC1234");
        assert_eq!(event.detection_count, 3);
        assert!(!event.image.is_empty());
    }
}

#[test]
fn uncorroborated_plate_never_confirms() {
    let mut agg = aggregator();
    let t0 = Instant::now();
    let crop = crop();

    // Three sightings of one plate interleaved with a single misread.
    assert!(agg.observe("ABC1234", 1, &crop, t0).expect("observe").is_none());
    assert!(agg
        .observe("XYZ9999", 2, &crop, t0 + Duration::from_millis(500))
        .expect("observe")
        .is_none());
    assert!(agg
        .observe("ABC1234", 3, &crop, t0 + Duration::from_secs(1))
        .expect("observe")
        .is_none());
    let event = agg
        .observe("ABC1234", 4, &crop, t0 + Duration::from_secs(2))
        .expect("observe")
        .expect("third corroboration confirms");

    assert_eq!(event.plate_number, "ABC1234");
    assert_eq!(event.detection_count, 3);
    // The misread contributed to the window total but never confirmed.
    assert_eq!(event.total_detections, 4);
}

#[test]
fn cooldown_survives_the_plate_leaving_view() {
    // Long cooldown, shorter idle-eviction horizon: a confirmed plate that
    // drives away and comes back mid-cooldown must stay suppressed.
    let mut agg = EventAggregator::new(AggregatorConfig {
        confirm_threshold: 3,
        window: Duration::from_secs(5),
        cooldown: Duration::from_secs(300),
        idle_evict: Duration::from_secs(120),
    });
    let t0 = Instant::now();
    let crop = crop();

    for tick in 0..3u64 {
        let now = t0 + Duration::from_secs(tick);
        let event = agg.observe("ABC1234", tick, &crop, now).expect("observe");
        assert_eq!(event.is_some(), tick == 2);
    }

    // Absent for 150s (past the idle horizon), then back in view.
    for tick in 0..5u64 {
        let now = t0 + Duration::from_secs(152 + tick);
        let event = agg
            .observe("ABC1234", 100 + tick, &crop, now)
            .expect("observe");
        assert!(
            event.is_none(),
            "re-confirmed {}s after the event, inside the 300s cooldown",
            150 + tick
        );
    }

    // Once the cooldown lapses the plate can confirm again.
    for tick in 0..3u64 {
        let now = t0 + Duration::from_secs(310 + tick);
        let event = agg
            .observe("ABC1234", 200 + tick, &crop, now)
            .expect("observe");
        assert_eq!(event.is_some(), tick == 2);
    }
}

#[test]
fn sparse_sightings_never_accumulate_across_windows() {
    let mut agg = aggregator();
    let t0 = Instant::now();
    let crop = crop();

    // One sighting every 6 seconds; each lands in a fresh window.
    for tick in 0..20u64 {
        let now = t0 + Duration::from_secs(tick * 6);
        let event = agg.observe("ABC1234", tick, &crop, now).expect("observe");
        assert!(event.is_none(), "sparse sighting {} must not confirm", tick);
    }
}
