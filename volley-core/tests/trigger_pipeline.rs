use std::time::Duration;

use tokio::sync::mpsc;

use volley_core::trigger::{Distribution, Trigger, TriggerSource};

async fn count_fires(source: TriggerSource, observe_for: Duration) -> u64 {
    let (work_tx, mut work_rx) = mpsc::channel(4096);
    let (stop_tx, stop_rx) = mpsc::channel(1);
    let (_done_tx, done_rx) = mpsc::channel(4096);

    let handle = tokio::spawn(source.run(work_tx, stop_rx, done_rx));

    let counter = tokio::spawn(async move {
        let mut fired = 0u64;
        while work_rx.recv().await.is_some() {
            fired += 1;
        }
        fired
    });

    tokio::time::sleep(observe_for).await;
    stop_tx
        .send(())
        .await
        .unwrap_or_else(|err| panic!("stopping trigger: {err}"));
    handle.await.unwrap_or_else(|err| panic!("trigger task: {err}"));

    counter.await.unwrap_or_else(|err| panic!("counter task: {err}"))
}

#[tokio::test(start_paused = true)]
async fn stage_ramp_delivers_the_integrated_fire_count() {
    let trigger = Trigger::staged(
        "10s:0,10s:10",
        Duration::from_secs(1),
        Distribution::Regular,
        0.0,
    )
    .unwrap_or_else(|err| panic!("trigger: {err}"));

    assert_eq!(trigger.duration, Duration::from_secs(20));

    let fired = count_fires(trigger.source, Duration::from_secs(21)).await;

    // The ramp integrates to ~50 fires over the two stages; windowed sampling
    // loses a little at the edges.
    assert!(
        (40..=55).contains(&fired),
        "expected ~50 fires over the ramp, got {fired}"
    );
}

#[tokio::test(start_paused = true)]
async fn constant_trigger_rate_is_preserved_across_distributions() {
    for distribution in [Distribution::None, Distribution::Regular] {
        let trigger = Trigger::constant("10/1s", distribution, 0.0)
            .unwrap_or_else(|err| panic!("trigger: {err}"));
        let fired = count_fires(trigger.source, Duration::from_millis(3_050)).await;
        assert!(
            (29..=31).contains(&fired),
            "expected ~30 fires at 10/1s over 3s with {distribution:?} distribution, got {fired}"
        );
    }
}

#[tokio::test(start_paused = true)]
async fn jittered_rates_average_out_to_the_base_rate() {
    let trigger = Trigger::constant("100/1s", Distribution::None, 0.2)
        .unwrap_or_else(|err| panic!("trigger: {err}"));
    let fired = count_fires(trigger.source, Duration::from_millis(20_050)).await;

    let per_window = fired as f64 / 20.0;
    assert!(
        (90.0..=110.0).contains(&per_window),
        "jittered windows should average to ~100 fires, got {per_window}"
    );
}
