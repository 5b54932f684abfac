//! Move queue and consumer tests: ordering, dwell and failure recovery

use std::time::Duration;

use smart_can::config::{MotionConfig, PedalConfig};
use smart_can::hal::{MockGpio, SimulatedShaft};
use smart_can::queue::{move_queue, MoveConsumer, MoveQueue};
use smart_can::services::HardwareEventBridge;
use smart_can::traits::Edge;
use smart_can::{
    CommandSource, ControlError, LidController, MotorController, MotorPins, MoveOutcome,
};
use tokio::sync::mpsc;

const TOP: MotorPins = MotorPins::new(3, 4);
const BOTTOM: MotorPins = MotorPins::new(27, 22);
const DWELL: Duration = Duration::from_secs(10);

type SimConsumer = MoveConsumer<SimulatedShaft, SimulatedShaft>;

fn consumer_with(
    top: SimulatedShaft,
    bottom: SimulatedShaft,
    motion: MotionConfig,
) -> (SimConsumer, MoveQueue, mpsc::UnboundedReceiver<MoveOutcome>) {
    let lid = LidController::new(
        MotorController::new("top", top.clone(), top, TOP, 3)
            .unwrap()
            .with_motion(motion),
        MotorController::new("bottom", bottom.clone(), bottom, BOTTOM, 3)
            .unwrap()
            .with_motion(motion),
    )
    .unwrap();
    let (queue, receiver) = move_queue();
    let (reports_tx, reports) = mpsc::unbounded_channel();
    let consumer = MoveConsumer::new(lid, receiver)
        .with_dwell(DWELL)
        .with_reports(reports_tx);
    (consumer, queue, reports)
}

fn consumer() -> (SimConsumer, MoveQueue, mpsc::UnboundedReceiver<MoveOutcome>) {
    consumer_with(
        SimulatedShaft::new(TOP),
        SimulatedShaft::new(BOTTOM),
        MotionConfig::default(),
    )
}

fn drain(reports: &mut mpsc::UnboundedReceiver<MoveOutcome>) -> Vec<MoveOutcome> {
    std::iter::from_fn(|| reports.try_recv().ok()).collect()
}

// ============================================================================
// Ordering
// ============================================================================

#[tokio::test(start_paused = true)]
async fn requests_are_served_in_order_one_at_a_time() {
    let (mut consumer, queue, mut reports) = consumer();
    queue.push(1, CommandSource::Remote).unwrap();
    queue.push(2, CommandSource::Pedal).unwrap();
    drop(queue);

    consumer.run().await;

    let outcomes = drain(&mut reports);
    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0].request.bin, 1);
    assert_eq!(outcomes[1].request.bin, 2);
    assert_eq!(outcomes[1].request.source, CommandSource::Pedal);
    assert!(outcomes.iter().all(MoveOutcome::is_success));
    // open(1) and its close finish before open(2) starts
    assert!(outcomes[0].finished_at <= outcomes[1].started_at);

    assert_eq!(consumer.lid().top().current_bin(), 2);
    assert_eq!(consumer.lid().bottom().current_bin(), 1);
}

#[tokio::test(start_paused = true)]
async fn lid_stays_open_for_the_dwell() {
    let (mut consumer, queue, mut reports) = consumer();
    queue.push(1, CommandSource::Remote).unwrap();
    drop(queue);

    consumer.run().await;

    let outcome = &drain(&mut reports)[0];
    assert!(outcome.finished_at - outcome.started_at >= DWELL);
}

#[tokio::test(start_paused = true)]
async fn producer_pushes_while_consumer_runs() {
    let (mut consumer, queue, mut reports) = consumer();
    let producer = async move {
        queue.push(2, CommandSource::Remote).unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        // mid-dwell of the first request
        queue.push(0, CommandSource::Pedal).unwrap();
    };

    tokio::join!(consumer.run(), producer);

    let bins: Vec<u8> = drain(&mut reports).iter().map(|o| o.request.bin).collect();
    assert_eq!(bins, vec![2, 0]);
}

// ============================================================================
// Failure recovery
// ============================================================================

#[tokio::test(start_paused = true)]
async fn bad_bin_still_closes_and_next_request_runs() {
    let (mut consumer, queue, mut reports) = consumer();
    queue.push(1, CommandSource::Remote).unwrap();
    queue.push(9, CommandSource::Remote).unwrap();
    queue.push(2, CommandSource::Remote).unwrap();
    drop(queue);

    consumer.run().await;

    let outcomes = drain(&mut reports);
    assert_eq!(outcomes.len(), 3);

    let failed = &outcomes[1];
    assert_eq!(
        failed.open,
        Err(ControlError::BinOutOfRange { bin: 9, num_bins: 3 })
    );
    assert_eq!(failed.close, Ok(()));
    // no dwell after a failed open
    assert!(failed.finished_at - failed.started_at < DWELL);

    assert!(outcomes[2].is_success());
    assert_eq!(consumer.lid().top().current_bin(), 2);
}

#[tokio::test(start_paused = true)]
async fn jammed_open_is_followed_by_close() {
    let top = SimulatedShaft::new(TOP)
        .with_angle(350.0)
        .with_jam_at(355.0);
    let bottom = SimulatedShaft::new(BOTTOM);
    let motion = MotionConfig::default().with_max_move_ms(4_000);
    let (mut consumer, queue, mut reports) = consumer_with(top, bottom.clone(), motion);
    queue.push(1, CommandSource::Remote).unwrap();
    queue.push(2, CommandSource::Remote).unwrap();
    drop(queue);

    consumer.run().await;

    let outcomes = drain(&mut reports);
    assert_eq!(outcomes.len(), 2);
    assert_eq!(
        outcomes[0].open,
        Err(ControlError::MoveTimeout(Duration::from_secs(4)))
    );
    // top never reached bin 1, so close puts the bottom one behind bin 0
    assert_eq!(outcomes[0].close, Ok(()));
    assert_eq!(consumer.lid().bottom().current_bin(), 2);
    assert_eq!(outcomes[1].request.bin, 2);
}

// ============================================================================
// Pedals end to end
// ============================================================================

#[tokio::test(start_paused = true)]
async fn pedal_press_opens_its_bin() {
    let gpio = MockGpio::new();
    let (mut consumer, queue, mut reports) = consumer();
    let mut bridge = HardwareEventBridge::from_config(&PedalConfig::default(), queue);
    bridge.attach(&gpio, 1000).unwrap();

    gpio.trigger(16, Edge::Rising, 0);
    gpio.trigger(16, Edge::Rising, 10);
    assert_eq!(bridge.process_pending(), 1);
    drop(bridge);

    consumer.run().await;

    let outcomes = drain(&mut reports);
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].request.bin, 2);
    assert_eq!(outcomes[0].request.source, CommandSource::Pedal);
    assert!(outcomes[0].is_success());
}
