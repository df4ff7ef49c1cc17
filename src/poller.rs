//! Polling engine - turns "take one measurement" into a cancellable stream
//!
//! Each started sensor owns one tokio task. Every tick of the configured
//! interval produces exactly one `Result` on the stream: the averaged
//! readings of the cycle, or the error that aborted it. Errors never end
//! the loop; only [`StopHandle::stop`] (or dropping the stream) does.
//!
//! ```ignore
//! let sensor = Ds18b20::new(onewire, Location::outdoor(), PollingConfig::new(interval, oversample)?)?;
//! let mut readings = sensor.start();
//! while let Some(cycle) = readings.next().await {
//!     match cycle {
//!         Ok(readings) => store(readings),
//!         Err(e) => tracing::warn!("cycle failed: {}", e),
//!     }
//! }
//! ```

use crate::error::{ConfigError, DecodeError, SensorError};
use crate::reading::{Location, Measurement, Reading};
use crate::shared::format_interval;
use futures::Stream;
use std::future::Future;
use std::num::NonZeroU32;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};

/// Result of one polling cycle.
pub type CycleResult = Result<Vec<Reading>, SensorError>;

// === Configuration ===

/// How many raw samples are averaged into one published reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Oversample {
    #[default]
    SingleShot,
    Iterations(NonZeroU32),
}

impl Oversample {
    pub fn iterations(count: u32) -> Result<Self, ConfigError> {
        NonZeroU32::new(count)
            .map(Oversample::Iterations)
            .ok_or(ConfigError::ZeroIterations)
    }

    /// Number of raw samples taken per cycle.
    pub fn count(&self) -> u32 {
        match self {
            Oversample::SingleShot => 1,
            Oversample::Iterations(n) => n.get(),
        }
    }
}

/// Cadence and oversampling for one sensor.
///
/// Checked against the device's conversion time when the sensor is built;
/// immutable afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollingConfig {
    min_update_interval: Duration,
    oversample: Oversample,
}

impl PollingConfig {
    pub fn new(min_update_interval: Duration, oversample: Oversample) -> Self {
        Self {
            min_update_interval,
            oversample,
        }
    }

    pub fn single_shot(min_update_interval: Duration) -> Self {
        Self::new(min_update_interval, Oversample::SingleShot)
    }

    pub fn min_update_interval(&self) -> Duration {
        self.min_update_interval
    }

    pub fn oversample(&self) -> Oversample {
        self.oversample
    }

    /// Shortest interval that fits every sample of a cycle.
    pub fn required_interval(&self, conversion_time: Duration) -> Duration {
        conversion_time.saturating_mul(self.oversample.count())
    }

    pub fn validate(&self, conversion_time: Duration) -> Result<(), ConfigError> {
        if self.min_update_interval.is_zero() {
            return Err(ConfigError::InvalidInterval);
        }
        let required = self.required_interval(conversion_time);
        if self.min_update_interval < required {
            return Err(ConfigError::IntervalTooShort {
                requested: self.min_update_interval,
                required,
                samples: self.oversample.count(),
            });
        }
        Ok(())
    }
}

// === Sensor contract ===

/// A constructed, validated sensor that can take one sample on demand.
pub trait Sensor: Send + 'static {
    /// Identity of the physical device, e.g. `BME280-ID118`.
    fn source_id(&self) -> &str;

    fn location(&self) -> &Location;

    fn polling(&self) -> &PollingConfig;

    /// Worst-case time for one device conversion.
    fn conversion_time(&self) -> Duration;

    /// Acquire and decode one raw sample.
    fn sample(&mut self) -> impl Future<Output = Result<Vec<Measurement>, SensorError>> + Send;

    /// Spawn the polling task and hand back its stream.
    ///
    /// Consumes the sensor: a stopped stream cannot be restarted.
    fn start(self) -> ReadingStream
    where
        Self: Sized,
    {
        ReadingStream::spawn(self)
    }
}

/// Run one full cycle: `count` samples, averaged, stamped as readings.
///
/// The first failing sample aborts the cycle; there is no partial average.
pub async fn acquire<S: Sensor>(sensor: &mut S) -> CycleResult {
    let count = sensor.polling().oversample().count();
    let spacing = sensor.conversion_time();

    let mut totals: Vec<Measurement> = Vec::new();
    let mut next_start = Instant::now();
    for iteration in 0..count {
        tokio::time::sleep_until(next_start).await;
        next_start = Instant::now() + spacing;

        let sample = sensor.sample().await?;
        accumulate(&mut totals, sample, iteration == 0)?;
    }

    let timestamp = chrono::Utc::now();
    let divisor = f64::from(count);
    Ok(totals
        .into_iter()
        .map(|total| {
            let mean = Measurement::new(total.quantity, total.value / divisor);
            Reading::new(mean, sensor.location().clone(), sensor.source_id(), timestamp)
        })
        .collect())
}

fn accumulate(
    totals: &mut Vec<Measurement>,
    sample: Vec<Measurement>,
    first: bool,
) -> Result<(), DecodeError> {
    if sample.is_empty() {
        return Err(DecodeError::EmptySample);
    }
    if first {
        *totals = sample;
        return Ok(());
    }
    if sample.len() != totals.len() {
        return Err(DecodeError::InconsistentSamples {
            index: totals.len().min(sample.len()),
        });
    }
    for (index, (total, measured)) in totals.iter_mut().zip(sample).enumerate() {
        if total.quantity != measured.quantity {
            return Err(DecodeError::InconsistentSamples { index });
        }
        total.value += measured.value;
    }
    Ok(())
}

// === Stream ===

/// Stops a polling task. Cloneable and idempotent.
#[derive(Debug, Clone)]
pub struct StopHandle {
    signal: Arc<watch::Sender<bool>>,
}

impl StopHandle {
    /// No new cycle starts after this; an in-flight cycle finishes and its
    /// result is discarded.
    pub fn stop(&self) {
        self.signal.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.signal.borrow()
    }
}

/// The continuous output of one sensor.
///
/// Once stopped it yields nothing more and ends when the polling task has
/// exited, so draining it after [`StopHandle::stop`] waits for any in-flight
/// bus transaction to finish.
#[derive(Debug)]
pub struct ReadingStream {
    source_id: String,
    receiver: mpsc::Receiver<CycleResult>,
    stop: StopHandle,
}

impl ReadingStream {
    fn spawn<S: Sensor>(sensor: S) -> Self {
        let (tx, receiver) = mpsc::channel(1);
        let (signal, stopped) = watch::channel(false);
        let source_id = sensor.source_id().to_string();

        tokio::spawn(run_polling_loop(sensor, tx, stopped));

        Self {
            source_id,
            receiver,
            stop: StopHandle {
                signal: Arc::new(signal),
            },
        }
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Next cycle result, or `None` once stopped and the task has exited.
    pub async fn next(&mut self) -> Option<CycleResult> {
        futures::StreamExt::next(self).await
    }

    /// Stop polling and wait for the task to exit.
    pub async fn shutdown(mut self) {
        self.stop.stop();
        while self.next().await.is_some() {}
    }
}

impl Stream for ReadingStream {
    type Item = CycleResult;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if !self.stop.is_stopped() {
            return self.receiver.poll_recv(cx);
        }
        // Discard anything produced before the stop was observed.
        loop {
            match self.receiver.poll_recv(cx) {
                Poll::Ready(Some(_)) => continue,
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

impl Drop for ReadingStream {
    fn drop(&mut self) {
        self.stop.stop();
    }
}

async fn run_polling_loop<S: Sensor>(
    mut sensor: S,
    tx: mpsc::Sender<CycleResult>,
    mut stopped: watch::Receiver<bool>,
) {
    let interval = sensor.polling().min_update_interval();
    tracing::info!(
        "Polling {} every {} ({} sample(s) per reading)",
        sensor.source_id(),
        format_interval(interval),
        sensor.polling().oversample().count()
    );

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = stop_requested(&mut stopped) => break,
            _ = ticker.tick() => {}
        }

        let result = acquire(&mut sensor).await;
        if let Err(e) = &result {
            tracing::debug!("{} cycle failed: {}", sensor.source_id(), e);
        }

        tokio::select! {
            biased;
            _ = stop_requested(&mut stopped) => break,
            sent = tx.send(result) => {
                if sent.is_err() {
                    break;
                }
            }
        }
    }

    tracing::info!("Stopped polling {}", sensor.source_id());
}

/// Resolves once a stop is signalled or every [`StopHandle`] is gone.
async fn stop_requested(stopped: &mut watch::Receiver<bool>) {
    let _ = stopped.wait_for(|stop| *stop).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BusError;
    use crate::reading::Quantity;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const CONVERSION: Duration = Duration::from_millis(750);

    /// Replays scripted samples (repeating the last one) and counts calls.
    struct ScriptedSensor {
        location: Location,
        polling: PollingConfig,
        script: VecDeque<Result<Vec<Measurement>, ()>>,
        last: Result<Vec<Measurement>, ()>,
        samples: Arc<AtomicUsize>,
        started: Arc<std::sync::Mutex<Vec<Instant>>>,
    }

    impl ScriptedSensor {
        fn new(polling: PollingConfig, script: Vec<Result<Vec<Measurement>, ()>>) -> Self {
            Self {
                location: Location::outdoor(),
                polling,
                script: script.into(),
                last: Ok(vec![Measurement::celsius(21.75)]),
                samples: Arc::new(AtomicUsize::new(0)),
                started: Arc::new(std::sync::Mutex::new(Vec::new())),
            }
        }
    }

    impl Sensor for ScriptedSensor {
        fn source_id(&self) -> &str {
            "TEST-ID1"
        }

        fn location(&self) -> &Location {
            &self.location
        }

        fn polling(&self) -> &PollingConfig {
            &self.polling
        }

        fn conversion_time(&self) -> Duration {
            CONVERSION
        }

        async fn sample(&mut self) -> Result<Vec<Measurement>, SensorError> {
            self.samples.fetch_add(1, Ordering::SeqCst);
            self.started.lock().unwrap().push(Instant::now());
            if let Some(next) = self.script.pop_front() {
                self.last = next;
            }
            self.last.clone().map_err(|()| {
                SensorError::from(BusError::I2c {
                    address: 0x76,
                    message: "no acknowledge".to_string(),
                })
            })
        }
    }

    fn assert_near(actual: Duration, expected: Duration) {
        let slack = Duration::from_millis(5);
        assert!(
            actual + slack >= expected && actual <= expected + slack,
            "{:?} is not within {:?} of {:?}",
            actual,
            slack,
            expected
        );
    }

    fn every(secs: u64) -> PollingConfig {
        PollingConfig::single_shot(Duration::from_secs(secs))
    }

    #[test]
    fn test_validate_interval_against_conversion_time() {
        let sixteen = Oversample::iterations(16).unwrap();
        let exact = PollingConfig::new(Duration::from_millis(12_000), sixteen);
        assert_eq!(exact.validate(CONVERSION), Ok(()));

        let short = PollingConfig::new(Duration::from_millis(11_999), sixteen);
        assert_eq!(
            short.validate(CONVERSION),
            Err(ConfigError::IntervalTooShort {
                requested: Duration::from_millis(11_999),
                required: Duration::from_secs(12),
                samples: 16,
            })
        );

        assert_eq!(
            PollingConfig::single_shot(Duration::ZERO).validate(Duration::ZERO),
            Err(ConfigError::InvalidInterval)
        );
        assert_eq!(Oversample::iterations(0), Err(ConfigError::ZeroIterations));
    }

    #[tokio::test(start_paused = true)]
    async fn test_emits_one_result_per_tick_and_survives_failures() {
        let sensor = ScriptedSensor::new(
            every(60),
            vec![
                Ok(vec![Measurement::celsius(20.0)]),
                Err(()),
                Ok(vec![Measurement::celsius(22.0)]),
            ],
        );
        let started = Arc::clone(&sensor.started);
        let mut stream = sensor.start();

        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first[0].value(), 20.0);
        assert_eq!(first[0].source_id(), "TEST-ID1");

        let second = stream.next().await.unwrap();
        assert!(matches!(second, Err(SensorError::Communication(_))));

        let third = stream.next().await.unwrap().unwrap();
        assert_eq!(third[0].value(), 22.0);

        // A failure does not shorten the cadence.
        let started = started.lock().unwrap().clone();
        assert_near(started[1] - started[0], Duration::from_secs(60));
        assert_near(started[2] - started[1], Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_oversampled_identical_samples_average_to_single_value() {
        let value = 1006.5325390625;
        for n in [1u32, 2, 16] {
            let polling = PollingConfig::new(Duration::from_secs(60), Oversample::iterations(n).unwrap());
            let mut sensor = ScriptedSensor::new(polling, vec![]);
            sensor.last = Ok(vec![Measurement::hectopascal(value), Measurement::celsius(21.75)]);

            let readings = acquire(&mut sensor).await.unwrap();
            assert_eq!(sensor.samples.load(Ordering::SeqCst), n as usize);
            assert!((readings[0].value() - value).abs() < 1e-9, "n = {}", n);
            assert_eq!(readings[0].quantity(), Quantity::HECTOPASCAL);
            assert_eq!(readings[1].value(), 21.75);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_oversampling_averages_and_spaces_samples() {
        let polling = PollingConfig::new(Duration::from_secs(60), Oversample::iterations(4).unwrap());
        let mut sensor = ScriptedSensor::new(
            polling,
            vec![
                Ok(vec![Measurement::celsius(20.0)]),
                Ok(vec![Measurement::celsius(21.0)]),
                Ok(vec![Measurement::celsius(22.0)]),
                Ok(vec![Measurement::celsius(23.0)]),
            ],
        );

        let readings = acquire(&mut sensor).await.unwrap();
        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].value(), 21.5);

        let started = sensor.started.lock().unwrap().clone();
        for pair in started.windows(2) {
            assert!(pair[1] - pair[0] >= CONVERSION);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_sample_aborts_oversampled_cycle() {
        let polling = PollingConfig::new(Duration::from_secs(60), Oversample::iterations(4).unwrap());
        let mut sensor = ScriptedSensor::new(
            polling,
            vec![Ok(vec![Measurement::celsius(20.0)]), Err(())],
        );

        let result = acquire(&mut sensor).await;
        assert!(matches!(result, Err(SensorError::Communication(_))));
        assert_eq!(sensor.samples.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_inconsistent_samples_are_a_decode_error() {
        let polling = PollingConfig::new(Duration::from_secs(60), Oversample::iterations(2).unwrap());
        let mut sensor = ScriptedSensor::new(
            polling,
            vec![
                Ok(vec![Measurement::celsius(20.0)]),
                Ok(vec![Measurement::relative_humidity(40.0)]),
            ],
        );

        let result = acquire(&mut sensor).await;
        assert!(matches!(
            result,
            Err(SensorError::Decode(DecodeError::InconsistentSamples { index: 0 }))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_ends_stream_without_further_samples() {
        let sensor = ScriptedSensor::new(every(10), vec![]);
        let samples = Arc::clone(&sensor.samples);
        let mut stream = sensor.start();
        let handle = stream.stop_handle();

        for _ in 0..3 {
            assert!(stream.next().await.unwrap().is_ok());
        }
        handle.stop();
        assert!(stream.next().await.is_none());

        let taken = samples.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(samples.load(Ordering::SeqCst), taken);
        assert!(taken <= 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_stream_stops_polling() {
        let sensor = ScriptedSensor::new(every(10), vec![]);
        let samples = Arc::clone(&sensor.samples);
        let mut stream = sensor.start();

        assert!(stream.next().await.unwrap().is_ok());
        drop(stream);

        tokio::time::sleep(Duration::from_secs(1)).await;
        let taken = samples.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(samples.load(Ordering::SeqCst), taken);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_waits_for_task_exit() {
        let sensor = ScriptedSensor::new(every(10), vec![]);
        let mut stream = sensor.start();
        let handle = stream.stop_handle();

        assert!(stream.next().await.is_some());
        stream.shutdown().await;
        assert!(handle.is_stopped());
    }
}
