//! SensorSource trait - periodic reading producer abstraction
//!
//! Decouples the runners that generate samples from whoever consumes them.

use std::sync::Arc;

use crate::{Reading, SensorId, SensorSample};

/// Per-sensor sample callback
///
/// Invoked from the sensor's own task on every tick. Uses `Arc` so a device can
/// share one relay closure across all its sensors.
pub type SampleCallback = Arc<dyn Fn(SensorSample) + Send + Sync>;

/// Stamped reading callback, the device → container relay
pub type ReadingCallback = Arc<dyn Fn(Reading) + Send + Sync>;

/// Periodic sample source
///
/// # Example
///
/// ```ignore
/// let source: Arc<dyn SensorSource> = runner;
/// let started = source.listen(Arc::new(|sample| {
///     println!("{} -> {:?}", sample.sensor_id, sample.value);
/// }));
/// // ...
/// source.stop();
/// ```
pub trait SensorSource: Send + Sync {
    /// Sensor ID
    fn sensor_id(&self) -> SensorId;

    /// Start ticking and deliver every sample to `callback`
    ///
    /// Returns false when the source is already listening or otherwise busy;
    /// the source keeps its current callback in that case.
    fn listen(&self, callback: SampleCallback) -> bool;

    /// Request stop
    ///
    /// Fire-and-forget: at most one in-flight tick may still complete.
    fn stop(&self);

    /// Check if currently listening
    fn is_listening(&self) -> bool;
}
