//! SinkHandle - runs a sink behind an isolated queue and worker task
//!
//! Sensor callbacks never await the transport: they push into a bounded
//! queue and the worker publishes. A slow or failing sink only drops its own
//! readings.

use std::sync::Arc;
use std::time::Instant;

use contracts::{Ack, Reading, TelemetrySink};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument, trace, warn};

use crate::metrics::SinkMetrics;

/// Handle to a running sink worker
pub struct SinkHandle {
    name: String,
    tx: mpsc::Sender<Reading>,
    metrics: Arc<SinkMetrics>,
    worker_handle: JoinHandle<()>,
}

impl SinkHandle {
    /// Spawn the worker task for `sink`
    pub fn spawn<S: TelemetrySink + Send + 'static>(sink: S, queue_capacity: usize) -> Self {
        let name = sink.name().to_string();
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let metrics = Arc::new(SinkMetrics::new());

        let worker_metrics = Arc::clone(&metrics);
        let worker_name = name.clone();
        let worker_handle = tokio::spawn(async move {
            sink_worker(sink, rx, worker_metrics, worker_name).await;
        });

        Self {
            name,
            tx,
            metrics,
            worker_handle,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metrics(&self) -> &Arc<SinkMetrics> {
        &self.metrics
    }

    /// Enqueue a reading (non-blocking)
    ///
    /// Returns false if the queue is full or the worker is gone.
    pub fn try_send(&self, reading: Reading) -> bool {
        enqueue(&self.name, &self.tx, &self.metrics, reading)
    }

    /// Cheap sender for reading callbacks
    ///
    /// Holds only a weak reference to the queue so stray callbacks cannot
    /// keep the worker alive after [`shutdown`](Self::shutdown).
    pub fn forwarder(&self) -> SinkForwarder {
        SinkForwarder {
            name: Arc::from(self.name.as_str()),
            tx: self.tx.downgrade(),
            metrics: Arc::clone(&self.metrics),
        }
    }

    /// Drain the queue, close the sink and wait for the worker
    #[instrument(name = "sink_handle_shutdown", skip(self), fields(sink = %self.name))]
    pub async fn shutdown(self) {
        drop(self.tx);
        if let Err(e) = self.worker_handle.await {
            error!(sink = %self.name, error = ?e, "Worker task panicked");
        }
        debug!(sink = %self.name, "SinkHandle shutdown complete");
    }
}

/// Weak, cloneable enqueue side of a [`SinkHandle`]
#[derive(Clone)]
pub struct SinkForwarder {
    name: Arc<str>,
    tx: mpsc::WeakSender<Reading>,
    metrics: Arc<SinkMetrics>,
}

impl SinkForwarder {
    /// Enqueue a reading; false once the handle has shut down
    pub fn send(&self, reading: Reading) -> bool {
        match self.tx.upgrade() {
            Some(tx) => enqueue(&self.name, &tx, &self.metrics, reading),
            None => {
                trace!(sink = %self.name, sensor_id = reading.sensor_id, "sink closed, reading dropped");
                false
            }
        }
    }
}

fn enqueue(name: &str, tx: &mpsc::Sender<Reading>, metrics: &SinkMetrics, reading: Reading) -> bool {
    match tx.try_send(reading) {
        Ok(()) => {
            metrics.set_queue_len(tx.max_capacity() - tx.capacity());
            true
        }
        Err(mpsc::error::TrySendError::Full(r)) => {
            metrics.inc_dropped();
            observability::record_publish(name, "dropped");
            warn!(
                sink = %name,
                sensor_id = r.sensor_id,
                sequence = r.sequence,
                "Queue full, reading dropped"
            );
            false
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            debug!(sink = %name, "Sink worker closed");
            false
        }
    }
}

/// Consumes readings and publishes them, twice for duplicates
#[instrument(
    name = "sink_worker_loop",
    skip(sink, rx, metrics),
    fields(sink = %name)
)]
async fn sink_worker<S: TelemetrySink>(
    mut sink: S,
    mut rx: mpsc::Receiver<Reading>,
    metrics: Arc<SinkMetrics>,
    name: String,
) {
    debug!(sink = %name, "Sink worker started");

    while let Some(reading) = rx.recv().await {
        metrics.set_queue_len(rx.len());

        for _ in 0..reading.emissions() {
            let started = Instant::now();
            match sink.publish(&reading).await {
                Ok(Ack::Delivered) => {
                    metrics.inc_published();
                    observability::record_publish(&name, "delivered");
                    observability::record_publish_latency_ms(
                        &name,
                        started.elapsed().as_secs_f64() * 1000.0,
                    );
                }
                Ok(Ack::Suppressed) => {
                    metrics.inc_suppressed();
                    observability::record_publish(&name, "suppressed");
                }
                Ok(Ack::Skipped) => {
                    metrics.inc_skipped();
                    observability::record_publish(&name, "skipped");
                }
                Err(e) => {
                    // Dropped from the sink only; never stops the sensor.
                    metrics.inc_failures();
                    observability::record_publish(&name, "failed");
                    warn!(
                        sink = %name,
                        device_id = reading.device_id,
                        sensor_id = reading.sensor_id,
                        error = %e,
                        "Publish failed"
                    );
                }
            }
        }
    }

    if let Err(e) = sink.close().await {
        error!(sink = %name, error = %e, "Close failed on shutdown");
    }

    debug!(sink = %name, "Sink worker stopped");
}
