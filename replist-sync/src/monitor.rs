//! Injected statistics collectors.
//!
//! One collector per process side: [`ServerMonitor`] for the batch
//! service, [`ClientMonitor`] for the workload client. Both are plain
//! `Arc`-shared values handed to their owner at construction — there is no
//! process-wide singleton. Each runs a 5-second report loop that logs a
//! summary and resets the per-window counters.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use log::info;
use tokio::sync::watch;

const REPORT_PERIOD: Duration = Duration::from_secs(5);

/// Fixed-window moving average over `f64` samples.
#[derive(Debug)]
pub struct MovingAverage {
    window: usize,
    samples: VecDeque<f64>,
}

impl MovingAverage {
    pub fn new(window: usize) -> Self {
        Self { window, samples: VecDeque::with_capacity(window) }
    }

    pub fn add(&mut self, sample: f64) {
        if self.samples.len() == self.window {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn avg(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().sum::<f64>() / self.samples.len() as f64
    }
}

fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1_000.0
}

#[derive(Debug)]
struct ServerWindow {
    ops_committed: u64,
    diffs_served: u64,
    diff_duration_ms: MovingAverage,
}

impl ServerWindow {
    fn report(&mut self) {
        let secs = REPORT_PERIOD.as_secs_f64();
        info!("server monitor:");
        info!("  - storage ops / s:      {:.2}", self.ops_committed as f64 / secs);
        info!("  - diff requests / s:    {:.2}", self.diffs_served as f64 / secs);
        info!("  - diff request ms:      {:.2}", self.diff_duration_ms.avg());
        self.ops_committed = 0;
        self.diffs_served = 0;
    }
}

/// Batch-service statistics.
///
/// The window lives behind an inner `Arc` so the report task can share it
/// without holding the monitor itself.
pub struct ServerMonitor {
    window: Arc<Mutex<ServerWindow>>,
    stop_tx: watch::Sender<bool>,
    stop_rx: watch::Receiver<bool>,
}

impl ServerMonitor {
    pub fn new() -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        Self {
            window: Arc::new(Mutex::new(ServerWindow {
                ops_committed: 0,
                diffs_served: 0,
                diff_duration_ms: MovingAverage::new(5),
            })),
            stop_tx,
            stop_rx,
        }
    }

    /// Record `count` storage operations committed in one tick.
    pub fn ops_committed(&self, count: usize) {
        self.window.lock().expect("monitor lock poisoned").ops_committed += count as u64;
    }

    /// Record one served diff request and its duration.
    pub fn diff_served(&self, duration: Duration) {
        let mut window = self.window.lock().expect("monitor lock poisoned");
        window.diffs_served += 1;
        window.diff_duration_ms.add(millis(duration));
    }

    /// Spawn the periodic report loop.
    pub fn start(&self) {
        let window = self.window.clone();
        let mut stop_rx = self.stop_rx.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(REPORT_PERIOD);
            tick.tick().await; // the immediate first tick reports nothing
            loop {
                tokio::select! {
                    _ = stop_rx.changed() => return,
                    _ = tick.tick() => {
                        window.lock().expect("monitor lock poisoned").report();
                    }
                }
            }
        });
    }

    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }
}

impl Default for ServerMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
struct ClientWindow {
    updates_sent: u64,
    updates_received: u64,
    send_duration_ms: MovingAverage,
    poll_duration_ms: MovingAverage,
    visibility_ms: MovingAverage,
    pending_since: Option<Instant>,
}

impl ClientWindow {
    fn report(&mut self) {
        let secs = REPORT_PERIOD.as_secs_f64();
        info!("client monitor:");
        info!("  - edits sent / s:       {:.2}", self.updates_sent as f64 / secs);
        info!("  - edits received / s:   {:.2}", self.updates_received as f64 / secs);
        info!("  - send request ms:      {:.2}", self.send_duration_ms.avg());
        info!("  - poll request ms:      {:.2}", self.poll_duration_ms.avg());
        info!("  - write visibility ms:  {:.2}", self.visibility_ms.avg());
        self.updates_sent = 0;
        self.updates_received = 0;
    }
}

/// Workload-client statistics, including write-visibility latency: the
/// time from the first unacknowledged edit of a burst until the server's
/// diff stream has echoed every pending edit back.
#[derive(Debug)]
pub struct ClientMonitor {
    window: Arc<Mutex<ClientWindow>>,
    stop_tx: watch::Sender<bool>,
    stop_rx: watch::Receiver<bool>,
}

impl ClientMonitor {
    pub fn new() -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        Self {
            window: Arc::new(Mutex::new(ClientWindow {
                updates_sent: 0,
                updates_received: 0,
                send_duration_ms: MovingAverage::new(5),
                poll_duration_ms: MovingAverage::new(5),
                visibility_ms: MovingAverage::new(5),
                pending_since: None,
            })),
            stop_tx,
            stop_rx,
        }
    }

    pub fn updates_sent(&self, count: usize, duration: Duration) {
        let mut window = self.window.lock().expect("monitor lock poisoned");
        window.updates_sent += count as u64;
        window.send_duration_ms.add(millis(duration));
    }

    pub fn updates_received(&self, count: usize, duration: Duration) {
        let mut window = self.window.lock().expect("monitor lock poisoned");
        window.updates_received += count as u64;
        window.poll_duration_ms.add(millis(duration));
    }

    /// The client went from no pending edits to some.
    pub fn visibility_pending(&self, at: Instant) {
        let mut window = self.window.lock().expect("monitor lock poisoned");
        if window.pending_since.is_none() {
            window.pending_since = Some(at);
        }
    }

    /// The last pending edit became visible in the polled diff stream.
    pub fn visibility_achieved(&self, at: Instant) {
        let mut window = self.window.lock().expect("monitor lock poisoned");
        if let Some(since) = window.pending_since.take() {
            window.visibility_ms.add(millis(at.duration_since(since)));
        }
    }

    /// Spawn the periodic report loop.
    pub fn start(&self) {
        let window = self.window.clone();
        let mut stop_rx = self.stop_rx.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(REPORT_PERIOD);
            tick.tick().await;
            loop {
                tokio::select! {
                    _ = stop_rx.changed() => return,
                    _ = tick.tick() => {
                        window.lock().expect("monitor lock poisoned").report();
                    }
                }
            }
        });
    }

    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }
}

impl Default for ClientMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_moving_average_window() {
        let mut avg = MovingAverage::new(3);
        assert_eq!(avg.avg(), 0.0);

        avg.add(1.0);
        avg.add(2.0);
        avg.add(3.0);
        assert!((avg.avg() - 2.0).abs() < f64::EPSILON);

        // Window slides: the 1.0 falls out.
        avg.add(5.0);
        assert!((avg.avg() - 10.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_visibility_tracks_first_pending_only() {
        let monitor = ClientMonitor::new();
        let t0 = Instant::now();

        monitor.visibility_pending(t0);
        monitor.visibility_pending(t0 + Duration::from_millis(50));
        monitor.visibility_achieved(t0 + Duration::from_millis(100));

        let window = monitor.window.lock().unwrap();
        assert!((window.visibility_ms.avg() - 100.0).abs() < 1.0);
        assert!(window.pending_since.is_none());
    }

    #[test]
    fn test_visibility_achieved_without_pending_is_noop() {
        let monitor = ClientMonitor::new();
        monitor.visibility_achieved(Instant::now());
        assert_eq!(monitor.window.lock().unwrap().visibility_ms.avg(), 0.0);
    }

    #[test]
    fn test_server_window_resets_counters_on_report() {
        let monitor = ServerMonitor::new();
        monitor.ops_committed(10);
        monitor.diff_served(Duration::from_millis(2));

        monitor.window.lock().unwrap().report();

        let window = monitor.window.lock().unwrap();
        assert_eq!(window.ops_committed, 0);
        assert_eq!(window.diffs_served, 0);
        // The moving average survives the window reset.
        assert!(window.diff_duration_ms.avg() > 0.0);
    }
}
