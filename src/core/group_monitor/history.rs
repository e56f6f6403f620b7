use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex, RwLock};

use super::metrics::Sample;

/// Raw samples kept per session
pub const SAMPLE_HISTORY_CAPACITY: usize = 100;

/// Points per chart series, one minute at a 1 s interval
pub const CHART_WINDOW_CAPACITY: usize = 60;

/// Fixed-capacity FIFO that evicts its oldest element on overflow
#[derive(Debug, Clone)]
pub struct BoundedSeries<T> {
    capacity: usize,
    items: VecDeque<T>,
}

impl<T> BoundedSeries<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            items: VecDeque::with_capacity(capacity),
        }
    }

    /// Append `value`, returning the evicted element if the series was full
    pub fn push(&mut self, value: T) -> Option<T> {
        let evicted = if self.items.len() >= self.capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(value);
        evicted
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn latest(&self) -> Option<&T> {
        self.items.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

impl<T: Clone> BoundedSeries<T> {
    pub fn to_vec(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }
}

/// Handle returned by [`SampleBuffer::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type SampleCallback = dyn Fn(&Sample) + Send + Sync;

struct Subscriber {
    id: SubscriptionId,
    callback: Box<SampleCallback>,
    active: AtomicBool,
    // Held for the duration of one delivery. Reentrant so a callback can
    // unsubscribe itself.
    delivery: ReentrantMutex<()>,
}

/// Sample history shared between the scheduler and readers.
///
/// Every pushed sample is delivered synchronously to the current subscribers
/// on the pushing thread. Callers that own an event loop must marshal the
/// notification themselves.
pub struct SampleBuffer {
    samples: RwLock<BoundedSeries<Arc<Sample>>>,
    subscribers: Mutex<Vec<Arc<Subscriber>>>,
    next_id: AtomicU64,
}

impl SampleBuffer {
    pub fn new() -> Self {
        Self::with_capacity(SAMPLE_HISTORY_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: RwLock::new(BoundedSeries::with_capacity(capacity)),
            subscribers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&Sample) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers.lock().push(Arc::new(Subscriber {
            id,
            callback: Box::new(callback),
            active: AtomicBool::new(true),
            delivery: ReentrantMutex::new(()),
        }));
        id
    }

    /// Remove a subscriber. Once this returns the callback is not running and
    /// will not be invoked again.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = {
            let mut subscribers = self.subscribers.lock();
            subscribers
                .iter()
                .position(|s| s.id == id)
                .map(|index| subscribers.remove(index))
        };

        match removed {
            Some(subscriber) => {
                subscriber.active.store(false, Ordering::Release);
                // Wait out a delivery in progress on another thread
                drop(subscriber.delivery.lock());
                true
            }
            None => false,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Store `sample` and notify every subscriber
    pub fn push(&self, sample: Arc<Sample>) {
        self.record(Arc::clone(&sample));
        self.notify(&sample);
    }

    /// Store `sample` without notifying anyone
    pub fn record(&self, sample: Arc<Sample>) {
        self.samples.write().push(sample);
    }

    /// Deliver `sample` to the current subscribers on this thread
    pub fn notify(&self, sample: &Sample) {
        let subscribers: Vec<Arc<Subscriber>> = self.subscribers.lock().clone();
        for subscriber in subscribers {
            let _delivery = subscriber.delivery.lock();
            if subscriber.active.load(Ordering::Acquire) {
                (subscriber.callback)(sample);
            }
        }
    }

    pub fn snapshot(&self) -> Vec<Arc<Sample>> {
        self.samples.read().to_vec()
    }

    pub fn latest(&self) -> Option<Arc<Sample>> {
        self.samples.read().latest().cloned()
    }

    pub fn len(&self) -> usize {
        self.samples.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.read().is_empty()
    }

    pub fn clear(&self) {
        self.samples.write().clear();
    }
}

impl Default for SampleBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Metrics plotted in the rolling charts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChartMetric {
    Cpu,
    Memory,
    Disk,
    Network,
    Gpu,
}

impl ChartMetric {
    pub const ALL: [ChartMetric; 5] = [
        ChartMetric::Cpu,
        ChartMetric::Memory,
        ChartMetric::Disk,
        ChartMetric::Network,
        ChartMetric::Gpu,
    ];

    pub fn value_of(self, sample: &Sample) -> f64 {
        match self {
            ChartMetric::Cpu => sample.cpu_usage as f64,
            ChartMetric::Memory => sample.memory_usage as f64,
            ChartMetric::Disk => sample.disk_io as f64,
            ChartMetric::Network => sample.network_usage as f64,
            ChartMetric::Gpu => sample.gpu_usage_percent as f64,
        }
    }
}

/// One time-aligned window of every chart series
#[derive(Debug, Clone)]
pub struct ChartWindow {
    pub cpu: BoundedSeries<f64>,
    pub memory: BoundedSeries<f64>,
    pub disk: BoundedSeries<f64>,
    pub network: BoundedSeries<f64>,
    pub gpu: BoundedSeries<f64>,
}

impl ChartWindow {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            cpu: BoundedSeries::with_capacity(capacity),
            memory: BoundedSeries::with_capacity(capacity),
            disk: BoundedSeries::with_capacity(capacity),
            network: BoundedSeries::with_capacity(capacity),
            gpu: BoundedSeries::with_capacity(capacity),
        }
    }

    pub fn series(&self, metric: ChartMetric) -> &BoundedSeries<f64> {
        match metric {
            ChartMetric::Cpu => &self.cpu,
            ChartMetric::Memory => &self.memory,
            ChartMetric::Disk => &self.disk,
            ChartMetric::Network => &self.network,
            ChartMetric::Gpu => &self.gpu,
        }
    }

    fn series_mut(&mut self, metric: ChartMetric) -> &mut BoundedSeries<f64> {
        match metric {
            ChartMetric::Cpu => &mut self.cpu,
            ChartMetric::Memory => &mut self.memory,
            ChartMetric::Disk => &mut self.disk,
            ChartMetric::Network => &mut self.network,
            ChartMetric::Gpu => &mut self.gpu,
        }
    }

    /// Push one point per series. Disabled metrics arrive as zero in the
    /// sample, so every series keeps the same length.
    pub fn push_sample(&mut self, sample: &Sample) {
        for metric in ChartMetric::ALL {
            self.series_mut(metric).push(metric.value_of(sample));
        }
    }

    pub fn len(&self) -> usize {
        self.cpu.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cpu.is_empty()
    }

    fn clear(&mut self) {
        for metric in ChartMetric::ALL {
            self.series_mut(metric).clear();
        }
    }
}

/// Chart windows shared between the scheduler and readers
pub struct ChartSeriesBuffer {
    window: RwLock<ChartWindow>,
}

impl ChartSeriesBuffer {
    pub fn new() -> Self {
        Self::with_capacity(CHART_WINDOW_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            window: RwLock::new(ChartWindow::with_capacity(capacity)),
        }
    }

    pub fn push_sample(&self, sample: &Sample) {
        self.window.write().push_sample(sample);
    }

    pub fn snapshot(&self) -> ChartWindow {
        self.window.read().clone()
    }

    pub fn series(&self, metric: ChartMetric) -> Vec<f64> {
        self.window.read().series(metric).to_vec()
    }

    pub fn len(&self) -> usize {
        self.window.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.read().is_empty()
    }

    pub fn clear(&self) {
        self.window.write().clear();
    }
}

impl Default for ChartSeriesBuffer {
    fn default() -> Self {
        Self::new()
    }
}
