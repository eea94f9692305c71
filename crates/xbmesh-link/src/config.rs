use std::time::Duration;

use xbmesh_frame::DEFAULT_MAX_BODY;

use crate::fanout::OverflowPolicy;

/// Default time a caller waits for a response.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Default read timeout of the monitor, which bounds shutdown latency.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default number of telemetry frames buffered for subscribers.
pub const DEFAULT_TELEMETRY_CAPACITY: usize = 20;

/// Default lifetime of a response nobody awaited.
pub const DEFAULT_STALE_RESPONSE_TTL: Duration = Duration::from_secs(30);

/// Connection behavior.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// How long request helpers wait for the matching response.
    pub response_timeout: Duration,
    /// Read timeout of the monitor thread; shutdown is noticed at this cadence.
    pub poll_interval: Duration,
    /// Maximum queued telemetry frames before the overflow policy applies.
    pub telemetry_capacity: usize,
    /// What publishing does when the telemetry queue is full.
    pub overflow_policy: OverflowPolicy,
    /// How long an unclaimed response is kept before it is swept.
    pub stale_response_ttl: Duration,
    /// Largest accepted frame body.
    pub max_body_size: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            telemetry_capacity: DEFAULT_TELEMETRY_CAPACITY,
            overflow_policy: OverflowPolicy::default(),
            stale_response_ttl: DEFAULT_STALE_RESPONSE_TTL,
            max_body_size: DEFAULT_MAX_BODY,
        }
    }
}

impl LinkConfig {
    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_telemetry_capacity(mut self, capacity: usize) -> Self {
        self.telemetry_capacity = capacity;
        self
    }

    pub fn with_overflow_policy(mut self, policy: OverflowPolicy) -> Self {
        self.overflow_policy = policy;
        self
    }

    pub fn with_stale_response_ttl(mut self, ttl: Duration) -> Self {
        self.stale_response_ttl = ttl;
        self
    }
}
