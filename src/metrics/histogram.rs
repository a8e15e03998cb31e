use hdrhistogram::Histogram;

/// Millisecond-resolution latency histogram, used here for the queued-wait
/// duration (time between [`crate::pending_request::PendingRequest`]
/// enqueue and its terminal transition).
#[derive(Debug)]
pub struct LatencyHistogram {
    hist: Histogram<u64>,
}

impl LatencyHistogram {
    /// Create a new latency histogram.
    ///
    /// # Errors
    ///
    /// Returns an error if the histogram cannot be created.
    pub fn new() -> Result<Self, String> {
        let hist =
            Histogram::<u64>::new(3).map_err(|err| format!("failed to create histogram: {err}"))?;
        Ok(Self { hist })
    }

    /// Record a wait duration in milliseconds.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be recorded.
    pub fn record(&mut self, wait_ms: u64) -> Result<(), String> {
        let value = wait_ms.max(1);
        self.hist
            .record(value)
            .map_err(|err| format!("failed to record wait duration: {err}"))
    }

    #[must_use]
    pub fn percentiles(&self) -> (u64, u64, u64) {
        if self.count() == 0 {
            return (0, 0, 0);
        }
        (
            self.hist.value_at_quantile(0.5),
            self.hist.value_at_quantile(0.9),
            self.hist.value_at_quantile(0.99),
        )
    }

    #[must_use]
    pub fn count(&self) -> u64 {
        self.hist.len()
    }
}

impl Default for LatencyHistogram {
    fn default() -> Self {
        #[expect(
            clippy::unwrap_used,
            reason = "Histogram::new(3) cannot fail for a valid sigfig"
        )]
        Self::new().unwrap()
    }
}
