//! Mock duration prober for testing.

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::probe::{DurationProber, MediaMetadata, ProbeError, ProbeInput};

/// A recorded probe call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedProbe {
    /// Scope the probe was run in.
    pub scope: String,
    /// File name passed in.
    pub file_name: String,
    /// Declared MIME type.
    pub mime_type: String,
    /// Size of the probed bytes.
    pub size_bytes: usize,
}

/// Mock implementation of [`DurationProber`].
///
/// Reports a fixed duration, or fails when configured to.
#[derive(Debug)]
pub struct MockProber {
    metadata: Mutex<MediaMetadata>,
    failure: Mutex<Option<String>>,
    calls: Mutex<Vec<RecordedProbe>>,
}

impl MockProber {
    /// Creates a prober reporting `duration_secs`.
    pub fn new(duration_secs: f64) -> Self {
        Self {
            metadata: Mutex::new(MediaMetadata::with_duration(duration_secs)),
            failure: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Creates a prober that always fails with [`ProbeError::NoDuration`].
    pub fn failing(reason: &str) -> Self {
        let prober = Self::new(0.0);
        prober.set_failure(Some(reason));
        prober
    }

    /// Replaces the reported metadata.
    pub fn set_metadata(&self, metadata: MediaMetadata) {
        *self.metadata.lock() = metadata;
    }

    /// Sets or clears the failure reason.
    pub fn set_failure(&self, reason: Option<&str>) {
        *self.failure.lock() = reason.map(str::to_string);
    }

    /// Calls received so far.
    pub fn recorded_calls(&self) -> Vec<RecordedProbe> {
        self.calls.lock().clone()
    }

    /// Number of calls received.
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl DurationProber for MockProber {
    fn name(&self) -> &str {
        "mock"
    }

    async fn probe(&self, input: ProbeInput<'_>) -> Result<MediaMetadata, ProbeError> {
        self.calls.lock().push(RecordedProbe {
            scope: input.scope.to_string(),
            file_name: input.file_name.to_string(),
            mime_type: input.mime_type.to_string(),
            size_bytes: input.bytes.len(),
        });

        if let Some(reason) = self.failure.lock().clone() {
            return Err(ProbeError::no_duration(reason));
        }

        Ok(self.metadata.lock().clone())
    }
}
