//! Rolling window assembler.
//!
//! Merges persisted history with the just-ingested reading into a
//! chronologically ascending window whose last element is always the new
//! reading. When history is short the configured `ShortWindowPolicy`
//! decides whether to run on the shorter window, pad it, or give up.

use tracing::{debug, warn};

use crate::config::ShortWindowPolicy;
use crate::error::PredictionError;
use crate::model::{FeatureVector, SensorReading};

/// Ordered readings fed to the scaler, oldest first, newest last.
#[derive(Debug, Clone, PartialEq)]
pub struct RollingWindow {
    rows: Vec<SensorReading>,
}

impl RollingWindow {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[SensorReading] {
        &self.rows
    }

    /// The just-ingested reading.
    pub fn newest(&self) -> Option<&SensorReading> {
        self.rows.last()
    }

    pub fn feature_rows(&self) -> Vec<FeatureVector> {
        self.rows.iter().map(SensorReading::features).collect()
    }
}

/// Assembly result plus how it was obtained.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledWindow {
    pub window: RollingWindow,
    /// History rows that made it into the window.
    pub history_used: usize,
    /// Copies of the oldest row prepended under `PadOldest`.
    pub padded: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct WindowAssembler {
    length: usize,
    policy: ShortWindowPolicy,
}

impl WindowAssembler {
    pub fn new(length: usize, policy: ShortWindowPolicy) -> Self {
        Self {
            length: length.max(1),
            policy,
        }
    }

    /// History rows needed besides the new reading.
    pub fn history_needed(&self) -> usize {
        self.length - 1
    }

    /// Builds the window from `history` (ascending) and `newest`.
    ///
    /// History rows at or after `newest.timestamp` are dropped: either the
    /// reading itself read back from the store, or a row it superseded
    /// under last-write-wins.
    pub fn assemble(
        &self,
        history: Vec<SensorReading>,
        newest: SensorReading,
    ) -> Result<AssembledWindow, PredictionError> {
        let mut earlier: Vec<SensorReading> = history
            .into_iter()
            .filter(|row| row.timestamp < newest.timestamp)
            .collect();

        let needed = self.history_needed();
        if earlier.len() > needed {
            earlier.drain(..earlier.len() - needed);
        }
        let history_used = earlier.len();

        let mut padded = 0;
        if history_used < needed {
            match self.policy {
                ShortWindowPolicy::Proceed => {
                    warn!(
                        available = history_used,
                        required = needed,
                        "Insufficient historical data, proceeding with a {}-step window",
                        history_used + 1
                    );
                }
                ShortWindowPolicy::PadOldest => {
                    let oldest = earlier.first().copied().unwrap_or(newest);
                    padded = needed - history_used;
                    earlier.splice(0..0, std::iter::repeat_n(oldest, padded));
                    warn!(
                        available = history_used,
                        required = needed,
                        padded,
                        "Insufficient historical data, padded window with oldest reading"
                    );
                }
                ShortWindowPolicy::Reject => {
                    return Err(PredictionError::InsufficientHistory {
                        available: history_used,
                        required: needed,
                    });
                }
            }
        }

        earlier.push(newest);
        debug!(len = earlier.len(), history_used, padded, "assembled rolling window");

        Ok(AssembledWindow {
            window: RollingWindow { rows: earlier },
            history_used,
            padded,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
