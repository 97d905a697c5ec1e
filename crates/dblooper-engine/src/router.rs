//! Routes failed rows into the error sequence.

use anyhow::Result;
use dblooper_types::ErrorRecord;

use crate::looper::RowFailure;
use crate::sink::RowSink;

/// Forwards every failure to the sink verbatim. No retries, no drops.
#[derive(Debug, Default)]
pub(crate) struct ErrorRouter {
    routed: u64,
}

impl ErrorRouter {
    pub(crate) fn route(&mut self, sink: &mut dyn RowSink, failure: RowFailure) -> Result<()> {
        tracing::warn!(
            row_index = failure.row_index,
            error = failure.message.as_str(),
            "Row failed"
        );
        let record = ErrorRecord::new(failure.row_index, &failure.original_row, failure.message);
        sink.on_error(record)?;
        self.routed += 1;
        Ok(())
    }

    pub(crate) fn routed(&self) -> u64 {
        self.routed
    }
}
