use std::sync::Arc;

use crate::{Meter, MeterSnapshot, NamingConvention, Payload, Result, TimeUnit};

/// Renders meters in the wire format of one monitoring backend.
///
/// A [`StepPublisher`][crate::StepPublisher] drives the backend on every step: it calls
/// [`write()`][Backend::write] for each meter that has something to report and then
/// [`encode()`][Backend::encode] once per batch of meters.
pub trait Backend: Send + Sync + 'static {
    /// One unit of output, e.g. one protocol line or one JSON event.
    type Record: Send;

    /// Short name of the backend, used in logs and errors.
    fn name(&self) -> &'static str;

    /// The unit the backend expects time-based statistics in. Snapshots passed to
    /// [`write()`][Backend::write] are already expressed in this unit.
    fn base_time_unit(&self) -> TimeUnit;

    /// The naming convention the backend prefers. Publishers render with it unless the
    /// registry has an explicitly configured convention. Called once per publisher.
    fn naming_convention(&self) -> Option<Arc<dyn NamingConvention>> {
        None
    }

    /// Renders the snapshot of one meter. Returns no records if the backend has nothing to
    /// say about this meter.
    ///
    /// Exporters match on the meter variant to decide how each kind is rendered.
    fn write(
        &self,
        meter: &Meter,
        snapshot: &MeterSnapshot,
        convention: &Arc<dyn NamingConvention>,
    ) -> Vec<Self::Record>;

    /// Serializes the records of one batch into one or more payloads.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Encoding`][crate::Error::Encoding] if the records cannot be
    /// serialized. The records of the batch are then dropped for this step.
    fn encode(&self, records: Vec<Self::Record>) -> Result<Vec<Payload>>;

    /// Called at the start of every publish with all registered meters, so backends can
    /// release per-meter caches of meters that have been removed from the registry.
    fn retain(&self, _meters: &[Meter]) {}
}
