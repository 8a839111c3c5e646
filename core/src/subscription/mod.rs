//! Record delivery to user analysis code.

pub mod features;

pub use features::FeatureRecord;

/// A user-supplied analysis callback.
///
/// Invoked synchronously from a drainer thread, once per delivered record.
/// Implementations must not retain the record past the call, must not block
/// indefinitely, and must be reentrant: the engine runs one drainer per
/// steered queue. The return value is opaque to the engine; a nonzero return
/// (or a panic) counts one anomaly signal and processing continues.
pub trait AnalysisCallback: Send + Sync {
    fn on_record(&self, record: &FeatureRecord) -> i32;
}

impl<F> AnalysisCallback for F
where
    F: Fn(&FeatureRecord) -> i32 + Send + Sync,
{
    #[inline]
    fn on_record(&self, record: &FeatureRecord) -> i32 {
        (self)(record)
    }
}
