use biometrics::{Collector, Counter, Moments};

pub(crate) static CLIENT_REQUESTS: Counter = Counter::new("spurify.client.requests");
pub(crate) static CLIENT_REQUEST_ERRORS: Counter = Counter::new("spurify.client.request_errors");
pub(crate) static CLIENT_REQUEST_DURATION: Moments =
    Moments::new("spurify.client.request_duration_seconds");

pub(crate) static SESSION_INITS: Counter = Counter::new("spurify.session.inits");
pub(crate) static SESSION_SENDS: Counter = Counter::new("spurify.session.sends");

pub(crate) static STREAM_DELTAS: Counter = Counter::new("spurify.stream.deltas");
pub(crate) static STREAM_ERRORS: Counter = Counter::new("spurify.stream.errors");
pub(crate) static STREAM_ORPHANED_DELTAS: Counter = Counter::new("spurify.stream.orphaned_deltas");
pub(crate) static STREAM_DURATION: Moments = Moments::new("spurify.stream.duration_seconds");

pub(crate) static STORE_WRITE_ERRORS: Counter = Counter::new("spurify.store.write_errors");
pub(crate) static STORE_LOAD_FALLBACKS: Counter = Counter::new("spurify.store.load_fallbacks");

pub(crate) static EXPORT_FILES: Counter = Counter::new("spurify.export.files");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&CLIENT_REQUESTS);
    collector.register_counter(&CLIENT_REQUEST_ERRORS);
    collector.register_moments(&CLIENT_REQUEST_DURATION);

    collector.register_counter(&SESSION_INITS);
    collector.register_counter(&SESSION_SENDS);

    collector.register_counter(&STREAM_DELTAS);
    collector.register_counter(&STREAM_ERRORS);
    collector.register_counter(&STREAM_ORPHANED_DELTAS);
    collector.register_moments(&STREAM_DURATION);

    collector.register_counter(&STORE_WRITE_ERRORS);
    collector.register_counter(&STORE_LOAD_FALLBACKS);

    collector.register_counter(&EXPORT_FILES);
}
