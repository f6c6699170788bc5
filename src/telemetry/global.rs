//! Process-wide default providers.
//!
//! Constructing a provider installs it into the OpenTelemetry globals and
//! records which instance holds each slot here. The last constructed provider
//! wins; earlier instances stay valid for whoever still owns them.

use std::sync::atomic::{AtomicU64, Ordering};

use opentelemetry::global;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::trace::SdkTracerProvider;

static NEXT_PROVIDER_ID: AtomicU64 = AtomicU64::new(1);

// 0 marks an empty slot; ids start at 1.
static TRACER_SLOT: AtomicU64 = AtomicU64::new(0);
static METER_SLOT: AtomicU64 = AtomicU64::new(0);

/// Allocate a process-unique provider id.
pub(crate) fn next_provider_id() -> u64 {
    NEXT_PROVIDER_ID.fetch_add(1, Ordering::Relaxed)
}

pub(crate) fn install_tracer_provider(id: u64, provider: &SdkTracerProvider) {
    global::set_tracer_provider(provider.clone());
    let previous = TRACER_SLOT.swap(id, Ordering::AcqRel);
    if previous != 0 {
        tracing::debug!(previous, current = id, "Replaced global tracer provider");
    }
}

pub(crate) fn install_meter_provider(id: u64, provider: &SdkMeterProvider) {
    global::set_meter_provider(provider.clone());
    let previous = METER_SLOT.swap(id, Ordering::AcqRel);
    if previous != 0 {
        tracing::debug!(previous, current = id, "Replaced global meter provider");
    }
}

fn occupant(slot: &AtomicU64) -> Option<u64> {
    match slot.load(Ordering::Acquire) {
        0 => None,
        id => Some(id),
    }
}

/// Id of the trace provider currently installed as the process default.
pub fn installed_tracer_provider_id() -> Option<u64> {
    occupant(&TRACER_SLOT)
}

/// Id of the metric provider currently installed as the process default.
pub fn installed_meter_provider_id() -> Option<u64> {
    occupant(&METER_SLOT)
}
