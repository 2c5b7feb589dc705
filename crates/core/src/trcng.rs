use std::borrow::Cow;
use std::sync::OnceLock;

use opentelemetry::global::{self, BoxedSpan, BoxedTracer};
use opentelemetry::trace::{Span, Status, Tracer as _};

/// The process-wide tracer. Until the host installs a tracer provider this is
/// a no-op, so span creation is always safe.
pub fn get_tracer() -> &'static BoxedTracer {
	static TRACER: OnceLock<BoxedTracer> = OnceLock::new();
	TRACER.get_or_init(|| global::tracer("policyplane"))
}

pub fn start_span(name: impl Into<Cow<'static, str>>) -> BoxedSpan {
	get_tracer().start(name)
}

/// Record a failure on an open span and mark its status accordingly.
pub fn record_error(span: &mut BoxedSpan, err: &(dyn std::error::Error)) {
	span.record_error(err);
	span.set_status(Status::error(err.to_string()));
}
