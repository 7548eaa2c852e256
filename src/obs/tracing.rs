// self
use crate::{_prelude::*, obs::PoolEvent, pool::Fingerprint};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedAcquire<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedAcquire<F> = F;

/// Span wrapping one pool acquisition.
#[derive(Clone, Debug)]
pub struct PoolSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl PoolSpan {
	/// Creates a span tagged with the call site and the (shortened) fingerprint.
	pub fn new(stage: &'static str, fingerprint: &Fingerprint) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!(
				"oauth2_token_pool.acquire",
				stage,
				fingerprint = fingerprint.short()
			);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (stage, fingerprint);

			Self {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedAcquire<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

/// Emits a `debug` event for a pool step inside the current span (when enabled).
pub fn trace_pool_event(event: PoolEvent, detail: &str) {
	#[cfg(feature = "tracing")]
	{
		tracing::debug!(event = event.as_str(), detail, "token pool event");
	}

	#[cfg(not(feature = "tracing"))]
	{
		let _ = (event, detail);
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[tokio::test]
	async fn instrument_passes_the_output_through() {
		let fingerprint = Fingerprint::from_fields(["svc", "", "", "", "", "", "", "", ""]);
		let span = PoolSpan::new("instrument_passes_the_output_through", &fingerprint);
		let value = span.instrument(async { 42 }).await;

		assert_eq!(value, 42);

		trace_pool_event(PoolEvent::Hit, "smoke");
	}
}
