// self
use crate::obs::PoolEvent;

/// Records a pool event via the global metrics recorder (when enabled).
pub fn record_pool_event(event: PoolEvent) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!("oauth2_token_pool_events_total", "event" => event.as_str()).increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = event;
	}
}
