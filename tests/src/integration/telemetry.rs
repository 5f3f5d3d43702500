//! # Telemetry Around a Live Bus
//!
//! Prometheus counters are process-global, so assertions compare deltas
//! rather than absolute values.

#[cfg(test)]
mod tests {
    use event_bus::{BroadcastHub, BusConfig, Channel, EventBus, Topic};
    use event_telemetry::{
        encode_metrics, register_metrics, TelemetryConfig, BRIDGE_FRAMES_RECEIVED,
        BRIDGE_FRAMES_SENT, EVENTS_PUBLISHED,
    };

    use prometheus::CounterVec;

    fn counter(vec: &CounterVec, labels: &[&str]) -> f64 {
        vec.with_label_values(labels).get()
    }

    #[test]
    fn test_publish_and_bridge_counters_move() {
        let hub = BroadcastHub::new();
        let a = EventBus::connect(BusConfig::default(), &hub).unwrap();
        let b = EventBus::connect(BusConfig::default(), &hub).unwrap();
        let topic: Topic<u32> = Topic::new("metrics.probe");

        let local_before = counter(&EVENTS_PUBLISHED, &["historical", "local"]);
        let remote_before = counter(&EVENTS_PUBLISHED, &["historical", "remote"]);
        let sent_before = counter(&BRIDGE_FRAMES_SENT, &["sent"]);
        let accepted_before = counter(&BRIDGE_FRAMES_RECEIVED, &["accepted"]);

        a.publish_with(&topic, &1, event_bus::PublishOptions::historical());

        assert!(counter(&EVENTS_PUBLISHED, &["historical", "local"]) >= local_before + 1.0);
        assert!(counter(&EVENTS_PUBLISHED, &["historical", "remote"]) >= remote_before + 1.0);
        assert!(counter(&BRIDGE_FRAMES_SENT, &["sent"]) >= sent_before + 1.0);
        assert!(counter(&BRIDGE_FRAMES_RECEIVED, &["accepted"]) >= accepted_before + 1.0);
        assert_eq!(b.stats().bridge.received, 1);
    }

    #[test]
    fn test_metrics_exported_after_registration() {
        // Registration is idempotent; other tests may have registered first.
        register_metrics().expect("register metrics");
        register_metrics().expect("register metrics again");

        let bus = EventBus::new();
        bus.publish(&Topic::<u32>::new("metrics.export"), &1);

        let text = encode_metrics().expect("encode metrics");
        assert!(text.contains("event_bus_events_published_total"));
    }

    #[test]
    fn test_context_config_names_service() {
        let config = TelemetryConfig::for_context("tab-2");
        assert_eq!(config.full_service_name(), "event-bus-tab-2");
    }
}
