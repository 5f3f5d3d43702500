//! # Cross-Context Broadcast Flows
//!
//! Each [`EventBus`] here plays one browsing context (tab, window, worker) of
//! the same application. They share a [`BroadcastHub`] the way real contexts
//! share a named broadcast channel.
//!
//! ## Flows Tested:
//!
//! 1. **Replication**: an event published in one context reaches every other
//!    context on the same namespace, exactly once
//! 2. **No relaying**: received events are never posted again
//! 3. **Replay across contexts**: a historical event received remotely is
//!    replayed to late subscribers of the receiving context
//! 4. **Isolation**: origins and namespace scopes partition the hub

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use event_bus::{
        BroadcastHub, BusConfig, BusConfigBuilder, Channel, Envelope, EventBus, PublishOptions,
        SubscriptionError, Topic,
    };
    use parking_lot::Mutex;
    use serde::{Deserialize, Serialize};
    use serde_json::{json, Value};
    use tokio::time::timeout;
    use tokio_stream::StreamExt;

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct CartUpdated {
        items: u32,
        total_cents: u64,
    }

    fn cart() -> Topic<CartUpdated> {
        Topic::new("cart.updated")
    }

    /// `n` buses on the default namespace of one hub.
    fn contexts(hub: &BroadcastHub, n: usize) -> Vec<EventBus> {
        (0..n)
            .map(|_| EventBus::connect(BusConfig::default(), hub).expect("default config is valid"))
            .collect()
    }

    fn scoped(origin: &str, scope: Option<&str>) -> BusConfig {
        let mut builder = BusConfigBuilder::new().origin(origin);
        if let Some(scope) = scope {
            builder = builder.namespace_scope(scope);
        }
        builder.build().expect("valid config")
    }

    // =============================================================================
    // REPLICATION
    // =============================================================================

    /// A remote event is indistinguishable from a local one.
    #[test]
    fn test_remote_event_matches_local_event() {
        let hub = BroadcastHub::new();
        let buses = contexts(&hub, 2);
        let (a, b) = (&buses[0], &buses[1]);

        let mut local = a.listen(&cart(), Channel::Live);
        let mut remote = b.listen(&cart(), Channel::Live);

        let update = CartUpdated {
            items: 2,
            total_cents: 1_999,
        };
        a.publish(&cart(), &update);

        assert_eq!(local.drain(), vec![Some(update.clone())]);
        assert_eq!(remote.drain(), vec![Some(update)]);
    }

    /// The empty sentinel crosses contexts as `data: null`.
    #[test]
    fn test_empty_event_replicates() {
        let hub = BroadcastHub::new();
        let buses = contexts(&hub, 2);
        let logout: Topic<String> = Topic::new("user.logout");

        let mut remote = buses[1].listen(&logout, Channel::Live);
        buses[0].publish_empty(&logout);

        assert_eq!(remote.try_recv(), Ok(None));
        assert_eq!(remote.try_recv(), Err(SubscriptionError::Empty));
    }

    /// With three contexts each receiver sees the event once and nobody
    /// re-posts it.
    #[test]
    fn test_received_events_are_not_relayed() {
        let hub = BroadcastHub::new();
        let buses = contexts(&hub, 3);
        let topic: Topic<u32> = Topic::new("counter");

        let mut in_b = buses[1].listen(&topic, Channel::Live);
        let mut in_c = buses[2].listen(&topic, Channel::Live);
        let mut echo = buses[0].listen(&topic, Channel::Live);

        buses[0].publish(&topic, &1);

        assert_eq!(in_b.drain(), vec![Some(1)]);
        assert_eq!(in_c.drain(), vec![Some(1)]);
        // Local delivery only; the sender is never sent its own frame.
        assert_eq!(echo.drain(), vec![Some(1)]);

        assert_eq!(buses[0].stats().bridge.sent, 1);
        for receiver in &buses[1..] {
            let stats = receiver.stats().bridge;
            assert_eq!(stats.sent, 0);
            assert_eq!(stats.received, 1);
        }
    }

    /// A publish made from inside a remote delivery is broadcast normally,
    /// so request/reply across contexts works.
    #[test]
    fn test_reply_from_remote_handler() {
        let hub = BroadcastHub::new();
        let buses = contexts(&hub, 2);
        let ping: Topic<u32> = Topic::new("ping");
        let pong: Topic<u32> = Topic::new("pong");

        let responder = buses[1].clone();
        let pong_out = pong.clone();
        let _sub = buses[1].subscribe(&ping, Channel::Live, move |n: Option<u32>| {
            if let Some(n) = n {
                responder.publish(&pong_out, &(n + 1));
            }
        });
        let mut replies = buses[0].listen(&pong, Channel::Live);

        buses[0].publish(&ping, &41);
        assert_eq!(replies.drain(), vec![Some(42)]);
    }

    /// Events from one context arrive in publish order everywhere.
    #[test]
    fn test_order_is_preserved_across_contexts() {
        let hub = BroadcastHub::new();
        let buses = contexts(&hub, 2);
        let topic: Topic<u32> = Topic::new("seq");

        let mut remote = buses[1].listen(&topic, Channel::Live);
        for n in 0..50 {
            buses[0].publish(&topic, &n);
        }

        let received: Vec<u32> = remote.drain().into_iter().flatten().collect();
        assert_eq!(received, (0..50).collect::<Vec<_>>());
    }

    // =============================================================================
    // BROADCAST FLAG
    // =============================================================================

    #[test]
    fn test_local_only_publish_stays_local() {
        let hub = BroadcastHub::new();
        let buses = contexts(&hub, 2);
        let topic: Topic<u32> = Topic::new("draft");

        let mut local = buses[0].listen(&topic, Channel::Live);
        let mut remote = buses[1].listen(&topic, Channel::Live);

        buses[0].publish_with(&topic, &7, PublishOptions::local_only());

        assert_eq!(local.drain(), vec![Some(7)]);
        assert_eq!(remote.try_recv(), Err(SubscriptionError::Empty));
        assert_eq!(buses[0].stats().bridge.sent, 0);
    }

    /// Options objects passed through the compatibility path reach the bridge.
    #[test]
    fn test_dynamic_options_disable_broadcast() {
        let hub = BroadcastHub::new();
        let buses = contexts(&hub, 2);
        let topic: Topic<Value> = Topic::new("settings");

        let mut remote = buses[1].listen(&topic, Channel::Live);
        buses[0].publish_dynamic(&topic, Some(json!({"broadcast": false})), None);
        buses[0].publish_dynamic(&topic, Some(json!({"theme": "dark"})), None);

        assert_eq!(remote.drain(), vec![Some(json!({"theme": "dark"}))]);
    }

    // =============================================================================
    // HISTORICAL REPLAY
    // =============================================================================

    #[test]
    fn test_historical_event_replayed_in_receiving_context() {
        let hub = BroadcastHub::new();
        let buses = contexts(&hub, 2);
        let login: Topic<String> = Topic::new("user.login");

        buses[0].publish_with(&login, &"ada".to_string(), PublishOptions::historical());

        assert_eq!(
            buses[1].retained(Channel::Historical),
            Some(Envelope::new("user.login", Some(json!("ada"))))
        );

        // Subscribed after the event arrived.
        let mut late = buses[1].listen(&login, Channel::Historical);
        assert_eq!(late.try_recv(), Ok(Some("ada".to_string())));
    }

    #[test]
    fn test_bind_follows_remote_events() {
        #[derive(Default)]
        struct Header {
            user: Option<String>,
        }

        let hub = BroadcastHub::new();
        let buses = contexts(&hub, 2);
        let login: Topic<String> = Topic::new("user.login");
        let header = Arc::new(Mutex::new(Header::default()));

        let _binding = buses[1].bind(
            &header,
            |h: &mut Header| &mut h.user,
            &login,
            Channel::Historical,
        );
        // Nothing published yet: the sentinel clears the field.
        assert_eq!(header.lock().user, None);

        buses[0].publish_with(&login, &"grace".to_string(), PublishOptions::historical());
        assert_eq!(header.lock().user.as_deref(), Some("grace"));
    }

    // =============================================================================
    // ISOLATION
    // =============================================================================

    #[test]
    fn test_different_origins_are_isolated() {
        let hub = BroadcastHub::new();
        let a = EventBus::connect(scoped("https://shop.example", None), &hub).unwrap();
        let b = EventBus::connect(scoped("https://blog.example", None), &hub).unwrap();
        let topic: Topic<u32> = Topic::new("k");

        let mut in_b = b.listen(&topic, Channel::Live);
        a.publish(&topic, &1);
        assert_eq!(in_b.try_recv(), Err(SubscriptionError::Empty));
    }

    #[test]
    fn test_same_origin_ignores_path() {
        let hub = BroadcastHub::new();
        let a = EventBus::connect(scoped("https://shop.example/cart", None), &hub).unwrap();
        let b = EventBus::connect(scoped("HTTPS://Shop.Example/checkout", None), &hub).unwrap();
        let topic: Topic<u32> = Topic::new("k");

        let mut in_b = b.listen(&topic, Channel::Live);
        a.publish(&topic, &1);
        assert_eq!(in_b.drain(), vec![Some(1)]);
    }

    #[test]
    fn test_scoped_buses_are_isolated() {
        let hub = BroadcastHub::new();
        let app = EventBus::connect(scoped("https://app.example", None), &hub).unwrap();
        let tools_a =
            EventBus::connect(scoped("https://app.example", Some("devtools")), &hub).unwrap();
        let tools_b =
            EventBus::connect(scoped("https://app.example", Some("devtools")), &hub).unwrap();
        let topic: Topic<u32> = Topic::new("k");

        let mut in_app = app.listen(&topic, Channel::Live);
        let mut in_tools = tools_b.listen(&topic, Channel::Live);

        tools_a.publish(&topic, &5);
        assert_eq!(in_tools.drain(), vec![Some(5)]);
        assert_eq!(in_app.try_recv(), Err(SubscriptionError::Empty));
    }

    // =============================================================================
    // LIFECYCLE
    // =============================================================================

    #[test]
    fn test_dropped_context_leaves_namespace() {
        let hub = BroadcastHub::new();
        let mut buses = contexts(&hub, 3);
        let namespace = buses[0].namespace().unwrap().to_string();
        assert_eq!(hub.endpoint_count(&namespace), 3);

        buses.pop();
        assert_eq!(hub.endpoint_count(&namespace), 2);

        let topic: Topic<u32> = Topic::new("k");
        let mut in_b = buses[1].listen(&topic, Channel::Live);
        buses[0].publish(&topic, &9);
        assert_eq!(in_b.drain(), vec![Some(9)]);
        assert_eq!(buses[0].stats().bridge.failed, 0);
    }

    #[test]
    fn test_instances_on_one_hub_keep_separate_state() {
        let hub = BroadcastHub::new();
        let buses = contexts(&hub, 2);
        let topic: Topic<u32> = Topic::new("k");

        buses[0].publish_with(&topic, &1, PublishOptions::historical().with_broadcast(false));

        assert!(buses[0].retained(Channel::Historical).is_some());
        assert_eq!(buses[1].retained(Channel::Historical), None);
        assert_eq!(buses[1].stats().published, 0);
    }

    #[tokio::test]
    async fn test_remote_events_stream_to_async_consumer() {
        let hub = BroadcastHub::new();
        let buses = contexts(&hub, 2);
        let topic: Topic<u32> = Topic::new("ticks");

        let mut stream = buses[1].listen(&topic, Channel::Live);
        let publisher = buses[0].clone();
        let producer = tokio::spawn(async move {
            for n in 1..=3 {
                publisher.publish(&topic, &n);
            }
        });
        producer.await.expect("producer task");

        let mut seen = Vec::new();
        while seen.len() < 3 {
            let item = timeout(Duration::from_secs(1), stream.next())
                .await
                .expect("event within timeout")
                .expect("stream open");
            seen.push(item);
        }
        assert_eq!(seen, vec![Some(1), Some(2), Some(3)]);
    }
}
