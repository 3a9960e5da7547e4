//! Custom peer-router decisions (spec.md §4.2): pure functions over
//! peer tag state and backoff schedules, kept free of any live `Swarm`
//! so they're directly unit-testable.

use std::time::Duration;

/// What the router should do for a lookup request on a given peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDecision {
    /// Peer isn't tagged as a discovered rendezvous counterpart: return
    /// immediately with no addresses, spending no DHT query on it.
    NoQuery,
    /// Peer is tagged: query the DHT with the given per-attempt timeout.
    Query { timeout: Duration },
}

/// Deadline for a single tagged-peer DHT lookup attempt (spec.md §5).
pub const DHT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Decides how to route an address lookup for a peer, given whether
/// it's been tagged as the rendezvous counterpart.
pub fn route(tagged: bool) -> RouteDecision {
    if tagged {
        RouteDecision::Query {
            timeout: DHT_LOOKUP_TIMEOUT,
        }
    } else {
        RouteDecision::NoQuery
    }
}

/// Exponential backoff with no jitter, used by the peer-source task
/// between empty DHT responses: 1s -> 6s, factor 2, capped (spec.md
/// §4.2 "Peer-source contract").
pub fn peer_source_backoff(current: Duration) -> Duration {
    let next = current * 2;
    next.min(Duration::from_secs(6))
}

/// Exponential backoff with full jitter, used by `OpenStream`: 100ms ->
/// 3s, factor sqrt(2) (spec.md §4.2 "Opening a protocol stream").
pub fn open_stream_backoff(attempt: u32) -> Duration {
    const BASE_MS: f64 = 100.0;
    const CAP_MS: f64 = 3000.0;
    const FACTOR: f64 = std::f64::consts::SQRT_2;
    let scaled = BASE_MS * FACTOR.powi(attempt as i32);
    let capped = scaled.min(CAP_MS);
    let jittered = rand::random::<f64>() * capped;
    Duration::from_millis(jittered as u64)
}

/// Decides whether a discovered candidate is a valid match for the
/// identifier the user supplied (spec.md §4.2 "Finding", §8 "Topic
/// filter"): accepted iff the candidate's hashed node ID ends with it.
pub fn is_valid_peer(candidate_node_id: &crate::identity::NodeId, identifier: &str) -> bool {
    candidate_node_id.matches_identifier(identifier)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untagged_peers_skip_the_dht() {
        assert_eq!(route(false), RouteDecision::NoQuery);
    }

    #[test]
    fn tagged_peers_query_with_deadline() {
        match route(true) {
            RouteDecision::Query { timeout } => assert_eq!(timeout, DHT_LOOKUP_TIMEOUT),
            RouteDecision::NoQuery => panic!("expected a query decision"),
        }
    }

    #[test]
    fn peer_source_backoff_doubles_and_caps() {
        let mut backoff = Duration::from_secs(1);
        backoff = peer_source_backoff(backoff);
        assert_eq!(backoff, Duration::from_secs(2));
        backoff = peer_source_backoff(backoff);
        assert_eq!(backoff, Duration::from_secs(4));
        backoff = peer_source_backoff(backoff);
        assert_eq!(backoff, Duration::from_secs(6));
        backoff = peer_source_backoff(backoff);
        assert_eq!(backoff, Duration::from_secs(6));
    }

    #[test]
    fn open_stream_backoff_never_exceeds_cap() {
        for attempt in 0..20 {
            let d = open_stream_backoff(attempt);
            assert!(d <= Duration::from_millis(3000));
        }
    }

    #[test]
    fn topic_filter_matches_suffix_only() {
        let id = crate::identity::NodeId::from_public_key_bytes(b"router test key");
        let full = id.to_base58();
        assert!(is_valid_peer(&id, &full));
        assert!(!is_valid_peer(&id, "not-a-real-suffix"));
    }
}
