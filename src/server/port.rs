use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, warn};

pub const DEFAULT_PORT: u16 = 1993;
const MAX_PORT_ATTEMPTS: u16 = 100;

/// Probes ports sequentially from `start_port` and returns the first one
/// that can be bound locally. The probe listener is dropped right away.
/// When the whole range is busy the start port is returned unchanged and
/// the caller finds out when the real bind fails.
pub async fn find_available_port(start_port: u16) -> u16 {
    for port in start_port..start_port.saturating_add(MAX_PORT_ATTEMPTS) {
        match TcpListener::bind(("127.0.0.1", port)).await {
            Ok(_) => {
                debug!(port, "found available port");
                return port;
            }
            Err(_) => {
                debug!(port, "port in use, trying next");
            }
        }
    }

    warn!(
        start_port,
        attempts = MAX_PORT_ATTEMPTS,
        "no available port in range, falling back to start port"
    );
    start_port
}

/// Whether something is accepting TCP connections on the local port.
pub async fn is_port_reachable(port: u16, timeout: Duration) -> bool {
    matches!(
        tokio::time::timeout(timeout, TcpStream::connect(("127.0.0.1", port))).await,
        Ok(Ok(_))
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_find_available_port_skips_occupied() {
        let base = 29380;
        let _occupied = TcpListener::bind(("127.0.0.1", base)).await.unwrap();

        let port = find_available_port(base).await;
        assert!(port > base);
        assert!(port < base + MAX_PORT_ATTEMPTS);

        // The returned port really is bindable.
        let listener = TcpListener::bind(("127.0.0.1", port)).await;
        assert!(listener.is_ok());
    }

    #[test]
    fn test_reachability_probe() {
        tokio_test::block_on(async {
            let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
            let port = listener.local_addr().unwrap().port();

            assert!(is_port_reachable(port, Duration::from_secs(2)).await);
            drop(listener);
            assert!(!is_port_reachable(port, Duration::from_secs(2)).await);
        });
    }
}
