// mh-test-utils: Shared test utilities for the fabric suites.
//
// Provides mock TCP, UDP and WebSocket clients plus a JWT helper for
// integration testing of the progress bus, notification bus and chat hub.

pub mod mock_tcp_client;
pub mod mock_udp_client;
pub mod mock_ws_client;

pub use mock_tcp_client::MockTcpClient;
pub use mock_udp_client::MockUdpClient;
pub use mock_ws_client::MockWsClient;

/// Shared secret used by the test suites.
pub const TEST_JWT_SECRET: &str = "test-fabric-secret";

/// Issue a one-hour handshake token for the test secret.
pub fn test_token(user_id: &str, username: &str) -> String {
    mh_auth::issue_token(user_id, username, 3600, TEST_JWT_SECRET)
}
