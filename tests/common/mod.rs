#![allow(dead_code)]
#![allow(clippy::expect_used)]

use cloud_exporter::collectors::config::CollectorConfig;
use cloud_exporter::portscan::StaticTargets;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Find an available port for testing (returns port > 1024)
pub fn get_available_port() -> u16 {
    use std::net::TcpListener;

    // Bind to port 0 lets the OS assign an available ephemeral port
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind to random port");
    let port = listener
        .local_addr()
        .expect("Failed to get local addr")
        .port();

    assert!(port > 1024, "Assigned port {port} should be > 1024");

    port
}

/// Wait for server to be ready on the given port
///
/// # Arguments
/// * `port` - The port number to connect to (should be > 1024)
/// * `max_attempts` - Maximum number of connection attempts (e.g., 50 = 5 seconds at 100ms intervals)
pub async fn wait_for_server(port: u16, max_attempts: u32) -> bool {
    use tokio::time::sleep;

    for attempt in 1..=max_attempts {
        if tokio::net::TcpStream::connect(("127.0.0.1", port))
            .await
            .is_ok()
        {
            return true;
        }

        if attempt % 10 == 0 {
            eprintln!("Still waiting for server on port {port} (attempt {attempt}/{max_attempts})");
        }

        sleep(Duration::from_millis(100)).await;
    }

    eprintln!("Failed to connect to server on port {port} after {max_attempts} attempts");
    false
}

/// Get base URL for test server
pub fn get_test_url(port: u16) -> String {
    format!("http://127.0.0.1:{port}")
}

/// Start the exporter in-process on 127.0.0.1 and wait until it accepts
/// connections.
pub async fn spawn_exporter(
    config: CollectorConfig,
    targets: StaticTargets,
) -> (u16, JoinHandle<anyhow::Result<()>>) {
    let port = get_available_port();

    let handle = tokio::spawn(async move {
        cloud_exporter::exporter::new(port, Some("127.0.0.1".to_string()), config, targets).await
    });

    assert!(wait_for_server(port, 50).await, "Server failed to start");

    (port, handle)
}

/// Poll `url` until it answers with `status` or the attempts run out.
pub async fn wait_for_status(url: &str, status: u16, max_attempts: u32) -> bool {
    let client = reqwest::Client::new();

    for _ in 0..max_attempts {
        if let Ok(response) = client.get(url).send().await
            && response.status().as_u16() == status
        {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    false
}

/// A local TCP listener standing in for an open port on a target.
pub async fn open_port() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind listener");
    let port = listener.local_addr().expect("Failed to get local addr").port();
    (listener, port)
}
