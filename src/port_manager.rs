use std::net::{SocketAddr, TcpListener};

use tracing::{info, warn};

use crate::error::SupervisorError;

/// Conventional base port for the backend; the search walks upwards from
/// here, matching where users expect the Winery to show up.
pub const BASE_PORT: u16 = 8000;

const MAX_ATTEMPTS: u16 = 1000;

/// Find an available TCP port, searching sequentially from `start_port`.
pub fn find_available_port(start_port: u16) -> Result<u16, SupervisorError> {
    let mut attempts = 0;
    for offset in 0..MAX_ATTEMPTS {
        let Some(port) = start_port.checked_add(offset) else {
            break;
        };
        attempts += 1;
        if is_port_available(port) {
            info!("Found available port: {}", port);
            return Ok(port);
        }
    }

    warn!(
        "Could not find an available port starting from {} after {} attempts",
        start_port, attempts
    );
    Err(SupervisorError::NoPortAvailable {
        start_port,
        attempts,
    })
}

/// Check if a specific port is available by binding to it. The listener is
/// dropped immediately, freeing the port for the backend to claim.
fn is_port_available(port: u16) -> bool {
    // Bind 0.0.0.0, which is what the Jetty server inside the backend uses
    TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], port))).is_ok()
}
