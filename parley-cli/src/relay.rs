//! Maps the loaded configuration onto router settings.

use parley_core::{Config, DeliveryMode};
use parley_net::server::{DeliveryPolicy, RouterConfig};

pub fn router_config(config: &Config) -> RouterConfig {
    let delivery = match config.delivery() {
        DeliveryMode::Evict => DeliveryPolicy::EvictOnBlock,
        DeliveryMode::Retry => DeliveryPolicy::Retry {
            max_cycles: config.retry_cycles(),
        },
    };
    RouterConfig {
        poll_timeout: config.poll_timeout(),
        delivery,
    }
}

/// `host:port` for binding or connecting.
pub fn socket_address(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}
