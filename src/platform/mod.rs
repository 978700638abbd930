// Platform-specific code module

pub mod dns;
pub mod gateway;
pub mod interfaces;
pub mod wifi;

// Re-exports para imports limpios
pub use dns::dns_servers;
pub use gateway::detect_default_gateway;
pub use interfaces::{is_virtual_interface, name_matches};
pub use wifi::wifi_signal_percent;
