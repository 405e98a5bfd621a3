//! Communicator configuration, loadable from a TOML file the same way the
//! source codebase's middleware configuration was.

use std::error::Error;
use std::fs::File;
use std::io::prelude::*;
use std::time::Duration;

/// Wrapper for the socket communication policy's configuration.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Configuration {
    /// Stack size of spawned acceptor/reader threads, in bytes.
    pub thread_stack_size: usize,

    /// First port the data endpoint tries to bind. If taken, the next free
    /// port is used instead.
    pub data_port_base: u16,

    /// First port the control endpoint tries to bind.
    pub control_port_base: u16,

    /// How many ports past the base to try before giving up with `BindFailed`.
    pub port_search_window: u16,

    /// Size of the initial ("global") context. Must match on every peer.
    pub context_size: usize,

    /// Name of the initial context, used to request a context id from signaling.
    pub context_name: String,

    /// URI of the signaling service, e.g. `"127.0.0.1:7000"`.
    pub signaling_uri: String,

    /// High-water mark, in bytes, for the inbox (PEER/SPLIT messages).
    pub max_inbox_bytes: usize,

    /// High-water mark, in bytes, for the control box (CONFIRM messages).
    pub max_ctrlbox_bytes: usize,

    /// Period of the message box's periodic condition-variable wake, in
    /// milliseconds. Kept at or below 100ms per the message box contract.
    pub event_poll_interval_ms: u64,
}

impl Default for Configuration {
    fn default() -> Self {
        Configuration {
            thread_stack_size: 2 * 1024 * 1024,
            data_port_base: 6000,
            control_port_base: 6100,
            port_search_window: 256,
            context_size: 1,
            context_name: "global".to_string(),
            signaling_uri: "127.0.0.1:7000".to_string(),
            max_inbox_bytes: 64 * 1024 * 1024,
            max_ctrlbox_bytes: 16 * 1024 * 1024,
            event_poll_interval_ms: 50,
        }
    }
}

impl Configuration {
    pub fn event_poll_interval(&self) -> Duration {
        Duration::from_millis(self.event_poll_interval_ms)
    }
}

/// Reads the communicator configuration from a TOML file.
///
/// # Arguments
///
/// `configuration_file_path` - path to the TOML configuration file.
pub fn read_configuration_file(
    configuration_file_path: &str,
) -> Result<Configuration, Box<dyn Error>> {
    let mut configuration_string = String::new();
    let mut file = File::open(configuration_file_path)?;

    file.read_to_string(&mut configuration_string)?;
    let configuration: Configuration = toml::from_str(&configuration_string)?;

    Ok(configuration)
}
