/// app name
pub const APP_NAME: &str = "send2tv-rs";

/// app version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// thread stack size for the server and producer threads
pub const THREAD_STACK: usize = 4 * 1024 * 1024;

/// SSDP multicast group and port
pub const SSDP_ADDR: &str = "239.255.255.250:1900";

/// the device type we search for
pub const MEDIA_RENDERER_URN: &str = "urn:schemas-upnp-org:device:MediaRenderer:1";

/// AVTransport service type
pub const AV_TRANSPORT_URN: &str = "urn:schemas-upnp-org:service:AVTransport:1";

/// ConnectionManager service type
pub const CONNECTION_MANAGER_URN: &str = "urn:schemas-upnp-org:service:ConnectionManager:1";

/// port used to pick the local interface that routes to the TV
pub const ROUTE_PROBE_PORT: u16 = 9197;

/// path prefix served by the media server
pub const MEDIA_PATH: &str = "/media";

/// chunk size for file and pipe transfers
pub const IO_BUFFER_SIZE: usize = 65536;

/// tick of the interactive playback loop
pub const PLAYBACK_TICK_MS: u64 = 500;

/// the http server looks for a new connection and its shutdown flag this often
pub const SERVER_POLL_MS: u64 = 50;

/// a request head must fit in this many bytes
pub const REQUEST_BUFFER_SIZE: usize = 4096;

/// how long a client gets to send its request head
pub const REQUEST_TIMEOUT_MS: u64 = 5000;

/// after answering, input still arriving from the client is drained this long before closing
pub const CLOSE_LINGER_MS: u64 = 250;
