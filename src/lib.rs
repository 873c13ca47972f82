pub mod enums {
    pub mod errors;
    pub mod media;
    pub mod messages;
}
pub mod globals {
    pub mod statics;
}
pub mod utils {
    pub mod cancel;
    pub mod commandline;
    pub mod configuration;
    pub mod escape;
    pub mod http;
    pub mod local_ip_address;
    pub mod pipestream;
    pub mod traits;
    pub mod ui_logger;
}
pub mod dlna {
    pub mod compat;
    pub mod features;
}
pub mod upnp {
    pub mod avtransport;
    pub mod discovery;
    pub mod locator;
}
pub mod server {
    pub mod media_request;
    pub mod media_server;
}
pub mod media {
    pub mod descriptor;
    pub mod probe;
    pub mod producer;
}
pub mod session {
    pub mod controller;
    pub mod runner;
}
