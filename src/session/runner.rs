use crate::{
    enums::{
        errors::{ResolveError, SessionError},
        messages::UserCommand,
    },
    media::{probe::Ffprobe, producer::FfmpegFactory},
    server::media_server::MediaServer,
    session::controller::{PlaybackSession, PlaybackTarget, SessionOptions, SessionState},
    upnp::{
        avtransport::AvTransport,
        discovery::{DiscoveredRenderer, discover},
        locator::{RendererAddress, locate_transport},
    },
    utils::{
        cancel::CancelToken,
        configuration::Configuration,
        http::HttpClient,
        local_ip_address::{get_local_addr, get_local_addr_for},
        ui_logger::{LogCategory, ui_log},
    },
};
use crossbeam_channel::Receiver;
use log::debug;
use std::{
    io,
    net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs},
    time::Duration,
};

/// the configured local address, if it is a valid one
fn configured_local_addr(config: &Configuration) -> Option<IpAddr> {
    config
        .last_network
        .as_deref()
        .and_then(|ip| ip.trim().parse().ok())
}

/// resolve the renderer host to an address
fn resolve_host(host: &str) -> Result<IpAddr, ResolveError> {
    if let Ok(ip) = host.parse() {
        return Ok(ip);
    }
    let no_route = |source| ResolveError::NoRoute {
        host: host.to_string(),
        source,
    };
    (host, 0)
        .to_socket_addrs()
        .map_err(no_route)?
        .next()
        .map(|addr| addr.ip())
        .ok_or_else(|| no_route(io::Error::new(io::ErrorKind::NotFound, "no address")))
}

/// SSDP discovery with the configured search window
pub fn discover_renderers(config: &Configuration) -> io::Result<Vec<DiscoveredRenderer>> {
    let client = HttpClient::new(Duration::from_secs(config.soap_timeout_secs));
    discover(
        &client,
        configured_local_addr(config),
        config.discovery_timeout_secs,
    )
}

/// resolve `renderer`, then play `target` on it until done, quit or cancelled
pub fn run_session(
    config: &Configuration,
    renderer: &str,
    target: PlaybackTarget,
    commands: Receiver<UserCommand>,
    cancel: CancelToken,
) -> Result<(), SessionError> {
    debug!("session {:?} -> {:?}", SessionState::Idle, SessionState::Resolving);
    let address = RendererAddress::parse(renderer)?;
    let remote = resolve_host(&address.host)?;
    let local_addr = match configured_local_addr(config) {
        Some(local) => local,
        // no route lookup possible, fall back to the default interface
        None => get_local_addr_for(remote).or_else(|e| get_local_addr().map_err(|_| e))?,
    };
    let client = HttpClient::new(Duration::from_secs(config.soap_timeout_secs));
    let handle = locate_transport(&client, &address, local_addr)?;
    ui_log(
        LogCategory::Info,
        &format!(
            "Renderer {} found, control url {}",
            address.host,
            handle.control_url(&handle.av_control_path)
        ),
    );
    let transport = AvTransport::new(handle, client);
    let factory = FfmpegFactory::new(&config.ffmpeg_path, config.screen.clone());
    let probe = Ffprobe::new(&config.ffprobe_path);
    let options = SessionOptions {
        local_addr,
        codec_choice: config.transcode_codec,
        force_transcode: config.force_transcode,
    };
    let any: IpAddr = match local_addr {
        IpAddr::V4(_) => Ipv4Addr::UNSPECIFIED.into(),
        IpAddr::V6(_) => Ipv6Addr::UNSPECIFIED.into(),
    };
    let bind = SocketAddr::new(any, config.server_port);
    let mut session = PlaybackSession::new(&transport, &factory, &probe, options, commands, cancel);
    session.run(target, |slot| MediaServer::start(bind, slot))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ip_literals_resolve_to_themselves() {
        assert_eq!(
            resolve_host("192.168.1.20").unwrap(),
            "192.168.1.20".parse::<IpAddr>().unwrap()
        );
        assert_eq!(resolve_host("::1").unwrap(), "::1".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn configured_network_overrides() {
        let mut config = Configuration::new();
        assert_eq!(configured_local_addr(&config), None);
        config.last_network = Some("10.0.0.5".to_string());
        assert_eq!(
            configured_local_addr(&config),
            Some("10.0.0.5".parse().unwrap())
        );
        config.last_network = Some("not an address".to_string());
        assert_eq!(configured_local_addr(&config), None);
    }

    #[test]
    fn unreachable_renderer() {
        let mut config = Configuration::new();
        config.soap_timeout_secs = 1;
        let (_tx, rx) = crossbeam_channel::unbounded();
        // nothing listens on the loopback candidate ports
        let result = run_session(
            &config,
            "127.0.0.1",
            PlaybackTarget::Files(vec!["movie.mp4".into()]),
            rx,
            CancelToken::new(),
        );
        match result {
            Err(e) => assert_eq!(e.to_string(), "Cannot reach TV at 127.0.0.1. Is it turned on?"),
            Ok(()) => panic!("located a renderer on loopback"),
        }
    }
}
