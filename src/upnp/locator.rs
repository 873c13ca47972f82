use crate::{
    enums::errors::ResolveError,
    upnp::avtransport::{RendererHandle, normalize_control_path},
    utils::{escape::xml_extract_after, http::HttpClient},
};
use ecow::EcoString;
use log::{debug, info, warn};
use std::net::IpAddr;
use url::Url;

/// description documents of common renderer control servers, tried in this order
pub const CANDIDATE_ENDPOINTS: [(u16, &str); 5] = [
    (9197, "/dmr"),
    (7676, "/dmr"),
    (8001, "/dmr"),
    (9197, "/dmr/SamsungMRDesc.xml"),
    (7676, "/xml/device_description.xml"),
];

/// a renderer as given by the user: a host, optionally with its description url
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RendererAddress {
    pub host: EcoString,
    pub description: Option<(u16, String)>,
}

impl RendererAddress {
    /// accept `192.168.1.20`, `tv.local` or `http://192.168.1.20:9197/dmr`
    pub fn parse(s: &str) -> Result<RendererAddress, ResolveError> {
        let s = s.trim();
        if s.starts_with("http://") {
            let url = Url::parse(s).map_err(|_| ResolveError::InvalidHost(s.to_string()))?;
            let host = match url.host() {
                Some(url::Host::Ipv6(addr)) => addr.to_string(),
                Some(host) => host.to_string(),
                None => return Err(ResolveError::InvalidHost(s.to_string())),
            };
            let port = url.port_or_known_default().unwrap_or(80);
            let path = match url.query() {
                Some(q) => format!("{}?{q}", url.path()),
                None => url.path().to_string(),
            };
            return Ok(RendererAddress {
                host: host.into(),
                description: Some((port, path)),
            });
        }
        if s.is_empty() || s.contains('/') {
            return Err(ResolveError::InvalidHost(s.to_string()));
        }
        Ok(RendererAddress {
            host: s.into(),
            description: None,
        })
    }
}

/// control paths of the AVTransport and (if any) ConnectionManager services.
/// Each `<controlURL>` is searched from the first mention of its service, so the
/// control url of another service block is never picked up.
#[must_use]
pub fn control_paths(description: &str) -> Option<(String, Option<String>)> {
    if !description.contains("AVTransport") {
        return None;
    }
    let av = xml_extract_after(description, "AVTransport", "<controlURL>", "</controlURL>")?;
    let cm = xml_extract_after(
        description,
        "ConnectionManager",
        "<controlURL>",
        "</controlURL>",
    )
    .filter(|p| !p.trim().is_empty())
    .map(normalize_control_path);
    Some((normalize_control_path(av), cm))
}

/// find the renderer's AVTransport control endpoint
pub fn locate_transport(
    client: &HttpClient,
    address: &RendererAddress,
    local_addr: IpAddr,
) -> Result<RendererHandle, ResolveError> {
    let candidates = address
        .description
        .iter()
        .map(|(port, path)| (*port, path.as_str()))
        .chain(CANDIDATE_ENDPOINTS.iter().copied());
    first_transport(client, &address.host, candidates, local_addr)
}

/// try the description documents in order. The first one that names the
/// AVTransport service decides, even when it has no usable control url.
fn first_transport<'a>(
    client: &HttpClient,
    host: &EcoString,
    candidates: impl Iterator<Item = (u16, &'a str)>,
    local_addr: IpAddr,
) -> Result<RendererHandle, ResolveError> {
    let url_host = if host.contains(':') {
        format!("[{host}]")
    } else {
        host.to_string()
    };
    for (port, path) in candidates {
        let url = format!("http://{url_host}:{port}{path}");
        let description = match client.get(&url) {
            Ok(description) => description,
            Err(e) => {
                debug!("{e}");
                continue;
            }
        };
        if !description.contains("AVTransport") {
            debug!("{url}: no AVTransport service");
            continue;
        }
        let Some((av_control_path, cm_control_path)) = control_paths(&description) else {
            warn!("{url}: AVTransport service without a control url");
            break;
        };
        info!("AVTransport of {host} at port {port}, control {av_control_path}");
        return Ok(RendererHandle {
            host: host.clone(),
            port,
            av_control_path,
            cm_control_path,
            local_addr,
        });
    }
    Err(ResolveError::NoTransport {
        host: host.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{thread, time::Duration};

    static DESCRIPTION: &str = r#"<?xml version="1.0"?>
<root xmlns="urn:schemas-upnp-org:device-1-0">
<device>
<deviceType>urn:schemas-upnp-org:device:MediaRenderer:1</deviceType>
<friendlyName>[TV] Living Room</friendlyName>
<serviceList>
<service>
<serviceType>urn:schemas-upnp-org:service:RenderingControl:1</serviceType>
<controlURL>/upnp/control/RenderingControl1</controlURL>
</service>
<service>
<serviceType>urn:schemas-upnp-org:service:ConnectionManager:1</serviceType>
<controlURL>upnp/control/ConnectionManager1</controlURL>
</service>
<service>
<serviceType>urn:schemas-upnp-org:service:AVTransport:1</serviceType>
<controlURL>/upnp/control/AVTransport1</controlURL>
</service>
</serviceList>
</device>
</root>"#;

    #[test]
    fn control_path_from_its_own_service_block() {
        let (av, cm) = control_paths(DESCRIPTION).unwrap();
        assert_eq!(av, "/upnp/control/AVTransport1");
        assert_eq!(cm.as_deref(), Some("/upnp/control/ConnectionManager1"));
    }

    #[test]
    fn documents_without_av_transport() {
        assert_eq!(control_paths("<root><device/></root>"), None);
        // service mentioned but no control url after it
        assert_eq!(
            control_paths("<controlURL>/rc</controlURL><serviceType>AVTransport</serviceType>"),
            None
        );
    }

    #[test]
    fn renderer_addresses() {
        let a = RendererAddress::parse("192.168.1.20").unwrap();
        assert_eq!(a.host, "192.168.1.20");
        assert_eq!(a.description, None);
        let a = RendererAddress::parse("http://192.168.1.20:9197/dmr").unwrap();
        assert_eq!(a.host, "192.168.1.20");
        assert_eq!(a.description, Some((9197, "/dmr".to_string())));
        let a = RendererAddress::parse("http://[fe80::1]:7676/xml/device_description.xml").unwrap();
        assert_eq!(a.host, "fe80::1");
        assert!(RendererAddress::parse("").is_err());
        assert!(RendererAddress::parse("192.168.1.20/dmr").is_err());
    }

    #[test]
    fn locate_from_description_url() {
        let server = tiny_http::Server::http("127.0.0.1:0").unwrap();
        let port = server.server_addr().to_ip().unwrap().port();
        let handle = thread::spawn(move || {
            if let Ok(Some(rq)) = server.recv_timeout(Duration::from_secs(5)) {
                let _ = rq.respond(tiny_http::Response::from_string(DESCRIPTION));
            }
        });
        let address = RendererAddress::parse(&format!("http://127.0.0.1:{port}/dmr")).unwrap();
        let client = HttpClient::new(Duration::from_secs(2));
        let renderer =
            locate_transport(&client, &address, "127.0.0.1".parse().unwrap()).unwrap();
        handle.join().unwrap();
        assert_eq!(renderer.port, port);
        assert_eq!(renderer.av_control_path, "/upnp/control/AVTransport1");
        assert_eq!(
            renderer.control_url(&renderer.av_control_path),
            format!("http://127.0.0.1:{port}/upnp/control/AVTransport1")
        );
    }

    #[test]
    fn first_document_naming_the_service_decides() {
        let server = tiny_http::Server::http("127.0.0.1:0").unwrap();
        let port = server.server_addr().to_ip().unwrap().port();
        let handle = thread::spawn(move || {
            let mut urls = Vec::new();
            while let Ok(Some(rq)) = server.recv_timeout(Duration::from_secs(1)) {
                urls.push(rq.url().to_string());
                let body = match rq.url() {
                    "/no-service" => "<root><device><friendlyName>x</friendlyName></device></root>",
                    "/no-control" => "<serviceType>urn:schemas-upnp-org:service:AVTransport:1</serviceType>",
                    _ => DESCRIPTION,
                };
                let _ = rq.respond(tiny_http::Response::from_string(body));
            }
            urls
        });
        let client = HttpClient::new(Duration::from_secs(2));
        let host: EcoString = "127.0.0.1".into();
        let candidates = [(port, "/no-service"), (port, "/no-control"), (port, "/dmr")];
        let result = first_transport(
            &client,
            &host,
            candidates.iter().copied(),
            "127.0.0.1".parse().unwrap(),
        );
        match result {
            Err(ResolveError::NoTransport { host }) => assert_eq!(host, "127.0.0.1"),
            other => panic!("unexpected {other:?}"),
        }
        // a document without the service is skipped, the good one is never asked for
        assert_eq!(handle.join().unwrap(), vec!["/no-service", "/no-control"]);
    }
}
