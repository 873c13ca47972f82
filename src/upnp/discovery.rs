use crate::{
    globals::statics::{MEDIA_RENDERER_URN, SSDP_ADDR},
    utils::http::HttpClient,
};
use ecow::EcoString;
use log::{debug, error};
use std::{
    io::{self, ErrorKind},
    net::{IpAddr, SocketAddr, UdpSocket},
    time::{Duration, Instant},
};
use xml::reader::{EventReader, XmlEvent};

/// SSDP M-SEARCH datagram
static SSDP_DISCOVER_MSG: &str = "M-SEARCH * HTTP/1.1\r\n\
HOST: 239.255.255.250:1900\r\n\
MAN: \"ssdp:discover\"\r\n\
MX: {mx}\r\n\
ST: {device_type}\r\n\
\r\n";

/// one answer to the M-SEARCH whose description could be read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredRenderer {
    pub remote_addr: EcoString,
    pub friendly_name: EcoString,
    pub model_name: EcoString,
    pub location: String,
}

/// identity fields of a device description
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceDescription {
    pub friendly_name: String,
    pub model_name: String,
}

/// the LOCATION of a `200 OK` M-SEARCH reply
#[must_use]
pub fn parse_ssdp_response(resp: &str) -> Option<String> {
    let mut lines = resp.split("\r\n");
    let status_line = lines.next()?;
    let status_code = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse::<u32>().ok())
        .unwrap_or(0);
    if status_code != 200 {
        return None;
    }
    lines.find_map(|l| {
        let mut split = l.splitn(2, ':');
        match (split.next(), split.next()) {
            (Some(header), Some(value)) if header.trim().eq_ignore_ascii_case("LOCATION") => {
                Some(value.trim().to_string())
            }
            _ => None,
        }
    })
}

/// parse the device description; `None` unless it names the device
#[must_use]
pub fn parse_description(xml: &str) -> Option<DeviceDescription> {
    let parser = EventReader::new(xml.as_bytes());
    let mut cur_elem = String::new();
    let mut description = DeviceDescription::default();
    for e in parser {
        match e {
            Ok(XmlEvent::StartElement { name, .. }) => {
                cur_elem = name.local_name;
            }
            Ok(XmlEvent::EndElement { .. }) => {
                cur_elem.clear();
            }
            Ok(XmlEvent::Characters(value)) => {
                // the root device comes first, embedded devices must not overwrite it
                match cur_elem.as_str() {
                    "friendlyName" if description.friendly_name.is_empty() => {
                        description.friendly_name = value;
                    }
                    "modelName" if description.model_name.is_empty() => {
                        description.model_name = value;
                    }
                    _ => {}
                }
            }
            Err(e) => {
                error!("Renderer description error: {e}");
                return None;
            }
            _ => {}
        }
    }
    if description.friendly_name.trim().is_empty() {
        None
    } else {
        Some(description)
    }
}

/// SSDP discovery of media renderers.
///
/// One M-SEARCH, replies are collected for `mx` + 1 seconds and every reply is
/// kept (no deduplication). A responder only counts when its description can be
/// fetched and names the device.
pub fn discover(
    client: &HttpClient,
    local_addr: Option<IpAddr>,
    mx: u64,
) -> io::Result<Vec<DiscoveredRenderer>> {
    debug!("SSDP discovery started");
    let bind_addr = SocketAddr::new(local_addr.unwrap_or(IpAddr::from([0, 0, 0, 0])), 0);
    let socket = UdpSocket::bind(bind_addr)?;
    let broadcast_address: SocketAddr = SSDP_ADDR
        .parse()
        .map_err(|e| io::Error::new(ErrorKind::InvalidInput, e))?;
    let msg = SSDP_DISCOVER_MSG
        .replace("{mx}", &mx.to_string())
        .replace("{device_type}", MEDIA_RENDERER_URN);
    socket.send_to(msg.as_bytes(), broadcast_address)?;

    let window = Duration::from_secs(mx + 1);
    let mut responders: Vec<(String, SocketAddr)> = Vec::new();
    let start = Instant::now();
    let mut buf = [0u8; 2048];
    loop {
        let elapsed = start.elapsed();
        if elapsed >= window {
            break;
        }
        socket.set_read_timeout(Some(window - elapsed))?;
        match socket.recv_from(&mut buf) {
            Ok((received, from)) => {
                let resp = String::from_utf8_lossy(&buf[..received]);
                debug!(
                    "UDP response at {} from {}: \r\n{}",
                    start.elapsed().as_millis(),
                    from,
                    resp
                );
                if let Some(location) = parse_ssdp_response(&resp) {
                    responders.push((location, from));
                }
            }
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }

    let mut renderers = Vec::new();
    for (location, from) in responders {
        let description = match client.get(&location) {
            Ok(xml) => xml,
            Err(e) => {
                debug!("skipping {from}: {e}");
                continue;
            }
        };
        let Some(description) = parse_description(&description) else {
            debug!("skipping {from}: description without a name");
            continue;
        };
        renderers.push(DiscoveredRenderer {
            remote_addr: from.ip().to_string().into(),
            friendly_name: description.friendly_name.into(),
            model_name: description.model_name.into(),
            location,
        });
    }
    debug!("SSDP discovery complete, {} renderer(s)", renderers.len());
    Ok(renderers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ssdp_responses() {
        let resp = "HTTP/1.1 200 OK\r\n\
                    CACHE-CONTROL: max-age=1800\r\n\
                    Location: http://192.168.1.20:9197/dmr\r\n\
                    ST: urn:schemas-upnp-org:device:MediaRenderer:1\r\n\r\n";
        assert_eq!(
            parse_ssdp_response(resp).as_deref(),
            Some("http://192.168.1.20:9197/dmr")
        );
        let resp = "HTTP/1.1 404 Not Found\r\nLOCATION: http://x/\r\n\r\n";
        assert_eq!(parse_ssdp_response(resp), None);
        let resp = "HTTP/1.1 200 OK\r\nST: upnp:rootdevice\r\n\r\n";
        assert_eq!(parse_ssdp_response(resp), None);
        assert_eq!(parse_ssdp_response(""), None);
    }

    #[test]
    fn device_descriptions() {
        let xml = r#"<?xml version="1.0"?>
<root xmlns="urn:schemas-upnp-org:device-1-0">
<device>
<deviceType>urn:schemas-upnp-org:device:MediaRenderer:1</deviceType>
<friendlyName>[TV] Samsung &amp; Co</friendlyName>
<modelName>UE55</modelName>
<deviceList><device><friendlyName>embedded</friendlyName></device></deviceList>
</device>
</root>"#;
        let d = parse_description(xml).unwrap();
        assert_eq!(d.friendly_name, "[TV] Samsung & Co");
        assert_eq!(d.model_name, "UE55");
    }

    #[test]
    fn nameless_or_broken_descriptions() {
        assert_eq!(parse_description("<root><device><modelName>X</modelName></device></root>"), None);
        assert_eq!(parse_description("<root><device><friendlyName>X</device>"), None);
    }

    #[test]
    fn search_message() {
        let msg = SSDP_DISCOVER_MSG
            .replace("{mx}", "3")
            .replace("{device_type}", MEDIA_RENDERER_URN);
        assert!(msg.starts_with("M-SEARCH * HTTP/1.1\r\n"));
        assert!(msg.contains("MX: 3\r\n"));
        assert!(msg.contains("ST: urn:schemas-upnp-org:device:MediaRenderer:1\r\n"));
        assert!(msg.ends_with("\r\n\r\n"));
    }
}
