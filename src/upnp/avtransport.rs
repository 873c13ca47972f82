///
/// avtransport.rs
///
/// SOAP control of a DLNA renderer through its AVTransport:1 service,
/// plus the ConnectionManager:1 capability query.
///
use crate::{
    dlna::features::build_feature_string,
    enums::{errors::SoapError, media::TranscodeCodec, media::TransportState},
    globals::statics::{AV_TRANSPORT_URN, CONNECTION_MANAGER_URN},
    utils::{
        escape::{XmlEscape, truncate_chars, xml_extract},
        http::HttpClient,
    },
};
use bitflags::bitflags;
use ecow::EcoString;
use log::{debug, warn};
use std::{net::IpAddr, thread, time::Duration};

/// SOAP 1.1 envelope, `{body}` is the action element
static SOAP_ENVELOPE_TEMPLATE: &str = "\
<?xml version=\"1.0\" encoding=\"utf-8\"?>\r\n\
<s:Envelope xmlns:s=\"http://schemas.xmlsoap.org/soap/envelope/\" \
s:encodingStyle=\"http://schemas.xmlsoap.org/soap/encoding/\">\r\n\
  <s:Body>\r\n\
{body}\r\n\
  </s:Body>\r\n\
</s:Envelope>\r\n";

/// AV Play template
static AV_PLAY_TEMPLATE: &str = "\
    <u:Play xmlns:u=\"urn:schemas-upnp-org:service:AVTransport:1\">\r\n\
      <InstanceID>0</InstanceID>\r\n\
      <Speed>1</Speed>\r\n\
    </u:Play>";

/// AV Stop template
static AV_STOP_TEMPLATE: &str = "\
    <u:Stop xmlns:u=\"urn:schemas-upnp-org:service:AVTransport:1\">\r\n\
      <InstanceID>0</InstanceID>\r\n\
    </u:Stop>";

/// AV Seek template
static AV_SEEK_TEMPLATE: &str = "\
    <u:Seek xmlns:u=\"urn:schemas-upnp-org:service:AVTransport:1\">\r\n\
      <InstanceID>0</InstanceID>\r\n\
      <Unit>REL_TIME</Unit>\r\n\
      <Target>{target}</Target>\r\n\
    </u:Seek>";

/// AV GetPositionInfo template
static AV_POSITION_INFO_TEMPLATE: &str = "\
    <u:GetPositionInfo xmlns:u=\"urn:schemas-upnp-org:service:AVTransport:1\">\r\n\
      <InstanceID>0</InstanceID>\r\n\
    </u:GetPositionInfo>";

/// AV GetTransportInfo template
static AV_TRANSPORT_INFO_TEMPLATE: &str = "\
    <u:GetTransportInfo xmlns:u=\"urn:schemas-upnp-org:service:AVTransport:1\">\r\n\
      <InstanceID>0</InstanceID>\r\n\
    </u:GetTransportInfo>";

/// CM GetProtocolInfo template
static CM_PROTOCOL_INFO_TEMPLATE: &str = "\
    <u:GetProtocolInfo xmlns:u=\"urn:schemas-upnp-org:service:ConnectionManager:1\">\r\n\
    </u:GetProtocolInfo>";

/// longest title we put in the DIDL-Lite metadata
pub const MAX_TITLE_CHARS: usize = 256;

const SOAP_ATTEMPTS: u32 = 3;
const SOAP_RETRY_DELAY: Duration = Duration::from_secs(1);

/// the resolved control endpoint of one renderer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RendererHandle {
    pub host: EcoString,
    pub port: u16,
    /// always starts with '/'
    pub av_control_path: String,
    pub cm_control_path: Option<String>,
    /// our own address as seen from the renderer
    pub local_addr: IpAddr,
}

impl RendererHandle {
    #[must_use]
    pub fn control_url(&self, path: &str) -> String {
        if self.host.contains(':') {
            format!("http://[{}]:{}{}", self.host, self.port, path)
        } else {
            format!("http://{}:{}{}", self.host, self.port, path)
        }
    }
}

/// make a control URL from a description document an absolute path
#[must_use]
pub fn normalize_control_path(raw: &str) -> String {
    let raw = raw.trim();
    // some devices publish a full url
    if raw.starts_with("http://") || raw.starts_with("https://") {
        if let Ok(url) = url::Url::parse(raw) {
            return match url.query() {
                Some(q) => format!("{}?{q}", url.path()),
                None => url.path().to_string(),
            };
        }
    }
    let mut path = raw.to_string();
    // sometimes the control url is not prefixed with a '/'
    if !path.starts_with('/') {
        path.insert(0, '/');
    }
    path
}

bitflags! {
    /// video codecs found in a renderer's sink protocol list
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SinkCodecs: u8 {
        const H264 = 0b0001;
        const HEVC = 0b0010;
    }
}

/// what the renderer says it can decode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapabilitySet {
    pub sink: SinkCodecs,
}

impl CapabilitySet {
    /// scan a `GetProtocolInfo` sink list
    #[must_use]
    pub fn from_sink(sink: &str) -> CapabilitySet {
        let upper = sink.to_ascii_uppercase();
        let mut codecs = SinkCodecs::empty();
        if ["AVC_", "VIDEO/AVC", "H264"].iter().any(|m| upper.contains(m)) {
            codecs |= SinkCodecs::H264;
        }
        if ["HEVC", "H265", "VIDEO/H265"].iter().any(|m| upper.contains(m)) {
            codecs |= SinkCodecs::HEVC;
        }
        CapabilitySet { sink: codecs }
    }

    #[must_use]
    pub fn preferred_codec(&self) -> TranscodeCodec {
        if self.sink.contains(SinkCodecs::HEVC) {
            TranscodeCodec::Hevc
        } else {
            TranscodeCodec::H264
        }
    }
}

/// format seconds as `H:MM:SS`
#[must_use]
pub fn format_time(secs: u32) -> String {
    format!("{}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}

/// parse `H:MM:SS` (fractional seconds ignored)
#[must_use]
pub fn parse_time(s: &str) -> Option<u32> {
    let mut parts = s.trim().split(':');
    let h: u32 = parts.next()?.parse().ok()?;
    let m: u32 = parts.next()?.parse().ok()?;
    let sec = parts.next()?;
    let sec: u32 = sec.split('.').next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    h.checked_mul(3600)?
        .checked_add(m.checked_mul(60)?)?
        .checked_add(sec)
}

/// the DIDL-Lite item describing `uri`, not yet escaped for the SOAP body
#[must_use]
pub fn build_didl(uri: &str, mime: &str, title: &str, features: &str) -> String {
    let title = truncate_chars(title, MAX_TITLE_CHARS).xml_escape();
    let uri = uri.xml_escape();
    format!(
        "<DIDL-Lite xmlns=\"urn:schemas-upnp-org:metadata-1-0/DIDL-Lite/\" \
xmlns:upnp=\"urn:schemas-upnp-org:metadata-1-0/upnp/\" \
xmlns:dc=\"http://purl.org/dc/elements/1.1/\">\
<item id=\"0\" parentID=\"0\" restricted=\"0\">\
<dc:title>{title}</dc:title>\
<upnp:class>object.item.videoItem</upnp:class>\
<res protocolInfo=\"http-get:*:{mime}:{features}\">{uri}</res>\
</item>\
</DIDL-Lite>"
    )
}

/// the control operations the playback session needs from a renderer
pub trait AvTransportControl {
    fn set_av_transport_uri(
        &self,
        uri: &str,
        mime: &str,
        title: &str,
        is_streaming: bool,
        profile: Option<&str>,
    ) -> Result<(), SoapError>;
    fn play(&self) -> Result<(), SoapError>;
    fn stop(&self) -> Result<(), SoapError>;
    /// absolute seek, negative targets seek to the start
    fn seek(&self, target_secs: i64) -> Result<(), SoapError>;
    /// current position in seconds, relative to the current URI
    fn position(&self) -> Result<u32, SoapError>;
    fn transport_state(&self) -> Result<TransportState, SoapError>;
    /// best effort, `None` when the renderer does not tell
    fn capabilities(&self) -> Option<CapabilitySet>;

    /// read the position, add `delta`, seek there.
    /// Two round trips: a position change made on the TV in between is lost.
    fn seek_relative(&self, delta: i32) -> Result<(), SoapError> {
        let position = self.position()?;
        self.seek(i64::from(position) + i64::from(delta))
    }
}

/// AVTransport client for one resolved renderer
pub struct AvTransport {
    handle: RendererHandle,
    client: HttpClient,
}

impl AvTransport {
    #[must_use]
    pub fn new(handle: RendererHandle, client: HttpClient) -> AvTransport {
        AvTransport { handle, client }
    }

    fn av_url(&self) -> String {
        self.handle.control_url(&self.handle.av_control_path)
    }

    /// POST an action, retrying when the renderer does not answer at all
    fn soap_action(&self, action: &'static str, body: &str) -> Result<(), SoapError> {
        let url = self.av_url();
        let soap_action = format!("{AV_TRANSPORT_URN}#{action}");
        let envelope = SOAP_ENVELOPE_TEMPLATE.replace("{body}", body);
        for attempt in 1..=SOAP_ATTEMPTS {
            match self.client.post_soap(&url, &soap_action, &envelope) {
                Ok(response) => return check_fault(action, response).map(|_| ()),
                Err(e) => {
                    debug!("{action} attempt {attempt}/{SOAP_ATTEMPTS}: {e}");
                    if attempt < SOAP_ATTEMPTS {
                        thread::sleep(SOAP_RETRY_DELAY);
                    }
                }
            }
        }
        warn!("{action}: renderer did not respond");
        Err(SoapError::NoResponse {
            action,
            attempts: SOAP_ATTEMPTS,
        })
    }

    /// POST a read-only action once and return the response body
    fn soap_action_with_response(
        &self,
        url: &str,
        service: &str,
        action: &'static str,
        body: &str,
    ) -> Result<String, SoapError> {
        let soap_action = format!("{service}#{action}");
        let envelope = SOAP_ENVELOPE_TEMPLATE.replace("{body}", body);
        match self.client.post_soap(url, &soap_action, &envelope) {
            Ok(response) => check_fault(action, response),
            Err(e) => {
                debug!("{action}: {e}");
                Err(SoapError::NoResponse {
                    action,
                    attempts: 1,
                })
            }
        }
    }
}

fn check_fault(action: &'static str, response: String) -> Result<String, SoapError> {
    if response.contains("Fault") {
        return Err(SoapError::Fault {
            action,
            detail: fault_detail(&response),
        });
    }
    Ok(response)
}

/// `errorCode errorDescription` of a UPnP fault, else the SOAP faultstring
fn fault_detail(response: &str) -> String {
    let decode = |s: &str| htmlescape::decode_html(s).unwrap_or_else(|_| s.to_string());
    let code = xml_extract(response, "<errorCode>", "</errorCode>");
    let description = xml_extract(response, "<errorDescription>", "</errorDescription>");
    match (code, description) {
        (Some(code), Some(description)) => format!("{code} {}", decode(description)),
        (Some(code), None) => format!("UPnP error {code}"),
        _ => xml_extract(response, "<faultstring>", "</faultstring>")
            .map_or_else(|| "no details".to_string(), decode),
    }
}

impl AvTransportControl for AvTransport {
    fn set_av_transport_uri(
        &self,
        uri: &str,
        mime: &str,
        title: &str,
        is_streaming: bool,
        profile: Option<&str>,
    ) -> Result<(), SoapError> {
        let features = build_feature_string(profile, is_streaming);
        let didl = build_didl(uri, mime, title, &features);
        debug!("DIDL-Lite: {didl}");
        let body = format!(
            "    <u:SetAVTransportURI xmlns:u=\"{AV_TRANSPORT_URN}\">\r\n\
      <InstanceID>0</InstanceID>\r\n\
      <CurrentURI>{}</CurrentURI>\r\n\
      <CurrentURIMetaData>{}</CurrentURIMetaData>\r\n\
    </u:SetAVTransportURI>",
            uri.xml_escape(),
            didl.xml_escape()
        );
        self.soap_action("SetAVTransportURI", &body)
    }

    fn play(&self) -> Result<(), SoapError> {
        self.soap_action("Play", AV_PLAY_TEMPLATE)
    }

    fn stop(&self) -> Result<(), SoapError> {
        self.soap_action("Stop", AV_STOP_TEMPLATE)
    }

    fn seek(&self, target_secs: i64) -> Result<(), SoapError> {
        let target = u32::try_from(target_secs.max(0)).unwrap_or(u32::MAX);
        let body = AV_SEEK_TEMPLATE.replace("{target}", &format_time(target));
        self.soap_action("Seek", &body)
    }

    fn position(&self) -> Result<u32, SoapError> {
        const ACTION: &str = "GetPositionInfo";
        let response = self.soap_action_with_response(
            &self.av_url(),
            AV_TRANSPORT_URN,
            ACTION,
            AV_POSITION_INFO_TEMPLATE,
        )?;
        let rel_time =
            xml_extract(&response, "<RelTime>", "</RelTime>").ok_or(SoapError::Parse {
                action: ACTION,
                reason: "no RelTime".to_string(),
            })?;
        parse_time(rel_time).ok_or_else(|| SoapError::Parse {
            action: ACTION,
            reason: format!("bad RelTime '{rel_time}'"),
        })
    }

    fn transport_state(&self) -> Result<TransportState, SoapError> {
        const ACTION: &str = "GetTransportInfo";
        let response = self.soap_action_with_response(
            &self.av_url(),
            AV_TRANSPORT_URN,
            ACTION,
            AV_TRANSPORT_INFO_TEMPLATE,
        )?;
        xml_extract(
            &response,
            "<CurrentTransportState>",
            "</CurrentTransportState>",
        )
        .and_then(|state| state.parse().ok())
        .ok_or(SoapError::Parse {
            action: ACTION,
            reason: "no CurrentTransportState".to_string(),
        })
    }

    fn capabilities(&self) -> Option<CapabilitySet> {
        const ACTION: &str = "GetProtocolInfo";
        let Some(path) = &self.handle.cm_control_path else {
            debug!("{}", SoapError::Unsupported { action: ACTION });
            return None;
        };
        let url = self.handle.control_url(path);
        match self.soap_action_with_response(
            &url,
            CONNECTION_MANAGER_URN,
            ACTION,
            CM_PROTOCOL_INFO_TEMPLATE,
        ) {
            Ok(response) => {
                let sink = xml_extract(&response, "<Sink>", "</Sink>")?;
                let sink = htmlescape::decode_html(sink).unwrap_or_else(|_| sink.to_string());
                let caps = CapabilitySet::from_sink(&sink);
                debug!("renderer sink codecs: {:?}", caps.sink);
                Some(caps)
            }
            Err(e) => {
                debug!("capability query failed: {e}");
                None
            }
        }
    }
}
