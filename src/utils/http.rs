use crate::{enums::errors::HttpError, globals::statics::APP_NAME, globals::statics::APP_VERSION};
use log::debug;
use std::time::Duration;
use ureq::Agent;

/// one request per fresh connection, bounded by a global timeout.
/// Any HTTP status is returned as a body; only transport errors are errors.
#[derive(Clone)]
pub struct HttpClient {
    agent: Agent,
    user_agent: String,
}

impl HttpClient {
    #[must_use]
    pub fn new(timeout: Duration) -> HttpClient {
        let config = Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build();
        HttpClient {
            agent: config.into(),
            user_agent: format!("{APP_NAME}/{APP_VERSION}"),
        }
    }

    /// GET `url` and return the response body
    pub fn get(&self, url: &str) -> Result<String, HttpError> {
        debug!("GET {url}");
        let mut resp = self
            .agent
            .get(url)
            .header("Connection", "close")
            .header("User-Agent", self.user_agent.as_str())
            .call()
            .map_err(|e| transport_error(url, &e))?;
        debug!("<= HTTP {} from {url}", resp.status().as_u16());
        resp.body_mut()
            .read_to_string()
            .map_err(|e| transport_error(url, &e))
    }

    /// POST a SOAP envelope to `url` and return the response body
    pub fn post_soap(&self, url: &str, soap_action: &str, body: &str) -> Result<String, HttpError> {
        debug!("url: {url},\r\n=>SOAP Action: {soap_action},\r\n=>SOAP xml: \r\n{body}");
        let mut resp = self
            .agent
            .post(url)
            .header("Connection", "close")
            .header("User-Agent", self.user_agent.as_str())
            .header("Content-Type", "text/xml; charset=\"utf-8\"")
            .header("SOAPAction", format!("\"{soap_action}\""))
            .send(body)
            .map_err(|e| transport_error(url, &e))?;
        let xml = resp
            .body_mut()
            .read_to_string()
            .map_err(|e| transport_error(url, &e))?;
        debug!("<=SOAP response: {xml}\r\n");
        Ok(xml)
    }
}

fn transport_error(url: &str, e: &ureq::Error) -> HttpError {
    HttpError::Transport {
        url: url.to_string(),
        reason: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::HttpClient;
    use std::time::Duration;

    #[test]
    fn refused_connection_is_an_error() {
        // bind and drop to get a port nobody listens on
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let client = HttpClient::new(Duration::from_secs(2));
        let err = client
            .get(&format!("http://127.0.0.1:{port}/dmr"))
            .unwrap_err();
        assert!(err.to_string().contains(&format!("127.0.0.1:{port}")));
    }
}
