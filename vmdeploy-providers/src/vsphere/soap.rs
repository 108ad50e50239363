//! SOAP transport for the vim25 endpoint (`https://{host}/sdk`).

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::Client;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, trace, warn};

use super::xml::Element;
use crate::ProviderError;

const NS_SOAPENV: &str = "http://schemas.xmlsoap.org/soap/envelope/";
const NS_XSD: &str = "http://www.w3.org/2001/XMLSchema";
const NS_XSI: &str = "http://www.w3.org/2001/XMLSchema-instance";
const SOAP_ACTION: &str = "urn:vim25/7.0.3.0";

pub struct SoapClient {
    client: Client,
    endpoint: String,
    request_counter: AtomicU64,
}

impl SoapClient {
    pub fn new(host: &str, port: u16, validate_certs: bool) -> Result<Self, ProviderError> {
        // Login hands back a session cookie; every later call must carry it.
        let client = Client::builder()
            .cookie_store(true)
            .danger_accept_invalid_certs(!validate_certs)
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| ProviderError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("https://{host}:{port}/sdk"),
            request_counter: AtomicU64::new(0),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Send one method call and return the `<...Response>` element.
    pub async fn call(&self, method: &str, body: &str) -> Result<Element, ProviderError> {
        let req_id = self.request_counter.fetch_add(1, Ordering::Relaxed) + 1;
        let envelope = envelope(body);

        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("text/xml; charset=utf-8"),
        );
        headers.insert("SOAPAction", HeaderValue::from_static(SOAP_ACTION));

        debug!(req_id, method, endpoint = %self.endpoint, "vim25 request");
        trace!(req_id, body = %envelope, "vim25 request body");

        let resp = self
            .client
            .post(&self.endpoint)
            .headers(headers)
            .body(envelope)
            .send()
            .await?;
        let status = resp.status();
        let text = resp.text().await?;
        trace!(req_id, %status, len = text.len(), "vim25 response");

        // Faults come back as HTTP 500 with a regular envelope.
        let doc = match Element::parse(&text) {
            Ok(doc) => doc,
            Err(_) if !status.is_success() => {
                warn!(req_id, %status, "vim25 call failed with non-XML body");
                return Err(ProviderError::Transport(format!(
                    "{method} failed with HTTP {}: {}",
                    status.as_u16(),
                    truncate(&text, 300)
                )));
            }
            Err(e) => return Err(e),
        };

        let body = doc
            .child("Body")
            .ok_or_else(|| ProviderError::Protocol(format!("{method}: no SOAP body")))?;
        if let Some(fault) = body.child("Fault") {
            return Err(fault_to_error(fault));
        }
        if !status.is_success() {
            return Err(ProviderError::Transport(format!(
                "{method} failed with HTTP {}",
                status.as_u16()
            )));
        }
        body.children
            .first()
            .cloned()
            .ok_or_else(|| ProviderError::Protocol(format!("{method}: empty SOAP body")))
    }
}

fn envelope(body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<soapenv:Envelope xmlns:soapenv="{NS_SOAPENV}" xmlns:xsd="{NS_XSD}" xmlns:xsi="{NS_XSI}">
<soapenv:Body>{body}</soapenv:Body>
</soapenv:Envelope>"#
    )
}

/// Map a `<Fault>` element to a provider error. The fault class sits in
/// `detail` as the first child (its `xsi:type`, or its tag minus `Fault`).
pub fn fault_to_error(fault: &Element) -> ProviderError {
    let message = fault
        .child_text("faultstring")
        .filter(|s| !s.is_empty())
        .unwrap_or("unknown SOAP fault")
        .to_string();

    let kind = fault
        .child("detail")
        .and_then(|d| d.children.first())
        .map(|d| match d.xsi_type() {
            Some(t) => t.to_string(),
            None => d.name.trim_end_matches("Fault").to_string(),
        })
        .unwrap_or_else(|| {
            fault
                .child_text("faultcode")
                .unwrap_or("ServerFaultCode")
                .to_string()
        });

    if kind == "InvalidLogin" {
        ProviderError::Authentication(message)
    } else {
        ProviderError::Fault { kind, message }
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_login_fault_is_authentication() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
<soapenv:Body><soapenv:Fault><faultcode>ServerFaultCode</faultcode>
<faultstring>Cannot complete login due to an incorrect user name or password.</faultstring>
<detail><InvalidLoginFault xmlns="urn:vim25" xsi:type="InvalidLogin"></InvalidLoginFault></detail>
</soapenv:Fault></soapenv:Body></soapenv:Envelope>"#;
        let doc = Element::parse(xml).unwrap();
        let fault = doc.child("Body").unwrap().child("Fault").unwrap();
        match fault_to_error(fault) {
            ProviderError::Authentication(msg) => assert!(msg.contains("incorrect user name")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn duplicate_name_fault_keeps_kind() {
        let xml = r#"<soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/">
<soapenv:Body><soapenv:Fault><faultcode>ServerFaultCode</faultcode>
<faultstring>The name 'web-01' already exists.</faultstring>
<detail><DuplicateNameFault xmlns="urn:vim25"><name>web-01</name></DuplicateNameFault></detail>
</soapenv:Fault></soapenv:Body></soapenv:Envelope>"#;
        let doc = Element::parse(xml).unwrap();
        let fault = doc.find("Fault").unwrap();
        match fault_to_error(fault) {
            ProviderError::Fault { kind, message } => {
                assert_eq!(kind, "DuplicateName");
                assert_eq!(message, "The name 'web-01' already exists.");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn envelope_wraps_body() {
        let env = envelope("<Logout/>");
        assert!(env.contains("<soapenv:Body><Logout/></soapenv:Body>"));
        assert!(env.contains(NS_XSI));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("abc", 10), "abc");
    }
}
