//! Salesforce CRM source
//!
//! Logs in through the SOAP `login` call (username, password and security
//! token), then runs SOQL queries against the REST API with the session id
//! as bearer token. Query results page through `nextRecordsUrl`.

use super::{http_client, limit_overrides, BuildFuture, BuiltSource};
use crate::auth::AuthConfig;
use crate::config::{PipelineConfig, SalesforceConfig};
use crate::decode::JsonDecoder;
use crate::error::{Error, Result};
use crate::extract::{AuthRequirement, Endpoint, PageFetcher, PageLimits, PaginationDriver};
use crate::http::{HttpClient, RequestConfig};
use crate::pagination::NextUrlPaginator;
use crate::resource::{Resource, Source};
use crate::types::WriteMode;
use regex::Regex;
use reqwest::Method;
use std::sync::{Arc, LazyLock};
use tracing::{debug, info};
use url::Url;

/// Objects loaded, with the fields selected from each
pub const OBJECTS: [(&str, &str, &str); 4] = [
    (
        "accounts",
        "Account",
        "Id, Name, Type, Industry, AnnualRevenue, NumberOfEmployees, CreatedDate, LastModifiedDate",
    ),
    (
        "opportunities",
        "Opportunity",
        "Id, Name, AccountId, Amount, StageName, Probability, CloseDate, CreatedDate, LastModifiedDate",
    ),
    (
        "contacts",
        "Contact",
        "Id, FirstName, LastName, Email, AccountId, Title, Department, CreatedDate, LastModifiedDate",
    ),
    (
        "leads",
        "Lead",
        "Id, FirstName, LastName, Company, Email, Status, LeadSource, CreatedDate, LastModifiedDate",
    ),
];

static SESSION_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<(?:\w+:)?sessionId>([^<]+)</(?:\w+:)?sessionId>").unwrap()
});
static SERVER_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<(?:\w+:)?serverUrl>([^<]+)</(?:\w+:)?serverUrl>").unwrap()
});
static FAULT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<faultstring>([^<]*)</faultstring>").unwrap());

// ============================================================================
// Login
// ============================================================================

/// An authenticated API session
#[derive(Clone)]
pub struct SalesforceSession {
    pub session_id: String,
    /// Scheme and host of the org, e.g. `https://acme.my.salesforce.com`
    pub instance_url: String,
}

impl std::fmt::Debug for SalesforceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SalesforceSession")
            .field("instance_url", &self.instance_url)
            .finish_non_exhaustive()
    }
}

/// Log in with the partner SOAP API
pub async fn login(client: &HttpClient, config: &SalesforceConfig) -> Result<SalesforceSession> {
    let username = config
        .username
        .as_deref()
        .ok_or_else(|| Error::missing_field("salesforce.username"))?;
    let password = config
        .password
        .as_deref()
        .ok_or_else(|| Error::missing_field("salesforce.password"))?;
    let token = config.security_token.as_deref().unwrap_or_default();

    let url = format!(
        "{}/services/Soap/u/{}",
        config.login_url.trim_end_matches('/'),
        config.api_version
    );
    let request = RequestConfig::new()
        .header("SOAPAction", "login")
        .raw("text/xml; charset=UTF-8", login_envelope(username, &format!("{password}{token}")))
        .without_auth();

    debug!(url = %url, "Logging in to Salesforce");
    let response = client.send(Method::POST, &url, request).await?;
    let status = response.status();
    let body = response.text().await?;

    if let Some(fault) = capture(&FAULT, &body) {
        return Err(Error::auth(format!("Salesforce login failed: {fault}")));
    }
    if !status.is_success() {
        return Err(Error::request_failed(status.as_u16(), url, body));
    }

    let session_id = capture(&SESSION_ID, &body)
        .ok_or_else(|| Error::malformed("Salesforce login response has no sessionId"))?;
    let server_url = capture(&SERVER_URL, &body)
        .ok_or_else(|| Error::malformed("Salesforce login response has no serverUrl"))?;
    let instance_url = instance_url(&server_url)?;

    info!(instance_url = %instance_url, "Logged in to Salesforce");
    Ok(SalesforceSession {
        session_id,
        instance_url,
    })
}

fn login_envelope(username: &str, password: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<env:Envelope xmlns:xsd="http://www.w3.org/2001/XMLSchema"
    xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"
    xmlns:env="http://schemas.xmlsoap.org/soap/envelope/"
    xmlns:urn="urn:partner.soap.sforce.com">
  <env:Body>
    <urn:login>
      <urn:username>{}</urn:username>
      <urn:password>{}</urn:password>
    </urn:login>
  </env:Body>
</env:Envelope>"#,
        xml_escape(username),
        xml_escape(password)
    )
}

fn xml_escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

fn capture(pattern: &Regex, body: &str) -> Option<String> {
    pattern
        .captures(body)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
}

fn instance_url(server_url: &str) -> Result<String> {
    let url = Url::parse(server_url)?;
    let host = url
        .host_str()
        .ok_or_else(|| Error::malformed(format!("serverUrl '{server_url}' has no host")))?;
    Ok(match url.port() {
        Some(port) => format!("{}://{host}:{port}", url.scheme()),
        None => format!("{}://{host}", url.scheme()),
    })
}

// ============================================================================
// Source
// ============================================================================

/// SOQL for one object, skipping deleted rows
pub fn soql(object: &str, fields: &str) -> String {
    format!("SELECT {fields} FROM {object} WHERE IsDeleted = false")
}

/// One resource per object, merged on `Id`
///
/// `client` must carry the session id as bearer token.
pub fn crm_source(
    client: Arc<HttpClient>,
    instance_url: &str,
    api_version: &str,
    overrides: PageLimits,
) -> Result<Source> {
    let mut resources = Vec::with_capacity(OBJECTS.len());

    for (name, object, fields) in OBJECTS {
        let endpoint = Endpoint::new(instance_url, format!("/services/data/v{api_version}/query"))
            .with_param("q", soql(object, fields))
            .with_auth(AuthRequirement::Required);
        let fetcher = PageFetcher::new(
            client.clone(),
            endpoint,
            Box::new(NextUrlPaginator::new("nextRecordsUrl")),
            Box::new(JsonDecoder::with_path("records")),
        )?;

        resources.push(
            Resource::new(name, PaginationDriver::new(name, fetcher, PageLimits::none().overridden_by(overrides)))
                .with_write_mode(WriteMode::Merge)
                .with_primary_key("Id")
                .with_transform(|mut record| {
                    record.remove("attributes");
                    Ok(Some(record))
                }),
        );
    }

    Ok(Source::new("salesforce", resources))
}

pub(super) fn build(config: &PipelineConfig) -> BuildFuture<'_> {
    Box::pin(async move {
        let login_client = http_client(config, AuthConfig::None)?;
        let session = login(&login_client, &config.salesforce).await?;

        let client = http_client(config, AuthConfig::bearer(Some(&session.session_id)))?;
        let source = crm_source(
            client,
            &session.instance_url,
            &config.salesforce.api_version,
            limit_overrides(config),
        )?;
        Ok(BuiltSource::new("salesforce_data", source))
    })
}
