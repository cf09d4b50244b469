//! Certificate resources: create, list and delete
//!
//! All three calls go to the `certificates` collection. Listing and deletion
//! ride on POST with a method-override header, as the portal expects.

use crate::channel::{
    HttpChannel, MethodOverride, RequestHeaders, RpcChannel, RpcRequest, RpcResponse,
};
use crate::config::{CertificateType, ClientConfig};
use crate::error::{PortalError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

const RESOURCE_TYPE: &str = "certificates";
const LIMIT_KEY: &str = "limit";
const NOT_FOUND_MESSAGE: &str = "Certificate does not exist";

/// A certificate as issued and reported by the portal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub record_type: String,
    #[serde(default, deserialize_with = "attributes_as_strings")]
    pub attributes: BTreeMap<String, String>,
}

impl CertificateRecord {
    /// Issued certificate, PEM or bare base64
    #[must_use]
    pub fn cert_content(&self) -> Option<&str> {
        self.attribute("certContent")
    }

    #[must_use]
    pub fn certificate_type(&self) -> Option<&str> {
        self.attribute("certificateType")
    }

    #[must_use]
    pub fn serial_number(&self) -> Option<&str> {
        self.attribute("serialNumber")
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.attribute("name")
    }

    #[must_use]
    pub fn expiration_date(&self) -> Option<&str> {
        self.attribute("expirationDate")
    }

    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }
}

/// Keep string attributes as-is and render anything else as JSON text.
fn attributes_as_strings<'de, D>(
    deserializer: D,
) -> std::result::Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<BTreeMap<String, serde_json::Value>>::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(|(key, value)| {
            let value = match value {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            (key, value)
        })
        .collect())
}

#[derive(Serialize)]
struct CreateRequest<'a> {
    data: CreateData<'a>,
}

#[derive(Serialize)]
struct CreateData<'a> {
    #[serde(rename = "type")]
    resource_type: &'a str,
    attributes: CreateAttributes<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateAttributes<'a> {
    team_id: &'a str,
    certificate_type: &'a str,
    csr_content: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest {
    url_encoded_query_params: String,
}

#[derive(Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    errors: Vec<ApiError>,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    detail: Option<String>,
    #[serde(default)]
    title: Option<String>,
}

impl<T> Envelope<T> {
    /// Detail of the first error entry, falling back to its title
    fn first_error(&self) -> Option<String> {
        let first = self.errors.first()?;
        Some(
            first
                .detail
                .clone()
                .or_else(|| first.title.clone())
                .unwrap_or_else(|| {
                    "Developer portal returned an error without detail".to_string()
                }),
        )
    }
}

/// Build the query string for a listing call.
///
/// Starts with `teamId=<team_id>`; `limit` becomes `&limit=<v>`, every other
/// key `&filter[<key>]=<v>`, in the iteration order of `filter`.
pub fn build_search_query<I, K, V>(team_id: &str, filter: I) -> String
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut search = format!("teamId={team_id}");
    for (key, value) in filter {
        let (key, value) = (key.as_ref(), value.as_ref());
        if key == LIMIT_KEY {
            search.push_str("&limit=");
        } else {
            search.push_str("&filter[");
            search.push_str(key);
            search.push_str("]=");
        }
        search.push_str(value);
    }
    search
}

/// Client for the portal's certificate resources.
#[derive(Debug, Clone)]
pub struct CertificateClient<C> {
    channel: C,
    config: ClientConfig,
}

impl CertificateClient<HttpChannel> {
    /// Client over HTTP using the timeouts in `config`
    pub fn from_config(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let channel = HttpChannel::new(&config)?;
        Ok(Self::new(channel, config))
    }
}

impl<C: RpcChannel> CertificateClient<C> {
    pub fn new(channel: C, config: ClientConfig) -> Self {
        Self { channel, config }
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    #[must_use]
    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// Submit a CSR and return the issued certificate.
    pub async fn create(
        &self,
        certificate_type: CertificateType,
        csr_pem: &str,
        team_id: &str,
        session: &str,
    ) -> Result<CertificateRecord> {
        let payload = CreateRequest {
            data: CreateData {
                resource_type: RESOURCE_TYPE,
                attributes: CreateAttributes {
                    team_id,
                    certificate_type: certificate_type.to_apple_api_string(),
                    csr_content: csr_pem,
                },
            },
        };
        let headers = self.headers(session);
        let response = self
            .send(self.config.certificates_url(), headers, &payload)
            .await?;

        let envelope: Envelope<CertificateRecord> = decode_envelope(&response)?;
        if let Some(detail) = envelope.first_error() {
            tracing::warn!(status = response.status, %detail, "certificate creation rejected");
            return Err(PortalError::Issuance(detail));
        }
        ensure_success(&response)?;

        let record = envelope.data.ok_or_else(|| {
            PortalError::Transport("Response did not contain a certificate".to_string())
        })?;
        tracing::info!(
            id = %record.id,
            certificate_type = certificate_type.to_apple_api_string(),
            "certificate issued"
        );
        Ok(record)
    }

    /// List certificates matching `filter`.
    ///
    /// An empty result is reported as [`PortalError::NotFound`].
    pub async fn list<I, K, V>(
        &self,
        filter: I,
        team_id: &str,
        session: &str,
    ) -> Result<Vec<CertificateRecord>>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let payload = QueryRequest {
            url_encoded_query_params: build_search_query(team_id, filter),
        };
        let headers = self.headers(session).method_override(MethodOverride::Get);
        let response = self
            .send(self.config.certificates_url(), headers, &payload)
            .await?;

        let envelope: Envelope<Vec<CertificateRecord>> = decode_envelope(&response)?;
        if let Some(detail) = envelope.first_error() {
            tracing::warn!(status = response.status, %detail, "certificate listing rejected");
            return Err(PortalError::Issuance(detail));
        }
        ensure_success(&response)?;

        let records = envelope.data.unwrap_or_default();
        if records.is_empty() {
            return Err(PortalError::NotFound(NOT_FOUND_MESSAGE.to_string()));
        }
        tracing::debug!(count = records.len(), "certificates listed");
        Ok(records)
    }

    /// Look up a single certificate by its portal id.
    pub async fn find_by_id(
        &self,
        certificate_id: &str,
        team_id: &str,
        session: &str,
    ) -> Result<CertificateRecord> {
        let records = self
            .list([("id", certificate_id)], team_id, session)
            .await?;
        records
            .into_iter()
            .find(|record| record.id == certificate_id)
            .ok_or_else(|| PortalError::NotFound(NOT_FOUND_MESSAGE.to_string()))
    }

    /// Revoke and remove a certificate. A bare 204 is success.
    pub async fn delete(&self, certificate_id: &str, team_id: &str, session: &str) -> Result<bool> {
        if certificate_id.is_empty() || certificate_id.contains(['/', '?', '#']) {
            return Err(PortalError::InvalidInput(format!(
                "Invalid certificate id: '{certificate_id}'"
            )));
        }

        let no_filter: [(&str, &str); 0] = [];
        let payload = QueryRequest {
            url_encoded_query_params: build_search_query(team_id, no_filter),
        };
        let url = format!("{}/{certificate_id}", self.config.certificates_url());
        let headers = self.headers(session).method_override(MethodOverride::Delete);
        let response = self.send(url, headers, &payload).await?;

        if response.status == 204 {
            tracing::info!(id = certificate_id, "certificate deleted");
            return Ok(true);
        }

        let detail = serde_json::from_slice::<Envelope<serde_json::Value>>(&response.body)
            .ok()
            .and_then(|envelope| envelope.first_error());
        match detail {
            Some(detail) => {
                tracing::warn!(status = response.status, %detail, "certificate deletion rejected");
                Err(PortalError::Issuance(detail))
            }
            None => Err(PortalError::OperationFailed(format!(
                "Delete certificate failed (status {})",
                response.status
            ))),
        }
    }

    fn headers(&self, session: &str) -> RequestHeaders {
        RequestHeaders::new(self.config.xcode_version.as_str()).session(session)
    }

    async fn send<P: Serialize>(
        &self,
        url: String,
        headers: RequestHeaders,
        payload: &P,
    ) -> Result<RpcResponse> {
        let request = RpcRequest {
            url,
            headers: headers.build()?,
            body: serde_json::to_vec(payload)?,
        };
        self.channel.send(request).await
    }
}

fn decode_envelope<T: DeserializeOwned>(response: &RpcResponse) -> Result<Envelope<T>> {
    serde_json::from_slice(&response.body).map_err(|e| {
        if response.is_success() {
            PortalError::Transport(format!("Failed to decode portal response: {e}"))
        } else {
            PortalError::Transport(format!(
                "Request failed with status {} and no error detail",
                response.status
            ))
        }
    })
}

fn ensure_success(response: &RpcResponse) -> Result<()> {
    if response.is_success() {
        Ok(())
    } else {
        Err(PortalError::Transport(format!(
            "Request failed with status {}",
            response.status
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_starts_with_team_id() {
        let empty: [(&str, &str); 0] = [];
        assert_eq!(build_search_query("TEAM1", empty), "teamId=TEAM1");
    }

    #[test]
    fn limit_is_reserved_and_other_keys_become_filters() {
        assert_eq!(
            build_search_query("TEAM1", [("limit", "50")]),
            "teamId=TEAM1&limit=50"
        );
        assert_eq!(
            build_search_query("TEAM1", [("certificateType", "IOS_DEVELOPMENT")]),
            "teamId=TEAM1&filter[certificateType]=IOS_DEVELOPMENT"
        );
    }

    #[test]
    fn multiple_filters_each_appear_once() {
        let mut filter = std::collections::HashMap::new();
        filter.insert("id".to_string(), "ABC".to_string());
        filter.insert("limit".to_string(), "10".to_string());
        let query = build_search_query("T", &filter);
        assert!(query.starts_with("teamId=T&"));
        assert_eq!(query.matches("&filter[id]=ABC").count(), 1);
        assert_eq!(query.matches("&limit=10").count(), 1);
        assert_eq!(query.len(), "teamId=T&filter[id]=ABC&limit=10".len());
    }

    #[test]
    fn record_keeps_non_string_attributes_as_text() {
        let record: CertificateRecord = serde_json::from_str(
            r#"{"type":"certificates","id":"C1","attributes":{"certContent":"MIIB","machineId":null,"status":3,"canDownload":true}}"#,
        )
        .unwrap();
        assert_eq!(record.cert_content(), Some("MIIB"));
        assert_eq!(record.attribute("machineId"), Some("null"));
        assert_eq!(record.attribute("status"), Some("3"));
        assert_eq!(record.attribute("canDownload"), Some("true"));
    }

    #[test]
    fn record_without_attributes_decodes() {
        let record: CertificateRecord =
            serde_json::from_str(r#"{"type":"certificates","id":"C1"}"#).unwrap();
        assert!(record.attributes.is_empty());
        assert_eq!(record.serial_number(), None);
    }

    #[test]
    fn first_error_prefers_detail_then_title() {
        let envelope: Envelope<serde_json::Value> = serde_json::from_str(
            r#"{"errors":[{"title":"Forbidden"},{"detail":"second"}]}"#,
        )
        .unwrap();
        assert_eq!(envelope.first_error().as_deref(), Some("Forbidden"));

        let envelope: Envelope<serde_json::Value> =
            serde_json::from_str(r#"{"errors":[{"detail":"There is a problem","title":"x"}]}"#)
                .unwrap();
        assert_eq!(envelope.first_error().as_deref(), Some("There is a problem"));
    }

    #[test]
    fn create_payload_shape() {
        let payload = CreateRequest {
            data: CreateData {
                resource_type: RESOURCE_TYPE,
                attributes: CreateAttributes {
                    team_id: "TEAM1",
                    certificate_type: "IOS_DEVELOPMENT",
                    csr_content: "CSR",
                },
            },
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "data": {
                    "type": "certificates",
                    "attributes": {
                        "teamId": "TEAM1",
                        "certificateType": "IOS_DEVELOPMENT",
                        "csrContent": "CSR"
                    }
                }
            })
        );
    }
}
