//! Outbound HTTP: postal-code address lookup and remote order submission.
//!
//! Both endpoints are unreliable external collaborators. Lookup failures
//! surface as errors for the caller to turn into a user message; submission
//! failures are absorbed by the pending-order queue (see [`crate::sync`]).

use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::models::OrderPayload;

/// Default timeout for API requests (30 seconds).
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout used specifically for the lightweight connectivity probe.
const CONNECTIVITY_TIMEOUT: Duration = Duration::from_secs(10);

/// Default base URL of the CEP resolution service.
pub const DEFAULT_CEP_LOOKUP_URL: &str = "https://viacep.com.br";

/// Build the shared HTTP client with the default request timeout.
pub fn build_client() -> Result<Client> {
    Client::builder()
        .timeout(DEFAULT_TIMEOUT)
        .build()
        .map_err(|e| Error::Network(format!("build http client: {e}")))
}

// ---------------------------------------------------------------------------
// URL normalisation
// ---------------------------------------------------------------------------

/// Normalise a configured endpoint URL:
/// - ensure a scheme is present (https, or http for localhost)
/// - strip trailing slashes
pub fn normalize_endpoint_url(url: &str) -> String {
    let mut url = url.trim().to_string();

    if !url.starts_with("http://") && !url.starts_with("https://") {
        if url.starts_with("localhost") || url.starts_with("127.0.0.1") {
            url = format!("http://{url}");
        } else {
            url = format!("https://{url}");
        }
    }

    while url.ends_with('/') {
        url.pop();
    }

    url
}

// ---------------------------------------------------------------------------
// Address lookup (CEP)
// ---------------------------------------------------------------------------

/// Address fields prefilled from a CEP lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressFields {
    pub address: String,
    pub neighborhood: String,
    pub city: String,
    pub state: String,
}

/// Parse a ViaCEP-shaped response body. A body carrying an `erro` marker is
/// the service's not-found indicator.
fn parse_cep_body(body: &Value) -> Option<AddressFields> {
    let not_found = match body.get("erro") {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s == "true",
        Some(Value::Null) | None => false,
        Some(_) => true,
    };
    if not_found {
        return None;
    }
    let field = |key: &str| {
        body.get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    Some(AddressFields {
        address: field("logradouro"),
        neighborhood: field("bairro"),
        city: field("localidade"),
        state: field("uf"),
    })
}

/// Resolve an 8-digit CEP into address fields.
///
/// Returns `Ok(None)` both for malformed input (anything that does not
/// normalize to 8 digits) and for the service's not-found answer; prefill
/// is best-effort and never blocks checkout submission.
pub async fn lookup_address(
    client: &Client,
    base_url: &str,
    cep: &str,
) -> Result<Option<AddressFields>> {
    let digits: String = cep.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() != 8 {
        return Ok(None);
    }

    let url = format!("{}/ws/{digits}/json/", normalize_endpoint_url(base_url));
    let response = client.get(&url).send().await.map_err(|e| {
        warn!(cep = %digits, error = %e, "CEP lookup request failed");
        Error::Network(format!("CEP lookup: {e}"))
    })?;

    if !response.status().is_success() {
        return Err(Error::Network(format!(
            "CEP lookup: HTTP {}",
            response.status()
        )));
    }

    let body: Value = response
        .json()
        .await
        .map_err(|e| Error::Network(format!("CEP lookup body: {e}")))?;

    Ok(parse_cep_body(&body))
}

// ---------------------------------------------------------------------------
// Order submission
// ---------------------------------------------------------------------------

/// POST an order payload to the remote endpoint. Non-2xx answers and
/// transport failures are both `Network` errors; callers fall back to the
/// pending queue.
pub async fn submit_order(client: &Client, endpoint: &str, order: &OrderPayload) -> Result<()> {
    let response = client
        .post(endpoint)
        .json(order)
        .send()
        .await
        .map_err(|e| Error::Network(format!("order submission: {e}")))?;

    if !response.status().is_success() {
        return Err(Error::Network(format!(
            "order submission: HTTP {}",
            response.status()
        )));
    }

    info!(order_id = %order.id, "order submitted to remote endpoint");
    Ok(())
}

/// Lightweight connectivity probe against the order endpoint.
pub async fn check_connectivity(client: &Client, endpoint: &str) -> bool {
    match client
        .head(endpoint)
        .timeout(CONNECTIVITY_TIMEOUT)
        .send()
        .await
    {
        Ok(_) => true,
        Err(_) => false,
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_endpoint_url() {
        assert_eq!(
            normalize_endpoint_url("example.com/pedidos/"),
            "https://example.com/pedidos"
        );
        assert_eq!(
            normalize_endpoint_url("localhost:3000"),
            "http://localhost:3000"
        );
        assert_eq!(
            normalize_endpoint_url("  https://api.example.com// "),
            "https://api.example.com"
        );
    }

    #[test]
    fn test_parse_cep_body_success() {
        let body = json!({
            "cep": "01001-000",
            "logradouro": "Praça da Sé",
            "bairro": "Sé",
            "localidade": "São Paulo",
            "uf": "SP"
        });
        assert_eq!(
            parse_cep_body(&body),
            Some(AddressFields {
                address: "Praça da Sé".into(),
                neighborhood: "Sé".into(),
                city: "São Paulo".into(),
                state: "SP".into(),
            })
        );
    }

    #[test]
    fn test_parse_cep_body_not_found() {
        assert_eq!(parse_cep_body(&json!({ "erro": true })), None);
        assert_eq!(parse_cep_body(&json!({ "erro": "true" })), None);
    }

    #[test]
    fn test_parse_cep_body_missing_fields_default_to_empty() {
        let fields = parse_cep_body(&json!({ "localidade": "São Paulo" })).expect("parsed");
        assert_eq!(fields.city, "São Paulo");
        assert_eq!(fields.address, "");
    }

    #[tokio::test]
    async fn test_lookup_address_rejects_short_cep_without_request() {
        let client = build_client().expect("client");
        // Never reaches the network: the CEP fails the 8-digit check first.
        let result = lookup_address(&client, DEFAULT_CEP_LOOKUP_URL, "123")
            .await
            .expect("short CEP is a clean miss");
        assert_eq!(result, None);
    }
}
