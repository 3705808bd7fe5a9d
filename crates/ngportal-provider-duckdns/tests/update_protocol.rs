//! Integration tests for the DuckDNS update protocol using wiremock

use ngportal_core::config::AuthToken;
use ngportal_core::error::ProviderError;
use ngportal_core::traits::DnsProvider;
use ngportal_core::FailureReason;
use ngportal_provider_duckdns::DuckDnsProvider;
use std::net::IpAddr;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn scenario_ip() -> IpAddr {
    IpAddr::from([203, 0, 113, 42])
}

/// Mock server answering `body` to the scenario request only
async fn duckdns_answering(response: ResponseTemplate) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/update"))
        .and(query_param("domains", "myhouse"))
        .and(query_param("token", "abc"))
        .and(query_param("ip", "203.0.113.42"))
        .respond_with(response)
        .expect(1)
        .mount(&server)
        .await;
    server
}

async fn update_against(server: &MockServer, domain: &str) -> Result<(), ProviderError> {
    let provider = DuckDnsProvider::with_base_url(server.uri()).unwrap();
    provider
        .update(domain, &AuthToken::new("abc"), scenario_ip())
        .await
}

#[tokio::test]
async fn test_ok_is_success() {
    let server = duckdns_answering(ResponseTemplate::new(200).set_body_string("OK")).await;
    assert_eq!(update_against(&server, "myhouse").await, Ok(()));
}

#[tokio::test]
async fn test_ko_is_auth_or_domain() {
    let server = duckdns_answering(ResponseTemplate::new(200).set_body_string("KO")).await;
    let err = update_against(&server, "myhouse").await.unwrap_err();
    assert_eq!(err, ProviderError::AuthOrDomain);
    assert_eq!(err.reason(), FailureReason::AuthOrDomain);
}

#[tokio::test]
async fn test_other_body_is_unknown() {
    let server = duckdns_answering(ResponseTemplate::new(200).set_body_string("maybe")).await;
    let err = update_against(&server, "myhouse").await.unwrap_err();
    assert_eq!(err.reason(), FailureReason::Unknown);
    assert!(err.to_string().contains("maybe"));
}

#[tokio::test]
async fn test_trailing_newline_is_accepted() {
    let server = duckdns_answering(ResponseTemplate::new(200).set_body_string("OK\n")).await;
    assert_eq!(update_against(&server, "myhouse").await, Ok(()));
}

#[tokio::test]
async fn test_full_hostname_is_reduced_to_label() {
    let server = duckdns_answering(ResponseTemplate::new(200).set_body_string("OK")).await;
    assert_eq!(update_against(&server, "myhouse.duckdns.org").await, Ok(()));
}

#[tokio::test]
async fn test_server_error_is_unknown_without_token() {
    let server = duckdns_answering(ResponseTemplate::new(502).set_body_string("OK")).await;
    let err = update_against(&server, "myhouse").await.unwrap_err();

    assert_eq!(err.reason(), FailureReason::Unknown);
    assert!(err.to_string().contains("502"));
    assert!(!err.to_string().contains("abc"));
}

#[tokio::test]
async fn test_unreachable_server_is_unknown_without_token() {
    let server = MockServer::start().await;
    let base = server.uri();
    drop(server);

    let provider = DuckDnsProvider::with_base_url(base).unwrap();
    let err = provider
        .update("myhouse", &AuthToken::new("secret-token-value"), scenario_ip())
        .await
        .unwrap_err();

    assert_eq!(err.reason(), FailureReason::Unknown);
    assert!(!err.to_string().contains("secret-token-value"));
}
