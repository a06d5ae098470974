//! Tests for the built-in sources

use super::*;
use crate::extract::{BatchSource, StopReason};
use crate::http::HttpClient;
use crate::resource::Resource;
use crate::types::WriteMode;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use test_case::test_case;
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

fn client() -> Arc<HttpClient> {
    Arc::new(HttpClient::new().unwrap())
}

fn bearer_client(token: &str) -> Arc<HttpClient> {
    Arc::new(
        HttpClient::with_auth(
            crate::http::HttpClientConfig::default(),
            AuthConfig::bearer(Some(token)),
        )
        .unwrap(),
    )
}

/// Drain a resource into a flat list of records
async fn drain(resource: &mut Resource) -> Vec<Record> {
    let mut records = Vec::new();
    while let Some(batch) = resource.next_batch().await.unwrap() {
        records.extend(batch.into_records());
    }
    records
}

fn ids(records: &[Record]) -> Vec<Value> {
    records.iter().map(|r| r["id"].clone()).collect()
}

// ============================================================================
// Registry Tests
// ============================================================================

#[test]
fn test_registry_lists_all_pipelines() {
    let names: Vec<&str> = list_builtin().map(|def| def.name).collect();
    assert_eq!(
        names,
        vec![
            "github_issues",
            "github_reactions",
            "hackernews",
            "hackernews_rest",
            "jokes",
            "pokemon_api",
            "salesforce_crm",
            "stripe_payments",
        ]
    );
}

#[test_case("github_issues", Some("GITHUB_TOKEN"), DestinationType::Duckdb)]
#[test_case("stripe_payments", Some("STRIPE_API_KEY"), DestinationType::Duckdb)]
#[test_case("salesforce_crm", None, DestinationType::Bigquery)]
#[test_case("hackernews", None, DestinationType::Duckdb)]
fn test_pipeline_defaults(name: &str, token_env: Option<&str>, destination: DestinationType) {
    let def = get_builtin(name).unwrap();
    assert_eq!(def.token_env, token_env);
    assert_eq!(def.destination, destination);
}

#[test]
fn test_unknown_pipeline() {
    let err = require_builtin("twitter").unwrap_err();
    let message = err.to_string();
    assert!(message.contains("Unknown pipeline 'twitter'"));
    assert!(message.contains("jokes"));
}

#[tokio::test]
async fn test_reactions_requires_owner() {
    let config = PipelineConfig::default();
    let def = get_builtin("github_reactions").unwrap();
    let err = (def.build)(&config).await.unwrap_err();
    assert!(matches!(err, Error::MissingConfigField { ref field } if field == "github_owner"));
}

#[tokio::test]
async fn test_reactions_dataset_and_write_mode() {
    let config = PipelineConfig {
        github_owner: Some("dlt-hub".into()),
        github_repo_name: Some("verified-sources".into()),
        ..Default::default()
    };
    let built = (get_builtin("github_reactions").unwrap().build)(&config)
        .await
        .unwrap();
    assert_eq!(built.dataset_name, "github_dlt_hub_verified_sources");
    assert_eq!(built.source.resource_names(), vec!["issues", "pull_requests"]);
    assert!(built
        .source
        .into_resources()
        .iter()
        .all(|r| r.write_mode() == WriteMode::Append));
}

#[tokio::test]
async fn test_github_resources_parsed_from_config() {
    let config = PipelineConfig {
        repos: vec!["dlt-hub/dlt".into(), "octo/hello-world".into()],
        resources: Some(vec!["commits".into()]),
        ..Default::default()
    };
    let built = (get_builtin("github_issues").unwrap().build)(&config)
        .await
        .unwrap();
    assert!(built.selection_applied);
    assert_eq!(built.dataset_name, "github_data");
    assert_eq!(
        built.source.resource_names(),
        vec!["dlt_commits", "hello-world_commits"]
    );

    let config = PipelineConfig {
        resources: Some(vec!["stars".into()]),
        ..Default::default()
    };
    let err = (get_builtin("github_issues").unwrap().build)(&config)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidConfigValue { .. }));
}

#[tokio::test]
async fn test_stripe_requires_api_key() {
    let def = get_builtin("stripe_payments").unwrap();
    let err = (def.build)(&PipelineConfig::default()).await.unwrap_err();
    assert!(matches!(err, Error::Config { .. }));
}

// ============================================================================
// GitHub Tests
// ============================================================================

#[tokio::test]
async fn test_github_issues_filter_pull_requests() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/dlt-hub/dlt/issues"))
        .and(query_param("state", "all"))
        .and(query_param("per_page", "100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": 1, "title": "bug"},
            {"id": 2, "title": "pr", "pull_request": {"url": "x"}},
            {"id": 3, "title": "feature"}
        ])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/dlt-hub/dlt/pulls"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 2}])))
        .expect(1)
        .mount(&server)
        .await;

    let source = github::issues_source(
        client(),
        &server.uri(),
        &["dlt-hub/dlt".to_string()],
        &github::GithubResource::DEFAULT,
        PageLimits::none(),
    )
    .unwrap();
    assert_eq!(source.resource_names(), vec!["dlt_issues", "dlt_pull_requests"]);

    let mut resources = source.into_resources();
    assert_eq!(resources[0].write_mode(), WriteMode::Merge);
    assert_eq!(resources[0].primary_key(), Some("id"));
    assert_eq!(ids(&drain(&mut resources[0]).await), vec![json!(1), json!(3)]);
    assert_eq!(ids(&drain(&mut resources[1]).await), vec![json!(2)]);
}

#[tokio::test]
async fn test_github_commits_capped_at_ten_pages() {
    let server = MockServer::start().await;
    let base = server.uri();
    Mock::given(method("GET"))
        .and(path("/repos/dlt-hub/dlt/commits"))
        .respond_with(move |request: &Request| {
            let page: u32 = request
                .url
                .query_pairs()
                .find(|(k, _)| k == "page")
                .and_then(|(_, v)| v.parse().ok())
                .unwrap_or(1);
            ResponseTemplate::new(200)
                .insert_header(
                    "link",
                    format!("<{base}/repos/dlt-hub/dlt/commits?page={}>; rel=\"next\"", page + 1)
                        .as_str(),
                )
                .set_body_json(json!([{"sha": format!("c{page}")}]))
        })
        .expect(10)
        .mount(&server)
        .await;

    let source = github::issues_source(
        client(),
        &server.uri(),
        &["dlt-hub/dlt".to_string()],
        &[github::GithubResource::Commits],
        PageLimits::none(),
    )
    .unwrap();
    let mut commits = source.into_resources().remove(0);
    assert_eq!(commits.write_mode(), WriteMode::Append);
    assert_eq!(commits.primary_key(), Some("sha"));

    assert_eq!(drain(&mut commits).await.len(), 10);
    assert_eq!(commits.progress().state.stop_reason(), Some(StopReason::Truncated));
}

#[test]
fn test_github_repo_must_have_owner() {
    let err = github::issues_source(
        client(),
        github::GITHUB_API_URL,
        &["dlt".to_string()],
        &github::GithubResource::DEFAULT,
        PageLimits::none(),
    )
    .unwrap_err();
    assert!(matches!(err, Error::InvalidConfigValue { ref field, .. } if field == "repos"));
}

// ============================================================================
// Hacker News Tests
// ============================================================================

#[tokio::test]
async fn test_hackernews_firebase_stories() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/topstories.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([101, 102, 103])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/beststories.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([101])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/item/101.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 101, "title": "Show HN", "score": 42, "by": "pg",
            "time": 1_700_000_000, "type": "story", "kids": [1, 2]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/item/102.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(null)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/item/103.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 103, "title": "Ask HN", "url": "https://example.com",
            "score": 7, "by": "dang", "time": 1_700_000_100, "type": "story",
            "descendants": 12
        })))
        .mount(&server)
        .await;

    let source =
        hackernews::firebase_source(client(), &server.uri(), PageLimits::none()).unwrap();
    let mut resources = source.into_resources();
    assert!(resources.iter().all(|r| r.write_mode() == WriteMode::Replace));

    let top = drain(&mut resources[0]).await;
    assert_eq!(top.len(), 2);
    assert_eq!(
        Value::Object(top[0].clone()),
        json!({
            "id": 101, "title": "Show HN", "url": null, "score": 42, "by": "pg",
            "time": 1_700_000_000, "type": "story", "descendants": 0
        })
    );
    assert_eq!(top[1]["descendants"], json!(12));

    let best = drain(&mut resources[1]).await;
    assert_eq!(best.len(), 1);
    assert!(!best[0].contains_key("descendants"));
}

#[tokio::test]
async fn test_hackernews_max_items_override() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/topstories.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!((1..=60).collect::<Vec<u32>>())))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/item/1.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 1})))
        .expect(1)
        .mount(&server)
        .await;

    let source = hackernews::firebase_source(
        client(),
        &server.uri(),
        PageLimits::none().with_max_items(Some(1)),
    )
    .unwrap();
    let mut top = source.into_resources().remove(0);
    assert_eq!(drain(&mut top).await.len(), 1);
    assert_eq!(top.progress().pages, 2);
}

#[tokio::test]
async fn test_hackernews_algolia_hits() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("tags", "front_page"))
        .and(query_param("hitsPerPage", "50"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "hits": [{"objectID": "1", "title": "a"}, {"objectID": "2", "title": "b"}],
            "nbPages": 1
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("numericFilters", "points>100"))
        .and(query_param("hitsPerPage", "30"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"hits": []})))
        .expect(1)
        .mount(&server)
        .await;

    let source =
        hackernews::algolia_source(client(), &server.uri(), PageLimits::none()).unwrap();
    let mut resources = source.into_resources();
    assert_eq!(drain(&mut resources[0]).await.len(), 2);
    assert!(drain(&mut resources[1]).await.is_empty());
    assert_eq!(
        resources[1].progress().state.stop_reason(),
        Some(StopReason::EmptyPage)
    );
}

// ============================================================================
// Jokes / Pokemon Tests
// ============================================================================

#[tokio::test]
async fn test_jokes_skip_error_payloads() {
    let server = MockServer::start().await;
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    Mock::given(method("GET"))
        .and(path("/joke/Programming"))
        .and(query_param("type", "single"))
        .respond_with(move |_: &Request| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            if n == 1 {
                ResponseTemplate::new(200)
                    .set_body_json(json!({"error": true, "message": "No matching joke found"}))
            } else {
                ResponseTemplate::new(200).set_body_json(json!({
                    "error": false, "category": "Programming", "type": "single",
                    "joke": format!("joke {n}"), "id": n, "safe": true, "lang": "en"
                }))
            }
        })
        .mount(&server)
        .await;

    let source = jokes::jokes_source(client(), &server.uri(), 3, PageLimits::none()).unwrap();
    let mut resource = source.into_resources().remove(0);
    assert_eq!(resource.write_mode(), WriteMode::Append);

    let jokes = drain(&mut resource).await;
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(ids(&jokes), vec![json!(0), json!(2)]);
    assert_eq!(
        Value::Object(jokes[0].clone()),
        json!({"id": 0, "joke": "joke 0", "category": "Programming", "language": "en", "safe": true})
    );
}

#[tokio::test]
async fn test_pokemon_flattened() {
    let server = MockServer::start().await;
    for id in 1..=2u32 {
        Mock::given(method("GET"))
            .and(path(format!("/pokemon/{id}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": id,
                "name": format!("mon{id}"),
                "height": 7,
                "weight": 69,
                "base_experience": 64,
                "types": [{"slot": 1, "type": {"name": "grass"}}, {"slot": 2, "type": {"name": "poison"}}],
                "abilities": [{"ability": {"name": "overgrow"}}],
                "stats": [
                    {"base_stat": 45, "stat": {"name": "hp"}},
                    {"base_stat": 65, "stat": {"name": "special-attack"}}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;
    }

    let source = pokemon::pokemon_source(
        client(),
        &server.uri(),
        PageLimits::none().with_max_items(Some(2)),
    )
    .unwrap();
    let mut pokemon = source.into_resources().remove(0);
    let rows = drain(&mut pokemon).await;

    assert_eq!(rows.len(), 2);
    assert_eq!(
        Value::Object(rows[0].clone()),
        json!({
            "id": 1, "name": "mon1", "height": 7, "weight": 69, "base_experience": 64,
            "types": ["grass", "poison"],
            "abilities": ["overgrow"],
            "stats": {"hp": 45, "special-attack": 65}
        })
    );
}

#[tokio::test]
async fn test_pokemon_types_follow_urls() {
    let server = MockServer::start().await;
    let base = server.uri();
    Mock::given(method("GET"))
        .and(path("/type"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "count": 2,
            "results": [
                {"name": "normal", "url": format!("{base}/type/1/")},
                {"name": "fighting", "url": format!("{base}/type/2/")}
            ]
        })))
        .mount(&server)
        .await;
    for (id, name, count) in [(1, "normal", 3), (2, "fighting", 1)] {
        Mock::given(method("GET"))
            .and(path(format!("/type/{id}/")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": id,
                "name": name,
                "pokemon": vec![json!({"slot": 1}); count]
            })))
            .mount(&server)
            .await;
    }

    let source = pokemon::pokemon_source(client(), &server.uri(), PageLimits::none()).unwrap();
    let mut types = source.into_resources().remove(1);
    let rows = drain(&mut types).await;
    assert_eq!(
        rows.into_iter().map(Value::Object).collect::<Vec<_>>(),
        vec![
            json!({"id": 1, "name": "normal", "pokemon_count": 3}),
            json!({"id": 2, "name": "fighting", "pokemon_count": 1}),
        ]
    );
}

#[tokio::test]
async fn test_pokemon_missing_field_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/pokemon/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 1, "name": "x"})))
        .mount(&server)
        .await;

    let source = pokemon::pokemon_source(
        client(),
        &server.uri(),
        PageLimits::none().with_max_items(Some(1)),
    )
    .unwrap();
    let mut pokemon = source.into_resources().remove(0);
    let err = pokemon.next_batch().await.unwrap_err();
    assert!(matches!(err, Error::MalformedResponse { .. }));
}

// ============================================================================
// Salesforce / Stripe Tests
// ============================================================================

const LOGIN_RESPONSE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/" xmlns="urn:partner.soap.sforce.com">
  <soapenv:Body>
    <loginResponse>
      <result>
        <serverUrl>https://acme.my.salesforce.com/services/Soap/u/59.0/00D000000000001</serverUrl>
        <sessionId>00D!session</sessionId>
      </result>
    </loginResponse>
  </soapenv:Body>
</soapenv:Envelope>"#;

fn salesforce_config(login_url: String) -> crate::config::SalesforceConfig {
    crate::config::SalesforceConfig {
        username: Some("ops@acme.com".into()),
        password: Some("p&ss".into()),
        security_token: Some("TOKEN".into()),
        login_url,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_salesforce_login() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/services/Soap/u/59.0"))
        .and(header("SOAPAction", "login"))
        .and(body_string_contains("<urn:password>p&amp;ssTOKEN</urn:password>"))
        .respond_with(ResponseTemplate::new(200).set_body_string(LOGIN_RESPONSE))
        .expect(1)
        .mount(&server)
        .await;

    let session = salesforce::login(&HttpClient::new().unwrap(), &salesforce_config(server.uri()))
        .await
        .unwrap();
    assert_eq!(session.session_id, "00D!session");
    assert_eq!(session.instance_url, "https://acme.my.salesforce.com");
}

#[tokio::test]
async fn test_salesforce_login_fault() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/services/Soap/u/59.0"))
        .respond_with(ResponseTemplate::new(500).set_body_string(
            "<soapenv:Envelope><soapenv:Body><soapenv:Fault>\
             <faultcode>INVALID_LOGIN</faultcode>\
             <faultstring>INVALID_LOGIN: Invalid username, password, security token; or user locked out.</faultstring>\
             </soapenv:Fault></soapenv:Body></soapenv:Envelope>",
        ))
        .mount(&server)
        .await;

    let err = salesforce::login(&HttpClient::new().unwrap(), &salesforce_config(server.uri()))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Auth { ref message } if message.contains("INVALID_LOGIN")));
}

#[tokio::test]
async fn test_salesforce_login_without_server_url() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/services/Soap/u/59.0"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "<soapenv:Envelope><soapenv:Body><loginResponse><result>\
             <sf:sessionId>00D!session</sf:sessionId>\
             </result></loginResponse></soapenv:Body></soapenv:Envelope>",
        ))
        .mount(&server)
        .await;

    let err = salesforce::login(&HttpClient::new().unwrap(), &salesforce_config(server.uri()))
        .await
        .unwrap_err();
    assert!(
        matches!(err, Error::MalformedResponse { ref message } if message.contains("serverUrl"))
    );
}

#[tokio::test]
async fn test_salesforce_login_requires_username() {
    let config = crate::config::SalesforceConfig::default();
    let err = salesforce::login(&HttpClient::new().unwrap(), &config)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::MissingConfigField { ref field } if field == "salesforce.username"));
}

#[tokio::test]
async fn test_salesforce_query_pages() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/services/data/v59.0/query/01g-2000"))
        .and(header("authorization", "Bearer 00D!session"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "done": true,
            "records": [{"attributes": {"type": "Account"}, "Id": "001B", "Name": "Globex"}]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/services/data/v59.0/query"))
        .and(query_param(
            "q",
            salesforce::soql("Account", salesforce::OBJECTS[0].2).as_str(),
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "done": false,
            "nextRecordsUrl": "/services/data/v59.0/query/01g-2000",
            "records": [{"attributes": {"type": "Account"}, "Id": "001A", "Name": "Acme"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let source = salesforce::crm_source(
        bearer_client("00D!session"),
        &server.uri(),
        "59.0",
        PageLimits::none(),
    )
    .unwrap();
    assert_eq!(
        source.resource_names(),
        vec!["accounts", "opportunities", "contacts", "leads"]
    );

    let mut accounts = source.into_resources().remove(0);
    assert_eq!(accounts.write_mode(), WriteMode::Merge);
    assert_eq!(accounts.primary_key(), Some("Id"));

    let rows = drain(&mut accounts).await;
    assert_eq!(
        rows.into_iter().map(Value::Object).collect::<Vec<_>>(),
        vec![
            json!({"Id": "001A", "Name": "Acme"}),
            json!({"Id": "001B", "Name": "Globex"}),
        ]
    );
}

#[test]
fn test_soql() {
    assert_eq!(
        salesforce::soql("Lead", "Id, Email"),
        "SELECT Id, Email FROM Lead WHERE IsDeleted = false"
    );
}

#[tokio::test]
async fn test_stripe_pages_with_starting_after() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/customers"))
        .and(query_param("starting_after", "cus_2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "object": "list", "data": [{"id": "cus_3"}], "has_more": false
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/customers"))
        .and(query_param("limit", "100"))
        .and(header("authorization", "Bearer sk_test_123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "object": "list", "data": [{"id": "cus_1"}, {"id": "cus_2"}], "has_more": true
        })))
        .expect(1)
        .mount(&server)
        .await;

    let source =
        stripe::stripe_source(bearer_client("sk_test_123"), &server.uri(), PageLimits::none())
            .unwrap();
    assert_eq!(source.resource_names(), vec!["payments", "customers"]);

    let mut customers = source.into_resources().remove(1);
    let rows = drain(&mut customers).await;
    assert_eq!(ids(&rows), vec![json!("cus_1"), json!("cus_2"), json!("cus_3")]);
    assert_eq!(customers.progress().pages, 2);
}

#[test]
fn test_stripe_without_key_fails_early() {
    let err = stripe::stripe_source(client(), stripe::STRIPE_API_URL, PageLimits::none())
        .unwrap_err();
    assert!(matches!(err, Error::Config { .. }));
}
