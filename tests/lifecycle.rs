use pactmock::matchers::{each_like, like};
use pactmock::{
    Interaction, LifecycleState, MatchSpec, MockProvider, PactError, RequestSpec, ResponseSpec,
};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::io::{ErrorKind, Read, Write};
use std::net::{TcpListener, TcpStream};

fn interaction(description: &str, path: &str, status: u16) -> Interaction {
    Interaction {
        state: Some("the provider is up".into()),
        description: description.into(),
        request: RequestSpec {
            method: "GET".into(),
            path: path.into(),
            ..Default::default()
        },
        response: ResponseSpec {
            status,
            ..Default::default()
        },
    }
}

#[async_std::test]
async fn setup_starts_the_server() {
    // Arrange
    let mut provider = MockProvider::new("consumer", "provider");
    assert_eq!(provider.state(), LifecycleState::Uninitialized);
    assert!(provider.address().is_none());

    // Act
    provider.setup().await.unwrap();

    // Assert
    assert_eq!(provider.state(), LifecycleState::Running);
    assert!(TcpStream::connect(provider.address().unwrap()).is_ok());
    provider.finalize().await.unwrap();
}

#[async_std::test]
async fn setup_is_idempotent_while_running() {
    let mut provider = MockProvider::new("consumer", "provider");
    provider.setup().await.unwrap();
    let address = provider.address();

    provider.setup().await.unwrap();

    assert_eq!(provider.address(), address);
    assert_eq!(provider.state(), LifecycleState::Running);
    provider.finalize().await.unwrap();
}

#[async_std::test]
async fn setup_after_finalize_is_a_misuse() {
    let mut provider = MockProvider::new("consumer", "provider");
    provider.setup().await.unwrap();
    provider.finalize().await.unwrap();

    let outcome = provider.setup().await;

    assert!(matches!(
        outcome,
        Err(PactError::LifecycleMisuse {
            operation: "setup",
            state: LifecycleState::Finalized
        })
    ));
}

#[async_std::test]
async fn setup_fails_if_the_port_is_taken() {
    // Arrange
    let taken = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = taken.local_addr().unwrap().port();
    let mut provider = MockProvider::builder("consumer", "provider")
        .port(port)
        .build();

    // Act
    let outcome = provider.setup().await;

    // Assert
    assert!(matches!(outcome, Err(PactError::SetupFailure(_))));
    assert_eq!(provider.state(), LifecycleState::Uninitialized);
}

#[async_std::test]
async fn add_interaction_before_setup_is_a_misuse() {
    let mut provider = MockProvider::new("consumer", "provider");

    let outcome = provider
        .add_interaction(interaction("ping", "/ping", 200))
        .await;

    assert!(matches!(
        outcome,
        Err(PactError::LifecycleMisuse {
            operation: "add_interaction",
            state: LifecycleState::Uninitialized
        })
    ));
}

#[async_std::test]
async fn add_interaction_after_finalize_is_a_misuse() {
    let mut provider = MockProvider::new("consumer", "provider");
    provider.setup().await.unwrap();
    provider.finalize().await.unwrap();

    let outcome = provider
        .add_interaction(interaction("ping", "/ping", 200))
        .await;

    assert!(matches!(
        outcome,
        Err(PactError::LifecycleMisuse {
            operation: "add_interaction",
            state: LifecycleState::Finalized
        })
    ));
}

#[async_std::test]
async fn verify_before_setup_is_a_misuse() {
    let mut provider = MockProvider::new("consumer", "provider");

    assert!(matches!(
        provider.verify().await,
        Err(PactError::LifecycleMisuse { .. })
    ));
}

#[async_std::test]
async fn finalize_without_setup_is_a_no_op() {
    let mut provider = MockProvider::new("consumer", "provider");

    provider.finalize().await.unwrap();

    assert_eq!(provider.state(), LifecycleState::Uninitialized);
}

#[async_std::test]
async fn finalize_is_idempotent() {
    // Arrange
    let mut provider = MockProvider::new("consumer", "provider");
    provider.setup().await.unwrap();
    let address = provider.address().unwrap();

    // Act
    provider.finalize().await.unwrap();
    provider.finalize().await.unwrap();

    // Assert
    assert_eq!(provider.state(), LifecycleState::Finalized);
    assert!(TcpStream::connect(address).is_err());
}

#[async_std::test]
async fn verify_walks_the_per_test_states() {
    let mut provider = MockProvider::new("consumer", "provider");
    provider.setup().await.unwrap();

    provider
        .add_interaction(interaction("ping", "/ping", 200))
        .await
        .unwrap();
    assert_eq!(provider.state(), LifecycleState::Registering);

    reqwest::get(format!("{}/ping", provider.uri())).await.unwrap();
    provider.verify().await.unwrap();
    assert_eq!(provider.state(), LifecycleState::Verified);

    // The next test registers again.
    provider
        .add_interaction(interaction("pong", "/pong", 200))
        .await
        .unwrap();
    assert_eq!(provider.state(), LifecycleState::Registering);
    reqwest::get(format!("{}/pong", provider.uri())).await.unwrap();
    provider.verify().await.unwrap();
    provider.finalize().await.unwrap();
}

#[async_std::test]
async fn verify_fails_when_an_interaction_was_not_invoked() {
    // Arrange
    let mut provider = MockProvider::new("consumer", "provider");
    provider.setup().await.unwrap();
    provider
        .add_interaction(interaction("A: list clients", "/clients", 200))
        .await
        .unwrap();
    provider
        .add_interaction(interaction("B: get client", "/clients/1", 200))
        .await
        .unwrap();

    // Act - only B is invoked
    let status = reqwest::get(format!("{}/clients/1", provider.uri()))
        .await
        .unwrap()
        .status();
    let outcome = provider.verify().await;

    // Assert
    assert_eq!(status, 200);
    let Err(PactError::VerificationFailed(report)) = outcome else {
        panic!("Expected a verification failure");
    };
    assert_eq!(report.missing.len(), 1);
    assert_eq!(report.missing[0].description, "A: list clients");
    assert_eq!(report.missing[0].state.as_deref(), Some("the provider is up"));
    assert!(report.unexpected.is_empty());
    provider.finalize().await.unwrap();
}

#[async_std::test]
async fn verify_clears_the_registry_even_when_it_fails() {
    // Arrange
    let mut provider = MockProvider::new("consumer", "provider");
    provider.setup().await.unwrap();
    let handle = provider
        .add_interaction(interaction("never invoked", "/clients", 200))
        .await
        .unwrap();
    assert!(provider.verify().await.is_err());

    // Act - same request in the next test, without registering anything
    let status = reqwest::get(format!("{}/clients", provider.uri()))
        .await
        .unwrap()
        .status();

    // Assert
    assert_eq!(status, 500);
    assert_eq!(provider.is_satisfied(handle).await, None);
    provider.finalize().await.unwrap();
}

#[async_std::test]
async fn verify_fails_on_unexpected_requests() {
    // Arrange
    let mut provider = MockProvider::new("consumer", "provider");
    provider.setup().await.unwrap();

    // Act
    let response = reqwest::get(format!("{}/missing?page=1", provider.uri()))
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status(), 500);
    let diagnostic: Value = response.json().await.unwrap();
    assert_eq!(
        diagnostic["message"],
        "No interaction found for GET /missing?page=1"
    );
    let Err(PactError::VerificationFailed(report)) = provider.verify().await else {
        panic!("Expected a verification failure");
    };
    assert!(report.missing.is_empty());
    assert_eq!(report.unexpected.len(), 1);
    assert_eq!(report.unexpected[0].request.url.path(), "/missing");
    provider.finalize().await.unwrap();
}

#[async_std::test]
async fn the_error_message_lists_received_requests() {
    let mut provider = MockProvider::new("consumer", "provider");
    provider.setup().await.unwrap();
    provider
        .add_interaction(interaction("list clients", "/clients", 200))
        .await
        .unwrap();
    reqwest::get(format!("{}/people", provider.uri())).await.unwrap();

    let message = provider.verify().await.unwrap_err().to_string();

    assert!(message.starts_with("Verifications failed:\n- Missing interaction: list clients (given the provider is up)\n- Unexpected request: GET /people\n"));
    assert!(message.contains("Received requests:\n- Request #1\n\tGET http://localhost/people"));
    provider.finalize().await.unwrap();
}

#[async_std::test]
async fn the_error_message_without_request_recording() {
    let mut provider = MockProvider::builder("consumer", "provider")
        .disable_request_recording()
        .build();
    provider.setup().await.unwrap();
    provider
        .add_interaction(interaction("list clients", "/clients", 200))
        .await
        .unwrap();

    let message = provider.verify().await.unwrap_err().to_string();

    assert!(message.ends_with("Enable request recording on the mock provider to get the list of incoming requests as part of the error message."));
    assert!(provider.received_requests().await.is_none());
    provider.finalize().await.unwrap();
}

#[async_std::test]
async fn received_requests_are_reset_by_verify() {
    let mut provider = MockProvider::new("consumer", "provider");
    provider.setup().await.unwrap();
    provider
        .add_interaction(interaction("ping", "/ping", 204))
        .await
        .unwrap();

    reqwest::get(format!("{}/ping", provider.uri())).await.unwrap();
    let received = provider.received_requests().await.unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].url.path(), "/ping");

    provider.verify().await.unwrap();
    assert!(provider.received_requests().await.unwrap().is_empty());
    provider.finalize().await.unwrap();
}

#[async_std::test]
async fn the_same_request_is_answered_by_successive_interactions() {
    // Arrange
    let mut provider = MockProvider::new("consumer", "provider");
    provider.setup().await.unwrap();
    let mut first = interaction("first page", "/clients", 200);
    first.response.body = Some(json!([{"id": 1}]).into());
    let mut second = interaction("second page", "/clients", 200);
    second.response.body = Some(json!([{"id": 2}]).into());
    provider.add_interaction(first).await.unwrap();
    provider.add_interaction(second).await.unwrap();

    // Act
    let uri = format!("{}/clients", provider.uri());
    let first_body: Value = reqwest::get(&uri).await.unwrap().json().await.unwrap();
    let second_body: Value = reqwest::get(&uri).await.unwrap().json().await.unwrap();
    let third_status = reqwest::get(&uri).await.unwrap().status();

    // Assert
    assert_eq!(first_body, json!([{"id": 1}]));
    assert_eq!(second_body, json!([{"id": 2}]));
    assert_eq!(third_status, 500);
    provider.finalize().await.unwrap();
}

#[async_std::test]
async fn concurrent_identical_requests_never_claim_the_same_interaction() {
    // Arrange
    let mut provider = MockProvider::new("consumer", "provider");
    provider.setup().await.unwrap();
    for id in 0..10 {
        let mut page = interaction(&format!("page {}", id), "/clients", 200);
        page.response.body = Some(json!({"id": id}).into());
        provider.add_interaction(page).await.unwrap();
    }

    // Act
    let uri = format!("{}/clients", provider.uri());
    let requests = (0..10).map(|_| {
        let uri = uri.clone();
        async move {
            let body: Value = reqwest::get(&uri).await.unwrap().json().await.unwrap();
            body["id"].as_u64().unwrap()
        }
    });
    let mut ids = futures::future::join_all(requests).await;

    // Assert
    ids.sort_unstable();
    assert_eq!(ids, (0..10).collect::<Vec<u64>>());
    provider.verify().await.unwrap();
    provider.finalize().await.unwrap();
}

#[async_std::test]
async fn response_bodies_are_resolved_before_being_sent() {
    let mut provider = MockProvider::new("consumer", "provider");
    provider.setup().await.unwrap();
    let mut created = interaction("create", "/clients", 201);
    created.request.method = "POST".into();
    created.response.body = Some(like(json!({"id": 3, "tags": ["jedi"]})));
    provider.add_interaction(created).await.unwrap();

    let response = reqwest::Client::new()
        .post(format!("{}/clients", provider.uri()))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 201);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({"id": 3, "tags": ["jedi"]}));
    provider.verify().await.unwrap();
    provider.finalize().await.unwrap();
}

#[async_std::test]
async fn plain_text_bodies_are_sent_as_is() {
    let mut provider = MockProvider::new("consumer", "provider");
    provider.setup().await.unwrap();
    let mut health = interaction("health", "/health", 200);
    health.response.headers = Some(BTreeMap::from([(
        "Content-Type".to_string(),
        MatchSpec::from("text/plain"),
    )]));
    health.response.body = Some(json!("OK").into());
    provider.add_interaction(health).await.unwrap();

    let response = reqwest::get(format!("{}/health", provider.uri()))
        .await
        .unwrap();

    assert_eq!(response.headers()["content-type"], "text/plain");
    assert_eq!(response.text().await.unwrap(), "OK");
    provider.verify().await.unwrap();
    provider.finalize().await.unwrap();
}

#[async_std::test]
async fn a_listener_can_be_provided() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let expected_address = listener.local_addr().unwrap();
    let mut provider = MockProvider::builder("consumer", "provider")
        .listener(listener)
        .build();

    provider.setup().await.unwrap();

    assert_eq!(provider.address(), Some(expected_address));
    assert_eq!(provider.uri(), format!("http://{}", expected_address));
    provider.finalize().await.unwrap();
}

#[async_std::test]
async fn finalize_does_not_wait_for_requests_in_flight() {
    // Arrange
    let mut provider = MockProvider::new("consumer", "provider");
    provider.setup().await.unwrap();
    let mut stream = TcpStream::connect(provider.address().unwrap()).unwrap();
    stream
        .set_read_timeout(Some(std::time::Duration::from_secs(5)))
        .unwrap();
    // The body never completes: the request stays pending on the server.
    stream
        .write_all(b"POST /clients HTTP/1.1\r\nHost: localhost\r\nContent-Length: 100\r\n\r\n{\"id\":")
        .unwrap();

    // Act
    provider.finalize().await.unwrap();

    // Assert
    assert_eq!(provider.state(), LifecycleState::Finalized);
    let mut buffer = [0; 64];
    match stream.read(&mut buffer) {
        Ok(read) => assert_eq!(read, 0),
        Err(e) => assert!(matches!(
            e.kind(),
            ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted
        )),
    }
}

#[async_std::test]
async fn paths_are_matched_after_percent_encoding() {
    let mut provider = MockProvider::new("consumer", "provider");
    provider.setup().await.unwrap();
    provider
        .add_interaction(interaction("a client by name", "/clients/Craig Risi", 200))
        .await
        .unwrap();
    provider
        .add_interaction(interaction("a client by accented name", "/clients/Jérôme", 200))
        .await
        .unwrap();

    let first = reqwest::get(format!("{}/clients/Craig Risi", provider.uri()))
        .await
        .unwrap()
        .status();
    let second = reqwest::get(format!("{}/clients/Jérôme", provider.uri()))
        .await
        .unwrap()
        .status();

    assert_eq!(first, 200);
    assert_eq!(second, 200);
    provider.verify().await.unwrap();
    provider.finalize().await.unwrap();
}

#[async_std::test]
async fn each_like_mismatches_are_reported_to_the_consumer() {
    // Arrange
    let mut provider = MockProvider::new("consumer", "provider");
    provider.setup().await.unwrap();
    let mut import = interaction("import clients", "/clients/import", 202);
    import.request.method = "POST".into();
    import.request.body = Some(each_like(json!({"firstName": "Craig"}), 2));
    provider.add_interaction(import).await.unwrap();
    let client = reqwest::Client::new();
    let uri = format!("{}/clients/import", provider.uri());

    // Act
    let not_a_list = client
        .post(&uri)
        .json(&json!({"firstName": "Craig"}))
        .send()
        .await
        .unwrap();
    let too_short = client
        .post(&uri)
        .json(&json!([{"firstName": "Craig"}]))
        .send()
        .await
        .unwrap();
    let accepted = client
        .post(&uri)
        .json(&json!([{"firstName": "Luke"}, {"firstName": "Obiwan"}]))
        .send()
        .await
        .unwrap();

    // Assert
    assert_eq!(not_a_list.status(), 500);
    let diagnostic: Value = not_a_list.json().await.unwrap();
    let mismatch = &diagnostic["interaction_diffs"][0]["mismatches"][0];
    assert_eq!(mismatch["path"], "$.body");
    assert_eq!(mismatch["reason"], "type-mismatch");

    assert_eq!(too_short.status(), 500);
    let diagnostic: Value = too_short.json().await.unwrap();
    let mismatch = &diagnostic["interaction_diffs"][0]["mismatches"][0];
    assert_eq!(mismatch["reason"], "too-few-elements");

    assert_eq!(accepted.status(), 202);
    assert!(provider.verify().await.is_err());
    provider.finalize().await.unwrap();
}

#[async_std::test]
async fn an_unreasonable_each_like_is_rejected_at_registration() {
    let mut provider = MockProvider::new("consumer", "provider");
    provider.setup().await.unwrap();
    let mut listing = interaction("list clients", "/clients", 200);
    listing.response.body = Some(MatchSpec::EachLike {
        example: Box::new(json!({"id": 1}).into()),
        min: usize::MAX,
    });

    let outcome = provider.add_interaction(listing).await;

    assert!(matches!(outcome, Err(PactError::InvalidInteraction { .. })));
    provider.finalize().await.unwrap();
}

#[async_std::test]
async fn a_conflicting_test_records_none_of_its_interactions() {
    // Arrange
    let mut provider = MockProvider::new("consumer", "provider");
    provider.setup().await.unwrap();
    provider
        .add_interaction(interaction("list clients", "/clients", 200))
        .await
        .unwrap();
    reqwest::get(format!("{}/clients", provider.uri())).await.unwrap();
    provider.verify().await.unwrap();

    // Act - same state and description, different path, next to an unrelated interaction
    provider
        .add_interaction(interaction("get client", "/clients/1", 200))
        .await
        .unwrap();
    provider
        .add_interaction(interaction("list clients", "/people", 200))
        .await
        .unwrap();
    reqwest::get(format!("{}/clients/1", provider.uri())).await.unwrap();
    reqwest::get(format!("{}/people", provider.uri())).await.unwrap();
    let outcome = provider.verify().await;

    // Assert
    assert!(matches!(
        outcome,
        Err(PactError::ConflictingInteraction { .. })
    ));
    let recorded: Vec<_> = provider
        .contract()
        .interactions()
        .iter()
        .map(|i| i.request.path.as_str())
        .collect();
    assert_eq!(recorded, vec!["/clients"]);
    provider.finalize().await.unwrap();
}
