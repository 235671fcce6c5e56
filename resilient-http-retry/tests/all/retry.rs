use http::Extensions;
use paste::paste;
use reqwest::StatusCode;
use resilient_http::{ClientConfig, ClientWithMiddleware, Error};
use resilient_http_retry::{
    build_resilient_client, RetryPolicyConfig, RetryPolicyEntry, RetryPolicyMiddleware,
    RetryPolicyOverride, RetryState, ResilientHttpOptions, UrlPattern,
};
use resilient_http_tracing::{with_correlation_id, X_CORRELATION_ID};
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

use crate::helpers::{entry, gaps, Arrivals, AttemptCounter, SequenceResponder, SimpleServer};

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

fn client_for(uri: &str, policy: RetryPolicyConfig) -> ClientWithMiddleware {
    init_logging();
    ClientConfig {
        base_url: Some(uri.to_string()),
        ..Default::default()
    }
    .build()
    .unwrap()
    .with(RetryPolicyMiddleware::new(Some(policy)))
    .build()
}

fn default_only(default: RetryPolicyEntry) -> RetryPolicyConfig {
    RetryPolicyConfig {
        default: Some(default),
        overrides: None,
    }
}

fn override_for(pattern: &str, policy: RetryPolicyEntry) -> RetryPolicyOverride {
    RetryPolicyOverride {
        url_regexes: vec![UrlPattern::new(pattern).unwrap()],
        policy,
    }
}

async fn mount(server: &MockServer, verb: &str, statuses: &[u16], expected_calls: u64) -> Arrivals {
    let responder = SequenceResponder::new(statuses);
    let arrivals = responder.arrivals();
    Mock::given(method(verb))
        .and(path("/foo"))
        .respond_with(responder)
        .expect(expected_calls)
        .mount(server)
        .await;
    arrivals
}

macro_rules! assert_success_is_never_retried {
    ($x:tt) => {
        paste! {
            #[tokio::test]
            async fn [<assert_no_retry_on_ $x>]() {
                let server = MockServer::start().await;
                mount(&server, "GET", &[$x], 1).await;

                // The status is listed on purpose: success never reaches the retry policy.
                let client = client_for(
                    &server.uri(),
                    default_only(entry(&["GET"], 3, 1, &[$x, 500], 1.0)),
                );
                let resp = client.get("/foo").send().await.expect("call failed");

                assert_eq!(resp.status().as_u16(), $x);
            }
        }
    };
}

assert_success_is_never_retried!(200);
assert_success_is_never_retried!(201);
assert_success_is_never_retried!(202);
assert_success_is_never_retried!(204);

#[tokio::test]
async fn does_not_retry_when_the_method_is_not_listed() {
    let server = MockServer::start().await;
    mount(&server, "PATCH", &[500], 1).await;

    let client = client_for(
        &server.uri(),
        default_only(entry(&["POST"], 3, 1, &[500], 1.0)),
    );
    let err = client.patch("/foo").send().await.unwrap_err();

    assert_eq!(err.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
}

#[tokio::test]
async fn does_not_retry_when_the_status_is_not_listed() {
    let server = MockServer::start().await;
    mount(&server, "GET", &[500], 1).await;

    let client = client_for(
        &server.uri(),
        default_only(entry(&["GET"], 3, 1, &[400], 1.0)),
    );
    let err = client.get("/foo").send().await.unwrap_err();

    assert_eq!(err.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
}

#[tokio::test]
async fn does_not_retry_when_retries_is_zero() {
    let server = MockServer::start().await;
    mount(&server, "GET", &[500], 1).await;

    let client = client_for(&server.uri(), default_only(entry(&["GET"], 0, 1, &[500], 1.0)));
    let err = client.get("/foo").send().await.unwrap_err();

    assert_eq!(err.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
}

#[tokio::test]
async fn does_not_retry_when_retries_is_negative() {
    let server = MockServer::start().await;
    mount(&server, "GET", &[500], 1).await;

    let client = client_for(
        &server.uri(),
        default_only(entry(&["GET"], -1, 1, &[500], 1.0)),
    );
    let err = client.get("/foo").send().await.unwrap_err();

    assert_eq!(err.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
}

#[tokio::test]
async fn retries_the_configured_number_of_times_with_a_constant_delay() {
    let server = MockServer::start().await;
    mount(&server, "GET", &[500], 4).await;

    let client = client_for(
        &server.uri(),
        default_only(entry(&["GET"], 3, 50, &[500], 1.0)),
    );
    let (req, mut extensions) = client.get("/foo").build().unwrap();

    let started = Instant::now();
    let err = client
        .execute_with_extensions(req, &mut extensions)
        .await
        .unwrap_err();

    assert!(started.elapsed() >= Duration::from_millis(150));
    assert_eq!(err.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
    assert_eq!(
        extensions.get::<RetryState>(),
        Some(&RetryState { retry_number: 3 })
    );
}

#[tokio::test]
async fn the_caller_gets_the_last_error() {
    let server = MockServer::start().await;
    mount(&server, "GET", &[500, 500, 404], 3).await;

    let client = client_for(
        &server.uri(),
        default_only(entry(&["GET"], 2, 1, &[404, 500], 1.0)),
    );
    let err = client.get("/foo").send().await.unwrap_err();

    let Error::Status(last) = err else {
        panic!("expected a status error");
    };
    assert_eq!(last.status, StatusCode::NOT_FOUND);
    assert_eq!(last.body_text(), "attempt 3");
}

#[tokio::test]
async fn returns_the_response_when_a_retry_succeeds() {
    let server = MockServer::start().await;
    mount(&server, "POST", &[500, 500, 201], 3).await;

    let client = client_for(&server.uri(), default_only(entry(&["post"], 3, 1, &[500], 1.0)));
    let resp = client
        .post("/foo")
        .body("payload")
        .send()
        .await
        .expect("call failed");

    assert_eq!(resp.status(), StatusCode::CREATED);
    assert_eq!(resp.text().await.unwrap(), "attempt 3");
}

#[tokio::test]
async fn uses_the_library_default_policy_when_none_is_given() {
    let server = MockServer::start().await;
    mount(&server, "DELETE", &[404, 204], 2).await;
    init_logging();

    let client = ClientConfig {
        base_url: Some(server.uri()),
        ..Default::default()
    }
    .build()
    .unwrap()
    .with(RetryPolicyMiddleware::default())
    .build();

    let started = Instant::now();
    let resp = client.delete("/foo").send().await.expect("call failed");

    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    assert!(started.elapsed() >= Duration::from_millis(1000));
}

#[tokio::test]
async fn uses_the_first_matching_override() {
    let server = MockServer::start().await;
    mount(&server, "GET", &[500], 2).await;

    let client = client_for(
        &server.uri(),
        RetryPolicyConfig {
            default: Some(entry(&["GET"], 5, 1, &[500], 1.0)),
            overrides: Some(vec![
                override_for("^/foo$", entry(&["GET"], 1, 1, &[500], 1.0)),
                override_for("/foo", entry(&["GET"], 3, 1, &[500], 1.0)),
            ]),
        },
    );
    let err = client.get("/foo").send().await.unwrap_err();

    assert_eq!(err.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
}

#[tokio::test]
async fn uses_the_default_when_no_override_matches() {
    let server = MockServer::start().await;
    mount(&server, "GET", &[503], 3).await;

    let client = client_for(
        &server.uri(),
        RetryPolicyConfig {
            default: Some(entry(&["GET"], 2, 1, &[503], 1.0)),
            overrides: Some(vec![override_for(
                r"api\.example\.com",
                entry(&["GET"], 4, 1, &[503], 1.0),
            )]),
        },
    );
    let err = client.get("/foo").send().await.unwrap_err();

    assert_eq!(err.status(), Some(StatusCode::SERVICE_UNAVAILABLE));
}

#[tokio::test]
async fn retry_count_is_not_reset_when_the_status_changes() {
    let server = MockServer::start().await;
    mount(&server, "GET", &[404, 404, 401, 401, 401], 4).await;

    let client = client_for(
        &server.uri(),
        RetryPolicyConfig {
            default: None,
            overrides: Some(vec![override_for(
                "/foo$",
                entry(&["GET"], 3, 1, &[401, 404], 1.0),
            )]),
        },
    );
    let err = client.get("/foo").send().await.unwrap_err();

    assert_eq!(err.status(), Some(StatusCode::UNAUTHORIZED));
}

fn exponential_override() -> RetryPolicyConfig {
    RetryPolicyConfig {
        default: None,
        overrides: Some(vec![override_for(
            "^/foo",
            entry(&["GET"], 2, 100, &[500], 2.0),
        )]),
    }
}

fn assert_exponential_gaps(arrivals: &Arrivals) {
    let gaps = gaps(arrivals);
    assert_eq!(gaps.len(), 2);
    assert!(gaps[0] >= Duration::from_millis(100), "first gap {:?}", gaps[0]);
    assert!(gaps[1] >= Duration::from_millis(200), "second gap {:?}", gaps[1]);
    assert!(gaps[1] > gaps[0]);
}

#[tokio::test]
async fn exhausts_an_exponential_override_and_rejects_with_the_last_error() {
    let server = MockServer::start().await;
    let arrivals = mount(&server, "GET", &[500, 500, 500, 200], 3).await;

    let client = client_for(&server.uri(), exponential_override());
    let err = client.get("/foo").send().await.unwrap_err();

    assert_exponential_gaps(&arrivals);
    assert_eq!(err.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
    assert_eq!(err.status_error().unwrap().body_text(), "attempt 3");
}

#[tokio::test]
async fn resolves_when_an_exponential_override_succeeds_in_budget() {
    let server = MockServer::start().await;
    let arrivals = mount(&server, "GET", &[500, 500, 200], 3).await;

    let client = client_for(&server.uri(), exponential_override());
    let resp = client.get("/foo").send().await.expect("call failed");

    assert_exponential_gaps(&arrivals);
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn patterns_match_the_url_the_caller_wrote() {
    let server = MockServer::start().await;
    mount(&server, "GET", &[500, 200], 2).await;

    let client = client_for(
        &server.uri(),
        RetryPolicyConfig {
            default: Some(entry(&["GET"], 0, 1, &[500], 1.0)),
            overrides: Some(vec![override_for("^/foo", entry(&["GET"], 2, 1, &[500], 1.0))]),
        },
    );
    let resp = client.get("/foo").send().await.expect("call failed");

    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn requests_built_elsewhere_are_matched_on_their_absolute_url() {
    let server = MockServer::start().await;
    mount(&server, "GET", &[500, 200], 2).await;

    let client = client_for(
        &server.uri(),
        RetryPolicyConfig {
            default: Some(entry(&["GET"], 0, 1, &[500], 1.0)),
            overrides: Some(vec![override_for(
                &format!("^{}/foo$", regex::escape(&server.uri())),
                entry(&["GET"], 2, 1, &[500], 1.0),
            )]),
        },
    );
    let req = reqwest::Client::new()
        .get(format!("{}/foo", server.uri()))
        .build()
        .unwrap();
    let resp = client
        .execute_with_extensions(req, &mut Extensions::new())
        .await
        .expect("call failed");

    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn reused_extensions_start_with_a_full_budget() {
    let server = MockServer::start().await;
    mount(&server, "GET", &[500], 6).await;

    let client = client_for(
        &server.uri(),
        default_only(entry(&["GET"], 2, 1, &[500], 1.0)),
    );
    let (first, mut extensions) = client.get("/foo").build().unwrap();
    client
        .execute_with_extensions(first, &mut extensions)
        .await
        .unwrap_err();
    assert_eq!(
        extensions.get::<RetryState>(),
        Some(&RetryState { retry_number: 2 })
    );

    let (second, _) = client.get("/foo").build().unwrap();
    client
        .execute_with_extensions(second, &mut extensions)
        .await
        .unwrap_err();
    assert_eq!(
        extensions.get::<RetryState>(),
        Some(&RetryState { retry_number: 2 })
    );
}

#[tokio::test]
async fn concurrent_requests_keep_their_own_retry_count() {
    let server = MockServer::start().await;
    Mock::given(path("/flaky"))
        .respond_with(SequenceResponder::new(&[500, 200]))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(path("/broken"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let client = client_for(
        &server.uri(),
        default_only(entry(&["GET"], 2, 20, &[500], 1.0)),
    );

    let run = |target: &'static str| {
        let client = client.clone();
        async move {
            let (req, mut extensions) = client.get(target).build().unwrap();
            let result = client.execute_with_extensions(req, &mut extensions).await;
            (result.is_ok(), extensions.get::<RetryState>().copied())
        }
    };

    let (flaky, broken) = futures::join!(run("/flaky"), run("/broken"));

    assert_eq!(flaky, (true, Some(RetryState { retry_number: 1 })));
    assert_eq!(broken, (false, Some(RetryState { retry_number: 2 })));
}

#[tokio::test]
async fn connection_failures_are_not_retried() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let uri = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let attempts = AttemptCounter::default();
    let client = ClientConfig {
        base_url: Some(uri),
        ..Default::default()
    }
    .build()
    .unwrap()
    .with(RetryPolicyMiddleware::default())
    .with(attempts.clone())
    .build();

    let err = client.get("/foo").send().await.unwrap_err();

    assert!(err.is_connect());
    assert_eq!(attempts.count(), 1);
}

#[tokio::test]
async fn timeouts_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500).set_delay(Duration::from_millis(500)))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(
        &server.uri(),
        default_only(entry(&["GET"], 3, 1, &[500], 1.0)),
    );
    let err = client
        .get("/foo")
        .timeout(Duration::from_millis(50))
        .send()
        .await
        .unwrap_err();

    assert!(err.is_timeout());
    assert_eq!(err.status(), None);
}

#[tokio::test]
async fn incomplete_responses_are_not_retried() {
    // A bare status line is well formed up to where it stops, which hyper reports as an
    // incomplete message rather than a parse error.
    let simple_server = SimpleServer::new(
        "127.0.0.1",
        vec!["HTTP/1.1".to_string(), "HTTP/1.1 200 OK\r\n\r\n".to_string()],
    )
    .await
    .expect("Error when creating a simple server");
    let uri = simple_server.uri();
    let connections = simple_server.connections();
    tokio::spawn(simple_server.start());

    let client = client_for(&uri, default_only(entry(&["GET"], 3, 1, &[500], 1.0)));
    let err = client.get("/foo").send().await.unwrap_err();

    assert!(matches!(err, Error::Reqwest(_)));
    assert_eq!(connections.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn retries_carry_the_correlation_id() {
    let server = MockServer::start().await;
    mount(&server, "GET", &[500, 200], 2).await;
    init_logging();

    let client = build_resilient_client(ResilientHttpOptions {
        client: ClientConfig {
            base_url: Some(server.uri()),
            ..Default::default()
        },
        retry_policy: Some(default_only(entry(&["GET"], 1, 1, &[500], 1.0))),
        propagate_correlation_id: true,
    })
    .unwrap();

    with_correlation_id("corr-7", async {
        client.get("/foo").send().await.expect("call failed");
    })
    .await;

    let received = server.received_requests().await.unwrap();
    assert_eq!(received.len(), 2);
    for request in received {
        assert_eq!(request.headers[X_CORRELATION_ID], "corr-7");
    }
}
