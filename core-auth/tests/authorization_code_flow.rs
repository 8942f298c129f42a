mod common;

use common::{free_port, harness, interactive_settings, port_is_free, Redirect, TOKEN_JSON};
use core_async::sync::CancellationToken;
use core_auth::{AuthError, FlowState};
use core_runtime::config::AuthSettings;
use std::time::Duration;

#[tokio::test]
async fn test_code_redirect_is_exchanged_and_cached() {
    let port = free_port();
    let h = harness(interactive_settings(port), Redirect::Code("ABC123".into()), None);
    h.http.push(200, TOKEN_JSON);
    let states = h.authenticator.subscribe_flow_state().unwrap();

    let token = h
        .authenticator
        .authenticate(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(token, "at-1");
    assert_eq!(*states.borrow(), FlowState::Authenticated);

    let requests = h.http.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].url, "https://accounts.example.com/api/token");
    let body = requests[0].body_text().unwrap();
    assert!(body.contains("code=ABC123"));
    assert!(body.contains("grant_type=authorization_code"));
    assert!(body.contains(&format!(
        "redirect_uri=http%3A%2F%2F127.0.0.1%3A{}%2Fcallback%2F",
        port
    )));

    let record = h.authenticator.cache().snapshot().await.unwrap();
    assert_eq!(record.access_token, "at-1");
    assert_eq!(record.refresh_token.as_deref(), Some("rt-1"));

    assert!(h.browser.terminated());
    assert!(port_is_free(port));
    let pages = h.browser.wait_for_pages(1).await;
    assert!(pages[0].starts_with("HTTP/1.1 200 OK"));
}

#[tokio::test]
async fn test_authorize_url_carries_fresh_state_each_attempt() {
    let port = free_port();
    let h = harness(interactive_settings(port), Redirect::Code("ABC123".into()), None);
    h.http.push(200, TOKEN_JSON);
    h.http.push(200, TOKEN_JSON);
    let cancel = CancellationToken::new();

    h.authenticator.authenticate(&cancel).await.unwrap();
    h.authenticator.sign_out().await;
    h.authenticator.authenticate(&cancel).await.unwrap();

    let urls = h.browser.authorize_urls();
    assert_eq!(urls.len(), 2);
    let state = |i: usize| {
        urls[i]
            .query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned())
            .unwrap()
    };
    assert_ne!(state(0), state(1));
    assert!(urls[0].as_str().contains("response_type=code"));
    assert!(urls[0].as_str().contains("show_dialog=false"));
    assert!(urls[0].as_str().contains("client_id=client"));
}

#[tokio::test]
async fn test_state_mismatch_never_exchanges() {
    let port = free_port();
    let h = harness(interactive_settings(port), Redirect::ForgedState("ABC123".into()), None);
    let states = h.authenticator.subscribe_flow_state().unwrap();

    let result = h.authenticator.authenticate(&CancellationToken::new()).await;

    assert!(matches!(result, Err(AuthError::StateMismatch { .. })));
    assert_eq!(*states.borrow(), FlowState::StateMismatch);
    assert!(h.http.requests().is_empty());
    assert!(h.authenticator.cache().snapshot().await.is_none());
    assert!(h.browser.terminated());
}

#[tokio::test]
async fn test_access_denied_leaves_cache_empty() {
    let port = free_port();
    let h = harness(interactive_settings(port), Redirect::Error("access_denied".into()), None);
    let states = h.authenticator.subscribe_flow_state().unwrap();

    let result = h.authenticator.authenticate(&CancellationToken::new()).await;

    match result {
        Err(AuthError::CallbackError { error }) => assert_eq!(error, "access_denied"),
        other => panic!("unexpected result: {:?}", other),
    }
    assert_eq!(*states.borrow(), FlowState::CallbackError);
    assert!(h.http.requests().is_empty());
    assert!(h.authenticator.cache().snapshot().await.is_none());
    assert!(port_is_free(port));

    let pages = h.browser.wait_for_pages(1).await;
    assert!(pages[0].starts_with("HTTP/1.1 400 Bad Request"));
}

#[tokio::test]
async fn test_missing_code() {
    let port = free_port();
    let h = harness(interactive_settings(port), Redirect::StateOnly, None);
    let states = h.authenticator.subscribe_flow_state().unwrap();

    let result = h.authenticator.authenticate(&CancellationToken::new()).await;

    assert!(matches!(result, Err(AuthError::MissingAuthorizationCode)));
    assert_eq!(*states.borrow(), FlowState::MissingCode);
    assert!(h.http.requests().is_empty());
}

#[tokio::test]
async fn test_rejected_exchange() {
    let port = free_port();
    let h = harness(interactive_settings(port), Redirect::Code("stale".into()), None);
    h.http.push(400, r#"{"error":"invalid_grant","error_description":"Invalid authorization code"}"#);
    let states = h.authenticator.subscribe_flow_state().unwrap();

    let result = h.authenticator.authenticate(&CancellationToken::new()).await;

    assert!(matches!(result, Err(AuthError::ExchangeFailure { status: Some(400), .. })));
    assert_eq!(*states.borrow(), FlowState::ExchangeFailure);
    assert_eq!(h.http.requests().len(), 1);
    assert!(h.authenticator.cache().snapshot().await.is_none());
    assert!(h.browser.terminated());
}

#[tokio::test]
async fn test_callback_timeout_releases_listener_and_browser() {
    let port = free_port();
    let settings = AuthSettings {
        callback_timeout: Duration::from_millis(200),
        ..interactive_settings(port)
    };
    let h = harness(settings, Redirect::Silent, None);

    let result = h.authenticator.authenticate(&CancellationToken::new()).await;

    assert!(matches!(result, Err(AuthError::CallbackTimeout { .. })));
    assert_eq!(h.browser.launches(), 1);
    assert!(h.browser.terminated());
    assert!(port_is_free(port));
}

#[tokio::test]
async fn test_cancel_while_waiting_for_redirect() {
    let port = free_port();
    let h = harness(interactive_settings(port), Redirect::Silent, None);
    let states = h.authenticator.subscribe_flow_state().unwrap();
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let result = h.authenticator.authenticate(&cancel).await;

    assert!(matches!(result, Err(AuthError::Cancelled)));
    assert_eq!(*states.borrow(), FlowState::Cancelled);
    assert!(h.browser.terminated());
    assert!(port_is_free(port));
}

#[tokio::test]
async fn test_second_attempt_on_same_port_fails_fast() {
    let port = free_port();
    let first = harness(interactive_settings(port), Redirect::Silent, None);
    let second = harness(interactive_settings(port), Redirect::Silent, None);

    let cancel = CancellationToken::new();
    let authenticator = first.authenticator.clone();
    let waiting_cancel = cancel.clone();
    let waiting = tokio::spawn(async move { authenticator.authenticate(&waiting_cancel).await });

    for _ in 0..200 {
        if first.browser.launches() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(first.browser.launches(), 1);

    let result = second.authenticator.authenticate(&CancellationToken::new()).await;
    assert!(matches!(result, Err(AuthError::ListenerBindFailure { .. })));
    assert_eq!(second.browser.launches(), 0);

    cancel.cancel();
    assert!(matches!(waiting.await.unwrap(), Err(AuthError::Cancelled)));
    assert!(port_is_free(port));
}
