use mockito::{Matcher, Server};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cloud_cert_renewer::notify::http::WebhookClient;

use super::test_utils::recording_sleep;

const BASE_DELAY: Duration = Duration::from_millis(40);

fn webhook_client(retries: u32) -> (WebhookClient, Arc<Mutex<Vec<Duration>>>) {
    let (sleep, delays) = recording_sleep();
    let client = WebhookClient::new(Duration::from_secs(5), retries, BASE_DELAY).with_sleep(sleep);
    (client, delays)
}

#[test]
fn server_errors_are_retried_with_doubling_delay() {
    let mut server = Server::new();
    let failing = server
        .mock("POST", "/hook")
        .with_status(500)
        .with_body("upstream unavailable")
        .expect(2)
        .create();
    let accepted = server
        .mock("POST", "/hook")
        .with_status(200)
        .with_body(r#"{"errcode":0,"errmsg":"ok"}"#)
        .expect(1)
        .create();

    let (client, delays) = webhook_client(2);
    assert!(client.deliver(&format!("{}/hook", server.url()), &json!({"event_type": "renewal_success"})));

    failing.assert();
    accepted.assert();
    assert_eq!(*delays.lock().unwrap(), vec![BASE_DELAY, BASE_DELAY * 2]);
}

#[test]
fn exhausted_retries_report_failure() {
    let mut server = Server::new();
    let mock = server.mock("POST", "/hook").with_status(503).expect(4).create();

    let (client, delays) = webhook_client(3);
    assert!(!client.deliver(&format!("{}/hook", server.url()), &json!({})));

    mock.assert();
    assert_eq!(
        *delays.lock().unwrap(),
        vec![BASE_DELAY, BASE_DELAY * 2, BASE_DELAY * 4]
    );
}

#[test]
fn zero_retries_means_a_single_attempt() {
    let mut server = Server::new();
    let mock = server.mock("POST", "/hook").with_status(500).expect(1).create();

    let (client, delays) = webhook_client(0);
    assert!(!client.deliver(&format!("{}/hook", server.url()), &json!({})));

    mock.assert();
    assert!(delays.lock().unwrap().is_empty());
}

#[test]
fn error_reported_in_a_200_body_counts_as_failure() {
    let mut server = Server::new();
    let mock = server
        .mock("POST", "/hook")
        .with_status(200)
        .with_body(r#"{"errcode":93000,"errmsg":"invalid webhook url"}"#)
        .expect(2)
        .create();

    let (client, _) = webhook_client(1);
    assert!(!client.deliver(&format!("{}/hook", server.url()), &json!({})));
    mock.assert();
}

#[test]
fn non_json_success_body_is_accepted() {
    let mut server = Server::new();
    let mock = server
        .mock("POST", "/hook")
        .with_status(204)
        .expect(1)
        .create();

    let (client, _) = webhook_client(2);
    assert!(client.deliver(&format!("{}/hook", server.url()), &json!({})));
    mock.assert();
}

#[test]
fn payload_is_posted_as_json_with_user_agent() {
    let mut server = Server::new();
    let mock = server
        .mock("POST", "/hook")
        .match_query(Matcher::UrlEncoded("key".into(), "abc".into()))
        .match_header("content-type", "application/json")
        .match_header(
            "user-agent",
            Matcher::Regex(r"^cloud-cert-renewer/\d+\.\d+\.\d+$".into()),
        )
        .match_body(Matcher::Json(json!({"msgtype": "text", "text": {"content": "hi"}})))
        .with_status(200)
        .expect(1)
        .create();

    let (client, _) = webhook_client(0);
    let payload = json!({"msgtype": "text", "text": {"content": "hi"}});
    assert!(client.deliver(&format!("{}/hook?key=abc", server.url()), &payload));
    mock.assert();
}
