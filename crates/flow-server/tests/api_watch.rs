mod common;

use common::test_server;
use flow_ids::{compute_topic_prefix, derive_topic_key, encode};
use serde_json::json;

#[tokio::test]
async fn topic_prefix_sees_only_its_topic() {
    let server = test_server();
    let (org_id, token) = server.create_org(&[]);
    let key = derive_topic_key("s3cr3t");

    let ours = encode(org_id, Some("logs.errors"), Some(&key)).to_hex();
    let theirs = encode(org_id, Some("logs.warnings"), Some(&key)).to_hex();
    for id in [&ours, &theirs] {
        let (status, _) = server.post("/events", &token, json!({"body": "x", "id": id})).await;
        assert_eq!(status, 200);
    }

    let prefix = compute_topic_prefix(org_id, "logs.errors", "s3cr3t");
    let (status, watched) = server
        .get(&format!("/events/watch?prefix={prefix}"), &token)
        .await;
    assert_eq!(status, 200);
    assert_eq!(watched["prefix_used"], prefix.as_str());
    let events = watched["events"].as_array().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["id"], ours);
    assert!(events[0].get("body").is_none());
}

#[tokio::test]
async fn short_prefix_is_padded_to_eight_bytes() {
    let server = test_server();
    let (org_id, token) = server.create_org(&[0xab]);
    server.post("/events", &token, json!({"body": "x"})).await;

    let (status, watched) = server.get("/events/watch?prefix=ab", &token).await;
    assert_eq!(status, 200);
    assert_eq!(watched["prefix_used"], "ab00000000000000");
    // Only an org id of exactly ab00.. would match the padded prefix.
    let expected = usize::from(org_id.to_hex() == "ab00000000000000");
    assert_eq!(watched["events"].as_array().unwrap().len(), expected);

    let org_hex = org_id.to_hex();
    let (_, watched) = server
        .get(&format!("/events/watch?prefix={org_hex}"), &token)
        .await;
    assert_eq!(watched["events"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn utf8_and_base64_prefixes_resolve_like_hex() {
    let server = test_server();
    let (_, token) = server.create_org(&[]);

    let (_, utf8) = server.get("/events/watch?prefix=hi&format=utf8", &token).await;
    let (_, b64) = server.get("/events/watch?prefix=aGk%3D&format=base64", &token).await;
    let (_, hex) = server.get("/events/watch?prefix=6869&format=hex", &token).await;
    assert_eq!(utf8["prefix_used"], "6869000000000000");
    assert_eq!(b64["prefix_used"], "6869000000000000");
    assert_eq!(hex["prefix_used"], "6869000000000000");
}

#[tokio::test]
async fn bad_prefixes_are_rejected() {
    let server = test_server();
    let (_, token) = server.create_org(&[]);

    let (status, _) = server.get("/events/watch?prefix=ab&format=rot13", &token).await;
    assert_eq!(status, 400);

    let (status, body) = server
        .get("/events/watch?prefix=001122334455667788", &token)
        .await;
    assert_eq!(status, 400);
    assert!(body["error"].as_str().unwrap().contains("prefix too long"));

    let (status, _) = server.get("/events/watch?prefix=zz", &token).await;
    assert_eq!(status, 400);

    let (status, _) = server.get("/events/watch", &token).await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn since_excludes_older_events() {
    let server = test_server();
    let (org_id, token) = server.create_org(&[]);
    let (_, first) = server.post("/events", &token, json!({"body": "old"})).await;
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let (_, second) = server.post("/events", &token, json!({"body": "new"})).await;

    let since = first["timestamp"].as_str().unwrap();
    let (status, watched) = server
        .get(
            &format!("/events/watch?prefix={}&since={}", org_id.to_hex(), since),
            &token,
        )
        .await;
    assert_eq!(status, 200);
    let events = watched["events"].as_array().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["id"], second["id"]);
}

#[tokio::test]
async fn scan_cap_bounds_recall() {
    let server = common::test_server_with(|config| config.watch.scan_cap = 3);
    let (quiet_org, quiet_token) = server.create_org(&[]);
    let (_, busy_token) = server.create_org(&[]);

    server.post("/events", &quiet_token, json!({"body": "early"})).await;
    for _ in 0..3 {
        server.post("/events", &busy_token, json!({"body": "noise"})).await;
    }

    let (status, watched) = server
        .get(&format!("/events/watch?prefix={}", quiet_org.to_hex()), &quiet_token)
        .await;
    assert_eq!(status, 200);
    assert!(watched["events"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn limit_caps_matches() {
    let server = test_server();
    let (org_id, token) = server.create_org(&[]);
    for _ in 0..5 {
        server.post("/events", &token, json!({"body": "x"})).await;
    }
    let (_, watched) = server
        .get(&format!("/events/watch?prefix={}&limit=2", org_id.to_hex()), &token)
        .await;
    assert_eq!(watched["events"].as_array().unwrap().len(), 2);
}
