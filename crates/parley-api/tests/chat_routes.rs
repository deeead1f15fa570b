mod common;

use axum::http::{Method, StatusCode, header};
use serde_json::{Value, json};

use parley_auth::bootstrap::DEFAULT_INVITE_CODE;

use common::{TestApp, test_app};

struct Cast {
    alice: String,
    bob: String,
    mallory: String,
    chat_id: String,
}

/// alice opens a chat with bob; mallory is registered but not invited.
async fn cast(t: &TestApp) -> Cast {
    let (alice, _) = t.register(DEFAULT_INVITE_CODE, "alice").await;
    let (bob, bob_id) = t.register(DEFAULT_INVITE_CODE, "bob").await;
    let (mallory, _) = t.register(DEFAULT_INVITE_CODE, "mallory").await;

    let resp = t
        .json(
            Method::POST,
            "/api/v1/chats",
            Some(&alice),
            json!({ "title": "pair", "memberIds": [bob_id, uuid::Uuid::new_v4()] }),
        )
        .await;
    assert_eq!(resp.status, StatusCode::CREATED);
    let chat_id = resp.json()["chatId"].as_str().unwrap().to_string();

    Cast {
        alice,
        bob,
        mallory,
        chat_id,
    }
}

async fn send(t: &TestApp, token: &str, chat_id: &str, ciphertext: &str) -> (StatusCode, Value) {
    let resp = t
        .json(
            Method::POST,
            "/api/v1/messages",
            Some(token),
            json!({ "chatId": chat_id, "ciphertext": ciphertext, "nonce": "n0" }),
        )
        .await;
    let body = if resp.bytes.is_empty() { Value::Null } else { resp.json() };
    (resp.status, body)
}

#[tokio::test]
async fn members_exchange_messages() {
    let t = test_app();
    let c = cast(&t).await;

    let (status, body) = send(&t, &c.alice, &c.chat_id, "hello").await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(body["messageId"].is_string());
    let (status, _) = send(&t, &c.bob, &c.chat_id, "hi back").await;
    assert_eq!(status, StatusCode::CREATED);

    let uri = format!("/api/v1/chats/{}/messages", c.chat_id);
    let resp = t.get(&uri, Some(&c.bob)).await;
    assert_eq!(resp.status, StatusCode::OK);
    let messages = resp.json();
    let texts: Vec<&str> = messages
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["ciphertext"].as_str().unwrap())
        .collect();
    assert_eq!(texts, ["hi back", "hello"]);

    let limited = t.get(&format!("{uri}?limit=1"), Some(&c.alice)).await.json();
    assert_eq!(limited.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn outsiders_are_forbidden() {
    let t = test_app();
    let c = cast(&t).await;
    send(&t, &c.alice, &c.chat_id, "secret").await;

    let (status, body) = send(&t, &c.mallory, &c.chat_id, "let me in").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body, json!({ "error": "forbidden" }));

    let read = t
        .get(&format!("/api/v1/chats/{}/messages", c.chat_id), Some(&c.mallory))
        .await;
    assert_eq!(read.status, StatusCode::FORBIDDEN);

    let clear = t
        .delete(&format!("/api/v1/chats/{}/clear", c.chat_id), &c.mallory)
        .await;
    assert_eq!(clear.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn only_the_sender_edits_or_deletes() {
    let t = test_app();
    let c = cast(&t).await;
    let (_, body) = send(&t, &c.alice, &c.chat_id, "draft").await;
    let message_id = body["messageId"].as_str().unwrap().to_string();
    let uri = format!("/api/v1/messages/{message_id}");

    let edit = json!({ "ciphertext": "final", "nonce": "n1" });
    let by_bob = t.json(Method::PATCH, &uri, Some(&c.bob), edit.clone()).await;
    assert_eq!(by_bob.status, StatusCode::FORBIDDEN);
    assert_eq!(t.delete(&uri, &c.bob).await.status, StatusCode::FORBIDDEN);

    let by_alice = t.json(Method::PATCH, &uri, Some(&c.alice), edit).await;
    assert_eq!(by_alice.status, StatusCode::OK);

    let listed = t
        .get(&format!("/api/v1/chats/{}/messages", c.chat_id), Some(&c.bob))
        .await
        .json();
    assert_eq!(listed[0]["ciphertext"], "final");
    assert!(listed[0]["editedAt"].is_string());

    assert_eq!(t.delete(&uri, &c.alice).await.status, StatusCode::OK);
    let after = t
        .get(&format!("/api/v1/chats/{}/messages", c.chat_id), Some(&c.bob))
        .await
        .json();
    assert!(after.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn attachments_follow_the_chat() {
    let t = test_app();
    let c = cast(&t).await;
    let (_, body) = send(&t, &c.alice, &c.chat_id, "photo").await;
    let message_id = body["messageId"].as_str().unwrap().to_string();
    let upload_uri = format!("/api/v1/messages/{message_id}/attachments");

    let by_bob = t.upload(&upload_uri, &c.bob, "image/png", vec![9; 16]).await;
    assert_eq!(by_bob.status, StatusCode::FORBIDDEN);

    let resp = t.upload(&upload_uri, &c.alice, "image/png", vec![7; 32]).await;
    assert_eq!(resp.status, StatusCode::CREATED);
    let uploaded = resp.json();
    assert_eq!(uploaded["sizeBytes"], 32);
    let attachment_id = uploaded["attachmentId"].as_str().unwrap().to_string();

    let listed = t
        .get(&format!("/api/v1/chats/{}/messages", c.chat_id), Some(&c.bob))
        .await
        .json();
    assert_eq!(listed[0]["attachments"][0]["id"], attachment_id.as_str());
    assert_eq!(listed[0]["attachments"][0]["contentType"], "image/png");

    let download_uri = format!("/api/v1/attachments/{attachment_id}");
    let fetched = t.get(&download_uri, Some(&c.bob)).await;
    assert_eq!(fetched.status, StatusCode::OK);
    assert_eq!(fetched.headers[header::CONTENT_TYPE], "image/png");
    assert_eq!(fetched.headers[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
    assert_eq!(fetched.headers[header::CONTENT_DISPOSITION], "attachment");
    assert_eq!(fetched.bytes, vec![7; 32]);

    assert_eq!(t.get(&download_uri, Some(&c.mallory)).await.status, StatusCode::FORBIDDEN);

    let stored = t.db.get_attachment(&attachment_id).unwrap().unwrap().0.file_path;
    assert!(std::path::Path::new(&stored).starts_with(&t.data_dir));
    assert!(std::path::Path::new(&stored).exists());

    t.delete(&format!("/api/v1/messages/{message_id}"), &c.alice).await;
    assert!(!std::path::Path::new(&stored).exists());
    assert_eq!(t.get(&download_uri, Some(&c.bob)).await.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn uploaded_html_is_never_served_as_html() {
    let t = test_app();
    let c = cast(&t).await;
    let (_, body) = send(&t, &c.alice, &c.chat_id, "page").await;
    let message_id = body["messageId"].as_str().unwrap();
    let page = b"<script>alert(document.cookie)</script>".to_vec();
    let resp = t
        .upload(&format!("/api/v1/messages/{message_id}/attachments"), &c.alice, "text/html", page.clone())
        .await;
    assert_eq!(resp.status, StatusCode::CREATED);
    let attachment_id = resp.json()["attachmentId"].as_str().unwrap().to_string();

    let listed = t
        .get(&format!("/api/v1/chats/{}/messages", c.chat_id), Some(&c.bob))
        .await
        .json();
    assert_eq!(listed[0]["attachments"][0]["contentType"], "text/html");

    let fetched = t.get(&format!("/api/v1/attachments/{attachment_id}"), Some(&c.bob)).await;
    assert_eq!(fetched.status, StatusCode::OK);
    assert_eq!(fetched.headers[header::CONTENT_TYPE], "application/octet-stream");
    assert_eq!(fetched.headers[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
    assert_eq!(fetched.headers[header::CONTENT_DISPOSITION], "attachment");
    assert_eq!(fetched.bytes, page);
}

#[tokio::test]
async fn clearing_a_chat_removes_everything() {
    let t = test_app();
    let c = cast(&t).await;
    let (_, body) = send(&t, &c.bob, &c.chat_id, "one").await;
    send(&t, &c.alice, &c.chat_id, "two").await;
    let message_id = body["messageId"].as_str().unwrap();
    let resp = t
        .upload(&format!("/api/v1/messages/{message_id}/attachments"), &c.bob, "text/plain", b"doc".to_vec())
        .await;
    let attachment_id = resp.json()["attachmentId"].as_str().unwrap().to_string();
    let stored = t.db.get_attachment(&attachment_id).unwrap().unwrap().0.file_path;

    let clear = t.delete(&format!("/api/v1/chats/{}/clear", c.chat_id), &c.alice).await;
    assert_eq!(clear.status, StatusCode::OK);

    let listed = t
        .get(&format!("/api/v1/chats/{}/messages", c.chat_id), Some(&c.alice))
        .await
        .json();
    assert!(listed.as_array().unwrap().is_empty());
    assert!(!std::path::Path::new(&stored).exists());
}
