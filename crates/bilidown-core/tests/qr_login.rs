use bilidown_core::bilibili::api::{BilibiliEndpoints, QrLoginState, QrPollResponse, QrTicket};
use bilidown_core::bilibili::{BilibiliError, BilibiliService};
use bilidown_core::session::SessionContext;
use serde_json::json;
use wiremock::matchers::{body_string, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn setup() -> (MockServer, SessionContext, BilibiliService) {
    let server = MockServer::start().await;
    let ctx = SessionContext::in_memory();
    let endpoints = BilibiliEndpoints::single_host(&server.uri()).expect("endpoints");
    let service = BilibiliService::new(ctx.clone(), endpoints);
    (server, ctx, service)
}

#[tokio::test]
async fn ticket_is_passed_through_without_state_changes() {
    let (server, ctx, service) = setup().await;

    Mock::given(method("GET"))
        .and(path("/qrcode/getLoginUrl"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "status": true,
            "ts": 1700000000,
            "data": { "url": "https://passport.bilibili.com/qrcode/h5/login?oauthKey=k1", "oauthKey": "k1" }
        })))
        .mount(&server)
        .await;

    let ticket = service.get_login_qr_code().await.expect("ticket");
    assert_eq!(ticket["data"]["oauthKey"], json!("k1"));
    assert_eq!(ticket["ts"], json!(1700000000));
    assert_eq!(ctx.config.cookie_string(), "");
}

#[tokio::test]
async fn ticket_keeps_unknown_data_fields() {
    let (server, _ctx, service) = setup().await;
    let body = json!({
        "code": 0,
        "data": { "url": "https://example.invalid/qr", "oauthKey": "k2", "qrcode_key": "extra" }
    });

    Mock::given(method("GET"))
        .and(path("/qrcode/getLoginUrl"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body.clone()))
        .mount(&server)
        .await;

    let ticket = service.get_login_qr_code().await.expect("ticket");
    assert_eq!(ticket, body);

    let typed: QrTicket = serde_json::from_value(ticket["data"].clone()).expect("typed ticket");
    assert_eq!(typed.oauth_key, "k2");
}

#[tokio::test]
async fn non_string_message_does_not_break_polling() {
    let (server, ctx, service) = setup().await;
    let body = json!({ "status": false, "data": -4, "message": 0 });

    Mock::given(method("POST"))
        .and(path("/qrcode/getLoginInfo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body.clone()))
        .mount(&server)
        .await;

    let raw = service.get_login_qr_code_status("k1").await.expect("poll");

    assert_eq!(raw, body);
    assert_eq!(QrLoginState::from_raw(&raw), QrLoginState::NotScanned);
    assert_eq!(ctx.config.cookie_string(), "");
}

#[tokio::test]
async fn confirmed_poll_with_odd_fields_still_saves_session() {
    let (server, ctx, service) = setup().await;
    let body = json!({ "status": 1, "data": { "url": "x" }, "message": { "text": "ok" } });

    Mock::given(method("POST"))
        .and(path("/qrcode/getLoginInfo"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "SESSDATA=odd; Path=/")
                .set_body_json(body.clone()),
        )
        .mount(&server)
        .await;

    let raw = service.get_login_qr_code_status("k1").await.expect("poll");

    assert_eq!(raw, body);
    assert_eq!(ctx.config.cookie_string(), "SESSDATA=odd");
}

#[tokio::test]
async fn non_object_poll_body_is_a_decode_error() {
    let (server, ctx, service) = setup().await;

    Mock::given(method("POST"))
        .and(path("/qrcode/getLoginInfo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([1, 2, 3])))
        .mount(&server)
        .await;

    let err = service.get_login_qr_code_status("k1").await.expect_err("must fail");
    assert!(matches!(err, BilibiliError::Decode(_)), "{err:?}");
    assert_eq!(ctx.config.cookie_string(), "");
}

#[tokio::test]
async fn confirmed_poll_saves_session_and_returns_raw_response() {
    let (server, ctx, service) = setup().await;
    let body = json!({
        "code": 0,
        "status": true,
        "ts": 1700000001,
        "data": { "url": "https://passport.biligame.com/crossDomain?DedeUserID=1" }
    });

    Mock::given(method("POST"))
        .and(path("/qrcode/getLoginInfo"))
        .and(body_string("oauthKey=k1"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "SESSDATA=qr; Path=/")
                .set_body_json(body.clone()),
        )
        .expect(1)
        .mount(&server)
        .await;

    let raw = service.get_login_qr_code_status("k1").await.expect("poll");

    assert_eq!(raw, body);
    assert_eq!(ctx.config.cookie_string(), "SESSDATA=qr");
}

#[tokio::test]
async fn pending_poll_leaves_store_untouched() {
    let (server, ctx, service) = setup().await;
    ctx.config.set_cookie_string("previous=1").expect("seed");
    let body = json!({ "status": false, "data": -4, "message": "Can't scan~" });

    Mock::given(method("POST"))
        .and(path("/qrcode/getLoginInfo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body.clone()))
        .mount(&server)
        .await;

    let raw = service.get_login_qr_code_status("k1").await.expect("poll");

    assert_eq!(raw, body);
    assert_eq!(ctx.config.cookie_string(), "previous=1");

    let poll: QrPollResponse = serde_json::from_value(raw).expect("typed view");
    assert_eq!(poll.state(), QrLoginState::NotScanned);
    assert!(!poll.state().is_terminal());
}

#[tokio::test]
async fn caller_driven_polling_until_terminal_state() {
    let (server, ctx, service) = setup().await;

    // 前两次未完成，第三次确认
    Mock::given(method("POST"))
        .and(path("/qrcode/getLoginInfo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": false, "data": -5 })))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/qrcode/getLoginInfo"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "SESSDATA=late; Path=/")
                .set_body_json(json!({ "code": 0, "status": true, "data": { "url": "x" } })),
        )
        .mount(&server)
        .await;

    let mut states = Vec::new();
    for _ in 0..5 {
        let raw = service.get_login_qr_code_status("k1").await.expect("poll");
        let state = serde_json::from_value::<QrPollResponse>(raw).expect("typed").state();
        states.push(state);
        if state.is_terminal() {
            break;
        }
    }

    assert_eq!(
        states,
        vec![
            QrLoginState::ScannedUnconfirmed,
            QrLoginState::ScannedUnconfirmed,
            QrLoginState::Confirmed
        ]
    );
    assert_eq!(ctx.config.cookie_string(), "SESSDATA=late");
}
