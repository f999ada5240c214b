use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bilidown_core::bilibili::api::{BilibiliEndpoints, CaptchaChallenge};
use bilidown_core::bilibili::{BilibiliError, BilibiliService};
use bilidown_core::session::SessionContext;
use reqwest::Url;
use rsa::pkcs8::{EncodePublicKey, LineEnding};
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey};
use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Harness {
    server: MockServer,
    ctx: SessionContext,
    service: BilibiliService,
    origin: Url,
}

async fn harness() -> Harness {
    let server = MockServer::start().await;
    let ctx = SessionContext::in_memory();
    let endpoints = BilibiliEndpoints::single_host(&server.uri()).expect("endpoints");
    let origin = endpoints.cookie_origin.clone();
    let service = BilibiliService::new(ctx.clone(), endpoints);
    Harness {
        server,
        ctx,
        service,
        origin,
    }
}

fn captcha() -> CaptchaChallenge {
    CaptchaChallenge {
        token: "tok".to_string(),
        challenge: "chal".to_string(),
        validate: "val".to_string(),
        seccode: "sec|jordan".to_string(),
    }
}

fn key_pair() -> (RsaPrivateKey, String) {
    let key = RsaPrivateKey::new(&mut rand::thread_rng(), 1024).expect("generate key");
    let pem = key
        .to_public_key()
        .to_public_key_pem(LineEnding::LF)
        .expect("pem");
    (key, pem)
}

/// 把表单请求体解析为键值对。
fn form_pairs(body: &[u8]) -> Vec<(String, String)> {
    let body = String::from_utf8_lossy(body);
    let url = Url::parse(&format!("http://form.local/?{body}")).expect("form url");
    url.query_pairs().map(|(k, v)| (k.into_owned(), v.into_owned())).collect()
}

fn field<'a>(pairs: &'a [(String, String)], name: &str) -> &'a str {
    pairs
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
        .unwrap_or_else(|| panic!("missing form field {name}"))
}

#[tokio::test]
async fn successful_login_encrypts_salted_password_and_saves_cookies() {
    let h = harness().await;
    let (private_key, pem) = key_pair();

    Mock::given(method("GET"))
        .and(path("/x/passport-login/web/key"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "buvid3=device; Path=/")
                .set_body_json(json!({ "code": 0, "message": "0", "data": { "hash": "abc", "key": pem } })),
        )
        .expect(1)
        .mount(&h.server)
        .await;

    Mock::given(method("POST"))
        .and(path("/x/passport-login/web/login"))
        .and(body_string_contains("source=main_web"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "SESSDATA=sess1; Path=/")
                .set_body_json(json!({ "code": 0, "message": "0", "data": { "status": 0 } })),
        )
        .expect(1)
        .mount(&h.server)
        .await;

    h.service
        .login_with_password("alice", "p", &captcha())
        .await
        .expect("login");

    // 配置中的 Cookie 串与 Cookie 罐对平台来源的序列化结果完全一致
    let stored = h.ctx.config.cookie_string();
    assert_eq!(stored, h.ctx.network.cookie_string(&h.origin));
    assert!(stored.contains("SESSDATA=sess1"), "{stored}");
    assert!(stored.contains("buvid3=device"), "{stored}");

    let requests = h.server.received_requests().await.expect("recorded requests");
    let login = requests
        .iter()
        .find(|r| r.url.path() == "/x/passport-login/web/login")
        .expect("login request");
    let pairs = form_pairs(&login.body);

    assert_eq!(field(&pairs, "source"), "main_web");
    assert_eq!(field(&pairs, "username"), "alice");
    assert_eq!(field(&pairs, "keep"), "true");
    assert_eq!(field(&pairs, "token"), "tok");
    assert_eq!(field(&pairs, "go_url"), "https://www.bilibili.com/");
    assert_eq!(field(&pairs, "challenge"), "chal");
    assert_eq!(field(&pairs, "validate"), "val");
    assert_eq!(field(&pairs, "seccode"), "sec|jordan");

    let cipher = STANDARD.decode(field(&pairs, "password")).expect("base64 password");
    let plain = private_key.decrypt(Pkcs1v15Encrypt, &cipher).expect("decrypt");
    assert_eq!(plain, b"abcp");
}

#[tokio::test]
async fn key_fetch_rejection_aborts_without_touching_the_store() {
    let h = harness().await;

    Mock::given(method("GET"))
        .and(path("/x/passport-login/web/key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "code": -1, "message": "bad" })))
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/x/passport-login/web/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "code": 0 })))
        .expect(0)
        .mount(&h.server)
        .await;

    let err = h
        .service
        .login_with_password("alice", "p", &captcha())
        .await
        .expect_err("must fail");

    assert!(err.to_string().contains("bad"), "{err}");
    assert!(matches!(err, BilibiliError::Remote { code: -1, .. }));
    assert_eq!(h.ctx.config.cookie_string(), "");
}

#[tokio::test]
async fn login_rejection_carries_remote_message() {
    let h = harness().await;
    let (_, pem) = key_pair();

    Mock::given(method("GET"))
        .and(path("/x/passport-login/web/key"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "code": 0, "data": { "hash": "h", "key": pem } })),
        )
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/x/passport-login/web/login"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "half=baked; Path=/")
                .set_body_json(json!({ "code": -105, "message": "验证码错误" })),
        )
        .mount(&h.server)
        .await;

    let err = h
        .service
        .login_with_password("alice", "wrong", &captcha())
        .await
        .expect_err("must fail");

    assert!(err.to_string().contains("验证码错误"), "{err}");
    assert_eq!(h.ctx.config.cookie_string(), "");
}

#[tokio::test]
async fn malformed_key_response_is_a_decode_error() {
    let h = harness().await;

    Mock::given(method("GET"))
        .and(path("/x/passport-login/web/key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": { "hash": 1 } })))
        .mount(&h.server)
        .await;

    let err = h
        .service
        .login_with_password("alice", "p", &captcha())
        .await
        .expect_err("must fail");
    assert!(matches!(err, BilibiliError::Decode(_)), "{err:?}");
}

#[tokio::test]
async fn http_failure_propagates_as_transport_error() {
    let h = harness().await;

    Mock::given(method("GET"))
        .and(path("/x/passport-login/web/key"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&h.server)
        .await;

    let err = h
        .service
        .login_with_password("alice", "p", &captcha())
        .await
        .expect_err("must fail");
    assert!(matches!(err, BilibiliError::Transport(_)), "{err:?}");
    assert_eq!(h.ctx.config.cookie_string(), "");
}
