//! End-to-end authentication flow over HTTP

use axum::{
    body::Body,
    http::{Request, StatusCode},
    response::Response,
    Router,
};
use portcullis_core::{BootstrapAdmin, PortcullisConfig, SessionLimitPolicy};
use portcullis_web::{create_app, AppState, WebConfig};
use std::collections::HashMap;
use tower::ServiceExt;

/// A browser stand-in that remembers cookies between requests
struct Browser {
    app: Router,
    cookies: HashMap<String, String>,
}

impl Browser {
    fn new(app: Router) -> Self {
        Self {
            app,
            cookies: HashMap::new(),
        }
    }

    fn cookie_header(&self) -> String {
        self.cookies
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>()
            .join("; ")
    }

    async fn send(&mut self, builder: axum::http::request::Builder, body: Body) -> Response {
        let builder = if self.cookies.is_empty() {
            builder
        } else {
            builder.header("Cookie", self.cookie_header())
        };

        let response = self
            .app
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();

        for header in response.headers().get_all("set-cookie") {
            let pair = header.to_str().unwrap().split(';').next().unwrap();
            let (name, value) = pair.split_once('=').unwrap();
            if value.is_empty() {
                self.cookies.remove(name);
            } else {
                self.cookies.insert(name.to_string(), value.to_string());
            }
        }

        response
    }

    async fn get(&mut self, uri: &str) -> Response {
        self.send(Request::builder().method("GET").uri(uri), Body::empty())
            .await
    }

    async fn post_form(&mut self, uri: &str, fields: &str) -> Response {
        self.send(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("Content-Type", "application/x-www-form-urlencoded"),
            Body::from(fields.to_string()),
        )
        .await
    }

    /// Load the form page to pick up a CSRF token, then submit the credentials
    async fn submit(&mut self, page: &str, action: &str, username: &str, password: &str) -> Response {
        let form = self.get(page).await;
        assert_eq!(form.status(), StatusCode::OK);
        let token = self.cookies.get("XSRF-TOKEN").cloned().unwrap();

        self.post_form(
            action,
            &format!("username={}&password={}&_csrf={}", username, password, token),
        )
        .await
    }

    async fn join(&mut self, username: &str, password: &str) -> Response {
        self.submit("/join", "/joinProc", username, password).await
    }

    async fn login(&mut self, username: &str, password: &str) -> Response {
        self.submit("/login", "/loginProc", username, password).await
    }
}

fn location(response: &Response) -> &str {
    response
        .headers()
        .get("location")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
}

async fn body_text(response: Response) -> String {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8_lossy(&body).into_owned()
}

async fn create_test_app(settings: PortcullisConfig) -> Router {
    let state = AppState::with_settings(WebConfig::default(), settings)
        .await
        .unwrap();
    create_app(state)
}

fn settings_with_admin() -> PortcullisConfig {
    PortcullisConfig {
        bootstrap_admin: Some(BootstrapAdmin {
            username: "root".to_string(),
            password: "changeme".to_string(),
        }),
        ..PortcullisConfig::default()
    }
}

#[tokio::test]
async fn test_join_login_browse_logout() {
    let app = create_test_app(PortcullisConfig::default()).await;
    let mut browser = Browser::new(app);

    let joined = browser.join("alice", "pw1").await;
    assert_eq!(joined.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&joined), "/login");

    let logged_in = browser.login("alice", "pw1").await;
    assert_eq!(logged_in.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&logged_in), "/");
    let set_cookie = logged_in
        .headers()
        .get_all("set-cookie")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with("SESSION="))
        .unwrap()
        .to_string();
    assert!(set_cookie.contains("HttpOnly"));
    assert!(set_cookie.contains("SameSite=Lax"));

    let home = browser.get("/").await;
    assert!(body_text(home).await.contains("alice"));

    let my = browser.get("/my/profile").await;
    assert_eq!(my.status(), StatusCode::OK);
    assert!(body_text(my).await.contains("ROLE_USER"));

    let admin = browser.get("/admin").await;
    assert_eq!(admin.status(), StatusCode::FORBIDDEN);

    let unknown = browser.get("/unknown/path").await;
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);

    let logout = browser.get("/logout").await;
    assert_eq!(logout.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&logout), "/");
    assert!(!browser.cookies.contains_key("SESSION"));

    let after = browser.get("/my/profile").await;
    assert_eq!(after.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&after), "/login");
}

#[tokio::test]
async fn test_old_session_token_dies_with_logout() {
    let app = create_test_app(PortcullisConfig::default()).await;
    let mut browser = Browser::new(app.clone());

    browser.join("alice", "pw1").await;
    browser.login("alice", "pw1").await;
    let token = browser.cookies.get("SESSION").cloned().unwrap();

    browser.post_form("/logout", "").await;

    // Replaying the old cookie after logout gets nowhere
    let mut replay = Browser::new(app);
    replay.cookies.insert("SESSION".to_string(), token);
    let response = replay.get("/my").await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login");
}

#[tokio::test]
async fn test_second_device_is_rejected_while_first_is_signed_in() {
    let app = create_test_app(PortcullisConfig::default()).await;
    let mut laptop = Browser::new(app.clone());
    let mut phone = Browser::new(app);

    laptop.join("alice", "pw1").await;
    laptop.login("alice", "pw1").await;

    let rejected = phone.login("alice", "pw1").await;
    assert_eq!(location(&rejected), "/login?error=session_limit");
    assert!(!phone.cookies.contains_key("SESSION"));

    let page = phone.get("/login?error=session_limit").await;
    assert!(body_text(page).await.contains("already signed in elsewhere"));

    // The first device is unaffected
    assert_eq!(laptop.get("/my").await.status(), StatusCode::OK);

    laptop.get("/logout").await;
    let admitted = phone.login("alice", "pw1").await;
    assert_eq!(location(&admitted), "/");
}

#[tokio::test]
async fn test_evict_oldest_signs_out_first_device() {
    let mut settings = PortcullisConfig::default();
    settings.session.on_limit = SessionLimitPolicy::EvictOldest;
    let app = create_test_app(settings).await;
    let mut laptop = Browser::new(app.clone());
    let mut phone = Browser::new(app);

    laptop.join("alice", "pw1").await;
    laptop.login("alice", "pw1").await;
    assert_eq!(location(&phone.login("alice", "pw1").await), "/");

    assert_eq!(phone.get("/my").await.status(), StatusCode::OK);
    assert_eq!(laptop.get("/my").await.status(), StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn test_login_rotates_session_token() {
    let app = create_test_app(PortcullisConfig::default()).await;
    let mut browser = Browser::new(app);

    browser.join("alice", "pw1").await;
    browser.login("alice", "pw1").await;
    let first = browser.cookies.get("SESSION").cloned().unwrap();

    // Logging in again from the same browser replaces the session
    let again = browser.login("alice", "pw1").await;
    assert_eq!(location(&again), "/");
    let second = browser.cookies.get("SESSION").cloned().unwrap();
    assert_ne!(first, second);
    assert_eq!(browser.get("/my").await.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_login_rotates_csrf_token() {
    let app = create_test_app(PortcullisConfig::default()).await;
    let mut browser = Browser::new(app);
    browser.join("alice", "pw1").await;

    // A token handed out before login, e.g. one planted by an attacker
    browser.get("/login").await;
    let planted = browser.cookies.get("XSRF-TOKEN").cloned().unwrap();

    let logged_in = browser
        .post_form(
            "/loginProc",
            &format!("username=alice&password=pw1&_csrf={}", planted),
        )
        .await;
    assert_eq!(location(&logged_in), "/");
    let fresh = browser.cookies.get("XSRF-TOKEN").cloned().unwrap();
    assert_ne!(planted, fresh);

    // The pre-login token no longer passes the double-submit check
    let replayed = browser
        .post_form(
            "/joinProc",
            &format!("username=bob&password=pw2&_csrf={}", planted),
        )
        .await;
    assert_eq!(replayed.status(), StatusCode::FORBIDDEN);

    // Forms rendered after login carry the fresh token and keep working
    let joined = browser.join("bob", "pw2").await;
    assert_eq!(location(&joined), "/login");
}

#[tokio::test]
async fn test_wrong_password_and_unknown_user_look_the_same() {
    let app = create_test_app(PortcullisConfig::default()).await;
    let mut browser = Browser::new(app);
    browser.join("alice", "pw1").await;

    let wrong = browser.login("alice", "pw2").await;
    let unknown = browser.login("mallory", "pw1").await;

    assert_eq!(location(&wrong), "/login?error=invalid");
    assert_eq!(location(&unknown), "/login?error=invalid");
}

#[tokio::test]
async fn test_admin_reaches_admin_page() {
    let app = create_test_app(settings_with_admin()).await;
    let mut browser = Browser::new(app);

    browser.login("root", "changeme").await;

    let admin = browser.get("/admin").await;
    assert_eq!(admin.status(), StatusCode::OK);
    assert!(body_text(admin).await.contains("root"));
    assert_eq!(browser.get("/my/settings").await.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_form_posts_require_csrf_token() {
    let app = create_test_app(PortcullisConfig::default()).await;
    let mut browser = Browser::new(app);

    // No token at all
    let missing = browser
        .post_form("/joinProc", "username=alice&password=pw1")
        .await;
    assert_eq!(missing.status(), StatusCode::FORBIDDEN);

    // Cookie present but the form carries a different value
    browser.get("/login").await;
    let forged = browser
        .post_form("/loginProc", "username=alice&password=pw1&_csrf=forged")
        .await;
    assert_eq!(forged.status(), StatusCode::FORBIDDEN);

    // Nothing was registered by the rejected join
    let login = browser.login("alice", "pw1").await;
    assert_eq!(location(&login), "/login?error=invalid");
}

#[tokio::test]
async fn test_public_pages_need_no_session() {
    let app = create_test_app(PortcullisConfig::default()).await;
    let mut browser = Browser::new(app);

    for path in ["/", "/login", "/join"] {
        assert_eq!(browser.get(path).await.status(), StatusCode::OK, "{}", path);
    }
    assert_eq!(location(&browser.get("/admin").await), "/login");
    assert_eq!(location(&browser.get("/logout").await), "/login");
}
