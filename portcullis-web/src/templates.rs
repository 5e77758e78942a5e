//! Template system for server-side rendering
//!
//! Views are rendered with Askama from the files under `templates/`.

use crate::auth::csrf::CSRF_FIELD;
use askama::Template;
use portcullis_core::SessionContext;

/// Landing page
#[derive(Template)]
#[template(path = "main.html")]
pub struct MainTemplate {
    pub title: String,
    pub username: Option<String>,
}

/// Login form
#[derive(Template)]
#[template(path = "login.html")]
pub struct LoginTemplate {
    pub title: String,
    pub csrf_field: &'static str,
    pub csrf_token: String,
    pub error_message: Option<String>,
}

/// Registration form
#[derive(Template)]
#[template(path = "join.html")]
pub struct JoinTemplate {
    pub title: String,
    pub csrf_field: &'static str,
    pub csrf_token: String,
    pub error_message: Option<String>,
}

/// Personal area, any signed-in role
#[derive(Template)]
#[template(path = "my.html")]
pub struct MyTemplate {
    pub title: String,
    pub username: String,
    pub role: String,
}

/// Administrator area
#[derive(Template)]
#[template(path = "admin.html")]
pub struct AdminTemplate {
    pub title: String,
    pub username: String,
}

/// Error page template
#[derive(Template)]
#[template(path = "error.html")]
pub struct ErrorTemplate {
    pub title: String,
    pub error_code: u16,
    pub error_message: String,
}

/// Human-readable text for the `?error=` codes the form handlers redirect with
pub fn form_error_message(code: &str) -> Option<String> {
    let message = match code {
        "invalid" => "Invalid username or password.",
        "session_limit" => "This account is already signed in elsewhere. Log out there first.",
        "exists" => "That username is already taken.",
        "missing" => "Username and password are required.",
        _ => return None,
    };
    Some(message.to_string())
}

impl MainTemplate {
    pub fn new(context: &SessionContext) -> Self {
        Self {
            title: "Portcullis".to_string(),
            username: context.username().map(str::to_string),
        }
    }
}

impl LoginTemplate {
    pub fn new(csrf_token: String, error: Option<&str>) -> Self {
        Self {
            title: "Sign in - Portcullis".to_string(),
            csrf_field: CSRF_FIELD,
            csrf_token,
            error_message: error.and_then(form_error_message),
        }
    }
}

impl JoinTemplate {
    pub fn new(csrf_token: String, error: Option<&str>) -> Self {
        Self {
            title: "Create account - Portcullis".to_string(),
            csrf_field: CSRF_FIELD,
            csrf_token,
            error_message: error.and_then(form_error_message),
        }
    }
}

impl MyTemplate {
    pub fn new(username: &str, role: &str) -> Self {
        Self {
            title: format!("{} - Portcullis", username),
            username: username.to_string(),
            role: role.to_string(),
        }
    }
}

impl AdminTemplate {
    pub fn new(username: &str) -> Self {
        Self {
            title: "Administration - Portcullis".to_string(),
            username: username.to_string(),
        }
    }
}

impl ErrorTemplate {
    pub fn new(error_code: u16, error_message: String) -> Self {
        Self {
            title: format!("Error {} - Portcullis", error_code),
            error_code,
            error_message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_form_carries_token_and_message() {
        let html = LoginTemplate::new("tok123".to_string(), Some("invalid"))
            .render()
            .unwrap();

        assert!(html.contains(r#"name="_csrf""#));
        assert!(html.contains("tok123"));
        assert!(html.contains("Invalid username or password."));
    }

    #[test]
    fn test_unknown_error_code_is_ignored() {
        assert!(form_error_message("<script>").is_none());
        let html = JoinTemplate::new("t".to_string(), Some("<script>"))
            .render()
            .unwrap();
        assert!(!html.contains("<script>"));
    }

    #[test]
    fn test_main_page_escapes_username() {
        let html = MainTemplate {
            title: "Portcullis".to_string(),
            username: Some("<b>eve</b>".to_string()),
        }
        .render()
        .unwrap();

        assert!(!html.contains("<b>eve</b>"));
        assert!(html.contains("eve"));
    }
}
