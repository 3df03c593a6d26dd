//! The ordered stages every guarded request passes through before it reaches a handler.

use url::Url;
use warp::http::{Method, StatusCode};
use warp::reject::Reject;

use crate::config::Settings;

/// Paths reachable without logging in, besides the configured login URL.
pub const PUBLIC_PREFIXES: &[&str] = &[
    "/auth/local-login/",
    "/auth/oidc-login/",
    "/oidc/authenticate/",
    "/oidc/callback/",
    "/oidc/logout/",
    "/static/",
    "/media/",
];

/// What the pipeline knows about the request being handled.
#[derive(Clone, Debug)]
pub struct RequestContext {
    pub method: Method,
    pub path: String,
    /// The logged-in user, if any.
    pub user: Option<String>,
    pub base_url: Option<Url>,
}

impl RequestContext {
    pub fn new(method: Method, path: &str, user: Option<String>) -> RequestContext {
        RequestContext {
            method,
            path: path.to_string(),
            user,
            base_url: None,
        }
    }
}

/// A response produced by a stage instead of the handler.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Halt {
    pub status: StatusCode,
    pub location: Option<String>,
    pub body: String,
}

impl Halt {
    pub fn bad_request(body: &str) -> Halt {
        Halt {
            status: StatusCode::BAD_REQUEST,
            location: None,
            body: body.to_string(),
        }
    }

    pub fn redirect(location: &str) -> Halt {
        Halt {
            status: StatusCode::FOUND,
            location: Some(location.to_string()),
            body: String::new(),
        }
    }
}

impl Reject for Halt {}

/// Whether a request goes on to the next stage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Respond(Halt),
}

#[derive(Clone, Debug)]
pub enum Stage {
    /// POST and PATCH requests to the API must not end in a slash.
    RejectApiTrailingSlash,

    /// Anonymous requests outside the public prefixes are sent to the login page.
    LoginRequired {
        login_url: String,
        excluded: Vec<String>,
    },

    /// Makes the public site URL available to handlers.
    AttachBaseUrl(Url),
}

impl Stage {
    pub fn login_required(login_url: &str) -> Stage {
        let mut excluded = vec![login_url.to_string()];
        excluded.extend(PUBLIC_PREFIXES.iter().map(|p| p.to_string()));
        Stage::LoginRequired {
            login_url: login_url.to_string(),
            excluded,
        }
    }

    pub fn handle(&self, ctx: &mut RequestContext) -> Flow {
        match *self {
            Stage::RejectApiTrailingSlash => {
                let writes = ctx.method == Method::POST || ctx.method == Method::PATCH;
                if writes && ctx.path.starts_with("/api/") && ctx.path.ends_with('/') {
                    Flow::Respond(Halt::bad_request(
                        "The URL must not end with a slash in a POST or PATCH request. \
                         Use the URL without the trailing slash.",
                    ))
                } else {
                    Flow::Continue
                }
            }
            Stage::LoginRequired {
                ref login_url,
                ref excluded,
            } => {
                if ctx.user.is_some() {
                    return Flow::Continue;
                }
                if excluded.iter().any(|prefix| ctx.path.starts_with(prefix.as_str())) {
                    debug!("Anonymous access allowed: {}", ctx.path);
                    Flow::Continue
                } else {
                    info!("Anonymous access to {}, redirecting to {}", ctx.path, login_url);
                    Flow::Respond(Halt::redirect(login_url))
                }
            }
            Stage::AttachBaseUrl(ref url) => {
                ctx.base_url = Some(url.clone());
                Flow::Continue
            }
        }
    }
}

/// The stages, in the order they run.
#[derive(Clone, Debug)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    pub fn new(stages: Vec<Stage>) -> Pipeline {
        Pipeline { stages }
    }

    /// The stages the site runs with.
    pub fn for_settings(settings: &Settings) -> Pipeline {
        Pipeline::new(vec![
            Stage::RejectApiTrailingSlash,
            Stage::login_required(&settings.login_url),
            Stage::AttachBaseUrl(settings.base_url.clone()),
        ])
    }

    /// Runs the stages until one of them responds.
    pub fn run(&self, ctx: &mut RequestContext) -> Flow {
        for stage in &self.stages {
            if let Flow::Respond(halt) = stage.handle(ctx) {
                return Flow::Respond(halt);
            }
        }
        Flow::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pipeline() -> Pipeline {
        Pipeline::new(vec![
            Stage::RejectApiTrailingSlash,
            Stage::login_required("/auth/local-login/"),
            Stage::AttachBaseUrl(Url::parse("https://clients.example.com/").unwrap()),
        ])
    }

    fn run(method: Method, path: &str, user: Option<&str>) -> (Flow, RequestContext) {
        let mut ctx = RequestContext::new(method, path, user.map(str::to_string));
        let flow = pipeline().run(&mut ctx);
        (flow, ctx)
    }

    #[test]
    fn api_writes_with_trailing_slash_are_rejected() {
        for method in [Method::POST, Method::PATCH] {
            match run(method, "/api/mailings/", Some("admin")).0 {
                Flow::Respond(halt) => assert_eq!(halt.status, StatusCode::BAD_REQUEST),
                Flow::Continue => panic!("trailing slash let through"),
            }
        }
        assert_eq!(run(Method::GET, "/api/mailings/", Some("admin")).0, Flow::Continue);
        assert_eq!(run(Method::POST, "/api/mailings", Some("admin")).0, Flow::Continue);
        assert_eq!(run(Method::POST, "/auth/local-login/", None).0, Flow::Continue);
    }

    #[test]
    fn the_slash_check_runs_before_the_login_check() {
        match run(Method::POST, "/api/clients/", None).0 {
            Flow::Respond(halt) => assert_eq!(halt.status, StatusCode::BAD_REQUEST),
            Flow::Continue => panic!("trailing slash let through"),
        }
    }

    #[test]
    fn anonymous_requests_are_redirected() {
        match run(Method::GET, "/", None).0 {
            Flow::Respond(halt) => {
                assert_eq!(halt.status, StatusCode::FOUND);
                assert_eq!(halt.location.as_deref(), Some("/auth/local-login/"));
            }
            Flow::Continue => panic!("anonymous request let through"),
        }
    }

    #[test]
    fn public_prefixes_are_open() {
        for path in ["/static/app.css", "/media/logo.png", "/oidc/callback/", "/auth/oidc-login/"] {
            assert_eq!(run(Method::GET, path, None).0, Flow::Continue, "{}", path);
        }
    }

    #[test]
    fn custom_login_url_is_open() {
        let pipeline = Pipeline::new(vec![Stage::login_required("/auth/login/")]);
        let mut ctx = RequestContext::new(Method::GET, "/auth/login/", None);
        assert_eq!(pipeline.run(&mut ctx), Flow::Continue);
    }

    #[test]
    fn base_url_is_attached() {
        let (flow, ctx) = run(Method::GET, "/", Some("admin"));
        assert_eq!(flow, Flow::Continue);
        assert_eq!(
            ctx.base_url.map(|u| u.to_string()),
            Some("https://clients.example.com/".to_string())
        );
    }
}
