//! The web-serving parts.

mod endpoints;
pub mod filters;
pub mod pipeline;
pub mod session;

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;

use serde_json::Value;
use tera::{Context, Tera};
use url::Url;
use warp::{
    filters::path::FullPath,
    http::{Method, StatusCode},
    reject::Reject,
    reply::{self, Reply, Response},
    Filter, Rejection,
};

use crate::config::Settings;
use crate::util::log_err;
use crate::web::pipeline::{Flow, Halt, Pipeline, RequestContext};
use crate::web::session::Sessions;
use crate::worker::Dispatcher;
use crate::{Error, Result, DB};

/// The largest request body accepted.
const BODY_LIMIT: u64 = 64 * 1024;

/// An error raised while handling a request, shown as an error page.
#[derive(Debug)]
pub struct Failure(pub Error);

impl Reject for Failure {}

/// The HTML page templates, with the site's filters and functions.
pub struct Renderer {
    tera: Tera,
}

impl Renderer {
    pub fn new(base_url: &Url) -> Result<Renderer> {
        let mut tera = Tera::default();
        let base_url = base_url.clone();
        tera.register_function(
            "relative_url",
            move |args: &HashMap<String, Value>| -> tera::Result<Value> {
                let path = args
                    .get("path")
                    .and_then(Value::as_str)
                    .ok_or_else(|| tera::Error::msg("relative_url expects a `path` string"))?;
                let url = base_url
                    .join(path)
                    .map_err(|e| tera::Error::msg(e.to_string()))?;
                Ok(Value::String(url.to_string()))
            },
        );
        tera.register_filter("phone_format", filters::phone_format);
        tera.register_filter("tojson", filters::tojson);
        tera.add_raw_templates(vec![
            ("base.html", include_str!("base.html")),
            ("error.html", include_str!("error.html")),
            ("index.html", include_str!("index.html")),
            ("login.html", include_str!("login.html")),
        ])?;
        Ok(Renderer { tera })
    }

    /// Renders a page. A template that fails to render becomes a plain-text 500.
    pub fn page(&self, status: StatusCode, name: &str, context: &Context) -> Response {
        match self.tera.render(name, context) {
            Ok(html) => reply::with_status(reply::html(html), status).into_response(),
            Err(err) => {
                log_err(&err);
                reply::with_status(err.to_string(), StatusCode::INTERNAL_SERVER_ERROR)
                    .into_response()
            }
        }
    }

    pub fn error_page(&self, status: StatusCode, message: &str) -> Response {
        self.page(
            status,
            "error.html",
            &context! {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or(""),
                message: message,
            },
        )
    }
}

/// A `302 Found` to the given location.
pub fn redirect(location: &str) -> Response {
    reply::with_header(StatusCode::FOUND, "location", location).into_response()
}

fn halt_response(halt: &Halt) -> Response {
    let response = reply::with_status(halt.body.clone(), halt.status);
    match halt.location {
        Some(ref location) => {
            reply::with_header(response, "location", location.as_str()).into_response()
        }
        None => response.into_response(),
    }
}

/// Runs the request pipeline, extracting the request context or rejecting with the response a
/// stage produced.
fn guard(
    pipeline: Arc<Pipeline>,
    sessions: Sessions,
) -> impl Filter<Extract = (RequestContext,), Error = Rejection> + Clone {
    warp::method()
        .and(warp::path::full())
        .and(warp::cookie::optional(session::COOKIE))
        .and_then(move |method: Method, path: FullPath, token: Option<String>| {
            let pipeline = pipeline.clone();
            let sessions = sessions.clone();
            async move {
                let user = token.and_then(|token| sessions.user(&token));
                let mut ctx = RequestContext::new(method, path.as_str(), user);
                match pipeline.run(&mut ctx) {
                    Flow::Continue => Ok(ctx),
                    Flow::Respond(halt) => Err(warp::reject::custom(halt)),
                }
            }
        })
}

/// Returns all the routes.
pub fn routes(
    db: DB,
    settings: Arc<Settings>,
    dispatcher: Dispatcher,
    sessions: Sessions,
) -> Result<impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone> {
    let render = Arc::new(Renderer::new(&settings.base_url)?);
    let guard = guard(Arc::new(Pipeline::for_settings(&settings)), sessions.clone());

    let with_db = warp::any().map(move || db.clone());
    let with_render = {
        let render = render.clone();
        warp::any().map(move || render.clone())
    };
    let with_sessions = warp::any().map(move || sessions.clone());
    let with_dispatcher = warp::any().map(move || dispatcher.clone());

    let health = warp::path!("healthz")
        .and(warp::get())
        .and_then(endpoints::healthz)
        .or(warp::path!("healthz_worker")
            .and(warp::get())
            .and(with_dispatcher.clone())
            .and_then(endpoints::healthz_worker));

    let statics = warp::path("static").and(warp::fs::dir(settings.static_dir.clone()));

    let auth = guard
        .clone()
        .and(warp::path!("auth" / "local-login"))
        .and(warp::get())
        .and(with_render.clone())
        .and_then(endpoints::login_form)
        .or(guard
            .clone()
            .and(warp::path!("auth" / "local-login"))
            .and(warp::post())
            .and(warp::body::content_length_limit(BODY_LIMIT))
            .and(warp::body::form())
            .and(with_db.clone())
            .and(with_sessions.clone())
            .and(with_render.clone())
            .and_then(endpoints::login_submit))
        .or(guard
            .clone()
            .and(warp::path!("auth" / "logout"))
            .and(warp::get())
            .and(warp::cookie::optional(session::COOKIE))
            .and(with_sessions.clone())
            .and_then(endpoints::logout));

    let index = guard
        .clone()
        .and(warp::path::end())
        .and(warp::get())
        .and(with_db.clone())
        .and(with_render.clone())
        .and_then(endpoints::index);

    let clients = guard
        .clone()
        .and(warp::path!("api" / "clients"))
        .and(warp::get())
        .and(with_db.clone())
        .and_then(endpoints::clients_list)
        .or(guard
            .clone()
            .and(warp::path!("api" / "clients"))
            .and(warp::post())
            .and(warp::body::content_length_limit(BODY_LIMIT))
            .and(warp::body::json())
            .and(with_db.clone())
            .and_then(endpoints::clients_create));

    let mailings = guard
        .clone()
        .and(warp::path!("api" / "mailings"))
        .and(warp::get())
        .and(with_db.clone())
        .and_then(endpoints::mailings_list)
        .or(guard
            .clone()
            .and(warp::path!("api" / "mailings"))
            .and(warp::post())
            .and(warp::body::content_length_limit(BODY_LIMIT))
            .and(warp::body::json())
            .and(with_db.clone())
            .and_then(endpoints::mailings_create))
        .or(guard
            .clone()
            .and(warp::path!("api" / "mailings" / i32))
            .and(warp::get())
            .and(with_db.clone())
            .and_then(endpoints::mailing_detail))
        .or(guard
            .clone()
            .and(warp::path!("api" / "mailings" / i32 / "send"))
            .and(warp::post())
            .and(with_db.clone())
            .and(with_dispatcher.clone())
            .and_then(endpoints::mailing_send));

    Ok(health
        .or(statics)
        .or(auth)
        .or(index)
        .or(clients)
        .or(mailings)
        .recover(move |err| recover(err, render.clone())))
}

async fn recover(err: Rejection, render: Arc<Renderer>) -> ::std::result::Result<Response, Infallible> {
    if let Some(halt) = err.find::<Halt>() {
        return Ok(halt_response(halt));
    }
    if let Some(Failure(ref e)) = err.find::<Failure>() {
        log_err(e);
        return Ok(if e.is_database_unavailable() {
            render.error_page(
                StatusCode::SERVICE_UNAVAILABLE,
                "The database is unavailable. Please try again later.",
            )
        } else {
            render.error_page(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Something went wrong while handling the request.",
            )
        });
    }
    if err.is_not_found() {
        return Ok(render.error_page(StatusCode::NOT_FOUND, "This page does not exist."));
    }
    if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        return Ok(
            reply::with_status(
                reply::json(&serde_json::json!({ "error": e.to_string() })),
                StatusCode::BAD_REQUEST,
            )
            .into_response(),
        );
    }
    if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        return Ok(render.error_page(
            StatusCode::METHOD_NOT_ALLOWED,
            "This method is not allowed here.",
        ));
    }

    error!("Unhandled rejection: {:?}", err);
    Ok(render.error_page(
        StatusCode::INTERNAL_SERVER_ERROR,
        "Something went wrong while handling the request.",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn renderer() -> Renderer {
        Renderer::new(&Url::parse("https://clients.example.com/").unwrap()).unwrap()
    }

    #[test]
    fn error_page_has_the_status() {
        let res = renderer().error_page(StatusCode::SERVICE_UNAVAILABLE, "Database down");
        assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn halts_carry_their_location() {
        let res = halt_response(&Halt::redirect("/auth/local-login/"));
        assert_eq!(res.status(), StatusCode::FOUND);
        assert_eq!(res.headers()["location"], "/auth/local-login/");
    }
}
