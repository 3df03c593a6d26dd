use std::sync::Arc;

use diesel::Connection;
use serde::{Deserialize, Serialize};
use serde_json::json;
use warp::http::StatusCode;
use warp::reply::{self, Reply, Response};
use warp::Rejection;

use crate::db::models::{Client, Contact, Mailing, NewClient, NewContact, NewMailing};
use crate::db::{clients, mailings, users};
use crate::util::log_err;
use crate::web::pipeline::RequestContext;
use crate::web::session::{self, Sessions};
use crate::web::{redirect, Failure, Renderer};
use crate::worker::{Dispatcher, PING_TIMEOUT};
use crate::{Error, ErrorKind, DB};

type Handled = Result<Response, Rejection>;

fn json_status<T: Serialize>(value: &T, status: StatusCode) -> Response {
    reply::with_status(reply::json(value), status).into_response()
}

/// Answers client errors with a JSON body; anything else goes to the error pages.
fn api_error(err: Error) -> Handled {
    let status = match err.kind() {
        ErrorKind::InvalidData(_) => StatusCode::BAD_REQUEST,
        ErrorKind::MailingNotFound(_) => StatusCode::NOT_FOUND,
        ErrorKind::BrokerUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Diesel(diesel::result::Error::DatabaseError(
            diesel::result::DatabaseErrorKind::UniqueViolation,
            _,
        )) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        return Err(warp::reject::custom(Failure(err)));
    }
    Ok(json_status(&json!({ "error": err.to_string() }), status))
}

pub async fn healthz() -> Handled {
    Ok(reply::json(&json!({"status": "ok"})).into_response())
}

pub async fn healthz_worker(dispatcher: Dispatcher) -> Handled {
    match dispatcher.ping(PING_TIMEOUT).await {
        Ok(()) => Ok(reply::json(&json!({"status": "ok"})).into_response()),
        Err(err) => {
            log_err(&err);
            Ok(json_status(
                &json!({"status": "failed", "error": err.to_string()}),
                StatusCode::INTERNAL_SERVER_ERROR,
            ))
        }
    }
}

pub async fn login_form(ctx: RequestContext, render: Arc<Renderer>) -> Handled {
    if ctx.user.is_some() {
        return Ok(redirect("/"));
    }
    Ok(render.page(
        StatusCode::OK,
        "login.html",
        &context! { error: "", username: "" },
    ))
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    username: String,
    password: String,
}

pub async fn login_submit(
    _ctx: RequestContext,
    form: LoginForm,
    db: DB,
    sessions: Sessions,
    render: Arc<Renderer>,
) -> Handled {
    let username = form.username.clone();
    let result = db
        .run(move |conn| users::authenticate(conn, &form.username, &form.password))
        .await;
    match result {
        Ok(user) => {
            info!("Login succeeded: {}", user.username);
            let token = sessions.start(&user.username);
            Ok(reply::with_header(redirect("/"), "set-cookie", session::cookie(&token)).into_response())
        }
        Err(ref err) if matches!(err.kind(), ErrorKind::InvalidCredentials) => {
            warn!("Login failed: {}", username);
            Ok(render.page(
                StatusCode::OK,
                "login.html",
                &context! { error: "Invalid username or password.", username: username },
            ))
        }
        Err(err) => Err(warp::reject::custom(Failure(err))),
    }
}

pub async fn logout(_ctx: RequestContext, token: Option<String>, sessions: Sessions) -> Handled {
    if let Some(user) = token.and_then(|token| sessions.end(&token)) {
        info!("Logged out: {}", user);
    }
    Ok(reply::with_header(redirect("/"), "set-cookie", session::expired_cookie()).into_response())
}

/// A mailing with its derived descriptions, as shown in lists.
#[derive(Debug, Serialize)]
pub struct MailingSummary {
    #[serde(flatten)]
    mailing: Mailing,
    release_number: String,
    primary_component: &'static str,
    status_label: String,
}

impl From<Mailing> for MailingSummary {
    fn from(mailing: Mailing) -> MailingSummary {
        MailingSummary {
            release_number: mailing.release_number(),
            primary_component: mailing.primary_component(),
            status_label: mailing.status_label(),
            mailing,
        }
    }
}

pub async fn index(ctx: RequestContext, db: DB, render: Arc<Renderer>) -> Handled {
    let mailings = db
        .run(mailings::list_mailings)
        .await
        .map_err(|err| warp::reject::custom(Failure(err)))?
        .into_iter()
        .map(MailingSummary::from)
        .collect::<Vec<_>>();
    let base_url = ctx.base_url.map(|url| url.to_string()).unwrap_or_default();
    Ok(render.page(
        StatusCode::OK,
        "index.html",
        &context! { user: ctx.user, base_url: base_url, mailings: mailings },
    ))
}

pub async fn clients_list(_ctx: RequestContext, db: DB) -> Handled {
    match db.run(clients::list_clients).await {
        Ok(clients) => Ok(reply::json(&clients).into_response()),
        Err(err) => api_error(err),
    }
}

#[derive(Debug, Deserialize)]
pub struct ClientForm {
    #[serde(flatten)]
    client: NewClient,
    #[serde(default)]
    contacts: Vec<NewContact>,
}

#[derive(Debug, Serialize)]
struct CreatedClient {
    #[serde(flatten)]
    client: Client,
    contacts: Vec<Contact>,
}

pub async fn clients_create(_ctx: RequestContext, form: ClientForm, db: DB) -> Handled {
    let result = db
        .run(move |conn| {
            conn.transaction::<_, Error, _>(|conn| {
                let client = clients::create_client(conn, &form.client)?;
                let contacts = form
                    .contacts
                    .iter()
                    .map(|contact| {
                        clients::add_contact(
                            conn,
                            &NewContact {
                                client_id: client.id,
                                ..contact.clone()
                            },
                        )
                    })
                    .collect::<crate::Result<Vec<_>>>()?;
                Ok(CreatedClient { client, contacts })
            })
        })
        .await;
    match result {
        Ok(created) => {
            info!("Created client {}: {}", created.client.id, created.client.client_name);
            Ok(json_status(&created, StatusCode::CREATED))
        }
        Err(err) => api_error(err),
    }
}

pub async fn mailings_list(_ctx: RequestContext, db: DB) -> Handled {
    match db.run(mailings::list_mailings).await {
        Ok(list) => {
            let list = list.into_iter().map(MailingSummary::from).collect::<Vec<_>>();
            Ok(reply::json(&list).into_response())
        }
        Err(err) => api_error(err),
    }
}

#[derive(Debug, Deserialize)]
pub struct MailingForm {
    #[serde(flatten)]
    mailing: NewMailing,
    /// The addresses a test mailing goes to.
    #[serde(default)]
    test_emails: Vec<String>,
}

pub async fn mailings_create(_ctx: RequestContext, form: MailingForm, db: DB) -> Handled {
    let result = db
        .run(move |conn| {
            conn.transaction::<_, Error, _>(|conn| {
                let mailing = mailings::create_mailing(conn, &form.mailing)?;
                for email in &form.test_emails {
                    mailings::add_test_recipient(conn, mailing.id, email)?;
                }
                Ok(mailing)
            })
        })
        .await;
    match result {
        Ok(mailing) => {
            info!("Created mailing {} ({})", mailing.id, mailing.release_number());
            Ok(json_status(&MailingSummary::from(mailing), StatusCode::CREATED))
        }
        Err(err) => api_error(err),
    }
}

pub async fn mailing_detail(_ctx: RequestContext, id: i32, db: DB) -> Handled {
    let result = db
        .run(move |conn| {
            let mailing = mailings::get_mailing(conn, id)?;
            Ok(json!({
                "mailing": MailingSummary::from(mailing),
                "components": mailings::mailing_components(conn, id)?,
                "recipients": mailings::recipients(conn, id)?,
                "test_recipients": mailings::test_recipients(conn, id)?,
                "logs": mailings::logs(conn, id)?,
            }))
        })
        .await;
    match result {
        Ok(detail) => Ok(reply::json(&detail).into_response()),
        Err(err) => api_error(err),
    }
}

pub async fn mailing_send(
    _ctx: RequestContext,
    id: i32,
    db: DB,
    dispatcher: Dispatcher,
) -> Handled {
    let claimed = match db.run(move |conn| mailings::claim_for_sending(conn, id)).await {
        Ok(claimed) => claimed,
        Err(err) => return api_error(err),
    };
    if !claimed {
        return Ok(json_status(
            &json!({
                "status": "already_started",
                "message": format!("Mailing #{} has already been started or finished.", id),
            }),
            StatusCode::CONFLICT,
        ));
    }

    match dispatcher.enqueue(id) {
        Ok(()) => Ok(json_status(
            &json!({
                "status": "started",
                "message": format!("Mailing #{} has been started.", id),
            }),
            StatusCode::ACCEPTED,
        )),
        Err(err) => {
            log_err(&err);
            if let Err(err) = db.run(move |conn| mailings::release_claim(conn, id)).await {
                log_err(&err);
            }
            api_error(err)
        }
    }
}
