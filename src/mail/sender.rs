//! Composing and sending the release emails.

use std::fmt::Display;
use std::fs;
use std::io::{Error as IoError, ErrorKind as IoErrorKind};
use std::path::{Path, PathBuf};

use lettre::message::{header::ContentType, Attachment, Mailbox, MultiPart, SinglePart};
use lettre::{Message, Transport};
use pulldown_cmark::{html, Options, Parser};
use serde::Serialize;
use serde_json::Value;
use tera::{Context, Tera};
use uuid::Uuid;

use crate::mail::notes::ReleaseNotes;
use crate::mail::Resources;
use crate::mailer::Mailer;
use crate::mailing::journal::{log_updates, EventLog};
use crate::mailing::types::{Component, LogLevel, MailingType, ReleaseType};
use crate::util::{join_addresses, list_files};
use crate::{ErrorKind, Result};

/// What to send, and to whom.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmailRequest {
    pub emails: Vec<String>,
    pub mailing_type: String,
    pub release_type: String,
    pub server_version: String,
    pub ipad_version: String,
    pub android_version: String,
    pub language: String,
}

impl Default for EmailRequest {
    fn default() -> EmailRequest {
        EmailRequest {
            emails: Vec::new(),
            mailing_type: MailingType::StandardMailing.as_str().to_string(),
            release_type: ReleaseType::Release3x.as_str().to_string(),
            server_version: String::new(),
            ipad_version: String::new(),
            android_version: String::new(),
            language: "ru".to_string(),
        }
    }
}

/// Either a single release note or a list of them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Updates {
    One(String),
    Many(Vec<String>),
}

/// A titled group of 3.x server release notes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Section {
    pub title: Option<String>,
    pub updates: Updates,
}

/// Groups 3.x server release notes into numbered sections.
///
/// Notes containing `BoardMaps Core:` or `Модуль` start a new section; the others belong to the
/// current one. A lone section loses its number, and if it holds a single note, that note is
/// kept as a plain string.
pub fn structure_updates_3x<S: AsRef<str>>(updates: &[S]) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut title: Option<String> = None;
    let mut current: Vec<String> = Vec::new();
    let mut number = 1;

    for update in updates {
        let update = update.as_ref();
        let heading = if update.contains("BoardMaps Core:") {
            Some("BoardMaps Core:".to_string())
        } else if update.contains("Модуль") {
            Some(format!("{}:", update.split(':').next().unwrap_or(update)))
        } else {
            None
        };

        match heading {
            Some(heading) => {
                if !current.is_empty() {
                    sections.push(Section {
                        title: title.take(),
                        updates: Updates::Many(current),
                    });
                    current = Vec::new();
                }
                title = Some(format!("{}. {}", number, heading));
                number += 1;
            }
            None => current.push(update.to_string()),
        }
    }
    if !current.is_empty() {
        sections.push(Section {
            title,
            updates: Updates::Many(current),
        });
    }

    if sections.len() == 1 {
        let section = &mut sections[0];
        if let Some(ref mut title) = section.title {
            if title.starts_with("1. ") {
                title.replace_range(..3, "");
            }
        }
        let only = match section.updates {
            Updates::Many(ref mut list) if list.len() == 1 => list.pop(),
            _ => None,
        };
        if let Some(only) = only {
            section.updates = Updates::One(only);
        }
    }
    sections
}

/// A single note stands alone; several make a list.
fn collapse(notes: Vec<String>) -> Updates {
    if notes.len() == 1 {
        Updates::One(notes.into_iter().next().unwrap_or_default())
    } else {
        Updates::Many(notes)
    }
}

/// The name release notes are logged under for a language.
fn language_name(language: &str) -> &'static str {
    match language {
        "en" => "Английский",
        _ => "Русский",
    }
}

fn markdown_to_html(source: &str) -> String {
    let parser = Parser::new_ext(source, Options::ENABLE_TABLES);
    let mut out = String::new();
    html::push_html(&mut out, parser);
    out
}

fn content_type(path: &Path) -> Result<ContentType> {
    let mime = match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        Some("pdf") => "application/pdf",
        _ => "application/octet-stream",
    };
    ContentType::parse(mime).map_err(|e| ErrorKind::Mail(e.to_string()).into())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Composes and sends one release email.
#[derive(Clone, Debug)]
pub struct EmailSender {
    request: EmailRequest,
}

impl EmailSender {
    pub fn new(request: EmailRequest) -> EmailSender {
        EmailSender { request }
    }

    /// The subject, naming the first version given.
    pub fn subject(&self) -> Result<String> {
        let r = &self.request;
        let version = [&r.server_version, &r.android_version, &r.ipad_version]
            .iter()
            .find(|v| !v.is_empty())
            .map(|v| v.to_string())
            .ok_or_else(|| ErrorKind::InvalidData("No version given for the subject".to_string()))?;
        Ok(match r.language.as_str() {
            "en" => format!("BoardMaps Update {}", version),
            _ => format!("Обновление BoardMaps {}", version),
        })
    }

    /// The name of the template for the mailing and release type, without extension.
    pub fn template_name(&self) -> Result<String> {
        let r = &self.request;
        let kind = r.mailing_type.parse::<MailingType>().ok();
        let release = r.release_type.parse::<ReleaseType>().ok();
        let base = match (kind, release) {
            (Some(MailingType::StandardMailing), Some(ReleaseType::Release2x)) => "index_2x",
            (Some(MailingType::StandardMailing), Some(ReleaseType::Release3x)) => "index_3x",
            (Some(MailingType::Hotfix), Some(ReleaseType::Release2x)) => "index_2x_hotfix_server",
            (Some(MailingType::Hotfix), Some(ReleaseType::Release3x)) => "index_3x_hotfix_server",
            (Some(MailingType::Hotfix), Some(ReleaseType::ReleaseAndroid2x)) => {
                "index_2x_hotfix_android"
            }
            (Some(MailingType::Hotfix), Some(ReleaseType::ReleaseAndroid3x)) => {
                "index_3x_hotfix_android"
            }
            (Some(MailingType::Hotfix), Some(ReleaseType::ReleaseIpad2x)) => "index_2x_hotfix_ipad",
            (Some(MailingType::Hotfix), Some(ReleaseType::ReleaseIpad3x)) => "index_3x_hotfix_ipad",
            (Some(MailingType::Hotfix), Some(ReleaseType::ReleaseModule)) => "index_module_hotfix",
            (Some(MailingType::Hotfix), Some(ReleaseType::ReleaseIntegration)) => {
                "index_integration_hotfix"
            }
            _ => {
                return Err(ErrorKind::TemplateNotFound {
                    mailing_type: r.mailing_type.clone(),
                    release_type: r.release_type.clone(),
                    language: r.language.clone(),
                }
                .into())
            }
        };
        Ok(format!("{}_{}", base, r.language))
    }

    /// Fetches the release notes the template shows, logging each list.
    pub fn prepare_context(
        &self,
        notes: &dyn ReleaseNotes,
        log: &mut dyn EventLog,
    ) -> Result<Context> {
        let r = &self.request;
        let lang = language_name(&r.language);
        let release = r.release_type.parse::<ReleaseType>().ok();
        let platform = release.and_then(ReleaseType::platform);

        let (server, ipad, android) = match r.mailing_type.parse::<MailingType>().ok() {
            Some(MailingType::StandardMailing) => (
                !r.server_version.is_empty(),
                !r.ipad_version.is_empty(),
                !r.android_version.is_empty(),
            ),
            Some(MailingType::Hotfix) => (
                platform == Some(Component::Server) && !r.server_version.is_empty(),
                platform == Some(Component::Ipad) && !r.ipad_version.is_empty(),
                platform == Some(Component::Android) && !r.android_version.is_empty(),
            ),
            None => (false, false, false),
        };

        let mut server_updates = Value::Null;
        if server {
            let list = notes.notes(Component::Server, &r.server_version, &r.language)?;
            log_updates(log, "Server updates", &list, lang);
            server_updates = if release == Some(ReleaseType::Release3x) {
                let mut sections = structure_updates_3x(&list);
                match sections.pop() {
                    Some(Section {
                        updates: Updates::One(only),
                        ..
                    }) if sections.is_empty() => Value::String(only),
                    Some(last) => {
                        sections.push(last);
                        serde_json::to_value(&sections)?
                    }
                    None => serde_json::to_value(&sections)?,
                }
            } else {
                serde_json::to_value(collapse(list))?
            };
        }

        let mut ipad_updates = Value::Null;
        if ipad {
            let list = notes.notes(Component::Ipad, &r.ipad_version, &r.language)?;
            log_updates(log, "iPad updates", &list, lang);
            ipad_updates = serde_json::to_value(collapse(list))?;
        }

        let mut android_updates = Value::Null;
        if android {
            let list = notes.notes(Component::Android, &r.android_version, &r.language)?;
            log_updates(log, "Android updates", &list, lang);
            android_updates = serde_json::to_value(collapse(list))?;
        }

        Ok(context! {
            number_version: r.server_version,
            ipad_version: r.ipad_version,
            android_version: r.android_version,
            server_updates: server_updates,
            ipad_updates: ipad_updates,
            android_updates: android_updates,
        })
    }

    /// Renders a template from the templates directory, `<name>.html` or `<name>.md`, and marks
    /// the result with a hidden unique ID.
    pub fn render_html(&self, templates_dir: &Path, name: &str, context: &Context) -> Result<String> {
        let html_path = templates_dir.join(format!("{}.html", name));
        let md_path = templates_dir.join(format!("{}.md", name));
        let source = if html_path.is_file() {
            fs::read_to_string(&html_path)?
        } else if md_path.is_file() {
            markdown_to_html(&fs::read_to_string(&md_path)?)
        } else {
            return Err(IoError::new(
                IoErrorKind::NotFound,
                format!("Template file {} not found", html_path.display()),
            )
            .into());
        };

        let template = format!("{}.html", name);
        let mut tera = Tera::default();
        tera.add_raw_template(&template, &source)?;
        let mut html = tera.render(&template, context)?;

        let mail_id = Uuid::new_v4();
        html.push_str(&format!("\n<!-- Mail ID: {} -->", mail_id));
        html.push_str(&format!(
            "\n<p style=\"display:none;\">Mail ID: {}</p>\n",
            mail_id
        ));
        Ok(html)
    }

    /// Builds the message: the HTML body with the images it refers to, then the attachments.
    pub fn compose(
        &self,
        from: &Mailbox,
        html: String,
        images_dir: &Path,
        attachments: &[PathBuf],
    ) -> Result<Message> {
        let mut builder = Message::builder()
            .from(from.clone())
            .subject(self.subject()?)
            .message_id(None);
        for email in &self.request.emails {
            builder = builder.to(email.parse()?);
        }

        let mut related = MultiPart::related().singlepart(SinglePart::html(html));
        for image in list_files(images_dir)? {
            let name = file_name(&image);
            let body = fs::read(&image)?;
            related = related.singlepart(Attachment::new_inline(name).body(body, content_type(&image)?));
        }

        let mut mixed = MultiPart::mixed().multipart(related);
        for file in attachments {
            let body = fs::read(file)?;
            mixed = mixed.singlepart(Attachment::new(file_name(file)).body(body, content_type(file)?));
        }

        Ok(builder.multipart(mixed)?)
    }

    /// Renders, composes and sends the email, staging the documentation for its language as
    /// attachments. A single attempt is made.
    pub fn send_email<T>(
        &self,
        mailer: &Mailer<T>,
        res: &Resources,
        log: &mut dyn EventLog,
    ) -> Result<()>
    where
        T: Transport,
        T::Error: Display,
    {
        let template = self.template_name()?;
        let context = self.prepare_context(res.notes, log)?;
        let html = self.render_html(&res.settings.templates_dir, &template, &context)?;

        let language = &self.request.language;
        let message = {
            let staging = res.area.lock();
            staging.clear();
            staging.stage(language, &res.settings.documentation_dir)?;
            let files = staging.files(language)?;
            if files.is_empty() {
                log.record(
                    LogLevel::Warning,
                    &format!("No documentation to attach for {}", language.to_uppercase()),
                );
            }
            self.compose(mailer.from(), html, &res.settings.images_dir(), &files)?
        };

        mailer.send(&message)?;
        log.info(&format!(
            "Email sent to {}",
            join_addresses(&self.request.emails)
        ));
        Ok(())
    }
}
