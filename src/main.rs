#[macro_use]
extern crate log;

use std::convert::Infallible;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;
use std::process::exit;
use std::sync::Arc;
use std::time::Duration;

use hyper::service::make_service_fn;
use releasemail::{
    config::Settings,
    db::{seed, users},
    mail::{attachments::AttachmentArea, notes::DirectoryNotes, sender::EmailRequest, Resources},
    mailing::runner,
    util::log_err,
    web::{self, session::Sessions},
    worker, ErrorKind, Mailer, Result, DB,
};
use structopt::StructOpt;
use url::Url;
use warp::Filter;

fn main() {
    dotenv::dotenv().ok();
    let options = Options::from_args();
    options.start_logger();

    if let Err(err) = run(options) {
        log_err(&err);
        eprintln!("{}", err);
        exit(1);
    }
}

fn run(options: Options) -> Result<()> {
    let settings = options.settings();
    let db = DB::connect_with_timeout(
        &options.database_url,
        Duration::from_secs(options.database_timeout),
    )?;

    match options.command {
        Command::Serve(ref serve) => serve.run(db, settings),
        Command::InitLanguages => {
            let created = seed::init_languages(&mut *db.get()?)?;
            println!("Languages initialized ({} created).", created);
            Ok(())
        }
        Command::InitServerRolesAndPlatforms => {
            let created = seed::init_server_roles_and_platforms(&mut *db.get()?)?;
            println!("Server roles and platforms initialized ({} created).", created);
            Ok(())
        }
        Command::InitServicePacks => {
            let created = seed::init_service_packs(&mut *db.get()?)?;
            println!("Service packs initialized ({} created).", created);
            Ok(())
        }
        Command::InitComponents => {
            let created = seed::init_components(&mut *db.get()?)?;
            println!("Components initialized ({} created).", created);
            Ok(())
        }
        Command::CreateUser {
            ref username,
            ref password,
        } => {
            let user = users::create_user(&mut *db.get()?, username, password)?;
            println!("User {} created.", user.username);
            Ok(())
        }
        Command::SendTestEmail(ref test) => test.run(&settings),
    }
}

#[derive(Debug, StructOpt)]
#[structopt(setting = structopt::clap::AppSettings::ColoredHelp)]
struct Options {
    /// Turns off message output.
    #[structopt(short = "q", long = "quiet")]
    quiet: bool,

    /// The most verbose level of messages to log.
    #[structopt(long = "log-level", env = "LOG_LEVEL", default_value = "info")]
    log_level: log::LevelFilter,

    /// The syslog server to send logs to.
    #[structopt(short = "s", long = "syslog-server", env = "SYSLOG_SERVER")]
    syslog_server: Option<String>,

    /// The path of the SQLite database.
    #[structopt(
        short = "d",
        long = "db",
        env = "DATABASE_URL",
        default_value = "releasemail.sqlite3"
    )]
    database_url: String,

    /// How long a request waits for a free database connection, in seconds.
    #[structopt(long = "db-timeout", env = "DATABASE_TIMEOUT", default_value = "10")]
    database_timeout: u64,

    /// The public URL of the site.
    #[structopt(
        short = "b",
        long = "base-url",
        env = "BASE_URL",
        default_value = "http://localhost:8137/"
    )]
    base_url: Url,

    /// Where unauthenticated users are sent.
    #[structopt(long = "login-url", env = "LOGIN_URL", default_value = "/auth/local-login/")]
    login_url: String,

    /// The application directory, where Main.config is looked for.
    #[structopt(long = "base-dir", env = "BASE_DIR", default_value = ".", parse(from_os_str))]
    base_dir: PathBuf,

    /// The email templates. Defaults to templates/mail under the base directory.
    #[structopt(long = "templates-dir", env = "TEMPLATES_DIR", parse(from_os_str))]
    templates_dir: Option<PathBuf>,

    /// The attachments working directory. Defaults to var/attachment under the base directory.
    #[structopt(long = "attachments-dir", env = "ATTACHMENTS_DIR", parse(from_os_str))]
    attachments_dir: Option<PathBuf>,

    /// The per-language documentation attached to mailings.
    #[structopt(long = "documentation-dir", env = "DOCUMENTATION_DIR", parse(from_os_str))]
    documentation_dir: Option<PathBuf>,

    /// The release notes, one file per component version and language.
    #[structopt(long = "release-notes-dir", env = "RELEASE_NOTES_DIR", parse(from_os_str))]
    release_notes_dir: Option<PathBuf>,

    /// The files served under /static/.
    #[structopt(long = "static-dir", env = "STATIC_DIR", parse(from_os_str))]
    static_dir: Option<PathBuf>,

    #[structopt(subcommand)]
    command: Command,
}

#[derive(Debug, StructOpt)]
enum Command {
    /// Serves the site and runs the mailing worker.
    Serve(ServeOptions),

    /// Creates the languages.
    InitLanguages,

    /// Creates the server roles and platforms.
    InitServerRolesAndPlatforms,

    /// Creates the service packs.
    InitServicePacks,

    /// Creates the release components.
    InitComponents,

    /// Creates a user for the local login.
    CreateUser {
        username: String,

        #[structopt(long = "password", env = "RELEASEMAIL_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Sends a release email to a list of test addresses.
    SendTestEmail(TestEmailOptions),
}

#[derive(Debug, StructOpt)]
struct ServeOptions {
    /// The host to serve on.
    #[structopt(long = "host", env = "SERVER_HOST", default_value = "0.0.0.0")]
    host: String,

    /// The port to serve on.
    #[structopt(short = "p", long = "port", env = "SERVER_PORT", default_value = "8137")]
    port: u16,

    /// The number of runtime worker threads.
    #[structopt(long = "workers", env = "SERVER_WORKERS", default_value = "1")]
    workers: usize,

    /// Whether to log every request.
    #[structopt(
        long = "access-log",
        env = "SERVER_ACCESS_LOG",
        default_value = "true",
        parse(try_from_str)
    )]
    access_log: bool,

    /// The TCP keep-alive interval, in seconds.
    #[structopt(long = "keep-alive", env = "SERVER_KEEP_ALIVE", default_value = "30")]
    keep_alive: u64,
}

#[derive(Debug, StructOpt)]
struct TestEmailOptions {
    /// The addresses to send to.
    #[structopt(required = true)]
    emails: Vec<String>,

    #[structopt(long = "mailing-type", default_value = "standard_mailing")]
    mailing_type: String,

    #[structopt(long = "language", default_value = "ru")]
    language: String,

    #[structopt(long = "release-type", default_value = "release3x")]
    release_type: String,

    #[structopt(long = "server-version", default_value = "")]
    server_version: String,

    #[structopt(long = "ipad-version", default_value = "")]
    ipad_version: String,

    #[structopt(long = "android-version", default_value = "")]
    android_version: String,
}

impl Options {
    /// Builds the settings from the options and Main.config.
    fn settings(&self) -> Settings {
        let mut settings = Settings::for_base_dir(self.base_dir.clone(), self.base_url.clone());
        settings.login_url = self.login_url.clone();
        let overrides = [
            (&self.templates_dir, &mut settings.templates_dir),
            (&self.attachments_dir, &mut settings.attachments_dir),
            (&self.documentation_dir, &mut settings.documentation_dir),
            (&self.release_notes_dir, &mut settings.release_notes_dir),
            (&self.static_dir, &mut settings.static_dir),
        ];
        for (option, dir) in overrides {
            if let Some(ref path) = *option {
                *dir = path.clone();
            }
        }
        settings
    }

    /// Sets up logging as specified by the `-q`, `-s`, and `--log-level` flags.
    fn start_logger(&self) {
        if self.quiet {
            return;
        }

        let r = if let Some(ref server) = self.syslog_server {
            syslog::init_tcp(
                server.as_str(),
                "releasemail".to_string(),
                syslog::Facility::LOG_DAEMON,
                self.log_level,
            )
        } else {
            syslog::init(
                syslog::Facility::LOG_DAEMON,
                self.log_level,
                Some("releasemail"),
            )
        };

        if let Err(err) = r {
            eprintln!("Warning: logging couldn't start: {}", err);
        }
    }
}

impl ServeOptions {
    /// Get the address to serve on.
    fn serve_addr(&self) -> Result<SocketAddr> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| ErrorKind::InvalidData("No matching address exists".to_string()).into())
    }

    fn run(&self, db: DB, settings: Settings) -> Result<()> {
        let addr = self.serve_addr()?;
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(self.workers.max(1))
            .enable_all()
            .build()?;
        runtime.block_on(self.serve(addr, db, Arc::new(settings)))
    }

    async fn serve(&self, addr: SocketAddr, db: DB, settings: Arc<Settings>) -> Result<()> {
        let (dispatcher, worker) = worker::spawn(db.clone(), settings.clone());

        let access_log = self.access_log;
        let routes = web::routes(db, settings, dispatcher, Sessions::default())?.with(
            warp::log::custom(move |info| {
                if access_log {
                    info!(
                        target: "releasemail::access",
                        "{} \"{} {}\" {} {:?}",
                        info.remote_addr()
                            .map(|addr| addr.to_string())
                            .unwrap_or_else(|| "-".to_string()),
                        info.method(),
                        info.path(),
                        info.status().as_u16(),
                        info.elapsed()
                    );
                }
            }),
        );

        let service = warp::service(routes);
        let make_service = make_service_fn(move |_| {
            let service = service.clone();
            async move { Ok::<_, Infallible>(service) }
        });
        let server = hyper::Server::try_bind(&addr)?
            .tcp_keepalive(Some(Duration::from_secs(self.keep_alive)))
            .serve(make_service)
            .with_graceful_shutdown(async {
                if let Err(err) = tokio::signal::ctrl_c().await {
                    log_err(&err);
                }
            });

        info!("Listening on http://{}", addr);
        server.await?;
        info!("Shutting down.");
        worker.abort();
        Ok(())
    }
}

impl TestEmailOptions {
    fn run(&self, settings: &Settings) -> Result<()> {
        let mailer = Mailer::connect(&settings.mail()?)?;
        let area = AttachmentArea::new(settings.attachments_dir.clone());
        let notes = DirectoryNotes::new(settings.release_notes_dir.clone());
        let res = Resources {
            settings,
            area: &area,
            notes: &notes,
        };
        runner::send_test_email(
            &mailer,
            &res,
            &self.emails,
            EmailRequest {
                mailing_type: self.mailing_type.clone(),
                release_type: self.release_type.clone(),
                server_version: self.server_version.clone(),
                ipad_version: self.ipad_version.clone(),
                android_version: self.android_version.clone(),
                language: self.language.clone(),
                ..EmailRequest::default()
            },
        )?;
        println!("Test email sent to {}.", self.emails.join(", "));
        Ok(())
    }
}
