//! Binary that starts the upload server.

use anyhow::Context;
use clap::Parser;
use nbgrade_grader::Autograder;
use nbgrade_server::{config, listener, AppState, Config, Options};
use std::path::PathBuf;

#[derive(Parser)]
#[clap(name = env!("CARGO_PKG_NAME"), version, about)]
struct Args {
    /// The port to serve HTTP on. If 0, use the PORT environment variable,
    /// or 8000 if PORT is unset.
    #[clap(long, default_value_t = 0)]
    port: u16,
    /// Allow cross-origin requests. Necessary for uploads from the notebook
    /// front-end, but it also weakens XSRF protection; use with care.
    #[clap(long)]
    allow_cors: bool,
    /// Use OpenID Connect authentication provided by --openid-issuer.
    #[clap(long)]
    use_openid: bool,
    /// The OpenID Connect issuer;
    /// /.well-known/openid-configuration is requested for endpoint details.
    #[clap(long, default_value = "https://accounts.google.com")]
    openid_issuer: String,
    /// A text file with one authorized user email per line. Without it only
    /// authentication is performed, no authorization.
    #[clap(long)]
    allowed_users_file: Option<PathBuf>,
    /// The directory to write uploaded notebooks and reports to.
    #[clap(long, default_value = "uploads")]
    upload_dir: PathBuf,
    /// The spec of the queue to connect to.
    #[clap(long, default_value = "redis://localhost:6379/")]
    queue_spec: String,
    /// The queue to post work requests to.
    #[clap(long, default_value = "autograde")]
    autograde_queue: String,
    /// The queue to listen on for reports.
    #[clap(long, default_value = "report")]
    report_queue: String,
    /// The directory to serve static files from at /static.
    #[clap(long)]
    static_dir: Option<PathBuf>,
    /// Run the grading engine in-process instead of using the queue.
    #[clap(long)]
    grade_locally: bool,
    /// The root directory of autograder scripts. Used with --grade-locally.
    #[clap(long, default_value = "")]
    autograder_dir: PathBuf,
    /// The path to the sandbox binary. Used with --grade-locally.
    #[clap(long, default_value = "/usr/local/bin/nsjail")]
    sandbox_path: PathBuf,
    /// The path to the python binary. Used with --grade-locally.
    #[clap(long, default_value = "/usr/bin/python3")]
    python_path: PathBuf,
    /// The base directory for per-submission scratch directories.
    #[clap(long, default_value = "/tmp/autograde")]
    scratch_dir: PathBuf,
    /// Do not delete scratch directories after grading.
    #[clap(long)]
    disable_cleanup: bool,
    /// Wipe pre-existing scratch directories instead of failing.
    #[clap(long)]
    auto_remove: bool,
    /// Set the Secure attribute on session cookies (HTTPS deployments).
    #[clap(long)]
    secure_cookie: bool,
    /// Include raw runner logs in rendered reports.
    #[clap(long)]
    include_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();
    let config = Config::load(args.port);

    let oidc = if args.use_openid {
        let http = reqwest::Client::new();
        Some(config::discover_oidc(&http, &args.openid_issuer).await?)
    } else {
        None
    };
    let allowed_users = match &args.allowed_users_file {
        Some(path) => config::load_allowed_users(path)?,
        None => Default::default(),
    };

    let opts = Options {
        server_url: config.server_url.clone(),
        upload_dir: args.upload_dir.clone(),
        static_dir: args.static_dir.clone(),
        allow_cors: args.allow_cors,
        use_openid: args.use_openid,
        allowed_users,
        client_id: config.client_id.clone(),
        client_secret: config.client_secret.clone(),
        hash_salt: config.hash_salt.clone(),
        secure_cookie: args.secure_cookie,
        oidc,
        log_bucket: config.log_bucket.clone(),
    };

    let (grader, queue_sender) = if args.grade_locally {
        let mut grader = Autograder::new(
            &args.autograder_dir,
            &args.scratch_dir,
            &args.sandbox_path,
            &args.python_path,
        );
        grader.disable_cleanup = args.disable_cleanup;
        grader.auto_remove = args.auto_remove;
        grader.include_logs = args.include_logs;
        (Some(grader), None)
    } else {
        let sender =
            listener::spawn_queue_sender(args.queue_spec.clone(), args.autograde_queue.clone());
        listener::spawn_report_listener(
            args.queue_spec.clone(),
            args.report_queue.clone(),
            args.upload_dir.clone(),
        );
        (None, Some(sender))
    };

    std::fs::create_dir_all(&args.upload_dir)
        .with_context(|| format!("error creating upload dir {}", args.upload_dir.display()))?;
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&args.upload_dir, std::fs::Permissions::from_mode(0o700))
            .with_context(|| format!("error restricting {}", args.upload_dir.display()))?;
    }

    let cookie_key_material = format!("{}{}", config.cookie_auth_key, config.cookie_encrypt_key);
    let state = AppState::new(opts, &cookie_key_material, grader, queue_sender);
    let app = nbgrade_server::router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    log::info!("serving on {addr}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("error binding {addr}"))?;
    axum::serve(listener, app).await.context("server failed")?;
    Ok(())
}
