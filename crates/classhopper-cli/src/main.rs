//! ClassHopper command-line client.
//!
//! Usage: classhopper [--log-level <level>] [--insecure-tls] <command>
//!
//! The app secret is read from `CLASSHOPPER_APP_SECRET` (or `--app-secret`);
//! every other setting has a production default and a `CLASSHOPPER_*`
//! override.

use anyhow::Context;
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use classhopper_api::{ApiClient, ApiError, ScheduleOutcome, SignInOutcome};
use classhopper_core::{Config, Paths};
use realtime_relay::{ConnectionEvent, ConnectionStatus, ConnectionSupervisor, Payload};
use session_storage::DeviceIdentity;
use std::process::ExitCode;
use std::sync::Arc;
use token_auth::{AuthError, TokenManager};
use tokio::sync::mpsc;
use tracing::{error, info};

/// ClassHopper: schedule lookup, sign-in and realtime channel.
#[derive(Parser, Debug)]
#[command(name = "classhopper")]
#[command(about = "Resilient client for the iClass schedule and sign-in service")]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Shared secret used to sign credential requests.
    #[arg(long, env = "CLASSHOPPER_APP_SECRET", hide_env_values = true)]
    app_secret: Option<String>,

    /// Skip TLS certificate validation (test servers only).
    #[arg(long)]
    insecure_tls: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print this installation's device id.
    DeviceId,
    /// Acquire a credential and print its expiry.
    Token,
    /// Log in and print the student profile.
    Login { student_id: String },
    /// List the courses scheduled for a day.
    Schedule {
        student_id: String,
        /// Day to query (YYYY-MM-DD); defaults to today.
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Sign in to one course, or to every unsigned course today.
    Sign {
        student_id: String,
        /// Course schedule id; omit to sign in to all of today's courses.
        #[arg(long)]
        course: Option<String>,
    },
    /// Open the realtime channel and print events until Ctrl-C.
    Watch,
}

impl Command {
    fn operation(&self) -> &'static str {
        match self {
            Command::DeviceId => "device-id",
            Command::Token => "token",
            Command::Login { .. } => "login",
            Command::Schedule { .. } => "schedule",
            Command::Sign { .. } => "sign",
            Command::Watch => "watch",
        }
    }
}

fn device_id() -> anyhow::Result<String> {
    let paths = Paths::new()?;
    Ok(DeviceIdentity::load_or_create_at(&paths))
}

/// Whether a failed command is worth simply running again.
fn is_transient(error: &anyhow::Error) -> bool {
    error.chain().any(|cause| {
        if let Some(auth) = cause.downcast_ref::<AuthError>() {
            return auth.is_transient();
        }
        matches!(cause.downcast_ref::<ApiError>(), Some(ApiError::Auth(auth)) if auth.is_transient())
    })
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = Config::from_env();
    if let Some(secret) = &args.app_secret {
        config.auth.app_secret = secret.clone();
    }
    if args.insecure_tls {
        config.insecure_tls = true;
    }
    config.validate()?;
    Ok(config)
}

fn api_client(config: &Config) -> anyhow::Result<ApiClient> {
    let tokens = Arc::new(TokenManager::from_config(config, device_id()?)?);
    Ok(ApiClient::new(config, tokens)?)
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = || load_config(&args);

    match &args.command {
        Command::DeviceId => println!("{}", device_id()?),
        Command::Token => {
            let config = config()?;
            let tokens = TokenManager::from_config(&config, device_id()?)?;
            let credential = tokens.get_valid_token().await?;
            println!("token expires at {}", credential.expires_at.to_rfc3339());
        }
        Command::Login { student_id } => {
            let config = config()?;
            let session = api_client(&config)?.login(student_id).await?;
            println!("{} ({})", session.real_name, session.academy_name);
            println!("user id:    {}", session.user_id);
            println!("session id: {}", session.session_id);
        }
        Command::Schedule { student_id, date } => {
            let config = config()?;
            let client = api_client(&config)?;
            let date = date.unwrap_or_else(|| Local::now().date_naive());
            let session = client.login(student_id).await?;

            match client.fetch_schedule(&session, date).await? {
                ScheduleOutcome::NoClasses => println!("no classes on {date}"),
                ScheduleOutcome::Courses(courses) => {
                    for course in courses {
                        let mark = if course.is_signed() { "signed" } else { "-" };
                        println!(
                            "{:<10} {} - {}  {}  @ {}  [{}]",
                            course.id,
                            course.class_begin_time,
                            course.class_end_time,
                            course.course_name,
                            course.classroom_name,
                            mark
                        );
                    }
                }
            }
        }
        Command::Sign {
            student_id,
            course: Some(course_id),
        } => {
            let config = config()?;
            let receipt = api_client(&config)?
                .sign_in_student(student_id, course_id)
                .await?;
            println!("signed in to {}", receipt.course_schedule_id);
        }
        Command::Sign {
            student_id,
            course: None,
        } => {
            let config = config()?;
            let client = api_client(&config)?;
            let session = client.login(student_id).await?;
            let today = Local::now().date_naive();

            let schedule = client.fetch_schedule(&session, today).await?;
            if schedule.courses().is_empty() {
                println!("no classes on {today}");
            }
            for course in schedule.courses() {
                let outcome = client
                    .sign_in_course(&session, course)
                    .await
                    .with_context(|| format!("course {}", course.course_name))?;
                match outcome {
                    SignInOutcome::AlreadySigned => {
                        println!("{}: already signed", course.course_name)
                    }
                    SignInOutcome::Signed(_) => println!("{}: signed in", course.course_name),
                }
            }
        }
        Command::Watch => watch(&config()?).await?,
    }

    Ok(())
}

async fn watch(config: &Config) -> anyhow::Result<()> {
    let tokens = TokenManager::from_config(config, device_id()?)?;
    let credential = tokens.get_valid_token().await?;

    let supervisor = ConnectionSupervisor::websocket(config.realtime.clone(), config.insecure_tls)?;
    let (tx, mut rx) = mpsc::unbounded_channel();
    supervisor.connect(credential.token, tx);
    println!("status: {}", ConnectionStatus::from(supervisor.state()));

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            event = rx.recv() => {
                let Some(event) = event else { break };
                print_event(&event);
                if let Some(status) = ConnectionStatus::from_event(&event) {
                    println!("status: {status}");
                }
            }
            _ = &mut ctrl_c => {
                info!("Received shutdown signal, closing realtime channel");
                break;
            }
        }
    }

    supervisor.close();
    Ok(())
}

fn print_event(event: &ConnectionEvent) {
    match event {
        ConnectionEvent::Opened => println!("opened"),
        ConnectionEvent::Message(Payload::Text(text)) => println!("<< {text}"),
        ConnectionEvent::Message(Payload::Binary(bytes)) => println!("<< [{} bytes]", bytes.len()),
        ConnectionEvent::Closing { code, reason } => println!("closing ({code}) {reason}"),
        ConnectionEvent::Closed { code, reason } => println!("closed ({code}) {reason}"),
        ConnectionEvent::Failed { error } => println!("failed: {error}"),
        ConnectionEvent::ReconnectScheduled { attempt, delay } => {
            println!("reconnect #{attempt} in {}ms", delay.as_millis())
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    classhopper_core::init_logging(&args.log_level);

    let operation = args.command.operation();
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(operation, error = %e, "Command failed");
            eprintln!("{operation} failed: {e:#}");
            if is_transient(&e) {
                eprintln!("the credential service looks temporarily unavailable, try again shortly");
            }
            ExitCode::FAILURE
        }
    }
}
