use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use snapgram::config::{Cli, Config};
use snapgram::local_store::{LocalStore, SqliteLocalStore};
use snapgram::models::{NewPost, NewUser, UploadFile, User};
use snapgram::remote::{AppwriteClient, Remote};
use snapgram::{Api, SessionStore};

#[derive(Parser, Debug)]
#[command(name = "snapgram", about = "Command-line client for the Snapgram social feed")]
struct Args {
    #[command(flatten)]
    cli: Cli,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an account and its profile
    SignUp {
        #[arg(long)]
        name: String,
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    SignIn {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    SignOut,
    /// Show the current session
    Whoami,
    /// One page of the feed
    Feed {
        /// Id of the last post of the previous page
        #[arg(long)]
        cursor: Option<String>,
    },
    Recent,
    Search {
        term: String,
    },
    #[command(subcommand)]
    Post(PostCommand),
    Save {
        #[arg(long)]
        post: String,
    },
    Unsave {
        saved_id: String,
    },
    Users {
        #[arg(long)]
        limit: Option<u32>,
    },
    User {
        id: String,
    },
}

#[derive(Subcommand, Debug)]
enum PostCommand {
    Show {
        id: String,
    },
    Create {
        #[arg(long)]
        caption: String,
        #[arg(long)]
        file: PathBuf,
        #[arg(long)]
        location: Option<String>,
        /// Comma-separated tags
        #[arg(long)]
        tags: Option<String>,
    },
    Delete {
        id: String,
        image_id: String,
    },
    /// Like the post, or unlike it if already liked
    Like {
        id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout stays machine-readable
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let data_dir = Config::data_dir(&args.cli);
    std::fs::create_dir_all(&data_dir)?;
    tracing::debug!("Data directory: {}", data_dir.display());

    let config = Config::load(&args.cli)?;
    if config.remote.project_id.is_empty() {
        anyhow::bail!("No project id configured: pass --project or set remote.project_id");
    }

    let local: Arc<dyn LocalStore> = Arc::new(SqliteLocalStore::open(config.local_path())?);
    let client = AppwriteClient::new(
        &config.remote.endpoint,
        &config.remote.project_id,
        config.remote.timeout(),
    )?
    .with_local_store(local.clone());

    let api = Api::new(
        Remote::from_backend(Arc::new(client)),
        config.collections.clone(),
    );
    let session = SessionStore::new(api.clone(), local);

    tracing::debug!("Initial landing: {:?}", session.initial_landing());
    let landing = session.bootstrap().await;
    tracing::debug!("Landing: {:?}", landing);

    run(args.command, &api, &session).await
}

async fn run(command: Command, api: &Api, session: &SessionStore) -> anyhow::Result<()> {
    match command {
        Command::SignUp {
            name,
            username,
            email,
            password,
        } => {
            let user = api
                .create_user_account(NewUser {
                    name,
                    username,
                    email: email.clone(),
                    password: password.clone(),
                })
                .await?;
            session.sign_in(&email, &password).await?;
            print(&user)
        }
        Command::SignIn { email, password } => {
            session.sign_in(&email, &password).await?;
            print(&session.snapshot())
        }
        Command::SignOut => {
            session.sign_out().await?;
            print(&session.snapshot())
        }
        Command::Whoami => print(&session.snapshot()),
        Command::Feed { cursor } => print(&api.get_infinite_posts(cursor.as_deref()).await?),
        Command::Recent => print(&api.get_recent_posts().await?),
        Command::Search { term } => print(&api.search_posts(&term).await?),
        Command::Post(command) => run_post(command, api, session).await,
        Command::Save { post } => {
            let user = signed_in_user(session)?;
            print(&api.save_post(&user.id, &post).await?)
        }
        Command::Unsave { saved_id } => print(&api.delete_saved_post(&saved_id).await?),
        Command::Users { limit } => print(&api.get_users(limit).await?),
        Command::User { id } => print(&api.get_user_by_id(&id).await?),
    }
}

async fn run_post(command: PostCommand, api: &Api, session: &SessionStore) -> anyhow::Result<()> {
    match command {
        PostCommand::Show { id } => print(&api.get_post_by_id(Some(id.as_str())).await?),
        PostCommand::Create {
            caption,
            file,
            location,
            tags,
        } => {
            let user = signed_in_user(session)?;
            let file = UploadFile::from_path(&file).await?;
            let post = api
                .create_post(NewPost {
                    user_id: user.id,
                    caption,
                    file: vec![file],
                    location,
                    tags,
                })
                .await?;
            print(&post)
        }
        PostCommand::Delete { id, image_id } => {
            print(&api.delete_post(Some(id.as_str()), Some(image_id.as_str())).await?)
        }
        PostCommand::Like { id } => {
            let user = signed_in_user(session)?;
            let post = api.get_post_by_id(Some(id.as_str())).await?;

            let mut likes = post.likes;
            if let Some(pos) = likes.iter().position(|liker| liker == &user.id) {
                likes.remove(pos);
            } else {
                likes.push(user.id);
            }
            print(&api.like_post(&id, &likes).await?)
        }
    }
}

fn signed_in_user(session: &SessionStore) -> anyhow::Result<User> {
    let state = session.snapshot();
    if !state.is_authenticated() {
        anyhow::bail!("Not signed in: run `snapgram sign-in` first");
    }
    Ok(state.user)
}

fn print<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
