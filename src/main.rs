//! StockFellow CLI: run group and user commands against the event log and
//! inspect the projected read models.

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use tracing::info;

use stockfellow_events::commands::{
    CreateGroupRequest, GroupCommands, JoinAction, ProcessJoinRequest, RegisterUserRequest,
    SyncUserRequest, UpdateGroupRequest, UserCommands,
};
use stockfellow_events::projections::rejection_count;
use stockfellow_events::{
    database, Config, Event, EventLog, IdFields, SqliteEventLog, SqliteSnapshotStore,
};

#[derive(Parser)]
#[command(name = "stockfellow")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Database URL, overrides DATABASE_URL
    #[arg(long, global = true)]
    database_url: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Group commands and queries
    #[command(subcommand)]
    Group(GroupCommand),

    /// User commands and queries
    #[command(subcommand)]
    User(UserCommand),

    /// Recompute a snapshot from its events
    #[command(subcommand)]
    Rebuild(RebuildCommand),

    /// Dump the raw events of an aggregate
    Events {
        id: String,

        /// Payload field holding the id (repeatable)
        #[arg(long = "field", default_values = ["groupId", "userId"])]
        fields: Vec<String>,
    },
}

#[derive(Subcommand)]
enum GroupCommand {
    /// Create a group with the admin as its first member
    Create {
        #[arg(long)]
        id: Option<String>,
        #[arg(long)]
        admin: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        min_contribution: f64,
        #[arg(long)]
        max_members: u32,
        #[arg(long, default_value = "Public")]
        visibility: String,
        #[arg(long, default_value = "Monthly")]
        contribution_frequency: String,
        #[arg(long, default_value = "Monthly")]
        payout_frequency: String,
        #[arg(long)]
        contribution_date: Option<String>,
        #[arg(long)]
        payout_date: Option<String>,
        #[arg(long)]
        description: Option<String>,
        /// Founding member (repeatable)
        #[arg(long = "member")]
        members: Vec<String>,
    },

    /// Add a member directly
    Join {
        group_id: String,
        user_id: String,
        #[arg(long)]
        username: Option<String>,
    },

    /// Change group settings
    Update {
        group_id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        max_members: Option<u32>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        visibility: Option<String>,
        #[arg(long)]
        contribution_frequency: Option<String>,
        #[arg(long)]
        payout_frequency: Option<String>,
        #[arg(long)]
        contribution_date: Option<String>,
        #[arg(long)]
        payout_date: Option<String>,
    },

    /// Ask to join a public group
    Request {
        group_id: String,
        user_id: String,
        #[arg(long)]
        username: Option<String>,
    },

    /// Accept or reject a pending join request
    Process {
        group_id: String,
        request_id: String,
        /// accept or reject
        action: String,
        #[arg(long)]
        admin: String,
        #[arg(long)]
        reason: Option<String>,
    },

    Show { group_id: String },

    List,

    /// Groups a user belongs to or administers
    ForUser { user_id: String },

    /// How often a user was rejected by a group
    Rejections { group_id: String, user_id: String },
}

#[derive(Subcommand)]
enum UserCommand {
    Register {
        user_id: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        sa_id: String,
        #[arg(long)]
        mobile: Option<String>,
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        first_name: Option<String>,
        #[arg(long)]
        last_name: Option<String>,
    },

    /// Apply an identity-provider profile sync
    Sync {
        user_id: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        first_name: Option<String>,
        #[arg(long)]
        last_name: Option<String>,
        #[arg(long)]
        email_verified: bool,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        id_number: Option<String>,
    },

    Show { user_id: String },

    List,
}

#[derive(Subcommand)]
enum RebuildCommand {
    Group { id: String },
    User { id: String },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "stockfellow_events=debug,stockfellow=info".into());
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.json);

    let mut config = Config::from_env()?;
    if let Some(url) = cli.database_url {
        config.database_url = url;
    }
    let pool = database::new_pool(&config).await?;
    let events = SqliteEventLog::new(pool.clone());
    let store = SqliteSnapshotStore::new(pool);

    match cli.command {
        Commands::Group(cmd) => run_group(cmd, GroupCommands::new(events, store)).await?,
        Commands::User(cmd) => run_user(cmd, UserCommands::new(events, store)).await?,
        Commands::Rebuild(RebuildCommand::Group { id }) => {
            let groups = GroupCommands::new(events, store);
            groups.read_model().rebuild_state(&id).await?;
            print_json(&groups.read_model().get_by_aggregate_id(&id).await?)?;
        }
        Commands::Rebuild(RebuildCommand::User { id }) => {
            let users = UserCommands::new(events, store);
            users.read_model().rebuild_state(&id).await?;
            print_json(&users.read_model().get_by_aggregate_id(&id).await?)?;
        }
        Commands::Events { id, fields } => {
            let history = events.get_events(&IdFields::any(fields), &id).await?;
            info!(id = %id, count = history.len(), "Loaded events");
            print_json(&history)?;
        }
    }

    Ok(())
}

async fn run_group(
    cmd: GroupCommand,
    groups: GroupCommands<SqliteEventLog, SqliteSnapshotStore>,
) -> Result<()> {
    let appended: Event = match cmd {
        GroupCommand::Create {
            id,
            admin,
            name,
            min_contribution,
            max_members,
            visibility,
            contribution_frequency,
            payout_frequency,
            contribution_date,
            payout_date,
            description,
            members,
        } => {
            groups
                .create_group(CreateGroupRequest {
                    group_id: id,
                    admin_id: admin,
                    name,
                    min_contribution,
                    max_members,
                    description,
                    profile_image: None,
                    visibility,
                    contribution_frequency,
                    contribution_date,
                    payout_frequency,
                    payout_date,
                    member_ids: members,
                })
                .await?
        }
        GroupCommand::Join {
            group_id,
            user_id,
            username,
        } => groups.join_group(&group_id, &user_id, username).await?,
        GroupCommand::Update {
            group_id,
            name,
            max_members,
            description,
            visibility,
            contribution_frequency,
            payout_frequency,
            contribution_date,
            payout_date,
        } => {
            groups
                .update_group(UpdateGroupRequest {
                    group_id,
                    name,
                    max_members,
                    description,
                    profile_image: None,
                    visibility,
                    contribution_frequency,
                    contribution_date,
                    payout_frequency,
                    payout_date,
                })
                .await?
        }
        GroupCommand::Request {
            group_id,
            user_id,
            username,
        } => groups.request_to_join(&group_id, &user_id, username).await?,
        GroupCommand::Process {
            group_id,
            request_id,
            action,
            admin,
            reason,
        } => {
            groups
                .process_join_request(ProcessJoinRequest {
                    group_id,
                    request_id,
                    action: JoinAction::parse(&action)?,
                    admin_id: admin,
                    reason,
                })
                .await?
        }
        GroupCommand::Show { group_id } => {
            return print_json(&groups.read_model().get_by_aggregate_id(&group_id).await?);
        }
        GroupCommand::List => return print_json(&groups.read_model().get_all().await?),
        GroupCommand::ForUser { user_id } => {
            return print_json(&groups.read_model().get_by_member_or_owner(&user_id).await?);
        }
        GroupCommand::Rejections { group_id, user_id } => {
            let count = rejection_count(groups.read_model().event_log(), &group_id, &user_id).await?;
            return print_json(&json!({ "groupId": group_id, "userId": user_id, "rejections": count }));
        }
    };

    let group_id = appended.data["groupId"].as_str().unwrap_or_default().to_string();
    let group = groups.read_model().get_by_aggregate_id(&group_id).await?;
    print_json(&json!({ "event": appended, "group": group }))
}

async fn run_user(
    cmd: UserCommand,
    users: UserCommands<SqliteEventLog, SqliteSnapshotStore>,
) -> Result<()> {
    let appended: Event = match cmd {
        UserCommand::Register {
            user_id,
            name,
            email,
            sa_id,
            mobile,
            username,
            first_name,
            last_name,
        } => {
            users
                .register_user(RegisterUserRequest {
                    user_id,
                    name,
                    email,
                    sa_id,
                    mobile_number: mobile,
                    username,
                    first_name,
                    last_name,
                })
                .await?
        }
        UserCommand::Sync {
            user_id,
            email,
            username,
            first_name,
            last_name,
            email_verified,
            phone,
            id_number,
        } => {
            users
                .sync_user(SyncUserRequest {
                    user_id,
                    email,
                    username,
                    first_name,
                    last_name,
                    email_verified: email_verified.then_some(true),
                    phone_number: phone,
                    id_number,
                })
                .await?
        }
        UserCommand::Show { user_id } => {
            return print_json(&users.read_model().get_by_aggregate_id(&user_id).await?);
        }
        UserCommand::List => return print_json(&users.read_model().get_all().await?),
    };

    let user_id = appended.data["userId"].as_str().unwrap_or_default().to_string();
    let user = users.read_model().get_by_aggregate_id(&user_id).await?;
    print_json(&json!({ "event": appended, "user": user }))
}
