//! Operator CLI for the running deployment's storage (spec section 4.2
//! purge/diagnostics, section 4.4 job inspection, section 4.6 role
//! management), grounded on the teacher's `db_admin` tool: a `--db`-style
//! global flag per subcommand tree, with destructive operations gated
//! behind an explicit `--confirm`.

use anyhow::{anyhow, Result};
use clap::{Arg, ArgAction, Command};
use vire::config::Config;
use vire::models::Role;
use vire::store::Store;

fn role_from_str(s: &str) -> Result<Role> {
    match s {
        "user" => Ok(Role::User),
        "admin" => Ok(Role::Admin),
        "service" => Ok(Role::Service),
        "anonymous" => Ok(Role::Anonymous),
        other => Err(anyhow!("unknown role '{other}'; expected user, admin, service or anonymous")),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("vire-admin")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Operator tool for a running Vire deployment")
        .subcommand(Command::new("status").about("Show job queue and stock-index diagnostics"))
        .subcommand(
            Command::new("purge")
                .about("Delete derived market data, signals and filings, keeping user-authored records")
                .arg(Arg::new("confirm").long("confirm").action(ArgAction::SetTrue)),
        )
        .subcommand(
            Command::new("jobs")
                .about("Inspect the background job queue")
                .subcommand(Command::new("list").about("List pending jobs"))
                .subcommand(
                    Command::new("cancel")
                        .about("Cancel a job by id")
                        .arg(Arg::new("id").long("id").required(true)),
                ),
        )
        .subcommand(
            Command::new("users")
                .about("Inspect and manage user accounts")
                .subcommand(Command::new("list").about("List user accounts"))
                .subcommand(
                    Command::new("set-role")
                        .about("Change a user's role")
                        .arg(Arg::new("email").long("email").required(true))
                        .arg(Arg::new("role").long("role").required(true)),
                ),
        )
        .get_matches();

    let config = Config::from_env()?;
    let store = Store::connect(&config.market_storage, config.portfolio_storage.as_ref()).await?;

    match matches.subcommand() {
        Some(("status", _)) => {
            let pending = store.jobs.count_pending(None).await?;
            let tickers = store.stock_index.list().await?.len();
            println!("pending jobs: {pending}");
            println!("tracked tickers: {tickers}");
            println!("portfolio namespace configured: {}", store.has_portfolio_namespace());
        }

        Some(("purge", sub)) => {
            if !sub.get_flag("confirm") {
                println!("purge requires explicit confirmation:");
                println!("  vire-admin purge --confirm");
                return Ok(());
            }
            let counts = store.purge_derived_data().await?;
            for (kind, count) in counts {
                println!("{kind}: {count}");
            }
        }

        Some(("jobs", jobs_matches)) => match jobs_matches.subcommand() {
            Some(("list", _)) => {
                let pending = store.jobs.list_pending().await?;
                for job in pending {
                    println!("{} {} {} priority={}", job.id, job.job_type.as_str(), job.ticker, job.priority);
                }
            }
            Some(("cancel", sub)) => {
                let id: uuid::Uuid = sub.get_one::<String>("id").unwrap().parse()?;
                store.jobs.cancel(id).await?;
                println!("cancelled {id}");
            }
            _ => println!("available subcommands: list, cancel --id <uuid>"),
        },

        Some(("users", users_matches)) => {
            let (internal, _, _) = store.require_user_stores()?;
            match users_matches.subcommand() {
                Some(("list", _)) => {
                    for user in internal.list_users().await? {
                        println!("{} {} {:?}", user.user_id, user.email, user.role);
                    }
                }
                Some(("set-role", sub)) => {
                    let email = sub.get_one::<String>("email").unwrap();
                    let role = role_from_str(sub.get_one::<String>("role").unwrap())?;
                    let user = internal.get_by_email(email).await?;
                    internal.set_role(user.user_id, role).await?;
                    println!("{email} is now {role:?}");
                }
                _ => println!("available subcommands: list, set-role --email <email> --role <role>"),
            }
        }

        _ => {
            println!("available commands: status, purge --confirm, jobs <list|cancel>, users <list|set-role>");
        }
    }

    store.close().await?;
    Ok(())
}
