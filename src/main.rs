/* This file is part of sprout
 *
 * Copyright (C) 2023-2026 Sprout developers
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as
 * published by the Free Software Foundation, either version 3 of the
 * License, or (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

use std::{fs, process::exit, str::FromStr, sync::Arc, time::Duration};

use easy_parallel::Parallel;
use log::{error, LevelFilter};
use num_bigint::BigUint;
use prettytable::{format, row, Table};
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};
use structopt_toml::{serde::Deserialize, structopt::StructOpt, StructOptToml};
use url::Url;

use sprout::{
    address::Address,
    chain::ConfirmSettings,
    error::Error,
    lifecycle::Outcome,
    util::{decode_base10, get_config_path, spawn_config, timestamp_to_date, unix_timestamp},
    validate::{ScheduleForm, StakeForm, WhitelistForm},
    view,
    wallet::Account,
    ClientSettings, Result, Sprout,
};

const CONFIG_FILE: &str = "sprout_config.toml";
const CONFIG_FILE_CONTENTS: &str = include_str!("../sprout_config.toml");

#[derive(Clone, Debug, Deserialize, StructOpt, StructOptToml)]
#[serde(default)]
#[structopt(name = "sprout", about = "Command-line client for the Sprout contracts")]
struct Args {
    #[structopt(short, long)]
    /// Configuration file to use
    config: Option<String>,

    #[structopt(short, long, default_value = "tcp://127.0.0.1:8370")]
    /// Chain node JSON-RPC endpoint
    endpoint: Url,

    #[structopt(long)]
    /// Embedded signer daemon JSON-RPC endpoint
    embedded_signer: Option<Url>,

    #[structopt(long)]
    /// Injected wallet daemon JSON-RPC endpoint
    injected_signer: Option<Url>,

    #[structopt(long, default_value = "")]
    /// Vesting contract address
    vesting_contract: String,

    #[structopt(long, default_value = "")]
    /// Yield-farm contract address
    farm_contract: String,

    #[structopt(long, default_value = "~/.local/share/sprout/wallet.db")]
    /// Path to wallet database
    wallet_path: String,

    #[structopt(long, default_value = "30")]
    /// Seconds to wait for a single RPC reply
    rpc_timeout: u64,

    #[structopt(long, default_value = "2")]
    /// Seconds between two transaction status polls
    confirm_poll: u64,

    #[structopt(long, default_value = "120")]
    /// Total seconds to wait for a transaction confirmation
    confirm_timeout: u64,

    #[structopt(long, default_value = "60")]
    /// Seconds between two refreshes of live pool views
    pool_refresh_interval: u64,

    #[structopt(long)]
    /// Block-explorer base URL for linking transaction hashes
    explorer_url: Option<String>,

    #[structopt(short, parse(from_occurrences))]
    /// Increase verbosity (-vvv supported)
    verbose: u8,

    #[structopt(subcommand)]
    /// Sub command to execute
    command: Subcmd,
}

#[derive(Clone, Debug, Deserialize, StructOpt)]
enum Subcmd {
    /// Send a ping request to the chain node
    Ping,

    /// Wallet operations
    Wallet(WalletSubcmd),

    /// Vesting contract operations
    Vesting(VestingSubcmd),

    /// Yield-farm contract operations
    Farm(FarmSubcmd),

    /// Show the local transactions history
    History,
}

#[derive(Clone, Debug, Deserialize, StructOpt)]
enum WalletSubcmd {
    /// Show the resolved account and signer
    Status,

    /// Unlock the embedded signer daemon
    Unlock {
        /// Signer passphrase
        passphrase: String,
    },

    /// Forget the cached embedded signer address
    Disconnect,
}

#[derive(Clone, Debug, Deserialize, StructOpt)]
enum VestingSubcmd {
    /// Show a beneficiary's vesting schedule
    Status {
        /// Beneficiary address (default is the resolved account)
        beneficiary: Option<String>,
    },

    /// Create a vesting schedule (owner only)
    Create {
        /// Beneficiary address
        beneficiary: String,

        /// Token to lock
        token: String,

        /// Amount of tokens to lock
        amount: String,

        /// UNIX timestamp the schedule starts at
        start: u64,

        /// UNIX timestamp the cliff lifts at
        cliff: u64,

        /// UNIX timestamp the schedule fully vests at
        end: u64,
    },

    /// Add a beneficiary to the whitelist (owner only)
    WhitelistAdd {
        /// Address to whitelist
        address: String,
    },

    /// Remove a beneficiary from the whitelist (owner only)
    WhitelistRemove {
        /// Address to remove
        address: String,
    },

    /// Toggle a token's whitelist membership (owner only)
    TokenToggle {
        /// Token address
        token: String,
    },
}

#[derive(Clone, Debug, Deserialize, StructOpt)]
enum FarmSubcmd {
    /// Show the pool state and your position
    View,

    /// Continuously refresh the pool view
    Watch,

    /// Stake LP tokens
    Stake {
        /// Amount of LP tokens to stake
        amount: String,
    },

    /// Withdraw staked LP tokens
    Withdraw {
        /// Amount of LP tokens to withdraw
        amount: String,
    },

    /// Claim accrued rewards
    Claim,

    /// Withdraw everything immediately, forfeiting rewards
    EmergencyWithdraw,

    /// Change the pool reward rate (owner only)
    SetRewardRate {
        /// New reward rate, raw tokens per second
        rate: String,
    },
}

/// Parse a contract address argument, treating an empty string as "not
/// configured".
fn parse_contract(input: &str) -> Result<Address> {
    if input.trim().is_empty() {
        return Ok(Address::ZERO)
    }
    Address::from_str(input.trim())
}

fn require_contract(addr: Address, name: &str) -> Result<Address> {
    if addr.is_zero() {
        return Err(Error::ValidationFailed(format!("{name} contract address not configured")))
    }
    Ok(addr)
}

async fn resolved_account(sprout: &Sprout) -> Result<Account> {
    let account = sprout.resolved_account().await?;
    println!("Acting as {} ({} signer)", account.address, account.source);
    Ok(account)
}

fn print_outcome(sprout: &Sprout, outcome: &Outcome) {
    if let Some(ref hash) = outcome.approval_hash {
        println!("Approval confirmed: {hash}");
        if let Some(link) = sprout.explorer_link(hash) {
            println!("  {link}");
        }
    }
    println!("Transaction confirmed: {}", outcome.action_hash);
    if let Some(link) = sprout.explorer_link(&outcome.action_hash) {
        println!("  {link}");
    }
}

fn print_validation(report: &sprout::validate::ValidationReport) -> Result<()> {
    if report.submittable() {
        return Ok(())
    }
    for (field, msg) in &report.errors {
        eprintln!("Invalid {field}: {msg}");
    }
    if report.incomplete {
        eprintln!("Some required fields are missing");
    }
    Err(Error::ValidationFailed("Form validation failed".to_string()))
}

async fn handle_vesting(sprout: &Sprout, cmd: VestingSubcmd) -> Result<()> {
    require_contract(sprout.settings.vesting_contract, "Vesting")?;

    match cmd {
        VestingSubcmd::Status { beneficiary } => {
            let beneficiary = match beneficiary {
                Some(addr) => Address::from_str(&addr)?,
                None => sprout.resolved_account().await?.address,
            };

            let overview = sprout.vesting_overview(beneficiary).await;
            let Some(schedule) = overview.schedule else {
                println!("No vesting schedule found for {beneficiary}");
                if let Some(whitelisted) = overview.whitelisted {
                    println!("Whitelisted: {whitelisted}");
                }
                return Ok(())
            };

            let now = unix_timestamp()?;
            let meta = sprout.token_meta(schedule.token).await;
            let status = view::schedule_status(&schedule, now);
            let progress = view::vesting_progress_percent(&schedule, now);

            let mut table = Table::new();
            table.set_format(*format::consts::FORMAT_NO_BORDER_LINE_SEPARATOR);
            table.add_row(row!["Token", schedule.token]);
            table.add_row(row!["Status", status]);
            table.add_row(row!["Progress", format!("{progress}%")]);
            table.add_row(row!["Starts", timestamp_to_date(schedule.start_time)]);
            table.add_row(row!["Cliff lifts", timestamp_to_date(schedule.cliff_time())]);
            table.add_row(row!["Fully vested", timestamp_to_date(schedule.end_time())]);
            table.add_row(row![
                "Total duration",
                view::format_duration(schedule.vesting_duration)
            ]);
            table.add_row(row!["Locked", view::format_amount(&schedule.total_amount, &meta)]);
            table.add_row(row![
                "Claimed",
                view::format_amount(&schedule.amount_claimed, &meta)
            ]);
            match &overview.vested_amount {
                Some(vested) => {
                    table.add_row(row!["Vested", view::format_amount(vested, &meta)]);
                    table.add_row(row![
                        "Claimable",
                        if view::is_claimable(&schedule, vested) { "yes" } else { "no" }
                    ]);
                }
                None => {
                    table.add_row(row!["Vested", "unavailable"]);
                }
            }
            if schedule.is_revoked() {
                table.add_row(row!["Revoked at", timestamp_to_date(schedule.revoked_at)]);
            }
            if let Some(whitelisted) = overview.whitelisted {
                table.add_row(row!["Whitelisted", whitelisted]);
            }
            println!("{table}");

            Ok(())
        }

        VestingSubcmd::Create { beneficiary, token, amount, start, cliff, end } => {
            let form = ScheduleForm {
                beneficiary: beneficiary.clone(),
                token: token.clone(),
                amount: amount.clone(),
                start_time: Some(start),
                cliff_time: Some(cliff),
                end_time: Some(end),
            };

            let account = resolved_account(sprout).await?;
            let token_addr = Address::from_str(&token)?;
            let meta = sprout.token_meta(token_addr).await;
            let balance = sprout.balance_of(token_addr, account.address).await.ok();

            let report = form.validate(unix_timestamp()?, meta.decimals, balance.as_ref());
            print_validation(&report)?;

            // The contract rejects non-whitelisted parties anyway, this
            // just fails before anything is signed
            if let Ok(false) = sprout.is_whitelisted(Address::from_str(&beneficiary)?).await {
                return Err(Error::ValidationFailed(
                    "Beneficiary is not whitelisted".to_string(),
                ))
            }
            if let Ok(false) = sprout.is_token_whitelisted(token_addr).await {
                return Err(Error::ValidationFailed("Token is not whitelisted".to_string()))
            }

            let (Some(cliff_duration), Some(vesting_duration)) =
                (form.cliff_duration(), form.vesting_duration())
            else {
                return Err(Error::ValidationFailed("Malformed schedule times".to_string()))
            };

            let allowance = sprout
                .allowance(token_addr, account.address, sprout.settings.vesting_contract)
                .await
                .ok();
            let plan = sprout.create_schedule_plan(
                account,
                Address::from_str(&beneficiary)?,
                token_addr,
                allowance.as_ref(),
                meta.decimals,
                &amount,
                start,
                cliff_duration,
                vesting_duration,
            )?;
            let outcome = sprout.submit_plan(&plan).await?;
            print_outcome(sprout, &outcome);

            Ok(())
        }

        VestingSubcmd::WhitelistAdd { address } => {
            let account = resolved_account(sprout).await?;
            let addr = Address::from_str(&address)?;

            let form = WhitelistForm { address: address.clone() };
            let already = sprout.is_whitelisted(addr).await.ok();
            print_validation(&form.validate(true, already))?;

            let plan = sprout.whitelist_add_plan(account, addr);
            let outcome = sprout.submit_plan(&plan).await?;
            print_outcome(sprout, &outcome);

            Ok(())
        }

        VestingSubcmd::WhitelistRemove { address } => {
            let account = resolved_account(sprout).await?;
            let addr = Address::from_str(&address)?;

            let form = WhitelistForm { address: address.clone() };
            let already = sprout.is_whitelisted(addr).await.ok();
            print_validation(&form.validate(false, already))?;

            let plan = sprout.whitelist_remove_plan(account, addr);
            let outcome = sprout.submit_plan(&plan).await?;
            print_outcome(sprout, &outcome);

            Ok(())
        }

        VestingSubcmd::TokenToggle { token } => {
            let account = resolved_account(sprout).await?;
            let token_addr = Address::from_str(&token)?;

            // The contract wants the desired state, so the current one
            // must be known before a direction can be picked
            let whitelisted = sprout.is_token_whitelisted(token_addr).await?;
            println!(
                "Token is currently {}, toggling",
                if whitelisted { "whitelisted" } else { "not whitelisted" }
            );

            let plan = sprout.change_token_plan(account, token_addr, !whitelisted);
            let outcome = sprout.submit_plan(&plan).await?;
            print_outcome(sprout, &outcome);

            Ok(())
        }
    }
}

async fn print_farm_view(sprout: &Sprout, account: Option<&Account>) -> Result<()> {
    let snapshot = sprout.pool_snapshot().await;
    let now = unix_timestamp()?;

    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_NO_BORDER_LINE_SEPARATOR);

    let fmt_opt_addr = |addr: &Option<Address>| match addr {
        Some(a) => a.to_string(),
        None => "unavailable".to_string(),
    };
    table.add_row(row!["LP token", fmt_opt_addr(&snapshot.lp_token)]);
    table.add_row(row!["Reward token", fmt_opt_addr(&snapshot.reward_token)]);

    let reward_meta = match snapshot.reward_token {
        Some(token) => sprout.token_meta(token).await,
        None => Default::default(),
    };
    let lp_meta = match snapshot.lp_token {
        Some(token) => sprout.token_meta(token).await,
        None => Default::default(),
    };

    match &snapshot.reward_rate {
        Some(rate) => table.add_row(row![
            "Reward rate",
            format!("{}/s", view::format_amount(rate, &reward_meta))
        ]),
        None => table.add_row(row!["Reward rate", "unavailable"]),
    };
    match &snapshot.total_staked {
        Some(total) => table.add_row(row!["Total staked", view::format_amount(total, &lp_meta)]),
        None => table.add_row(row!["Total staked", "unavailable"]),
    };

    if let [Some(t1), Some(t2), Some(t3)] = snapshot.boost_thresholds {
        table.add_row(row![
            "Boost tiers",
            format!(
                "1.25x after {}, 1.5x after {}, 2x after {}",
                view::format_duration(t1),
                view::format_duration(t2),
                view::format_duration(t3)
            )
        ]);
    }

    if let Some(account) = account {
        match sprout.stake_position(account.address).await {
            Ok(position) => {
                table.add_row(row!["Your stake", view::format_amount(&position.amount, &lp_meta)]);
                if position.stake_time > 0 {
                    let elapsed = now.saturating_sub(position.stake_time);
                    table.add_row(row!["Staked for", view::format_duration(elapsed)]);
                    if let [Some(t1), Some(t2), Some(t3)] = snapshot.boost_thresholds {
                        let bps = view::boost_multiplier_bps(elapsed, &[t1, t2, t3]);
                        table.add_row(row!["Boost", view::format_multiplier_bps(bps)]);
                    }
                }
            }
            Err(e) => {
                table.add_row(row!["Your stake", format!("unavailable ({e})")]);
            }
        }

        match sprout.pending_rewards(account.address).await {
            Ok(pending) => {
                table.add_row(row![
                    "Pending rewards",
                    view::format_amount(&pending, &reward_meta)
                ]);
            }
            Err(e) => {
                table.add_row(row!["Pending rewards", format!("unavailable ({e})")]);
            }
        }
    }

    println!("{table}");
    Ok(())
}

async fn handle_farm(sprout: &Sprout, cmd: FarmSubcmd) -> Result<()> {
    require_contract(sprout.settings.farm_contract, "Farm")?;

    match cmd {
        FarmSubcmd::View => {
            let account = sprout.resolved_account().await.ok();
            print_farm_view(sprout, account.as_ref()).await
        }

        FarmSubcmd::Watch => {
            let account = sprout.resolved_account().await.ok();
            let interval = Duration::from_secs(sprout.settings.pool_refresh_interval.max(1));
            loop {
                print_farm_view(sprout, account.as_ref()).await?;
                smol::Timer::after(interval).await;
            }
        }

        FarmSubcmd::Stake { amount } => {
            let account = resolved_account(sprout).await?;

            let snapshot = sprout.pool_snapshot().await;
            let Some(lp_token) = snapshot.lp_token else {
                return Err(Error::UnexpectedJsonRpc(
                    "Pool did not report its LP token".to_string(),
                ))
            };
            let decimals = sprout.token_meta(lp_token).await.decimals;
            let balance = sprout.balance_of(lp_token, account.address).await.ok();

            let form = StakeForm { amount: amount.clone() };
            print_validation(&form.validate(decimals, balance.as_ref()))?;

            let allowance = sprout
                .allowance(lp_token, account.address, sprout.settings.farm_contract)
                .await
                .ok();
            let plan = sprout.stake_plan(account, lp_token, allowance.as_ref(), decimals, &amount)?;
            let outcome = sprout.submit_plan(&plan).await?;
            print_outcome(sprout, &outcome);

            Ok(())
        }

        FarmSubcmd::Withdraw { amount } => {
            let account = resolved_account(sprout).await?;

            let position = sprout.stake_position(account.address).await?;
            let snapshot = sprout.pool_snapshot().await;
            let decimals = match snapshot.lp_token {
                Some(lp_token) => sprout.token_meta(lp_token).await.decimals,
                None => None,
            };

            let form = StakeForm { amount: amount.clone() };
            print_validation(&form.validate(decimals, Some(&position.amount)))?;

            let raw_amount = decode_base10(&amount, decimals.unwrap_or(18), true)?;
            let plan = sprout.withdraw_plan(account, &raw_amount);
            let outcome = sprout.submit_plan(&plan).await?;
            print_outcome(sprout, &outcome);

            Ok(())
        }

        FarmSubcmd::Claim => {
            let account = resolved_account(sprout).await?;
            let plan = sprout.claim_plan(account);
            let outcome = sprout.submit_plan(&plan).await?;
            print_outcome(sprout, &outcome);

            Ok(())
        }

        FarmSubcmd::EmergencyWithdraw => {
            let account = resolved_account(sprout).await?;
            println!("WARNING: emergency withdrawal forfeits all accrued rewards");

            let plan = sprout.emergency_withdraw_plan(account);
            let outcome = sprout.submit_plan(&plan).await?;
            print_outcome(sprout, &outcome);

            Ok(())
        }

        FarmSubcmd::SetRewardRate { rate } => {
            let account = resolved_account(sprout).await?;
            let raw_rate = rate.trim().parse::<BigUint>()?;

            let plan = sprout.set_reward_rate_plan(account, &raw_rate);
            let outcome = sprout.submit_plan(&plan).await?;
            print_outcome(sprout, &outcome);

            Ok(())
        }
    }
}

async fn handle_wallet(sprout: &Sprout, cmd: WalletSubcmd) -> Result<()> {
    match cmd {
        WalletSubcmd::Status => {
            println!(
                "Embedded signer: {}",
                if sprout.has_embedded_wallet() { "configured" } else { "not configured" }
            );
            if let Some(address) = sprout.cached_embedded_address()? {
                println!("Embedded address: {address}");
            }
            match sprout.resolved_account().await {
                Ok(account) => {
                    println!("Active account: {} ({} signer)", account.address, account.source)
                }
                Err(e) => println!("No active account: {e}"),
            }
            Ok(())
        }

        WalletSubcmd::Unlock { passphrase } => {
            let address = sprout.unlock_embedded_wallet(&passphrase).await?;
            println!("Unlocked embedded signer for {address}");
            Ok(())
        }

        WalletSubcmd::Disconnect => {
            sprout.disconnect_embedded_wallet()?;
            println!("Forgot cached embedded signer address");
            Ok(())
        }
    }
}

fn handle_history(sprout: &Sprout) -> Result<()> {
    let records = sprout.get_txs_history()?;
    if records.is_empty() {
        println!("No transactions in history");
        return Ok(())
    }

    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_NO_BORDER_LINE_SEPARATOR);
    table.set_titles(row!["Transaction", "Kind", "Status", "Date"]);
    for record in records {
        table.add_row(row![
            record.hash,
            record.kind,
            record.status,
            timestamp_to_date(record.created_at)
        ]);
    }
    println!("{table}");

    Ok(())
}

async fn realmain(args: Args, _ex: Arc<smol::Executor<'static>>) -> Result<()> {
    let settings = ClientSettings {
        endpoint: Some(args.endpoint.clone()),
        embedded_signer: args.embedded_signer.clone(),
        injected_signer: args.injected_signer.clone(),
        vesting_contract: parse_contract(&args.vesting_contract)?,
        farm_contract: parse_contract(&args.farm_contract)?,
        rpc_timeout: Duration::from_secs(args.rpc_timeout),
        confirm: ConfirmSettings { poll_interval: args.confirm_poll, timeout: args.confirm_timeout },
        pool_refresh_interval: args.pool_refresh_interval,
        explorer_url: args.explorer_url.clone(),
    };

    let sprout = Sprout::new(args.wallet_path.clone(), settings).await?;
    sprout.initialize_wallet()?;

    let result = match args.command {
        Subcmd::Ping => sprout.ping().await,
        Subcmd::Wallet(cmd) => handle_wallet(&sprout, cmd).await,
        Subcmd::Vesting(cmd) => handle_vesting(&sprout, cmd).await,
        Subcmd::Farm(cmd) => handle_farm(&sprout, cmd).await,
        Subcmd::History => {
            // Settle any still-pending entries before rendering
            if let Err(e) = sprout.resolve_txs_history().await {
                error!(target: "sprout", "Resolving pending history entries failed: {e}");
            }
            handle_history(&sprout)
        }
    };

    sprout.stop_rpc_client().await?;
    result
}

fn main() -> Result<()> {
    // First pass over the arguments grabs the config path
    let args = Args::from_args();
    let cfg_path = get_config_path(args.config.clone(), CONFIG_FILE)?;
    spawn_config(&cfg_path, CONFIG_FILE_CONTENTS)?;

    // Second pass overlays the config file under the arguments
    let args = match Args::from_args_with_toml(&fs::read_to_string(&cfg_path)?) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("Error: Failed parsing the configuration file: {e}");
            exit(1);
        }
    };

    let log_level = match args.verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    TermLogger::init(log_level, Config::default(), TerminalMode::Mixed, ColorChoice::Auto)?;

    // Spawn the executor threads and block on the main future
    let ex = Arc::new(smol::Executor::new());
    let (signal, shutdown) = smol::channel::unbounded::<()>();
    let n_threads = std::thread::available_parallelism()?.get();

    let (_, result) = Parallel::new()
        .each(0..n_threads, |_| smol::block_on(ex.run(shutdown.recv())))
        .finish(|| {
            smol::block_on(async {
                let result = realmain(args, ex.clone()).await;
                drop(signal);
                result
            })
        });

    result
}
