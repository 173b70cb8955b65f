use clap::{Args, Parser, Subcommand};
use parking_lot::Mutex;
use std::num::NonZeroU32;
use std::path::PathBuf;
use std::sync::Arc;
use vapetrack_core::ticker::{self, Ticker};
use vapetrack_core::*;
use vapetrack_core::{catalog, health, metrics};

#[derive(Parser)]
#[command(name = "vapetrack")]
#[command(about = "Vaping cessation tracker", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Override data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show today's progress, XP and savings (default)
    Status {
        /// Print machine-readable JSON
        #[arg(long)]
        json: bool,
    },

    /// Log one or more puffs
    Log {
        #[arg(default_value = "1")]
        count: NonZeroU32,
    },

    /// Juice level and bottle purchases
    Juice {
        #[command(subcommand)]
        action: JuiceCommand,
    },

    /// Start or end a smoke-free streak
    SmokeFree,

    /// Complete onboarding with the given profile fields
    Onboard(ProfileArgs),

    /// Show the profile, or update the given fields
    Profile(ProfileArgs),

    /// Seven-day usage trend
    Week,

    /// Recovery milestones since the last puff
    Health,

    /// Reward shop
    Rewards {
        #[command(subcommand)]
        action: Option<RewardsCommand>,
    },

    /// Create a remote account
    Signup {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        confirm: String,
        #[arg(long)]
        name: String,
    },

    /// Sign in to a remote account
    Signin {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },

    /// Sign out and remove all local data
    Signout,

    /// Remove all local data
    Clear {
        /// Confirm the wipe
        #[arg(long)]
        yes: bool,
    },

    /// Live counters for time since last puff and savings
    Watch {
        /// Stop after this many refreshes
        #[arg(long)]
        ticks: Option<u64>,
    },
}

#[derive(Subcommand)]
enum JuiceCommand {
    /// Set the remaining juice level in percent
    Set { level: f64 },
    /// Record a new bottle
    Buy,
    /// List bottle purchases
    History,
}

#[derive(Subcommand)]
enum RewardsCommand {
    /// List the catalog (default)
    List,
    /// Buy a reward with XP
    Buy { id: String },
    /// Equip an owned reward
    Equip { id: String },
    /// Clear a slot (icon or border)
    Unequip { category: RewardCategory },
}

#[derive(Args, Default)]
struct ProfileArgs {
    #[arg(long)]
    name: Option<String>,

    /// former-smoker or current-vaper
    #[arg(long, value_parser = parse_user_type)]
    user_type: Option<UserType>,

    #[arg(long)]
    cigarettes_per_day: Option<u32>,

    #[arg(long)]
    cigarettes_per_pack: Option<u32>,

    #[arg(long)]
    pack_cost: Option<f64>,

    #[arg(long)]
    puff_goal: Option<u32>,

    /// Bottle size in mL
    #[arg(long)]
    bottle_size: Option<f64>,

    #[arg(long)]
    vape_name: Option<String>,

    /// Nicotine strength in mg/mL
    #[arg(long)]
    nicotine: Option<f64>,

    /// Device reservoir size in mL
    #[arg(long)]
    vape_size: Option<f64>,

    #[arg(long)]
    vape_cost: Option<f64>,
}

impl ProfileArgs {
    fn into_update(self, current: &UserProfile) -> ProfileUpdate {
        let touches_device = self.vape_name.is_some()
            || self.nicotine.is_some()
            || self.vape_size.is_some()
            || self.vape_cost.is_some();

        let current_vape = touches_device.then(|| {
            let mut device = current.current_vape.clone().unwrap_or_default();
            if let Some(name) = self.vape_name {
                device.name = name;
            }
            if let Some(nicotine) = self.nicotine {
                device.nicotine = nicotine;
            }
            if let Some(size) = self.vape_size {
                device.size = size;
            }
            if let Some(cost) = self.vape_cost {
                device.cost = cost;
            }
            device
        });

        ProfileUpdate {
            name: self.name,
            user_type: self.user_type,
            cigarettes_per_day: self.cigarettes_per_day,
            cigarettes_per_pack: self.cigarettes_per_pack,
            pack_cost: self.pack_cost,
            daily_puff_goal: self.puff_goal,
            bottle_size: self.bottle_size,
            current_vape,
            ..Default::default()
        }
    }
}

fn parse_user_type(s: &str) -> std::result::Result<UserType, String> {
    match s.to_lowercase().replace('_', "-").as_str() {
        "former-smoker" => Ok(UserType::FormerSmoker),
        "current-vaper" => Ok(UserType::CurrentVaper),
        other => Err(format!(
            "unknown user type '{}' (expected former-smoker or current-vaper)",
            other
        )),
    }
}

fn main() -> Result<()> {
    // Initialize logging
    vapetrack_core::logging::init();

    let cli = Cli::parse();

    // Determine data directory
    let config = Config::load()?;
    let data_dir = cli.data_dir.unwrap_or_else(|| config.data.data_dir.clone());

    let mut store = open_store(data_dir, &config);
    let command = cli.command.unwrap_or(Commands::Status { json: false });

    // Score yesterday before anything else touches today. Account commands
    // score after the pull, which replaces local XP with the remote total.
    if !matches!(command, Commands::Signup { .. } | Commands::Signin { .. }) {
        store.evaluate_daily_xp();
    }

    match command {
        Commands::Status { json } => cmd_status(&store, json),
        Commands::Log { count } => cmd_log(&mut store, count),
        Commands::Juice { action } => cmd_juice(&mut store, action),
        Commands::SmokeFree => cmd_smoke_free(&mut store),
        Commands::Onboard(args) => {
            let update = args.into_update(store.profile());
            store.onboard(update);
            println!("✓ Onboarding complete!");
            cmd_profile_show(&store);
            Ok(())
        }
        Commands::Profile(args) => {
            let update = args.into_update(store.profile());
            if !update.is_empty() {
                store.update_profile(update);
                println!("✓ Profile updated");
            }
            cmd_profile_show(&store);
            Ok(())
        }
        Commands::Week => cmd_week(&store),
        Commands::Health => cmd_health(&store),
        Commands::Rewards { action } => cmd_rewards(&mut store, action.unwrap_or(RewardsCommand::List)),
        Commands::Signup {
            email,
            password,
            confirm,
            name,
        } => {
            store.sign_up(&email, &password, &confirm, &name)?;
            store.evaluate_daily_xp();
            match store.auth() {
                AuthState::AwaitingConfirmation { email } => {
                    println!("✓ Account created. Check {} to confirm, then sign in.", email)
                }
                _ => println!("✓ Account created and signed in as {}", email),
            }
            Ok(())
        }
        Commands::Signin { email, password } => {
            store.sign_in(&email, &password)?;
            store.evaluate_daily_xp();
            println!("✓ Signed in as {}", email);
            println!("  {} puffs on record", store.events().len());
            Ok(())
        }
        Commands::Signout => {
            store.sign_out();
            println!("✓ Signed out. Local data cleared.");
            Ok(())
        }
        Commands::Clear { yes } => {
            if !yes {
                println!("This removes every puff, purchase and reward. Re-run with --yes to confirm.");
                return Ok(());
            }
            store.clear_all();
            println!("✓ All local data cleared");
            Ok(())
        }
        Commands::Watch { ticks } => cmd_watch(&store, ticks),
    }
}

fn open_store(data_dir: PathBuf, config: &Config) -> Store {
    let kv = FileKvStore::new(data_dir);
    let mut store = Store::open(Box::new(kv), Arc::new(SystemClock))
        .with_platform(config.device.platform.clone());

    if config.remote.is_enabled() {
        match RestBackend::from_config(&config.remote) {
            Ok(backend) => {
                store = store.with_sync(SyncGateway::new(Arc::new(backend)));
                store.resume_session();
            }
            Err(e) => tracing::warn!("Remote sync disabled: {}", e),
        }
    }
    store
}

fn cmd_status(store: &Store, json: bool) -> Result<()> {
    let now = store.now();
    let state = store.state();
    let progress = metrics::daily_progress(&state.profile, &state.events, now);
    let savings = metrics::cost_savings(&state.profile, &state.events, now);
    let level = metrics::level(state.profile.xp);

    if json {
        let doc = serde_json::json!({
            "name": state.profile.name,
            "xp": state.profile.xp,
            "level": level,
            "total_puffs": state.events.len(),
            "smoke_free": state.profile.is_smoke_free(),
            "badges": state.badges,
            "today": progress,
            "savings": savings,
            "projected_xp_today": ledger::projected_xp_today(state, now),
        });
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(());
    }

    println!("\n╭─────────────────────────────────────────╮");
    println!("│  VAPETRACK · {}", state.profile.name);
    println!("╰─────────────────────────────────────────╯");
    println!();
    println!("  Level {} · {} XP", level, state.profile.xp);

    match progress.percentage {
        Some(pct) => println!(
            "  Today: {} / {} puffs ({}%){}",
            progress.puffs,
            progress.baseline,
            pct,
            if progress.over_limit { " - over limit" } else { "" }
        ),
        None => println!("  Today: {} puffs (no baseline set)", progress.puffs),
    }
    println!("  ≈ {:.1} cigarettes", progress.cigarettes_equivalent);
    println!(
        "  On track for +{} XP tomorrow",
        ledger::projected_xp_today(state, now)
    );

    if let Some(start) = state.profile.smoke_free_start_time {
        let elapsed = now.with_timezone(&chrono::Utc) - start;
        println!("  Smoke-free for {}", health::format_elapsed(elapsed));
    }

    match savings {
        Some(s) => {
            println!();
            println!("  Saved ${:.2} over {:.1} days", s.net_savings, s.days_since_onboarding);
            println!("  {:.0} cigarettes avoided", s.cigarettes_avoided);
        }
        None => {
            println!();
            println!("  Run `vapetrack onboard` to start tracking savings.");
        }
    }

    if !state.badges.is_empty() {
        let ids: Vec<&str> = state.badges.iter().map(|b| b.id()).collect();
        println!("  Badges: {}", ids.join(", "));
    }
    println!();
    Ok(())
}

fn cmd_log(store: &mut Store, count: NonZeroU32) -> Result<()> {
    let outcome = store.log_events(count);
    println!(
        "✓ Logged {} puff{} ({} today)",
        outcome.added,
        if outcome.added == 1 { "" } else { "s" },
        metrics::events_on(store.events(), store.now().date_naive(), store.now().offset())
    );
    for badge in &outcome.badges {
        println!("★ Badge unlocked: {}", badge.id());
    }
    Ok(())
}

fn cmd_juice(store: &mut Store, action: JuiceCommand) -> Result<()> {
    match action {
        JuiceCommand::Set { level } => {
            let added = store.set_juice_level(level)?;
            println!("✓ Juice level set to {}%", level);
            if added > 0 {
                println!(
                    "  Added {} puffs (+{} XP)",
                    added,
                    added as u64 * vapetrack_core::store::XP_PER_JUICE_PUFF
                );
            }
        }
        JuiceCommand::Buy => {
            let purchase = store.record_juice_purchase();
            println!(
                "✓ New bottle recorded ({} puffs since the last one)",
                purchase.puffs_since_last
            );
        }
        JuiceCommand::History => {
            let purchases = &store.state().juice_purchases;
            if purchases.is_empty() {
                println!("No bottles recorded yet.");
                return Ok(());
            }
            let offset = *store.now().offset();
            for p in purchases {
                println!(
                    "  {}  {} puffs",
                    p.timestamp.with_timezone(&offset).format("%Y-%m-%d %H:%M"),
                    p.puffs_since_last
                );
            }
            let stats = metrics::juice_stats(purchases);
            if let Some(avg) = stats.average_puffs_per_bottle {
                println!("  Average: {} puffs per bottle", avg);
            }
            if let Some(interval) = stats.average_interval {
                println!(
                    "  A bottle lasts about {:.1} days",
                    interval.num_minutes() as f64 / (24.0 * 60.0)
                );
            }
        }
    }
    Ok(())
}

fn cmd_smoke_free(store: &mut Store) -> Result<()> {
    if store.toggle_smoke_free() {
        println!("✓ Smoke-free streak started. You've got this!");
    } else {
        println!("✓ Smoke-free streak ended");
    }
    Ok(())
}

fn cmd_profile_show(store: &Store) {
    let p = store.profile();
    println!();
    println!("  Name:           {}", p.name);
    if !p.email.is_empty() {
        println!("  Email:          {}", p.email);
    }
    match p.user_type {
        UserType::FormerSmoker => {
            println!("  Type:           former smoker");
            println!(
                "  Habit:          {} cigarettes/day, {} per pack at ${:.2}",
                p.cigarettes_per_day, p.cigarettes_per_pack, p.pack_cost
            );
        }
        UserType::CurrentVaper => {
            println!("  Type:           current vaper");
            println!("  Daily goal:     {} puffs", p.daily_puff_goal);
        }
    }
    if let Some(device) = &p.current_vape {
        println!(
            "  Device:         {} {} ({} mg/mL, {} mL, ${:.2})",
            device.name, device.kind, device.nicotine, device.size, device.cost
        );
    }
    println!(
        "  Baseline:       {} puffs/day ({} puffs per cigarette)",
        metrics::daily_baseline(p),
        metrics::puffs_per_cigarette(p.device_nicotine())
    );
    println!("  Juice:          {}% of {} mL", p.juice_level, p.bottle_size);
    println!();
}

fn cmd_week(store: &Store) -> Result<()> {
    let now = store.now();
    let state = store.state();
    let trend = metrics::weekly_trend(&state.profile, &state.events, now);
    let unit = match state.profile.user_type {
        UserType::FormerSmoker => "cigs",
        UserType::CurrentVaper => "puffs",
    };

    println!();
    for day in &trend {
        let pct = day.percentage.unwrap_or(0).min(100) as usize;
        println!(
            "  {} {}  {:>6.1} {}  {:<20}{}",
            day.label,
            day.date.format("%m-%d"),
            day.value,
            unit,
            "█".repeat(pct / 5),
            if day.above_limit { " !" } else { "" }
        );
    }
    println!();
    println!(
        "  Daily average: {} puffs",
        metrics::daily_average(&state.events, now.offset())
    );
    Ok(())
}

fn cmd_health(store: &Store) -> Result<()> {
    let now = store.now().with_timezone(&chrono::Utc);
    let state = store.state();
    let elapsed = health::time_since_last_puff(&state.profile, &state.events, now);

    println!();
    println!("  Time since last puff: {}", health::format_elapsed(elapsed));
    println!();
    for m in health::timeline(&state.profile, &state.events, now) {
        if m.unlocked {
            println!("  ✓ {:<28} {}", m.title, m.label);
        } else {
            println!(
                "  · {:<28} {} ({} to go)",
                m.title,
                m.label,
                health::format_elapsed(chrono::Duration::seconds(m.remaining_seconds))
            );
        }
    }
    println!();
    Ok(())
}

fn cmd_rewards(store: &mut Store, action: RewardsCommand) -> Result<()> {
    match action {
        RewardsCommand::List => {
            let state = store.state();
            println!();
            println!("  Balance: {} XP", state.profile.xp);
            println!();
            for reward in catalog::rewards() {
                let owned = state.purchased_rewards.iter().any(|r| r == reward.id);
                let equipped = state.equipped_rewards.get(reward.category) == Some(reward.id);
                let marker = if equipped {
                    "equipped"
                } else if owned {
                    "owned"
                } else {
                    ""
                };
                println!(
                    "  {:<20} {:<20} {:>6} XP  {}",
                    reward.id, reward.name, reward.cost, marker
                );
            }
            println!();
        }
        RewardsCommand::Buy { id } => {
            let reward = catalog::find_reward(&id)
                .ok_or_else(|| Error::Validation(format!("unknown reward: {}", id)))?;
            if store.purchase_reward(reward.id, reward.cost) {
                println!("✓ Bought {} for {} XP", reward.name, reward.cost);
            } else {
                println!(
                    "Cannot buy {}: need {} XP and not already owned (balance {} XP)",
                    reward.name,
                    reward.cost,
                    store.profile().xp
                );
            }
        }
        RewardsCommand::Equip { id } => {
            let reward = catalog::find_reward(&id)
                .ok_or_else(|| Error::Validation(format!("unknown reward: {}", id)))?;
            if store.equip_reward(reward.id, reward.category) {
                println!("✓ Equipped {}", reward.name);
            } else {
                println!("Cannot equip {}: buy it first", reward.name);
            }
        }
        RewardsCommand::Unequip { category } => {
            store.unequip_reward(category);
            println!("✓ Slot cleared");
        }
    }
    Ok(())
}

fn cmd_watch(store: &Store, ticks: Option<u64>) -> Result<()> {
    let snapshot = Arc::new(store.snapshot());
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let net_savings: Arc<Mutex<Option<f64>>> = Arc::new(Mutex::new(None));

    let stats = {
        let snapshot = Arc::clone(&snapshot);
        let clock = Arc::clone(&clock);
        let net_savings = Arc::clone(&net_savings);
        Ticker::spawn(ticker::STATS_REFRESH, move |_| {
            *net_savings.lock() =
                metrics::cost_savings(&snapshot.profile, &snapshot.events, clock.now())
                    .map(|s| s.net_savings);
            true
        })?
    };

    let display = Ticker::spawn(ticker::CLOCK_REFRESH, move |n| {
        let elapsed =
            health::time_since_last_puff(&snapshot.profile, &snapshot.events, clock.now_utc());
        match *net_savings.lock() {
            Some(net) => println!(
                "  {}  since last puff · ${:.4} saved",
                health::format_elapsed(elapsed),
                net
            ),
            None => println!("  {}  since last puff", health::format_elapsed(elapsed)),
        }
        ticks.map_or(true, |limit| n + 1 < limit)
    })?;

    display.join();
    stats.cancel();
    Ok(())
}
