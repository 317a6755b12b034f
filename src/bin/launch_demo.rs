//! Launch Demo
//!
//! Builds a boosted two-stage rocket, prints its performance, flies a few
//! seeded launches event by event and compares many launches against the
//! closed-form success probability.

use std::collections::BTreeMap;
use std::path::PathBuf;

use clap::Parser;
use rocket_tycoon_core::location;
use rocket_tycoon_core::{
    Company, CoreConfig, CoreError, DesignId, EngineCycle, FailureCause, FuelType, LaunchStatus,
    MissionPlan, TestingLevels,
};

/// Launch Demo - fly a sample rocket through the simulation core
#[derive(Parser, Debug)]
#[command(name = "launch_demo")]
#[command(about = "Build a sample rocket and run seeded launch simulations")]
struct Args {
    /// Optional TOML config (world seed, starting budget, flaw catalog)
    #[arg(long)]
    config: Option<PathBuf>,

    /// World seed, overrides the config file
    #[arg(long)]
    seed: Option<u64>,

    /// Number of event-by-event launches per mission
    #[arg(long, default_value_t = 3)]
    showcase: u64,

    /// Number of launches for the aggregate statistics
    #[arg(long, default_value_t = 1000)]
    runs: u64,

    /// Design testing level applied to every launch
    #[arg(long, default_value_t = 0.0)]
    testing: f64,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => CoreConfig::load(path)?,
        None => CoreConfig::default(),
    };
    if args.seed.is_some() {
        config.world_seed = args.seed;
    }
    let mut company = Company::new(&config)?;
    println!("World seed: {}", company.world_seed().raw_seed());

    let design = build_rocket(&mut company)?;
    print_metrics(&company, design)?;

    let flaw_count = company.ensure_design_flaws(design)?.len();
    println!("\n{} latent flaws rolled into the design and its engines", flaw_count);

    let mut testing = TestingLevels {
        design: args.testing,
        ..TestingLevels::default()
    };
    for engine in company.design(design)?.engine_ids() {
        testing = testing.with_engine(engine, args.testing);
    }

    print_transfers_from("leo");

    let missions = [
        ("LEO", MissionPlan::direct("earth_surface", "leo")?),
        ("GTO", MissionPlan::from_stops(&["earth_surface", "leo", "gto"])?),
    ];
    for (label, plan) in &missions {
        company.set_target_delta_v(design, plan.total_delta_v)?;
        println!(
            "\n=== {} mission ({}): {:.0} m/s required, {:.0} m/s available, launchable: {} ===",
            label,
            plan.route_label(),
            plan.total_delta_v,
            company.total_effective_delta_v(design)?,
            company.is_launchable(design)?
        );
        for seed in 1..=args.showcase {
            showcase_launch(&mut company, design, plan, &testing, seed)?;
        }
    }

    for (label, plan) in &missions {
        aggregate(&mut company, design, label, plan, &testing, args.runs)?;
    }

    fix_discovered(&mut company, design, &missions[1].1, &testing)?;
    Ok(())
}

fn build_rocket(company: &mut Company) -> Result<DesignId, CoreError> {
    let kerolox = company.create_engine(FuelType::Kerolox, EngineCycle::GasGenerator, 1.0)?;
    let solid = company.create_engine(FuelType::Solid, EngineCycle::PressureFed, 0.25)?;
    let hydrolox = company.create_engine(FuelType::Hydrolox, EngineCycle::Expander, 1.0)?;

    let design = company.create_design("Demo Heavy");
    let core = company.add_stage(design, kerolox)?;
    company.set_stage_engine_count(design, core, 9)?;
    company.set_stage_mass_fraction(design, core, 0.92)?;

    let boosters = company.add_stage(design, solid)?;
    company.set_stage_engine_count(design, boosters, 2)?;
    company.set_stage_booster(design, boosters, true)?;

    let upper = company.add_stage(design, hydrolox)?;
    company.set_stage_engine_count(design, upper, 3)?;
    company.set_stage_mass_fraction(design, upper, 0.88)?;

    company.set_payload_mass(design, 3000.0)?;
    Ok(design)
}

fn print_metrics(company: &Company, design: DesignId) -> Result<(), CoreError> {
    let rocket = company.design(design)?;
    println!("\n=== {} ===", rocket.name);
    for (i, stage) in rocket.stages().iter().enumerate() {
        println!(
            "Stage {}{}: {} x {} | wet {:.0} kg | dry {:.0} kg | burn {:.0} s | ${:.1}M",
            i + 1,
            if stage.is_booster { " (booster)" } else { "" },
            stage.engine_count(),
            stage.engine().name,
            stage.wet_mass_kg(),
            stage.dry_mass_kg(),
            stage.burn_time_seconds(),
            rocket.stage_cost(i) / 1e6
        );
    }
    for (group, burn) in rocket.burn_sequence() {
        println!(
            "Burn of stage {}: ideal {:.0} m/s, gravity loss {:.0} m/s, effective {:.0} m/s, TWR {:.2}",
            group.core_stage_index + 1,
            burn.ideal_delta_v,
            burn.gravity_loss,
            burn.effective_delta_v,
            burn.initial_twr
        );
    }
    println!(
        "Payload {:.0} kg | wet {:.0} kg | liftoff TWR {:.2}",
        rocket.payload_mass_kg(),
        rocket.total_wet_mass_kg(),
        rocket.liftoff_twr()
    );
    println!(
        "Delta-v: ideal {:.0} m/s, effective {:.0} m/s (gravity loss {:.0} m/s)",
        rocket.total_delta_v(),
        rocket.total_effective_delta_v(),
        rocket.total_gravity_loss()
    );
    println!(
        "Cost ${:.1}M of ${:.0}M budget",
        rocket.total_cost() / 1e6,
        rocket.starting_budget() / 1e6
    );
    Ok(())
}

fn print_transfers_from(id: &str) {
    println!("\n=== Transfers from {} ===", location::display_name(id));
    for transfer in location::transfers_from(id) {
        println!(
            "  {} -> {:<5} {:>5.0} m/s  {} days",
            location::short_name(transfer.from),
            location::short_name(transfer.to),
            transfer.total_delta_v(),
            transfer.transit_days
        );
    }
}

fn showcase_launch(
    company: &mut Company,
    design: DesignId,
    plan: &MissionPlan,
    testing: &TestingLevels,
    seed: u64,
) -> Result<(), CoreError> {
    let sim = company.start_simulation_with_seed(design, plan, testing, seed)?;
    println!(
        "\nLaunch seed {} (success chance {:.1}%)",
        seed,
        company.simulation(sim)?.success_probability() * 100.0
    );
    while !company.simulation(sim)?.is_complete() {
        let outcome = company.step_event(sim)?;
        let leg = company.simulation(sim)?.snapshot().legs()[outcome.leg_index]
            .leg
            .as_ref()
            .map(|l| {
                format!("{} -> {}", location::short_name(&l.from), location::short_name(&l.to))
            })
            .unwrap_or_else(|| "ascent".to_string());
        let verdict = if outcome.passed { "ok" } else { "FAILED" };
        println!(
            "  [{}] {:<30} risk {:>5.2}%  {}",
            leg,
            outcome.name,
            outcome.rates.total() * 100.0,
            verdict
        );
        if let Some(cause) = outcome.cause {
            println!("    cause: {}", describe_cause(company, cause));
        }
    }
    println!("  => {}", company.is_complete(sim)?.display_name());
    company.discard_simulation(sim)?;
    Ok(())
}

fn describe_cause(company: &Company, cause: FailureCause) -> String {
    match cause {
        FailureCause::Flaw(id) => company
            .flaw_registry()
            .get(id)
            .map(|f| format!("{} (flaw {})", f.name, id))
            .unwrap_or_else(|| format!("flaw {}", id)),
        FailureCause::Unknown => "unknown".to_string(),
    }
}

fn aggregate(
    company: &mut Company,
    design: DesignId,
    label: &str,
    plan: &MissionPlan,
    testing: &TestingLevels,
    runs: u64,
) -> Result<(), CoreError> {
    let expected = company.mission_success_probability(design, plan, testing)?;
    let mut successes = 0u64;
    let mut failures_by_event: BTreeMap<String, u64> = BTreeMap::new();
    let mut flaw_failures = 0u64;

    for seed in 0..runs {
        let sim = company.start_simulation_with_seed(design, plan, testing, 10_000 + seed)?;
        if company.run_simulation(sim)? == LaunchStatus::Success {
            successes += 1;
        } else if let Some(last) = company.simulation(sim)?.outcomes().last() {
            *failures_by_event.entry(last.name.clone()).or_default() += 1;
            if matches!(last.cause, Some(FailureCause::Flaw(_))) {
                flaw_failures += 1;
            }
        }
        company.discard_simulation(sim)?;
    }

    let observed = if runs > 0 { successes as f64 / runs as f64 } else { 0.0 };
    println!("\n=== {} x {} launches ===", label, runs);
    println!(
        "Observed success {:.1}%, closed-form {:.1}%",
        observed * 100.0,
        expected * 100.0
    );
    println!("Failures blamed on flaws: {}", flaw_failures);
    for (event, count) in &failures_by_event {
        println!("  {:<30} {}", event, count);
    }
    Ok(())
}

fn fix_discovered(
    company: &mut Company,
    design: DesignId,
    plan: &MissionPlan,
    testing: &TestingLevels,
) -> Result<(), CoreError> {
    let before = company.mission_success_probability(design, plan, testing)?;
    let mut funds = company.design(design)?.remaining_budget();
    let discovered: Vec<_> = company
        .flaw_registry()
        .discovered_flaws()
        .iter()
        .map(|f| f.id)
        .collect();

    println!("\n=== Fixing {} discovered flaws ===", discovered.len());
    for id in discovered {
        match company.fix_flaw(id, funds) {
            Ok(fix) => {
                funds -= fix.cost;
                println!("  fixed flaw {} for ${:.1}M", id, fix.cost / 1e6);
            }
            Err(err) => println!("  could not fix flaw {}: {}", id, err),
        }
    }
    let after = company.mission_success_probability(design, plan, testing)?;
    println!(
        "GTO success chance {:.1}% -> {:.1}% (${:.1}M left)",
        before * 100.0,
        after * 100.0,
        funds / 1e6
    );
    Ok(())
}
