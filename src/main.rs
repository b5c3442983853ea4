use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use stable_fluids::{divergence_norm, sample_system, FdmSolver, FluidStepper, SimConfig};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "stable-fluids")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Headless stable-fluids grid simulator and FDM solver", long_about = None)]
struct Cli {
    /// trace, debug, info, warn or error
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the fluid stepper with a constant source in the middle of the grid.
    Fluid(FluidArgs),
    /// Solve the 2×2×2 sample system.
    Fdm(FdmArgs),
}

#[derive(Args)]
struct FluidArgs {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[arg(long)]
    width: Option<usize>,
    #[arg(long)]
    height: Option<usize>,
    /// Values above 1 select a 3D grid.
    #[arg(long)]
    depth: Option<usize>,
    #[arg(long, default_value_t = 100)]
    steps: u64,
    /// Density injected at the centre before every step.
    #[arg(long, default_value_t = 10.0)]
    source: f32,
    /// Velocity injected along +x at the centre before every step.
    #[arg(long, default_value_t = 1.0)]
    push: f32,
    #[arg(long, default_value_t = 10)]
    report_every: u64,
    /// Write the effective configuration here before running.
    #[arg(long)]
    save_config: Option<PathBuf>,
}

#[derive(Args)]
struct FdmArgs {
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[arg(long)]
    max_iterations: Option<usize>,
    #[arg(long)]
    threshold: Option<f32>,
}

fn load_config(path: Option<&PathBuf>) -> Result<SimConfig> {
    match path {
        Some(path) => SimConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display())),
        None => Ok(SimConfig::default()),
    }
}

fn run_fluid(args: FluidArgs) -> Result<()> {
    let mut config = load_config(args.config.as_ref())?;
    if let Some(width) = args.width {
        config.grid.width = width;
    }
    if let Some(height) = args.height {
        config.grid.height = height;
    }
    if let Some(depth) = args.depth {
        config.grid.depth = depth;
    }
    config.validate().context("invalid configuration")?;
    if let Some(path) = &args.save_config {
        config
            .save(path)
            .with_context(|| format!("saving configuration to {}", path.display()))?;
    }

    let grid = config.grid.to_grid()?;
    let mut stepper = FluidStepper::new(grid, config.fluid)?;
    let (cx, cy, cz) = (
        (grid.nx() / 2) as i64,
        (grid.ny() / 2) as i64,
        (grid.nz() / 2) as i64,
    );
    tracing::info!(
        nx = grid.nx(),
        ny = grid.ny(),
        nz = grid.nz(),
        steps = args.steps,
        "starting fluid run"
    );

    for _ in 0..args.steps {
        stepper.add_density_at_3d(cx, cy, cz, args.source);
        stepper.add_velocity_at_3d(cx, cy, cz, [args.push, 0.0, 0.0]);
        stepper.step()?;

        let step = stepper.step_count();
        if args.report_every > 0 && step % args.report_every == 0 {
            let density = stepper.density()?;
            let velocity = stepper.velocity()?;
            if !density.sum().is_finite() {
                bail!("density became non-finite at step {step}");
            }
            let (lo, hi) = density.min_max();
            tracing::info!(
                step,
                total_density = density.sum(),
                min_density = lo,
                max_density = hi,
                max_speed = velocity.max_abs(),
                divergence = divergence_norm(&velocity),
                "fluid step"
            );
        }
    }
    Ok(())
}

fn run_fdm(args: FdmArgs) -> Result<()> {
    let mut config = load_config(args.config.as_ref())?.fdm;
    if let Some(max_iterations) = args.max_iterations {
        config.max_iterations = max_iterations;
    }
    if let Some(threshold) = args.threshold {
        config.threshold = threshold;
    }
    let (grid, mut system) = sample_system()?;
    let solver = FdmSolver::new(grid, config)?;
    let converged = solver.solve(&mut system)?;
    let residual = solver.residual(&system.b, &system.x, &system.a)?;
    tracing::info!(
        converged,
        residual = solver.l2_norm(&residual)?,
        "fdm solve"
    );
    tracing::info!("x = {:?}", system.x);
    if !converged {
        tracing::warn!(
            "solver stopped after {} iterations without converging",
            config.max_iterations
        );
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Fluid(args) => run_fluid(args),
        Commands::Fdm(args) => run_fdm(args),
    }
}
