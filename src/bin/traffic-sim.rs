use std::time::Duration;

use clap::{Parser, ValueEnum};
use todo_otel::simulator::{Pacing, SimulationReport, TrafficSimulator, DEFAULT_BASE_URL};

#[derive(Parser)]
#[command(name = "traffic-sim")]
#[command(about = "Generate synthetic traffic against the to-do service", long_about = None)]
struct Cli {
    /// Base URL of the service
    #[arg(short, long, default_value = DEFAULT_BASE_URL)]
    url: String,

    #[arg(short, long, value_enum, default_value_t = Mode::Normal)]
    mode: Mode,

    /// Minutes to run in continuous mode
    #[arg(short, long, default_value_t = 10)]
    duration: u64,

    /// Number of bursts in burst mode
    #[arg(short, long, default_value_t = 3)]
    bursts: usize,

    /// Requests per burst
    #[arg(short, long, default_value_t = 10)]
    requests: usize,
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    /// One normal workflow
    Normal,
    /// Mixed workflows until the duration elapses
    Continuous,
    /// Concurrent request bursts
    Burst,
    /// One fault-injection workflow
    Errors,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let simulator = TrafficSimulator::new(cli.url, Pacing::realtime());

    let report = match cli.mode {
        Mode::Normal => {
            let mut report = SimulationReport::default();
            simulator.normal_workflow(&mut report).await;
            report
        }
        Mode::Errors => {
            let mut report = SimulationReport::default();
            simulator.error_workflow(&mut report).await;
            report
        }
        Mode::Continuous => {
            simulator
                .continuous(Duration::from_secs(cli.duration * 60))
                .await?
        }
        Mode::Burst => simulator.burst(cli.requests, cli.bursts).await?,
    };

    print_report(&report);
    Ok(())
}

fn print_report(report: &SimulationReport) {
    println!("Workflows:        {}", report.workflows);
    println!("Requests:         {}", report.requests);
    println!("Failed requests:  {}", report.failed_requests);
    println!("Tasks created:    {}", report.tasks_created);
    println!("Tasks completed:  {}", report.tasks_completed);
    println!("Tasks deleted:    {}", report.tasks_deleted);
    println!("Errors simulated: {}", report.errors_simulated);
    if !report.elapsed.is_zero() {
        println!("Elapsed:          {:.1}s", report.elapsed.as_secs_f64());
    }
}
