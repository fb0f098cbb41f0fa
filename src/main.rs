//! traffic-sim: drive the selectors and circuit breakers with synthetic calls.
//!
//! Each subcommand runs one scenario and prints the per-request picks followed
//! by the resulting distribution. `--json` prints the same report as JSON and
//! `--metrics` appends the Prometheus exposition recorded during the run.

use std::collections::{BTreeMap, VecDeque};
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::Serialize;

use traffic_core::config::{load_config, ObservabilityConfig};
use traffic_core::load_balancer::{
    BackendManager, ConsistentHash, DispatchError, LeastConnections, RoundRobin, Selector,
    WeightedRoundRobin, DEFAULT_REPLICAS,
};
use traffic_core::observability::{logging, metrics};
use traffic_core::resilience::{CircuitBreaker, CircuitState};

#[derive(Parser)]
#[command(name = "traffic-sim")]
#[command(about = "Simulate traffic through load balancers and circuit breakers")]
#[command(long_about = None)]
struct Cli {
    /// Number of simulated requests
    #[arg(short, long, global = true, default_value_t = 10)]
    requests: usize,

    /// TOML configuration file (required by `group`)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print the report as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Print Prometheus metrics after the run
    #[arg(long, global = true)]
    metrics: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Cycle through backends in order
    RoundRobin {
        #[arg(default_values = ["backend-1", "backend-2", "backend-3"])]
        backends: Vec<String>,
    },
    /// Smooth weighted round robin over ADDRESS=WEIGHT pairs
    WeightedRoundRobin {
        #[arg(
            value_parser = parse_weighted,
            default_values = ["backend-1=5", "backend-2=3", "backend-3=2"]
        )]
        backends: Vec<(String, u32)>,
    },
    /// Pick the backend with the fewest in-flight calls
    LeastConnections {
        #[arg(default_values = ["backend-1", "backend-2", "backend-3"])]
        backends: Vec<String>,

        /// Calls kept in flight before the oldest is released
        #[arg(long, default_value_t = 2)]
        hold: usize,
    },
    /// Map keys onto a hash ring of virtual nodes
    ConsistentHash {
        #[arg(default_values = ["backend-1", "backend-2", "backend-3"])]
        backends: Vec<String>,

        /// Virtual nodes per backend
        #[arg(long, default_value_t = DEFAULT_REPLICAS)]
        replicas: usize,

        /// Request keys, cycled; defaults to user-0, user-1, ...
        #[arg(short, long)]
        key: Vec<String>,
    },
    /// Run calls with injected failures through a single breaker
    Breaker {
        /// Probability that a call fails
        #[arg(long, default_value_t = 0.5)]
        failure_rate: f64,

        #[arg(long, default_value_t = 3)]
        max_failures: u32,

        #[arg(long, default_value_t = 50)]
        reset_timeout_ms: u64,

        /// Pause between calls
        #[arg(long, default_value_t = 10)]
        interval_ms: u64,

        /// Seed for reproducible failure injection
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Dispatch calls to a configured group through per-backend breakers
    Group {
        name: String,

        #[arg(long, default_value_t = 0.0)]
        failure_rate: f64,

        #[arg(long)]
        seed: Option<u64>,
    },
}

#[derive(Debug, Serialize)]
struct Report {
    scenario: String,
    picks: Vec<Pick>,
    distribution: BTreeMap<String, usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    breakers: Vec<BreakerSnapshot>,
}

#[derive(Debug, Serialize)]
struct Pick {
    request: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    key: Option<String>,
    backend: Option<String>,
    outcome: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    state: Option<CircuitState>,
}

#[derive(Debug, Serialize)]
struct BreakerSnapshot {
    name: String,
    state: CircuitState,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = cli.config.as_deref().map(load_config).transpose()?;
    let observability = config
        .as_ref()
        .map(|c| c.observability.clone())
        .unwrap_or_else(ObservabilityConfig::default);
    logging::init(&observability)?;

    let prometheus = if cli.metrics {
        Some(metrics::install_recorder()?)
    } else {
        None
    };

    tracing::info!(
        requests = cli.requests,
        "traffic-sim v{} starting",
        env!("CARGO_PKG_VERSION")
    );

    let report = match cli.command {
        Commands::RoundRobin { backends } => {
            let selector = RoundRobin::with_servers(&backends);
            drive("round-robin", &selector, cli.requests, &[], 0)
        }
        Commands::WeightedRoundRobin { backends } => {
            let selector = WeightedRoundRobin::with_weights(backends)?;
            drive("weighted-round-robin", &selector, cli.requests, &[], 0)
        }
        Commands::LeastConnections { backends, hold } => {
            let selector = LeastConnections::with_servers(&backends);
            drive("least-connections", &selector, cli.requests, &[], hold)
        }
        Commands::ConsistentHash {
            backends,
            replicas,
            key,
        } => {
            let selector = ConsistentHash::with_servers(replicas, &backends);
            let keys = if key.is_empty() {
                (0..cli.requests).map(|i| format!("user-{}", i)).collect()
            } else {
                key
            };
            drive("consistent-hash", &selector, cli.requests, &keys, 0)
        }
        Commands::Breaker {
            failure_rate,
            max_failures,
            reset_timeout_ms,
            interval_ms,
            seed,
        } => {
            let breaker =
                CircuitBreaker::new("demo", max_failures, Duration::from_millis(reset_timeout_ms));
            let mut rng = seed.map_or_else(fastrand::Rng::new, fastrand::Rng::with_seed);
            run_breaker(
                &breaker,
                cli.requests,
                || rng.f64() < failure_rate,
                Duration::from_millis(interval_ms),
            )
        }
        Commands::Group {
            name,
            failure_rate,
            seed,
        } => {
            let config = config.ok_or("the group scenario needs --config")?;
            let manager = BackendManager::new(&config);
            let mut rng = seed.map_or_else(fastrand::Rng::new, fastrand::Rng::with_seed);
            run_group(&manager, &name, cli.requests, || rng.f64() < failure_rate)?
        }
    };

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if let Some(handle) = prometheus {
        println!("{}", handle.render());
    }

    Ok(())
}

fn parse_weighted(s: &str) -> Result<(String, u32), String> {
    match s.rsplit_once('=') {
        Some((address, weight)) => weight
            .parse()
            .map(|w| (address.to_string(), w))
            .map_err(|e| format!("invalid weight in '{}': {}", s, e)),
        None => Ok((s.to_string(), 1)),
    }
}

/// Pull `requests` picks from `selector`, keeping up to `hold` calls in flight.
fn drive(
    scenario: &str,
    selector: &dyn Selector,
    requests: usize,
    keys: &[String],
    hold: usize,
) -> Report {
    let mut in_flight = VecDeque::new();
    let mut picks = Vec::with_capacity(requests);

    for request in 0..requests {
        let key = (!keys.is_empty()).then(|| keys[request % keys.len()].clone());
        let pick = match selector.next(key.as_deref()) {
            Ok(backend) => {
                in_flight.push_back(backend.clone());
                Pick {
                    request,
                    key,
                    backend: Some(backend),
                    outcome: "selected".into(),
                    state: None,
                }
            }
            Err(e) => Pick {
                request,
                key,
                backend: None,
                outcome: e.to_string(),
                state: None,
            },
        };
        picks.push(pick);

        while in_flight.len() > hold {
            if let Some(backend) = in_flight.pop_front() {
                selector.release(&backend);
            }
        }
    }
    for backend in in_flight {
        selector.release(&backend);
    }

    Report {
        scenario: scenario.to_string(),
        distribution: distribution(&picks),
        picks,
        breakers: Vec::new(),
    }
}

fn run_breaker(
    breaker: &CircuitBreaker,
    requests: usize,
    mut should_fail: impl FnMut() -> bool,
    interval: Duration,
) -> Report {
    let mut picks = Vec::with_capacity(requests);

    for request in 0..requests {
        let result = breaker.call(|| {
            if should_fail() {
                Err("injected failure")
            } else {
                Ok(())
            }
        });
        let outcome = match result {
            Ok(()) => "ok".to_string(),
            Err(e) if e.is_open() => "rejected".to_string(),
            Err(e) => e.to_string(),
        };
        picks.push(Pick {
            request,
            key: None,
            backend: None,
            outcome,
            state: Some(breaker.state()),
        });
        std::thread::sleep(interval);
    }

    Report {
        scenario: "breaker".into(),
        distribution: BTreeMap::new(),
        picks,
        breakers: vec![BreakerSnapshot {
            name: breaker.name().to_string(),
            state: breaker.state(),
        }],
    }
}

fn run_group(
    manager: &BackendManager,
    group: &str,
    requests: usize,
    mut should_fail: impl FnMut() -> bool,
) -> Result<Report, Box<dyn std::error::Error>> {
    let mut picks = Vec::with_capacity(requests);

    for request in 0..requests {
        let key = format!("user-{}", request);
        let fail = should_fail();
        let pick = match manager.call(group, Some(&key), |backend| {
            if fail {
                Err("injected failure")
            } else {
                Ok(backend.to_string())
            }
        }) {
            Ok(backend) => Pick {
                request,
                key: Some(key),
                backend: Some(backend),
                outcome: "ok".into(),
                state: None,
            },
            Err(DispatchError::Pool(e)) => return Err(e.into()),
            Err(DispatchError::CircuitOpen { backend }) => Pick {
                request,
                key: Some(key),
                backend: Some(backend),
                outcome: "rejected".into(),
                state: None,
            },
            Err(DispatchError::Call { backend, error }) => Pick {
                request,
                key: Some(key),
                backend: Some(backend),
                outcome: error.to_string(),
                state: None,
            },
        };
        picks.push(pick);
    }

    let breakers = manager
        .breakers()
        .states()
        .into_iter()
        .map(|(name, state)| BreakerSnapshot { name, state })
        .collect();

    Ok(Report {
        scenario: format!("group:{}", group),
        distribution: distribution(&picks),
        picks,
        breakers,
    })
}

fn distribution(picks: &[Pick]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for backend in picks.iter().filter_map(|p| p.backend.as_ref()) {
        *counts.entry(backend.clone()).or_insert(0) += 1;
    }
    counts
}

fn print_report(report: &Report) {
    println!("scenario: {}", report.scenario);
    for pick in &report.picks {
        let mut line = format!("  #{:<4}", pick.request);
        if let Some(key) = &pick.key {
            line.push_str(&format!(" key={:<10}", key));
        }
        if let Some(backend) = &pick.backend {
            line.push_str(&format!(" -> {:<16}", backend));
        }
        line.push_str(&format!(" {}", pick.outcome));
        if let Some(state) = pick.state {
            line.push_str(&format!(" [{}]", state));
        }
        println!("{}", line);
    }

    if !report.distribution.is_empty() {
        println!("distribution:");
        for (backend, count) in &report.distribution {
            println!("  {:<16} {}", backend, count);
        }
    }
    if !report.breakers.is_empty() {
        println!("breakers:");
        for b in &report.breakers {
            println!("  {:<16} {}", b.name, b.state);
        }
    }
}
