use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use clap::{Parser, ValueEnum};
use hdrhistogram::Histogram;
use rand::{Rng, SeedableRng, rngs::StdRng};
use tracing_subscriber::EnvFilter;

use slidegate::{RateLimiter, RedisKey, WindowOptions, WindowRateLimiter};

/// How callers are spread over identities.
#[derive(Clone, Copy, Debug, ValueEnum)]
enum Identities {
    /// Every call hits the same identity.
    Single,
    /// Calls pick uniformly from `--identity-count` identities.
    Spread,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "slidegate-stress",
    about = "Drive a sliding-window limiter against Redis and report latency"
)]
struct Args {
    #[arg(long, value_enum, default_value_t = Identities::Single)]
    identities: Identities,

    #[arg(long, default_value_t = 10_000)]
    identity_count: u64,

    /// Concurrent caller tasks.
    #[arg(long, default_value_t = 8)]
    callers: usize,

    #[arg(long, default_value_t = 30)]
    seconds: u64,

    #[arg(long, default_value_t = 1000)]
    limit: u64,

    #[arg(long, default_value_t = 10_000)]
    window_ms: u64,

    /// Defaults to the window.
    #[arg(long)]
    ttl_ms: Option<u64>,

    #[arg(long, default_value_t = 1)]
    cost: u64,

    /// Pace all callers together to this many calls per second. Unpaced if absent.
    #[arg(long)]
    rate: Option<u64>,

    #[arg(long, default_value = "redis://127.0.0.1:6379/")]
    redis_url: String,

    #[arg(long, default_value = "stress")]
    prefix: String,

    #[arg(long)]
    hash_tag: bool,
}

#[derive(Default)]
struct Tally {
    allowed: AtomicU64,
    rejected: AtomicU64,
    failed: AtomicU64,
}

struct Caller {
    limiter: Arc<dyn RateLimiter>,
    tally: Arc<Tally>,
    args: Arc<Args>,
    rng: StdRng,
    pace: Option<Duration>,
}

impl Caller {
    fn identity(&mut self) -> String {
        match self.args.identities {
            Identities::Single => "user_0".to_owned(),
            Identities::Spread => {
                let n = self.rng.random_range(0..self.args.identity_count.max(1));
                format!("user_{n}")
            }
        }
    }

    async fn run(mut self, until: Instant) -> Histogram<u64> {
        let mut latencies =
            Histogram::<u64>::new_with_bounds(1, 60_000_000, 3).expect("valid histogram bounds");
        let mut next_call = Instant::now();

        while Instant::now() < until {
            if let Some(pace) = self.pace {
                tokio::time::sleep_until(next_call.into()).await;
                next_call += pace;
            }

            let id = self.identity();
            let started = Instant::now();
            let result = self.limiter.allow_n(&id, self.args.cost).await;
            latencies.saturating_record(started.elapsed().as_micros() as u64);

            let counter = match result {
                Ok(decision) if decision.allowed => &self.tally.allowed,
                Ok(_) => &self.tally.rejected,
                Err(err) => {
                    tracing::debug!(error = %err, identity = %id, "admission call failed");
                    &self.tally.failed
                }
            };
            counter.fetch_add(1, Ordering::Relaxed);
        }

        latencies
    }
}

fn report(args: &Args, elapsed: Duration, latencies: &Histogram<u64>, tally: &Tally) {
    let allowed = tally.allowed.load(Ordering::Relaxed);
    let rejected = tally.rejected.load(Ordering::Relaxed);
    let failed = tally.failed.load(Ordering::Relaxed);
    let calls = allowed + rejected + failed;

    println!("{args:?}");
    println!(
        "{calls} calls in {:.2}s ({:.0}/s)",
        elapsed.as_secs_f64(),
        calls as f64 / elapsed.as_secs_f64(),
    );
    println!("allowed={allowed} rejected={rejected} failed={failed}");

    if latencies.is_empty() {
        return;
    }
    for q in [0.5, 0.9, 0.99, 0.999] {
        println!("p{:<5} {:>8}us", q * 100.0, latencies.value_at_quantile(q));
    }
    println!("max    {:>8}us", latencies.max());
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let client = redis::Client::open(args.redis_url.as_str())?;
    let connection_manager = client.get_connection_manager().await?;

    let options = WindowOptions {
        limit: args.limit,
        window: Duration::from_millis(args.window_ms),
        ttl: args.ttl_ms.map(Duration::from_millis),
        prefix: Some(RedisKey::try_from(args.prefix.as_str())?),
        hash_tag: args.hash_tag,
    };
    let limiter: Arc<dyn RateLimiter> =
        Arc::new(WindowRateLimiter::new(connection_manager, options).await?);

    let callers = args.callers.max(1);
    let pace = args
        .rate
        .filter(|rate| *rate > 0)
        .map(|rate| Duration::from_secs_f64(callers as f64 / rate as f64));
    let args = Arc::new(args);
    let tally = Arc::new(Tally::default());

    let started = Instant::now();
    let until = started + Duration::from_secs(args.seconds);

    let tasks: Vec<_> = (0..callers)
        .map(|n| {
            let caller = Caller {
                limiter: Arc::clone(&limiter),
                tally: Arc::clone(&tally),
                args: Arc::clone(&args),
                rng: StdRng::seed_from_u64(n as u64),
                pace,
            };
            tokio::spawn(caller.run(until))
        })
        .collect();

    let mut latencies = Histogram::<u64>::new_with_bounds(1, 60_000_000, 3)?;
    for task in tasks {
        latencies.add(&task.await?)?;
    }

    report(&args, started.elapsed(), &latencies, &tally);

    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let rt = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(err) => {
            eprintln!("failed to start runtime: {err}");
            std::process::exit(1);
        }
    };

    if let Err(err) = rt.block_on(run(args)) {
        eprintln!("stress run failed: {err}");
        std::process::exit(1);
    }
}
