use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::rc::Rc;
use std::thread;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use log::{info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::oneshot;

use limero_rx::config::{load_yaml_file, DemoConfig, RxConfig};
use limero_rx::logger::init_logger;
use limero_rx::{
    defer, from_future, from_iter, from_sequence, interval, of, range, range_n, timer, EventLoop,
    Observable, Observer, SchedulerRef,
};

#[derive(Parser, Debug)]
#[command(name = "limero-rx")]
#[command(about = "Replays the observable creation snippets", long_about = None)]
struct Args {
    /// YAML config file
    #[arg(short, long)]
    config: Option<String>,

    /// Overrides the configured log level
    #[arg(short, long)]
    log_level: Option<String>,

    /// Overrides the configured random seed
    #[arg(short, long)]
    seed: Option<u64>,

    #[arg(value_enum, default_value_t = Snippet::All)]
    snippet: Snippet,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Snippet {
    Of,
    Defer,
    Range,
    Timer,
    Interval,
    From,
    Future,
    All,
}

struct Demo {
    event_loop: Rc<EventLoop>,
    scheduler: SchedulerRef,
    rng: Rc<RefCell<StdRng>>,
    config: DemoConfig,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => load_yaml_file(path).with_context(|| format!("loading {path}"))?,
        None => RxConfig::default(),
    };
    if let Some(level) = &args.log_level {
        config.log_level = level.clone();
    }
    if args.seed.is_some() {
        config.demo.seed = args.seed;
    }
    init_logger(&config.log_level);
    if config.demo.pokemon.is_empty() {
        bail!("demo.pokemon must list at least one entry");
    }

    let rng = match config.demo.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let event_loop = EventLoop::with_config(&config.scheduler);
    let demo = Demo {
        scheduler: event_loop.clone(),
        event_loop,
        rng: Rc::new(RefCell::new(rng)),
        config: config.demo,
    };

    let snippets = match args.snippet {
        Snippet::All => vec![
            Snippet::Of,
            Snippet::Defer,
            Snippet::Range,
            Snippet::Timer,
            Snippet::Interval,
            Snippet::From,
            Snippet::Future,
        ],
        one => vec![one],
    };
    for snippet in snippets {
        info!("==== {:?} ====", snippet);
        match snippet {
            Snippet::Of => demo.of(),
            Snippet::Defer => demo.defer(),
            Snippet::Range => demo.range(),
            Snippet::Timer => demo.timer(),
            Snippet::Interval => demo.interval(),
            Snippet::From => demo.from(),
            Snippet::Future => demo.future(),
            Snippet::All => {}
        }
        demo.event_loop.run_until_idle();
    }
    Ok(())
}

fn print_all<T: Debug + 'static>(label: &'static str, observable: &Observable<T>) {
    observable.subscribe(
        Observer::new(move |v: T| println!("{label}: {v:?}"))
            .on_error(move |err| println!("{label}: error {err}"))
            .on_complete(move || println!("{label}: complete")),
    );
}

fn pick_pokemon(rng: &RefCell<StdRng>, pokemon: &[String]) -> String {
    let index = rng.borrow_mut().gen_range(0..pokemon.len());
    pokemon[index].clone()
}

impl Demo {
    fn of(&self) {
        // evaluated once, here, so every subscriber sees the same pick
        let random_pokemon = of(pick_pokemon(&self.rng, &self.config.pokemon));
        for _ in 0..3 {
            print_all("of", &random_pokemon);
        }
    }

    fn defer(&self) {
        let rng = self.rng.clone();
        let pokemon = self.config.pokemon.clone();
        let random_pokemon = defer(move || of(pick_pokemon(&rng, &pokemon)));
        for _ in 0..3 {
            print_all("defer", &random_pokemon);
        }
    }

    fn range(&self) {
        print_all("range(5)", &range_n(5));
        print_all("range(1, 5)", &range(1, 5));
    }

    fn timer(&self) {
        print_all("timer(2000)", &timer(&self.scheduler, self.config.scaled(2000), None));
        self.take(
            "timer(5000, 1000)",
            &timer(
                &self.scheduler,
                self.config.scaled(5000),
                Some(self.config.scaled(1000)),
            ),
        );
    }

    fn interval(&self) {
        self.take("interval(1000)", &interval(&self.scheduler, self.config.scaled(1000)));
    }

    fn from(&self) {
        print_all("from array", &from_sequence(vec![1, 2, 3, 4, 5]));
        print_all("from string", &from_sequence("Hello"));
        let map: BTreeMap<_, _> = self
            .config
            .pokemon
            .iter()
            .enumerate()
            .map(|(i, name)| (i, name.clone()))
            .collect();
        print_all("from map", &from_sequence(map));
        print_all("from iterator", &from_iter(|| (1..=3).map(|n| n * n)));
    }

    /// Stand-in for an HTTP fetch: a worker thread answers after a delay.
    fn future(&self) {
        let delay = self.config.scaled(1500);
        let rng = self.rng.clone();
        let pokemon = self.config.pokemon.clone();
        let fetch = from_future(&self.scheduler, move || {
            let (tx, rx) = oneshot::channel();
            let name = pick_pokemon(&rng, &pokemon);
            thread::spawn(move || {
                thread::sleep(delay);
                let _ = tx.send(name);
            });
            async move { rx.await.map_err(|e| format!("fetch abandoned: {e}")) }
        });
        print_all("ajax", &fetch);
    }

    /// Prints the first `interval_ticks` values, then unsubscribes.
    fn take(&self, label: &'static str, observable: &Observable<u64>) {
        let limit = self.config.interval_ticks;
        if limit == 0 {
            warn!("interval_ticks is 0, skipping {}", label);
            return;
        }
        observable.subscribe_with(move |subscription| {
            let subscription = subscription.clone();
            Observer::new(move |v: u64| {
                println!("{label}: {v}");
                if v + 1 >= limit {
                    println!("{label}: unsubscribed");
                    subscription.unsubscribe();
                }
            })
        });
    }
}
