#![allow(dead_code)]

use std::env;
use std::io::Write;
use std::process;
use std::str::FromStr;

use env_logger::Builder;
use getopts::{Matches, Options};
use log::{Level, LevelFilter};

use ipraw_ping::phy::Loopback;
use ipraw_ping::time::{Clock, Instant, StdClock};
use ipraw_ping::wire::Ipv4Address;

pub fn setup_logging_with_clock<F>(filter: &str, since_startup: F)
where
    F: Fn() -> Instant + Send + Sync + 'static,
{
    Builder::new()
        .format(move |buf, record| {
            let elapsed = since_startup();
            let timestamp = format!("[{elapsed}]");
            if record.target().starts_with("ipraw_ping::") {
                writeln!(
                    buf,
                    "\x1b[0m{} ({}): {}\x1b[0m",
                    timestamp,
                    record.target().replace("ipraw_ping::", ""),
                    record.args()
                )
            } else if record.level() == Level::Trace {
                let message = format!("{}", record.args());
                writeln!(
                    buf,
                    "\x1b[37m{} {}\x1b[0m",
                    timestamp,
                    message.replace('\n', "\n             ")
                )
            } else {
                writeln!(
                    buf,
                    "\x1b[32m{} ({}): {}\x1b[0m",
                    timestamp,
                    record.target(),
                    record.args()
                )
            }
        })
        .filter(None, LevelFilter::Trace)
        .parse_filters(filter)
        .parse_env("RUST_LOG")
        .init();
}

pub fn setup_logging(filter: &str) {
    let clock = StdClock::new();
    setup_logging_with_clock(filter, move || clock.now())
}

pub fn create_options() -> (Options, Vec<&'static str>) {
    let mut opts = Options::new();
    opts.optflag("h", "help", "print this help menu");
    (opts, Vec::new())
}

pub fn parse_options(options: &Options, free: Vec<&str>) -> Matches {
    match options.parse(env::args().skip(1)) {
        Err(err) => {
            println!("{err}");
            process::exit(1)
        }
        Ok(matches) => {
            if matches.opt_present("h") || matches.free.len() != free.len() {
                let brief = format!(
                    "Usage: {} [OPTION]... {}",
                    env::args().next().unwrap(),
                    free.join(" ")
                );
                print!("{}", options.usage(&brief));
                process::exit(if matches.free.len() != free.len() {
                    1
                } else {
                    0
                })
            }
            matches
        }
    }
}

pub fn add_loopback_options(opts: &mut Options, _free: &mut [&str]) {
    opts.optopt(
        "",
        "local",
        "Address of the simulated chip (default: 192.168.69.1)",
        "ADDRESS",
    );
    opts.optmulti(
        "",
        "router",
        "Router on the path to every host, nearest first (repeatable)",
        "ADDRESS",
    );
    opts.optflag("", "unreachable", "Do not let the target host answer");
}

pub fn parse_loopback_options(matches: &mut Matches) -> Loopback {
    let local = matches
        .opt_str("local")
        .map(|s| Ipv4Address::from_str(&s).expect("invalid local address"))
        .unwrap_or(Ipv4Address::new(192, 168, 69, 1));
    let mut chip = Loopback::new(local);
    for router in matches.opt_strs("router") {
        let addr = Ipv4Address::from_str(&router).expect("invalid router address");
        chip.add_router(addr).expect("too many routers");
    }
    chip
}
