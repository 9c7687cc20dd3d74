mod utils;

use std::str::FromStr;

use rand::Rng;

use ipraw_ping::{
    phy::SocketId,
    socket::ping::{Config, Session, Status},
    time::{Duration, StdClock},
    wire::Ipv4Address,
};

fn main() {
    utils::setup_logging("warn");

    let (mut opts, mut free) = utils::create_options();
    utils::add_loopback_options(&mut opts, &mut free);
    opts.optopt(
        "c",
        "count",
        "Amount of echo request packets to send (default: 4)",
        "COUNT",
    );
    opts.optopt(
        "s",
        "size",
        "Octets of payload in each request (default: 32)",
        "SIZE",
    );
    opts.optopt("", "ttl", "Hop limit of each request (default: 128)", "TTL");
    opts.optopt(
        "",
        "timeout",
        "Maximum wait duration for an echo response in seconds (default: 1)",
        "TIMEOUT",
    );
    opts.optopt(
        "",
        "ident",
        "Echo identifier, also the payload pattern (default: 65)",
        "IDENT",
    );
    opts.optopt(
        "",
        "loss",
        "Chance that a request goes unanswered, from 0 to 1 (default: 0)",
        "RATE",
    );
    opts.optflag("", "trace", "Probe the path hop by hop instead of pinging");
    opts.optopt(
        "",
        "max-hops",
        "Highest hop limit to probe with --trace (default: 30)",
        "HOPS",
    );
    free.push("ADDRESS");

    let mut matches = utils::parse_options(&opts, free);
    let mut chip = utils::parse_loopback_options(&mut matches);
    let remote_addr = Ipv4Address::from_str(&matches.free[0]).expect("invalid address format");
    if !matches.opt_present("unreachable") {
        chip.add_host(remote_addr).expect("too many hosts");
    }

    let count = matches
        .opt_str("count")
        .map(|s| usize::from_str(&s).unwrap())
        .unwrap_or(4);
    let loss = matches
        .opt_str("loss")
        .map(|s| f64::from_str(&s).unwrap())
        .unwrap_or(0.0)
        .clamp(0.0, 1.0);
    let max_hops = matches
        .opt_str("max-hops")
        .map(|s| u8::from_str(&s).unwrap())
        .unwrap_or(30);

    let mut config = Config::default();
    if let Some(size) = matches.opt_str("size") {
        config = config.with_payload_len(u16::from_str(&size).unwrap());
    }
    if let Some(ttl) = matches.opt_str("ttl") {
        config = config.with_hop_limit(u8::from_str(&ttl).unwrap());
    }
    if let Some(ident) = matches.opt_str("ident") {
        config = config.with_ident(u16::from_str(&ident).unwrap());
    }
    if let Some(timeout) = matches.opt_str("timeout") {
        config = config.with_timeout(Duration::from_secs(u64::from_str(&timeout).unwrap()));
    }

    let clock = StdClock::new();
    let mut rng = rand::thread_rng();
    let mut session = Session::new(SocketId(0));

    if matches.opt_present("trace") {
        println!(
            "traceroute to {remote_addr}, {max_hops} hops max, {} byte packets",
            config.payload_len
        );
        for ttl in 1..=max_hops {
            chip.set_responding(!rng.gen_bool(loss));
            let status = session.ping(&mut chip, &clock, remote_addr, &config.with_hop_limit(ttl));
            let reply = session.reply();
            match status {
                Status::Success | Status::HopReached => println!(
                    "{ttl:>2}  {}  {} ms",
                    reply.src_addr,
                    reply.time.as_millis()
                ),
                Status::ReceiveTimeout => println!("{ttl:>2}  *"),
                status => {
                    println!("{ttl:>2}  {status}");
                    break;
                }
            }
            if status == Status::Success {
                break;
            }
        }
        return;
    }

    println!(
        "PING {remote_addr}: {} data bytes, ttl {}",
        config.payload_len, config.hop_limit
    );
    let mut received = 0;
    for _ in 0..count {
        chip.set_responding(!rng.gen_bool(loss));
        let seq_no = session.seq_no();
        let status = session.ping(&mut chip, &clock, remote_addr, &config);
        let reply = session.reply();
        match status {
            Status::Success => {
                received += 1;
                println!(
                    "{} bytes from {}: icmp_seq={}, time={}ms",
                    reply.payload_len,
                    reply.src_addr,
                    seq_no,
                    reply.time.as_millis()
                );
            }
            Status::HopReached => println!(
                "From {} icmp_seq={} Time to live exceeded",
                reply.src_addr, seq_no
            ),
            status => println!("From {remote_addr} icmp_seq={seq_no} {status}"),
        }
    }

    println!("--- {remote_addr} ping statistics ---");
    println!(
        "{} packets transmitted, {} received, {:.0}% packet loss",
        count,
        received,
        100.0 * (count - received) as f64 / count.max(1) as f64
    );
}
