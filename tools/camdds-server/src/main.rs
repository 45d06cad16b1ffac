// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2026 naskel.com

//! camdds-server - broadcast camera devices over the camdds bus.
//!
//! Hosts one participant and one device broadcaster. Devices come from
//! `--device` flags at startup (announced immediately, the way a device
//! scan on wakeup would) and, with `--interactive`, from add/remove
//! commands on stdin standing in for SDK connect/disconnect callbacks.

use std::collections::HashMap;
use std::io::{self, BufRead, Write};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::Parser;

use camdds::{
    DeviceBroadcaster, DeviceSource, Guid, Participant, ParticipantListener, StaticDevice,
    TransportMode,
};

/// Broadcast connected camera devices over the camdds bus
#[derive(Parser, Debug)]
#[command(name = "camdds-server")]
#[command(version)]
#[command(about = "Broadcast connected camera devices over the camdds bus")]
struct Args {
    /// Bus domain ID
    #[arg(short, long, default_value = "0")]
    domain: u32,

    /// Participant name announced on the bus
    #[arg(long, default_value = "camdds-server")]
    name: String,

    /// Static discovery peer (host:port), repeatable; for networks
    /// without multicast
    #[arg(long = "peer")]
    peers: Vec<SocketAddr>,

    /// Device to announce at startup as "name,serial,product-line[,locked]",
    /// repeatable
    #[arg(long = "device")]
    devices: Vec<String>,

    /// Read add/remove/list commands from stdin
    #[arg(short, long)]
    interactive: bool,
}

/// Mirrors participant join/leave onto the console.
struct ConsoleListener;

impl ParticipantListener for ConsoleListener {
    fn on_participant_discovered(&self, _guid: Guid, name: &str) {
        println!("Participant '{}' discovered", name);
    }

    fn on_participant_lost(&self, _guid: Guid, name: &str) {
        println!("Participant '{}' disappeared", name);
    }
}

fn parse_device(spec: &str) -> Result<StaticDevice, String> {
    let parts: Vec<&str> = spec.split(',').map(str::trim).collect();
    if parts.len() < 3 || parts.len() > 4 {
        return Err(format!(
            "expected \"name,serial,product-line[,locked]\", got {:?}",
            spec
        ));
    }
    if parts[1].is_empty() {
        return Err("serial must not be empty".to_string());
    }
    let locked = match parts.get(3).map(|s| s.to_ascii_lowercase()) {
        None => false,
        Some(v) if matches!(v.as_str(), "locked" | "yes" | "true" | "1") => true,
        Some(v) if matches!(v.as_str(), "unlocked" | "no" | "false" | "0") => false,
        Some(v) => return Err(format!("unknown lock state {:?}", v)),
    };
    Ok(StaticDevice::new(parts[0], parts[1], parts[2], locked))
}

fn announce(
    broadcaster: &DeviceBroadcaster,
    devices: &mut HashMap<String, Arc<StaticDevice>>,
    dev: StaticDevice,
) {
    let dev = Arc::new(dev);
    devices.insert(dev.serial(), Arc::clone(&dev));
    broadcaster.add_device(dev);
}

fn command_loop(
    broadcaster: &DeviceBroadcaster,
    devices: &mut HashMap<String, Arc<StaticDevice>>,
    running: &AtomicBool,
) -> io::Result<()> {
    println!("commands: add <name,serial,product-line[,locked]> | remove <serial> | list | quit");
    let stdin = io::stdin();
    loop {
        if !running.load(Ordering::SeqCst) {
            break;
        }
        print!("> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break; // EOF
        }
        let line = line.trim();
        let (command, rest) = match line.split_once(' ') {
            Some((c, r)) => (c, r.trim()),
            None => (line, ""),
        };

        match command {
            "" => {}
            "add" => match parse_device(rest) {
                Ok(dev) => announce(broadcaster, devices, dev),
                Err(e) => eprintln!("add: {}", e),
            },
            "remove" => {
                if rest.is_empty() {
                    eprintln!("remove: missing serial");
                } else {
                    devices.remove(rest);
                    broadcaster.remove_by_serial(rest);
                }
            }
            "list" => {
                if devices.is_empty() {
                    println!("no devices");
                }
                for (serial, dev) in devices.iter() {
                    println!(
                        "{}  {} ({}){}",
                        serial,
                        dev.name(),
                        dev.product_line(),
                        if dev.locked() { " [locked]" } else { "" }
                    );
                }
            }
            "quit" | "exit" => break,
            other => eprintln!("unknown command {:?}", other),
        }
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let mut builder = Participant::builder(&args.name)
        .domain_id(args.domain)
        .with_transport(TransportMode::UdpDiscovery)
        .with_listener(Arc::new(ConsoleListener));
    for peer in &args.peers {
        builder = builder.add_peer(*peer);
    }
    let participant = builder.build()?;

    let broadcaster = DeviceBroadcaster::new(participant);
    broadcaster.run()?;

    // Devices connected at startup are announced right away.
    let mut devices: HashMap<String, Arc<StaticDevice>> = HashMap::new();
    for spec in &args.devices {
        match parse_device(spec) {
            Ok(dev) => announce(&broadcaster, &mut devices, dev),
            Err(e) => log::error!("ignoring --device {:?}: {}", spec, e),
        }
    }

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = Arc::clone(&running);
        ctrlc::set_handler(move || running.store(false, Ordering::SeqCst))?;
    }

    println!("camdds server is on..");
    if args.interactive {
        command_loop(&broadcaster, &mut devices, &running)?;
    } else {
        while running.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(100));
        }
    }

    println!("Shutting down camdds-server...");
    Ok(())
}
